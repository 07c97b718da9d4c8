use std::sync::Arc;

use super::artifact::ArtifactFetcher;
use super::jobs::store::CrawlStore;
use super::session::SessionManager;

/// Shared dependencies injected into the orchestrator and the HTTP
/// surface: durable state, the process-wide session owner, and the
/// artifact fetcher over the download root.
pub struct CrawlDeps {
    pub store: Arc<dyn CrawlStore>,
    pub sessions: Arc<SessionManager>,
    pub fetcher: ArtifactFetcher,
}
