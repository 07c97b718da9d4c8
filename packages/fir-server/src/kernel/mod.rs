//! The crawl engine: session ownership, job orchestration, durable
//! progress state, artifact fetching, and the progress event channel.

pub mod artifact;
pub mod deps;
pub mod files;
pub mod jobs;
pub mod session;

pub use deps::CrawlDeps;
pub use session::{SessionManager, SessionState};
