pub mod events;
pub mod job;
pub mod orchestrator;
pub mod publisher;
pub mod record;
pub mod store;

#[cfg(test)]
pub mod testing;

pub use events::{CrawlEvent, LogKind};
pub use job::{Checkpoint, CrawlJob, JobStatus, SearchParams};
pub use orchestrator::Orchestrator;
pub use publisher::ProgressPublisher;
pub use record::{DownloadStatus, FirRecord, NewFirRecord};
pub use store::{CrawlStore, PostgresCrawlStore};
