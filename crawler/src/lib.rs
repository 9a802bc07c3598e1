pub mod coordinator;
pub mod fetch;
pub mod html;
pub mod orchestrator;
pub mod task;

pub use coordinator::{SiteCoordinator, STOPPED_MESSAGE};
pub use fetch::{FetchError, Fetcher};
pub use orchestrator::IndexingService;
pub use task::{CrawlRun, CrawlTask};
