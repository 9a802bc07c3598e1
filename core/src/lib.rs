pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod lemmatizer;
pub mod morphology;
pub mod persist;
pub mod search;
pub mod stats;

pub use index::{IndexEntry, Lemma, LemmaId, Page, PageId, Site, SiteId, SiteStatus};
pub use indexer::PageIndexer;
pub use lemmatizer::Lemmatizer;
pub use persist::Store;
pub use search::{SearchEngine, SearchHit, SearchResponse};
