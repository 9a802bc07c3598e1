//! Rejections returned to callers. Storage and I/O failures travel as
//! [`anyhow::Error`] inside the `Internal` variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("Indexing has already started")]
    AlreadyStarted,

    #[error("Indexing is not running")]
    NotRunning,

    #[error("Site not found in configuration: {0}")]
    SiteNotConfigured(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
