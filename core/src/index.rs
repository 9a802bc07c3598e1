use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

pub type SiteId = u64;
pub type PageId = u64;
pub type LemmaId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    #[serde(with = "time::serde::timestamp")]
    pub status_time: OffsetDateTime,
    pub last_error: Option<String>,
}

impl Site {
    /// Moves the site to `status`, refreshing the timestamp. `error` replaces the last error.
    pub fn transition(&mut self, status: SiteStatus, error: Option<String>) {
        self.status = status;
        self.status_time = OffsetDateTime::now_utc();
        self.last_error = error;
    }

    /// Whether `url` lies under this site's base URL.
    pub fn contains(&self, url: &str) -> bool {
        url_within(&self.url, url)
    }
}

/// Same scheme, host and port as `base`, and a path at or below its path.
///
/// The path prefix must end on a segment boundary: `/news` covers
/// `/news/1` but not `/newsletter`.
pub fn url_within(base: &str, candidate: &str) -> bool {
    let (Ok(base), Ok(candidate)) = (Url::parse(base), Url::parse(candidate)) else {
        return false;
    };
    if base.scheme() != candidate.scheme()
        || base.host_str() != candidate.host_str()
        || base.port_or_known_default() != candidate.port_or_known_default()
    {
        return false;
    }
    let prefix = base.path().trim_end_matches('/');
    let path = candidate.path();
    prefix.is_empty() || path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// URL path relative to the site's host, e.g. `/news/42`.
    pub path: String,
    pub code: u16,
    /// Raw HTML as fetched.
    pub content: String,
}

/// Per-site lemma row. `frequency` counts distinct pages of the site containing the lemma.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub lemma: String,
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    pub rank: f32,
}
