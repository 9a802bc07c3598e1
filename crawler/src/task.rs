//! One unit of crawl work: fetch a URL, index it, report in-scope links.

use crate::fetch::Fetcher;
use crate::html::parse_page;
use anyhow::Result;
use dashmap::DashSet;
use parking_lot::{Mutex, MutexGuard};
use url::Url;
use sitesearch_core::{PageIndexer, Site};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// State shared by every task of one indexing run.
#[derive(Debug)]
pub struct CrawlRun {
    claimed: DashSet<String>,
    cancelled: AtomicBool,
    fetch_permits: Semaphore,
    /// Held while a site outcome is recorded or the run is being stopped.
    outcome: Mutex<()>,
}

impl CrawlRun {
    pub fn new(max_concurrent_fetches: usize) -> Self {
        Self {
            claimed: DashSet::new(),
            cancelled: AtomicBool::new(false),
            fetch_permits: Semaphore::new(max_concurrent_fetches.max(1)),
            outcome: Mutex::new(()),
        }
    }

    /// Claims `url` for this run; false if another task already did.
    pub fn claim(&self, url: &Url) -> bool {
        self.claimed.insert(claim_key(url))
    }

    pub fn is_claimed(&self, url: &Url) -> bool {
        self.claimed.contains(&claim_key(url))
    }

    pub fn claimed(&self) -> usize {
        self.claimed.len()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.fetch_permits.close();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Serializes site outcome writes against the bookkeeping done when the run is stopped.
    pub fn lock_outcome(&self) -> MutexGuard<'_, ()> {
        self.outcome.lock()
    }
}

fn claim_key(url: &Url) -> String {
    let mut u = url.clone();
    u.set_fragment(None);
    u.to_string()
}

/// Dependencies of a crawl task; cheap to clone.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub site: Site,
    pub run: Arc<CrawlRun>,
    pub fetcher: Arc<Fetcher>,
    pub indexer: PageIndexer,
}

impl CrawlTask {
    /// Processes `url` and returns the links that should be crawled next.
    ///
    /// A page stored by an earlier run is replaced. Fetch failures end the
    /// task quietly; `Err` is reserved for storage failures.
    pub async fn run(&self, url: Url) -> Result<Vec<Url>> {
        if !self.run.claim(&url) || self.run.is_cancelled() {
            return Ok(Vec::new());
        }

        let fetched = {
            let Ok(_permit) = self.run.fetch_permits.acquire().await else {
                return Ok(Vec::new());
            };
            self.fetcher.polite_delay().await;
            match self.fetcher.fetch(&url).await {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(site = %self.site.url, url = %url, error = %e, "skipping page");
                    return Ok(Vec::new());
                }
            }
        };
        if fetched.status >= 400 {
            return Ok(Vec::new());
        }

        let parsed = parse_page(&fetched.url, &fetched.body);
        let path = page_path(&url);
        self.indexer.reindex(&self.site, &path, fetched.status, &fetched.body, &parsed.text)?;
        tracing::info!(site = %self.site.url, path = %path, status = fetched.status, "page indexed");

        if self.run.is_cancelled() {
            return Ok(Vec::new());
        }
        Ok(parsed.links.into_iter().filter(|link| self.in_scope(link)).collect())
    }

    fn in_scope(&self, link: &Url) -> bool {
        is_crawlable(link) && self.site.contains(link.as_str()) && !self.run.is_claimed(link)
    }
}

/// Links with a query or fragment are never crawled.
pub fn is_crawlable(url: &Url) -> bool {
    !url.as_str().contains('?') && !url.as_str().contains('#')
}

/// Path under which a page is stored for its site.
pub fn page_path(url: &Url) -> String {
    url.path().to_string()
}
