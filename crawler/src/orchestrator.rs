//! Process-wide indexing control: start, stop and single-page indexing.

use crate::coordinator::{SiteCoordinator, STOPPED_MESSAGE};
use crate::fetch::Fetcher;
use crate::html::parse_page;
use crate::task::{is_crawlable, page_path, CrawlRun};
use anyhow::Result;
use parking_lot::Mutex;
use url::Url;
use sitesearch_core::config::AppConfig;
use sitesearch_core::error::IndexingError;
use sitesearch_core::{PageIndexer, Site, SiteStatus};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

pub struct IndexingService {
    config: Arc<AppConfig>,
    indexer: PageIndexer,
    fetcher: Arc<Fetcher>,
    state: AtomicU8,
    /// Run currently owning the RUNNING state. Guards the state transitions that also swap the run.
    current: Mutex<Option<Arc<CrawlRun>>>,
}

impl IndexingService {
    pub fn new(config: Arc<AppConfig>, indexer: PageIndexer) -> Result<Self> {
        let fetcher = Arc::new(Fetcher::new(&config.crawler)?);
        Ok(Self { config, indexer, fetcher, state: AtomicU8::new(IDLE), current: Mutex::new(None) })
    }

    pub fn is_indexing(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }

    /// Crawls every configured site and returns once all of them finished.
    pub async fn start_indexing(&self) -> Result<Vec<Site>, IndexingError> {
        let run = self.begin()?;
        Ok(self.run_sites(run).await)
    }

    /// Like [`start_indexing`](Self::start_indexing) but only waits for the state transition.
    pub fn spawn_indexing(self: &Arc<Self>) -> Result<JoinHandle<Vec<Site>>, IndexingError> {
        let run = self.begin()?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run_sites(run).await }))
    }

    /// Cancels the running crawl and marks every site still indexing as failed.
    ///
    /// A new run cannot begin until the sites are marked, and coordinators of
    /// the stopped run leave the site rows alone afterwards.
    pub fn stop_indexing(&self) -> Result<(), IndexingError> {
        let mut current = self.current.lock();
        if self.state.compare_exchange(RUNNING, IDLE, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(IndexingError::NotRunning);
        }
        let run = current.take();
        let _outcome = run.as_ref().map(|r| r.lock_outcome());
        if let Some(run) = &run {
            run.cancel();
        }
        let store = self.indexer.store();
        for cfg in &self.config.sites {
            let Some(site) = store.site_by_url(&cfg.url)? else { continue };
            store.update_site(site.id, |s| {
                if s.status == SiteStatus::Indexing {
                    s.transition(SiteStatus::Failed, Some(STOPPED_MESSAGE.to_string()));
                }
            })?;
        }
        tracing::info!("indexing stopped");
        Ok(())
    }

    fn begin(&self) -> Result<Arc<CrawlRun>, IndexingError> {
        let mut current = self.current.lock();
        if self.state.compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(IndexingError::AlreadyStarted);
        }
        let run = Arc::new(CrawlRun::new(self.config.crawler.max_concurrent_fetches));
        *current = Some(run.clone());
        tracing::info!(sites = self.config.sites.len(), "indexing started");
        Ok(run)
    }

    async fn run_sites(&self, run: Arc<CrawlRun>) -> Vec<Site> {
        let mut coordinators = JoinSet::new();
        for site in &self.config.sites {
            let coordinator = SiteCoordinator {
                site: site.clone(),
                run: run.clone(),
                fetcher: self.fetcher.clone(),
                indexer: self.indexer.clone(),
                parallelism: self.config.crawler.parallelism,
            };
            coordinators.spawn(coordinator.run());
        }

        let mut finished = Vec::with_capacity(self.config.sites.len());
        while let Some(joined) = coordinators.join_next().await {
            match joined {
                Ok(Ok(site)) => finished.push(site),
                Ok(Err(e)) => tracing::error!(error = %e, "site coordinator failed"),
                Err(e) => tracing::error!(error = %e, "site coordinator aborted"),
            }
        }

        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|r| Arc::ptr_eq(r, &run)) {
            *current = None;
            let _ = self.state.compare_exchange(RUNNING, IDLE, Ordering::SeqCst, Ordering::SeqCst);
        }
        tracing::info!(sites = finished.len(), claimed = run.claimed(), "indexing finished");
        finished
    }

    /// Fetches and (re)indexes a single page of a configured site.
    pub async fn index_page(&self, url: &str) -> Result<(), IndexingError> {
        let cfg = self
            .config
            .site_for(url)
            .ok_or_else(|| IndexingError::SiteNotConfigured(url.to_string()))?;
        let target = Url::parse(url)
            .ok()
            .filter(is_crawlable)
            .ok_or_else(|| IndexingError::PageNotFound(url.to_string()))?;

        let store = self.indexer.store();
        let existing = store.site_by_url(&cfg.url)?;
        let site = match &existing {
            Some(site) => site.clone(),
            None => store.find_or_create_site(&cfg.url, &cfg.name, SiteStatus::Indexing)?,
        };

        let fetched = match self.fetcher.fetch(&target).await {
            Ok(f) if f.status < 400 => f,
            Ok(f) => return Err(self.page_failed(&site, existing.is_none(), url, f.status.to_string())),
            Err(e) => return Err(self.page_failed(&site, existing.is_none(), url, e.to_string())),
        };
        let parsed = parse_page(&fetched.url, &fetched.body);
        let path = page_path(&target);
        let page = self.indexer.reindex(&site, &path, fetched.status, &fetched.body, &parsed.text)?;
        if existing.is_none() {
            store.update_site(site.id, |s| s.transition(SiteStatus::Indexed, None))?;
        }
        tracing::info!(site = %site.url, path = %path, page = page.id, "page reindexed");
        Ok(())
    }

    fn page_failed(&self, site: &Site, created: bool, url: &str, reason: String) -> IndexingError {
        tracing::warn!(url, reason = %reason, "single page indexing failed");
        if created {
            if let Err(e) = self.indexer.store().update_site(site.id, |s| s.transition(SiteStatus::Failed, Some(reason.clone()))) {
                return IndexingError::Internal(e);
            }
        }
        IndexingError::PageNotFound(url.to_string())
    }
}

impl std::fmt::Debug for IndexingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingService")
            .field("sites", &self.config.sites.len())
            .field("indexing", &self.is_indexing())
            .finish()
    }
}
