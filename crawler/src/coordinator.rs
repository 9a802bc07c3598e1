use crate::fetch::Fetcher;
use crate::task::{CrawlRun, CrawlTask};
use anyhow::{bail, Context, Result};
use url::Url;
use sitesearch_core::config::SiteConfig;
use sitesearch_core::{PageIndexer, Site, SiteStatus};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;

pub const STOPPED_MESSAGE: &str = "Indexing was stopped";

/// Drives the crawl of one configured site and records its outcome.
#[derive(Debug, Clone)]
pub struct SiteCoordinator {
    pub site: SiteConfig,
    pub run: Arc<CrawlRun>,
    pub fetcher: Arc<Fetcher>,
    pub indexer: PageIndexer,
    /// In-flight tasks for this site.
    pub parallelism: usize,
}

impl SiteCoordinator {
    /// Crawls the site to completion or cancellation and returns its final row.
    pub async fn run(self) -> Result<Site> {
        let store = self.indexer.store().clone();
        let site = {
            let _outcome = self.run.lock_outcome();
            if self.run.is_cancelled() {
                bail!("{STOPPED_MESSAGE} before {} started", self.site.url);
            }
            let mut site = store.find_or_create_site(&self.site.url, &self.site.name, SiteStatus::Indexing)?;
            site.transition(SiteStatus::Indexing, None);
            store.save_site(&site)?;
            site
        };
        tracing::info!(site = %site.url, "started indexing site");

        let outcome = self.crawl(&site).await;

        let _outcome = self.run.lock_outcome();
        if self.run.is_cancelled() {
            // The stop already recorded the outcome; a newer run may own the row by now.
            tracing::info!(site = %site.url, "indexing stopped");
            return Ok(store.site(site.id)?.unwrap_or(site));
        }
        let (status, error) = match outcome {
            Ok(pages) => {
                tracing::info!(site = %site.url, pages, "site indexed");
                (SiteStatus::Indexed, None)
            }
            Err(e) => {
                tracing::error!(site = %site.url, error = %e, "site indexing failed");
                (SiteStatus::Failed, Some(e.to_string()))
            }
        };
        let updated = store.update_site(site.id, |s| s.transition(status, error.clone()))?;
        Ok(updated.unwrap_or(site))
    }

    /// Runs the task tree as a work queue; returns how many tasks completed.
    async fn crawl(&self, site: &Site) -> Result<usize> {
        let root = Url::parse(&site.url).with_context(|| format!("invalid site url '{}'", site.url))?;
        let task = CrawlTask {
            site: site.clone(),
            run: self.run.clone(),
            fetcher: self.fetcher.clone(),
            indexer: self.indexer.clone(),
        };

        let mut frontier: VecDeque<Url> = VecDeque::from([root]);
        let mut inflight: JoinSet<Result<Vec<Url>>> = JoinSet::new();
        let mut completed = 0usize;

        loop {
            while inflight.len() < self.parallelism && !self.run.is_cancelled() {
                let Some(url) = frontier.pop_front() else { break };
                let task = task.clone();
                inflight.spawn(async move { task.run(url).await });
            }

            let Some(joined) = inflight.join_next().await else { break };
            completed += 1;
            match joined {
                Ok(Ok(links)) => frontier.extend(links),
                Ok(Err(e)) => tracing::warn!(site = %site.url, error = %e, "crawl task failed"),
                Err(e) => tracing::warn!(site = %site.url, error = %e, "crawl task aborted"),
            }
            if completed % 100 == 0 {
                tracing::info!(site = %site.url, completed, frontier = frontier.len(), claimed = self.run.claimed(), "progress");
            }
        }
        Ok(completed)
    }
}
