use crate::index::{Page, Site, SiteId};
use crate::lemmatizer::Lemmatizer;
use crate::persist::Store;
use anyhow::Result;
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const PATH_LOCK_STRIPES: usize = 64;

/// Writes pages together with their lemma and index rows.
///
/// Writes to one `(site, path)` are serialized, so a page is never deleted
/// while its lemma rows are still being applied.
#[derive(Clone, Debug)]
pub struct PageIndexer {
    store: Store,
    lemmatizer: Lemmatizer,
    path_locks: Arc<Vec<Mutex<()>>>,
}

impl PageIndexer {
    pub fn new(store: Store, lemmatizer: Lemmatizer) -> Self {
        let path_locks = Arc::new((0..PATH_LOCK_STRIPES).map(|_| Mutex::new(())).collect());
        Self { store, lemmatizer, path_locks }
    }

    pub fn store(&self) -> &Store { &self.store }

    pub fn lemmatizer(&self) -> &Lemmatizer { &self.lemmatizer }

    /// Persists a page and indexes `text`, its visible text.
    ///
    /// Returns `None` without touching the index when the site already has a
    /// page at `path`. The page row is committed before any lemma row so a
    /// search never sees postings for a missing page.
    pub fn index(&self, site: &Site, path: &str, code: u16, html: &str, text: &str) -> Result<Option<Page>> {
        let _guard = self.lock_path(site.id, path);
        self.index_locked(site, path, code, html, text)
    }

    /// Drops the current page at `path` (if any) and indexes the new content.
    pub fn reindex(&self, site: &Site, path: &str, code: u16, html: &str, text: &str) -> Result<Page> {
        let _guard = self.lock_path(site.id, path);
        if let Some(existing) = self.store.page_by_path(site.id, path)? {
            self.store.delete_page(&existing)?;
        }
        self.index_locked(site, path, code, html, text)?
            .ok_or_else(|| anyhow::anyhow!("path {path} of {} re-inserted while locked", site.url))
    }

    fn index_locked(&self, site: &Site, path: &str, code: u16, html: &str, text: &str) -> Result<Option<Page>> {
        let Some(page) = self.store.insert_page(site.id, path, code, html)? else {
            tracing::debug!(site = %site.url, path, "page already indexed");
            return Ok(None);
        };
        let counts = self.lemmatizer.extract(text);
        self.store.apply_lemmas(&page, &counts)?;
        tracing::debug!(site = %site.url, path, lemmas = counts.len(), "page indexed");
        Ok(Some(page))
    }

    fn lock_path(&self, site_id: SiteId, path: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        (site_id, path).hash(&mut hasher);
        self.path_locks[hasher.finish() as usize % self.path_locks.len()].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SiteStatus;
    use crate::morphology::SnowballMorphology;
    use std::sync::Arc;

    fn indexer() -> PageIndexer {
        let store = Store::temporary().unwrap();
        PageIndexer::new(store, Lemmatizer::new(Arc::new(SnowballMorphology::new())))
    }

    #[test]
    fn second_index_of_same_path_is_skipped() {
        let ix = indexer();
        let site = ix.store().find_or_create_site("https://a.ru", "A", SiteStatus::Indexing).unwrap();
        assert!(ix.index(&site, "/", 200, "<p>кот</p>", "кот").unwrap().is_some());
        assert!(ix.index(&site, "/", 200, "<p>кот</p>", "кот").unwrap().is_none());
        let lemma = ix.lemmatizer().query_lemmas("кот").into_iter().next().unwrap();
        assert_eq!(ix.store().lemma(site.id, &lemma).unwrap().unwrap().frequency, 1);
    }

    #[test]
    fn concurrent_writers_leave_one_consistent_page() {
        let ix = indexer();
        let site = ix.store().find_or_create_site("https://a.ru", "A", SiteStatus::Indexed).unwrap();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let (ix, site) = (ix.clone(), site.clone());
                scope.spawn(move || {
                    for _ in 0..20 {
                        if i % 2 == 0 {
                            ix.reindex(&site, "/a", 200, "кот", "кот").unwrap();
                        } else {
                            ix.index(&site, "/a", 200, "кот", "кот").unwrap();
                        }
                    }
                });
            }
        });
        let store = ix.store();
        assert_eq!(store.count_pages(site.id), 1);
        let page = store.page_by_path(site.id, "/a").unwrap().unwrap();
        let kot = ix.lemmatizer().query_lemmas("кот").into_iter().next().unwrap();
        let lemma = store.lemma(site.id, &kot).unwrap().unwrap();
        assert_eq!(lemma.frequency, 1);
        assert_eq!(store.postings(lemma.id).unwrap(), vec![(page.id, 1.0)]);
    }

    #[test]
    fn reindex_replaces_page() {
        let ix = indexer();
        let site = ix.store().find_or_create_site("https://a.ru", "A", SiteStatus::Indexed).unwrap();
        let first = ix.reindex(&site, "/a", 200, "кот", "кот").unwrap();
        let second = ix.reindex(&site, "/a", 200, "собака", "собака").unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(ix.store().count_pages(site.id), 1);
        let kot = ix.lemmatizer().query_lemmas("кот").into_iter().next().unwrap();
        assert!(ix.store().lemma(site.id, &kot).unwrap().is_none());
    }
}
