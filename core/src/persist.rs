//! sled-backed storage for sites, pages, lemmas and index rows.
//!
//! Keys are big-endian ids so that prefix scans group rows by owner:
//! `page_paths` and `lemmas` are keyed by `site id ++ text`, `index` by
//! `page id ++ lemma id` and `postings` by `lemma id ++ page id`.

use crate::index::{IndexEntry, Lemma, LemmaId, Page, PageId, Site, SiteId, SiteStatus};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use time::OffsetDateTime;

/// Value of a `lemmas` row: fixed 12 bytes, id then document frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LemmaRecord {
    id: LemmaId,
    frequency: u32,
}

impl LemmaRecord {
    fn encode(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.frequency.to_be_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let id = u64::from_be_bytes(bytes.get(..8)?.try_into().ok()?);
        let frequency = u32::from_be_bytes(bytes.get(8..12)?.try_into().ok()?);
        Some(Self { id, frequency })
    }
}

#[derive(Clone)]
pub struct Store {
    db: Db,
    sites: Tree,
    site_urls: Tree,
    pages: Tree,
    page_paths: Tree,
    lemmas: Tree,
    lemma_keys: Tree,
    index: Tree,
    postings: Tree,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        }
        let db = sled::open(path).with_context(|| format!("Failed to open store at {}", path.display()))?;
        Self::from_db(db)
    }

    /// In-memory store discarded on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            sites: db.open_tree("sites")?,
            site_urls: db.open_tree("site_urls")?,
            pages: db.open_tree("pages")?,
            page_paths: db.open_tree("page_paths")?,
            lemmas: db.open_tree("lemmas")?,
            lemma_keys: db.open_tree("lemma_keys")?,
            index: db.open_tree("index")?,
            postings: db.open_tree("postings")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    // --- sites ---

    pub fn site(&self, id: SiteId) -> Result<Option<Site>> {
        self.sites.get(id_key(id))?.map(|v| decode(&v)).transpose()
    }

    pub fn site_by_url(&self, url: &str) -> Result<Option<Site>> {
        match self.site_urls.get(url)? {
            Some(v) => self.site(decode_id(&v)?),
            None => Ok(None),
        }
    }

    pub fn sites(&self) -> Result<Vec<Site>> {
        self.sites.iter().values().map(|v| decode(&v?)).collect()
    }

    /// Returns the site registered for `url`, creating it with `status` when absent.
    pub fn find_or_create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        if let Some(site) = self.site_by_url(url)? {
            return Ok(site);
        }
        let site = Site {
            id: self.db.generate_id()?,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: OffsetDateTime::now_utc(),
            last_error: None,
        };
        self.save_site(&site)?;
        let claimed = self
            .site_urls
            .compare_and_swap(url, None as Option<&[u8]>, Some(id_key(site.id).to_vec()))?;
        if claimed.is_err() {
            // Lost the race; drop our record and use the winner's.
            self.sites.remove(id_key(site.id))?;
            return self.site_by_url(url)?.ok_or_else(|| anyhow!("site {url} vanished during creation"));
        }
        tracing::debug!(site = %url, id = site.id, "site created");
        Ok(site)
    }

    pub fn save_site(&self, site: &Site) -> Result<()> {
        self.sites.insert(id_key(site.id), encode(site)?)?;
        Ok(())
    }

    /// Atomically applies `f` to the stored site and returns the new value.
    pub fn update_site<F: FnMut(&mut Site)>(&self, id: SiteId, mut f: F) -> Result<Option<Site>> {
        let updated = self.sites.update_and_fetch(id_key(id), |old| {
            let old = old?;
            let Ok(mut site) = bincode::deserialize::<Site>(old) else {
                return Some(old.to_vec());
            };
            f(&mut site);
            bincode::serialize(&site).ok().or_else(|| Some(old.to_vec()))
        })?;
        updated.map(|v| decode(&v)).transpose()
    }

    // --- pages ---

    pub fn page(&self, id: PageId) -> Result<Option<Page>> {
        self.pages.get(id_key(id))?.map(|v| decode(&v)).transpose()
    }

    pub fn page_exists(&self, site_id: SiteId, path: &str) -> Result<bool> {
        Ok(self.page_paths.contains_key(text_key(site_id, path))?)
    }

    pub fn page_by_path(&self, site_id: SiteId, path: &str) -> Result<Option<Page>> {
        match self.page_paths.get(text_key(site_id, path))? {
            Some(v) => self.page(decode_id(&v)?),
            None => Ok(None),
        }
    }

    pub fn pages_of_site(&self, site_id: SiteId) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        for v in self.page_paths.scan_prefix(id_key(site_id)).values() {
            if let Some(page) = self.page(decode_id(&v?)?)? {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    /// Inserts a page unless `(site, path)` is already taken, in which case `None` is returned.
    pub fn insert_page(&self, site_id: SiteId, path: &str, code: u16, content: &str) -> Result<Option<Page>> {
        let page = Page {
            id: self.db.generate_id()?,
            site_id,
            path: path.to_string(),
            code,
            content: content.to_string(),
        };
        self.pages.insert(id_key(page.id), encode(&page)?)?;
        let claimed = self.page_paths.compare_and_swap(
            text_key(site_id, path),
            None as Option<&[u8]>,
            Some(id_key(page.id).to_vec()),
        )?;
        if claimed.is_err() {
            self.pages.remove(id_key(page.id))?;
            return Ok(None);
        }
        Ok(Some(page))
    }

    /// Removes a page with its index rows, releasing one document-frequency unit per lemma.
    pub fn delete_page(&self, page: &Page) -> Result<()> {
        let entries = self.index_entries(page.id)?;
        for entry in &entries {
            self.index.remove(pair_key(page.id, entry.lemma_id))?;
            self.postings.remove(pair_key(entry.lemma_id, page.id))?;
            self.release_lemma(entry.lemma_id)?;
        }
        self.pages.remove(id_key(page.id))?;
        let path_key = text_key(page.site_id, &page.path);
        let owner = id_key(page.id);
        // Only unlink the path if it still points at this page.
        let _ = self.page_paths.compare_and_swap(path_key, Some(&owner[..]), None as Option<Vec<u8>>)?;
        tracing::debug!(page = page.id, lemmas = entries.len(), "page deleted");
        Ok(())
    }

    pub fn count_pages(&self, site_id: SiteId) -> usize {
        self.page_paths.scan_prefix(id_key(site_id)).count()
    }

    pub fn total_pages(&self) -> usize {
        self.page_paths.len()
    }

    // --- lemmas and index ---

    /// Records `counts` (lemma -> occurrences) for a freshly inserted page.
    ///
    /// Each lemma row of the page's site gains one unit of document frequency;
    /// the count becomes the page's rank for that lemma.
    pub fn apply_lemmas(&self, page: &Page, counts: &HashMap<String, u32>) -> Result<()> {
        for (text, count) in counts {
            let key = text_key(page.site_id, text);
            let fresh = self.db.generate_id()?;
            let updated = self.lemmas.update_and_fetch(&key, |old| {
                let rec = match old.and_then(LemmaRecord::decode) {
                    Some(r) => LemmaRecord { id: r.id, frequency: r.frequency.saturating_add(1) },
                    None => LemmaRecord { id: fresh, frequency: 1 },
                };
                Some(rec.encode())
            })?;
            let rec = updated
                .as_deref()
                .and_then(LemmaRecord::decode)
                .ok_or_else(|| anyhow!("lemma upsert lost for {text}"))?;
            if rec.id == fresh {
                self.lemma_keys.insert(id_key(fresh), key)?;
            }
            let rank = (*count as f32).to_be_bytes();
            self.index.insert(pair_key(page.id, rec.id), &rank[..])?;
            self.postings.insert(pair_key(rec.id, page.id), &rank[..])?;
        }
        Ok(())
    }

    fn release_lemma(&self, lemma_id: LemmaId) -> Result<()> {
        let Some(key) = self.lemma_keys.get(id_key(lemma_id))? else {
            return Ok(());
        };
        let remaining = self.lemmas.update_and_fetch(&key, |old| {
            let old = old?;
            match LemmaRecord::decode(old) {
                Some(r) if r.id == lemma_id && r.frequency <= 1 => None,
                Some(r) if r.id == lemma_id => Some(LemmaRecord { id: r.id, frequency: r.frequency - 1 }.encode()),
                _ => Some(old.to_vec()),
            }
        })?;
        if remaining.is_none() {
            self.lemma_keys.remove(id_key(lemma_id))?;
        }
        Ok(())
    }

    pub fn lemma(&self, site_id: SiteId, text: &str) -> Result<Option<Lemma>> {
        let Some(v) = self.lemmas.get(text_key(site_id, text))? else {
            return Ok(None);
        };
        let rec = LemmaRecord::decode(&v).ok_or_else(|| anyhow!("corrupt lemma row for {text}"))?;
        Ok(Some(Lemma { id: rec.id, site_id, lemma: text.to_string(), frequency: rec.frequency }))
    }

    pub fn lemmas_of_site(&self, site_id: SiteId) -> Result<Vec<Lemma>> {
        let mut out = Vec::new();
        for item in self.lemmas.scan_prefix(id_key(site_id)) {
            let (k, v) = item?;
            let rec = LemmaRecord::decode(&v).ok_or_else(|| anyhow!("corrupt lemma row"))?;
            let lemma = String::from_utf8(k[8..].to_vec())?;
            out.push(Lemma { id: rec.id, site_id, lemma, frequency: rec.frequency });
        }
        Ok(out)
    }

    pub fn count_lemmas(&self, site_id: SiteId) -> usize {
        self.lemmas.scan_prefix(id_key(site_id)).count()
    }

    /// Pages containing the lemma, with the lemma's rank on each.
    pub fn postings(&self, lemma_id: LemmaId) -> Result<Vec<(PageId, f32)>> {
        let mut out = Vec::new();
        for item in self.postings.scan_prefix(id_key(lemma_id)) {
            let (k, v) = item?;
            out.push((decode_id(&k[8..])?, decode_rank(&v)?));
        }
        Ok(out)
    }

    pub fn rank(&self, page_id: PageId, lemma_id: LemmaId) -> Result<Option<f32>> {
        self.index.get(pair_key(page_id, lemma_id))?.map(|v| decode_rank(&v)).transpose()
    }

    pub fn index_entries(&self, page_id: PageId) -> Result<Vec<IndexEntry>> {
        let mut out = Vec::new();
        for item in self.index.scan_prefix(id_key(page_id)) {
            let (k, v) = item?;
            out.push(IndexEntry { page_id, lemma_id: decode_id(&k[8..])?, rank: decode_rank(&v)? });
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("sites", &self.sites.len())
            .field("pages", &self.page_paths.len())
            .finish()
    }
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn pair_key(a: u64, b: u64) -> [u8; 16] {
    let mut k = [0u8; 16];
    k[..8].copy_from_slice(&a.to_be_bytes());
    k[8..].copy_from_slice(&b.to_be_bytes());
    k
}

fn text_key(owner: u64, text: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(8 + text.len());
    k.extend_from_slice(&owner.to_be_bytes());
    k.extend_from_slice(text.as_bytes());
    k
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes.get(..8).and_then(|b| b.try_into().ok()).ok_or_else(|| anyhow!("corrupt id"))?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_rank(bytes: &[u8]) -> Result<f32> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| anyhow!("corrupt rank"))?;
    Ok(f32::from_be_bytes(arr))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}
