//! Ranked AND-search over the lemma index.
//!
//! Query lemmas that occur on too many pages are dropped, the rest are
//! ordered rarest first; the rarest lemma seeds the candidate pages and every
//! further lemma narrows them through point lookups in the index. Scores are
//! the summed ranks, normalized by the best candidate.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::index::{Lemma, LemmaId, PageId, Site, SiteId};
use crate::lemmatizer::Lemmatizer;
use crate::persist::Store;
use anyhow::Result;
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;

pub const UNTITLED: &str = "Без заголовка";

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SearchResponse {
    /// Matches before pagination.
    pub count: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub site: String,
    pub site_name: String,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    pub relevance: f32,
}

#[derive(Debug)]
struct Term {
    text: String,
    frequency: u64,
    rows: HashMap<SiteId, LemmaId>,
}

#[derive(Clone, Debug)]
pub struct SearchEngine {
    store: Store,
    lemmatizer: Lemmatizer,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(store: Store, lemmatizer: Lemmatizer, config: SearchConfig) -> Self {
        Self { store, lemmatizer, config }
    }

    pub fn default_limit(&self) -> usize {
        self.config.default_limit
    }

    pub fn search(&self, query: &str, site: Option<&str>, offset: usize, limit: usize) -> Result<SearchResponse, SearchError> {
        let lemmas = self.lemmatizer.query_lemmas(query);
        if lemmas.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let sites = match site {
            Some(url) => match self.resolve_site(url)? {
                Some(s) => vec![s],
                None => {
                    tracing::debug!(site = url, "search scoped to unknown site");
                    return Ok(SearchResponse::default());
                }
            },
            None => self.store.sites()?,
        };

        let total_pages: usize = sites.iter().map(|s| self.store.count_pages(s.id)).sum();
        let max_df = self.frequency_limit(total_pages);

        let mut terms = Vec::with_capacity(lemmas.len());
        for text in lemmas {
            let term = self.term(&sites, text)?;
            if term.frequency > max_df {
                tracing::debug!(lemma = %term.text, frequency = term.frequency, max_df, "skipping frequent lemma");
                continue;
            }
            terms.push(term);
        }
        if terms.is_empty() {
            return Ok(SearchResponse::default());
        }
        terms.sort_by(|a, b| a.frequency.cmp(&b.frequency).then_with(|| a.text.cmp(&b.text)));

        let scored = self.rank_candidates(&terms)?;
        let count = scored.len();
        let max = scored.first().map(|(_, s)| *s).filter(|m| *m > 0.0).unwrap_or(1.0);

        let by_id: HashMap<SiteId, &Site> = sites.iter().map(|s| (s.id, s)).collect();
        let matched: Vec<&str> = terms.iter().map(|t| t.text.as_str()).collect();
        let mut results = Vec::new();
        for (page_id, score) in scored.into_iter().skip(offset).take(limit) {
            let Some(page) = self.store.page(page_id)? else { continue };
            let Some(site) = by_id.get(&page.site_id) else { continue };
            results.push(SearchHit {
                site: site.url.clone(),
                site_name: site.name.clone(),
                uri: page.path.clone(),
                title: extract_title(&page.content),
                snippet: build_snippet(&page.content, &matched, self.config.snippet_len),
                relevance: score / max,
            });
        }
        tracing::debug!(query, count, returned = results.len(), "search finished");
        Ok(SearchResponse { count, results })
    }

    /// Highest document frequency a lemma may have and still be searched.
    fn frequency_limit(&self, total_pages: usize) -> u64 {
        ((self.config.max_frequency_ratio * total_pages as f64).ceil() as u64).max(1)
    }

    fn resolve_site(&self, url: &str) -> Result<Option<Site>> {
        if let Some(site) = self.store.site_by_url(url)? {
            return Ok(Some(site));
        }
        let trimmed = url.trim_end_matches('/');
        if trimmed != url {
            return self.store.site_by_url(trimmed);
        }
        self.store.site_by_url(&format!("{url}/"))
    }

    fn term(&self, sites: &[Site], text: String) -> Result<Term> {
        let mut rows = HashMap::new();
        let mut frequency = 0u64;
        for site in sites {
            if let Some(Lemma { id, frequency: f, .. }) = self.store.lemma(site.id, &text)? {
                rows.insert(site.id, id);
                frequency += u64::from(f);
            }
        }
        Ok(Term { text, frequency, rows })
    }

    /// Pages containing every term, with absolute relevance, best first.
    fn rank_candidates(&self, terms: &[Term]) -> Result<Vec<(PageId, f32)>> {
        let Some((rarest, rest)) = terms.split_first() else {
            return Ok(Vec::new());
        };
        let mut candidates: HashMap<PageId, (SiteId, f32)> = HashMap::new();
        for (site_id, lemma_id) in &rarest.rows {
            for (page_id, rank) in self.store.postings(*lemma_id)? {
                candidates.insert(page_id, (*site_id, rank));
            }
        }
        for term in rest {
            if candidates.is_empty() {
                break;
            }
            let mut narrowed = HashMap::with_capacity(candidates.len());
            for (page_id, (site_id, score)) in candidates {
                let Some(lemma_id) = term.rows.get(&site_id) else { continue };
                if let Some(rank) = self.store.rank(page_id, *lemma_id)? {
                    narrowed.insert(page_id, (site_id, score + rank));
                }
            }
            candidates = narrowed;
        }
        let mut scored: Vec<(PageId, f32)> = candidates.into_iter().map(|(id, (_, s))| (id, s)).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(scored)
    }
}

/// Text between the first `<title>` and the following `</title>`.
pub fn extract_title(content: &str) -> String {
    const OPEN: &str = "<title>";
    const CLOSE: &str = "</title>";
    if let Some(start) = content.find(OPEN) {
        let from = start + OPEN.len();
        if let Some(len) = content[from..].find(CLOSE) {
            return content[from..from + len].trim().to_string();
        }
    }
    UNTITLED.to_string()
}

/// `len` characters of `content` around the first occurrences of `lemmas`, with matches emphasized.
///
/// Falls back to the first `len` characters when no lemma occurs verbatim.
pub fn build_snippet(content: &str, lemmas: &[&str], len: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let lower: Vec<char> = chars.iter().map(|c| c.to_lowercase().next().unwrap_or(*c)).collect();
    let mut span: Option<(usize, usize)> = None;
    for lemma in lemmas {
        let needle: Vec<char> = lemma.chars().collect();
        if let Some(pos) = find_chars(&lower, &needle) {
            let end = pos + needle.len();
            span = Some(match span {
                None => (pos, end),
                Some((s, e)) => (s.min(pos), e.max(end)),
            });
        }
    }
    let window = match span {
        None => 0..chars.len().min(len),
        Some((start, end)) => centered_window(start, end, len, chars.len()),
    };
    let snippet: String = chars[window].iter().collect();
    highlight(&snippet, lemmas)
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn centered_window(start: usize, end: usize, len: usize, total: usize) -> Range<usize> {
    if end - start >= len {
        return start..(start + len).min(total);
    }
    let center = (start + end) / 2;
    let from = center.saturating_sub(len / 2);
    let to = (from + len).min(total);
    to.saturating_sub(len)..to
}

fn highlight(text: &str, lemmas: &[&str]) -> String {
    let mut terms: Vec<&str> = lemmas.iter().copied().filter(|l| !l.is_empty()).collect();
    if terms.is_empty() {
        return text.to_string();
    }
    // Longest first so that a lemma contained in another does not split its match.
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    let pattern = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.replace_all(text, "<b>$0</b>").into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "highlight pattern rejected");
            text.to_string()
        }
    }
}
