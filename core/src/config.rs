use crate::index::url_within;
use crate::lemmatizer::{Lemmatizer, DEFAULT_MIN_WORD_LEN};
use crate::morphology::{DictionaryMorphology, Morphology, SnowballMorphology};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub sites: Vec<SiteConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub morphology: MorphologyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/index.sled")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// In-flight crawl tasks per site.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Concurrent fetches across all sites.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_referrer")]
    pub referrer: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            parallelism: default_parallelism(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            user_agent: default_user_agent(),
            referrer: default_referrer(),
        }
    }
}

fn default_min_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    5000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
fn default_max_concurrent_fetches() -> usize {
    32
}
fn default_user_agent() -> String {
    "sitesearch-bot/0.1 (+https://example.com/bot)".to_string()
}
fn default_referrer() -> String {
    "http://www.google.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Lemmas found on more than this share of pages are ignored.
    #[serde(default = "default_max_frequency_ratio")]
    pub max_frequency_ratio: f64,
    #[serde(default = "default_snippet_len")]
    pub snippet_len: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_frequency_ratio: default_max_frequency_ratio(),
            snippet_len: default_snippet_len(),
            default_limit: default_limit(),
        }
    }
}

fn default_max_frequency_ratio() -> f64 {
    0.1
}
fn default_snippet_len() -> usize {
    300
}
fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Analyzer {
    #[default]
    Snowball,
    Dictionary,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MorphologyConfig {
    #[serde(default)]
    pub analyzer: Analyzer,
    #[serde(default = "default_min_word_len")]
    pub min_word_len: usize,
    #[serde(default)]
    pub dictionary_path: Option<PathBuf>,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self { analyzer: Analyzer::default(), min_word_len: default_min_word_len(), dictionary_path: None }
    }
}

fn default_min_word_len() -> usize {
    DEFAULT_MIN_WORD_LEN
}

impl MorphologyConfig {
    /// Builds the configured analyzer. Failure here is fatal for the process.
    pub fn build_lemmatizer(&self) -> Result<Lemmatizer> {
        let morphology: Arc<dyn Morphology> = match self.analyzer {
            Analyzer::Snowball => Arc::new(SnowballMorphology::new()),
            Analyzer::Dictionary => {
                let path = self
                    .dictionary_path
                    .as_deref()
                    .context("morphology.dictionary_path is required for the dictionary analyzer")?;
                Arc::new(DictionaryMorphology::load(path)?)
            }
        };
        Ok(Lemmatizer::new(morphology).with_min_word_len(self.min_word_len))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl AppConfig {
    /// The configured site whose URL prefixes `url`.
    pub fn site_for(&self, url: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| url_within(&s.url, url))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            bail!("at least one [[sites]] entry is required");
        }
        for site in &self.sites {
            let parsed = Url::parse(&site.url).with_context(|| format!("invalid site url '{}'", site.url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("site url must be http(s): '{}'", site.url);
            }
            if site.name.trim().is_empty() {
                bail!("site name must not be empty for '{}'", site.url);
            }
        }
        if self.crawler.min_delay_ms > self.crawler.max_delay_ms {
            bail!("crawler.min_delay_ms must be <= crawler.max_delay_ms");
        }
        if self.crawler.max_attempts == 0 {
            bail!("crawler.max_attempts must be >= 1");
        }
        if self.crawler.parallelism == 0 || self.crawler.max_concurrent_fetches == 0 {
            bail!("crawler.parallelism and crawler.max_concurrent_fetches must be >= 1");
        }
        if !(self.search.max_frequency_ratio > 0.0 && self.search.max_frequency_ratio <= 1.0) {
            bail!("search.max_frequency_ratio must be in (0.0, 1.0]");
        }
        if self.search.snippet_len == 0 {
            bail!("search.snippet_len must be > 0");
        }
        if self.morphology.analyzer == Analyzer::Dictionary && self.morphology.dictionary_path.is_none() {
            bail!("morphology.dictionary_path must be set when analyzer is 'dictionary'");
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse_config(
            r#"
            [[sites]]
            url = "https://skillbox.ru"
            name = "Skillbox"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.crawler.max_attempts, 3);
        assert_eq!(cfg.crawler.min_delay_ms, 500);
        assert_eq!(cfg.search.snippet_len, 300);
        assert_eq!(cfg.search.default_limit, 20);
        assert_eq!(cfg.morphology.analyzer, Analyzer::Snowball);
    }

    #[test]
    fn site_lookup_by_prefix() {
        let cfg = parse_config(
            r#"
            [[sites]]
            url = "https://a.ru/"
            name = "A"
            [[sites]]
            url = "https://b.ru"
            name = "B"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.site_for("https://b.ru/news/1").map(|s| s.name.as_str()), Some("B"));
        assert_eq!(cfg.site_for("https://a.ru").map(|s| s.name.as_str()), Some("A"));
        assert!(cfg.site_for("https://c.ru/").is_none());
        assert!(cfg.site_for("https://a.ru.evil.com/x").is_none());
        assert!(cfg.site_for("https://b.ru:8443/").is_none());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse_config("sites = []").is_err());
        assert!(parse_config("[[sites]]\nurl = \"https://\"\nname = \"A\"").is_err());
        let bad_delay = r#"
            [[sites]]
            url = "https://a.ru"
            name = "A"
            [crawler]
            min_delay_ms = 10
            max_delay_ms = 5
        "#;
        assert!(parse_config(bad_delay).is_err());
        let missing_dict = r#"
            [[sites]]
            url = "https://a.ru"
            name = "A"
            [morphology]
            analyzer = "dictionary"
        "#;
        assert!(parse_config(missing_dict).is_err());
    }
}
