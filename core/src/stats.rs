use crate::index::SiteStatus;
use crate::persist::Store;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Statistics {
    pub total: TotalStatistics,
    pub detailed: Vec<SiteStatistics>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TotalStatistics {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub indexing: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatistics {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// Unix seconds.
    pub status_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub pages: usize,
    pub lemmas: usize,
}

/// Rolls up page and lemma counts per site. `indexing` reports a running crawl.
pub fn collect(store: &Store, indexing: bool) -> Result<Statistics> {
    let mut stats = Statistics::default();
    for site in store.sites()? {
        let pages = store.count_pages(site.id);
        let lemmas = store.count_lemmas(site.id);
        stats.total.pages += pages;
        stats.total.lemmas += lemmas;
        stats.total.indexing |= site.status == SiteStatus::Indexing;
        stats.detailed.push(SiteStatistics {
            url: site.url,
            name: site.name,
            status: site.status,
            status_time: site.status_time.unix_timestamp(),
            error: site.last_error.filter(|_| site.status == SiteStatus::Failed),
            pages,
            lemmas,
        });
    }
    stats.total.sites = stats.detailed.len();
    stats.total.indexing |= indexing;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn rolls_up_sites() {
        let store = Store::temporary().unwrap();
        let a = store.find_or_create_site("https://a.ru", "A", SiteStatus::Indexed).unwrap();
        let mut b = store.find_or_create_site("https://b.ru", "B", SiteStatus::Indexing).unwrap();
        let page = store.insert_page(a.id, "/", 200, "").unwrap().unwrap();
        let counts: HashMap<String, u32> = [("кот".to_string(), 1), ("дом".to_string(), 2)].into();
        store.apply_lemmas(&page, &counts).unwrap();
        b.transition(SiteStatus::Failed, Some("Indexing was stopped".into()));
        store.save_site(&b).unwrap();

        let stats = collect(&store, false).unwrap();
        assert_eq!(stats.total, TotalStatistics { sites: 2, pages: 1, lemmas: 2, indexing: false });
        let failed = stats.detailed.iter().find(|s| s.url == "https://b.ru").unwrap();
        assert_eq!(failed.error.as_deref(), Some("Indexing was stopped"));
        assert!(collect(&store, true).unwrap().total.indexing);
    }

    #[test]
    fn serializes_camel_case() {
        let store = Store::temporary().unwrap();
        store.find_or_create_site("https://a.ru", "A", SiteStatus::Indexed).unwrap();
        let json = serde_json::to_value(collect(&store, false).unwrap()).unwrap();
        let site = &json["detailed"][0];
        assert_eq!(site["status"], "INDEXED");
        assert!(site["statusTime"].is_i64());
        assert!(site.get("error").is_none());
    }
}
