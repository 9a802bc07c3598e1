use lazy_static::lazy_static;
use url::Url;
use scraper::{Html, Selector};

lazy_static! {
    static ref SEL_A: Selector = Selector::parse("a[href]").expect("valid selector");
}

const HIDDEN: &[&str] = &["script", "style", "noscript", "template"];

pub struct ParsedPage {
    /// Text a reader would see, whitespace separated.
    pub text: String,
    /// Absolute http(s) links in document order.
    pub links: Vec<Url>,
}

pub fn parse_page(base: &Url, body: &str) -> ParsedPage {
    let doc = Html::parse_document(body);

    let mut text = String::new();
    for node in doc.root_element().descendants() {
        let Some(t) = node.value().as_text() else { continue };
        let hidden = node
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| HIDDEN.contains(&e.name())));
        if hidden { continue; }
        let t = t.trim();
        if t.is_empty() { continue; }
        if !text.is_empty() { text.push(' '); }
        text.push_str(t);
    }

    let mut links = Vec::new();
    for a in doc.select(&SEL_A) {
        if let Some(h) = a.value().attr("href") {
            if let Ok(u) = base.join(h.trim()) {
                if u.scheme().starts_with("http") { links.push(u); }
            }
        }
    }
    ParsedPage { text, links }
}
