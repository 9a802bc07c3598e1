use sitesearch_core::lemmatizer::Lemmatizer;
use sitesearch_core::morphology::{DictionaryMorphology, Morphology, SnowballMorphology};
use std::sync::Arc;

const DICT: &str = "\
шёл\tидти\tГ
стали\tсталь\tС
стали\tстать\tГ
и\tи\tСОЮЗ
над\tнад\tПРЕДЛ
ой\tой\tМЕЖД
же\tже\tЧАСТ
";

fn snowball() -> Lemmatizer {
    Lemmatizer::new(Arc::new(SnowballMorphology::new()))
}

fn dictionary() -> Lemmatizer {
    Lemmatizer::new(Arc::new(DictionaryMorphology::parse(DICT).unwrap()))
}

#[test]
fn it_is_deterministic() {
    let text = "Повторное появление леопарда в Осетии позволяет предположить, что леопард постоянно обитает в некоторых районах Северного Кавказа.";
    let l = snowball();
    assert_eq!(l.extract(text), l.extract(text));
    assert!(!l.extract(text).is_empty());
}

#[test]
fn it_drops_auxiliary_words() {
    let l = snowball();
    let m = SnowballMorphology::new();
    let lemmas = l.extract("кошка и собака через забор, ведь увы");
    for aux in ["и", "через", "ведь", "увы"] {
        for base in m.normalize(aux).base_forms {
            assert!(!lemmas.contains_key(&base), "{aux} leaked as {base}");
        }
    }
    assert_eq!(lemmas.len(), 3);
}

#[test]
fn it_counts_every_base_form() {
    let lemmas = dictionary().extract("Стали стали над морем, ой же!");
    assert_eq!(lemmas.get("сталь"), Some(&2));
    assert_eq!(lemmas.get("стать"), Some(&2));
    assert_eq!(lemmas.get("морем"), Some(&1));
    assert!(!lemmas.contains_key("над"));
    assert!(!lemmas.contains_key("ой"));
    assert!(!lemmas.contains_key("же"));
}

#[test]
fn it_ignores_latin_and_digits() {
    let lemmas = dictionary().extract("Rust 2024 шёл");
    assert_eq!(lemmas.len(), 1);
    assert_eq!(lemmas.get("идти"), Some(&1));
}

#[test]
fn query_lemmas_are_distinct() {
    let set = dictionary().query_lemmas("шёл шёл шёл");
    assert_eq!(set.len(), 1);
    assert!(set.contains("идти"));
}
