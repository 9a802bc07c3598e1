use crate::morphology::Morphology;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_MIN_WORD_LEN: usize = 2;

lazy_static! {
    static ref NON_ALPHABET: Regex = Regex::new(r"[^а-яё\s]+").expect("valid regex");
}

/// Whether `c` belongs to the indexed (lower-case Cyrillic) alphabet.
pub fn is_alphabet_char(c: char) -> bool {
    matches!(c, 'а'..='я' | 'ё')
}

/// Lower-cases `text` and replaces everything outside the alphabet with spaces.
pub fn restrict_to_alphabet(text: &str) -> String {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    NON_ALPHABET.replace_all(&normalized, " ").into_owned()
}

/// Turns text into lemma occurrence counts.
#[derive(Clone)]
pub struct Lemmatizer {
    morphology: Arc<dyn Morphology>,
    min_word_len: usize,
}

impl Lemmatizer {
    pub fn new(morphology: Arc<dyn Morphology>) -> Self {
        Self { morphology, min_word_len: DEFAULT_MIN_WORD_LEN }
    }

    pub fn with_min_word_len(mut self, min_word_len: usize) -> Self {
        self.min_word_len = min_word_len.max(1);
        self
    }

    /// Lemma -> number of occurrences in `text`. Auxiliary words are skipped.
    pub fn extract(&self, text: &str) -> HashMap<String, u32> {
        let cleaned = restrict_to_alphabet(text);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for word in cleaned.split_whitespace() {
            if !self.is_word(word) { continue; }
            let forms = self.morphology.normalize(word);
            if forms.class.is_auxiliary() { continue; }
            for base in forms.base_forms {
                *counts.entry(base).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Distinct lemmas of a search query.
    pub fn query_lemmas(&self, text: &str) -> HashSet<String> {
        self.extract(text).into_keys().collect()
    }

    fn is_word(&self, token: &str) -> bool {
        token.chars().count() >= self.min_word_len && token.chars().all(is_alphabet_char)
    }
}

impl std::fmt::Debug for Lemmatizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lemmatizer").field("min_word_len", &self.min_word_len).finish()
    }
}
