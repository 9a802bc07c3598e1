//! Word normalization capability consumed by the lemmatizer.
//!
//! A [`Morphology`] turns one lower-cased word into its base forms and a
//! grammatical class. Auxiliary classes (conjunctions, prepositions,
//! interjections, particles) carry no search value and are dropped by the
//! lemmatizer.

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordClass {
    Conjunction,
    Preposition,
    Interjection,
    Particle,
    Significant,
}

impl WordClass {
    pub fn is_auxiliary(self) -> bool {
        !matches!(self, WordClass::Significant)
    }

    /// Maps a dictionary grammar tag to a class. Unknown tags are significant.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_uppercase().as_str() {
            "СОЮЗ" => WordClass::Conjunction,
            "ПРЕДЛ" => WordClass::Preposition,
            "МЕЖД" => WordClass::Interjection,
            "ЧАСТ" => WordClass::Particle,
            _ => WordClass::Significant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordForms {
    pub base_forms: Vec<String>,
    pub class: WordClass,
}

pub trait Morphology: Send + Sync {
    /// `word` is already lower-cased and restricted to the target alphabet.
    fn normalize(&self, word: &str) -> WordForms;
}

lazy_static! {
    static ref RUSSIAN: Stemmer = Stemmer::create(Algorithm::Russian);
    static ref CLOSED_CLASSES: HashMap<&'static str, WordClass> = {
        let conjunctions: &[&str] = &[
            "и","а","но","или","либо","да","зато","однако","тоже","также","что","чтобы","если","когда",
            "хотя","пока","будто","словно","ибо","поэтому","потому","так","как","едва","лишь","раз",
            "причем","притом","иначе","то","нежели","чем","тогда","ежели","кабы",
        ];
        let prepositions: &[&str] = &[
            "в","во","на","с","со","к","ко","по","о","об","обо","от","ото","до","из","изо","у","за",
            "над","надо","под","подо","про","для","без","безо","при","через","между","перед","передо",
            "около","после","вокруг","среди","кроме","вместо","ради","сквозь","возле","против","мимо",
            "вдоль","внутри","вне","из-за","из-под","насчет","насчёт","благодаря","согласно","вопреки",
        ];
        let particles: &[&str] = &[
            "не","ни","же","ли","бы","б","вот","вон","даже","только","уже","ещё","еще","ведь","разве",
            "неужели","пусть","пускай","давай","именно","ж","ль","уж","лишь","почти","всего","будто",
            "-то","-ка","-таки","таки","авось","едва","вроде","якобы",
        ];
        let interjections: &[&str] = &[
            "ах","ох","эх","ой","ай","увы","ура","эй","ого","ага","фу","ух","тьфу","ну","ба","брр",
            "ау","алло","браво","ой-ой","ух-ты","батюшки","ахти","эге","ого-го","апчхи","хм","цыц",
        ];
        let mut m = HashMap::new();
        // Later inserts win, so the most specific class for ambiguous words is listed last.
        for w in particles { m.insert(*w, WordClass::Particle); }
        for w in interjections { m.insert(*w, WordClass::Interjection); }
        for w in prepositions { m.insert(*w, WordClass::Preposition); }
        for w in conjunctions { m.insert(*w, WordClass::Conjunction); }
        m
    };
}

/// Russian Snowball stemmer with a closed lexicon for auxiliary words.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnowballMorphology;

impl SnowballMorphology {
    pub fn new() -> Self { Self }
}

impl Morphology for SnowballMorphology {
    fn normalize(&self, word: &str) -> WordForms {
        let class = CLOSED_CLASSES.get(word).copied().unwrap_or(WordClass::Significant);
        let stem = RUSSIAN.stem(word).to_string();
        WordForms { base_forms: vec![stem], class }
    }
}

#[derive(Debug, Clone)]
struct Analysis {
    lemma: String,
    class: WordClass,
}

/// Dictionary-backed analyzer: one `form<TAB>lemma<TAB>tag` line per analysis.
///
/// Forms with several lines yield several base forms. Unknown forms normalize
/// to themselves and are significant.
#[derive(Debug, Default, Clone)]
pub struct DictionaryMorphology {
    forms: HashMap<String, Vec<Analysis>>,
}

impl DictionaryMorphology {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read morphology dictionary: {}", path.display()))?;
        let dict = Self::parse(&content)
            .with_context(|| format!("Failed to parse morphology dictionary: {}", path.display()))?;
        tracing::info!(forms = dict.len(), path = %path.display(), "morphology dictionary loaded");
        Ok(dict)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut forms: HashMap<String, Vec<Analysis>> = HashMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let l = line.trim();
            if l.is_empty() || l.starts_with('#') { continue; }
            let mut cols = l.split('\t');
            let (form, lemma, tag) = match (cols.next(), cols.next(), cols.next()) {
                (Some(f), Some(le), Some(t)) if !f.trim().is_empty() && !le.trim().is_empty() => (f, le, t),
                _ => bail!("line {}: expected `form<TAB>lemma<TAB>tag`", lineno + 1),
            };
            forms.entry(form.trim().to_lowercase()).or_default().push(Analysis {
                lemma: lemma.trim().to_lowercase(),
                class: WordClass::from_tag(tag),
            });
        }
        if forms.is_empty() {
            bail!("dictionary contains no word forms");
        }
        Ok(Self { forms })
    }

    pub fn len(&self) -> usize { self.forms.len() }

    pub fn is_empty(&self) -> bool { self.forms.is_empty() }
}

impl Morphology for DictionaryMorphology {
    fn normalize(&self, word: &str) -> WordForms {
        let Some(analyses) = self.forms.get(word) else {
            return WordForms { base_forms: vec![word.to_string()], class: WordClass::Significant };
        };
        let class = analyses
            .iter()
            .map(|a| a.class)
            .find(|c| c.is_auxiliary())
            .unwrap_or(WordClass::Significant);
        let mut seen = HashSet::new();
        let base_forms = analyses
            .iter()
            .filter(|a| seen.insert(a.lemma.as_str()))
            .map(|a| a.lemma.clone())
            .collect();
        WordForms { base_forms, class }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowball_classifies_closed_words() {
        let m = SnowballMorphology::new();
        assert_eq!(m.normalize("и").class, WordClass::Conjunction);
        assert_eq!(m.normalize("через").class, WordClass::Preposition);
        assert_eq!(m.normalize("ведь").class, WordClass::Particle);
        assert_eq!(m.normalize("увы").class, WordClass::Interjection);
        assert_eq!(m.normalize("кошка").class, WordClass::Significant);
    }

    #[test]
    fn snowball_folds_inflections() {
        let m = SnowballMorphology::new();
        assert_eq!(m.normalize("кошка").base_forms, m.normalize("кошки").base_forms);
    }

    #[test]
    fn dictionary_collects_every_lemma() {
        let dict = DictionaryMorphology::parse("стали\tсталь\tС\nстали\tстать\tГ\nстали\tсталь\tС\n").unwrap();
        let forms = dict.normalize("стали");
        assert_eq!(forms.base_forms, vec!["сталь".to_string(), "стать".to_string()]);
        assert_eq!(forms.class, WordClass::Significant);
    }

    #[test]
    fn dictionary_marks_ambiguous_auxiliary() {
        let dict = DictionaryMorphology::parse("что\tчто\tСОЮЗ\nчто\tчто\tМС\n").unwrap();
        assert!(dict.normalize("что").class.is_auxiliary());
    }

    #[test]
    fn dictionary_rejects_malformed_lines() {
        assert!(DictionaryMorphology::parse("кошка кошка\n").is_err());
        assert!(DictionaryMorphology::parse("# only a comment\n").is_err());
    }
}
