//! Lexical fault classifier.
//!
//! Maps free text to at most one fault category:
//! 1. Lowercase, replace every run of non-letters with a space
//! 2. Split into words, drop English stop words
//! 3. Stem each word (Snowball English)
//! 4. Walk categories in taxonomy order; the first category with a synonym
//!    phrase occurring as a contiguous run of stemmed words wins
//!
//! Synonyms go through the same pipeline, so "brake pads" matches the
//! synonym "brake pad".

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use crate::taxonomy::{Taxonomy, TaxonomyError};

static NON_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z]+").expect("valid regex"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| STOP_WORD_LIST.iter().copied().collect());

/// English stop words. Contractions appear split, since apostrophes are
/// stripped before lookup ("don't" becomes "don" + "t").
const STOP_WORD_LIST: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will",
    "just", "don", "should", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren",
    "couldn", "didn", "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn", "mustn",
    "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn",
];

/// A category with its synonyms reduced to stemmed word sequences.
struct StemmedCategory {
    id: String,
    phrases: HashSet<Vec<String>>,
    /// Distinct phrase lengths, shortest first.
    lengths: Vec<usize>,
}

pub struct FaultClassifier {
    stemmer: Stemmer,
    categories: Vec<StemmedCategory>,
}

impl FaultClassifier {
    /// Stem the taxonomy.
    ///
    /// Fails if two categories share a stemmed synonym phrase (first-match
    /// would silently hide one of them) or a category is left with nothing
    /// but stop words.
    pub fn new(taxonomy: &Taxonomy) -> Result<Self, TaxonomyError> {
        let stemmer = Stemmer::create(Algorithm::English);
        let mut owners: HashMap<Vec<String>, String> = HashMap::new();
        let mut categories = Vec::with_capacity(taxonomy.categories().len());

        for category in taxonomy.categories() {
            let mut phrases = HashSet::new();
            for synonym in &category.synonyms {
                let phrase = tokenize(&stemmer, synonym);
                if phrase.is_empty() {
                    continue;
                }
                if let Some(first) = owners.get(&phrase) {
                    if *first != category.id {
                        return Err(TaxonomyError::OverlappingSynonym {
                            synonym: synonym.clone(),
                            category: category.id.clone(),
                            first: first.clone(),
                        });
                    }
                }
                owners.insert(phrase.clone(), category.id.clone());
                phrases.insert(phrase);
            }

            if phrases.is_empty() {
                return Err(TaxonomyError::NoSynonyms(category.id.clone()));
            }

            let mut lengths: Vec<usize> = phrases.iter().map(Vec::len).collect();
            lengths.sort_unstable();
            lengths.dedup();

            categories.push(StemmedCategory {
                id: category.id.clone(),
                phrases,
                lengths,
            });
        }

        Ok(Self {
            stemmer,
            categories,
        })
    }

    /// Classify text, returning the first matching category in taxonomy order.
    pub fn classify(&self, text: &str) -> Option<&str> {
        let words = self.tokenize(text);
        if words.is_empty() {
            return None;
        }

        self.categories
            .iter()
            .find(|category| {
                category.lengths.iter().any(|&len| {
                    len <= words.len() && words.windows(len).any(|w| category.phrases.contains(w))
                })
            })
            .map(|category| category.id.as_str())
    }

    /// Normalized, stop-word-free, stemmed words of `text`.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        tokenize(&self.stemmer, text)
    }
}

fn tokenize(stemmer: &Stemmer, text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    NON_ALPHA
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word))
        .map(|word| stemmer.stem(word).into_owned())
        .collect()
}
