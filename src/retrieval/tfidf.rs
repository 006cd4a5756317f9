//! Term-frequency / inverse-document-frequency vector space.
//!
//! Vectors are sparse, sorted by term index and l2-normalized, so cosine
//! similarity reduces to a dot product.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

/// Sparse vector as `(term index, weight)` pairs sorted by term index.
pub type SparseVector = Vec<(usize, f64)>;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "becoming",
    "been", "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "but", "by", "can", "cannot", "could", "do", "done", "down", "due",
    "during", "each", "eg", "either", "else", "elsewhere", "enough", "etc", "even", "ever",
    "every", "everyone", "everything", "everywhere", "except", "few", "for", "former",
    "formerly", "from", "further", "had", "has", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "ie", "if", "in", "indeed", "into", "is", "it", "its", "itself", "last",
    "latter", "latterly", "least", "less", "ltd", "many", "may", "me", "meanwhile", "might",
    "mine", "more", "moreover", "most", "mostly", "much", "must", "my", "myself", "namely",
    "neither", "never", "nevertheless", "next", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
    "per", "perhaps", "please", "rather", "re", "same", "seem", "seemed", "seeming", "seems",
    "several", "she", "should", "since", "so", "some", "somehow", "someone", "something",
    "sometime", "sometimes", "somewhere", "still", "such", "than", "that", "the", "their",
    "them", "themselves", "then", "thence", "there", "thereafter", "thereby", "therefore",
    "therein", "thereupon", "these", "they", "this", "those", "though", "through",
    "throughout", "thru", "thus", "to", "together", "too", "toward", "towards", "under",
    "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were", "what",
    "whatever", "when", "whence", "whenever", "where", "whereafter", "whereas", "whereby",
    "wherein", "whereupon", "wherever", "whether", "which", "while", "whither", "who",
    "whoever", "whole", "whom", "whose", "why", "will", "with", "within", "without", "would",
    "yet", "you", "your", "yours", "yourself", "yourselves",
];

static STOP_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ENGLISH_STOP_WORDS.iter().copied().collect());

/// Lowercased runs of two or more word characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2 && !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Learns the vocabulary and idf weights from `documents`.
    ///
    /// Only the `max_features` most frequent terms across the corpus are kept,
    /// ties broken alphabetically. Kept terms are indexed alphabetically.
    pub fn fit<S: AsRef<str>>(documents: &[S], max_features: usize) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();

        let mut corpus_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            for t in tokens {
                *corpus_counts.entry(t.as_str()).or_default() += 1;
            }
        }

        // BTreeMap iteration is alphabetical and the sort is stable
        let mut ranked: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_features);

        let mut terms: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        terms.sort_unstable();
        let vocabulary: HashMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();

        let mut df = vec![0usize; vocabulary.len()];
        for tokens in &tokenized {
            let unique: HashSet<usize> = tokens
                .iter()
                .filter_map(|t| vocabulary.get(t).copied())
                .collect();
            for i in unique {
                df[i] += 1;
            }
        }

        let n = documents.len() as f64;
        let idf = df
            .into_iter()
            .map(|d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        Self { vocabulary, idf }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Projects `text` into the learned space. Terms outside the vocabulary are
    /// ignored; text with no known terms yields an empty vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in tokenize(text) {
            if let Some(&i) = self.vocabulary.get(&token) {
                *counts.entry(i).or_default() += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(i, tf)| (i, tf * self.idf[i]))
            .collect();

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut vector {
                *w /= norm;
            }
        }
        vector
    }
}

/// Cosine similarity of two l2-normalized sparse vectors.
pub fn cosine_similarity(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_short_tokens_and_stop_words() {
        assert_eq!(
            tokenize("The box WAS damaged, a 2-day delay on route_7!"),
            vec!["box", "damaged", "day", "delay", "route_7"]
        );
    }

    #[test]
    fn test_vocabulary_is_capped_by_corpus_frequency() {
        let docs = ["late late late", "damaged late", "damaged", "refund"];
        let v = TfidfVectorizer::fit(&docs, 2);

        assert_eq!(v.vocabulary_len(), 2);
        assert!(v.transform("refund").is_empty());
        assert_eq!(v.transform("late").len(), 1);
        assert_eq!(v.transform("damaged").len(), 1);
    }

    #[test]
    fn test_vocabulary_ties_break_alphabetically() {
        let docs = ["zebra", "apple", "mango"];
        let v = TfidfVectorizer::fit(&docs, 2);
        assert!(!v.transform("apple").is_empty());
        assert!(!v.transform("mango").is_empty());
        assert!(v.transform("zebra").is_empty());
    }

    #[test]
    fn test_vectors_are_normalized() {
        let docs = ["damaged box late", "late delivery", "refund requested"];
        let v = TfidfVectorizer::fit(&docs, 100);
        let vec = v.transform("damaged box late");
        let norm: f64 = vec.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert!((cosine_similarity(&vec, &vec) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let docs = ["late damaged", "late", "late"];
        let v = TfidfVectorizer::fit(&docs, 100);
        let vec = v.transform("late damaged");
        let late = vec.iter().find(|(i, _)| v.vocabulary["late"] == *i).unwrap().1;
        let damaged = vec.iter().find(|(i, _)| v.vocabulary["damaged"] == *i).unwrap().1;
        assert!(damaged > late);
    }

    #[test]
    fn test_empty_corpus() {
        let docs: [&str; 0] = [];
        let v = TfidfVectorizer::fit(&docs, 10);
        assert_eq!(v.vocabulary_len(), 0);
        assert!(v.transform("anything").is_empty());
    }

    #[test]
    fn test_cosine_of_disjoint_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[(0, 1.0)], &[(1, 1.0)]), 0.0);
        assert_eq!(cosine_similarity(&[], &[(1, 1.0)]), 0.0);
    }
}
