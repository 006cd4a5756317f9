//! Order search and answer synthesis.

pub mod answer;
pub mod index;
pub mod tfidf;

use serde::{Deserialize, Serialize};

pub use answer::{Answer, AnswerGenerator, AnswerSynthesizer};
pub use index::{RetrievalIndex, Retrieved};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Vocabulary cap for the TF-IDF space.
    pub max_features: usize,
    pub top_k: usize,
    /// Characters of each document included in a synthesis prompt.
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_features: 2000,
            top_k: 3,
            preview_chars: 500,
        }
    }
}
