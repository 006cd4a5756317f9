//! Turns retrieval hits into an answer.
//!
//! The external synthesizer is optional and may fail or hang. Both cases end in
//! the deterministic local summary, so answering never fails.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use super::index::Retrieved;
use crate::error::SynthesisError;

const CAUSE_PREVIEW_CHARS: usize = 150;
const SUMMARY_HEADER: &str = "Based on the data, possible causes:";

/// Generates text from a prompt, typically a hosted language model.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &str) -> Result<String, SynthesisError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    /// True only when the text came back from the synthesizer.
    pub used_llm: bool,
}

pub struct AnswerGenerator {
    synthesizer: Option<Box<dyn AnswerSynthesizer>>,
    timeout: Duration,
    preview_chars: usize,
}

impl AnswerGenerator {
    pub fn new(synthesizer: Box<dyn AnswerSynthesizer>, timeout: Duration) -> Self {
        Self {
            synthesizer: Some(synthesizer),
            timeout,
            preview_chars: 500,
        }
    }

    /// A generator that always answers with the local summary.
    pub fn local_only() -> Self {
        Self {
            synthesizer: None,
            timeout: Duration::ZERO,
            preview_chars: 500,
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    #[tracing::instrument(skip(self, retrieved), fields(results = retrieved.len()))]
    pub async fn generate_answer(
        &self,
        query: &str,
        retrieved: &[Retrieved<'_>],
        use_llm: bool,
    ) -> Answer {
        let synthesizer = match &self.synthesizer {
            Some(s) if use_llm => s,
            _ => {
                return Answer {
                    text: local_summary(retrieved),
                    used_llm: false,
                };
            }
        };

        let prompt = build_prompt(query, retrieved, self.preview_chars);
        match self.synthesize(synthesizer.as_ref(), &prompt).await {
            Ok(text) => {
                info!(chars = text.len(), "Answer synthesized");
                Answer {
                    text,
                    used_llm: true,
                }
            }
            Err(e) => {
                warn!(error = %e, "Answer synthesis failed, using local summary");
                Answer {
                    text: format!(
                        "(Answer synthesis failed: {e})\nFallback:\n{}",
                        local_summary(retrieved)
                    ),
                    used_llm: false,
                }
            }
        }
    }

    async fn synthesize(
        &self,
        synthesizer: &dyn AnswerSynthesizer,
        prompt: &str,
    ) -> Result<String, SynthesisError> {
        let text = tokio::time::timeout(self.timeout, synthesizer.synthesize(prompt))
            .await
            .map_err(|_| SynthesisError::Timeout(self.timeout))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// One `Score | Order -> document` line per hit, separated by blank lines.
pub fn digest(retrieved: &[Retrieved<'_>], preview_chars: usize) -> String {
    retrieved
        .iter()
        .map(|r| {
            format!(
                "Score: {:.3} | Order {} -> {}",
                r.score,
                r.order.order_id,
                truncate_chars(r.document, preview_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(query: &str, retrieved: &[Retrieved<'_>], preview_chars: usize) -> String {
    format!(
        "You are an AI logistics operations assistant.\n\
         User query: {query}\n\n\
         Context (from database):\n{}\n\n\
         Provide a concise and factual explanation.\n\
         Include order IDs and summarise causes of delays or complaints clearly.\n",
        digest(retrieved, preview_chars)
    )
}

fn likely_cause<'r>(hit: &Retrieved<'r>) -> &'r str {
    let order = hit.order;
    [
        order.issue_category.as_deref(),
        order.feedback_text.as_deref(),
        order.delivery_status.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|s| !s.is_empty())
    .unwrap_or_else(|| truncate_chars(hit.document, CAUSE_PREVIEW_CHARS))
}

/// Deterministic summary naming each hit's order and most likely cause.
pub fn local_summary(retrieved: &[Retrieved<'_>]) -> String {
    let lines: Vec<String> = retrieved
        .iter()
        .map(|r| {
            format!(
                "- Order {}: likely cause -> {} (score {:.2})",
                r.order.order_id,
                likely_cause(r),
                r.score
            )
        })
        .collect();
    format!("{SUMMARY_HEADER}\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::OrderRecord;
    use std::sync::{Arc, Mutex};

    struct Canned(&'static str);

    #[async_trait]
    impl AnswerSynthesizer for Canned {
        async fn synthesize(&self, _prompt: &str) -> Result<String, SynthesisError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl AnswerSynthesizer for Failing {
        async fn synthesize(&self, _prompt: &str) -> Result<String, SynthesisError> {
            Err(SynthesisError::Status {
                status: 429,
                body: "quota exceeded".to_string(),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl AnswerSynthesizer for Slow {
        async fn synthesize(&self, _prompt: &str) -> Result<String, SynthesisError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    struct Recording(Arc<Mutex<Option<String>>>);

    #[async_trait]
    impl AnswerSynthesizer for Recording {
        async fn synthesize(&self, prompt: &str) -> Result<String, SynthesisError> {
            *self.0.lock().unwrap() = Some(prompt.to_string());
            Ok("ok".to_string())
        }
    }

    fn orders() -> Vec<OrderRecord> {
        let mut a = OrderRecord::new("ORD1");
        a.issue_category = Some("Damaged".to_string());
        a.feedback_text = Some("Box crushed".to_string());

        let mut b = OrderRecord::new("ORD2");
        b.issue_category = Some("  ".to_string());
        b.delivery_status = Some("Delayed".to_string());

        let c = OrderRecord::new("ORD3");
        vec![a, b, c]
    }

    fn hits<'a>(orders: &'a [OrderRecord], docs: &'a [String]) -> Vec<Retrieved<'a>> {
        orders
            .iter()
            .zip(docs)
            .zip([0.91, 0.4, 0.0])
            .map(|((order, document), score)| Retrieved {
                score,
                order,
                document,
            })
            .collect()
    }

    fn docs() -> Vec<String> {
        vec![
            "ORD1 | Damaged | Box crushed".to_string(),
            "ORD2 | Delayed".to_string(),
            "ORD3".to_string(),
        ]
    }

    #[test]
    fn test_local_summary_picks_first_non_empty_cause() {
        let orders = orders();
        let docs = docs();
        let summary = local_summary(&hits(&orders, &docs));

        assert_eq!(
            summary,
            "Based on the data, possible causes:\n\
             - Order ORD1: likely cause -> Damaged (score 0.91)\n\
             - Order ORD2: likely cause -> Delayed (score 0.40)\n\
             - Order ORD3: likely cause -> ORD3 (score 0.00)"
        );
    }

    #[test]
    fn test_digest_truncates_documents() {
        let orders = orders();
        let docs = docs();
        let digest = digest(&hits(&orders, &docs)[..1], 6);
        assert_eq!(digest, "Score: 0.910 | Order ORD1 -> ORD1 |");
    }

    #[tokio::test]
    async fn test_no_synthesizer_falls_back() {
        let orders = orders();
        let docs = docs();
        let answer = AnswerGenerator::local_only()
            .generate_answer("why late?", &hits(&orders, &docs), true)
            .await;
        assert!(!answer.used_llm);
        assert!(answer.text.starts_with(SUMMARY_HEADER));
    }

    #[tokio::test]
    async fn test_empty_retrieval_yields_valid_summary() {
        let answer = AnswerGenerator::local_only()
            .generate_answer("anything", &[], true)
            .await;
        assert!(!answer.used_llm);
        assert!(!answer.text.is_empty());
    }

    #[tokio::test]
    async fn test_synthesizer_text_is_returned() {
        let orders = orders();
        let docs = docs();
        let generator = AnswerGenerator::new(
            Box::new(Canned("  ORD1 was damaged.\n")),
            Duration::from_secs(1),
        );
        let answer = generator
            .generate_answer("why?", &hits(&orders, &docs), true)
            .await;
        assert_eq!(
            answer,
            Answer {
                text: "ORD1 was damaged.".to_string(),
                used_llm: true
            }
        );
    }

    #[tokio::test]
    async fn test_use_llm_false_skips_synthesizer() {
        let seen = Arc::new(Mutex::new(None));
        let generator =
            AnswerGenerator::new(Box::new(Recording(seen.clone())), Duration::from_secs(1));
        let answer = generator.generate_answer("why?", &[], false).await;

        assert!(!answer.used_llm);
        assert!(seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prompt_carries_query_and_digest() {
        let orders = orders();
        let docs = docs();
        let seen = Arc::new(Mutex::new(None));
        let generator =
            AnswerGenerator::new(Box::new(Recording(seen.clone())), Duration::from_secs(1));
        generator
            .generate_answer("damaged items", &hits(&orders, &docs), true)
            .await;

        let prompt = seen.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("User query: damaged items"));
        assert!(prompt.contains("Score: 0.910 | Order ORD1 -> ORD1 | Damaged | Box crushed"));
    }

    #[tokio::test]
    async fn test_failure_reason_is_embedded_in_fallback() {
        let orders = orders();
        let docs = docs();
        let generator = AnswerGenerator::new(Box::new(Failing), Duration::from_secs(1));
        let answer = generator
            .generate_answer("why?", &hits(&orders, &docs), true)
            .await;

        assert!(!answer.used_llm);
        assert!(answer.text.contains("429"));
        assert!(answer.text.contains("Fallback:\nBased on the data"));
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let generator = AnswerGenerator::new(Box::new(Slow), Duration::from_millis(20));
        let answer = generator.generate_answer("why?", &[], true).await;

        assert!(!answer.used_llm);
        assert!(answer.text.contains("did not answer within"));
    }

    #[tokio::test]
    async fn test_blank_synthesizer_output_falls_back() {
        let generator = AnswerGenerator::new(Box::new(Canned("   ")), Duration::from_secs(1));
        let answer = generator.generate_answer("why?", &[], true).await;
        assert!(!answer.used_llm);
        assert!(answer.text.contains("no text"));
    }
}
