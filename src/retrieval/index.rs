use serde::Serialize;
use tracing::{debug, info};

use super::RetrievalConfig;
use super::tfidf::{SparseVector, TfidfVectorizer, cosine_similarity};
use crate::dataset::{Dataset, OrderRecord};

const FIELD_SEPARATOR: &str = " | ";

/// One search hit. Borrows from the index it came from.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Retrieved<'a> {
    pub score: f64,
    pub order: &'a OrderRecord,
    pub document: &'a str,
}

/// Lexical index over one synthesized document per order.
///
/// Built once per dataset snapshot; [`RetrievalIndex::retrieve`] is read-only
/// and deterministic.
#[derive(Debug)]
pub struct RetrievalIndex<'a> {
    orders: &'a [OrderRecord],
    documents: Vec<String>,
    vectorizer: TfidfVectorizer,
    matrix: Vec<SparseVector>,
}

impl<'a> RetrievalIndex<'a> {
    #[tracing::instrument(skip_all, fields(orders = dataset.len()))]
    pub fn build(dataset: &'a Dataset, config: &RetrievalConfig) -> Self {
        let orders = dataset.orders();
        let preferred = orders.iter().any(has_preferred_text);
        if !preferred && !orders.is_empty() {
            debug!("No preferred text fields present, indexing every field");
        }

        let documents: Vec<String> = orders
            .iter()
            .map(|o| {
                let fields = if preferred {
                    preferred_fields(o)
                } else {
                    all_fields(o)
                };
                fields.join(FIELD_SEPARATOR)
            })
            .collect();

        let vectorizer = TfidfVectorizer::fit(&documents, config.max_features);
        let matrix = documents.iter().map(|d| vectorizer.transform(d)).collect();

        info!(
            documents = documents.len(),
            vocabulary = vectorizer.vocabulary_len(),
            "Retrieval index built"
        );
        Self {
            orders,
            documents,
            vectorizer,
            matrix,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document(&self, position: usize) -> Option<&str> {
        self.documents.get(position).map(String::as_str)
    }

    /// Top `top_k` documents by cosine similarity, highest first.
    ///
    /// Equal scores keep dataset order. A `top_k` larger than the corpus
    /// returns every document.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<Retrieved<'_>> {
        let query_vector = self.vectorizer.transform(query);

        let mut scored: Vec<(usize, f64)> = self
            .matrix
            .iter()
            .map(|doc| cosine_similarity(&query_vector, doc))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results: Vec<Retrieved<'_>> = scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| Retrieved {
                score,
                order: &self.orders[i],
                document: &self.documents[i],
            })
            .collect();

        debug!(
            query,
            top_k,
            returned = results.len(),
            best = results.first().map(|r| r.score),
            "Retrieved"
        );
        results
    }
}

fn has_preferred_text(order: &OrderRecord) -> bool {
    preferred_fields(order).len() > 1
}

fn num(value: Option<f64>) -> Option<String> {
    value.map(|v| v.to_string())
}

/// Order id first, then the text-bearing fields that explain an incident.
fn preferred_fields(order: &OrderRecord) -> Vec<String> {
    [
        Some(order.order_id.clone()),
        order.customer_id.clone(),
        order.issue_category.clone(),
        order.feedback_text.clone(),
        order.delivery_status.clone(),
        order.route.clone(),
        num(order.promised_delivery_days),
        num(order.actual_delivery_days),
        num(order.delay_days()),
        num(order.delivery_cost),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn all_fields(order: &OrderRecord) -> Vec<String> {
    let c = &order.costs;
    [
        Some(order.order_id.clone()),
        order.customer_id.clone(),
        num(order.order_value),
        num(order.promised_delivery_days),
        num(order.actual_delivery_days),
        order.delivery_status.clone(),
        order.route.clone(),
        num(order.distance_km),
        num(order.fuel_consumption_l),
        num(order.traffic_delay_minutes),
        order.weather_impact.clone(),
        num(order.delivery_cost),
        order.rating.map(|r| r.to_string()),
        order.issue_category.clone(),
        order.feedback_text.clone(),
        num(c.fuel),
        num(c.labor),
        num(c.vehicle_maintenance),
        num(c.insurance),
        num(c.packaging),
        num(c.technology_platform_fee),
        num(c.other_overhead),
    ]
    .into_iter()
    .flatten()
    .collect()
}
