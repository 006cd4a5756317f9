//! Incident detection over a dataset snapshot.
//!
//! Two layers feed one running [`IncidentSet`]:
//! - transparent threshold rules ([`IncidentDetector::flag_basic_incidents`])
//! - a seeded isolation forest over numeric order features
//!   ([`IncidentDetector::anomaly_detection`])
//!
//! An order is reported at most once. The first label it receives is kept, so
//! running the rules before the anomaly model means an anomaly never relabels a
//! rule-based incident.

pub mod isolation;
pub mod utility;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use crate::dataset::{Dataset, OrderRecord};
use isolation::{IsolationForestConfig, fit_predict};
use utility::{mean, stddev_sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentType {
    #[serde(rename = "Delivery Delay")]
    DeliveryDelay,
    #[serde(rename = "Low Rating / Complaint")]
    LowRating,
    #[serde(rename = "Cost Spike")]
    CostSpike,
    #[serde(rename = "Anomaly")]
    Anomaly,
}

impl IncidentType {
    /// Order in which rule labels win when one order trips several rules.
    pub const RULE_PRIORITY: [IncidentType; 3] = [
        IncidentType::DeliveryDelay,
        IncidentType::LowRating,
        IncidentType::CostSpike,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IncidentType::DeliveryDelay => "Delivery Delay",
            IncidentType::LowRating => "Low Rating / Complaint",
            IncidentType::CostSpike => "Cost Spike",
            IncidentType::Anomaly => "Anomaly",
        }
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A flagged order. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Incident<'a> {
    pub order: &'a OrderRecord,
    pub incident_type: IncidentType,
}

impl<'a> Incident<'a> {
    pub fn new(order: &'a OrderRecord, incident_type: IncidentType) -> Self {
        Self {
            order,
            incident_type,
        }
    }

    pub fn order_id(&self) -> &'a str {
        &self.order.order_id
    }
}

/// Insertion-ordered incidents, unique by order id.
#[derive(Debug, Clone, Default)]
pub struct IncidentSet<'a> {
    incidents: Vec<Incident<'a>>,
    seen: HashSet<&'a str>,
}

impl<'a> IncidentSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `incident` unless its order is already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, incident: Incident<'a>) -> bool {
        if !self.seen.insert(incident.order_id()) {
            return false;
        }
        self.incidents.push(incident);
        true
    }

    /// Deduplicating union; existing labels are never replaced.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Incident<'a>>) -> usize {
        incoming
            .into_iter()
            .filter(|i| self.insert(*i))
            .count()
    }

    pub fn get(&self, order_id: &str) -> Option<&Incident<'a>> {
        self.incidents.iter().find(|i| i.order_id() == order_id)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.seen.contains(order_id)
    }

    pub fn as_slice(&self) -> &[Incident<'a>] {
        &self.incidents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Incident<'a>> {
        self.incidents.iter()
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}

/// Thresholds for the rule layer and parameters for the anomaly layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Orders delayed strictly more than this many days are flagged.
    pub delay_threshold_days: f64,
    /// Ratings at or below this value count as complaints.
    pub low_rating_max: u8,
    /// Cost spike when total cost exceeds mean + `cost_spike_sigma` * stddev.
    pub cost_spike_sigma: f64,
    pub anomaly: IsolationForestConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            delay_threshold_days: 2.0,
            low_rating_max: 2,
            cost_spike_sigma: 2.0,
            anomaly: IsolationForestConfig::default(),
        }
    }
}

pub struct IncidentDetector<'a> {
    dataset: &'a Dataset,
    config: DetectionConfig,
    incidents: IncidentSet<'a>,
}

impl<'a> IncidentDetector<'a> {
    pub fn new(dataset: &'a Dataset, config: DetectionConfig) -> Self {
        Self {
            dataset,
            config,
            incidents: IncidentSet::new(),
        }
    }

    /// Applies the rule layer with the given delay threshold.
    ///
    /// Returns this pass's incidents, deduplicated with [`IncidentType::RULE_PRIORITY`]
    /// deciding the label, and unions them into the running set.
    #[tracing::instrument(skip(self), fields(orders = self.dataset.len()))]
    pub fn flag_basic_incidents(&mut self, delay_threshold: f64) -> Vec<Incident<'a>> {
        let cost_threshold = self.cost_spike_threshold();
        let dataset: &'a Dataset = self.dataset;
        let orders = dataset.orders();

        let mut pass = IncidentSet::new();
        for rule in IncidentType::RULE_PRIORITY {
            let matched = orders
                .iter()
                .filter(|o| self.matches(rule, o, delay_threshold, cost_threshold))
                .map(|o| Incident::new(o, rule));
            let added = pass.merge(matched);
            debug!(rule = %rule, added, "Rule applied");
        }

        let flagged = pass.incidents;
        let new = self.incidents.merge(flagged.iter().copied());
        info!(
            flagged = flagged.len(),
            new,
            running = self.incidents.len(),
            cost_threshold = ?cost_threshold,
            "Basic incident pass complete"
        );
        flagged
    }

    /// Runs the isolation forest and labels its outliers as anomalies.
    ///
    /// Returns every order the model flags. Only orders not already in the
    /// running set are added to it.
    #[tracing::instrument(skip(self), fields(orders = self.dataset.len()))]
    pub fn anomaly_detection(&mut self) -> Vec<Incident<'a>> {
        let dataset: &'a Dataset = self.dataset;
        let orders = dataset.orders();
        let rows: Vec<Vec<f64>> = orders.iter().map(anomaly_features).collect();
        let mask = fit_predict(&rows, &self.config.anomaly);

        let anomalies: Vec<Incident<'a>> = orders
            .iter()
            .zip(mask)
            .filter(|(_, outlier)| *outlier)
            .map(|(o, _)| Incident::new(o, IncidentType::Anomaly))
            .collect();

        let new = self.incidents.merge(anomalies.iter().copied());
        info!(
            anomalies = anomalies.len(),
            new,
            running = self.incidents.len(),
            contamination = self.config.anomaly.contamination,
            seed = self.config.anomaly.seed,
            "Anomaly pass complete"
        );
        anomalies
    }

    /// Runs the rule layer with the configured threshold, then the anomaly layer.
    pub fn run(&mut self) -> &IncidentSet<'a> {
        self.flag_basic_incidents(self.config.delay_threshold_days);
        self.anomaly_detection();
        &self.incidents
    }

    pub fn incidents(&self) -> &IncidentSet<'a> {
        &self.incidents
    }

    /// Mean + sigma * sample stddev of the current dataset's total costs.
    pub fn cost_spike_threshold(&self) -> Option<f64> {
        let costs: Vec<f64> = self
            .dataset
            .orders()
            .iter()
            .filter_map(OrderRecord::total_cost)
            .collect();
        let m = mean(&costs);
        let sd = stddev_sample(&costs, m)?;
        Some(m + self.config.cost_spike_sigma * sd)
    }

    fn matches(
        &self,
        rule: IncidentType,
        order: &OrderRecord,
        delay_threshold: f64,
        cost_threshold: Option<f64>,
    ) -> bool {
        match rule {
            IncidentType::DeliveryDelay => order.delay_days().is_some_and(|d| d > delay_threshold),
            IncidentType::LowRating => order
                .rating
                .is_some_and(|r| r <= self.config.low_rating_max),
            IncidentType::CostSpike => match (order.total_cost(), cost_threshold) {
                (Some(cost), Some(threshold)) => cost > threshold,
                _ => false,
            },
            IncidentType::Anomaly => false,
        }
    }
}

/// Numeric features for the anomaly model. Missing values count as zero.
fn anomaly_features(order: &OrderRecord) -> Vec<f64> {
    [
        order.delay_days(),
        order.delivery_cost,
        order.total_cost(),
        order.traffic_delay_minutes,
        order.distance_km,
        order.fuel_consumption_l,
    ]
    .into_iter()
    .map(|v| v.unwrap_or(0.0))
    .collect()
}
