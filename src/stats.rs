use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataset::Dataset;
use crate::detection::utility::mean;

/// Headline KPIs for a dataset snapshot.
#[derive(Debug, Default, Serialize)]
pub struct DatasetStats {
    pub timestamp: DateTime<Utc>,
    pub total_orders: usize,

    pub low_rating_orders: usize,
    pub rated_orders: usize,
    pub delayed_orders: usize,
    pub with_delivery_times: usize,

    pub with_total_cost: usize,
    pub avg_total_cost: f64,
}

impl DatasetStats {
    pub fn from_dataset(dataset: &Dataset, low_rating_max: u8) -> Self {
        let mut s = DatasetStats {
            timestamp: Utc::now(),
            total_orders: dataset.len(),
            ..Default::default()
        };

        let mut costs = Vec::new();

        for order in dataset.orders() {
            if let Some(rating) = order.rating {
                s.rated_orders += 1;

                if rating <= low_rating_max {
                    s.low_rating_orders += 1;
                }
            }

            if order.delay_days().is_some() {
                s.with_delivery_times += 1;

                if order.is_delayed() {
                    s.delayed_orders += 1;
                }
            }

            if let Some(cost) = order.total_cost() {
                costs.push(cost);
            }
        }

        s.with_total_cost = costs.len();
        s.avg_total_cost = mean(&costs);
        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn delayed_pct(&self) -> f64 {
        Self::pct(self.delayed_orders, self.with_delivery_times)
    }

    pub fn low_rating_pct(&self) -> f64 {
        Self::pct(self.low_rating_orders, self.rated_orders)
    }
}
