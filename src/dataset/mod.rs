//! Typed order and fleet tables.
//!
//! Providers normalize whatever they read into these types, so downstream
//! components never deal with column names or casing.

pub mod provider;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::DatasetError;

pub use provider::{CsvDatasetProvider, DatasetProvider};

/// Per-order cost components. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub fuel: Option<f64>,
    pub labor: Option<f64>,
    pub vehicle_maintenance: Option<f64>,
    pub insurance: Option<f64>,
    pub packaging: Option<f64>,
    pub technology_platform_fee: Option<f64>,
    pub other_overhead: Option<f64>,
}

impl CostBreakdown {
    fn components(&self) -> [Option<f64>; 7] {
        [
            self.fuel,
            self.labor,
            self.vehicle_maintenance,
            self.insurance,
            self.packaging,
            self.technology_platform_fee,
            self.other_overhead,
        ]
    }

    /// Sum of all seven components, or `None` when any of them is missing.
    pub fn total(&self) -> Option<f64> {
        self.components().into_iter().sum()
    }
}

#[cfg(test)]
impl CostBreakdown {
    /// Every component present, with the whole cost on fuel.
    pub(crate) fn fuel_only(fuel: f64) -> Self {
        Self {
            fuel: Some(fuel),
            labor: Some(0.0),
            vehicle_maintenance: Some(0.0),
            insurance: Some(0.0),
            packaging: Some(0.0),
            technology_platform_fee: Some(0.0),
            other_overhead: Some(0.0),
        }
    }
}

/// One row of the unified order table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: Option<String>,
    pub order_value: Option<f64>,
    pub promised_delivery_days: Option<f64>,
    pub actual_delivery_days: Option<f64>,
    pub delivery_status: Option<String>,
    pub route: Option<String>,
    pub distance_km: Option<f64>,
    pub fuel_consumption_l: Option<f64>,
    pub traffic_delay_minutes: Option<f64>,
    pub weather_impact: Option<String>,
    pub delivery_cost: Option<f64>,
    pub rating: Option<u8>,
    pub issue_category: Option<String>,
    pub feedback_text: Option<String>,
    pub costs: CostBreakdown,
}

impl OrderRecord {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            ..Default::default()
        }
    }

    /// Actual minus promised delivery days. Negative when delivered early.
    pub fn delay_days(&self) -> Option<f64> {
        Some(self.actual_delivery_days? - self.promised_delivery_days?)
    }

    pub fn is_delayed(&self) -> bool {
        self.delay_days().is_some_and(|d| d > 0.0)
    }

    pub fn total_cost(&self) -> Option<f64> {
        self.costs.total()
    }
}

/// Immutable snapshot of all orders, unique by `order_id`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    orders: Vec<OrderRecord>,
}

impl Dataset {
    pub fn new(orders: Vec<OrderRecord>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::with_capacity(orders.len());
        for order in &orders {
            if !seen.insert(order.order_id.as_str()) {
                return Err(DatasetError::DuplicateOrderId(order.order_id.clone()));
            }
        }
        Ok(Self { orders })
    }

    pub fn orders(&self) -> &[OrderRecord] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&OrderRecord> {
        self.orders.iter().find(|o| o.order_id == order_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetVehicle {
    pub vehicle_id: String,
    pub status: Option<String>,
    pub capacity_kg: Option<f64>,
    pub vehicle_type: Option<String>,
    pub age_years: Option<f64>,
}

impl FleetVehicle {
    pub fn is_available(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("available"))
    }
}

/// Which optional fleet columns the provider actually supplied.
///
/// An absent column disables the planner step that depends on it; a present
/// column with a blank cell only affects that one vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetSchema {
    pub has_status: bool,
    pub has_capacity: bool,
    pub has_age: bool,
}

impl Default for FleetSchema {
    fn default() -> Self {
        Self {
            has_status: true,
            has_capacity: true,
            has_age: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fleet {
    vehicles: Vec<FleetVehicle>,
    schema: FleetSchema,
}

impl Fleet {
    pub fn new(vehicles: Vec<FleetVehicle>, schema: FleetSchema) -> Self {
        Self { vehicles, schema }
    }

    /// Builds a fleet whose schema is inferred from the values present.
    pub fn from_vehicles(vehicles: Vec<FleetVehicle>) -> Self {
        let schema = FleetSchema {
            has_status: vehicles.iter().any(|v| v.status.is_some()),
            has_capacity: vehicles.iter().any(|v| v.capacity_kg.is_some()),
            has_age: vehicles.iter().any(|v| v.age_years.is_some()),
        };
        Self { vehicles, schema }
    }

    pub fn vehicles(&self) -> &[FleetVehicle] {
        &self.vehicles
    }

    pub fn schema(&self) -> FleetSchema {
        self.schema
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}
