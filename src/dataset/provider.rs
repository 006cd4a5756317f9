//! Dataset and fleet providers.
//!
//! The CSV provider reads the raw export tables, left-joins them on the order
//! identifier and maps case-insensitive column names onto [`OrderRecord`] and
//! [`FleetVehicle`].

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{CostBreakdown, Dataset, Fleet, FleetSchema, FleetVehicle, OrderRecord};
use crate::error::DatasetError;

/// Source of the unified order table and the fleet table.
pub trait DatasetProvider {
    fn load_orders(&self) -> Result<Dataset>;
    fn load_fleet(&self) -> Result<Fleet>;
}

const ORDERS_FILE: &str = "orders.csv";
const FLEET_FILE: &str = "vehicle_fleet.csv";

/// Tables joined onto `orders.csv`, in join order. Earlier tables win when two
/// tables carry the same column.
const JOINED_FILES: &[&str] = &[
    "delivery_performance.csv",
    "routes_distance.csv",
    "cost_breakdown.csv",
    "customer_feedback.csv",
];

const ORDER_ID: &[&str] = &["order_id"];
const VEHICLE_ID: &[&str] = &["vehicle_id"];

type Row = HashMap<String, String>;

struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    fn has_column(&self, aliases: &[&str]) -> bool {
        self.headers.iter().any(|h| aliases.contains(&h.as_str()))
    }
}

/// Reads the CSV export layout from a single directory.
#[derive(Debug, Clone)]
pub struct CsvDatasetProvider {
    data_dir: PathBuf,
}

impl CsvDatasetProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    fn read_optional(&self, file: &str) -> Result<Option<Table>> {
        let path = self.path(file);
        if !path.exists() {
            warn!(path = %path.display(), "Optional table not found, skipping");
            return Ok(None);
        }
        read_table(&path).map(Some)
    }
}

impl DatasetProvider for CsvDatasetProvider {
    #[tracing::instrument(skip(self), fields(data_dir = %self.data_dir.display()))]
    fn load_orders(&self) -> Result<Dataset> {
        let base = read_table(&self.path(ORDERS_FILE))?;
        if !base.has_column(ORDER_ID) {
            return Err(DatasetError::MissingIdentifierColumn {
                table: base.name,
                column: ORDER_ID[0].to_string(),
            }
            .into());
        }

        let mut rows = base.rows;
        for file in JOINED_FILES {
            let Some(table) = self.read_optional(file)? else {
                continue;
            };
            if !table.has_column(ORDER_ID) {
                warn!(table = %table.name, "Table has no order_id column, skipping join");
                continue;
            }
            left_join(&mut rows, &table);
        }

        let mut orders = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let order_id = text(row, ORDER_ID).ok_or_else(|| DatasetError::EmptyIdentifier {
                table: ORDERS_FILE.to_string(),
                row: i + 1,
            })?;
            orders.push(order_from_row(order_id, row));
        }

        let dataset = Dataset::new(orders)?;
        info!(orders = dataset.len(), "Dataset loaded");
        Ok(dataset)
    }

    #[tracing::instrument(skip(self), fields(data_dir = %self.data_dir.display()))]
    fn load_fleet(&self) -> Result<Fleet> {
        let Some(table) = self.read_optional(FLEET_FILE)? else {
            return Ok(Fleet::default());
        };
        if !table.has_column(VEHICLE_ID) {
            return Err(DatasetError::MissingIdentifierColumn {
                table: table.name,
                column: VEHICLE_ID[0].to_string(),
            }
            .into());
        }

        let schema = FleetSchema {
            has_status: table.has_column(&["status"]),
            has_capacity: table.has_column(&["capacity_kg", "capacity"]),
            has_age: table.has_column(&["age_years", "age"]),
        };

        let mut vehicles = Vec::with_capacity(table.rows.len());
        for (i, row) in table.rows.iter().enumerate() {
            let Some(vehicle_id) = text(row, VEHICLE_ID) else {
                warn!(table = %table.name, row = i + 1, "Fleet row has no vehicle_id, skipping");
                continue;
            };
            vehicles.push(FleetVehicle {
                vehicle_id,
                status: text(row, &["status"]),
                capacity_kg: number(row, &["capacity_kg", "capacity"]),
                vehicle_type: text(row, &["vehicle_type", "type"]),
                age_years: number(row, &["age_years", "age"]),
            });
        }

        info!(vehicles = vehicles.len(), ?schema, "Fleet loaded");
        Ok(Fleet::new(vehicles, schema))
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_ascii_lowercase().replace(' ', "_")
}

fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let headers: Vec<String> = rdr.headers()?.iter().map(normalize_header).collect();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("malformed row in {}", path.display()))?;
        let row: Row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|v| v.trim().to_string()))
            .collect();
        rows.push(row);
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    debug!(table = %name, rows = rows.len(), columns = headers.len(), "Table read");
    Ok(Table {
        name,
        headers,
        rows,
    })
}

/// Adds the columns of `table` to each base row with the same order id. The
/// first matching row of `table` is used; existing base columns are kept.
fn left_join(rows: &mut [Row], table: &Table) {
    let mut by_id: HashMap<&str, &Row> = HashMap::new();
    for row in &table.rows {
        if let Some(id) = row.get("order_id") {
            by_id.entry(id.as_str()).or_insert(row);
        }
    }

    for row in rows.iter_mut() {
        let Some(joined) = row.get("order_id").and_then(|id| by_id.get(id.as_str())) else {
            continue;
        };
        for (k, v) in joined.iter() {
            row.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

fn text(row: &Row, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|a| row.get(*a))
        .find(|v| !v.is_empty())
        .cloned()
}

/// Parsed numeric cell. `NaN` and infinities count as missing.
fn number(row: &Row, aliases: &[&str]) -> Option<f64> {
    text(row, aliases)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn rating(row: &Row) -> Option<u8> {
    let value = number(row, &["rating", "customer_rating"])?.round();
    (0.0..=f64::from(u8::MAX))
        .contains(&value)
        .then_some(value as u8)
}

fn order_from_row(order_id: String, row: &Row) -> OrderRecord {
    OrderRecord {
        order_id,
        customer_id: text(row, &["customer_id"]),
        order_value: number(row, &["order_value_inr", "order_value"]),
        promised_delivery_days: number(row, &["promised_delivery_days"]),
        actual_delivery_days: number(row, &["actual_delivery_days"]),
        delivery_status: text(row, &["delivery_status", "status"]),
        route: text(row, &["route"]),
        distance_km: number(row, &["distance_km"]),
        fuel_consumption_l: number(row, &["fuel_consumption_l"]),
        traffic_delay_minutes: number(row, &["traffic_delay_minutes"]),
        weather_impact: text(row, &["weather_impact"]),
        delivery_cost: number(row, &["delivery_cost_inr", "delivery_cost"]),
        rating: rating(row),
        issue_category: text(row, &["issue_category"]),
        feedback_text: text(row, &["feedback_text"]),
        costs: CostBreakdown {
            fuel: number(row, &["fuel_cost"]),
            labor: number(row, &["labor_cost"]),
            vehicle_maintenance: number(row, &["vehicle_maintenance"]),
            insurance: number(row, &["insurance"]),
            packaging: number(row, &["packaging_cost"]),
            technology_platform_fee: number(row, &["technology_platform_fee"]),
            other_overhead: number(row, &["other_overhead"]),
        },
    }
}
