//! Output formatting and persistence for detection runs.
//!
//! Incidents and response plans are flattened into CSV rows; whole runs can be
//! logged as a JSON report.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

use crate::detection::Incident;
use crate::planner::{ReassignAction, ResponsePlan};
use crate::stats::DatasetStats;

#[derive(Debug, Serialize)]
pub struct IncidentRow<'a> {
    pub order_id: &'a str,
    pub incident_type: &'static str,
    pub delay_days: Option<f64>,
    pub rating: Option<u8>,
    pub total_cost: Option<f64>,
    pub traffic_delay_minutes: Option<f64>,
    pub weather_impact: Option<&'a str>,
}

impl<'a> From<&Incident<'a>> for IncidentRow<'a> {
    fn from(incident: &Incident<'a>) -> Self {
        let order = incident.order;
        Self {
            order_id: &order.order_id,
            incident_type: incident.incident_type.label(),
            delay_days: order.delay_days(),
            rating: order.rating,
            total_cost: order.total_cost(),
            traffic_delay_minutes: order.traffic_delay_minutes,
            weather_impact: order.weather_impact.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanRow<'a> {
    pub order_id: &'a str,
    pub incident_type: &'static str,
    pub action: &'static str,
    pub vehicle_id: Option<&'a str>,
    pub vehicle_type: Option<&'a str>,
    pub vehicle_age_years: Option<f64>,
    pub escalation_reason: Option<&'static str>,
    /// Reroute tags joined with `;`.
    pub reroute: String,
}

impl<'a> From<&'a ResponsePlan> for PlanRow<'a> {
    fn from(plan: &'a ResponsePlan) -> Self {
        let reroute = plan
            .reroute
            .iter()
            .map(|r| r.tag())
            .collect::<Vec<_>>()
            .join(";");

        let (action, vehicle_id, vehicle_type, vehicle_age_years, escalation_reason) =
            match &plan.reassignment {
                ReassignAction::Reassign {
                    vehicle_id,
                    vehicle_type,
                    age_years,
                } => (
                    "reassign_vehicle",
                    Some(vehicle_id.as_str()),
                    vehicle_type.as_deref(),
                    *age_years,
                    None,
                ),
                ReassignAction::EscalateHuman { reason } => {
                    ("escalate_human", None, None, None, Some(reason.as_str()))
                }
            };

        Self {
            order_id: &plan.order_id,
            incident_type: plan.incident_type.label(),
            action,
            vehicle_id,
            vehicle_type,
            vehicle_age_years,
            escalation_reason,
            reroute,
        }
    }
}

/// Snapshot of one detection run.
#[derive(Debug, Serialize)]
pub struct DetectionReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub stats: &'a DatasetStats,
    pub incidents: Vec<IncidentRow<'a>>,
    pub plans: &'a [ResponsePlan],
}

impl<'a> DetectionReport<'a> {
    pub fn new(
        stats: &'a DatasetStats,
        incidents: &[Incident<'a>],
        plans: &'a [ResponsePlan],
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            stats,
            incidents: incidents.iter().map(IncidentRow::from).collect(),
            plans,
        }
    }
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes `rows` to a fresh CSV file at `path`, replacing any existing file.
///
/// Parent directories are created as needed. Headers come from the row type.
pub fn write_records<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

pub fn write_incidents(path: impl AsRef<Path>, incidents: &[Incident<'_>]) -> Result<()> {
    let rows: Vec<IncidentRow<'_>> = incidents.iter().map(IncidentRow::from).collect();
    write_records(path, &rows)
}

pub fn write_plans(path: impl AsRef<Path>, plans: &[ResponsePlan]) -> Result<()> {
    let rows: Vec<PlanRow<'_>> = plans.iter().map(PlanRow::from).collect();
    write_records(path, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, OrderRecord};
    use crate::detection::IncidentType;
    use crate::planner::{EscalationReason, RerouteSuggestion};
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn plans() -> Vec<ResponsePlan> {
        vec![
            ResponsePlan {
                order_id: "ORD1".to_string(),
                incident_type: IncidentType::DeliveryDelay,
                reassignment: ReassignAction::Reassign {
                    vehicle_id: "V7".to_string(),
                    vehicle_type: Some("Van".to_string()),
                    age_years: Some(1.5),
                },
                reroute: vec![
                    RerouteSuggestion::AvoidHighTraffic,
                    RerouteSuggestion::AvoidWeatherImpact,
                ],
            },
            ResponsePlan {
                order_id: "ORD2".to_string(),
                incident_type: IncidentType::CostSpike,
                reassignment: ReassignAction::EscalateHuman {
                    reason: EscalationReason::NoAvailableVehicle,
                },
                reroute: vec![RerouteSuggestion::HoldForMonitoring],
            },
        ]
    }

    #[test]
    fn test_write_plans_flattens_actions() {
        let path = temp_path("liveops_test_plans.csv");
        let _ = fs::remove_file(&path);

        write_plans(&path, &plans()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            concat!(
                "order_id,incident_type,action,vehicle_id,vehicle_type,",
                "vehicle_age_years,escalation_reason,reroute"
            )
        );
        assert_eq!(
            lines[1],
            concat!(
                "ORD1,Delivery Delay,reassign_vehicle,V7,Van,1.5,,",
                "reroute_avoid_high_traffic;reroute_avoid_weather_impact"
            )
        );
        assert_eq!(
            lines[2],
            "ORD2,Cost Spike,escalate_human,,,,no_available_vehicle,hold_for_monitoring"
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_incidents_overwrites() {
        let path = temp_path("liveops_test_incidents.csv");

        let mut order = OrderRecord::new("ORD1");
        order.promised_delivery_days = Some(2.0);
        order.actual_delivery_days = Some(6.0);
        order.rating = Some(2);
        let dataset = Dataset::new(vec![order]).unwrap();
        let incidents = vec![Incident::new(&dataset.orders()[0], IncidentType::DeliveryDelay)];

        write_incidents(&path, &incidents).unwrap();
        write_incidents(&path, &incidents).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "ORD1,Delivery Delay,4.0,2,,,");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_records_creates_parent_dirs() {
        let dir = temp_path("liveops_test_nested");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("out").join("plans.csv");

        write_plans(&path, &[]).unwrap();
        assert!(path.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_report_serializes() {
        let stats = DatasetStats::default();
        let plans = plans();
        let report = DetectionReport::new(&stats, &[], &plans);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["plans"][1]["reassignment"]["action"], "escalate_human");
        assert_eq!(json["plans"][0]["reroute"][0], "reroute_avoid_high_traffic");
        assert!(json["generated_at"].is_string());
        print_json(&report).unwrap();
    }
}
