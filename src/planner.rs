//! Heuristic response planning for detected incidents.
//!
//! The planner only recommends; it never mutates the fleet.

use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::{Fleet, FleetVehicle};
use crate::detection::{Incident, IncidentType};

/// Traffic delay above which a reroute around traffic is suggested.
pub const HIGH_TRAFFIC_MINUTES: f64 = 15.0;

/// Weather tokens (compared case-insensitively) that count as adverse.
pub const ADVERSE_WEATHER: &[&str] = &["rain", "storm", "yes", "true"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    NoAvailableVehicle,
}

impl EscalationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationReason::NoAvailableVehicle => "no_available_vehicle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReassignAction {
    #[serde(rename = "reassign_vehicle")]
    Reassign {
        vehicle_id: String,
        vehicle_type: Option<String>,
        age_years: Option<f64>,
    },
    EscalateHuman { reason: EscalationReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RerouteSuggestion {
    #[serde(rename = "reroute_avoid_high_traffic")]
    AvoidHighTraffic,
    #[serde(rename = "reroute_avoid_weather_impact")]
    AvoidWeatherImpact,
    HoldForMonitoring,
}

impl RerouteSuggestion {
    pub fn tag(self) -> &'static str {
        match self {
            RerouteSuggestion::AvoidHighTraffic => "reroute_avoid_high_traffic",
            RerouteSuggestion::AvoidWeatherImpact => "reroute_avoid_weather_impact",
            RerouteSuggestion::HoldForMonitoring => "hold_for_monitoring",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsePlan {
    pub order_id: String,
    pub incident_type: IncidentType,
    pub reassignment: ReassignAction,
    /// Never empty.
    pub reroute: Vec<RerouteSuggestion>,
}

pub struct ResponsePlanner<'f> {
    fleet: &'f Fleet,
}

impl<'f> ResponsePlanner<'f> {
    pub fn new(fleet: &'f Fleet) -> Self {
        Self { fleet }
    }

    /// Picks the youngest available vehicle that can carry the order.
    ///
    /// Capacity is compared against the order value (1 when absent). Ties on
    /// age keep fleet listing order. With no candidate the incident is
    /// escalated to a human.
    pub fn simple_reassign(&self, incident: &Incident<'_>) -> ReassignAction {
        let schema = self.fleet.schema();
        let required = incident.order.order_value.unwrap_or(1.0);

        let mut candidates: Vec<&FleetVehicle> = self
            .fleet
            .vehicles()
            .iter()
            .filter(|v| !schema.has_status || v.is_available())
            .filter(|v| !schema.has_capacity || v.capacity_kg.is_some_and(|c| c >= required))
            .collect();

        if candidates.is_empty() {
            debug!(order_id = incident.order_id(), required, "No eligible vehicle");
            return ReassignAction::EscalateHuman {
                reason: EscalationReason::NoAvailableVehicle,
            };
        }

        if schema.has_age {
            // stable: equal ages keep listing order, unknown ages sort last
            candidates.sort_by(|a, b| match (a.age_years, b.age_years) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }

        let selected = candidates[0];
        ReassignAction::Reassign {
            vehicle_id: selected.vehicle_id.clone(),
            vehicle_type: selected.vehicle_type.clone(),
            age_years: selected.age_years,
        }
    }

    pub fn suggest_reroute(&self, incident: &Incident<'_>) -> Vec<RerouteSuggestion> {
        let order = incident.order;
        let mut suggestions = Vec::new();

        if order
            .traffic_delay_minutes
            .is_some_and(|m| m > HIGH_TRAFFIC_MINUTES)
        {
            suggestions.push(RerouteSuggestion::AvoidHighTraffic);
        }

        if order.weather_impact.as_deref().is_some_and(|w| {
            let w = w.trim();
            ADVERSE_WEATHER.iter().any(|t| w.eq_ignore_ascii_case(t))
        }) {
            suggestions.push(RerouteSuggestion::AvoidWeatherImpact);
        }

        if suggestions.is_empty() {
            suggestions.push(RerouteSuggestion::HoldForMonitoring);
        }
        suggestions
    }

    /// One plan per incident, in input order.
    #[tracing::instrument(skip_all, fields(vehicles = self.fleet.vehicles().len()))]
    pub fn plan_response(&self, incidents: &[Incident<'_>]) -> Vec<ResponsePlan> {
        let plans: Vec<ResponsePlan> = incidents
            .iter()
            .map(|incident| ResponsePlan {
                order_id: incident.order_id().to_string(),
                incident_type: incident.incident_type,
                reassignment: self.simple_reassign(incident),
                reroute: self.suggest_reroute(incident),
            })
            .collect();

        let escalations = plans
            .iter()
            .filter(|p| matches!(p.reassignment, ReassignAction::EscalateHuman { .. }))
            .count();
        info!(plans = plans.len(), escalations, "Response plans generated");
        plans
    }
}
