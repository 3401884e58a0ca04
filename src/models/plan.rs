//! Plan value object produced from a model response.
//!
//! A `Plan` is immutable once built: fields are private and every derived
//! figure (counts, costs, grouping) is computed on demand.

use crate::models::LocationMetadata;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use time::{Date, Duration};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DayKind {
    Stay,
    Travel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Activity,
    Meal,
    Travel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanItem {
    /// "HH:MM", 24h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub title: String,
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Accommodation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_night: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanDay {
    pub day: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Date>,
    pub location: String,
    pub kind: DayKind,
    pub items: Vec<PlanItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accommodation: Option<Accommodation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    days: Vec<PlanDay>,
    summary: String,
    tips: Vec<String>,
    /// Keyed by location name as the model wrote it
    location_metadata: HashMap<String, LocationMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_cost_estimate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStats {
    pub day_count: usize,
    pub travel_day_count: usize,
    pub activity_count: usize,
    pub meal_count: usize,
    pub travel_count: usize,
    pub items_cost: f64,
    pub accommodation_cost: f64,
    pub total_cost: f64,
}

impl Plan {
    pub fn new(
        days: Vec<PlanDay>,
        summary: String,
        tips: Vec<String>,
        location_metadata: HashMap<String, LocationMetadata>,
        total_cost_estimate: Option<f64>,
    ) -> Self {
        Plan {
            days,
            summary,
            tips,
            location_metadata,
            total_cost_estimate,
        }
    }

    pub fn days(&self) -> &[PlanDay] {
        &self.days
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn tips(&self) -> &[String] {
        &self.tips
    }

    pub fn location_metadata(&self) -> &HashMap<String, LocationMetadata> {
        &self.location_metadata
    }

    /// Metadata for a location name, matched case-insensitively.
    pub fn metadata_for(&self, name: &str) -> Option<&LocationMetadata> {
        self.location_metadata
            .iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(name.trim()))
            .map(|(_, metadata)| metadata)
    }

    pub fn stats(&self) -> PlanStats {
        let mut stats = PlanStats {
            day_count: self.days.len(),
            travel_day_count: 0,
            activity_count: 0,
            meal_count: 0,
            travel_count: 0,
            items_cost: 0.0,
            accommodation_cost: 0.0,
            total_cost: 0.0,
        };

        for day in &self.days {
            if day.kind == DayKind::Travel {
                stats.travel_day_count += 1;
            }
            for item in &day.items {
                match item.kind {
                    ItemKind::Activity => stats.activity_count += 1,
                    ItemKind::Meal => stats.meal_count += 1,
                    ItemKind::Travel => stats.travel_count += 1,
                }
                stats.items_cost += item.cost_estimate.unwrap_or(0.0);
            }
            if let Some(cost) = day.accommodation.as_ref().and_then(|a| a.cost_per_night) {
                stats.accommodation_cost += cost;
            }
        }

        stats.total_cost = stats.items_cost + stats.accommodation_cost;
        stats
    }

    pub fn items_by_day(&self) -> BTreeMap<u32, &[PlanItem]> {
        self.days
            .iter()
            .map(|day| (day.day, day.items.as_slice()))
            .collect()
    }

    /// Distinct location names in visit order.
    pub fn locations(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for day in &self.days {
            let name = day.location.as_str();
            if !name.is_empty() && !seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                seen.push(name);
            }
        }
        seen
    }

    /// Same plan with day `n` dated `start + (n - 1)`. Used when a stored plan
    /// is served for a trip starting on another date.
    pub fn rebased_to(mut self, start: Date) -> Plan {
        for (offset, day) in self.days.iter_mut().enumerate() {
            day.date = start.checked_add(Duration::days(offset as i64));
        }
        self
    }

    /// The model's own estimate when it gave one, otherwise the derived total.
    pub fn total_cost(&self) -> f64 {
        self.total_cost_estimate
            .unwrap_or_else(|| self.stats().total_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, kind: ItemKind, cost: Option<f64>) -> PlanItem {
        PlanItem {
            time: None,
            title: title.to_string(),
            kind,
            description: None,
            duration_hours: None,
            cost_estimate: cost,
            location: None,
        }
    }

    fn sample_plan(total_cost_estimate: Option<f64>) -> Plan {
        let days = vec![
            PlanDay {
                day: 1,
                date: None,
                location: "Paris".to_string(),
                kind: DayKind::Stay,
                items: vec![
                    item("Louvre", ItemKind::Activity, Some(22.0)),
                    item("Dinner", ItemKind::Meal, Some(40.0)),
                ],
                accommodation: Some(Accommodation {
                    name: "Hotel du Nord".to_string(),
                    kind: Some("hotel".to_string()),
                    cost_per_night: Some(120.0),
                }),
            },
            PlanDay {
                day: 2,
                date: None,
                location: "Lyon".to_string(),
                kind: DayKind::Travel,
                items: vec![
                    item("Drive to Lyon", ItemKind::Travel, Some(60.0)),
                    item("Bouchon lunch", ItemKind::Meal, None),
                ],
                accommodation: None,
            },
            PlanDay {
                day: 3,
                date: None,
                location: "lyon".to_string(),
                kind: DayKind::Stay,
                items: vec![],
                accommodation: None,
            },
        ];
        Plan::new(
            days,
            "Paris to Lyon".to_string(),
            vec!["Book ahead".to_string()],
            HashMap::new(),
            total_cost_estimate,
        )
    }

    #[test]
    fn test_rebased_to_redates_every_day() {
        let plan = sample_plan(None).rebased_to(time::macros::date!(2025 - 09 - 10));
        let dates: Vec<Option<Date>> = plan.days().iter().map(|d| d.date).collect();

        assert_eq!(
            dates,
            vec![
                Some(time::macros::date!(2025 - 09 - 10)),
                Some(time::macros::date!(2025 - 09 - 11)),
                Some(time::macros::date!(2025 - 09 - 12)),
            ]
        );
        assert_eq!(plan.days()[1].location, "Lyon");
    }

    #[test]
    fn test_stats_counts_and_costs() {
        let stats = sample_plan(None).stats();

        assert_eq!(stats.day_count, 3);
        assert_eq!(stats.travel_day_count, 1);
        assert_eq!(stats.activity_count, 1);
        assert_eq!(stats.meal_count, 2);
        assert_eq!(stats.travel_count, 1);
        assert_eq!(stats.items_cost, 122.0);
        assert_eq!(stats.accommodation_cost, 120.0);
        assert_eq!(stats.total_cost, 242.0);
    }

    #[test]
    fn test_total_cost_prefers_model_estimate() {
        assert_eq!(sample_plan(None).total_cost(), 242.0);
        assert_eq!(sample_plan(Some(900.0)).total_cost(), 900.0);
    }

    #[test]
    fn test_locations_are_distinct_in_order() {
        assert_eq!(sample_plan(None).locations(), vec!["Paris", "Lyon"]);
    }

    #[test]
    fn test_items_by_day() {
        let plan = sample_plan(None);
        let grouped = plan.items_by_day();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[&1].len(), 2);
        assert!(grouped[&3].is_empty());
    }

    #[test]
    fn test_metadata_lookup_ignores_case() {
        let mut metadata = HashMap::new();
        metadata.insert(
            "Lyon".to_string(),
            LocationMetadata {
                country: Some("France".to_string()),
                ..LocationMetadata::default()
            },
        );
        let plan = Plan::new(vec![], String::new(), vec![], metadata, None);

        assert!(plan.metadata_for("LYON").is_some());
        assert!(plan.metadata_for("Paris").is_none());
    }

    #[test]
    fn test_plan_serde_round_trip_keeps_private_fields() {
        let plan = sample_plan(Some(10.0));
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["days"].as_array().unwrap().len(), 3);
        assert_eq!(json["days"][1]["kind"], "travel");

        let back: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }
}
