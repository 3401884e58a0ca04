use crate::constants::{MAX_INTERESTS, MAX_STOPS, MAX_TRIP_DAYS};
use crate::normalize::normalize_query;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::Date;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Car,
    Train,
    Bike,
    Flight,
    Bus,
    Mixed,
}

impl TransportMode {
    /// Directions API profile for this mode. Flights have no road geometry.
    pub fn routing_profile(&self) -> Option<&'static str> {
        match self {
            TransportMode::Car | TransportMode::Bus | TransportMode::Mixed => Some("driving"),
            // Rail geometry is approximated by the road network
            TransportMode::Train => Some("driving"),
            TransportMode::Bike => Some("cycling"),
            TransportMode::Flight => None,
        }
    }

    /// Average door-to-door speed in km/h
    pub fn average_speed_kmh(&self) -> f64 {
        match self {
            TransportMode::Car => 80.0,
            TransportMode::Bus => 65.0,
            TransportMode::Train => 100.0,
            TransportMode::Bike => 18.0,
            TransportMode::Flight => 750.0,
            TransportMode::Mixed => 80.0,
        }
    }

    /// Multiplier applied to straight-line distances when no routing API answer exists
    pub fn road_factor(&self) -> f64 {
        match self {
            TransportMode::Flight => 1.0,
            _ => 1.3,
        }
    }

    pub fn max_travel_hours_per_day(&self) -> f64 {
        match self {
            TransportMode::Car | TransportMode::Bus => 8.0,
            TransportMode::Train => 10.0,
            TransportMode::Bike => 6.0,
            TransportMode::Flight => 14.0,
            TransportMode::Mixed => 9.0,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Car => write!(f, "car"),
            TransportMode::Train => write!(f, "train"),
            TransportMode::Bike => write!(f, "bike"),
            TransportMode::Flight => write!(f, "flight"),
            TransportMode::Bus => write!(f, "bus"),
            TransportMode::Mixed => write!(f, "mixed"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "car" | "driving" | "drive" => Ok(TransportMode::Car),
            "train" | "rail" => Ok(TransportMode::Train),
            "bike" | "bicycle" | "cycling" => Ok(TransportMode::Bike),
            "flight" | "plane" | "fly" => Ok(TransportMode::Flight),
            "bus" | "coach" => Ok(TransportMode::Bus),
            "mixed" => Ok(TransportMode::Mixed),
            _ => Err(format!("Invalid transport mode: '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    Budget,
    #[default]
    Moderate,
    Luxury,
}

impl BudgetLevel {
    /// Restaurant price level (1-4) that suits this budget
    pub fn target_price_level(&self) -> i16 {
        match self {
            BudgetLevel::Budget => 1,
            BudgetLevel::Moderate => 2,
            BudgetLevel::Luxury => 4,
        }
    }
}

impl fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetLevel::Budget => write!(f, "budget"),
            BudgetLevel::Moderate => write!(f, "moderate"),
            BudgetLevel::Luxury => write!(f, "luxury"),
        }
    }
}

impl FromStr for BudgetLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "budget" | "cheap" | "low" => Ok(BudgetLevel::Budget),
            "moderate" | "mid" | "medium" => Ok(BudgetLevel::Moderate),
            "luxury" | "high" | "premium" => Ok(BudgetLevel::Luxury),
            _ => Err(format!("Invalid budget level: '{}'", s)),
        }
    }
}

// Accept the aliases on the wire too
impl<'de> Deserialize<'de> for BudgetLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRequest {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub stops: Vec<String>,
    pub start_date: Date,
    pub end_date: Date,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub budget: BudgetLevel,
    #[serde(default, deserialize_with = "deserialize_transport_mode")]
    pub transport_mode: TransportMode,
    #[serde(default)]
    pub pro_mode: bool,
}

fn deserialize_transport_mode<'de, D>(deserializer: D) -> Result<TransportMode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl TripRequest {
    /// Inclusive number of days between start and end date.
    pub fn day_count(&self) -> i64 {
        (self.end_date - self.start_date).whole_days() + 1
    }

    /// Check limits and return a cleaned copy (trimmed names, blank interests dropped).
    pub fn validate(&self) -> Result<TripRequest, String> {
        let from = normalize_query(&self.from);
        let to = normalize_query(&self.to);
        if from.is_empty() {
            return Err("from must not be empty".to_string());
        }
        if to.is_empty() {
            return Err("to must not be empty".to_string());
        }

        if self.stops.len() > MAX_STOPS {
            return Err(format!("at most {} stops are allowed", MAX_STOPS));
        }
        let stops: Vec<String> = self.stops.iter().map(|s| normalize_query(s)).collect();
        if stops.iter().any(|s| s.is_empty()) {
            return Err("stops must not be empty".to_string());
        }

        if self.end_date < self.start_date {
            return Err("end_date must not be before start_date".to_string());
        }
        let days = self.day_count();
        if !(1..=MAX_TRIP_DAYS).contains(&days) {
            return Err(format!("trip must last between 1 and {} days", MAX_TRIP_DAYS));
        }

        let interests: Vec<String> = self
            .interests
            .iter()
            .map(|i| normalize_query(i))
            .filter(|i| !i.is_empty())
            .collect();
        if interests.len() > MAX_INTERESTS {
            return Err(format!("at most {} interests are allowed", MAX_INTERESTS));
        }

        Ok(TripRequest {
            from,
            to,
            stops,
            interests,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn request() -> TripRequest {
        TripRequest {
            from: "Paris".to_string(),
            to: "Lyon".to_string(),
            stops: vec!["Dijon".to_string()],
            start_date: date!(2025 - 06 - 01),
            end_date: date!(2025 - 06 - 05),
            interests: vec!["food".to_string()],
            budget: BudgetLevel::Moderate,
            transport_mode: TransportMode::Car,
            pro_mode: false,
        }
    }

    #[test]
    fn test_day_count_is_inclusive() {
        assert_eq!(request().day_count(), 5);

        let mut same_day = request();
        same_day.end_date = same_day.start_date;
        assert_eq!(same_day.day_count(), 1);
    }

    #[test]
    fn test_validate_cleans_fields() {
        let mut req = request();
        req.from = "  Paris  ".to_string();
        req.interests = vec!["  ".to_string(), " Street  food ".to_string()];

        let cleaned = req.validate().unwrap();
        assert_eq!(cleaned.from, "Paris");
        assert_eq!(cleaned.interests, vec!["Street food"]);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let mut req = request();
        req.to = "   ".to_string();
        assert!(req.validate().is_err());

        let mut req = request();
        req.end_date = date!(2025 - 05 - 31);
        assert!(req.validate().is_err());

        let mut req = request();
        req.end_date = date!(2025 - 07 - 15);
        assert!(req.validate().is_err());

        let mut req = request();
        req.stops = vec!["A".to_string(); MAX_STOPS + 1];
        assert!(req.validate().is_err());

        let mut req = request();
        req.stops = vec!["".to_string()];
        assert!(req.validate().is_err());

        let mut req = request();
        req.interests = (0..=MAX_INTERESTS).map(|i| format!("i{}", i)).collect();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_thirty_day_trip_is_allowed() {
        let mut req = request();
        req.end_date = date!(2025 - 06 - 30);
        assert_eq!(req.day_count(), 30);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_transport_mode_from_str() {
        assert_eq!("driving".parse::<TransportMode>().unwrap(), TransportMode::Car);
        assert_eq!("PLANE".parse::<TransportMode>().unwrap(), TransportMode::Flight);
        assert_eq!("cycling".parse::<TransportMode>().unwrap(), TransportMode::Bike);
        assert_eq!("coach".parse::<TransportMode>().unwrap(), TransportMode::Bus);
        assert!("teleport".parse::<TransportMode>().is_err());
    }

    #[test]
    fn test_transport_mode_profiles() {
        assert_eq!(TransportMode::Bike.routing_profile(), Some("cycling"));
        assert_eq!(TransportMode::Train.routing_profile(), Some("driving"));
        assert_eq!(TransportMode::Flight.routing_profile(), None);
        assert_eq!(TransportMode::Flight.road_factor(), 1.0);
        assert_eq!(TransportMode::Car.road_factor(), 1.3);
    }

    #[test]
    fn test_budget_aliases() {
        assert_eq!("cheap".parse::<BudgetLevel>().unwrap(), BudgetLevel::Budget);
        assert_eq!("Medium".parse::<BudgetLevel>().unwrap(), BudgetLevel::Moderate);
        assert_eq!("premium".parse::<BudgetLevel>().unwrap(), BudgetLevel::Luxury);
        assert_eq!(BudgetLevel::default(), BudgetLevel::Moderate);
    }

    #[test]
    fn test_request_deserializes_with_defaults_and_aliases() {
        let json = r#"{
            "from": "Paris",
            "to": "Lyon",
            "start_date": "2025-06-01",
            "end_date": "2025-06-03",
            "budget": "cheap",
            "transport_mode": "driving"
        }"#;

        let req: TripRequest = serde_json::from_str(json).unwrap();
        assert!(req.stops.is_empty());
        assert_eq!(req.budget, BudgetLevel::Budget);
        assert_eq!(req.transport_mode, TransportMode::Car);
        assert!(!req.pro_mode);
        assert_eq!(req.day_count(), 3);
    }
}
