use crate::models::Coordinates;
use crate::normalize::{normalize_interest, slugify};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub continent: Option<String>,
    pub description: Option<String>,
    pub coordinates: Coordinates,
    pub image_url: Option<String>,
    pub population: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Location {
    pub fn new(name: String, coordinates: Coordinates) -> Self {
        let slug = slugify(&name);
        Location {
            id: Uuid::new_v4(),
            name,
            slug,
            country: None,
            region: None,
            continent: None,
            description: None,
            coordinates,
            image_url: None,
            population: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn needs_metadata(&self) -> bool {
        self.country.is_none() || self.region.is_none() || self.continent.is_none()
    }

    /// Fill only the fields that are still missing. Returns true if anything changed.
    pub fn apply_metadata(&mut self, metadata: &LocationMetadata) -> bool {
        let mut changed = false;
        changed |= fill_missing(&mut self.country, &metadata.country);
        changed |= fill_missing(&mut self.region, &metadata.region);
        changed |= fill_missing(&mut self.continent, &metadata.continent);
        changed |= fill_missing(&mut self.description, &metadata.description);
        changed
    }

    /// "Lyon, Auvergne-Rhône-Alpes, France" style label for prompts.
    pub fn display_label(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        if let Some(region) = self.region.as_deref() {
            if region != self.name {
                parts.push(region);
            }
        }
        if let Some(country) = self.country.as_deref() {
            parts.push(country);
        }
        parts.join(", ")
    }
}

fn fill_missing(target: &mut Option<String>, value: &Option<String>) -> bool {
    match (target.as_ref(), value.as_deref().map(str::trim)) {
        (None, Some(v)) if !v.is_empty() => {
            *target = Some(v.to_string());
            true
        }
        _ => false,
    }
}

/// Descriptive fields that can be filled in after a location is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LocationMetadata {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LocationMetadata {
    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.region.is_none()
            && self.continent.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Sightseeing,
    Museum,
    Nature,
    Outdoor,
    Culture,
    Nightlife,
    Shopping,
    Food,
    Beach,
    Entertainment,
    History,
    Other,
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 12] = [
        ActivityCategory::Sightseeing,
        ActivityCategory::Museum,
        ActivityCategory::Nature,
        ActivityCategory::Outdoor,
        ActivityCategory::Culture,
        ActivityCategory::Nightlife,
        ActivityCategory::Shopping,
        ActivityCategory::Food,
        ActivityCategory::Beach,
        ActivityCategory::Entertainment,
        ActivityCategory::History,
        ActivityCategory::Other,
    ];

    /// Interest keywords that select this category
    fn interest_keywords(&self) -> &'static [&'static str] {
        match self {
            ActivityCategory::Sightseeing => {
                &["sightseeing", "landmarks", "views", "photography", "architecture"]
            }
            ActivityCategory::Museum => &["museum", "museums", "art", "gallery", "galleries"],
            ActivityCategory::Nature => &["nature", "parks", "wildlife", "scenery", "hiking"],
            ActivityCategory::Outdoor => &["outdoor", "adventure", "hiking", "sports", "cycling"],
            ActivityCategory::Culture => &["culture", "cultural", "art", "theatre", "music"],
            ActivityCategory::Nightlife => &["nightlife", "bars", "clubs", "party"],
            ActivityCategory::Shopping => &["shopping", "markets", "boutiques"],
            ActivityCategory::Food => &["food", "culinary", "cuisine", "wine", "gastronomy"],
            ActivityCategory::Beach => &["beach", "beaches", "coast", "sea", "swimming"],
            ActivityCategory::Entertainment => &["entertainment", "family", "kids", "theme parks"],
            ActivityCategory::History => {
                &["history", "historic", "historical", "castles", "architecture"]
            }
            ActivityCategory::Other => &[],
        }
    }

    pub fn matches_interest(&self, interest: &str) -> bool {
        let interest = normalize_interest(interest);
        if interest.is_empty() {
            return false;
        }
        if interest == self.to_string() {
            return true;
        }
        self.interest_keywords()
            .iter()
            .any(|kw| interest == *kw || interest.contains(kw))
    }

    pub fn matches_any(&self, interests: &[String]) -> bool {
        interests.iter().any(|i| self.matches_interest(i))
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityCategory::Sightseeing => "sightseeing",
            ActivityCategory::Museum => "museum",
            ActivityCategory::Nature => "nature",
            ActivityCategory::Outdoor => "outdoor",
            ActivityCategory::Culture => "culture",
            ActivityCategory::Nightlife => "nightlife",
            ActivityCategory::Shopping => "shopping",
            ActivityCategory::Food => "food",
            ActivityCategory::Beach => "beach",
            ActivityCategory::Entertainment => "entertainment",
            ActivityCategory::History => "history",
            ActivityCategory::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ActivityCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sightseeing" | "attraction" | "landmark" => Ok(ActivityCategory::Sightseeing),
            "museum" | "gallery" => Ok(ActivityCategory::Museum),
            "nature" | "park" => Ok(ActivityCategory::Nature),
            "outdoor" | "adventure" | "sport" => Ok(ActivityCategory::Outdoor),
            "culture" | "cultural" => Ok(ActivityCategory::Culture),
            "nightlife" => Ok(ActivityCategory::Nightlife),
            "shopping" | "market" => Ok(ActivityCategory::Shopping),
            "food" | "culinary" => Ok(ActivityCategory::Food),
            "beach" => Ok(ActivityCategory::Beach),
            "entertainment" => Ok(ActivityCategory::Entertainment),
            "history" | "historic" => Ok(ActivityCategory::History),
            "other" => Ok(ActivityCategory::Other),
            _ => Err(format!("Invalid activity category: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub location_id: Uuid,
    pub name: String,
    pub category: ActivityCategory,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub duration_hours: Option<f32>,
    pub cost_estimate: Option<f32>,
    /// Rating from 0-5
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<i64>,
}

impl Activity {
    pub fn new(location_id: Uuid, name: String, category: ActivityCategory) -> Self {
        Activity {
            id: Uuid::new_v4(),
            location_id,
            name,
            category,
            description: None,
            coordinates: None,
            duration_hours: None,
            cost_estimate: None,
            rating: None,
            osm_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Uuid,
    pub location_id: Uuid,
    pub name: String,
    pub cuisine: Option<String>,
    /// 1 (cheap) to 4 (fine dining)
    pub price_level: Option<i16>,
    pub coordinates: Option<Coordinates>,
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<i64>,
}

impl Restaurant {
    pub fn new(location_id: Uuid, name: String) -> Self {
        Restaurant {
            id: Uuid::new_v4(),
            location_id,
            name,
            cuisine: None,
            price_level: None,
            coordinates: None,
            rating: None,
            osm_id: None,
        }
    }
}

/// Order activities for a prompt: interest matches first, then rating, then name.
pub fn rank_activities(mut activities: Vec<Activity>, interests: &[String]) -> Vec<Activity> {
    activities.sort_by(|a, b| {
        let a_match = a.category.matches_any(interests);
        let b_match = b.category.matches_any(interests);
        b_match
            .cmp(&a_match)
            .then_with(|| {
                b.rating
                    .unwrap_or(0.0)
                    .partial_cmp(&a.rating.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.name.cmp(&b.name))
    });
    activities
}

/// Order restaurants so the ones matching the budget's price level come first.
pub fn rank_restaurants(mut restaurants: Vec<Restaurant>, target_price: i16) -> Vec<Restaurant> {
    restaurants.sort_by(|a, b| {
        let a_gap = a.price_level.map(|p| (p - target_price).abs()).unwrap_or(2);
        let b_gap = b.price_level.map(|p| (p - target_price).abs()).unwrap_or(2);
        a_gap
            .cmp(&b_gap)
            .then_with(|| {
                b.rating
                    .unwrap_or(0.0)
                    .partial_cmp(&a.rating.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.name.cmp(&b.name))
    });
    restaurants
}
