//! Tolerant conversion of model output into a [`Plan`].
//!
//! Models drift from the requested schema in predictable ways: fenced JSON,
//! `days` nested under another key, numbers sent as strings, synonyms for
//! item kinds, prices like `"$20-30"`. Each of these is repaired here so a
//! single malformed field never costs a whole generation.

use crate::error::{AppError, Result};
use crate::models::{
    Accommodation, DayAllocation, DayKind, ItemKind, LocationMetadata, Plan, PlanDay, PlanItem,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use time::{Date, Duration};

/// What the caller asked for; used to fill and bound the parsed days.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanExpectations {
    pub start_date: Date,
    pub day_count: u32,
    /// Stay location for each day (index 0 = day 1)
    pub day_locations: Vec<String>,
    /// Location used when nothing better is known
    pub default_location: String,
}

impl PlanExpectations {
    pub fn new(start_date: Date, day_count: u32, default_location: impl Into<String>) -> Self {
        PlanExpectations {
            start_date,
            day_count,
            day_locations: Vec::new(),
            default_location: default_location.into(),
        }
    }

    /// Expectations with per-day locations taken from a day allocation.
    pub fn from_allocation(
        start_date: Date,
        day_count: u32,
        allocation: &[DayAllocation],
        default_location: impl Into<String>,
    ) -> Self {
        let mut day_locations = Vec::with_capacity(day_count as usize);
        for stay in allocation.iter().filter(|s| !s.pass_through) {
            for _ in 0..stay.days {
                day_locations.push(stay.name.clone());
            }
        }
        day_locations.truncate(day_count as usize);

        PlanExpectations {
            day_locations,
            ..Self::new(start_date, day_count, default_location)
        }
    }

    fn location_for_day(&self, day: u32) -> &str {
        (day as usize)
            .checked_sub(1)
            .and_then(|idx| self.day_locations.get(idx))
            .map(String::as_str)
            .unwrap_or(&self.default_location)
    }

    fn date_for_day(&self, day: u32) -> Option<Date> {
        self.start_date
            .checked_add(Duration::days(i64::from(day.saturating_sub(1))))
    }
}

/// Pull the outermost JSON object out of a model response.
///
/// Handles markdown code fences and prose before or after the object.
pub fn extract_json(text: &str) -> Result<Value> {
    let mut json_str = text.trim();

    if let Some(stripped) = json_str.strip_prefix("```json") {
        json_str = stripped;
    } else if let Some(stripped) = json_str.strip_prefix("```") {
        json_str = stripped;
    }
    if let Some(stripped) = json_str.trim_end().strip_suffix("```") {
        json_str = stripped;
    }
    let json_str = json_str.trim();

    if let Ok(value) = serde_json::from_str::<Value>(json_str) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let start = json_str.find('{');
    let end = json_str.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<Value>(&json_str[start..=end]).map_err(|e| {
                AppError::AiResponse(format!("Response is not valid JSON: {}", e))
            })
        }
        _ => Err(AppError::AiResponse(
            "Response contains no JSON object".to_string(),
        )),
    }
}

/// Build a [`Plan`] from a model's JSON, repairing what can be repaired.
pub fn parse_plan(value: &Value, expectations: &PlanExpectations) -> Result<Plan> {
    let raw_days = find_days(value).ok_or_else(|| {
        AppError::AiResponse("Response has no days array".to_string())
    })?;

    let mut numbered: Vec<(u32, &Map<String, Value>)> = raw_days
        .iter()
        .enumerate()
        .filter_map(|(idx, day)| {
            let obj = day.as_object()?;
            let number = first_field(obj, &["day", "day_number", "dayNumber"])
                .and_then(parse_day_number)
                .unwrap_or(idx as u32 + 1);
            Some((number, obj))
        })
        .collect();

    if numbered.is_empty() {
        return Err(AppError::AiResponse(
            "Response contains no usable days".to_string(),
        ));
    }

    numbered.sort_by_key(|(number, _)| *number);

    let mut days: Vec<PlanDay> = numbered
        .into_iter()
        .enumerate()
        .map(|(idx, (_, obj))| parse_day(idx as u32 + 1, obj, expectations))
        .collect();

    if days.len() > expectations.day_count as usize {
        tracing::debug!(
            received = days.len(),
            expected = expectations.day_count,
            "Truncating extra plan days"
        );
        days.truncate(expectations.day_count as usize);
    }

    if days.len() < expectations.day_count as usize {
        tracing::debug!(
            received = days.len(),
            expected = expectations.day_count,
            "Padding missing plan days"
        );
        let mut last_location = days
            .last()
            .map(|d| d.location.clone())
            .unwrap_or_else(|| expectations.default_location.clone());
        for number in days.len() as u32 + 1..=expectations.day_count {
            if last_location.is_empty() {
                last_location = expectations.location_for_day(number).to_string();
            }
            days.push(PlanDay {
                day: number,
                date: expectations.date_for_day(number),
                location: last_location.clone(),
                kind: DayKind::Stay,
                items: Vec::new(),
                accommodation: None,
            });
        }
    }

    let summary = first_field_obj(value, &["summary", "overview", "description"])
        .and_then(as_text)
        .unwrap_or_default();

    let tips = first_field_obj(value, &["tips", "travel_tips", "advice"])
        .map(parse_string_list)
        .unwrap_or_default();

    let location_metadata = first_field_obj(value, &["location_metadata", "locations"])
        .and_then(Value::as_object)
        .map(parse_location_metadata)
        .unwrap_or_default();

    let total_cost_estimate = first_field_obj(
        value,
        &["total_cost_estimate", "total_cost", "estimated_total_cost", "budget_estimate"],
    )
    .and_then(parse_cost);

    Ok(Plan::new(days, summary, tips, location_metadata, total_cost_estimate))
}

fn find_days(value: &Value) -> Option<&Vec<Value>> {
    if let Some(days) = value.as_array() {
        return Some(days);
    }
    let obj = value.as_object()?;
    if let Some(days) = obj.get("days").and_then(Value::as_array) {
        return Some(days);
    }
    for key in ["itinerary", "plan", "trip"] {
        match obj.get(key) {
            Some(Value::Array(days)) => return Some(days),
            Some(nested @ Value::Object(_)) => {
                if let Some(days) = find_days(nested) {
                    return Some(days);
                }
            }
            _ => {}
        }
    }
    None
}

fn first_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn first_field_obj<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    value.as_object().and_then(|obj| first_field(obj, keys))
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn parse_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        other => as_text(other).into_iter().collect(),
    }
}

/// `3`, `"3"`, `"Day 3"` → 3
fn parse_day_number(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    };
    number.filter(|n| *n > 0)
}

fn parse_day(number: u32, obj: &Map<String, Value>, expectations: &PlanExpectations) -> PlanDay {
    let location = first_field(obj, &["location", "city", "place", "destination"])
        .and_then(as_text)
        .unwrap_or_else(|| expectations.location_for_day(number).to_string());

    let kind = match first_field(obj, &["type", "kind", "day_type"])
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .as_deref()
    {
        Some("travel" | "transit" | "drive" | "driving" | "journey" | "travel_day") => {
            DayKind::Travel
        }
        _ => DayKind::Stay,
    };

    let items = first_field(obj, &["items", "activities", "schedule", "events"])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(parse_item)
                .collect()
        })
        .unwrap_or_default();

    let accommodation = first_field(obj, &["accommodation", "hotel", "lodging"])
        .and_then(parse_accommodation);

    PlanDay {
        day: number,
        date: expectations.date_for_day(number),
        location,
        kind,
        items,
        accommodation,
    }
}

fn parse_item(obj: &Map<String, Value>) -> Option<PlanItem> {
    let title = first_field(obj, &["title", "name", "activity"]).and_then(as_text)?;

    let kind = first_field(obj, &["type", "kind", "category"])
        .and_then(Value::as_str)
        .map(parse_item_kind)
        .unwrap_or(ItemKind::Activity);

    Some(PlanItem {
        time: first_field(obj, &["time", "start_time", "startTime"])
            .and_then(Value::as_str)
            .and_then(parse_time),
        title,
        kind,
        description: first_field(obj, &["description", "details", "notes"]).and_then(as_text),
        duration_hours: first_field(obj, &["duration_hours", "duration", "hours"])
            .and_then(parse_cost),
        cost_estimate: first_field(obj, &["cost_estimate", "cost", "price", "estimated_cost"])
            .and_then(parse_cost),
        location: first_field(obj, &["location", "place", "venue"]).and_then(as_text),
    })
}

fn parse_item_kind(raw: &str) -> ItemKind {
    match raw.trim().to_lowercase().as_str() {
        "meal" | "food" | "breakfast" | "brunch" | "lunch" | "dinner" | "restaurant" | "cafe"
        | "snack" | "dining" => ItemKind::Meal,
        "travel" | "transport" | "transit" | "drive" | "driving" | "transfer" | "flight"
        | "train" | "bus" | "ferry" => ItemKind::Travel,
        _ => ItemKind::Activity,
    }
}

fn parse_accommodation(value: &Value) -> Option<Accommodation> {
    match value {
        Value::String(name) if !name.trim().is_empty() => Some(Accommodation {
            name: name.trim().to_string(),
            kind: None,
            cost_per_night: None,
        }),
        Value::Object(obj) => Some(Accommodation {
            name: first_field(obj, &["name", "title"]).and_then(as_text)?,
            kind: first_field(obj, &["type", "kind"]).and_then(as_text),
            cost_per_night: first_field(obj, &["cost_per_night", "price_per_night", "cost", "price"])
                .and_then(parse_cost),
        }),
        _ => None,
    }
}

fn parse_location_metadata(obj: &Map<String, Value>) -> HashMap<String, LocationMetadata> {
    obj.iter()
        .filter_map(|(name, entry)| {
            let entry = entry.as_object()?;
            let field = |key: &str| entry.get(key).and_then(as_text);
            let metadata = LocationMetadata {
                country: field("country"),
                region: field("region"),
                continent: field("continent"),
                description: field("description"),
            };
            (!name.trim().is_empty() && !metadata.is_empty())
                .then(|| (name.trim().to_string(), metadata))
        })
        .collect()
}

/// Normalise a model-written time to 24h `HH:MM`.
///
/// Accepts `14:30`, `9:05`, `9:05 am`, `2pm` and `2 PM`.
pub fn parse_time(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let (clock, meridiem) = if let Some(rest) = lower.strip_suffix("am") {
        (rest.trim(), Some(false))
    } else if let Some(rest) = lower.strip_suffix("pm") {
        (rest.trim(), Some(true))
    } else {
        (lower.as_str(), None)
    };

    let parts: Vec<&str> = clock.split(':').map(str::trim).collect();
    let (hour, minute) = match parts.as_slice() {
        [h] if meridiem.is_some() => (h.parse::<u32>().ok()?, 0),
        [h, m] => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        // Seconds are dropped
        [h, m, sec] if sec.parse::<u32>().is_ok_and(|sec| sec < 60) => {
            (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)
        }
        _ => return None,
    };

    let hour = match meridiem {
        Some(_) if hour == 0 || hour > 12 => return None,
        Some(false) if hour == 12 => 0,
        Some(true) if hour < 12 => hour + 12,
        _ => hour,
    };

    (hour < 24 && minute < 60).then(|| format!("{:02}:{:02}", hour, minute))
}

/// Read a non-negative amount from a number or text like `"$25"`,
/// `"20-30 EUR"` (midpoint) or `"free"`. Negative amounts, numeric or
/// written like `"-5"`, are rejected.
pub fn parse_cost(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_cost_text(s),
        _ => None,
    }?;
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

fn parse_cost_text(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let numbers = extract_numbers(&lower);

    if numbers.iter().any(|n| *n < 0.0) {
        return None;
    }

    match numbers.as_slice() {
        [] if lower.contains("free") => Some(0.0),
        [] => None,
        [single] => Some(*single),
        [low, high, ..] => {
            let is_range = lower.contains('-') || lower.contains('–') || lower.contains(" to ");
            if is_range {
                Some((low + high) / 2.0)
            } else {
                Some(*low)
            }
        }
    }
}

fn extract_numbers(text: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    // A dash before the first number is a sign; after one it separates a range.
    let mut negative = false;

    for c in text.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() || (c == '.' && !current.is_empty()) {
            if current.is_empty() && negative {
                current.push('-');
                negative = false;
            }
            current.push(c);
        } else if c == '-' && current.is_empty() && numbers.is_empty() {
            negative = true;
        } else if c == ',' && !current.is_empty() {
            // Thousands separator
            continue;
        } else if !current.is_empty() {
            if let Ok(n) = current.trim_end_matches('.').parse::<f64>() {
                numbers.push(n);
            }
            current.clear();
        } else if c.is_alphabetic() {
            negative = false;
        }
    }
    numbers
}
