//! Prompt assembly for itinerary generation.
//!
//! The user prompt is a list of sections with a priority. When the rendered
//! prompt exceeds the character budget, optional sections are dropped from
//! the lowest priority up and activity lists are shortened last. The trip
//! header, the day allocation and the response schema are always kept.

use super::GenerationMode;
use crate::models::{
    Activity, DayAllocation, Location, OvernightStop, Restaurant, RouteInfo, TripRequest,
    Waypoint,
};
use crate::services::overpass::{OsmPlace, OsmPlaceKind};
use std::fmt::Write;

/// Everything known about a trip before the model is asked for a plan.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub request: TripRequest,
    pub origin: Location,
    pub stops: Vec<Location>,
    pub destination: Location,
    pub route: RouteInfo,
    pub allocation: Vec<DayAllocation>,
    pub stays: Vec<StayDetails>,
    pub waypoints: Vec<Waypoint>,
    pub route_pois: Vec<OsmPlace>,
    pub overnight_stops: Vec<OvernightStop>,
}

/// Activities and restaurants of one stay location, already ranked.
#[derive(Debug, Clone)]
pub struct StayDetails {
    pub location: Location,
    pub activities: Vec<Activity>,
    pub restaurants: Vec<Restaurant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
    /// Section titles that did not fit the budget
    pub dropped: Vec<&'static str>,
    /// Activities listed per stay after trimming
    pub activities_per_stay: usize,
}

impl BuiltPrompt {
    pub fn len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }
}

const SYSTEM_PROMPT: &str = "You are an experienced travel planner. \
You build realistic day-by-day itineraries from the facts you are given. \
Prefer the listed activities and restaurants over invented ones, keep daily \
schedules feasible for the transport mode, and respect the budget level. \
Always answer with one JSON object and nothing else.";

const PRO_SYSTEM_ADDENDUM: &str = " For long travel days, plan stops at the \
suggested waypoints or overnight locations, balance sightseeing with rest, \
and include practical tips about transport, reservations and local customs.";

const RESPONSE_SCHEMA: &str = r#"Respond with a single JSON object of this shape:
{
  "summary": "two or three sentences",
  "days": [
    {
      "day": 1,
      "date": "YYYY-MM-DD",
      "location": "city name",
      "type": "stay | travel",
      "items": [
        {
          "time": "HH:MM",
          "title": "what happens",
          "type": "activity | meal | travel",
          "description": "one sentence",
          "duration_hours": 2,
          "cost_estimate": 20,
          "location": "place name"
        }
      ],
      "accommodation": {"name": "hotel name", "type": "hotel", "cost_per_night": 120}
    }
  ],
  "tips": ["short practical tip"],
  "location_metadata": {
    "city name": {"country": "", "region": "", "continent": "", "description": ""}
  },
  "total_cost_estimate": 1500
}
Costs are per person in EUR. Produce exactly one entry per day."#;

/// Drop order for optional sections; lower drops first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    RoutePois = 0,
    Waypoints = 1,
    OvernightStops = 2,
    Restaurants = 3,
    Activities = 4,
    Required = 5,
}

struct Section {
    title: &'static str,
    priority: Priority,
    body: String,
}

impl Section {
    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "## {}", self.title);
        out.push_str(self.body.trim_end());
        out.push_str("\n\n");
    }
}

fn render(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        section.render(&mut out);
    }
    out.trim_end().to_string()
}

fn system_prompt(mode: GenerationMode) -> String {
    if mode.is_pro() {
        format!("{}{}", SYSTEM_PROMPT, PRO_SYSTEM_ADDENDUM)
    } else {
        SYSTEM_PROMPT.to_string()
    }
}

fn trip_header(context: &PlanContext) -> String {
    let request = &context.request;
    let mut body = String::new();

    let _ = writeln!(body, "From: {}", context.origin.display_label());
    for stop in &context.stops {
        let _ = writeln!(body, "Stop: {}", stop.display_label());
    }
    let _ = writeln!(body, "To: {}", context.destination.display_label());
    let _ = writeln!(
        body,
        "Dates: {} to {} ({} days)",
        request.start_date,
        request.end_date,
        request.day_count()
    );
    let _ = writeln!(body, "Transport: {}", request.transport_mode);
    let _ = writeln!(body, "Budget: {}", request.budget);
    if !request.interests.is_empty() {
        let _ = writeln!(body, "Interests: {}", request.interests.join(", "));
    }

    let route = &context.route;
    let _ = writeln!(
        body,
        "Route: {:.0} km, about {:.1} h of travel",
        route.total_distance_km, route.total_duration_hours
    );
    for leg in &route.legs {
        let _ = writeln!(
            body,
            "- {} -> {}: {:.0} km, {:.1} h",
            leg.from, leg.to, leg.distance_km, leg.duration_hours
        );
    }
    body
}

fn allocation_section(allocation: &[DayAllocation]) -> String {
    let mut body = String::new();
    for stay in allocation {
        if stay.pass_through {
            let _ = writeln!(body, "- {}: pass through, no overnight stay", stay.name);
        } else if stay.days == 1 {
            let _ = writeln!(body, "- {}: day {}", stay.name, stay.start_day);
        } else {
            let _ = writeln!(
                body,
                "- {}: days {}-{}",
                stay.name,
                stay.start_day,
                stay.start_day + stay.days - 1
            );
        }
    }
    body
}

fn activities_section(stays: &[StayDetails], per_stay: usize) -> String {
    let mut body = String::new();
    for stay in stays.iter().filter(|s| !s.activities.is_empty()) {
        let _ = writeln!(body, "{}:", stay.location.name);
        for activity in stay.activities.iter().take(per_stay) {
            let _ = write!(body, "- {} ({})", activity.name, activity.category);
            if let Some(hours) = activity.duration_hours {
                let _ = write!(body, ", {:.1} h", hours);
            }
            if let Some(cost) = activity.cost_estimate {
                let _ = write!(body, ", ~{:.0} EUR", cost);
            }
            body.push('\n');
        }
    }
    body
}

fn restaurants_section(stays: &[StayDetails]) -> String {
    let mut body = String::new();
    for stay in stays.iter().filter(|s| !s.restaurants.is_empty()) {
        let _ = writeln!(body, "{}:", stay.location.name);
        for restaurant in &stay.restaurants {
            let _ = write!(body, "- {}", restaurant.name);
            if let Some(ref cuisine) = restaurant.cuisine {
                let _ = write!(body, " ({})", cuisine);
            }
            if let Some(price) = restaurant.price_level {
                let _ = write!(body, " {}", "€".repeat(price.clamp(1, 4) as usize));
            }
            body.push('\n');
        }
    }
    body
}

fn waypoints_section(waypoints: &[Waypoint]) -> String {
    let mut body = String::new();
    for waypoint in waypoints {
        let _ = writeln!(
            body,
            "- {} (detour {:.0} km, {:.0} km from start)",
            waypoint.location.display_label(),
            waypoint.detour_km,
            waypoint.distance_from_start_km
        );
    }
    body
}

fn overnight_section(stops: &[OvernightStop]) -> String {
    let mut body = String::new();
    for stop in stops {
        let near = stop
            .nearest_location
            .as_deref()
            .map(|n| format!(" near {}", n))
            .unwrap_or_default();
        let _ = writeln!(
            body,
            "- night {}: around km {:.0}{}",
            stop.night, stop.distance_from_start_km, near
        );
    }
    body
}

fn route_pois_section(pois: &[OsmPlace]) -> String {
    let mut body = String::new();
    for poi in pois {
        let label = match &poi.kind {
            OsmPlaceKind::Activity(category) => category.to_string(),
            OsmPlaceKind::Restaurant { .. } => "food".to_string(),
        };
        let _ = writeln!(body, "- {} ({})", poi.name, label);
    }
    body
}

fn sections_for(context: &PlanContext, activities_per_stay: usize) -> Vec<Section> {
    let mut sections = vec![
        Section {
            title: "Trip",
            priority: Priority::Required,
            body: trip_header(context),
        },
        Section {
            title: "Day allocation",
            priority: Priority::Required,
            body: allocation_section(&context.allocation),
        },
    ];

    let optional = [
        (
            "Activities",
            Priority::Activities,
            activities_section(&context.stays, activities_per_stay),
        ),
        (
            "Restaurants",
            Priority::Restaurants,
            restaurants_section(&context.stays),
        ),
        (
            "Overnight stops",
            Priority::OvernightStops,
            overnight_section(&context.overnight_stops),
        ),
        (
            "Worthwhile detours",
            Priority::Waypoints,
            waypoints_section(&context.waypoints),
        ),
        (
            "Along the route",
            Priority::RoutePois,
            route_pois_section(&context.route_pois),
        ),
    ];
    sections.extend(
        optional
            .into_iter()
            .filter(|(_, _, body)| !body.trim().is_empty())
            .map(|(title, priority, body)| Section {
                title,
                priority,
                body,
            }),
    );

    sections.push(Section {
        title: "Response format",
        priority: Priority::Required,
        body: RESPONSE_SCHEMA.to_string(),
    });
    sections
}

/// Render the prompt for `context`, fitting it into `max_chars` when possible.
pub fn build_prompt(context: &PlanContext, mode: GenerationMode, max_chars: usize) -> BuiltPrompt {
    let system = system_prompt(mode);
    let budget = max_chars.saturating_sub(system.chars().count());

    let mut activities_per_stay = context
        .stays
        .iter()
        .map(|s| s.activities.len())
        .max()
        .unwrap_or(0);
    let mut sections = sections_for(context, activities_per_stay);
    let mut dropped = Vec::new();
    let mut user = render(&sections);

    // Drop whole sections below the activity lists
    while user.chars().count() > budget {
        let Some(idx) = sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.priority < Priority::Activities)
            .min_by_key(|(_, s)| s.priority)
            .map(|(idx, _)| idx)
        else {
            break;
        };
        dropped.push(sections.remove(idx).title);
        user = render(&sections);
    }

    // Then shorten activity lists, halving each round
    while user.chars().count() > budget && activities_per_stay > 0 {
        activities_per_stay /= 2;
        let body = activities_section(&context.stays, activities_per_stay);
        match sections
            .iter()
            .position(|s| s.priority == Priority::Activities)
        {
            Some(idx) if body.trim().is_empty() => {
                dropped.push(sections.remove(idx).title);
            }
            Some(idx) => sections[idx].body = body,
            None => break,
        }
        user = render(&sections);
    }

    if user.chars().count() > budget {
        tracing::warn!(
            prompt_chars = user.chars().count(),
            budget,
            "Required prompt sections exceed the budget"
        );
    }

    if !dropped.is_empty() {
        tracing::debug!(?dropped, activities_per_stay, "Trimmed prompt to fit budget");
    }

    BuiltPrompt {
        system,
        user,
        dropped,
        activities_per_stay,
    }
}

/// Prompt asking for descriptive metadata of a single place.
pub fn metadata_prompt(name: &str, country_hint: Option<&str>) -> (String, String) {
    let system = "You are a geography assistant. Answer with one JSON object and nothing else."
        .to_string();
    let place = match country_hint {
        Some(country) if !country.trim().is_empty() => format!("{} ({})", name, country.trim()),
        _ => name.to_string(),
    };
    let user = format!(
        "Give facts about the place \"{}\" as JSON: \
         {{\"country\": string, \"region\": string, \"continent\": string, \
         \"description\": \"one or two sentences for travellers\"}}. \
         Use null for anything you do not know.",
        place
    );
    (system, user)
}
