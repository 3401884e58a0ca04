use crate::models::{BudgetLevel, TripRequest};
use crate::normalize::{normalize_interest, slugify};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Normalized identity of a trip used to find reusable plans.
///
/// Two requests that only differ in interest order, interest casing or
/// whitespace produce the same signature. Stop order is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripSignature {
    pub origin: String,
    pub destination: String,
    pub stops: Vec<String>,
    pub days: i64,
    pub interests: Vec<String>,
    pub budget: BudgetLevel,
}

impl TripSignature {
    /// Build a signature from a request and the slugs its places resolved to.
    pub fn from_request(
        request: &TripRequest,
        origin_slug: &str,
        stop_slugs: &[String],
        destination_slug: &str,
    ) -> Self {
        Self::new(
            origin_slug,
            destination_slug,
            stop_slugs,
            request.day_count(),
            &request.interests,
            request.budget,
        )
    }

    pub fn new(
        origin: &str,
        destination: &str,
        stops: &[String],
        days: i64,
        interests: &[String],
        budget: BudgetLevel,
    ) -> Self {
        let mut interests: Vec<String> = interests
            .iter()
            .map(|i| normalize_interest(i))
            .filter(|i| !i.is_empty())
            .collect();
        interests.sort();
        interests.dedup();

        TripSignature {
            origin: slugify(origin),
            destination: slugify(destination),
            stops: stops.iter().map(|s| slugify(s)).collect(),
            days,
            interests,
            budget,
        }
    }

    fn canonical(&self) -> String {
        format!(
            "o={}|d={}|s={}|n={}|i={}|b={}",
            self.origin,
            self.destination,
            self.stops.join(","),
            self.days,
            self.interests.join(","),
            self.budget
        )
    }

    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        format!("plan:{:x}", hasher.finalize())
    }

    /// Same places and budget, close enough in length and interests.
    pub fn is_similar(&self, requested: &TripSignature, day_tolerance: i64, min_overlap: f64) -> bool {
        self.origin == requested.origin
            && self.destination == requested.destination
            && self.stops == requested.stops
            && self.budget == requested.budget
            && (self.days - requested.days).abs() <= day_tolerance
            && interest_overlap(&self.interests, &requested.interests) >= min_overlap
    }
}

/// |a ∩ b| / max(|a|, |b|); 1.0 when both sides are empty.
pub fn interest_overlap(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();

    let larger = a.len().max(b.len());
    if larger == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / larger as f64
}
