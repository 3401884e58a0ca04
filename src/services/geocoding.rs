use crate::constants::USER_AGENT;
use crate::error::{AppError, Result};
use crate::models::Coordinates;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const GEOCODER_TIMEOUT_SECONDS: u64 = 10;

/// A place as reported by an external geocoder.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub name: String,
    pub coordinates: Coordinates,
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2, uppercased.
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub continent: Option<String>,
    pub population: Option<i64>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the service knows no such place.
    async fn geocode(&self, query: &str) -> Result<Option<GeocodedPlace>>;
}

fn parse_coordinate_pair(lat: &str, lng: &str) -> Result<Coordinates> {
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| AppError::Geocoding(format!("Invalid latitude '{}'", lat)))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|_| AppError::Geocoding(format!("Invalid longitude '{}'", lng)))?;
    Coordinates::new(lat, lng).map_err(AppError::Geocoding)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Nominatim
// ---------------------------------------------------------------------------

pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(base_url: String) -> Self {
        NominatimClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    #[serde(default)]
    name: Option<String>,
    display_name: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

impl NominatimResult {
    fn into_place(self) -> Result<GeocodedPlace> {
        let coordinates = parse_coordinate_pair(&self.lat, &self.lon)?;
        let address = self.address.unwrap_or_default();

        let name = non_blank(self.name)
            .or_else(|| non_blank(address.city))
            .or_else(|| non_blank(address.town))
            .or_else(|| non_blank(address.village))
            .or_else(|| {
                self.display_name
                    .split(',')
                    .next()
                    .map(|s| s.trim().to_string())
            })
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::Geocoding("Nominatim result has no name".to_string()))?;

        Ok(GeocodedPlace {
            name,
            coordinates,
            country: non_blank(address.country),
            country_code: non_blank(address.country_code).map(|c| c.to_uppercase()),
            region: non_blank(address.state),
            continent: None,
            population: None,
        })
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn geocode(&self, query: &str) -> Result<Option<GeocodedPlace>> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("limit", "1"),
                ("addressdetails", "1"),
                ("accept-language", "en"),
            ])
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(GEOCODER_TIMEOUT_SECONDS))
            .send()
            .await
            .map_err(|e| AppError::Geocoding(format!("Nominatim request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Geocoding(format!(
                "Nominatim returned {}: {}",
                status, error_text
            )));
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .map_err(|e| AppError::Geocoding(format!("Failed to parse Nominatim response: {}", e)))?;

        results.into_iter().next().map(|r| r.into_place()).transpose()
    }
}

// ---------------------------------------------------------------------------
// GeoNames
// ---------------------------------------------------------------------------

pub struct GeoNamesClient {
    client: Client,
    base_url: String,
    username: String,
}

impl GeoNamesClient {
    pub fn new(base_url: String, username: String) -> Self {
        GeoNamesClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
        }
    }
}

pub fn continent_name(code: &str) -> Option<&'static str> {
    match code.trim().to_uppercase().as_str() {
        "AF" => Some("Africa"),
        "AS" => Some("Asia"),
        "EU" => Some("Europe"),
        "NA" => Some("North America"),
        "OC" => Some("Oceania"),
        "SA" => Some("South America"),
        "AN" => Some("Antarctica"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct GeoNamesResponse {
    #[serde(default)]
    geonames: Vec<GeoNamesResult>,
    #[serde(default)]
    status: Option<GeoNamesStatus>,
}

#[derive(Debug, Deserialize)]
struct GeoNamesStatus {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoNamesResult {
    name: String,
    lat: String,
    lng: String,
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    admin_name1: Option<String>,
    #[serde(default)]
    continent_code: Option<String>,
    #[serde(default)]
    population: Option<i64>,
}

impl GeoNamesResult {
    fn into_place(self) -> Result<GeocodedPlace> {
        let coordinates = parse_coordinate_pair(&self.lat, &self.lng)?;
        Ok(GeocodedPlace {
            name: self.name,
            coordinates,
            country: non_blank(self.country_name),
            country_code: non_blank(self.country_code).map(|c| c.to_uppercase()),
            region: non_blank(self.admin_name1),
            continent: self
                .continent_code
                .as_deref()
                .and_then(continent_name)
                .map(str::to_string),
            population: self.population.filter(|p| *p > 0),
        })
    }
}

#[async_trait]
impl Geocoder for GeoNamesClient {
    fn name(&self) -> &'static str {
        "geonames"
    }

    async fn geocode(&self, query: &str) -> Result<Option<GeocodedPlace>> {
        let url = format!("{}/searchJSON", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("maxRows", "1"),
                ("username", self.username.as_str()),
                ("featureClass", "P"),
                ("style", "FULL"),
            ])
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(GEOCODER_TIMEOUT_SECONDS))
            .send()
            .await
            .map_err(|e| AppError::Geocoding(format!("GeoNames request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Geocoding(format!(
                "GeoNames returned {}",
                response.status()
            )));
        }

        let body: GeoNamesResponse = response
            .json()
            .await
            .map_err(|e| AppError::Geocoding(format!("Failed to parse GeoNames response: {}", e)))?;

        // GeoNames reports quota and auth problems with HTTP 200 and a status object
        if let Some(status) = body.status {
            return Err(AppError::Geocoding(format!("GeoNames error: {}", status.message)));
        }

        body.geonames
            .into_iter()
            .next()
            .map(|r| r.into_place())
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nominatim_result_mapping() {
        let results: Vec<NominatimResult> = serde_json::from_value(json!([{
            "lat": "45.7578137",
            "lon": "4.8320114",
            "name": "",
            "display_name": "Lyon, Métropole de Lyon, Auvergne-Rhône-Alpes, France",
            "address": {
                "city": "Lyon",
                "state": "Auvergne-Rhône-Alpes",
                "country": "France",
                "country_code": "fr"
            }
        }]))
        .unwrap();

        let place = results.into_iter().next().unwrap().into_place().unwrap();
        assert_eq!(place.name, "Lyon");
        assert_eq!(place.region.as_deref(), Some("Auvergne-Rhône-Alpes"));
        assert_eq!(place.country.as_deref(), Some("France"));
        assert_eq!(place.country_code.as_deref(), Some("FR"));
        assert!(place.continent.is_none());
        assert!((place.coordinates.lat - 45.7578).abs() < 1e-3);
    }

    #[test]
    fn test_nominatim_falls_back_to_display_name() {
        let result: NominatimResult = serde_json::from_value(json!({
            "lat": "43.0",
            "lon": "1.0",
            "display_name": "Somewhere, Occitanie, France"
        }))
        .unwrap();

        assert_eq!(result.into_place().unwrap().name, "Somewhere");
    }

    #[test]
    fn test_nominatim_rejects_bad_coordinates() {
        let result: NominatimResult = serde_json::from_value(json!({
            "lat": "north",
            "lon": "1.0",
            "display_name": "Broken"
        }))
        .unwrap();

        assert!(matches!(result.into_place(), Err(AppError::Geocoding(_))));
    }

    #[test]
    fn test_geonames_result_mapping() {
        let body: GeoNamesResponse = serde_json::from_value(json!({
            "totalResultsCount": 1,
            "geonames": [{
                "name": "Kyoto",
                "lat": "35.02107",
                "lng": "135.75385",
                "countryName": "Japan",
                "countryCode": "JP",
                "adminName1": "Kyoto",
                "continentCode": "AS",
                "population": 1459640
            }]
        }))
        .unwrap();

        let place = body.geonames.into_iter().next().unwrap().into_place().unwrap();
        assert_eq!(place.name, "Kyoto");
        assert_eq!(place.country_code.as_deref(), Some("JP"));
        assert_eq!(place.continent.as_deref(), Some("Asia"));
        assert_eq!(place.population, Some(1_459_640));
    }

    #[test]
    fn test_geonames_status_object_parses() {
        let body: GeoNamesResponse = serde_json::from_value(json!({
            "status": {"message": "user account not enabled", "value": 10}
        }))
        .unwrap();
        assert!(body.geonames.is_empty());
        assert_eq!(body.status.unwrap().message, "user account not enabled");
    }

    #[test]
    fn test_continent_codes() {
        assert_eq!(continent_name("eu"), Some("Europe"));
        assert_eq!(continent_name("OC"), Some("Oceania"));
        assert_eq!(continent_name("XX"), None);
    }
}
