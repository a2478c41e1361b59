use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Method, Request, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::types::PlaceDto;
use crate::fetch::HttpClient;
use crate::fetch::auth::UrlParam;
use crate::geo::{GeoPoint, decode_polyline};
use crate::services::MapsApi;

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Bias radius for text search around the given point.
const SEARCH_RADIUS_M: u32 = 10_000;

/// Google Maps Platform web services behind [`MapsApi`].
///
/// Every request carries the API key as the `key` query parameter.
pub struct GoogleMapsClient<C> {
    http: UrlParam<C>,
    base_url: String,
}

impl<C: HttpClient> GoogleMapsClient<C> {
    pub fn new(http: C, api_key: &str) -> Self {
        Self::with_base_url(http, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(http: C, api_key: &str, base_url: &str) -> Self {
        Self {
            http: UrlParam::new(http, "key", api_key),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .with_context(|| format!("invalid maps url for {path}"))?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));

        let response = self
            .http
            .execute(Request::new(Method::GET, url))
            .await
            .map_err(|e| anyhow!("Failed to send maps request: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Maps API returned status {}: {}", status, body));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse maps response: {}", e))?;
        debug!(path, status = json["status"].as_str().unwrap_or(""), "Maps response");
        Ok(json)
    }
}

#[async_trait]
impl<C: HttpClient> MapsApi for GoogleMapsClient<C> {
    async fn directions(&self, origin: GeoPoint, destination: GeoPoint) -> Result<Vec<GeoPoint>> {
        let json = self
            .get_json(
                "/directions/json",
                &[
                    ("origin", origin.to_string()),
                    ("destination", destination.to_string()),
                    ("mode", "driving".to_string()),
                ],
            )
            .await?;

        let status = json["status"].as_str().unwrap_or("UNKNOWN");
        if status != "OK" {
            return Err(anyhow!("Directions request failed: {}", status));
        }

        let encoded = json["routes"][0]["overview_polyline"]["points"]
            .as_str()
            .ok_or_else(|| anyhow!("Directions response has no overview polyline"))?;
        decode_polyline(encoded)
    }

    async fn reverse_geocode(&self, point: GeoPoint) -> Result<Option<PlaceDto>> {
        let json = self
            .get_json("/geocode/json", &[("latlng", point.to_string())])
            .await?;

        match json["status"].as_str() {
            Some("OK") => Ok(json["results"]
                .as_array()
                .and_then(|results| results.first())
                .and_then(place_from_result)),
            other => {
                warn!(%point, status = other.unwrap_or("UNKNOWN"), "Geocoder failed");
                Ok(None)
            }
        }
    }

    async fn search_places(&self, query: &str, near: Option<GeoPoint>) -> Result<Vec<PlaceDto>> {
        let mut params = vec![("query", query.to_string())];
        if let Some(near) = near {
            params.push(("location", near.to_string()));
            params.push(("radius", SEARCH_RADIUS_M.to_string()));
        }
        let json = self.get_json("/place/textsearch/json", &params).await?;

        match json["status"].as_str() {
            Some("OK") => Ok(json["results"]
                .as_array()
                .map(|results| results.iter().filter_map(place_from_result).collect())
                .unwrap_or_default()),
            Some("ZERO_RESULTS") => Ok(Vec::new()),
            other => Err(anyhow!("Place search failed: {}", other.unwrap_or("UNKNOWN"))),
        }
    }
}

/// Converts a geocoder or places result into a [`PlaceDto`]. Results
/// without an id or a location are skipped.
fn place_from_result(item: &Value) -> Option<PlaceDto> {
    let place_id = item["place_id"].as_str()?.to_string();
    let location = &item["geometry"]["location"];
    let latitude = location["lat"].as_f64()?;
    let longitude = location["lng"].as_f64()?;

    let components = item["address_components"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let component = |kind: &str| {
        components
            .iter()
            .find(|c| {
                c["types"]
                    .as_array()
                    .is_some_and(|types| types.iter().any(|t| t.as_str() == Some(kind)))
            })
            .and_then(|c| c["long_name"].as_str())
            .map(str::to_string)
    };

    let short_name = match item["name"].as_str() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => match (component("route"), component("street_number")) {
            (Some(street), Some(number)) => format!("{street} {number}"),
            (Some(street), None) => street,
            _ => String::new(),
        },
    };

    let address = components
        .iter()
        .filter(|c| {
            !c["types"].as_array().is_some_and(|types| {
                types
                    .iter()
                    .any(|t| matches!(t.as_str(), Some("country") | Some("postal_code")))
            })
        })
        .filter_map(|c| c["long_name"].as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let address = if address.is_empty() {
        item["formatted_address"].as_str().unwrap_or("").to_string()
    } else {
        address
    };

    Some(PlaceDto {
        place_id,
        address,
        short_name,
        latitude,
        longitude,
        city: component("locality").or_else(|| component("administrative_area_level_2")),
        country: component("country"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every request with the same JSON body and records URLs.
    struct Canned {
        body: Value,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for Canned {
        async fn execute(&self, req: Request) -> reqwest::Result<reqwest::Response> {
            self.seen.lock().unwrap().push(req.url().to_string());
            Ok(http::Response::builder()
                .status(200)
                .body(self.body.to_string())
                .unwrap()
                .into())
        }
    }

    fn client(body: Value) -> GoogleMapsClient<Canned> {
        GoogleMapsClient::with_base_url(
            Canned {
                body,
                seen: Mutex::new(Vec::new()),
            },
            "k3y",
            "https://maps.test/api",
        )
    }

    fn seen(client: &GoogleMapsClient<Canned>) -> Vec<String> {
        client.http.inner.seen.lock().unwrap().clone()
    }

    fn antalya() -> Value {
        json!({
            "place_id": "abc",
            "formatted_address": "Atatürk Cd. 12, 07100 Muratpaşa/Antalya, Türkiye",
            "geometry": { "location": { "lat": 36.89, "lng": 30.70 } },
            "address_components": [
                { "long_name": "12", "types": ["street_number"] },
                { "long_name": "Atatürk Caddesi", "types": ["route"] },
                { "long_name": "Antalya", "types": ["locality", "political"] },
                { "long_name": "Türkiye", "types": ["country", "political"] },
                { "long_name": "07100", "types": ["postal_code"] }
            ]
        })
    }

    #[tokio::test]
    async fn test_directions_decodes_overview_polyline() {
        let maps = client(json!({
            "status": "OK",
            "routes": [{ "overview_polyline": { "points": "_p~iF~ps|U_ulLnnqC_mqNvxq`@" } }]
        }));
        let path = maps
            .directions(GeoPoint::new(38.5, -120.2), GeoPoint::new(43.252, -126.453))
            .await
            .unwrap();

        assert_eq!(path.len(), 3);
        let url = &seen(&maps)[0];
        assert!(url.starts_with("https://maps.test/api/directions/json?"));
        assert!(url.contains("origin=38.500000%2C-120.200000"));
        assert!(url.ends_with("&key=k3y"));
    }

    #[tokio::test]
    async fn test_directions_non_ok_status_is_error() {
        let maps = client(json!({ "status": "ZERO_RESULTS", "routes": [] }));
        let err = maps
            .directions(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ZERO_RESULTS"));
    }

    #[tokio::test]
    async fn test_reverse_geocode_builds_place() {
        let maps = client(json!({ "status": "OK", "results": [antalya()] }));
        let place = maps
            .reverse_geocode(GeoPoint::new(36.89, 30.70))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(place.place_id, "abc");
        assert_eq!(place.short_name, "Atatürk Caddesi 12");
        assert_eq!(place.address, "12, Atatürk Caddesi, Antalya");
        assert_eq!(place.city.as_deref(), Some("Antalya"));
        assert_eq!(place.country.as_deref(), Some("Türkiye"));
    }

    #[tokio::test]
    async fn test_reverse_geocode_failure_is_none() {
        let maps = client(json!({ "status": "REQUEST_DENIED" }));
        assert!(maps.reverse_geocode(GeoPoint::new(0.0, 0.0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_prefers_place_name_and_biases_location() {
        let mut result = antalya();
        result["name"] = json!("Kaleiçi Marina");
        let maps = client(json!({ "status": "OK", "results": [result, { "name": "no id" }] }));

        let places = maps
            .search_places("marina", Some(GeoPoint::new(36.9, 30.7)))
            .await
            .unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].short_name, "Kaleiçi Marina");
        assert!(seen(&maps)[0].contains("radius=10000"));
    }

    #[tokio::test]
    async fn test_search_zero_results_is_empty() {
        let maps = client(json!({ "status": "ZERO_RESULTS", "results": [] }));
        assert!(maps.search_places("nowhere", None).await.unwrap().is_empty());
    }

    #[test]
    fn test_place_without_components_uses_formatted_address() {
        let place = place_from_result(&json!({
            "place_id": "p",
            "formatted_address": "Somewhere 1",
            "geometry": { "location": { "lat": 1.0, "lng": 2.0 } }
        }))
        .unwrap();
        assert_eq!(place.address, "Somewhere 1");
        assert_eq!(place.short_name, "");
    }
}
