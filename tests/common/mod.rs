#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use telego::api::types::PlaceDto;
use telego::fetch::HttpClient;
use telego::geo::GeoPoint;
use telego::services::MapsApi;

pub const BASE_URL: &str = "https://api.telego.test";

/// A request seen by [`StubHttp`].
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct Inner {
    responses: Mutex<HashMap<(String, String), VecDeque<(u16, String)>>>,
    calls: Mutex<Vec<Call>>,
}

/// In-memory backend. Responses are queued per `(method, path)`; the last
/// queued response repeats. Unknown routes answer `404`.
#[derive(Clone, Default)]
pub struct StubHttp(Arc<Inner>);

impl StubHttp {
    pub fn on(&self, method: &str, path: &str, status: u16, body: &str) -> &Self {
        self.0
            .responses
            .lock()
            .unwrap()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back((status, body.to_string()));
        self
    }

    pub fn on_json(&self, method: &str, path: &str, status: u16, body: Value) -> &Self {
        self.on(method, path, status, &body.to_string())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }
}

#[async_trait]
impl HttpClient for StubHttp {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let method = req.method().to_string();
        let path = req.url().path().to_string();
        let body = req
            .body()
            .and_then(|b| b.as_bytes())
            .and_then(|b| serde_json::from_slice(b).ok());
        let authorization = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.0.calls.lock().unwrap().push(Call {
            method: method.clone(),
            path: path.clone(),
            authorization,
            body,
        });

        let (status, body) = {
            let mut responses = self.0.responses.lock().unwrap();
            match responses.get_mut(&(method, path)) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => (404, String::new()),
            }
        };
        Ok(http::Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
            .into())
    }
}

/// Maps provider answering with straight three-point paths.
#[derive(Default)]
pub struct StubMaps {
    pub fail_directions: bool,
    pub directions_calls: AtomicUsize,
}

impl StubMaps {
    pub fn directions_calls(&self) -> usize {
        self.directions_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MapsApi for StubMaps {
    async fn directions(&self, origin: GeoPoint, destination: GeoPoint) -> anyhow::Result<Vec<GeoPoint>> {
        self.directions_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_directions {
            anyhow::bail!("Directions request failed: ZERO_RESULTS");
        }
        Ok(vec![origin, origin.lerp(&destination, 0.5), destination])
    }

    async fn reverse_geocode(&self, point: GeoPoint) -> anyhow::Result<Option<PlaceDto>> {
        Ok(Some(place(&format!("at-{point}"), point)))
    }

    async fn search_places(&self, query: &str, near: Option<GeoPoint>) -> anyhow::Result<Vec<PlaceDto>> {
        let at = near.unwrap_or(GeoPoint::new(0.0, 0.0));
        Ok(vec![place(query, at)])
    }
}

pub fn place(id: &str, at: GeoPoint) -> PlaceDto {
    PlaceDto {
        place_id: id.to_string(),
        address: format!("{id} address"),
        short_name: id.to_string(),
        latitude: at.latitude,
        longitude: at.longitude,
        city: Some("Antalya".to_string()),
        country: Some("Türkiye".to_string()),
    }
}
