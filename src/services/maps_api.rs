//! Trait for the maps and places provider.

use anyhow::Result;

use crate::api::types::PlaceDto;
use crate::geo::GeoPoint;

/// Abstraction over a maps provider (e.g., Google Maps Platform).
///
/// Consumers treat every failure as non-fatal: a missing route means no
/// overlay or animation, never a blocked ride flow.
#[async_trait::async_trait]
pub trait MapsApi: Send + Sync {
    /// Returns the driving path from `origin` to `destination`.
    async fn directions(&self, origin: GeoPoint, destination: GeoPoint) -> Result<Vec<GeoPoint>>;

    /// Returns the most relevant place at `point`, or `None` when the
    /// provider has no answer.
    async fn reverse_geocode(&self, point: GeoPoint) -> Result<Option<PlaceDto>>;

    /// Free-text place search, biased towards `near` when given. No match
    /// is an empty list, not an error.
    async fn search_places(&self, query: &str, near: Option<GeoPoint>) -> Result<Vec<PlaceDto>>;
}
