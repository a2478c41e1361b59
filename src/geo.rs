//! Geographic primitives shared by the simulator, the traffic engine and the
//! ride flows.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude, used for small metric offsets.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Initial bearing towards `other`, in degrees within `(-180, 180]`,
    /// clockwise from north.
    pub fn heading_to(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let y = d_lambda.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
        y.atan2(x).to_degrees()
    }

    /// Shifts the point by `north_m` / `east_m` meters using a flat-earth
    /// approximation, good enough for offsets of a few kilometers.
    pub fn offset_meters(&self, north_m: f64, east_m: f64) -> GeoPoint {
        let lat = self.latitude + north_m / METERS_PER_DEGREE;
        let lng = self.longitude
            + east_m / (METERS_PER_DEGREE * self.latitude.to_radians().cos());
        GeoPoint::new(lat, lng)
    }

    /// Linear interpolation between two points in coordinate space.
    pub fn lerp(&self, other: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint::new(
            self.latitude + (other.latitude - self.latitude) * t,
            self.longitude + (other.longitude - self.longitude) * t,
        )
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

impl std::str::FromStr for GeoPoint {
    type Err = anyhow::Error;

    /// Parses `"lat,lng"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| anyhow::anyhow!("expected 'lat,lng', got '{s}'"))?;
        let point = GeoPoint::new(lat.trim().parse()?, lng.trim().parse()?);
        if !point.is_finite() {
            anyhow::bail!("coordinates must be finite: '{s}'");
        }
        Ok(point)
    }
}

/// Ordered path of points, with cumulative segment lengths precomputed so
/// that lookups by distance along the path are cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    points: Vec<GeoPoint>,
    /// `cumulative[i]` is the distance from `points[0]` to `points[i]`.
    cumulative: Vec<f64>,
}

/// A point on a route together with the bearing of the segment it lies on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePosition {
    pub point: GeoPoint,
    pub heading: f64,
}

impl Route {
    /// Builds a route. Returns `None` for an empty point list or one that
    /// holds a non-finite coordinate.
    pub fn new(points: Vec<GeoPoint>) -> Option<Self> {
        if points.is_empty() || !points.iter().all(GeoPoint::is_finite) {
            return None;
        }
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            total += pair[0].distance_to(&pair[1]);
            cumulative.push(total);
        }
        Some(Self { points, cumulative })
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> GeoPoint {
        self.points[0]
    }

    pub fn end(&self) -> GeoPoint {
        self.points[self.points.len() - 1]
    }

    /// Total length in meters.
    pub fn length_meters(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// Position and heading after travelling `distance` meters from the
    /// start. Distances past either end are clamped.
    ///
    /// Heading is the bearing of the segment being traversed; on a
    /// single-point route it is `0`.
    pub fn position_at(&self, distance: f64) -> RoutePosition {
        if self.points.len() == 1 {
            return RoutePosition {
                point: self.points[0],
                heading: 0.0,
            };
        }

        let distance = distance.clamp(0.0, self.length_meters());

        // First segment whose end lies at or past `distance`.
        let seg = self
            .cumulative
            .partition_point(|&c| c < distance)
            .clamp(1, self.points.len() - 1)
            - 1;

        let from = &self.points[seg];
        let to = &self.points[seg + 1];
        let seg_len = self.cumulative[seg + 1] - self.cumulative[seg];
        let t = if seg_len > 0.0 {
            (distance - self.cumulative[seg]) / seg_len
        } else {
            0.0
        };

        RoutePosition {
            point: from.lerp(to, t),
            heading: from.heading_to(to),
        }
    }
}

/// Decodes a Google encoded polyline (precision 1e-5).
pub fn decode_polyline(encoded: &str) -> anyhow::Result<Vec<GeoPoint>> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();

    let next_value = |index: &mut usize| -> anyhow::Result<i64> {
        let mut result: i64 = 0;
        let mut shift = 0;
        loop {
            let byte = *bytes
                .get(*index)
                .ok_or_else(|| anyhow::anyhow!("truncated polyline at byte {}", *index))?;
            *index += 1;
            let chunk = i64::from(byte)
                .checked_sub(63)
                .filter(|c| *c >= 0)
                .ok_or_else(|| anyhow::anyhow!("invalid polyline byte {byte:#x}"))?;
            result |= (chunk & 0x1f) << shift;
            shift += 5;
            if chunk < 0x20 {
                break;
            }
            if shift > 60 {
                anyhow::bail!("polyline value overflow");
            }
        }
        Ok(if result & 1 != 0 {
            !(result >> 1)
        } else {
            result >> 1
        })
    };

    while index < bytes.len() {
        lat += next_value(&mut index)?;
        lng += next_value(&mut index)?;
        points.push(GeoPoint::new(lat as f64 / 1e5, lng as f64 / 1e5));
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_distance_one_degree_longitude_at_equator() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        // 2πR / 360
        assert!(close(a.distance_to(&b), 111_195.08, 1.0));
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let a = GeoPoint::new(36.91, 30.72);
        let b = GeoPoint::new(36.92, 30.70);
        assert!(close(a.distance_to(&b), b.distance_to(&a), 1e-6));
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_heading_cardinal_directions() {
        let o = GeoPoint::new(0.0, 0.0);
        assert!(close(o.heading_to(&GeoPoint::new(1.0, 0.0)), 0.0, 1e-9));
        assert!(close(o.heading_to(&GeoPoint::new(0.0, 1.0)), 90.0, 1e-9));
        assert!(close(o.heading_to(&GeoPoint::new(0.0, -1.0)), -90.0, 1e-9));
        assert!(close(o.heading_to(&GeoPoint::new(-1.0, 0.0)).abs(), 180.0, 1e-9));
    }

    #[test]
    fn test_offset_meters_round_trip_distance() {
        let base = GeoPoint::new(36.91, 30.72);
        let moved = base.offset_meters(500.0, 0.0);
        assert!(close(base.distance_to(&moved), 500.0, 5.0));
        let moved = base.offset_meters(0.0, 500.0);
        assert!(close(base.distance_to(&moved), 500.0, 5.0));
    }

    #[test]
    fn test_parse_point() {
        let p: GeoPoint = "10.5, -20.25".parse().unwrap();
        assert_eq!(p, GeoPoint::new(10.5, -20.25));
        assert!("10.5".parse::<GeoPoint>().is_err());
        assert!("NaN,1".parse::<GeoPoint>().is_err());
    }

    #[test]
    fn test_route_rejects_empty() {
        assert!(Route::new(vec![]).is_none());
    }

    #[test]
    fn test_route_rejects_non_finite_points() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!(Route::new(vec![origin, GeoPoint::new(f64::NAN, 0.0)]).is_none());
        assert!(Route::new(vec![GeoPoint::new(0.0, f64::INFINITY), origin]).is_none());
        assert!(Route::new(vec![GeoPoint::new(f64::NEG_INFINITY, 1.0)]).is_none());
    }

    #[test]
    fn test_route_length_sums_segments() {
        let pts = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.01, 0.01),
        ];
        let expected = pts[0].distance_to(&pts[1]) + pts[1].distance_to(&pts[2]);
        let route = Route::new(pts).unwrap();
        assert!(close(route.length_meters(), expected, 1e-6));
    }

    #[test]
    fn test_position_at_interpolates_by_distance() {
        let route = Route::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.01, 0.01),
        ])
        .unwrap();
        let first = route.points()[0].distance_to(&route.points()[1]);

        let mid = route.position_at(first / 2.0);
        assert!(close(mid.point.longitude, 0.005, 1e-9));
        assert!(close(mid.heading, 90.0, 1e-6));

        // Second segment heads north.
        let later = route.position_at(first + 10.0);
        assert!(close(later.heading, 0.0, 1e-3));
        assert!(later.point.latitude > 0.0);
    }

    #[test]
    fn test_position_at_clamps_to_ends() {
        let route = Route::new(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)]).unwrap();
        assert_eq!(route.position_at(-5.0).point, route.start());
        assert_eq!(route.position_at(1e9).point, route.end());
    }

    #[test]
    fn test_position_at_skips_zero_length_segments() {
        let route = Route::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
        ])
        .unwrap();
        let pos = route.position_at(route.length_meters() / 2.0);
        assert!(close(pos.point.longitude, 0.005, 1e-9));
        assert!(close(pos.heading, 90.0, 1e-6));
    }

    #[test]
    fn test_single_point_route() {
        let route = Route::new(vec![GeoPoint::new(1.0, 2.0)]).unwrap();
        assert_eq!(route.length_meters(), 0.0);
        assert_eq!(route.position_at(100.0).point, GeoPoint::new(1.0, 2.0));
    }

    #[test]
    fn test_decode_polyline_reference() {
        // Example from the Google polyline algorithm documentation.
        let pts = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(pts.len(), 3);
        assert!(close(pts[0].latitude, 38.5, 1e-9));
        assert!(close(pts[0].longitude, -120.2, 1e-9));
        assert!(close(pts[1].latitude, 40.7, 1e-9));
        assert!(close(pts[1].longitude, -120.95, 1e-9));
        assert!(close(pts[2].latitude, 43.252, 1e-9));
        assert!(close(pts[2].longitude, -126.453, 1e-9));
    }

    #[test]
    fn test_decode_polyline_truncated() {
        assert!(decode_polyline("_p~iF~ps|U_").is_err());
    }
}
