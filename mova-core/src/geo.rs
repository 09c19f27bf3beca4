//! Geographic primitives: distance calculations and service-area geofencing.
//!
//! This module provides:
//!
//! - **Point**: a WGS84 latitude/longitude pair
//! - **Haversine distance**: great-circle distance between points
//! - **Polygon**: WKT-parsed service-area polygon with containment tests
//!
//! Market service profiles are stored as WKT `POLYGON` strings and parsed
//! once at startup; trip trajectories are tested point-by-point against the
//! parsed rings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(a: Point, b: Point) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Total path length of an ordered point sequence in kilometers.
pub fn path_distance_km(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_km(pair[0], pair[1]))
        .sum()
}

/// A polygon with one exterior ring and zero or more interior holes.
///
/// Rings are stored open (no duplicated closing vertex); WKT input may close
/// them or not.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

impl Polygon {
    /// Parse a WKT `POLYGON ((x y, x y, ...), (x y, ...))` string.
    ///
    /// WKT coordinate order is `lng lat`.
    pub fn from_wkt(wkt: &str) -> Result<Self> {
        let trimmed = wkt.trim();
        if !trimmed.to_ascii_uppercase().starts_with("POLYGON") {
            return Err(Error::InvalidWkt(format!("expected POLYGON, got {:.32}", trimmed)));
        }
        let body = trimmed["POLYGON".len()..].trim();
        let body = body
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| Error::InvalidWkt("unbalanced parentheses".to_string()))?;

        let mut rings = Vec::new();
        for ring_text in split_rings(body)? {
            let mut ring = Vec::new();
            for coord in ring_text.split(',') {
                let mut parts = coord.split_whitespace();
                let lng = parts
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| Error::InvalidWkt(format!("bad coordinate: {}", coord)))?;
                let lat = parts
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| Error::InvalidWkt(format!("bad coordinate: {}", coord)))?;
                ring.push(Point::new(lat, lng));
            }
            // Drop an explicit closing vertex.
            if ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
            if ring.len() < 3 {
                return Err(Error::InvalidWkt("ring needs at least 3 vertices".to_string()));
            }
            rings.push(ring);
        }

        let mut rings = rings.into_iter();
        let exterior = rings
            .next()
            .ok_or_else(|| Error::InvalidWkt("polygon has no rings".to_string()))?;
        Ok(Self {
            exterior,
            holes: rings.collect(),
        })
    }

    /// Ray-casting containment test. Points inside a hole are outside.
    pub fn contains(&self, p: Point) -> bool {
        if !ring_contains(&self.exterior, p) {
            return false;
        }
        !self.holes.iter().any(|hole| ring_contains(hole, p))
    }

    /// True when any of the given points falls inside the polygon.
    pub fn intersects_path(&self, points: &[Point]) -> bool {
        points.iter().any(|p| self.contains(*p))
    }
}

/// Split the inner text of a WKT polygon into its ring substrings.
fn split_rings(body: &str) -> Result<Vec<&str>> {
    let mut rings = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, ch) in body.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = Some(i + 1);
                }
                depth += 1;
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::InvalidWkt("unbalanced parentheses".to_string()))?;
                if depth == 0 {
                    let s = start.take().ok_or_else(|| {
                        Error::InvalidWkt("unbalanced parentheses".to_string())
                    })?;
                    rings.push(&body[s..i]);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::InvalidWkt("unbalanced parentheses".to_string()));
    }
    Ok(rings)
}

fn ring_contains(ring: &[Point], p: Point) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.lat > p.lat) != (b.lat > p.lat) {
            let x = (b.lng - a.lng) * (p.lat - a.lat) / (b.lat - a.lat) + a.lng;
            if p.lng < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
