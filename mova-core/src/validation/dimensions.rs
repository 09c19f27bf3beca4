//! Individual validation dimensions: speed, route shape, duration.

use super::{DimensionScore, TrajectoryPoint, TravelMode};
use crate::geo::haversine_km;

/// Route-shape bounds on trajectory/straight-line distance ratio.
const ROUTE_RATIO_MIN: f64 = 1.0;
const ROUTE_RATIO_MAX: f64 = 3.0;
/// Real street networks rarely beat a 1.2 detour factor; score peaks there.
const ROUTE_RATIO_PEAK: f64 = 1.2;

/// Fraction of the planned duration the actual duration may deviate by.
const TIME_TOLERANCE: f64 = 0.3;

/// Speed band (km/h) for a travel mode. The bands overlap by design; the
/// trip's claimed mode is authoritative and the band only scores
/// consistency.
pub fn speed_band(mode: TravelMode) -> (f64, f64) {
    match mode {
        TravelMode::Walking => (0.0, 8.0),
        TravelMode::Biking => (8.0, 25.0),
        TravelMode::Transit => (15.0, 50.0),
        TravelMode::Driving => (25.0, 120.0),
        // Intermodal trips are scored per segment, not with one band.
        TravelMode::Intermodal => (0.0, 120.0),
    }
}

/// Average speed across the trajectory in km/h, from position deltas.
/// Returns `None` when no time elapses between first and last fix.
pub fn average_speed_kmh(trajectory: &[TrajectoryPoint]) -> Option<f64> {
    let first = trajectory.first()?;
    let last = trajectory.last()?;
    let elapsed_hours = (last.timestamp - first.timestamp).num_seconds() as f64 / 3600.0;
    if elapsed_hours <= 0.0 {
        return None;
    }
    let distance: f64 = trajectory
        .windows(2)
        .map(|pair| haversine_km(pair[0].point(), pair[1].point()))
        .sum();
    Some(distance / elapsed_hours)
}

pub fn score_speed(mode: TravelMode, avg_kmh: f64) -> DimensionScore {
    let (min, max) = speed_band(mode);
    let center = (min + max) / 2.0;
    let halfwidth = (max - min) / 2.0;
    let score = (1.0 - (avg_kmh - center).abs() / halfwidth).clamp(0.0, 1.0);
    DimensionScore {
        passed: avg_kmh >= min && avg_kmh <= max,
        score,
        detail: format!("avg {:.1} km/h against {}..{} band", avg_kmh, min, max),
    }
}

pub fn score_route(trajectory_km: f64, straight_line_km: f64) -> DimensionScore {
    if straight_line_km <= 0.0 {
        return DimensionScore {
            passed: false,
            score: 0.0,
            detail: "origin and destination coincide".to_string(),
        };
    }
    let ratio = trajectory_km / straight_line_km;
    let score = if ratio <= ROUTE_RATIO_PEAK {
        (ratio - ROUTE_RATIO_MIN) / (ROUTE_RATIO_PEAK - ROUTE_RATIO_MIN)
    } else {
        (ROUTE_RATIO_MAX - ratio) / (ROUTE_RATIO_MAX - ROUTE_RATIO_PEAK)
    }
    .clamp(0.0, 1.0);
    DimensionScore {
        passed: (ROUTE_RATIO_MIN..=ROUTE_RATIO_MAX).contains(&ratio),
        score,
        detail: format!("distance ratio {:.2}", ratio),
    }
}

pub fn score_time(planned_mins: f64, actual_mins: f64, tolerance_factor: f64) -> DimensionScore {
    if planned_mins <= 0.0 {
        return DimensionScore {
            passed: false,
            score: 0.0,
            detail: "no planned duration".to_string(),
        };
    }
    let tolerance = TIME_TOLERANCE * planned_mins * tolerance_factor;
    let deviation = (actual_mins - planned_mins).abs();
    DimensionScore {
        passed: deviation <= tolerance,
        score: (1.0 - deviation / tolerance).clamp(0.0, 1.0),
        detail: format!(
            "planned {:.0}m actual {:.0}m tolerance {:.0}m",
            planned_mins, actual_mins, tolerance
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_score_peaks_at_band_center() {
        let s = score_speed(TravelMode::Walking, 4.0);
        assert!(s.passed);
        assert!((s.score - 1.0).abs() < 1e-9);
        let edge = score_speed(TravelMode::Walking, 8.0);
        assert!(edge.passed);
        assert!(edge.score < 1e-9);
        assert!(!score_speed(TravelMode::Walking, 12.0).passed);
    }

    #[test]
    fn route_score_peaks_at_1_2() {
        assert!((score_route(1.2, 1.0).score - 1.0).abs() < 1e-9);
        assert!(score_route(1.0, 1.0).passed);
        assert!(score_route(3.0, 1.0).passed);
        assert!(!score_route(3.1, 1.0).passed);
        assert!(!score_route(0.9, 1.0).passed);
    }

    #[test]
    fn route_degenerate_plan_fails() {
        assert!(!score_route(1.0, 0.0).passed);
    }

    #[test]
    fn time_within_tolerance_passes() {
        let t = score_time(30.0, 25.0, 1.0);
        assert!(t.passed);
        assert!((t.score - (1.0 - 5.0 / 9.0)).abs() < 1e-9);
        assert!(!score_time(30.0, 45.0, 1.0).passed);
        assert!(score_time(30.0, 45.0, 2.0).passed);
    }
}
