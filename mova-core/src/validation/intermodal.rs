//! Intermodal trip validation: segment the trajectory by speed band and
//! require at least two distinct modes joined by plausible transitions.

use std::collections::BTreeSet;

use super::dimensions::{score_route, score_time};
use super::{aggregate, trajectory_distance_km, DimensionScore, PlannedTrip, TrajectoryPoint};
use crate::geo::haversine_km;

/// Mode detected for one trajectory segment. Overlapping bands resolve to
/// the slowest band containing the segment speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SegmentMode {
    Walking,
    Biking,
    Transit,
    Driving,
}

impl SegmentMode {
    fn classify(speed_kmh: f64) -> Self {
        match speed_kmh {
            v if v < 8.0 => SegmentMode::Walking,
            v if v < 25.0 => SegmentMode::Biking,
            v if v < 50.0 => SegmentMode::Transit,
            _ => SegmentMode::Driving,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SegmentMode::Walking => "walking",
            SegmentMode::Biking => "biking",
            SegmentMode::Transit => "transit",
            SegmentMode::Driving => "driving",
        }
    }
}

/// Transitions a person can plausibly make mid-trip: walking connects to
/// everything, biking connects to transit (bike-on-bus racks).
fn valid_transition(a: SegmentMode, b: SegmentMode) -> bool {
    use SegmentMode::*;
    matches!(
        (a, b),
        (Walking, _) | (_, Walking) | (Biking, Transit) | (Transit, Biking)
    )
}

pub(super) fn validate_intermodal(
    plan: &PlannedTrip,
    trajectory: &[TrajectoryPoint],
) -> super::ValidationOutcome {
    let runs = mode_runs(trajectory);
    let modes: BTreeSet<SegmentMode> = runs.iter().copied().collect();

    let (mix, message) = if modes.len() < 2 {
        (
            DimensionScore {
                passed: false,
                score: 0.0,
                detail: "only one mode detected".to_string(),
            },
            Some("only one mode detected".to_string()),
        )
    } else {
        let transitions: Vec<(SegmentMode, SegmentMode)> =
            runs.windows(2).map(|pair| (pair[0], pair[1])).collect();
        let valid = transitions
            .iter()
            .filter(|(a, b)| valid_transition(*a, *b))
            .count();
        let score = valid as f64 / transitions.len() as f64;
        (
            DimensionScore {
                passed: valid == transitions.len(),
                score,
                detail: format!("{} of {} transitions valid", valid, transitions.len()),
            },
            None,
        )
    };

    let route = score_route(
        trajectory_distance_km(trajectory),
        haversine_km(plan.origin, plan.destination),
    );
    let planned_mins = (plan.estimated_arrival_on - plan.started_on).num_seconds() as f64 / 60.0;
    let actual_mins = (plan.ended_on - plan.started_on).num_seconds() as f64 / 60.0;
    let time = score_time(planned_mins, actual_mins, 1.0);

    let detected = modes.iter().map(|m| m.name().to_string()).collect();
    aggregate(mix, route, time, Some(detected), message)
}

/// Collapse per-segment classifications into consecutive mode runs.
fn mode_runs(trajectory: &[TrajectoryPoint]) -> Vec<SegmentMode> {
    let mut runs: Vec<SegmentMode> = Vec::new();
    for pair in trajectory.windows(2) {
        let dt_hours = (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 3600.0;
        if dt_hours <= 0.0 {
            continue;
        }
        let speed = haversine_km(pair[0].point(), pair[1].point()) / dt_hours;
        let mode = SegmentMode::classify(speed);
        if runs.last() != Some(&mode) {
            runs.push(mode);
        }
    }
    runs
}
