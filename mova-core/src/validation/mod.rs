//! Trip validation scoring.
//!
//! Decides whether a claimed trip is real enough to earn incentives by
//! scoring the uploaded GPS trajectory against the planned route on three
//! dimensions (speed consistency, route shape, duration), with an extra
//! mode-mix check for intermodal trips. The result gates incentive payout;
//! queueing and rounds live in the API crate.

mod dimensions;
mod intermodal;

pub use dimensions::{average_speed_kmh, speed_band};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::geo::{haversine_km, path_distance_km, Point};

/// Minimum trajectory points required before scoring is attempted.
pub const MIN_TRAJECTORY_POINTS: usize = 5;

/// Aggregate score below which a trip fails even when every dimension
/// passes individually.
pub const PASS_THRESHOLD: f64 = 0.5;

const SPEED_WEIGHT: f64 = 0.4;
const ROUTE_WEIGHT: f64 = 0.4;
const TIME_WEIGHT: f64 = 0.2;

/// Travel modes with validation logic. Discriminants are the wire values
/// used by mobile clients; clients may send codes outside this set, which
/// the validator rejects with "No validation logic defined".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving = 1,
    Transit = 2,
    Walking = 3,
    Biking = 4,
    Intermodal = 5,
}

impl TravelMode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

impl TryFrom<i32> for TravelMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TravelMode::Driving),
            2 => Ok(TravelMode::Transit),
            3 => Ok(TravelMode::Walking),
            4 => Ok(TravelMode::Biking),
            5 => Ok(TravelMode::Intermodal),
            other => Err(Error::InvalidTravelMode(other)),
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TravelMode::Driving => write!(f, "driving"),
            TravelMode::Transit => write!(f, "transit"),
            TravelMode::Walking => write!(f, "walking"),
            TravelMode::Biking => write!(f, "biking"),
            TravelMode::Intermodal => write!(f, "intermodal"),
        }
    }
}

/// One recorded GPS fix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    /// Device-reported speed in km/h; scoring recomputes speeds from
    /// position deltas and uses this only as auxiliary data.
    pub speed: f64,
    pub accuracy: f64,
}

impl TrajectoryPoint {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lng)
    }
}

/// The planned side of a trip, as claimed at start/end time.
#[derive(Debug, Clone, Copy)]
pub struct PlannedTrip {
    pub origin: Point,
    pub destination: Point,
    pub started_on: DateTime<Utc>,
    pub estimated_arrival_on: DateTime<Utc>,
    pub ended_on: DateTime<Utc>,
}

/// Score for one validation dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub passed: bool,
    pub score: f64,
    pub detail: String,
}

/// Per-dimension breakdown persisted alongside the result row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<DimensionScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<DimensionScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DimensionScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_modes: Option<Vec<String>>,
}

/// Outcome of one validation round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub score: f64,
    pub details: ValidationDetails,
}

impl ValidationOutcome {
    fn rejected(message: &str) -> Self {
        Self {
            passed: false,
            score: 0.0,
            details: ValidationDetails {
                message: Some(message.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Validate a trip's trajectory against its plan. `mode_code` is the raw
/// client mode code; codes without validation logic fail outright.
pub fn validate_trip(
    mode_code: i32,
    plan: &PlannedTrip,
    trajectory: &[TrajectoryPoint],
) -> ValidationOutcome {
    let Ok(mode) = TravelMode::try_from(mode_code) else {
        return ValidationOutcome::rejected("No validation logic defined");
    };

    if trajectory.len() < MIN_TRAJECTORY_POINTS || !timestamps_monotone(trajectory) {
        return ValidationOutcome::rejected("insufficient trajectory");
    }

    match mode {
        TravelMode::Walking | TravelMode::Biking | TravelMode::Transit | TravelMode::Driving => {
            validate_single_mode(mode, plan, trajectory)
        }
        TravelMode::Intermodal => intermodal::validate_intermodal(plan, trajectory),
    }
}

fn timestamps_monotone(trajectory: &[TrajectoryPoint]) -> bool {
    trajectory
        .windows(2)
        .all(|pair| pair[1].timestamp >= pair[0].timestamp)
}

fn validate_single_mode(
    mode: TravelMode,
    plan: &PlannedTrip,
    trajectory: &[TrajectoryPoint],
) -> ValidationOutcome {
    let avg = match average_speed_kmh(trajectory) {
        Some(v) => v,
        None => return ValidationOutcome::rejected("insufficient trajectory"),
    };

    let speed = dimensions::score_speed(mode, avg);
    let route = dimensions::score_route(
        trajectory_distance_km(trajectory),
        haversine_km(plan.origin, plan.destination),
    );

    // Driving in traffic: slower than the band's floor while overrunning the
    // plan widens the time tolerance.
    let (band_min, _) = speed_band(mode);
    let planned_mins = (plan.estimated_arrival_on - plan.started_on).num_seconds() as f64 / 60.0;
    let actual_mins = (plan.ended_on - plan.started_on).num_seconds() as f64 / 60.0;
    let tolerance_factor =
        if mode == TravelMode::Driving && actual_mins > planned_mins && avg < band_min {
            2.0
        } else {
            1.0
        };
    let time = dimensions::score_time(planned_mins, actual_mins, tolerance_factor);

    aggregate(speed, route, time, None, None)
}

/// Total trajectory path length in kilometers.
pub fn trajectory_distance_km(trajectory: &[TrajectoryPoint]) -> f64 {
    let points: Vec<Point> = trajectory.iter().map(TrajectoryPoint::point).collect();
    path_distance_km(&points)
}

pub(crate) fn aggregate(
    speed: DimensionScore,
    route: DimensionScore,
    time: DimensionScore,
    detected_modes: Option<Vec<String>>,
    message: Option<String>,
) -> ValidationOutcome {
    let score =
        SPEED_WEIGHT * speed.score + ROUTE_WEIGHT * route.score + TIME_WEIGHT * time.score;
    let all_passed = speed.passed && route.passed && time.passed;
    let passed = all_passed && score >= PASS_THRESHOLD;
    ValidationOutcome {
        passed,
        score,
        details: ValidationDetails {
            message,
            speed: Some(speed),
            route: Some(route),
            time: Some(time),
            detected_modes,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn plan(planned_mins: i64, actual_mins: i64, direct_km: f64) -> PlannedTrip {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        // ~direct_km northward at Houston's latitude.
        let dlat = direct_km / 111.0;
        PlannedTrip {
            origin: Point::new(29.7604, -95.3698),
            destination: Point::new(29.7604 + dlat, -95.3698),
            started_on: start,
            estimated_arrival_on: start + Duration::minutes(planned_mins),
            ended_on: start + Duration::minutes(actual_mins),
        }
    }

    /// Straight-line trajectory covering `total_km` over `mins` minutes.
    fn trajectory(points: usize, total_km: f64, mins: i64) -> Vec<TrajectoryPoint> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let step_km = total_km / (points - 1) as f64;
        let step_secs = mins * 60 / (points - 1) as i64;
        (0..points)
            .map(|i| TrajectoryPoint {
                lat: 29.7604 + (i as f64 * step_km) / 111.0,
                lng: -95.3698,
                timestamp: start + Duration::seconds(step_secs * i as i64),
                speed: total_km / (mins as f64 / 60.0),
                accuracy: 5.0,
            })
            .collect()
    }

    #[test]
    fn walking_trip_passes() {
        // avg 4 km/h over 25 minutes, route ratio ~1.2, planned 30 minutes.
        let traj = trajectory(8, 4.0 * 25.0 / 60.0, 25);
        let direct = trajectory_distance_km(&traj) / 1.2;
        let outcome = validate_trip(TravelMode::Walking.as_i32(), &plan(30, 25, direct), &traj);
        assert!(outcome.passed, "details: {:?}", outcome.details);
        assert!(outcome.score >= 0.7, "score {}", outcome.score);
    }

    #[test]
    fn too_few_points_rejected() {
        let traj = trajectory(4, 1.0, 20);
        let outcome = validate_trip(TravelMode::Walking.as_i32(), &plan(30, 25, 1.0), &traj);
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.details.message.as_deref(), Some("insufficient trajectory"));
    }

    #[test]
    fn non_monotone_timestamps_rejected() {
        let mut traj = trajectory(8, 2.0, 25);
        traj[3].timestamp = traj[2].timestamp - Duration::seconds(30);
        let outcome = validate_trip(TravelMode::Walking.as_i32(), &plan(30, 25, 2.0), &traj);
        assert!(!outcome.passed);
        assert_eq!(outcome.details.message.as_deref(), Some("insufficient trajectory"));
    }

    #[test]
    fn driving_speed_on_walking_trip_fails() {
        // 40 km/h average claimed as walking.
        let traj = trajectory(8, 40.0 * 25.0 / 60.0, 25);
        let direct = trajectory_distance_km(&traj) / 1.2;
        let outcome = validate_trip(TravelMode::Walking.as_i32(), &plan(30, 25, direct), &traj);
        assert!(!outcome.passed);
        assert!(!outcome.details.speed.unwrap().passed);
    }

    #[test]
    fn unrecognized_mode_codes_have_no_validator() {
        let traj = trajectory(8, 2.0, 25);
        for code in [0, 6, 42, 100] {
            let outcome = validate_trip(code, &plan(30, 25, 2.0), &traj);
            assert!(!outcome.passed);
            assert_eq!(outcome.score, 0.0);
            assert_eq!(
                outcome.details.message.as_deref(),
                Some("No validation logic defined")
            );
        }
    }

    #[test]
    fn driving_traffic_tolerance_doubles() {
        // 20 km/h average (below driving band floor), 50% over planned time.
        let traj = trajectory(10, 20.0 * 45.0 / 60.0, 45);
        let direct = trajectory_distance_km(&traj) / 1.2;
        let outcome = validate_trip(TravelMode::Driving.as_i32(), &plan(30, 45, direct), &traj);
        // Deviation is 15 of 30 planned minutes; plain tolerance is 9, the
        // doubled traffic tolerance is 18, so time passes.
        assert!(outcome.details.time.unwrap().passed);
    }

    #[test]
    fn travel_mode_round_trip() {
        for raw in [1, 2, 3, 4, 5] {
            let mode = TravelMode::try_from(raw).unwrap();
            assert_eq!(mode.as_i32(), raw);
        }
        assert!(TravelMode::try_from(42).is_err());
    }
}
