//! JSON bodies returned by `/api/state`, `/api/track` and `/api/passes`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{NoradId, TrackPoint};

/// Per-object failure reported next to the successful entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectError {
    pub key: String,
    pub norad_id: NoradId,
    pub error: String,
}

/// Live state of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteState {
    pub key: String,
    pub label: String,
    pub norad_id: NoradId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
    pub speed_km_s: f64,
    pub speed_mph: f64,
    /// Seconds since the element set was fetched from its upstream
    pub tle_age: i64,
    pub tle_fetched_utc: DateTime<Utc>,
    pub tle_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    pub utc: DateTime<Utc>,
    pub satellites: Vec<SatelliteState>,
    pub errors: Vec<ObjectError>,
}

/// Predicted ground track of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteTrack {
    pub key: String,
    pub label: String,
    pub norad_id: NoradId,
    pub points: Vec<TrackPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackResponse {
    pub utc: DateTime<Utc>,
    pub minutes: i64,
    pub step_sec: i64,
    pub satellites: Vec<SatelliteTrack>,
    pub errors: Vec<ObjectError>,
}

/// One pass as rendered on the wire, with UTC and observer-local times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassView {
    pub rise_utc: DateTime<Utc>,
    pub max_utc: DateTime<Utc>,
    pub set_utc: DateTime<Utc>,
    pub rise_local: String,
    pub max_local: String,
    pub set_local: String,
    pub duration_s: i64,
    pub max_el_deg: f64,
    pub max_az_deg: f64,
    pub sun_alt_deg: f64,
    pub iss_sunlit: bool,
    pub visible: bool,
    pub visibility_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassesResponse {
    pub key: String,
    pub label: String,
    pub norad_id: NoradId,
    pub utc: DateTime<Utc>,
    pub passes: Vec<PassView>,
}

/// Body of every 4xx/5xx response that has no richer shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
