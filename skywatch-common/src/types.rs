use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tle::{validate_lines, MalformedElementData};

/// NORAD catalog number, the stable identifier of an orbiting object.
pub type NoradId = u32;

/// One validated two-line element set for one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSet {
    pub norad_id: NoradId,

    /// Object name as reported by the source (e.g. "ISS (ZARYA)")
    pub name: String,

    pub line1: String,
    pub line2: String,

    /// When this record was obtained from its upstream
    pub fetched_at: DateTime<Utc>,

    /// Fetcher that produced the record ("celestrak", "disk", ...)
    pub source: String,
}

impl ElementSet {
    /// Build a record, rejecting lines that fail the structural checks.
    pub fn new(
        norad_id: NoradId,
        name: impl Into<String>,
        line1: &str,
        line2: &str,
        source: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, MalformedElementData> {
        let line1 = line1.trim_end();
        let line2 = line2.trim_end();
        validate_lines(norad_id, line1, line2)?;

        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(MalformedElementData::Missing("object name"));
        }

        Ok(Self {
            norad_id,
            name,
            line1: line1.to_string(),
            line2: line2.to_string(),
            fetched_at,
            source: source.into(),
        })
    }

    /// Time elapsed since the record was fetched.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at)
    }

    /// Fresh while `now - fetched_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Ground observer, fixed for the duration of one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub elevation_m: f64,
}

impl Observer {
    pub fn new(latitude_deg: f64, longitude_deg: f64, elevation_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            elevation_m,
        }
    }
}

/// Threshold-crossing event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Object climbed above the minimum elevation
    Rise,
    /// Object reached its highest elevation of the pass
    Culminate,
    /// Object dropped below the minimum elevation
    Set,
}

/// One event of the chronological stream produced by the orbit provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub time: DateTime<Utc>,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(time: DateTime<Utc>, kind: EventKind) -> Self {
        Self { time, kind }
    }
}

/// A complete rise/culminate/set pass with its visibility verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    pub rise_time: DateTime<Utc>,
    pub max_time: DateTime<Utc>,
    pub set_time: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub max_azimuth_deg: f64,
    pub duration_seconds: i64,
    /// Sun altitude seen by the observer at `max_time`
    pub observer_sun_altitude_deg: f64,
    /// Object illuminated at `max_time`
    pub object_sunlit: bool,
    pub visible: bool,
    pub visibility_label: String,
}

/// Sub-satellite point at one sampled instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    #[serde(rename = "utc")]
    pub time: DateTime<Utc>,
    #[serde(rename = "lat")]
    pub latitude_deg: f64,
    #[serde(rename = "lon")]
    pub longitude_deg: f64,
}
