//! Ephemeris seam: everything the pass finder and track sampler need to know
//! about where an object is, behind one trait.

pub mod geometry;
mod sgp4_provider;

pub use sgp4_provider::Sgp4Provider;

use chrono::{DateTime, Utc};
use skywatch_common::{ElementSet, Observer, RawEvent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("element set for catalog #{norad_id} rejected by the propagator: {reason}")]
    InvalidElements { norad_id: u32, reason: String },

    #[error("propagation failed {minutes:.1} min from epoch: {reason}")]
    Propagation { minutes: f64, reason: String },
}

/// Geodetic sub-point and inertial velocity at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    /// TEME velocity, km/s
    pub velocity_km_s: [f64; 3],
}

impl Position {
    pub fn speed_km_s(&self) -> f64 {
        geometry::norm(self.velocity_km_s)
    }
}

/// Topocentric direction from an observer to an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAngles {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
}

pub trait OrbitProvider: Send + Sync {
    fn position_at(&self, elements: &ElementSet, t: DateTime<Utc>) -> Result<Position, PropagationError>;

    /// Whether the object is outside the Earth's shadow.
    fn is_sunlit_at(&self, elements: &ElementSet, t: DateTime<Utc>) -> Result<bool, PropagationError>;

    /// Altitude of the Sun above the observer's horizon, degrees.
    fn sun_altitude_at(&self, observer: &Observer, t: DateTime<Utc>) -> f64;

    fn look_angles_at(
        &self,
        elements: &ElementSet,
        observer: &Observer,
        t: DateTime<Utc>,
    ) -> Result<LookAngles, PropagationError>;

    /// Chronological rise/culminate/set events for elevation crossings of
    /// `min_elevation_deg` in `[start, end]`. The stream may begin or end
    /// in the middle of a pass.
    fn find_threshold_events(
        &self,
        elements: &ElementSet,
        observer: &Observer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_elevation_deg: f64,
    ) -> Result<Vec<RawEvent>, PropagationError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider: fixed event stream and illumination, counts calls.
    pub struct FakeProvider {
        pub events: Vec<RawEvent>,
        pub sun_altitude_deg: f64,
        pub sunlit: bool,
        pub peak_elevation_deg: f64,
        pub calls: AtomicUsize,
    }

    impl FakeProvider {
        pub fn new(events: Vec<RawEvent>) -> Self {
            Self {
                events,
                sun_altitude_deg: -12.0,
                sunlit: true,
                peak_elevation_deg: 45.0,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl OrbitProvider for FakeProvider {
        fn position_at(&self, _elements: &ElementSet, t: DateTime<Utc>) -> Result<Position, PropagationError> {
            self.touch();
            Ok(Position {
                latitude_deg: 0.0,
                longitude_deg: (t.timestamp() / 60).rem_euclid(360) as f64 - 180.0,
                altitude_km: 420.0,
                velocity_km_s: [7.66, 0.0, 0.0],
            })
        }

        fn is_sunlit_at(&self, _elements: &ElementSet, _t: DateTime<Utc>) -> Result<bool, PropagationError> {
            self.touch();
            Ok(self.sunlit)
        }

        fn sun_altitude_at(&self, _observer: &Observer, _t: DateTime<Utc>) -> f64 {
            self.touch();
            self.sun_altitude_deg
        }

        fn look_angles_at(
            &self,
            _elements: &ElementSet,
            _observer: &Observer,
            _t: DateTime<Utc>,
        ) -> Result<LookAngles, PropagationError> {
            self.touch();
            Ok(LookAngles {
                elevation_deg: self.peak_elevation_deg,
                azimuth_deg: 135.0,
                range_km: 600.0,
            })
        }

        fn find_threshold_events(
            &self,
            _elements: &ElementSet,
            _observer: &Observer,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _min_elevation_deg: f64,
        ) -> Result<Vec<RawEvent>, PropagationError> {
            self.touch();
            Ok(self.events.clone())
        }
    }
}
