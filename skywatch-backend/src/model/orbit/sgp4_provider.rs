use chrono::{DateTime, Duration, Utc};
use sgp4::{Constants, Elements, MinutesSinceEpoch};
use skywatch_common::{ElementSet, EventKind, Observer, RawEvent};

use super::geometry::{self, Vec3};
use super::{LookAngles, OrbitProvider, Position, PropagationError};

/// Coarse sampling interval of the event search
const DEFAULT_SEARCH_STEP_SECONDS: i64 = 30;
/// Event times are refined to this precision
const REFINE_TOLERANCE_MS: i64 = 500;

/// `OrbitProvider` backed by the `sgp4` crate.
#[derive(Debug, Clone)]
pub struct Sgp4Provider {
    search_step: Duration,
}

impl Default for Sgp4Provider {
    fn default() -> Self {
        Self {
            search_step: Duration::seconds(DEFAULT_SEARCH_STEP_SECONDS),
        }
    }
}

impl Sgp4Provider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_step(mut self, step: Duration) -> Self {
        if step > Duration::zero() {
            self.search_step = step;
        }
        self
    }
}

/// Initialized propagator for one element set.
struct Orbit {
    constants: Constants,
    epoch: DateTime<Utc>,
}

impl Orbit {
    fn new(set: &ElementSet) -> Result<Self, PropagationError> {
        let invalid = |reason: String| PropagationError::InvalidElements {
            norad_id: set.norad_id,
            reason,
        };

        let elements = Elements::from_tle(
            Some(set.name.clone()),
            set.line1.as_bytes(),
            set.line2.as_bytes(),
        )
        .map_err(|e| invalid(format!("{:?}", e)))?;
        let constants = Constants::from_elements(&elements).map_err(|e| invalid(format!("{:?}", e)))?;

        Ok(Self {
            constants,
            epoch: elements.datetime.and_utc(),
        })
    }

    /// TEME position (km) and velocity (km/s).
    fn state(&self, t: DateTime<Utc>) -> Result<(Vec3, Vec3), PropagationError> {
        let minutes = (t - self.epoch).num_milliseconds() as f64 / 60_000.0;
        let prediction = self
            .constants
            .propagate(MinutesSinceEpoch(minutes))
            .map_err(|e| PropagationError::Propagation {
                minutes,
                reason: format!("{:?}", e),
            })?;
        Ok((prediction.position, prediction.velocity))
    }

    fn look_angles(&self, observer: &Observer, t: DateTime<Utc>) -> Result<LookAngles, PropagationError> {
        let (r, _) = self.state(t)?;
        let (elevation_deg, azimuth_deg, range_km) =
            geometry::look_angles(observer, geometry::teme_to_ecef(r, t));
        Ok(LookAngles {
            elevation_deg,
            azimuth_deg,
            range_km,
        })
    }

    fn elevation(&self, observer: &Observer, t: DateTime<Utc>) -> Result<f64, PropagationError> {
        Ok(self.look_angles(observer, t)?.elevation_deg)
    }

    /// Bisect a threshold crossing inside `[lo, hi]`; `rising` tells which
    /// side of the threshold `lo` is on.
    fn refine_crossing(
        &self,
        observer: &Observer,
        mut lo: DateTime<Utc>,
        mut hi: DateTime<Utc>,
        threshold: f64,
        rising: bool,
    ) -> Result<DateTime<Utc>, PropagationError> {
        while (hi - lo).num_milliseconds() > REFINE_TOLERANCE_MS {
            let mid = lo + (hi - lo) / 2;
            let above = self.elevation(observer, mid)? >= threshold;
            if above == rising {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(lo + (hi - lo) / 2)
    }

    /// Ternary search for the elevation peak inside `[lo, hi]`.
    fn refine_peak(
        &self,
        observer: &Observer,
        mut lo: DateTime<Utc>,
        mut hi: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, f64), PropagationError> {
        while (hi - lo).num_milliseconds() > REFINE_TOLERANCE_MS {
            let third = (hi - lo) / 3;
            let m1 = lo + third;
            let m2 = hi - third;
            if self.elevation(observer, m1)? < self.elevation(observer, m2)? {
                lo = m1;
            } else {
                hi = m2;
            }
        }
        let peak = lo + (hi - lo) / 2;
        Ok((peak, self.elevation(observer, peak)?))
    }
}

impl OrbitProvider for Sgp4Provider {
    fn position_at(&self, elements: &ElementSet, t: DateTime<Utc>) -> Result<Position, PropagationError> {
        let (r, v) = Orbit::new(elements)?.state(t)?;
        let (latitude_deg, longitude_deg, altitude_km) =
            geometry::ecef_to_geodetic(geometry::teme_to_ecef(r, t));

        Ok(Position {
            latitude_deg,
            longitude_deg,
            altitude_km,
            velocity_km_s: v,
        })
    }

    fn is_sunlit_at(&self, elements: &ElementSet, t: DateTime<Utc>) -> Result<bool, PropagationError> {
        let (r, _) = Orbit::new(elements)?.state(t)?;
        Ok(!geometry::in_earth_shadow(r, geometry::sun_position(t)))
    }

    fn sun_altitude_at(&self, observer: &Observer, t: DateTime<Utc>) -> f64 {
        let sun = geometry::teme_to_ecef(geometry::sun_position(t), t);
        geometry::look_angles(observer, sun).0
    }

    fn look_angles_at(
        &self,
        elements: &ElementSet,
        observer: &Observer,
        t: DateTime<Utc>,
    ) -> Result<LookAngles, PropagationError> {
        Orbit::new(elements)?.look_angles(observer, t)
    }

    fn find_threshold_events(
        &self,
        elements: &ElementSet,
        observer: &Observer,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_elevation_deg: f64,
    ) -> Result<Vec<RawEvent>, PropagationError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let orbit = Orbit::new(elements)?;

        let mut samples = Vec::new();
        let mut t = start;
        loop {
            samples.push((t, orbit.elevation(observer, t)?));
            if t >= end {
                break;
            }
            t = (t + self.search_step).min(end);
        }

        let mut events = Vec::new();

        for pair in samples.windows(2) {
            let (t0, el0) = pair[0];
            let (t1, el1) = pair[1];
            let above0 = el0 >= min_elevation_deg;
            let above1 = el1 >= min_elevation_deg;
            if above0 != above1 {
                let rising = !above0;
                let at = orbit.refine_crossing(observer, t0, t1, min_elevation_deg, rising)?;
                let kind = if rising { EventKind::Rise } else { EventKind::Set };
                events.push(RawEvent::new(at, kind));
            }
        }

        for triple in samples.windows(3) {
            let (before, el_before) = triple[0];
            let (_, el_mid) = triple[1];
            let (after, el_after) = triple[2];
            if el_before < el_mid && el_mid >= el_after {
                let (peak, el_peak) = orbit.refine_peak(observer, before, after)?;
                if el_peak >= min_elevation_deg {
                    events.push(RawEvent::new(peak, EventKind::Culminate));
                }
            }
        }

        events.sort_by_key(|event| event.time);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::elements::testing::iss_set;
    use chrono::TimeZone;

    fn iss_epoch() -> DateTime<Utc> {
        Orbit::new(&iss_set("test")).unwrap().epoch
    }

    #[test]
    fn test_epoch_parsed_from_line1() {
        let epoch = iss_epoch();
        assert_eq!(epoch.date_naive(), chrono::NaiveDate::from_ymd_opt(2020, 7, 12).unwrap());
    }

    #[test]
    fn test_iss_position_is_plausible() {
        let provider = Sgp4Provider::new();
        let set = iss_set("test");

        for hours in [0, 3, 12] {
            let position = provider.position_at(&set, iss_epoch() + Duration::hours(hours)).unwrap();
            assert!(position.altitude_km > 350.0 && position.altitude_km < 460.0);
            assert!(position.speed_km_s() > 7.5 && position.speed_km_s() < 7.8);
            assert!(position.latitude_deg.abs() <= 52.0);
            assert!(position.longitude_deg.abs() <= 180.0);
        }
    }

    #[test]
    fn test_sun_altitude_noon_and_midnight() {
        let provider = Sgp4Provider::new();
        let observer = Observer::new(0.0, 0.0, 0.0);

        let noon = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap();

        assert!(provider.sun_altitude_at(&observer, noon) > 80.0);
        assert!(provider.sun_altitude_at(&observer, midnight) < -80.0);
    }

    #[test]
    fn test_low_beta_orbit_enters_shadow() {
        // Tiangong near the March equinox, beta angle around -26 degrees
        let set = ElementSet::new(
            48274,
            "CSS (TIANHE)",
            "1 48274U 21035A   24079.54172905  .00031212  00000+0  35522-3 0  9999",
            "2 48274  41.4675 318.4113 0006101 302.8806  57.1358 15.62058462167956",
            "test",
            Utc::now(),
        )
        .unwrap();
        let provider = Sgp4Provider::new();
        let start = Orbit::new(&set).unwrap().epoch;

        let states: Vec<bool> = (0..93)
            .map(|m| provider.is_sunlit_at(&set, start + Duration::minutes(m)).unwrap())
            .collect();

        assert!(states.iter().any(|&lit| lit));
        assert!(states.iter().any(|&lit| !lit));
    }

    #[test]
    fn test_events_over_a_day_form_passes() {
        let provider = Sgp4Provider::new();
        let set = iss_set("test");
        let observer = Observer::new(40.0, -100.0, 0.0);
        let start = iss_epoch();

        let events = provider
            .find_threshold_events(&set, &observer, start, start + Duration::hours(24), 10.0)
            .unwrap();

        assert!(events.windows(2).all(|w| w[0].time <= w[1].time));

        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        let complete = kinds
            .windows(3)
            .filter(|w| w[0] == EventKind::Rise && w[1] == EventKind::Culminate && w[2] == EventKind::Set)
            .count();
        assert!(complete >= 1);

        for event in &events {
            let el = provider.look_angles_at(&set, &observer, event.time).unwrap().elevation_deg;
            match event.kind {
                EventKind::Rise | EventKind::Set => assert!((el - 10.0).abs() < 0.5),
                EventKind::Culminate => assert!(el >= 10.0),
            }
        }
    }

    #[test]
    fn test_empty_window_has_no_events() {
        let provider = Sgp4Provider::new();
        let start = iss_epoch();
        let events = provider
            .find_threshold_events(&iss_set("test"), &Observer::new(0.0, 0.0, 0.0), start, start, 10.0)
            .unwrap();
        assert!(events.is_empty());
    }
}
