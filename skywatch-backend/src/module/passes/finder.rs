use chrono::{DateTime, Duration, Utc};
use skywatch_common::{ElementSet, EventKind, Observer, Pass, RawEvent};

use super::visibility::classify;
use crate::model::orbit::{OrbitProvider, PropagationError};

/// Times of one complete rise/culminate/set triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassWindow {
    pub rise: DateTime<Utc>,
    pub culminate: DateTime<Utc>,
    pub set: DateTime<Utc>,
}

/// Group an event stream into complete passes, at most `limit` of them.
///
/// Partial passes at either end of the stream, and any run that does not
/// read exactly Rise, Culminate, Set, are skipped.
pub fn find_passes(events: &[RawEvent], limit: usize) -> Vec<PassWindow> {
    let mut windows = Vec::new();
    let mut i = 0;

    while i + 2 < events.len() && windows.len() < limit {
        let (a, b, c) = (&events[i], &events[i + 1], &events[i + 2]);
        if a.kind == EventKind::Rise && b.kind == EventKind::Culminate && c.kind == EventKind::Set {
            windows.push(PassWindow {
                rise: a.time,
                culminate: b.time,
                set: c.time,
            });
            i += 3;
        } else {
            i += 1;
        }
    }

    windows
}

/// Evaluate geometry and illumination at each window's culmination.
pub fn build_passes(
    provider: &dyn OrbitProvider,
    elements: &ElementSet,
    observer: &Observer,
    windows: &[PassWindow],
) -> Result<Vec<Pass>, PropagationError> {
    windows
        .iter()
        .map(|window| {
            let look = provider.look_angles_at(elements, observer, window.culminate)?;
            let sunlit = provider.is_sunlit_at(elements, window.culminate)?;
            let sun_altitude = provider.sun_altitude_at(observer, window.culminate);
            let visibility = classify(sun_altitude, sunlit);

            Ok(Pass {
                rise_time: window.rise,
                max_time: window.culminate,
                set_time: window.set,
                max_elevation_deg: look.elevation_deg,
                max_azimuth_deg: look.azimuth_deg,
                duration_seconds: (window.set - window.rise).num_seconds(),
                observer_sun_altitude_deg: sun_altitude,
                object_sunlit: sunlit,
                visible: visibility.visible,
                visibility_label: visibility.label.to_string(),
            })
        })
        .collect()
}

/// Upcoming passes of one object over `[start, start + horizon]`.
pub fn predict_passes(
    provider: &dyn OrbitProvider,
    elements: &ElementSet,
    observer: &Observer,
    start: DateTime<Utc>,
    horizon: Duration,
    min_elevation_deg: f64,
    limit: usize,
) -> Result<Vec<Pass>, PropagationError> {
    let events = provider.find_threshold_events(elements, observer, start, start + horizon, min_elevation_deg)?;
    let windows = find_passes(&events, limit);
    build_passes(provider, elements, observer, &windows)
}
