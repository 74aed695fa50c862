use chrono::{DateTime, Duration, Utc};
use skywatch_common::{ElementSet, TrackPoint};
use thiserror::Error;

use crate::model::orbit::{OrbitProvider, PropagationError};

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("track step must be positive, got {0} s")]
    InvalidStep(i64),

    #[error("track duration must not be negative, got {0} s")]
    InvalidDuration(i64),

    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

/// Sub-points at `start + n * step` for `n = 0..=floor(duration / step)`.
pub fn sample_track(
    provider: &dyn OrbitProvider,
    elements: &ElementSet,
    start: DateTime<Utc>,
    duration: Duration,
    step: Duration,
) -> Result<Vec<TrackPoint>, TrackError> {
    if step <= Duration::zero() {
        return Err(TrackError::InvalidStep(step.num_seconds()));
    }
    if duration < Duration::zero() {
        return Err(TrackError::InvalidDuration(duration.num_seconds()));
    }

    let count = duration.num_milliseconds() / step.num_milliseconds() + 1;

    (0..count)
        .map(|n| {
            let t = start + step * n as i32;
            let position = provider.position_at(elements, t)?;
            Ok(TrackPoint {
                time: t,
                latitude_deg: position.latitude_deg,
                longitude_deg: position.longitude_deg,
            })
        })
        .collect()
}
