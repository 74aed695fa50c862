//! Error types of the element acquisition path.
//!
//! A [`SourceFailure`] is recoverable by trying the next source, an
//! [`AllSourcesFailed`] by serving a cached tier, and [`NoCachedData`] is
//! reported to the caller for that object only.

use skywatch_common::{MalformedElementData, NoradId};
use std::fmt;
use thiserror::Error;

/// Why a single fetcher could not produce an element set.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("catalog #{0} not present in upstream data")]
    NotFound(NoradId),

    #[error("malformed element data: {0}")]
    Malformed(#[from] MalformedElementData),

    /// Reason reported by a refresh attempt that finished while this caller
    /// waited for it
    #[error("{0} (concurrent attempt)")]
    Concurrent(String),
}

/// One fetcher's failure, tagged with the fetcher name.
#[derive(Debug, Error)]
#[error("{fetcher}: {reason}")]
pub struct SourceFailure {
    pub fetcher: String,
    #[source]
    pub reason: FetchError,
}

/// Every fetcher in the chain failed; carries each reason in chain order.
#[derive(Debug, Error)]
pub struct AllSourcesFailed {
    pub norad_id: NoradId,
    pub failures: Vec<SourceFailure>,
}

impl fmt::Display for AllSourcesFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all element sources failed for catalog #{}", self.norad_id)?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, failure)?;
        }
        Ok(())
    }
}

/// No tier holds any element set for the object.
#[derive(Debug, Error)]
#[error("no element data available for catalog #{norad_id} ({cause})")]
pub struct NoCachedData {
    pub norad_id: NoradId,
    #[source]
    pub cause: AllSourcesFailed,
}
