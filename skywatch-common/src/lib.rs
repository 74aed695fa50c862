//! Types shared between the skywatch backend and its clients.
//!
//! - [`types`]: domain records (element sets, observers, events, passes)
//! - [`tle`]: structural validation of two-line element text
//! - [`api`]: JSON bodies of the HTTP surface

pub mod api;
pub mod tle;
pub mod types;

pub use tle::MalformedElementData;
pub use types::{ElementSet, EventKind, NoradId, Observer, Pass, RawEvent, TrackPoint};
