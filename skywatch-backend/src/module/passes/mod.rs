//! Pass prediction: event grouping and naked-eye visibility.

mod finder;
mod visibility;

pub use finder::{PassWindow, build_passes, find_passes, predict_passes};
pub use visibility::{Visibility, classify};
