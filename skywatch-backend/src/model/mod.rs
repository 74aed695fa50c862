pub mod elements;
pub mod orbit;

pub use elements::{ElementCache, SourceChain};
pub use orbit::{OrbitProvider, Sgp4Provider};
