//! Grid carbon-intensity sources and the zone-keyed reading cache.

pub mod cache;
pub mod http;
pub mod provider;

pub use cache::CarbonCache;
pub use provider::{CarbonError, CarbonReading, IntensitySource, MockSource, RawReading};
