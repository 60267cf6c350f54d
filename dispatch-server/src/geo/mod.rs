//! Geospatial helpers: haversine distance and radius matching

pub mod haversine;
pub mod proximity;

pub use haversine::{EARTH_RADIUS_KM, distance_km};
pub use proximity::{Ranked, covering, within, within_range};
