//! Pricing: money helpers, road distance, delivery fee
//!
//! All monetary math runs on `rust_decimal::Decimal` and is stored as `f64`.

pub mod delivery_fee;
pub mod money;
pub mod road_distance;

pub use delivery_fee::{FeeCalculator, FeeConfig, FeeMode, FeeQuote, distance_fee};
pub use road_distance::{HttpRoadDistance, ProviderError, RoadDistanceProvider, RoutingConfig};
