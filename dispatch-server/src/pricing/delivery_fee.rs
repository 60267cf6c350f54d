//! Delivery fee calculation
//!
//! Three modes, checked in order:
//!
//! 1. free delivery when `free_delivery_threshold > 0` and the subtotal
//!    reaches it;
//! 2. distance-based: `ceil(base + max(0, d − base_distance) × km_rate)` with
//!    `d` the largest seller→customer distance of the order;
//! 3. flat rate.
//!
//! Distances come from the road-distance provider when one is configured,
//! falling back to haversine per seller. A provider failure for one seller
//! does not discard the road distances obtained for the others.

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::prelude::*;
use serde::Serialize;
use shared::models::Coordinates;

use super::money::{to_decimal, to_f64};
use super::road_distance::RoadDistanceProvider;
use crate::geo::distance_km;

/// Fee settings
#[derive(Debug, Clone)]
pub struct FeeConfig {
    /// 0 disables free delivery
    pub free_delivery_threshold: f64,
    pub distance_based: bool,
    pub base_charge: f64,
    pub base_distance_km: f64,
    pub km_rate: f64,
    pub flat_charge: f64,
    /// Flat platform fee added to every order total
    pub platform_fee: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            free_delivery_threshold: 0.0,
            distance_based: true,
            base_charge: 40.0,
            base_distance_km: 2.0,
            km_rate: 10.0,
            flat_charge: 40.0,
            platform_fee: 0.0,
        }
    }
}

/// Which branch produced the fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
    Free,
    Distance,
    /// Distance mode but no seller location resolved; base charge applied
    BaseChargeFallback,
    Flat,
}

/// Where a seller distance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceSource {
    Road,
    Haversine,
}

/// Result of a fee computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeQuote {
    pub fee: f64,
    pub mode: FeeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance_km: Option<f64>,
    /// Sellers whose distance fell back to haversine
    pub fallbacks: usize,
}

/// `ceil(base + max(0, d − base_distance) × km_rate)`, never negative.
///
/// The ceiling is applied once to the combined value.
pub fn distance_fee(distance_km: f64, config: &FeeConfig) -> f64 {
    let extra_km = (to_decimal(distance_km) - to_decimal(config.base_distance_km)).max(Decimal::ZERO);
    let raw = to_decimal(config.base_charge) + extra_km * to_decimal(config.km_rate);
    to_f64(raw.ceil().max(Decimal::ZERO))
}

/// Delivery fee calculator with an optional road-distance provider
#[derive(Clone)]
pub struct FeeCalculator {
    config: FeeConfig,
    provider: Option<Arc<dyn RoadDistanceProvider>>,
}

impl FeeCalculator {
    pub fn new(config: FeeConfig, provider: Option<Arc<dyn RoadDistanceProvider>>) -> Self {
        Self { config, provider }
    }

    /// Haversine only
    pub fn straight_line(config: FeeConfig) -> Self {
        Self::new(config, None)
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Distance from one seller to the customer, with per-pair fallback
    async fn seller_distance(&self, seller: Coordinates, customer: Coordinates) -> (f64, DistanceSource) {
        if let Some(provider) = &self.provider {
            match provider.distance_km(seller, customer).await {
                Ok(km) if km.is_finite() && km >= 0.0 => return (km, DistanceSource::Road),
                Ok(km) => {
                    tracing::warn!(km, "Road-distance provider returned an unusable value, using haversine");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Road-distance lookup failed, using haversine");
                }
            }
        }
        (distance_km(seller, customer), DistanceSource::Haversine)
    }

    /// Compute the delivery fee.
    ///
    /// `sellers` holds one entry per seller involved in the order; `None`
    /// marks a seller whose location could not be resolved.
    pub async fn compute(
        &self,
        subtotal: f64,
        sellers: &[Option<Coordinates>],
        customer: Coordinates,
    ) -> FeeQuote {
        let cfg = &self.config;

        if cfg.free_delivery_threshold > 0.0 && subtotal >= cfg.free_delivery_threshold {
            return FeeQuote {
                fee: 0.0,
                mode: FeeMode::Free,
                max_distance_km: None,
                fallbacks: 0,
            };
        }

        if !cfg.distance_based {
            return FeeQuote {
                fee: to_f64(to_decimal(cfg.flat_charge).max(Decimal::ZERO)),
                mode: FeeMode::Flat,
                max_distance_km: None,
                fallbacks: 0,
            };
        }

        let lookups = sellers
            .iter()
            .flatten()
            .map(|seller| self.seller_distance(*seller, customer));
        let distances = join_all(lookups).await;

        let fallbacks = distances
            .iter()
            .filter(|(_, source)| *source == DistanceSource::Haversine)
            .count();
        let max_distance = distances
            .iter()
            .map(|(km, _)| *km)
            .fold(None, |acc: Option<f64>, km| Some(acc.map_or(km, |a| a.max(km))));

        match max_distance {
            Some(d) => FeeQuote {
                fee: distance_fee(d, cfg),
                mode: FeeMode::Distance,
                max_distance_km: Some(d),
                fallbacks,
            },
            None => FeeQuote {
                fee: to_f64(to_decimal(cfg.base_charge).max(Decimal::ZERO)),
                mode: FeeMode::BaseChargeFallback,
                max_distance_km: None,
                fallbacks: 0,
            },
        }
    }
}
