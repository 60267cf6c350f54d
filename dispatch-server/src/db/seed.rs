//! Seed data loader
//!
//! Sellers, couriers and products are owned by profile and catalog services
//! outside this process. For standalone runs they can be loaded from a JSON
//! file of the form `{"sellers": [...], "couriers": [...], "products": [...]}`.

use std::path::Path;

use serde::Deserialize;
use shared::models::{Courier, LocatedEntity, Product, Seller};

use super::storage::{DispatchStorage, StorageError};

#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub sellers: Vec<Seller>,
    #[serde(default)]
    pub couriers: Vec<Courier>,
    #[serde(default)]
    pub products: Vec<Product>,
}

/// Counts of records written
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub sellers: usize,
    pub couriers: usize,
    pub products: usize,
}

impl SeedData {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Upsert everything into storage
    pub fn apply(&self, storage: &DispatchStorage) -> Result<SeedSummary, StorageError> {
        for seller in &self.sellers {
            if seller.location.needs_reconciliation() {
                tracing::warn!(
                    seller_id = %seller.id,
                    "Seller location fields disagree, structured point wins"
                );
            }
            if seller.coordinates().is_none() {
                tracing::warn!(seller_id = %seller.id, "Seller has no resolvable location");
            }
            storage.put_seller(seller)?;
        }
        for courier in &self.couriers {
            storage.put_courier(courier)?;
        }
        for product in &self.products {
            storage.put_product(product)?;
        }

        Ok(SeedSummary {
            sellers: self.sellers.len(),
            couriers: self.couriers.len(),
            products: self.products.len(),
        })
    }
}
