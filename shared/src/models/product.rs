//! Product Model

use serde::{Deserialize, Serialize};

/// Product entity (stock-bearing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub seller_id: String,
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<f64>,
    /// Top-level stock, used when the product has no variants
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// Product variant (size, flavour, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<f64>,
    #[serde(default)]
    pub stock: i64,
}

/// Which stock counter a reservation draws from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum StockSlot {
    Variant(String),
    TopLevel,
}

impl Product {
    fn exact_variant(&self, key: Option<&str>) -> Option<&Variant> {
        let key = key?;
        self.variants.iter().find(|v| v.key == key)
    }

    /// Candidate stock slots in precedence order.
    ///
    /// An exact variant match is the only candidate. Without one, the first
    /// variant is tried and then the top-level counter.
    pub fn stock_slots(&self, variant_key: Option<&str>) -> Vec<StockSlot> {
        if let Some(v) = self.exact_variant(variant_key) {
            return vec![StockSlot::Variant(v.key.clone())];
        }
        let mut slots = Vec::with_capacity(2);
        if let Some(first) = self.variants.first() {
            slots.push(StockSlot::Variant(first.key.clone()));
        }
        slots.push(StockSlot::TopLevel);
        slots
    }

    /// Mutable stock counter for a slot, `None` if the slot no longer exists
    pub fn stock_mut(&mut self, slot: &StockSlot) -> Option<&mut i64> {
        match slot {
            StockSlot::Variant(key) => self
                .variants
                .iter_mut()
                .find(|v| &v.key == key)
                .map(|v| &mut v.stock),
            StockSlot::TopLevel => Some(&mut self.stock),
        }
    }

    pub fn stock_of(&self, slot: &StockSlot) -> Option<i64> {
        match slot {
            StockSlot::Variant(key) => self.variants.iter().find(|v| &v.key == key).map(|v| v.stock),
            StockSlot::TopLevel => Some(self.stock),
        }
    }

    /// Unit price at order time.
    ///
    /// Priority: variant price, variant discount price, product discount
    /// price, product price. Only positive finite values count.
    pub fn unit_price(&self, variant_key: Option<&str>) -> Option<f64> {
        let variant = self.exact_variant(variant_key);
        [
            variant.and_then(|v| v.price),
            variant.and_then(|v| v.discount_price),
            self.discount_price,
            Some(self.price),
        ]
        .into_iter()
        .flatten()
        .find(|p| p.is_finite() && *p > 0.0)
    }
}
