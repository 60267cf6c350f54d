//! Seller and courier profiles as seen by the dispatch core
//!
//! Profiles are owned by the profile services; dispatch only reads them,
//! except for courier presence and position which couriers push directly.

use serde::{Deserialize, Serialize};

use super::location::{Coordinates, LocationFields};

/// Anything that can be matched by position
pub trait LocatedEntity {
    fn id(&self) -> &str;

    /// Effective position, `None` when unresolvable
    fn coordinates(&self) -> Option<Coordinates>;

    /// Own service radius in km, `None` when the entity has none
    fn service_radius_km(&self) -> Option<f64>;

    /// Online and approved
    fn is_available(&self) -> bool;
}

/// Seller (restaurant / shop)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub location: LocationFields,
    /// Delivery radius in km; the configured default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_radius_km: Option<f64>,
    #[serde(default = "default_true")]
    pub is_online: bool,
    #[serde(default = "default_true")]
    pub is_approved: bool,
}

impl LocatedEntity for Seller {
    fn id(&self) -> &str {
        &self.id
    }

    fn coordinates(&self) -> Option<Coordinates> {
        self.location.resolve()
    }

    fn service_radius_km(&self) -> Option<f64> {
        self.service_radius_km.filter(|r| r.is_finite() && *r > 0.0)
    }

    fn is_available(&self) -> bool {
        self.is_online && self.is_approved
    }
}

/// Courier (delivery partner)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub location: LocationFields,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default = "default_true")]
    pub is_approved: bool,
    /// Last accepted location write (UTC millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_updated_at: Option<i64>,
}

impl LocatedEntity for Courier {
    fn id(&self) -> &str {
        &self.id
    }

    fn coordinates(&self) -> Option<Coordinates> {
        self.location.resolve()
    }

    /// Couriers search within the dispatch wave radius, not their own.
    fn service_radius_km(&self) -> Option<f64> {
        None
    }

    fn is_available(&self) -> bool {
        self.is_online && self.is_approved
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seller_deserializes_flattened_legacy_fields() {
        let json = r#"{
            "id": "s-1",
            "name": "Sarafa",
            "latitude": "22.7196",
            "longitude": "75.8577",
            "service_radius_km": 8
        }"#;
        let seller: Seller = serde_json::from_str(json).unwrap();
        assert_eq!(seller.coordinates(), Some(Coordinates::new(22.7196, 75.8577)));
        assert_eq!(seller.service_radius_km(), Some(8.0));
        assert!(seller.is_available());
    }

    #[test]
    fn non_positive_radius_is_ignored() {
        let seller = Seller {
            id: "s-1".into(),
            name: "x".into(),
            location: LocationFields::default(),
            service_radius_km: Some(0.0),
            is_online: true,
            is_approved: true,
        };
        assert_eq!(seller.service_radius_km(), None);
    }

    #[test]
    fn courier_defaults_to_offline() {
        let courier: Courier = serde_json::from_str(r#"{"id":"c-1","name":"Ravi"}"#).unwrap();
        assert!(!courier.is_available());
        assert_eq!(courier.coordinates(), None);
    }
}
