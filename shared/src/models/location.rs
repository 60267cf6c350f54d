//! Location types and legacy-field reconciliation
//!
//! Profiles carry two location representations:
//!
//! - a GeoJSON point (`location: { type: "Point", coordinates: [lon, lat] }`)
//! - legacy string fields (`latitude: "22.7196"`, `longitude: "75.8577"`)
//!
//! [`LocationFields::resolve`] is the single place where the two are merged.
//! The structured point wins whenever it is valid; the strings are only a
//! fallback. Anything that cannot be resolved yields `None`, never `(0, 0)`.

use serde::{Deserialize, Serialize};

/// Two representations further apart than this (in degrees) are flagged
/// for reconciliation.
const RECONCILE_TOLERANCE_DEG: f64 = 1e-4;

/// Latitude / longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Returns `Some(self)` only when valid
    pub fn validated(self) -> Option<Self> {
        self.is_valid().then_some(self)
    }
}

/// GeoJSON point. Note the `[lon, lat]` ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

fn point_type() -> String {
    "Point".to_string()
}

impl GeoPoint {
    pub fn from_coordinates(c: Coordinates) -> Self {
        Self {
            kind: point_type(),
            coordinates: [c.lon, c.lat],
        }
    }

    /// `[0, 0]` is the storage default for "never set" and is treated as absent.
    pub fn to_coordinates(&self) -> Option<Coordinates> {
        let [lon, lat] = self.coordinates;
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        Coordinates::new(lat, lon).validated()
    }
}

/// Location fields as persisted on seller and courier profiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
}

impl LocationFields {
    /// Structured-only location (what new writes produce)
    pub fn from_coordinates(c: Coordinates) -> Self {
        Self {
            location: Some(GeoPoint::from_coordinates(c)),
            latitude: None,
            longitude: None,
        }
    }

    /// Legacy-only location
    pub fn from_legacy(lat: impl Into<String>, lon: impl Into<String>) -> Self {
        Self {
            location: None,
            latitude: Some(lat.into()),
            longitude: Some(lon.into()),
        }
    }

    fn structured(&self) -> Option<Coordinates> {
        self.location.as_ref().and_then(GeoPoint::to_coordinates)
    }

    fn legacy(&self) -> Option<Coordinates> {
        let lat = self.latitude.as_deref()?.trim().parse::<f64>().ok()?;
        let lon = self.longitude.as_deref()?.trim().parse::<f64>().ok()?;
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        Coordinates::new(lat, lon).validated()
    }

    /// Resolve the effective coordinates: structured first, then legacy strings.
    pub fn resolve(&self) -> Option<Coordinates> {
        self.structured().or_else(|| self.legacy())
    }

    /// Both representations resolve but disagree.
    pub fn needs_reconciliation(&self) -> bool {
        match (self.structured(), self.legacy()) {
            (Some(s), Some(l)) => {
                (s.lat - l.lat).abs() > RECONCILE_TOLERANCE_DEG
                    || (s.lon - l.lon).abs() > RECONCILE_TOLERANCE_DEG
            }
            _ => false,
        }
    }

    /// Overwrite with a fresh structured position and drop the legacy strings.
    pub fn set(&mut self, c: Coordinates) {
        *self = Self::from_coordinates(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_point_takes_precedence() {
        let fields = LocationFields {
            location: Some(GeoPoint::from_coordinates(Coordinates::new(22.7196, 75.8577))),
            latitude: Some("10.0".into()),
            longitude: Some("10.0".into()),
        };
        assert_eq!(fields.resolve(), Some(Coordinates::new(22.7196, 75.8577)));
        assert!(fields.needs_reconciliation());
    }

    #[test]
    fn falls_back_to_legacy_strings() {
        let fields = LocationFields::from_legacy(" 22.7196", "75.8577 ");
        assert_eq!(fields.resolve(), Some(Coordinates::new(22.7196, 75.8577)));
        assert!(!fields.needs_reconciliation());
    }

    #[test]
    fn zero_point_is_treated_as_unset() {
        let fields = LocationFields {
            location: Some(GeoPoint {
                kind: "Point".into(),
                coordinates: [0.0, 0.0],
            }),
            latitude: Some("22.5".into()),
            longitude: Some("75.5".into()),
        };
        assert_eq!(fields.resolve(), Some(Coordinates::new(22.5, 75.5)));
    }

    #[test]
    fn garbage_is_unresolvable() {
        assert_eq!(LocationFields::default().resolve(), None);
        assert_eq!(LocationFields::from_legacy("abc", "75.0").resolve(), None);
        assert_eq!(LocationFields::from_legacy("NaN", "75.0").resolve(), None);
        assert_eq!(LocationFields::from_legacy("91.0", "75.0").resolve(), None);
        assert_eq!(LocationFields::from_legacy("45.0", "181.0").resolve(), None);
    }

    #[test]
    fn geojson_uses_lon_lat_order() {
        let json = r#"{"location":{"type":"Point","coordinates":[75.8577,22.7196]}}"#;
        let fields: LocationFields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.resolve(), Some(Coordinates::new(22.7196, 75.8577)));
    }
}
