//! Proximity matching over located entities
//!
//! Two questions are answered here:
//!
//! - "whose service area covers this point?" ([`covering`]), where each
//!   candidate's own radius applies (seller matching);
//! - "who is within N km of this point?" ([`within`]), where the caller's
//!   radius applies (courier search), nearest first.
//!
//! Entities without resolvable coordinates never match. Nothing here looks at
//! online/approved flags; callers filter availability first.

use shared::models::{Coordinates, LocatedEntity};

use super::haversine::distance_km;

/// A matched entity with its distance from the query point
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub id: String,
    pub coordinates: Coordinates,
    pub distance_km: f64,
}

/// Radius in which an entity counts as "in range"
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeRule {
    /// Each candidate's own service radius, `default_km` when it has none
    OwnRadius { default_km: f64 },
    /// A single radius chosen by the caller
    Fixed(f64),
}

fn rank<'a, T, I>(point: Coordinates, candidates: I, rule: RangeRule) -> Vec<Ranked>
where
    T: LocatedEntity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if !point.is_valid() {
        return Vec::new();
    }
    candidates
        .into_iter()
        .filter_map(|entity| {
            let coordinates = entity.coordinates()?;
            let radius = match rule {
                RangeRule::OwnRadius { default_km } => {
                    entity.service_radius_km().unwrap_or(default_km)
                }
                RangeRule::Fixed(km) => km,
            };
            let d = distance_km(point, coordinates);
            (d <= radius).then(|| Ranked {
                id: entity.id().to_string(),
                coordinates,
                distance_km: d,
            })
        })
        .collect()
}

/// Candidates whose own service area covers `point`, in input order
pub fn covering<'a, T, I>(point: Coordinates, candidates: I, default_radius_km: f64) -> Vec<Ranked>
where
    T: LocatedEntity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    rank(
        point,
        candidates,
        RangeRule::OwnRadius {
            default_km: default_radius_km,
        },
    )
}

/// Candidates within `radius_km` of `point`, nearest first.
/// Ties keep input order.
pub fn within<'a, T, I>(point: Coordinates, candidates: I, radius_km: f64) -> Vec<Ranked>
where
    T: LocatedEntity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut ranked = rank(point, candidates, RangeRule::Fixed(radius_km));
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

/// Ids of candidates in range of `point`.
///
/// With `radius_override` set every candidate is measured against it,
/// otherwise each candidate's own radius (or `default_radius_km`) applies.
pub fn within_range<'a, T, I>(
    point: Coordinates,
    candidates: I,
    radius_override: Option<f64>,
    default_radius_km: f64,
) -> Vec<String>
where
    T: LocatedEntity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let matched = match radius_override {
        Some(km) => within(point, candidates, km),
        None => covering(point, candidates, default_radius_km),
    };
    matched.into_iter().map(|r| r.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Courier, GeoPoint, LocationFields, Seller};

    const INDORE: Coordinates = Coordinates {
        lat: 22.7196,
        lon: 75.8577,
    };

    fn seller(id: &str, location: LocationFields, radius: Option<f64>) -> Seller {
        Seller {
            id: id.into(),
            name: id.into(),
            location,
            service_radius_km: radius,
            is_online: true,
            is_approved: true,
        }
    }

    fn courier(id: &str, lat: f64, lon: f64) -> Courier {
        Courier {
            id: id.into(),
            name: id.into(),
            location: LocationFields::from_coordinates(Coordinates::new(lat, lon)),
            is_online: true,
            is_approved: true,
            location_updated_at: None,
        }
    }

    /// Point `km` kilometres due north of `origin`
    fn north_of(origin: Coordinates, km: f64) -> Coordinates {
        Coordinates::new(origin.lat + km / 111.195, origin.lon)
    }

    #[test]
    fn seller_covers_own_location_but_not_fifteen_km_away() {
        let s = seller("s-1", LocationFields::from_coordinates(INDORE), Some(10.0));
        assert_eq!(covering(INDORE, [&s], 10.0).len(), 1);
        assert!(covering(north_of(INDORE, 15.0), [&s], 10.0).is_empty());
    }

    #[test]
    fn default_radius_applies_when_unset() {
        let s = seller("s-1", LocationFields::from_coordinates(INDORE), None);
        assert_eq!(covering(north_of(INDORE, 9.0), [&s], 10.0).len(), 1);
        assert!(covering(north_of(INDORE, 11.0), [&s], 10.0).is_empty());
    }

    #[test]
    fn unresolvable_entities_are_skipped_not_zero_distance() {
        let null_island = seller(
            "zero",
            LocationFields {
                location: Some(GeoPoint {
                    kind: "Point".into(),
                    coordinates: [0.0, 0.0],
                }),
                latitude: None,
                longitude: None,
            },
            Some(20_000.0),
        );
        let garbage = seller("bad", LocationFields::from_legacy("abc", "def"), Some(20_000.0));
        let ok = seller("ok", LocationFields::from_legacy("22.7196", "75.8577"), None);

        let ids = within_range(Coordinates::new(0.0, 0.0), [&null_island, &garbage, &ok], None, 10.0);
        assert!(ids.is_empty());

        let ids = within_range(INDORE, [&null_island, &garbage, &ok], None, 10.0);
        assert_eq!(ids, vec!["ok".to_string()]);
    }

    #[test]
    fn invalid_query_point_matches_nothing() {
        let s = seller("s-1", LocationFields::from_coordinates(INDORE), Some(10.0));
        assert!(covering(Coordinates::new(f64::NAN, 75.0), [&s], 10.0).is_empty());
        assert!(within(Coordinates::new(95.0, 75.0), [&s], 10.0).is_empty());
    }

    #[test]
    fn couriers_sorted_nearest_first() {
        let far = courier("far", north_of(INDORE, 4.0).lat, INDORE.lon);
        let near = courier("near", north_of(INDORE, 1.0).lat, INDORE.lon);
        let out = courier("out", north_of(INDORE, 6.0).lat, INDORE.lon);

        let ranked = within(INDORE, [&far, &out, &near], 5.0);
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(ranked[0].distance_km < ranked[1].distance_km);
    }

    #[test]
    fn override_radius_ignores_own_radius() {
        let s = seller("s-1", LocationFields::from_coordinates(INDORE), Some(1.0));
        let p = north_of(INDORE, 3.0);
        assert!(within_range(p, [&s], None, 10.0).is_empty());
        assert_eq!(within_range(p, [&s], Some(5.0), 10.0), vec!["s-1".to_string()]);
    }
}
