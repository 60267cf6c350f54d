//! Courier presence and location
//!
//! Couriers push their own position and online flag. Location writes are
//! throttled per courier; a throttled update is an ordinary outcome, not an
//! error.

use std::time::Duration;

use serde::Serialize;
use shared::error::{AppError, AppResult};
use shared::models::{Coordinates, Courier};
use shared::util::now_millis;

use crate::db::{DispatchStorage, StorageError};

/// Result of a location push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocationUpdate {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

enum LocationRefusal {
    Throttled,
    Storage(StorageError),
}

impl From<StorageError> for LocationRefusal {
    fn from(err: StorageError) -> Self {
        LocationRefusal::Storage(err)
    }
}

#[derive(Debug, Clone)]
pub struct CourierService {
    storage: DispatchStorage,
    throttle: Duration,
}

impl CourierService {
    pub fn new(storage: DispatchStorage, throttle: Duration) -> Self {
        Self { storage, throttle }
    }

    pub fn update_location(&self, courier_id: &str, lat: f64, lon: f64) -> AppResult<LocationUpdate> {
        let point = Coordinates::new(lat, lon)
            .validated()
            .ok_or_else(|| AppError::validation(format!("Invalid coordinates ({lat}, {lon})")))?;
        let throttle_ms = self.throttle.as_millis() as i64;

        let result = self.storage.update_courier(courier_id, |courier| {
            let now = now_millis();
            if let Some(last) = courier.location_updated_at
                && now - last < throttle_ms
            {
                return Err(LocationRefusal::Throttled);
            }
            courier.location.set(point);
            courier.location_updated_at = Some(now);
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::debug!(courier = %courier_id, lat, lon, "Courier location updated");
                Ok(LocationUpdate {
                    accepted: true,
                    reason: None,
                })
            }
            Err(LocationRefusal::Throttled) => Ok(LocationUpdate {
                accepted: false,
                reason: Some("throttled"),
            }),
            Err(LocationRefusal::Storage(e)) => Err(e.into()),
        }
    }

    pub fn set_online(&self, courier_id: &str, online: bool) -> AppResult<Courier> {
        let courier = self
            .storage
            .update_courier::<_, AppError, _>(courier_id, |courier| {
                courier.is_online = online;
                Ok(courier.clone())
            })?;
        tracing::info!(courier = %courier_id, online, "Courier presence changed");
        Ok(courier)
    }
}
