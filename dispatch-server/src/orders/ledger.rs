//! Stock reservation ledger
//!
//! Each line is reserved with its own conditional decrement. If any line
//! fails, the lines already reserved in the same attempt are credited back
//! before the error is returned, so a failed placement has no net effect on
//! stock. The resulting entries are persisted together with the order.

use shared::models::{ReservationEntry, StockSlot};
use shared::util::now_millis;

use super::PlacementError;
use crate::db::DispatchStorage;

/// A line ready to reserve
#[derive(Debug, Clone)]
pub struct LineReservation {
    pub product_id: String,
    pub name: String,
    /// Candidate slots in precedence order
    pub slots: Vec<StockSlot>,
    pub quantity: u32,
}

/// Reserve every line or none.
pub fn reserve_all(
    storage: &DispatchStorage,
    order_id: &str,
    lines: &[LineReservation],
) -> Result<Vec<ReservationEntry>, PlacementError> {
    let mut entries: Vec<ReservationEntry> = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        match storage.try_reserve_stock(&line.product_id, &line.slots, line.quantity) {
            Ok(Some(slot)) => entries.push(ReservationEntry {
                order_id: order_id.to_string(),
                line_index: index as u32,
                product_id: line.product_id.clone(),
                slot,
                quantity: line.quantity,
                voided: false,
                created_at: now_millis(),
            }),
            Ok(None) => {
                compensate(storage, &entries);
                tracing::info!(
                    order_id,
                    product_id = %line.product_id,
                    requested = line.quantity,
                    "Insufficient stock, placement rolled back"
                );
                return Err(PlacementError::InsufficientStock {
                    line_index: index,
                    product_id: line.product_id.clone(),
                    name: line.name.clone(),
                    requested: line.quantity,
                });
            }
            Err(e) => {
                compensate(storage, &entries);
                return Err(e.into());
            }
        }
    }

    Ok(entries)
}

/// Credit back reservations that never reached the ledger
pub fn compensate(storage: &DispatchStorage, entries: &[ReservationEntry]) {
    for entry in entries.iter().rev() {
        match storage.restore_stock(&entry.product_id, &entry.slot, entry.quantity) {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(
                order_id = %entry.order_id,
                product_id = %entry.product_id,
                "Product gone during rollback, stock not restored"
            ),
            Err(e) => tracing::error!(
                order_id = %entry.order_id,
                product_id = %entry.product_id,
                quantity = entry.quantity,
                error = %e,
                "Compensating stock restore failed"
            ),
        }
    }
}
