//! redb-based storage for the dispatch core
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `products` | `product_id` | `Product` | Stock counters |
//! | `sellers` | `seller_id` | `Seller` | Read-only profile input |
//! | `couriers` | normalized `courier_id` | `Courier` | Presence and position |
//! | `orders` | `order_id` | `Order` | Order + dispatch bookkeeping |
//! | `reservations` | `(order_id, line_index)` | `ReservationEntry` | Stock ledger |
//!
//! # Conditional updates
//!
//! Every check-then-write runs inside a single write transaction. redb
//! serialises write transactions, so a read → check → write → commit sequence
//! is atomic against every other writer. Stock decrements and courier
//! assignment rely on this; there is no in-process lock around either.
//!
//! Closures passed to the `update_*` methods run while the write transaction
//! is open. They must not call back into storage.

use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{Courier, Order, Product, ReservationEntry, Seller, StockSlot};
use shared::util::normalize_identity;
use thiserror::Error;

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Table for products: key = product_id, value = JSON-serialized Product
const PRODUCTS_TABLE: JsonTable = TableDefinition::new("products");

/// Table for sellers: key = seller_id, value = JSON-serialized Seller
const SELLERS_TABLE: JsonTable = TableDefinition::new("sellers");

/// Table for couriers: key = courier_id, value = JSON-serialized Courier
const COURIERS_TABLE: JsonTable = TableDefinition::new("couriers");

/// Table for orders: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: JsonTable = TableDefinition::new("orders");

/// Table for the reservation ledger: key = (order_id, line_index)
const RESERVATIONS_TABLE: TableDefinition<(&str, u32), &[u8]> =
    TableDefinition::new("reservations");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Courier not found: {0}")]
    CourierNotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Dispatch storage backed by redb
#[derive(Clone)]
pub struct DispatchStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for DispatchStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchStorage").finish_non_exhaustive()
    }
}

impl DispatchStorage {
    /// Open or create the database at the given path.
    ///
    /// redb commits are durable once `commit()` returns (copy-on-write with
    /// an atomic root swap), so a crash never leaves a half-applied update.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::init(Database::create(path)?)
    }

    /// Open an in-memory database (tests, demos)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRODUCTS_TABLE)?;
            let _ = write_txn.open_table(SELLERS_TABLE)?;
            let _ = write_txn.open_table(COURIERS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(RESERVATIONS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Generic JSON helpers ==========

    fn load_in<T: DeserializeOwned>(
        txn: &WriteTransaction,
        def: JsonTable,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let table = txn.open_table(def)?;
        let value = match table.get(key)? {
            Some(guard) => Some(serde_json::from_slice(guard.value())?),
            None => None,
        };
        Ok(value)
    }

    fn store_in<T: Serialize>(
        txn: &WriteTransaction,
        def: JsonTable,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(def)?;
        let bytes = serde_json::to_vec(value)?;
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(def)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        Self::store_in(&txn, def, key, value)?;
        txn.commit()?;
        Ok(())
    }

    fn list_json<T: DeserializeOwned>(&self, def: JsonTable) -> StorageResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(def)?;
        let mut items = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            items.push(serde_json::from_slice(value.value())?);
        }
        Ok(items)
    }

    /// Read-modify-write of one record inside a single write transaction.
    ///
    /// The closure's `Err` aborts the transaction; nothing is written.
    fn update_json<V, T, E, F>(
        &self,
        def: JsonTable,
        key: &str,
        not_found: fn(String) -> StorageError,
        f: F,
    ) -> Result<T, E>
    where
        V: Serialize + DeserializeOwned,
        E: From<StorageError>,
        F: FnOnce(&mut V) -> Result<T, E>,
    {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let mut record: V = Self::load_in(&txn, def, key)?.ok_or_else(|| not_found(key.to_string()))?;

        let out = match f(&mut record) {
            Ok(out) => out,
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, key, "Failed to abort write transaction");
                }
                return Err(e);
            }
        };

        Self::store_in(&txn, def, key, &record)?;
        txn.commit().map_err(StorageError::from)?;
        Ok(out)
    }

    // ========== Products ==========

    pub fn put_product(&self, product: &Product) -> StorageResult<()> {
        self.put_json(PRODUCTS_TABLE, &product.id, product)
    }

    pub fn get_product(&self, product_id: &str) -> StorageResult<Option<Product>> {
        self.get_json(PRODUCTS_TABLE, product_id)
    }

    /// Conditional decrement over candidate slots.
    ///
    /// Slots are tried in order; the first one holding at least `quantity`
    /// is decremented and returned. `Ok(None)` means no slot had enough.
    /// The whole fallback sequence runs in one write transaction.
    pub fn try_reserve_stock(
        &self,
        product_id: &str,
        slots: &[StockSlot],
        quantity: u32,
    ) -> StorageResult<Option<StockSlot>> {
        let txn = self.db.begin_write()?;
        let mut product: Product = Self::load_in(&txn, PRODUCTS_TABLE, product_id)?
            .ok_or_else(|| StorageError::ProductNotFound(product_id.to_string()))?;

        let wanted = i64::from(quantity);
        let mut taken = None;
        for slot in slots {
            if let Some(stock) = product.stock_mut(slot)
                && *stock >= wanted
            {
                *stock -= wanted;
                taken = Some(slot.clone());
                break;
            }
        }

        match &taken {
            Some(_) => {
                Self::store_in(&txn, PRODUCTS_TABLE, product_id, &product)?;
                txn.commit()?;
            }
            None => txn.abort()?,
        }
        Ok(taken)
    }

    /// Add stock back to `slot`, applied inside `txn`.
    ///
    /// If the slot no longer exists (variant removed since the reservation)
    /// the default fallback slots are used. Returns the slot credited, or
    /// `None` when the product itself is gone.
    fn restore_stock_in(
        txn: &WriteTransaction,
        product_id: &str,
        slot: &StockSlot,
        quantity: u32,
    ) -> StorageResult<Option<StockSlot>> {
        let Some(mut product) = Self::load_in::<Product>(txn, PRODUCTS_TABLE, product_id)? else {
            return Ok(None);
        };

        let target = if product.stock_of(slot).is_some() {
            slot.clone()
        } else {
            let variant_key = match slot {
                StockSlot::Variant(key) => Some(key.as_str()),
                StockSlot::TopLevel => None,
            };
            match product.stock_slots(variant_key).into_iter().next() {
                Some(s) => s,
                None => StockSlot::TopLevel,
            }
        };

        if let Some(stock) = product.stock_mut(&target) {
            *stock += i64::from(quantity);
        }
        Self::store_in(txn, PRODUCTS_TABLE, product_id, &product)?;
        Ok(Some(target))
    }

    /// Compensating increment for a reservation that never reached the ledger
    pub fn restore_stock(
        &self,
        product_id: &str,
        slot: &StockSlot,
        quantity: u32,
    ) -> StorageResult<Option<StockSlot>> {
        let txn = self.db.begin_write()?;
        let restored = Self::restore_stock_in(&txn, product_id, slot, quantity)?;
        txn.commit()?;
        Ok(restored)
    }

    // ========== Sellers ==========

    pub fn put_seller(&self, seller: &Seller) -> StorageResult<()> {
        self.put_json(SELLERS_TABLE, &seller.id, seller)
    }

    pub fn get_seller(&self, seller_id: &str) -> StorageResult<Option<Seller>> {
        self.get_json(SELLERS_TABLE, seller_id)
    }

    pub fn list_sellers(&self) -> StorageResult<Vec<Seller>> {
        self.list_json(SELLERS_TABLE)
    }

    // ========== Couriers ==========
    // Keyed by normalized id; `Courier::id` keeps the original spelling.

    pub fn put_courier(&self, courier: &Courier) -> StorageResult<()> {
        self.put_json(COURIERS_TABLE, &normalize_identity(&courier.id), courier)
    }

    pub fn get_courier(&self, courier_id: &str) -> StorageResult<Option<Courier>> {
        self.get_json(COURIERS_TABLE, &normalize_identity(courier_id))
    }

    pub fn list_couriers(&self) -> StorageResult<Vec<Courier>> {
        self.list_json(COURIERS_TABLE)
    }

    /// Conditional courier update (presence, throttled location writes)
    pub fn update_courier<T, E, F>(&self, courier_id: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Courier) -> Result<T, E>,
    {
        let key = normalize_identity(courier_id);
        self.update_json(COURIERS_TABLE, &key, StorageError::CourierNotFound, f)
    }

    // ========== Orders ==========

    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        self.get_json(ORDERS_TABLE, order_id)
    }

    pub fn put_order(&self, order: &Order) -> StorageResult<()> {
        self.put_json(ORDERS_TABLE, &order.id, order)
    }

    pub fn list_orders(&self) -> StorageResult<Vec<Order>> {
        self.list_json(ORDERS_TABLE)
    }

    /// Orders with a wave in flight (crash recovery)
    pub fn list_active_dispatch_orders(&self) -> StorageResult<Vec<Order>> {
        Ok(self
            .list_orders()?
            .into_iter()
            .filter(|o| o.dispatch.is_active())
            .collect())
    }

    /// Conditional order update.
    ///
    /// This is the compare-and-swap primitive behind courier assignment:
    /// the closure sees the committed state and may refuse by returning `Err`.
    pub fn update_order<T, E, F>(&self, order_id: &str, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Order) -> Result<T, E>,
    {
        self.update_json(ORDERS_TABLE, order_id, StorageError::OrderNotFound, |order: &mut Order| {
            let out = f(order)?;
            order.updated_at = shared::util::now_millis();
            Ok(out)
        })
    }

    /// Persist a new order together with its reservation entries
    pub fn commit_order(&self, order: &Order, reservations: &[ReservationEntry]) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        Self::store_in(&txn, ORDERS_TABLE, &order.id, order)?;
        {
            let mut table = txn.open_table(RESERVATIONS_TABLE)?;
            for entry in reservations {
                let bytes = serde_json::to_vec(entry)?;
                table.insert((entry.order_id.as_str(), entry.line_index), bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Reservation ledger ==========

    pub fn reservations_for(&self, order_id: &str) -> StorageResult<Vec<ReservationEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RESERVATIONS_TABLE)?;
        let mut entries = Vec::new();
        for result in table.range((order_id, 0u32)..=(order_id, u32::MAX))? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    /// Void every active reservation of `order_id` and credit its stock back.
    ///
    /// Returns the entries voided by this call. Entries already voided are
    /// skipped, so calling this twice restores stock once.
    fn release_reservations_in(
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Vec<ReservationEntry>> {
        let active: Vec<ReservationEntry> = {
            let table = txn.open_table(RESERVATIONS_TABLE)?;
            let mut entries = Vec::new();
            for result in table.range((order_id, 0u32)..=(order_id, u32::MAX))? {
                let (_key, value) = result?;
                let entry: ReservationEntry = serde_json::from_slice(value.value())?;
                if !entry.voided {
                    entries.push(entry);
                }
            }
            entries
        };

        for entry in &active {
            if Self::restore_stock_in(txn, &entry.product_id, &entry.slot, entry.quantity)?.is_none() {
                tracing::warn!(
                    order_id,
                    product_id = %entry.product_id,
                    quantity = entry.quantity,
                    "Product gone, reserved stock not restored"
                );
            }
            let mut voided = entry.clone();
            voided.voided = true;
            let bytes = serde_json::to_vec(&voided)?;
            let mut table = txn.open_table(RESERVATIONS_TABLE)?;
            table.insert((order_id, entry.line_index), bytes.as_slice())?;
        }

        Ok(active)
    }

    /// Conditional order update that also releases the order's reserved
    /// stock, all in one transaction (cancellation, seller rejection).
    pub fn update_order_releasing_stock<T, E, F>(
        &self,
        order_id: &str,
        f: F,
    ) -> Result<(T, Vec<ReservationEntry>), E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Order) -> Result<T, E>,
    {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let mut order: Order = Self::load_in(&txn, ORDERS_TABLE, order_id)?
            .ok_or_else(|| StorageError::OrderNotFound(order_id.to_string()))?;

        let out = match f(&mut order) {
            Ok(out) => out,
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, order_id, "Failed to abort write transaction");
                }
                return Err(e);
            }
        };
        order.updated_at = shared::util::now_millis();

        Self::store_in(&txn, ORDERS_TABLE, order_id, &order)?;
        let released = Self::release_reservations_in(&txn, order_id)?;
        txn.commit().map_err(StorageError::from)?;
        Ok((out, released))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DeliveryAddress, DispatchState, PaymentMethod, Variant};

    fn product(stock: i64, variants: Vec<Variant>) -> Product {
        Product {
            id: "p-1".into(),
            seller_id: "s-1".into(),
            name: "Samosa".into(),
            price: 20.0,
            discount_price: None,
            stock,
            variants,
        }
    }

    fn variant(key: &str, stock: i64) -> Variant {
        Variant {
            key: key.into(),
            price: None,
            discount_price: None,
            stock,
        }
    }

    fn order(id: &str) -> Order {
        Order {
            id: id.into(),
            customer_id: None,
            items: vec![],
            subtotal: 0.0,
            delivery_fee: 0.0,
            platform_fee: 0.0,
            total: 0.0,
            delivery_address: DeliveryAddress::default(),
            payment_method: PaymentMethod::CashOnDelivery,
            status: Default::default(),
            assigned_courier: None,
            assigned_at: None,
            dispatch: DispatchState::default(),
            cancellation: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn entry(order_id: &str, line_index: u32, slot: StockSlot, quantity: u32) -> ReservationEntry {
        ReservationEntry {
            order_id: order_id.into(),
            line_index,
            product_id: "p-1".into(),
            slot,
            quantity,
            voided: false,
            created_at: 0,
        }
    }

    #[test]
    fn reserve_is_conditional() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        storage.put_product(&product(3, vec![])).unwrap();

        let slots = [StockSlot::TopLevel];
        assert_eq!(storage.try_reserve_stock("p-1", &slots, 2).unwrap(), Some(StockSlot::TopLevel));
        assert_eq!(storage.try_reserve_stock("p-1", &slots, 2).unwrap(), None);
        assert_eq!(storage.get_product("p-1").unwrap().unwrap().stock, 1);
    }

    #[test]
    fn reserve_falls_through_slots_in_order() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        storage.put_product(&product(5, vec![variant("small", 1)])).unwrap();

        let p = storage.get_product("p-1").unwrap().unwrap();
        let slots = p.stock_slots(Some("large"));
        let taken = storage.try_reserve_stock("p-1", &slots, 2).unwrap();
        assert_eq!(taken, Some(StockSlot::TopLevel));

        let p = storage.get_product("p-1").unwrap().unwrap();
        assert_eq!(p.stock, 3);
        assert_eq!(p.variants[0].stock, 1);
    }

    #[test]
    fn missing_product_is_an_error() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.try_reserve_stock("nope", &[StockSlot::TopLevel], 1),
            Err(StorageError::ProductNotFound(_))
        ));
    }

    #[test]
    fn release_is_idempotent() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        storage.put_product(&product(10, vec![])).unwrap();
        storage.try_reserve_stock("p-1", &[StockSlot::TopLevel], 2).unwrap();
        storage
            .commit_order(&order("o-1"), &[entry("o-1", 0, StockSlot::TopLevel, 2)])
            .unwrap();
        assert_eq!(storage.get_product("p-1").unwrap().unwrap().stock, 8);

        let (_, released) = storage
            .update_order_releasing_stock("o-1", |_| Ok::<_, StorageError>(()))
            .unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(storage.get_product("p-1").unwrap().unwrap().stock, 10);

        let (_, released) = storage
            .update_order_releasing_stock("o-1", |_| Ok::<_, StorageError>(()))
            .unwrap();
        assert!(released.is_empty());
        assert_eq!(storage.get_product("p-1").unwrap().unwrap().stock, 10);
        assert!(storage.reservations_for("o-1").unwrap()[0].voided);
    }

    #[test]
    fn release_uses_fallback_when_variant_removed() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        storage.put_product(&product(4, vec![variant("half", 1)])).unwrap();
        storage.try_reserve_stock("p-1", &[StockSlot::Variant("half".into())], 1).unwrap();
        storage
            .commit_order(&order("o-1"), &[entry("o-1", 0, StockSlot::Variant("half".into()), 1)])
            .unwrap();

        // Variant deleted from the catalog in the meantime
        let mut p = storage.get_product("p-1").unwrap().unwrap();
        p.variants.clear();
        storage.put_product(&p).unwrap();

        storage
            .update_order_releasing_stock("o-1", |_| Ok::<_, StorageError>(()))
            .unwrap();
        assert_eq!(storage.get_product("p-1").unwrap().unwrap().stock, 5);
    }

    #[test]
    fn refused_update_writes_nothing() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        storage.put_order(&order("o-1")).unwrap();

        let result: Result<(), StorageError> = storage.update_order("o-1", |o| {
            o.assigned_courier = Some("c-1".into());
            Err(StorageError::OrderNotFound("refused".into()))
        });
        assert!(result.is_err());
        assert_eq!(storage.get_order("o-1").unwrap().unwrap().assigned_courier, None);
    }

    #[test]
    fn couriers_are_keyed_case_insensitively() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        let courier = Courier {
            id: "Courier-7".into(),
            name: "Asha".into(),
            location: Default::default(),
            is_online: true,
            is_approved: true,
            location_updated_at: None,
        };
        storage.put_courier(&courier).unwrap();
        storage.put_courier(&courier).unwrap();

        assert_eq!(storage.list_couriers().unwrap().len(), 1);
        assert_eq!(storage.get_courier("courier-7").unwrap().unwrap().id, "Courier-7");
        let name: String = storage
            .update_courier::<_, StorageError, _>("COURIER-7", |c| Ok(c.name.clone()))
            .unwrap();
        assert_eq!(name, "Asha");
    }

    #[test]
    fn reservations_are_scoped_by_order() {
        let storage = DispatchStorage::open_in_memory().unwrap();
        storage
            .commit_order(
                &order("o-1"),
                &[
                    entry("o-1", 0, StockSlot::TopLevel, 1),
                    entry("o-1", 1, StockSlot::TopLevel, 2),
                ],
            )
            .unwrap();
        storage
            .commit_order(&order("o-10"), &[entry("o-10", 0, StockSlot::TopLevel, 5)])
            .unwrap();

        let entries = storage.reservations_for("o-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].quantity, 2);
    }

    #[test]
    fn on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.redb");
        {
            let storage = DispatchStorage::open(&path).unwrap();
            storage.put_product(&product(7, vec![])).unwrap();
        }
        let storage = DispatchStorage::open(&path).unwrap();
        assert_eq!(storage.get_product("p-1").unwrap().unwrap().stock, 7);
    }
}
