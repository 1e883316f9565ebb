use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use shared::Order;

use super::{OrderStore, StoreError};
use crate::models::*;

/// Points inside an insert where a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    AfterHeader,
    AfterPayment,
}

/// Number of rows stored for one order, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub orders: usize,
    pub delivery: usize,
    pub payment: usize,
    pub items: usize,
}

#[derive(Default)]
struct Tables {
    orders: HashMap<String, OrderRow>,
    delivery: HashMap<String, DeliveryRow>,
    payment: HashMap<String, PaymentRow>,
    items: Vec<ItemRow>,
    next_item_id: i64,
}

impl Tables {
    fn discard(&mut self, order_uid: &str) {
        self.orders.remove(order_uid);
        self.delivery.remove(order_uid);
        self.payment.remove(order_uid);
        self.items.retain(|row| row.order_uid != order_uid);
    }
}

/// Open write for one order. Dropped without `commit` it removes every row it
/// wrote.
struct Tx<'a> {
    tables: &'a mut Tables,
    order_uid: String,
    committed: bool,
}

impl<'a> Tx<'a> {
    fn begin(tables: &'a mut Tables, order_uid: &str) -> Self {
        Self { tables, order_uid: order_uid.to_string(), committed: false }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.tables.discard(&self.order_uid);
        }
    }
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    fail_at: Mutex<Option<FailPoint>>,
    unreachable: Mutex<bool>,
    latency: Mutex<Option<Duration>>,
}

/// Process-local store with the same contract as the Postgres one: idempotent,
/// all-or-nothing inserts and tolerant loads. Clones share the same tables.
///
/// Failures and latency can be injected to exercise the error paths of the
/// ingestion pipeline.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following insert fail at `point`, or clears the failure.
    pub fn fail_inserts_at(&self, point: Option<FailPoint>) {
        *lock(&self.inner.fail_at) = point;
    }

    /// Makes every operation fail as if the database could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        *lock(&self.inner.unreachable) = unreachable;
    }

    /// Delays every operation by `latency` before it touches the tables.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.inner.latency) = latency;
    }

    pub fn row_counts(&self, order_uid: &str) -> RowCounts {
        let tables = lock(&self.inner.tables);
        RowCounts {
            orders: usize::from(tables.orders.contains_key(order_uid)),
            delivery: usize::from(tables.delivery.contains_key(order_uid)),
            payment: usize::from(tables.payment.contains_key(order_uid)),
            items: tables.items.iter().filter(|row| row.order_uid == order_uid).count(),
        }
    }

    /// Removes the delivery row of an order, leaving the rest in place.
    pub fn remove_delivery(&self, order_uid: &str) -> bool {
        lock(&self.inner.tables).delivery.remove(order_uid).is_some()
    }

    /// Removes the payment row of an order, leaving the rest in place.
    pub fn remove_payment(&self, order_uid: &str) -> bool {
        lock(&self.inner.tables).payment.remove(order_uid).is_some()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = *lock(&self.inner.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if *lock(&self.inner.unreachable) {
            return Err(StoreError::Pool("store unreachable".to_string()));
        }
        Ok(())
    }

    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        match *lock(&self.inner.fail_at) {
            Some(fail_at) if fail_at == point => Err(StoreError::Injected(match point {
                FailPoint::AfterHeader => "after header insert",
                FailPoint::AfterPayment => "after payment insert",
            })),
            _ => Ok(()),
        }
    }
}

impl OrderStore for InMemoryOrderStore {
    async fn order_exists(&self, order_uid: &str) -> Result<bool, StoreError> {
        self.enter().await?;
        Ok(lock(&self.inner.tables).orders.contains_key(order_uid))
    }

    async fn insert_order(&self, order: &Order) -> Result<bool, StoreError> {
        self.enter().await?;
        let rows = OrderRows::try_from(order)?;

        let mut tables = lock(&self.inner.tables);
        if tables.orders.contains_key(&order.order_uid) {
            return Ok(false);
        }

        let mut tx = Tx::begin(&mut tables, &order.order_uid);
        tx.tables.orders.insert(rows.header.order_uid.clone(), rows.header);
        self.check(FailPoint::AfterHeader)?;

        tx.tables.delivery.insert(rows.delivery.order_uid.clone(), rows.delivery);
        tx.tables.payment.insert(rows.payment.order_uid.clone(), rows.payment);
        self.check(FailPoint::AfterPayment)?;

        for item in rows.items {
            tx.tables.next_item_id += 1;
            let id = tx.tables.next_item_id;
            tx.tables.items.push(ItemRow {
                id,
                chrt_id: item.chrt_id,
                order_uid: item.order_uid,
                track_number: item.track_number,
                price: item.price,
                rid: item.rid,
                name: item.name,
                sale: item.sale,
                size: item.size,
                total_price: item.total_price,
                nm_id: item.nm_id,
                brand: item.brand,
                status: item.status,
            });
        }

        tx.commit();
        Ok(true)
    }

    async fn load_all(&self) -> Result<Vec<Order>, StoreError> {
        self.enter().await?;
        let tables = lock(&self.inner.tables);

        let mut headers: Vec<&OrderRow> = tables.orders.values().collect();
        headers.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));

        let loaded = headers
            .into_iter()
            .map(|header| {
                let uid = &header.order_uid;
                let delivery_row = tables.delivery.get(uid).cloned();
                if delivery_row.is_none() {
                    tracing::warn!(order_uid = %uid, "No delivery row stored for order");
                }
                let payment_row = tables.payment.get(uid).cloned();
                if payment_row.is_none() {
                    tracing::warn!(order_uid = %uid, "No payment row stored for order");
                }
                let item_rows = tables
                    .items
                    .iter()
                    .filter(|row| &row.order_uid == uid)
                    .cloned()
                    .collect();
                assemble_order(header.clone(), delivery_row, payment_row, item_rows)
            })
            .collect();

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Delivery, Item, Payment};

    fn order(uid: &str, items: usize) -> Order {
        Order {
            order_uid: uid.to_string(),
            delivery: Delivery { city: "Kiryat Mozkin".to_string(), ..Default::default() },
            payment: Payment { amount: 1817.0, ..Default::default() },
            items: (0..items)
                .map(|i| Item { chrt_id: i as i64, ..Default::default() })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn second_insert_is_a_no_op() {
        let store = InMemoryOrderStore::new();
        assert!(store.insert_order(&order("a", 2)).await.unwrap());
        assert!(!store.insert_order(&order("a", 5)).await.unwrap());

        let counts = store.row_counts("a");
        assert_eq!(counts, RowCounts { orders: 1, delivery: 1, payment: 1, items: 2 });
    }

    #[tokio::test]
    async fn failed_insert_leaves_no_rows() {
        let store = InMemoryOrderStore::new();
        for point in [FailPoint::AfterHeader, FailPoint::AfterPayment] {
            store.fail_inserts_at(Some(point));
            assert!(store.insert_order(&order("a", 3)).await.is_err());
            assert_eq!(store.row_counts("a"), RowCounts::default());
            assert!(!store.order_exists("a").await.unwrap());
        }

        store.fail_inserts_at(None);
        assert!(store.insert_order(&order("a", 3)).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected_before_writing() {
        let store = InMemoryOrderStore::new();
        let mut bad = order("a", 1);
        bad.payment.goods_total = f64::INFINITY;

        let err = store.insert_order(&bad).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidAmount { field: "payment.goods_total", .. }));
        assert_eq!(store.row_counts("a"), RowCounts::default());
    }

    #[tokio::test]
    async fn load_all_keeps_item_order_and_tolerates_gaps() {
        let store = InMemoryOrderStore::new();
        store.insert_order(&order("a", 3)).await.unwrap();
        store.insert_order(&order("b", 0)).await.unwrap();
        assert!(store.remove_payment("b"));

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let chrt_ids: Vec<i64> = loaded[0].items.iter().map(|i| i.chrt_id).collect();
        assert_eq!(chrt_ids, vec![0, 1, 2]);
        assert_eq!(loaded[1].payment, Payment::default());
        assert_eq!(loaded[1].delivery.city, "Kiryat Mozkin");
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_call() {
        let store = InMemoryOrderStore::new();
        store.set_unreachable(true);
        assert!(store.order_exists("a").await.is_err());
        assert!(store.insert_order(&order("a", 1)).await.is_err());
        assert!(store.load_all().await.is_err());
    }
}
