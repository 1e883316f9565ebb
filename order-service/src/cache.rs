use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use shared::Order;

/// Concurrent map from order identifier to the fully assembled order.
///
/// Cloning yields another handle to the same map. Entries are replaced whole
/// and handed out as `Arc`s, so a reader holds the lock only long enough to
/// clone a pointer. Every mutation is a single `insert`, which keeps the map
/// consistent even if a holder of the write lock panicked.
#[derive(Clone, Default)]
pub struct OrderCache {
    orders: Arc<RwLock<HashMap<String, Arc<Order>>>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `order.order_uid`.
    pub fn put(&self, order: Order) {
        let order = Arc::new(order);
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        orders.insert(order.order_uid.clone(), order);
    }

    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
        orders.get(order_uid).cloned()
    }

    /// Copy of every current entry, for bulk export.
    pub fn snapshot(&self) -> HashMap<String, Arc<Order>> {
        self.orders.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.orders.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
