use tracing::info;

use crate::cache::OrderCache;
use crate::store::{OrderStore, StoreError};

/// Fills `cache` with every order in `store` and returns how many were loaded.
///
/// An error means the store could not be queried at all; the cache state is
/// then unknown and the process must not start serving.
pub async fn warm_cache<S: OrderStore>(store: &S, cache: &OrderCache) -> Result<usize, StoreError> {
    let orders = store.load_all().await?;
    let count = orders.len();
    for order in orders {
        cache.put(order);
    }
    info!("Cache loaded with {} complete orders", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryOrderStore;
    use shared::{Delivery, Order, Payment};

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            delivery: Delivery { name: "Test Testov".to_string(), ..Default::default() },
            payment: Payment { currency: "USD".to_string(), ..Default::default() },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn loads_every_stored_order() {
        let store = InMemoryOrderStore::new();
        for uid in ["a", "b", "c"] {
            store.insert_order(&order(uid)).await.unwrap();
        }

        let cache = OrderCache::new();
        assert_eq!(warm_cache(&store, &cache).await.unwrap(), 3);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b").unwrap().payment.currency, "USD");
    }

    #[tokio::test]
    async fn missing_sub_rows_do_not_abort() {
        let store = InMemoryOrderStore::new();
        store.insert_order(&order("a")).await.unwrap();
        store.insert_order(&order("b")).await.unwrap();
        store.remove_delivery("a");

        let cache = OrderCache::new();
        assert_eq!(warm_cache(&store, &cache).await.unwrap(), 2);
        assert_eq!(cache.get("a").unwrap().delivery, Delivery::default());
        assert_eq!(cache.get("b").unwrap().delivery.name, "Test Testov");
    }

    #[tokio::test]
    async fn unreachable_store_is_fatal() {
        let store = InMemoryOrderStore::new();
        store.set_unreachable(true);

        let cache = OrderCache::new();
        assert!(warm_cache(&store, &cache).await.is_err());
        assert!(cache.is_empty());
    }
}
