//! Turning one feed message into a cached and stored order.
//!
//! A message moves through `parse -> cache -> persist`. Parsing failures are
//! terminal and touch nothing. Persistence failures are reported but never
//! retried here; the feed's redelivery plus the idempotent insert take care of
//! replays.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::{normalize_date_created, Order};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::OrderCache;
use crate::store::{OrderStore, StoreError};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// When the cache sees an order relative to the durable write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WriteOrder {
    /// Cache immediately, then persist. Readers may see an order whose
    /// persistence later fails.
    #[default]
    CacheFirst,
    /// Persist, then cache only if the store holds the order.
    PersistFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    /// The store already held the order; nothing was written.
    Duplicate,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid order payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("order payload has no order_uid")]
    MissingOrderUid,

    #[error("failed to persist order {order_uid}: {source}")]
    Persist {
        order_uid: String,
        #[source]
        source: StoreError,
    },
}

/// Decodes a feed payload into an order, normalizing `date_created` against
/// `now` first.
pub fn parse_order(payload: &[u8], now: DateTime<Utc>) -> Result<Order, IngestError> {
    let mut value: Value = serde_json::from_slice(payload)?;
    if normalize_date_created(&mut value, now) {
        debug!("date_created missing or unparsable, using processing time");
    }

    let order: Order = serde_json::from_value(value)?;
    if order.order_uid.is_empty() {
        return Err(IngestError::MissingOrderUid);
    }
    Ok(order)
}

pub struct Ingestor<S> {
    store: S,
    cache: OrderCache,
    write_order: WriteOrder,
    store_timeout: Duration,
}

impl<S: OrderStore> Ingestor<S> {
    pub fn new(store: S, cache: OrderCache) -> Self {
        Self {
            store,
            cache,
            write_order: WriteOrder::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_write_order(mut self, write_order: WriteOrder) -> Self {
        self.write_order = write_order;
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one message through the pipeline.
    pub async fn ingest(&self, payload: &[u8]) -> Result<IngestOutcome, IngestError> {
        let order = parse_order(payload, Utc::now())?;

        let outcome = match self.write_order {
            WriteOrder::CacheFirst => {
                self.cache.put(order.clone());
                self.persist(&order).await?
            }
            WriteOrder::PersistFirst => {
                let outcome = self.persist(&order).await?;
                self.cache.put(order.clone());
                outcome
            }
        };

        match outcome {
            IngestOutcome::Inserted => info!(order_uid = %order.order_uid, "Order saved"),
            IngestOutcome::Duplicate => {
                info!(order_uid = %order.order_uid, "Order already stored, skipping save")
            }
        }
        Ok(outcome)
    }

    async fn persist(&self, order: &Order) -> Result<IngestOutcome, IngestError> {
        let inserted = tokio::time::timeout(self.store_timeout, self.store.insert_order(order))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.store_timeout)));

        match inserted {
            Ok(true) => Ok(IngestOutcome::Inserted),
            Ok(false) => Ok(IngestOutcome::Duplicate),
            Err(source) => Err(IngestError::Persist {
                order_uid: order.order_uid.clone(),
                source,
            }),
        }
    }
}
