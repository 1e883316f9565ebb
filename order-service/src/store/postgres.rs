use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use shared::Order;
use tracing::{error, warn};

use super::{OrderStore, StoreError};
use crate::models::*;
use crate::schema::{delivery, items, orders, payment};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<AsyncPgConnection>;

/// Applies pending schema migrations over a short-lived blocking connection.
pub fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}

pub async fn connect(database_url: &str, max_size: u32) -> anyhow::Result<DbPool> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder().max_size(max_size).build(config).await?;
    Ok(pool)
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn pool_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Pool(e.to_string())
}

impl OrderStore for PgOrderStore {
    async fn order_exists(&self, order_uid: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let found = diesel::select(exists(orders::table.filter(orders::order_uid.eq(order_uid))))
            .get_result::<bool>(&mut conn)
            .await?;
        Ok(found)
    }

    async fn insert_order(&self, order: &Order) -> Result<bool, StoreError> {
        if self.order_exists(&order.order_uid).await? {
            return Ok(false);
        }

        let rows = OrderRows::try_from(order)?;
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        insert_rows(&mut conn, rows).await
    }

    async fn load_all(&self) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let headers = orders::table
            .select(OrderRow::as_select())
            .load::<OrderRow>(&mut conn)
            .await?;

        let mut loaded = Vec::with_capacity(headers.len());
        for header in headers {
            let uid = header.order_uid.clone();

            let delivery_row = match delivery::table
                .filter(delivery::order_uid.eq(&uid))
                .select(DeliveryRow::as_select())
                .first::<DeliveryRow>(&mut conn)
                .await
                .optional()
            {
                Ok(Some(row)) => Some(row),
                Ok(None) => {
                    warn!(order_uid = %uid, "No delivery row stored for order");
                    None
                }
                Err(e) => {
                    error!(order_uid = %uid, "Error loading delivery: {}", e);
                    None
                }
            };

            let payment_row = match payment::table
                .filter(payment::order_uid.eq(&uid))
                .select(PaymentRow::as_select())
                .first::<PaymentRow>(&mut conn)
                .await
                .optional()
            {
                Ok(Some(row)) => Some(row),
                Ok(None) => {
                    warn!(order_uid = %uid, "No payment row stored for order");
                    None
                }
                Err(e) => {
                    error!(order_uid = %uid, "Error loading payment: {}", e);
                    None
                }
            };

            let item_rows = items::table
                .filter(items::order_uid.eq(&uid))
                .order(items::id.asc())
                .select(ItemRow::as_select())
                .load::<ItemRow>(&mut conn)
                .await
                .unwrap_or_else(|e| {
                    error!(order_uid = %uid, "Error loading items: {}", e);
                    Vec::new()
                });

            loaded.push(assemble_order(header, delivery_row, payment_row, item_rows));
        }

        Ok(loaded)
    }
}

async fn insert_rows(conn: &mut AsyncPgConnection, rows: OrderRows) -> Result<bool, StoreError> {
    conn.transaction::<_, StoreError, _>(|conn| {
        Box::pin(async move {
            let inserted = diesel::insert_into(orders::table)
                .values(&rows.header)
                .on_conflict_do_nothing()
                .execute(conn)
                .await?;
            if inserted == 0 {
                // Another writer stored the header after our existence check.
                return Ok(false);
            }

            diesel::insert_into(delivery::table)
                .values(&rows.delivery)
                .execute(conn)
                .await?;

            diesel::insert_into(payment::table)
                .values(&rows.payment)
                .execute(conn)
                .await?;

            if !rows.items.is_empty() {
                diesel::insert_into(items::table)
                    .values(&rows.items)
                    .execute(conn)
                    .await?;
            }

            Ok(true)
        })
    })
    .await
}
