use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use order_service::api;
use order_service::cache::OrderCache;
use order_service::config::Args;
use order_service::consumer::{create_consumer, group_id_for_run, subscribe, OrderConsumer};
use order_service::ingest::Ingestor;
use order_service::store::{connect, run_migrations, PgOrderStore};
use order_service::warmup::warm_cache;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // Run migrations first
    info!("Running database migrations...");
    run_migrations(&args.database_url)?;
    info!("Migrations completed successfully");

    let pool = connect(&args.database_url, args.db_pool_size).await?;
    let store = PgOrderStore::new(pool);
    let cache = OrderCache::new();

    // No serving with a cache of unknown state.
    warm_cache(&store, &cache)
        .await
        .context("Failed to load cache from database")?;

    let group_id = group_id_for_run(&args.consumer_group, args.replay_all);
    let consumer = create_consumer(&args.kafka_brokers, &group_id)?;
    subscribe(&consumer, &args.topic)?;
    if args.replay_all {
        info!("Replaying {} from the beginning as group {}", args.topic, group_id);
    }

    let ingestor = Ingestor::new(store, cache.clone())
        .with_write_order(args.write_order)
        .with_store_timeout(args.store_timeout());
    let order_consumer = OrderConsumer::new(ingestor);

    tokio::spawn(async move {
        order_consumer.run(consumer).await;
    });

    let app = api::create_router(cache);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!("Order service started on port {}", args.port);
    info!("Serving cached orders at http://0.0.0.0:{}/orders/{{id}}", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
