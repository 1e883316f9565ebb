mod api;

use anyhow::Result;
use clap::Parser;
use rdkafka::config::ClientConfig;
use rdkafka::producer::FutureProducer;
use shared::DEFAULT_ORDERS_TOPIC;
use tracing::info;

#[derive(Parser)]
#[command(name = "order-publisher")]
struct Args {
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    kafka_brokers: String,

    #[arg(long, env = "ORDERS_TOPIC", default_value = DEFAULT_ORDERS_TOPIC)]
    topic: String,

    #[arg(long, env = "PORT", default_value = "4000")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &args.kafka_brokers)
        .set("message.timeout.ms", "5000")
        .create()?;

    let app_state = api::AppState {
        producer,
        topic: args.topic.clone(),
    };

    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!("Publisher started on port {}", args.port);
    info!(
        "Publishing orders to topic {} via POST http://0.0.0.0:{}/publish",
        args.topic, args.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
