use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ingest::{IngestError, Ingestor};
use crate::store::OrderStore;

/// Group id to consume under for this run.
///
/// With `replay_all` every run joins a group of its own. Such a group has no
/// committed offsets, so `auto.offset.reset=earliest` delivers the whole
/// backlog again. Otherwise the configured group resumes where it left off.
pub fn group_id_for_run(group: &str, replay_all: bool) -> String {
    if replay_all {
        format!("{}-{}", group, Uuid::new_v4().simple())
    } else {
        group.to_string()
    }
}

pub fn create_consumer(brokers: &str, group_id: &str) -> KafkaResult<StreamConsumer> {
    ClientConfig::new()
        .set("group.id", group_id)
        .set("bootstrap.servers", brokers)
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        // Pick up the topic soon after its first publish.
        .set("topic.metadata.refresh.interval.ms", "5000")
        .create()
}

/// Attaches `consumer` to `topic`. The topic need not exist yet; partitions
/// are assigned by the group once it does.
pub fn subscribe(consumer: &StreamConsumer, topic: &str) -> KafkaResult<()> {
    consumer.subscribe(&[topic])?;
    info!("Subscribed to {}", topic);
    Ok(())
}

/// Drives the ingestion pipeline from a feed subscription, one message at a
/// time. A message's offset is committed once it reached a terminal state.
pub struct OrderConsumer<S> {
    ingestor: Ingestor<S>,
}

impl<S: OrderStore> OrderConsumer<S> {
    pub fn new(ingestor: Ingestor<S>) -> Self {
        Self { ingestor }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    match m.payload() {
                        Some(payload) => {
                            if let Err(e) = self.ingestor.ingest(payload).await {
                                report(&e, m.partition(), m.offset());
                            }
                        }
                        None => warn!(
                            "Skipping empty message at partition {} offset {}",
                            m.partition(),
                            m.offset()
                        ),
                    }
                    if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                        error!("Error committing message: {}", e);
                    }
                }
                Err(e) => error!("Error receiving message: {}", e),
            }
        }
    }
}

fn report(e: &IngestError, partition: i32, offset: i64) {
    match e {
        IngestError::Parse(_) | IngestError::MissingOrderUid => warn!(
            "Dropping invalid order message at partition {} offset {}: {}",
            partition, offset, e
        ),
        IngestError::Persist { .. } => error!("Error saving order to DB: {}", e),
    }
}
