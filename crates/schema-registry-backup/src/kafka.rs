//! Kafka client plumbing for the backup engine
//!
//! Clients are created through the shared retry helper so a broker that is
//! still starting does not fail a backup immediately, and every client closes
//! on drop regardless of how its scope exits.

use std::sync::Arc;
use std::time::Duration;

use futures::executor::block_on;
use parking_lot::Mutex;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::{ClientContext, DefaultClientContext};
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::metadata::Metadata;
use rdkafka::producer::{BaseProducer, DeliveryResult, ProducerContext};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, error, info, warn};

use schema_registry_core::retry::{retry_with_deadline, KAFKA_RETRY_DEADLINE, KAFKA_RETRY_WAIT};
use schema_registry_core::RegistryConfig;

use crate::error::{BackupError, Result};

pub(crate) const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const TOPIC_CREATION_TIMEOUT: Duration = Duration::from_secs(20);

fn client_config(config: &RegistryConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bootstrap_uri)
        .set("client.id", &config.client_id);
    client_config
}

/// Consumer assigned to the single partition of `topic`, from the beginning
pub(crate) fn backup_consumer(config: &RegistryConfig, topic: &str) -> Result<BaseConsumer> {
    let mut consumer_config = client_config(config);
    consumer_config
        .set("group.id", format!("{}-backup", config.client_id))
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", config.session_timeout_ms.to_string());
    let consumer: BaseConsumer = consumer_config.create()?;

    let mut assignment = TopicPartitionList::new();
    assignment.add_partition_offset(topic, 0, Offset::Beginning)?;
    consumer.assign(&assignment)?;
    Ok(consumer)
}

/// Verify that `topic` has exactly one partition
pub(crate) fn verify_single_partition(metadata: &Metadata, topic: &str) -> Result<()> {
    let partition_count = metadata
        .topics()
        .iter()
        .find(|entry| entry.name() == topic)
        .map(|entry| entry.partitions().len())
        .unwrap_or(0);
    if partition_count != 1 {
        return Err(BackupError::PartitionCount {
            topic: topic.to_string(),
            partition_count,
        });
    }
    Ok(())
}

/// Records the first delivery failure; checked after each send and on flush
#[derive(Default)]
pub(crate) struct DeliveryTracker {
    error: Mutex<Option<KafkaError>>,
}

impl DeliveryTracker {
    pub(crate) fn check(&self) -> Result<()> {
        match self.error.lock().take() {
            Some(error) => Err(BackupError::ProducerDelivery(error)),
            None => Ok(()),
        }
    }
}

/// Producer context turning delivery callbacks into fatal backup errors
#[derive(Clone)]
pub(crate) struct CaptureErrorContext(pub(crate) Arc<DeliveryTracker>);

impl ClientContext for CaptureErrorContext {}

impl ProducerContext for CaptureErrorContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: ()) {
        if let Err((kafka_error, _)) = result {
            error!(error = %kafka_error, "restored message could not be delivered");
            let mut slot = self.0.error.lock();
            if slot.is_none() {
                *slot = Some(kafka_error.clone());
            }
        }
    }
}

/// Producer for restoration; sends are fire-and-forget, failures surface
/// through the returned tracker
pub(crate) fn restore_producer(
    config: &RegistryConfig,
) -> Result<(BaseProducer<CaptureErrorContext>, Arc<DeliveryTracker>)> {
    let tracker = Arc::new(DeliveryTracker::default());
    let mut producer_config = client_config(config);
    producer_config.set("message.timeout.ms", "5000");
    let producer: BaseProducer<CaptureErrorContext> =
        producer_config.create_with_context(CaptureErrorContext(Arc::clone(&tracker)))?;
    Ok((producer, tracker))
}

fn admin_client(config: &RegistryConfig) -> KafkaResult<AdminClient<DefaultClientContext>> {
    client_config(config).create()
}

/// Create `topic` with one compacted partition unless it already exists
///
/// Both admin client creation and the topic creation itself retry on Kafka
/// errors for up to a minute.
pub(crate) fn maybe_create_topic(config: &RegistryConfig, topic: &str) -> Result<()> {
    let admin = retry_with_deadline(
        "Kafka admin client creation",
        KAFKA_RETRY_DEADLINE,
        KAFKA_RETRY_WAIT,
        |_: &KafkaError| true,
        || admin_client(config),
    )?;

    retry_with_deadline(
        "Schemas topic creation",
        KAFKA_RETRY_DEADLINE,
        KAFKA_RETRY_WAIT,
        |_: &KafkaError| true,
        || {
            let new_topic = NewTopic::new(
                topic,
                1,
                TopicReplication::Fixed(config.replication_factor),
            )
            .set("cleanup.policy", "compact");
            let options = AdminOptions::new().operation_timeout(Some(TOPIC_CREATION_TIMEOUT));
            let results = block_on(admin.create_topics(&[new_topic], &options))?;
            for result in results {
                match result {
                    Ok(name) => info!(topic = %name, "created topic"),
                    Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        debug!(topic = %name, "topic already exists");
                    }
                    Err((name, code)) => {
                        warn!(topic = %name, code = %code, "topic creation failed");
                        return Err(KafkaError::AdminOp(code));
                    }
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}
