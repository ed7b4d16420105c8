//! Kafka reader loop
//!
//! A dedicated thread that bootstraps the schemas topic, polls records from
//! its single partition, and drives the replay state machine. Offsets of
//! applied records are forwarded to writers while this node is master, so a
//! write can await its own round-trip through the log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::executor::block_on;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use tracing::{debug, error, info, warn};

use schema_registry_core::RegistryConfig;

use crate::coordinator::MasterCoordinator;
use crate::error::{ReaderError, Result};
use crate::record::LogRecord;
use crate::stats::StatsSink;
use crate::store::SchemaStore;

/// The schemas topic must have exactly one partition to preserve ordering
const SCHEMA_TOPIC_NUM_PARTITIONS: i32 = 1;
const TOPIC_CREATION_TIMEOUT: Duration = Duration::from_secs(20);
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_TIMEOUT: Duration = Duration::from_millis(200);
const ADMIN_RETRY_WAIT: Duration = Duration::from_secs(2);
const TOPIC_RETRY_WAIT: Duration = Duration::from_secs(5);

/// Background reader replaying the schemas topic into a [`SchemaStore`]
pub struct KafkaSchemaReader {
    config: RegistryConfig,
    store: SchemaStore,
    coordinator: Option<Arc<dyn MasterCoordinator>>,
    stats: Arc<dyn StatsSink>,
    running: Arc<AtomicBool>,
    offsets: mpsc::Sender<i64>,
}

/// Handle for cooperatively stopping a running reader
pub struct ReaderHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ReaderHandle {
    /// Ask the reader to stop and wait for it to drain and close its clients
    pub fn close(self) {
        info!("closing schema reader");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.thread.join();
    }
}

impl KafkaSchemaReader {
    /// Create a reader and the receiving end of its applied-offset queue
    pub fn new(
        config: RegistryConfig,
        store: SchemaStore,
        coordinator: Option<Arc<dyn MasterCoordinator>>,
        stats: Arc<dyn StatsSink>,
    ) -> (Self, mpsc::Receiver<i64>) {
        let (offsets, offsets_rx) = mpsc::channel();
        (
            Self {
                config,
                store,
                coordinator,
                stats,
                running: Arc::new(AtomicBool::new(true)),
                offsets,
            },
            offsets_rx,
        )
    }

    /// Start the reader thread
    pub fn spawn(self) -> Result<ReaderHandle> {
        let running = Arc::clone(&self.running);
        let thread = thread::Builder::new()
            .name("schema-reader".to_string())
            .spawn(move || self.run())
            .map_err(|e| ReaderError::Core(e.into()))?;
        Ok(ReaderHandle { running, thread })
    }

    fn run(&self) {
        let mut admin: Option<AdminClient<DefaultClientContext>> = None;
        let mut topic_created = false;
        let mut consumer: Option<BaseConsumer> = None;

        while self.running.load(Ordering::SeqCst) {
            if admin.is_none() {
                match self.init_admin_client() {
                    Ok(client) => admin = Some(client),
                    Err(e) => {
                        warn!(error = %e, "no brokers available yet, retrying admin client creation");
                        thread::sleep(ADMIN_RETRY_WAIT);
                        continue;
                    }
                }
            }
            if !topic_created {
                let Some(client) = admin.as_ref() else { continue };
                match self.create_schema_topic(client) {
                    Ok(()) => topic_created = true,
                    Err(e) => {
                        error!(
                            topic = %self.config.topic_name,
                            error = %e,
                            "failed to create schemas topic, retrying",
                        );
                        thread::sleep(TOPIC_RETRY_WAIT);
                        continue;
                    }
                }
            }
            if consumer.is_none() {
                match self.init_consumer() {
                    Ok(client) => consumer = Some(client),
                    Err(e) => {
                        self.stats.unexpected_exception("schema_reader_consumer", &e);
                        error!(error = %e, "failed to initialize consumer, retrying");
                        thread::sleep(ADMIN_RETRY_WAIT);
                        continue;
                    }
                }
            }
            let Some(active) = consumer.as_ref() else { continue };
            if let Err(e) = self.handle_messages(active) {
                self.stats.unexpected_exception("schema_reader_loop", &e);
                error!(error = %e, "unexpected exception in schema reader loop");
            }
        }
        // Admin and consumer clients close on drop.
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.config.bootstrap_uri)
            .set("client.id", &self.config.client_id);
        config
    }

    fn init_admin_client(&self) -> Result<AdminClient<DefaultClientContext>> {
        Ok(self.client_config().create()?)
    }

    fn create_schema_topic(&self, admin: &AdminClient<DefaultClientContext>) -> Result<()> {
        let topic = NewTopic::new(
            &self.config.topic_name,
            SCHEMA_TOPIC_NUM_PARTITIONS,
            TopicReplication::Fixed(self.config.replication_factor),
        )
        .set("cleanup.policy", "compact");
        info!(topic = %self.config.topic_name, "creating schemas topic");

        let options = AdminOptions::new().operation_timeout(Some(TOPIC_CREATION_TIMEOUT));
        let results = block_on(admin.create_topics(&[topic], &options))?;
        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "topic created successfully"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    warn!(topic = %name, "topic already exists");
                }
                Err((name, code)) => {
                    error!(topic = %name, code = %code, "topic creation failed");
                    return Err(KafkaError::AdminOp(code).into());
                }
            }
        }
        Ok(())
    }

    fn init_consumer(&self) -> Result<BaseConsumer> {
        // The group is never used for assignment, every reader consumes the
        // whole log; commits are disabled accordingly.
        let mut config = self.client_config();
        config
            .set("group.id", format!("{}-reader", self.config.client_id))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", self.config.session_timeout_ms.to_string())
            .set("metadata.max.age.ms", self.config.metadata_max_age_ms.to_string());
        let consumer: BaseConsumer = config.create()?;

        let metadata =
            consumer.fetch_metadata(Some(&self.config.topic_name), METADATA_TIMEOUT)?;
        let partitions = metadata
            .topics()
            .iter()
            .find(|topic| topic.name() == self.config.topic_name)
            .map(|topic| topic.partitions().len())
            .unwrap_or(0);
        if partitions != 1 {
            return Err(ReaderError::PartitionCount {
                topic: self.config.topic_name.clone(),
                partitions,
            });
        }

        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(&self.config.topic_name, 0, Offset::Beginning)?;
        consumer.assign(&assignment)?;
        Ok(consumer)
    }

    fn handle_messages(&self, consumer: &BaseConsumer) -> Result<()> {
        // While not master this node must not accept direct writes, so there
        // is nothing waiting on the offset queue. While the coordinator has
        // no stable answer, records off the topic are writes performed by
        // another node.
        let add_offsets = self
            .coordinator
            .as_ref()
            .map(|coordinator| coordinator.get_master_info().is_master == Some(true))
            .unwrap_or(false);

        match consumer.poll(POLL_TIMEOUT) {
            None => {
                if !self.store.is_ready() {
                    info!("initial catch-up complete, registry is ready");
                    self.store.set_ready();
                }
            }
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(message)) => {
                let offset = message.offset();
                match message.key() {
                    None => error!(offset, "record without a key on schemas topic, skipping"),
                    Some(key) => match LogRecord::decode(key, message.payload()) {
                        Ok(record) => {
                            debug!(offset, "read new record");
                            self.store.apply(record);
                        }
                        Err(e) => {
                            error!(offset, error = %e, "invalid record on schemas topic, skipping");
                        }
                    },
                }
                // The offset advances on every polled record, skipped or not.
                self.store.set_offset(offset);
                debug!(offset = self.store.offset(), "handled message");
                if self.store.is_ready() && add_offsets {
                    let _ = self.offsets.send(offset);
                }
            }
        }
        Ok(())
    }
}
