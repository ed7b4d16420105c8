//! Backup/restore orchestrator
//!
//! Drives creation and restoration of backups against the single-partition
//! schemas topic. Creation is all-or-nothing: records are written through
//! [`safe_writer`] so an aborted run leaves no partial file behind.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::message::{BorrowedMessage, Headers};
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use rdkafka::Message;
use tracing::{debug, info, warn};

use schema_registry_core::{RegistryConfig, DEFAULT_SCHEMA_TOPIC};

use crate::backends::{
    safe_writer, BackupMetadata, BackupWriter, ConsumedRecord, DataFile, Instruction,
    ProducerSend, RecordHeader,
};
use crate::error::{BackupError, Result};
use crate::kafka::{
    backup_consumer, maybe_create_topic, restore_producer, verify_single_partition,
    CaptureErrorContext, METADATA_TIMEOUT,
};
use crate::key_format::KeyFormat;
use crate::poll_timeout::PollTimeout;
use crate::version::BackupVersion;

const PRODUCER_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a backup is read from or written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupLocation {
    /// Stdout on create, stdin on restore; only textual formats support it
    StdOut,
    Path(PathBuf),
}

impl BackupLocation {
    /// `""` and `"-"` mean the standard streams
    pub fn parse(input: &str) -> Self {
        match input {
            "" | "-" => BackupLocation::StdOut,
            path => BackupLocation::Path(PathBuf::from(path)),
        }
    }
}

/// Backup orchestrator for one topic
pub struct SchemaBackup {
    config: RegistryConfig,
    location: BackupLocation,
    topic_name: String,
}

impl SchemaBackup {
    pub fn new(config: RegistryConfig, location: &str, topic: Option<String>) -> Self {
        let topic_name = topic.unwrap_or_else(|| config.topic_name.clone());
        Self {
            config,
            location: BackupLocation::parse(location),
            topic_name,
        }
    }

    /// Keys of the default schemas topic are compacted by byte value, so they
    /// are canonicalized on restore; other topics only when configured.
    fn key_format(&self) -> KeyFormat {
        if self.topic_name == DEFAULT_SCHEMA_TOPIC || self.config.force_key_correction {
            KeyFormat::Canonical
        } else {
            KeyFormat::Preserve
        }
    }

    /// Create a backup of the configured topic
    ///
    /// Raises [`BackupError::StaleConsumer`] when a poll yields nothing
    /// before the end offset is reached; an empty partition is a warning and
    /// a clean return.
    pub fn create(
        &self,
        version: BackupVersion,
        poll_timeout: PollTimeout,
        overwrite: bool,
    ) -> Result<()> {
        let mut writer = version.writer(overwrite)?;
        let location_path = match (&self.location, version) {
            (BackupLocation::StdOut, BackupVersion::V3) => {
                return Err(BackupError::StdoutUnsupported)
            }
            (BackupLocation::StdOut, _) => None,
            (BackupLocation::Path(path), _) => Some(path.clone()),
        };

        let started_at = Utc::now();
        info!(format = %version, topic = %self.topic_name, "started backup");
        if let Some(path) = &location_path {
            writer.prepare_location(&self.topic_name, path)?;
        }

        let consumer = backup_consumer(&self.config, &self.topic_name)?;
        let metadata = consumer.fetch_metadata(Some(&self.topic_name), METADATA_TIMEOUT)?;
        verify_single_partition(&metadata, &self.topic_name)?;
        let partition = 0;

        let written = match &location_path {
            Some(path) => {
                let data_path = writer.start_partition(path, &self.topic_name, partition)?;
                let filename = data_path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("-")
                    .to_string();
                safe_writer(&data_path, overwrite, |out| {
                    self.write_partition(writer.as_mut(), out, &consumer, partition, poll_timeout)
                })
                .and_then(|()| writer.finalize_partition(partition, &filename))
            }
            None => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                self.write_partition(writer.as_mut(), &mut lock, &consumer, partition, poll_timeout)
                    .and_then(|()| writer.finalize_partition(partition, "-"))
            }
        };

        let data_file: DataFile = match written {
            Err(BackupError::EmptyPartition { topic, partition }) => {
                warn!(topic = %topic, partition, "topic partition is empty, nothing to back up");
                return Ok(());
            }
            other => other?,
        };

        if let Some(path) = &location_path {
            writer.store_metadata(
                path,
                &BackupMetadata {
                    topic_name: self.topic_name.clone(),
                    topic_id: None,
                    started_at,
                    finished_at: Utc::now(),
                    data_files: vec![data_file],
                },
            )?;
        }
        info!(format = %version, topic = %self.topic_name, "finished backup");
        Ok(())
    }

    fn write_partition(
        &self,
        writer: &mut dyn BackupWriter,
        out: &mut dyn Write,
        consumer: &BaseConsumer,
        partition: i32,
        poll_timeout: PollTimeout,
    ) -> Result<()> {
        let (start_offset, high_watermark) =
            consumer.fetch_watermarks(&self.topic_name, partition, METADATA_TIMEOUT)?;
        info!(
            topic = %self.topic_name,
            partition,
            start_offset,
            end_offset = high_watermark,
            "reading from topic-partition",
        );
        if start_offset >= high_watermark {
            return Err(BackupError::EmptyPartition {
                topic: self.topic_name.clone(),
                partition,
            });
        }
        // High watermark to actual end offset.
        let end_offset = high_watermark - 1;

        writer.write_header(out)?;
        let mut last_offset = start_offset;
        loop {
            match consumer.poll(poll_timeout.as_duration()) {
                None => {
                    return Err(BackupError::StaleConsumer {
                        topic: self.topic_name.clone(),
                        partition,
                        start_offset,
                        end_offset,
                        last_offset,
                        poll_timeout: poll_timeout.as_duration(),
                    });
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(message)) => {
                    let record = consumed_record(&message);
                    writer.store_record(out, &record)?;
                    last_offset = record.offset;
                    if last_offset >= end_offset {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Restore a backup into the target topic
    ///
    /// The topic is created (one compacted partition) when missing. Producer
    /// sends are fire-and-forget, but any delivery failure reported through
    /// the producer callback aborts the restore.
    pub fn restore(&self) -> Result<()> {
        let BackupLocation::Path(path) = &self.location else {
            return Err(BackupError::StdinUnsupported);
        };
        if !path.exists() {
            return Err(BackupError::LocationNotFound(path.clone()));
        }

        let version = BackupVersion::identify(path)?;
        info!(format = %version, topic = %self.topic_name, "starting backup restore");
        let reader = version.reader(self.key_format());

        // The producer only exists once a RestoreTopic instruction arrived;
        // a send before that is a backend bug.
        let mut producer: Option<(BaseProducer<CaptureErrorContext>, std::sync::Arc<crate::kafka::DeliveryTracker>)> =
            None;
        for instruction in reader.read(path, &self.topic_name)? {
            match instruction? {
                Instruction::RestoreTopic { name } => {
                    if let Some((previous, tracker)) = producer.take() {
                        flush_and_check(previous, &tracker)?;
                    }
                    maybe_create_topic(&self.config, &name)?;
                    let (new_producer, tracker) = restore_producer(&self.config)?;
                    let metadata = new_producer
                        .client()
                        .fetch_metadata(Some(&name), METADATA_TIMEOUT)?;
                    verify_single_partition(&metadata, &name)?;
                    producer = Some((new_producer, tracker));
                }
                Instruction::Send(send) => {
                    let Some((active, tracker)) = producer.as_ref() else {
                        return Err(BackupError::MissingRestoreTopic);
                    };
                    send_record(active, &send)?;
                    active.poll(Duration::ZERO);
                    tracker.check()?;
                }
            }
        }
        if let Some((active, tracker)) = producer.take() {
            flush_and_check(active, &tracker)?;
        }
        info!(topic = %self.topic_name, "finished backup restore");
        Ok(())
    }
}

fn consumed_record(message: &BorrowedMessage<'_>) -> ConsumedRecord {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| RecordHeader {
                    key: Some(header.key.as_bytes().to_vec()),
                    value: header.value.map(<[u8]>::to_vec),
                })
                .collect()
        })
        .unwrap_or_default();
    ConsumedRecord {
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec),
        headers,
        timestamp_ms: message.timestamp().to_millis(),
        partition: message.partition(),
        offset: message.offset(),
    }
}

fn send_record(
    producer: &BaseProducer<CaptureErrorContext>,
    send: &ProducerSend,
) -> Result<()> {
    debug!(
        topic = %send.topic_name,
        partition = send.partition_index,
        "sending restored record",
    );
    let mut record = BaseRecord::<Vec<u8>, Vec<u8>>::to(&send.topic_name)
        .partition(send.partition_index);
    if let Some(key) = &send.key {
        record = record.key(key);
    }
    if let Some(value) = &send.value {
        record = record.payload(value);
    }
    if let Some(timestamp) = send.timestamp_ms {
        record = record.timestamp(timestamp);
    }
    if !send.headers.is_empty() {
        let mut headers = rdkafka::message::OwnedHeaders::new();
        for header in &send.headers {
            // The client cannot express a null header key; it degrades to an
            // empty string while the on-disk format keeps the distinction.
            let key = match &header.key {
                Some(bytes) => std::str::from_utf8(bytes).map_err(|_| {
                    BackupError::Corrupt("header key is not valid UTF-8".to_string())
                })?,
                None => "",
            };
            headers = headers.insert(rdkafka::message::Header {
                key,
                value: header.value.as_deref(),
            });
        }
        record = record.headers(headers);
    }
    producer
        .send(record)
        .map_err(|(error, _)| BackupError::from(error))?;
    Ok(())
}

fn flush_and_check(
    producer: BaseProducer<CaptureErrorContext>,
    tracker: &crate::kafka::DeliveryTracker,
) -> Result<()> {
    producer.flush(PRODUCER_FLUSH_TIMEOUT)?;
    tracker.check()
}
