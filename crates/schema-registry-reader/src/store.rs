//! Log-replay state machine
//!
//! [`SchemaStore`] holds the materialized registry state. Records are applied
//! in strict log order by a single writer (the reader loop); request handlers
//! read concurrently. There is no GIL to lean on here, so the subject table
//! and the id table live under one lock.
//!
//! Invariants maintained across every applied record:
//!
//! - `global_schema_id` never decreases and is >= every id in the id table.
//! - Every id referenced by a subject version is present in the id table
//!   (dangling ids in the table itself are fine after deletions).
//! - Versions within a subject are ordered ascending.
//! - Replaying the same records twice produces equal state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use schema_registry_core::{CompatibilityMode, SchemaId, SchemaKind, TypedSchema, Version};

use crate::record::{LogRecord, SchemaValue};

/// One registered version of a subject
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectVersion {
    pub version: Version,
    pub schema: Arc<TypedSchema>,
    pub id: SchemaId,
    pub deleted: bool,
}

/// A named evolution lineage of schemas
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subject {
    /// Per-subject compatibility override
    pub compatibility: Option<CompatibilityMode>,
    /// Versions in ascending order
    pub versions: BTreeMap<Version, SubjectVersion>,
}

impl Subject {
    /// The highest live (non-deleted) version, if any
    pub fn latest_live(&self) -> Option<&SubjectVersion> {
        self.versions.values().rev().find(|v| !v.deleted)
    }
}

#[derive(Debug)]
struct StoreInner {
    subjects: HashMap<String, Subject>,
    schemas_by_id: HashMap<SchemaId, Arc<TypedSchema>>,
    global_schema_id: SchemaId,
    global_compatibility: CompatibilityMode,
    offset: i64,
    ready: bool,
}

/// Point-in-time copy of the registry state, used by tests and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub subjects: HashMap<String, Subject>,
    pub schemas_by_id: HashMap<SchemaId, Arc<TypedSchema>>,
    pub global_schema_id: SchemaId,
    pub global_compatibility: CompatibilityMode,
    pub offset: i64,
}

/// Shared, lock-guarded registry state
#[derive(Clone)]
pub struct SchemaStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl SchemaStore {
    /// Create an empty store with the configured global compatibility mode
    pub fn new(global_compatibility: CompatibilityMode) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                subjects: HashMap::new(),
                schemas_by_id: HashMap::new(),
                global_schema_id: SchemaId(0),
                global_compatibility,
                offset: 0,
                ready: false,
            })),
        }
    }

    /// Apply one decoded log record
    ///
    /// Locally recoverable problems (unknown schema type, unparseable schema
    /// text, references to missing subjects or versions) are logged and
    /// skipped; replay never halts on them.
    pub fn apply(&self, record: LogRecord) {
        let mut inner = self.inner.write();
        match record {
            LogRecord::Config {
                subject: Some(subject),
                value: None,
            } => {
                info!(subject = %subject, "deleting compatibility config for subject");
                if let Some(entry) = inner.subjects.get_mut(&subject) {
                    entry.compatibility = None;
                }
            }
            LogRecord::Config {
                subject: Some(subject),
                value: Some(value),
            } => {
                info!(
                    subject = %subject,
                    compatibility = %value.compatibility_level,
                    "setting subject compatibility",
                );
                inner
                    .subjects
                    .entry(subject)
                    .or_default()
                    .compatibility = Some(value.compatibility_level);
            }
            LogRecord::Config {
                subject: None,
                value: Some(value),
            } => {
                info!(compatibility = %value.compatibility_level, "setting global compatibility");
                inner.global_compatibility = value.compatibility_level;
            }
            LogRecord::Config {
                subject: None,
                value: None,
            } => {
                error!("CONFIG tombstone without a subject, ignoring");
            }
            LogRecord::Schema {
                subject,
                version,
                value: None,
            } => {
                info!(subject = %subject, version = %version, "deleting subject version completely");
                match inner.subjects.get_mut(&subject) {
                    None => error!(subject = %subject, "subject did not exist, should have"),
                    Some(entry) => {
                        if entry.versions.remove(&version).is_none() {
                            error!(
                                subject = %subject,
                                version = %version,
                                "version did not exist, should have",
                            );
                        }
                    }
                }
            }
            LogRecord::Schema {
                value: Some(value), ..
            } => {
                inner.apply_schema(value);
            }
            LogRecord::DeleteSubject { value: None } => {
                error!("DELETE_SUBJECT record without a value, ignoring");
            }
            LogRecord::DeleteSubject { value: Some(value) } => {
                info!(subject = %value.subject, version = %value.version, "deleting subject");
                match inner.subjects.get_mut(&value.subject) {
                    None => {
                        error!(subject = %value.subject, "subject did not exist, should have");
                    }
                    Some(entry) => {
                        for schema in entry.versions.values_mut() {
                            if schema.version <= value.version {
                                schema.deleted = true;
                            }
                        }
                    }
                }
            }
            LogRecord::Noop => {}
        }
    }

    /// Resolve the id for a schema submitted through the API
    ///
    /// Returns the id of an equal schema when one is known, otherwise
    /// allocates the next global id. The allocation is provisional: the
    /// authoritative id is whatever lands on the log.
    pub fn get_schema_id(&self, new_schema: &TypedSchema) -> SchemaId {
        let mut inner = self.inner.write();
        if let Some(id) = inner
            .schemas_by_id
            .iter()
            .find(|(_, schema)| schema.as_ref() == new_schema)
            .map(|(id, _)| *id)
        {
            return id;
        }
        inner.global_schema_id = inner.global_schema_id.next();
        inner.global_schema_id
    }

    /// Versions of a subject, optionally including soft-deleted entries
    pub fn schemas(
        &self,
        subject: &str,
        include_deleted: bool,
    ) -> Option<BTreeMap<Version, SubjectVersion>> {
        let inner = self.inner.read();
        let entry = inner.subjects.get(subject)?;
        Some(
            entry
                .versions
                .iter()
                .filter(|(_, v)| include_deleted || !v.deleted)
                .map(|(version, v)| (*version, v.clone()))
                .collect(),
        )
    }

    /// Schema registered under an id
    pub fn schema_by_id(&self, id: SchemaId) -> Option<Arc<TypedSchema>> {
        self.inner.read().schemas_by_id.get(&id).cloned()
    }

    /// Compatibility mode in effect for a subject
    pub fn compatibility_for(&self, subject: &str) -> CompatibilityMode {
        let inner = self.inner.read();
        inner
            .subjects
            .get(subject)
            .and_then(|entry| entry.compatibility)
            .unwrap_or(inner.global_compatibility)
    }

    /// Current global compatibility mode
    pub fn global_compatibility(&self) -> CompatibilityMode {
        self.inner.read().global_compatibility
    }

    /// Highest id ever observed on the log or allocated locally
    pub fn global_schema_id(&self) -> SchemaId {
        self.inner.read().global_schema_id
    }

    /// Last successfully applied log offset
    pub fn offset(&self) -> i64 {
        self.inner.read().offset
    }

    /// Advance the applied-offset marker
    pub fn set_offset(&self, offset: i64) {
        self.inner.write().offset = offset;
    }

    /// Whether initial catch-up has completed
    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Mark initial catch-up as complete
    pub fn set_ready(&self) {
        self.inner.write().ready = true;
    }

    /// Copy the current state
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        StoreSnapshot {
            subjects: inner.subjects.clone(),
            schemas_by_id: inner.schemas_by_id.clone(),
            global_schema_id: inner.global_schema_id,
            global_compatibility: inner.global_compatibility,
            offset: inner.offset,
        }
    }
}

impl StoreInner {
    fn apply_schema(&mut self, value: SchemaValue) {
        let kind = match value.schema_type.as_deref().unwrap_or("AVRO").parse::<SchemaKind>() {
            Ok(kind) => kind,
            Err(_) => {
                error!(
                    schema_type = value.schema_type.as_deref().unwrap_or("AVRO"),
                    "invalid schema type",
                );
                return;
            }
        };
        let typed = match TypedSchema::parse(kind, &value.schema) {
            Ok(typed) => Arc::new(typed),
            Err(e) => {
                error!(subject = %value.subject, error = %e, "invalid schema on log");
                return;
            }
        };
        debug!(subject = %value.subject, id = value.id, "got typed schema");

        let id = SchemaId(value.id);
        let version = value.version;
        match self.subjects.get_mut(&value.subject) {
            None => {
                info!(subject = %value.subject, version = %version, "adding first version of subject");
                let mut versions = BTreeMap::new();
                versions.insert(
                    version,
                    SubjectVersion {
                        version,
                        schema: Arc::clone(&typed),
                        id,
                        deleted: value.deleted,
                    },
                );
                self.subjects.insert(
                    value.subject,
                    Subject {
                        compatibility: None,
                        versions,
                    },
                );
                self.schemas_by_id.insert(id, typed);
                if id > self.global_schema_id {
                    self.global_schema_id = id;
                }
            }
            Some(entry) if value.deleted => {
                info!(subject = %value.subject, version = %version, "soft-deleting subject version");
                match entry.versions.get_mut(&version) {
                    // An unseen version arriving already deleted only
                    // registers the schema id; the version itself is not
                    // added.
                    None => {
                        self.schemas_by_id.insert(id, typed);
                    }
                    Some(existing) => existing.deleted = true,
                }
            }
            Some(entry) => {
                info!(subject = %value.subject, version = %version, "adding new version of subject");
                entry.versions.insert(
                    version,
                    SubjectVersion {
                        version,
                        schema: Arc::clone(&typed),
                        id,
                        deleted: false,
                    },
                );
                self.schemas_by_id.insert(id, typed);
                if id > self.global_schema_id {
                    self.global_schema_id = id;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ConfigValue, DeleteSubjectValue};
    use proptest::prelude::*;

    fn config_record(subject: Option<&str>, mode: Option<CompatibilityMode>) -> LogRecord {
        LogRecord::Config {
            subject: subject.map(String::from),
            value: mode.map(|compatibility_level| ConfigValue { compatibility_level }),
        }
    }

    fn schema_record(subject: &str, version: u32, id: u32, schema: &str) -> LogRecord {
        LogRecord::Schema {
            subject: subject.to_string(),
            version: Version(version),
            value: Some(SchemaValue {
                subject: subject.to_string(),
                version: Version(version),
                id,
                schema: schema.to_string(),
                schema_type: Some("AVRO".to_string()),
                deleted: false,
            }),
        }
    }

    fn deleted_schema_record(subject: &str, version: u32, id: u32, schema: &str) -> LogRecord {
        let LogRecord::Schema { subject, version, value } = schema_record(subject, version, id, schema)
        else {
            unreachable!()
        };
        LogRecord::Schema {
            subject,
            version,
            value: value.map(|mut v| {
                v.deleted = true;
                v
            }),
        }
    }

    #[test]
    fn test_config_then_schema_for_new_subject() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(config_record(Some("s"), Some(CompatibilityMode::Backward)));
        store.apply(schema_record("s", 1, 1, "\"int\""));

        assert_eq!(store.compatibility_for("s"), CompatibilityMode::Backward);
        let versions = store.schemas("s", false).unwrap();
        assert_eq!(versions.len(), 1);
        let entry = &versions[&Version(1)];
        assert_eq!(entry.id, SchemaId(1));
        assert!(!entry.deleted);
        assert_eq!(store.global_schema_id(), SchemaId(1));
    }

    #[test]
    fn test_config_for_unknown_subject_creates_empty_subject() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(config_record(Some("empty"), Some(CompatibilityMode::Full)));
        assert_eq!(store.compatibility_for("empty"), CompatibilityMode::Full);
        assert!(store.schemas("empty", true).unwrap().is_empty());
    }

    #[test]
    fn test_config_tombstone_removes_subject_override() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(config_record(Some("s"), Some(CompatibilityMode::Full)));
        store.apply(config_record(Some("s"), None));
        assert_eq!(store.compatibility_for("s"), CompatibilityMode::Backward);

        // Tombstone for an unknown subject is ignored.
        store.apply(config_record(Some("ghost"), None));
        assert!(store.schemas("ghost", true).is_none());
    }

    #[test]
    fn test_global_config_update() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(config_record(None, Some(CompatibilityMode::FullTransitive)));
        assert_eq!(store.global_compatibility(), CompatibilityMode::FullTransitive);
        assert_eq!(store.compatibility_for("anything"), CompatibilityMode::FullTransitive);
    }

    #[test]
    fn test_schema_tombstone_removes_version_but_keeps_id() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("s", 1, 1, "\"int\""));
        store.apply(LogRecord::Schema {
            subject: "s".to_string(),
            version: Version(1),
            value: None,
        });

        assert!(store.schemas("s", true).unwrap().is_empty());
        assert!(store.schema_by_id(SchemaId(1)).is_some());
    }

    #[test]
    fn test_global_id_tracks_maximum_with_gaps() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("a", 1, 5, "\"int\""));
        assert_eq!(store.global_schema_id(), SchemaId(5));
        store.apply(schema_record("b", 1, 3, "\"string\""));
        assert_eq!(store.global_schema_id(), SchemaId(5));
    }

    #[test]
    fn test_delete_subject_marks_versions_up_to_requested() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("s", 1, 1, "\"int\""));
        store.apply(schema_record("s", 2, 2, "\"long\""));
        store.apply(schema_record("s", 3, 3, "\"string\""));
        store.apply(LogRecord::DeleteSubject {
            value: Some(DeleteSubjectValue {
                subject: "s".to_string(),
                version: Version(2),
            }),
        });

        let all = store.schemas("s", true).unwrap();
        assert!(all[&Version(1)].deleted);
        assert!(all[&Version(2)].deleted);
        assert!(!all[&Version(3)].deleted);

        let live = store.schemas("s", false).unwrap();
        assert_eq!(live.keys().copied().collect::<Vec<_>>(), vec![Version(3)]);
    }

    #[test]
    fn test_delete_subject_for_unknown_subject_is_ignored() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(LogRecord::DeleteSubject {
            value: Some(DeleteSubjectValue {
                subject: "ghost".to_string(),
                version: Version(1),
            }),
        });
        assert!(store.schemas("ghost", true).is_none());
    }

    #[test]
    fn test_deleted_flag_for_unseen_version_only_registers_id() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("s", 1, 1, "\"int\""));
        store.apply(deleted_schema_record("s", 2, 7, "\"string\""));

        // The version was not added...
        assert!(!store.schemas("s", true).unwrap().contains_key(&Version(2)));
        // ...but the schema id is known.
        assert!(store.schema_by_id(SchemaId(7)).is_some());
    }

    #[test]
    fn test_deleted_flag_for_existing_version_soft_deletes() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("s", 1, 1, "\"int\""));
        store.apply(deleted_schema_record("s", 1, 1, "\"int\""));
        assert!(store.schemas("s", true).unwrap()[&Version(1)].deleted);
        assert!(store.schemas("s", false).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_schema_type_is_skipped() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(LogRecord::Schema {
            subject: "s".to_string(),
            version: Version(1),
            value: Some(SchemaValue {
                subject: "s".to_string(),
                version: Version(1),
                id: 1,
                schema: "\"int\"".to_string(),
                schema_type: Some("THRIFT".to_string()),
                deleted: false,
            }),
        });
        assert!(store.schemas("s", true).is_none());
        assert_eq!(store.global_schema_id(), SchemaId(0));
    }

    #[test]
    fn test_invalid_schema_text_is_skipped() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(LogRecord::Schema {
            subject: "s".to_string(),
            version: Version(1),
            value: Some(SchemaValue {
                subject: "s".to_string(),
                version: Version(1),
                id: 1,
                schema: "{not json".to_string(),
                schema_type: Some("AVRO".to_string()),
                deleted: false,
            }),
        });
        assert!(store.schemas("s", true).is_none());
    }

    #[test]
    fn test_get_schema_id_reuses_id_of_equal_schema() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("s", 1, 4, "\"int\""));

        let equal = TypedSchema::parse(SchemaKind::Avro, "\"int\"").unwrap();
        assert_eq!(store.get_schema_id(&equal), SchemaId(4));

        let fresh = TypedSchema::parse(SchemaKind::Avro, "\"boolean\"").unwrap();
        assert_eq!(store.get_schema_id(&fresh), SchemaId(5));
        // Allocation is monotonic.
        assert_eq!(store.global_schema_id(), SchemaId(5));
    }

    #[test]
    fn test_latest_live_version() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("s", 1, 1, "\"int\""));
        store.apply(schema_record("s", 2, 2, "\"long\""));
        store.apply(deleted_schema_record("s", 2, 2, "\"long\""));
        let snapshot = store.snapshot();
        let latest = snapshot.subjects["s"].latest_live().unwrap();
        assert_eq!(latest.version, Version(1));
    }

    #[test]
    fn test_live_version_ids_exist_in_id_table() {
        let store = SchemaStore::new(CompatibilityMode::Backward);
        store.apply(schema_record("a", 1, 1, "\"int\""));
        store.apply(schema_record("a", 2, 2, "\"long\""));
        store.apply(schema_record("b", 1, 2, "\"long\""));
        let snapshot = store.snapshot();
        for subject in snapshot.subjects.values() {
            for version in subject.versions.values() {
                assert!(snapshot.schemas_by_id.contains_key(&version.id));
            }
        }
    }

    proptest! {
        /// Replaying the same record sequence twice yields equal state.
        #[test]
        fn prop_replay_is_deterministic(ops in proptest::collection::vec((0u8..4, 1u32..4, 1u32..6), 0..40)) {
            let records: Vec<LogRecord> = ops
                .into_iter()
                .map(|(op, version, id)| match op {
                    0 => schema_record("s", version, id, "\"int\""),
                    1 => deleted_schema_record("s", version, id, "\"string\""),
                    2 => LogRecord::DeleteSubject {
                        value: Some(DeleteSubjectValue {
                            subject: "s".to_string(),
                            version: Version(version),
                        }),
                    },
                    _ => config_record(Some("s"), Some(CompatibilityMode::Full)),
                })
                .collect();

            let first = SchemaStore::new(CompatibilityMode::Backward);
            let second = SchemaStore::new(CompatibilityMode::Backward);
            for record in &records {
                first.apply(record.clone());
            }
            for record in &records {
                second.apply(record.clone());
            }
            prop_assert_eq!(first.snapshot(), second.snapshot());
        }
    }
}
