use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use crudapi_core::{IdKind, RecordMap, generate_uuid, id_to_string};
use crudapi_query::{IncludePath, QueryDescriptor};
use crudapi_storage::{DataLayer, FindManyResult, Selector, StorageError};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::include::{Tables, hydrate};
use crate::query::{matches, sort_records};

const DEFAULT_ID_KEY: &str = "id";

/// In-memory data layer.
///
/// Records are kept per resource type in insertion order, keyed by the
/// string form of their id field. The id field is `"id"` unless
/// [`with_id_key`](Self::with_id_key) names another one for a resource type.
/// Generated ids follow the configured [`IdKind`].
#[derive(Debug)]
pub struct InMemoryDataLayer {
    tables: RwLock<Tables>,
    id_kind: IdKind,
    id_keys: HashMap<String, String>,
    next_integer: AtomicU64,
}

impl Default for InMemoryDataLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDataLayer {
    pub fn new() -> Self {
        Self::with_id_kind(IdKind::Uuid)
    }

    pub fn with_id_kind(id_kind: IdKind) -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
            id_kind,
            id_keys: HashMap::new(),
            next_integer: AtomicU64::new(1),
        }
    }

    /// Store the id of `resource_type` records under `id_key`.
    pub fn with_id_key(mut self, resource_type: impl Into<String>, id_key: impl Into<String>) -> Self {
        self.id_keys.insert(resource_type.into(), id_key.into());
        self
    }

    pub fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    /// Field holding the id of `resource_type` records.
    pub fn id_key(&self, resource_type: &str) -> &str {
        self.id_keys
            .get(resource_type)
            .map_or(DEFAULT_ID_KEY, String::as_str)
    }

    /// Number of records stored for `resource_type`.
    pub async fn count(&self, resource_type: &str) -> usize {
        self.tables
            .read()
            .await
            .get(resource_type)
            .map_or(0, |table| table.len())
    }

    fn generate_id(&self) -> String {
        match self.id_kind {
            IdKind::Uuid => generate_uuid(),
            IdKind::Integer => self
                .next_integer
                .fetch_add(1, Ordering::SeqCst)
                .to_string(),
        }
    }

    /// Keep generated integer ids clear of ids supplied by clients.
    fn observe_id(&self, id: &str) {
        if self.id_kind == IdKind::Integer
            && let Ok(value) = id.parse::<u64>()
        {
            self.next_integer
                .fetch_max(value.saturating_add(1), Ordering::SeqCst);
        }
    }
}

fn apply_changes(record: &mut RecordMap, changes: &RecordMap, id_key: &str) {
    for (key, value) in changes {
        if key != id_key {
            record.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl DataLayer for InMemoryDataLayer {
    async fn create(
        &self,
        resource_type: &str,
        mut record: RecordMap,
    ) -> Result<RecordMap, StorageError> {
        let id_key = self.id_key(resource_type);
        let id = match record.get(id_key) {
            None | Some(Value::Null) => self.generate_id(),
            Some(value) => id_to_string(value).ok_or_else(|| {
                StorageError::invalid_record("id must be a non-empty string or a number")
            })?,
        };
        record.insert(id_key.to_string(), Value::String(id.clone()));

        let mut tables = self.tables.write().await;
        let table = tables.entry(resource_type.to_string()).or_default();
        if table.contains_key(&id) {
            return Err(StorageError::already_exists(resource_type, id));
        }
        self.observe_id(&id);
        table.insert(id.clone(), record.clone());
        debug!(resource_type, id = %id, "Record created");
        Ok(record)
    }

    async fn update(
        &self,
        resource_type: &str,
        selector: &Selector,
        changes: &RecordMap,
    ) -> Result<Vec<RecordMap>, StorageError> {
        let id_key = self.id_key(resource_type);
        let mut tables = self.tables.write().await;
        let table = tables.entry(resource_type.to_string()).or_default();
        let updated = match selector {
            Selector::Id(id) => {
                let record = table
                    .get_mut(id)
                    .ok_or_else(|| StorageError::not_found(resource_type, id))?;
                apply_changes(record, changes, id_key);
                vec![record.clone()]
            }
            Selector::Filter(filter) => table
                .values_mut()
                .filter(|record| matches(record, filter))
                .map(|record| {
                    apply_changes(record, changes, id_key);
                    record.clone()
                })
                .collect(),
        };
        debug!(resource_type, count = updated.len(), "Records updated");
        Ok(updated)
    }

    async fn find_many(
        &self,
        resource_type: &str,
        query: &QueryDescriptor,
    ) -> Result<FindManyResult, StorageError> {
        let tables = self.tables.read().await;
        let mut records: Vec<RecordMap> = tables
            .get(resource_type)
            .map(|table| {
                table
                    .values()
                    .filter(|record| matches(record, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let total = records.len();

        sort_records(&mut records, &query.sort);
        let mut page: Vec<RecordMap> = records
            .into_iter()
            .skip(query.page.offset)
            .take(query.page.limit)
            .collect();
        for record in &mut page {
            hydrate(record, &query.include, &tables);
        }
        Ok(FindManyResult::new(page, total))
    }

    async fn find_one(
        &self,
        resource_type: &str,
        id: &str,
        include: &[IncludePath],
    ) -> Result<Option<RecordMap>, StorageError> {
        let tables = self.tables.read().await;
        let Some(mut record) = tables
            .get(resource_type)
            .and_then(|table| table.get(id))
            .cloned()
        else {
            return Ok(None);
        };
        hydrate(&mut record, include, &tables);
        Ok(Some(record))
    }

    async fn delete(
        &self,
        resource_type: &str,
        selector: &Selector,
    ) -> Result<usize, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(resource_type) else {
            return match selector {
                Selector::Id(id) => Err(StorageError::not_found(resource_type, id)),
                Selector::Filter(_) => Ok(0),
            };
        };
        let removed = match selector {
            Selector::Id(id) => {
                table
                    .shift_remove(id)
                    .ok_or_else(|| StorageError::not_found(resource_type, id))?;
                1
            }
            Selector::Filter(filter) => {
                let before = table.len();
                table.retain(|_, record| !matches(record, filter));
                before - table.len()
            }
        };
        debug!(resource_type, removed, "Records deleted");
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
