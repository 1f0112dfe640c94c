//! The data layer capability set.

use async_trait::async_trait;
use crudapi_core::RecordMap;
use crudapi_query::{IncludePath, QueryDescriptor};

use crate::error::StorageError;
use crate::types::{FindManyResult, Selector};

/// Persistence capabilities generated controllers rely on.
///
/// Records are opaque key/value maps. Relationship fields hold resource
/// linkage (`{"type": ..., "id": ...}` or an array of it); implementations
/// replace linkage with the full related record for requested include paths.
///
/// # Example
///
/// ```ignore
/// async fn get_article(data: &dyn DataLayer, id: &str) -> Result<RecordMap, StorageError> {
///     data.find_one("articles", id, &[])
///         .await?
///         .ok_or_else(|| StorageError::not_found("articles", id))
/// }
/// ```
#[async_trait]
pub trait DataLayer: Send + Sync {
    /// Persist a new record and return it with its id assigned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the supplied id is taken.
    async fn create(
        &self,
        resource_type: &str,
        record: RecordMap,
    ) -> Result<RecordMap, StorageError>;

    /// Merge `changes` into every selected record and return the updated records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when selecting a missing id.
    async fn update(
        &self,
        resource_type: &str,
        selector: &Selector,
        changes: &RecordMap,
    ) -> Result<Vec<RecordMap>, StorageError>;

    /// Filter, sort and page records, hydrating the query's include paths.
    async fn find_many(
        &self,
        resource_type: &str,
        query: &QueryDescriptor,
    ) -> Result<FindManyResult, StorageError>;

    /// Fetch one record by id. Returns `None` if it does not exist.
    async fn find_one(
        &self,
        resource_type: &str,
        id: &str,
        include: &[IncludePath],
    ) -> Result<Option<RecordMap>, StorageError>;

    /// Delete selected records and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when selecting a missing id.
    async fn delete(&self, resource_type: &str, selector: &Selector)
    -> Result<usize, StorageError>;

    /// Name of the backend, for logging.
    fn backend_name(&self) -> &'static str {
        "unknown"
    }
}
