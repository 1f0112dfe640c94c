//! In-memory data layer for crudapi.
//!
//! Implements [`DataLayer`] over a map of tables guarded by a tokio
//! `RwLock`. Useful for tests, demos and config-declared resources.
//!
//! # Example
//!
//! ```ignore
//! use crudapi_db_memory::InMemoryDataLayer;
//! use crudapi_storage::DataLayer;
//!
//! let data = InMemoryDataLayer::new();
//! let mut article = serde_json::Map::new();
//! article.insert("title".into(), "Hello".into());
//! let created = data.create("articles", article).await?;
//! ```

mod include;
pub mod query;
pub mod storage;

pub use crudapi_storage::{DataLayer, StorageError};
pub use storage::InMemoryDataLayer;
