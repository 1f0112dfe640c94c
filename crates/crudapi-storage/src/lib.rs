//! # crudapi-storage
//!
//! Data layer abstraction for crudapi.
//!
//! Generated controllers only ever talk to a [`DataLayer`]. This crate holds
//! the trait and its types; implementations live in separate crates.
//!
//! ## Example
//!
//! ```ignore
//! use crudapi_core::RecordMap;
//! use crudapi_storage::{DataLayer, Selector, StorageError};
//!
//! async fn publish(data: &dyn DataLayer, id: &str) -> Result<(), StorageError> {
//!     let mut changes = RecordMap::new();
//!     changes.insert("status".into(), "published".into());
//!     data.update("articles", &Selector::id(id), &changes).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::DataLayer;
pub use types::{FindManyResult, Selector};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared data layer trait object.
pub type DynDataLayer = std::sync::Arc<dyn DataLayer>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::DataLayer;
    pub use crate::types::{FindManyResult, Selector};
    pub use crate::{DynDataLayer, StorageResult};
}
