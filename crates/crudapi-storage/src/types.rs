//! Types shared by data layer implementations.

use crudapi_core::RecordMap;
use crudapi_query::FilterMap;
use serde::{Deserialize, Serialize};

/// Which records an update or delete applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Id(String),
    Filter(FilterMap),
}

impl Selector {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn filter(filter: FilterMap) -> Self {
        Self::Filter(filter)
    }
}

/// One page of records plus the number of records matching the filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindManyResult {
    pub records: Vec<RecordMap>,
    pub total: usize,
}

impl FindManyResult {
    pub fn new(records: Vec<RecordMap>, total: usize) -> Self {
        Self { records, total }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
