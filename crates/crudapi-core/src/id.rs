//! Resource identifier kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("'{0}' is not a valid UUID")]
    InvalidUuid(String),
    #[error("'{0}' is not a valid integer id")]
    InvalidInteger(String),
}

/// How the data layer generates identifiers, and which path ids are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    #[default]
    Uuid,
    Integer,
}

impl IdKind {
    pub fn validate(&self, id: &str) -> Result<(), IdError> {
        match self {
            Self::Uuid => uuid::Uuid::parse_str(id)
                .map(|_| ())
                .map_err(|_| IdError::InvalidUuid(id.to_string())),
            Self::Integer => id
                .parse::<u64>()
                .map(|_| ())
                .map_err(|_| IdError::InvalidInteger(id.to_string())),
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid => f.write_str("uuid"),
            Self::Integer => f.write_str("integer"),
        }
    }
}

pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
