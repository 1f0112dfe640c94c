//! Action names.
//!
//! Built-in actions are the generated CRUD endpoints. Everything else is a
//! custom action declared on a controller.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionName {
    Index,
    Show,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    UpsertMany,
    Delete,
    DeleteMany,
    Custom(String),
}

impl ActionName {
    pub const BUILTIN: [ActionName; 10] = [
        Self::Index,
        Self::Show,
        Self::Create,
        Self::CreateMany,
        Self::Update,
        Self::UpdateMany,
        Self::Upsert,
        Self::UpsertMany,
        Self::Delete,
        Self::DeleteMany,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Index => "index",
            Self::Show => "show",
            Self::Create => "create",
            Self::CreateMany => "createMany",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::Upsert => "upsert",
            Self::UpsertMany => "upsertMany",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
            Self::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Actions operating on a set of records rather than one.
    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            Self::CreateMany | Self::UpdateMany | Self::UpsertMany | Self::DeleteMany
        )
    }
}

impl From<&str> for ActionName {
    fn from(value: &str) -> Self {
        match value {
            "index" => Self::Index,
            "show" => Self::Show,
            "create" => Self::Create,
            "createMany" => Self::CreateMany,
            "update" => Self::Update,
            "updateMany" => Self::UpdateMany,
            "upsert" => Self::Upsert,
            "upsertMany" => Self::UpsertMany,
            "delete" => Self::Delete,
            "deleteMany" => Self::DeleteMany,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for ActionName {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ActionName> for String {
    fn from(value: ActionName) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_round_trip_through_strings() {
        for action in ActionName::BUILTIN {
            assert!(action.is_builtin());
            assert_eq!(ActionName::from(action.as_str()), action);
        }
    }

    #[test]
    fn unknown_names_are_custom() {
        let action = ActionName::from("publish");
        assert_eq!(action, ActionName::Custom("publish".into()));
        assert!(!action.is_builtin());
        assert_eq!(action.to_string(), "publish");
    }

    #[test]
    fn serializes_as_plain_string() {
        let value = serde_json::to_value(ActionName::CreateMany).unwrap();
        assert_eq!(value, serde_json::json!("createMany"));
        let action: ActionName = serde_json::from_value(serde_json::json!("deleteMany")).unwrap();
        assert!(action.is_bulk());
    }
}
