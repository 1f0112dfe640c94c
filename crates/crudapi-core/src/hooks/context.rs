use crudapi_query::{FilterMap, QueryDescriptor};
use serde_json::{Map, Value};

use crate::action::ActionName;
use crate::record::RecordMap;

/// Request data an action operates on.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    /// A single model for create, update and upsert.
    One(RecordMap),
    /// Models for createMany and upsertMany.
    Many(Vec<RecordMap>),
    /// Condition plus attributes for updateMany.
    Patch {
        filter: FilterMap,
        attributes: RecordMap,
    },
    /// Condition for deleteMany.
    Selection(FilterMap),
}

/// Result of the operation, visible to after hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    None,
    One(RecordMap),
    Many {
        records: Vec<RecordMap>,
        total: Option<usize>,
    },
    Affected(usize),
}

/// Per-request state shared by hooks and the operation of one action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub action: ActionName,
    pub resource_type: String,
    pub id: Option<String>,
    pub query: QueryDescriptor,
    pub payload: Payload,
    pub output: Option<ActionOutput>,
    pub locals: Map<String, Value>,
}

impl ActionContext {
    pub fn new(action: ActionName, resource_type: impl Into<String>) -> Self {
        Self {
            action,
            resource_type: resource_type.into(),
            id: None,
            query: QueryDescriptor::default(),
            payload: Payload::None,
            output: None,
            locals: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_query(mut self, query: QueryDescriptor) -> Self {
        self.query = query;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// The single in-progress model, or the attributes of a bulk patch.
    pub fn model_mut(&mut self) -> Option<&mut RecordMap> {
        match &mut self.payload {
            Payload::One(model) => Some(model),
            Payload::Patch { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    /// The persisted record once a single-record operation has run.
    pub fn record(&self) -> Option<&RecordMap> {
        match &self.output {
            Some(ActionOutput::One(record)) => Some(record),
            _ => None,
        }
    }

    pub fn set_local(&mut self, key: impl Into<String>, value: Value) {
        self.locals.insert(key.into(), value);
    }

    pub fn local(&self, key: &str) -> Option<&Value> {
        self.locals.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_mut_exposes_single_and_patch_payloads() {
        let mut model = RecordMap::new();
        model.insert("title".into(), json!("Draft"));
        let mut ctx = ActionContext::new(ActionName::Create, "articles")
            .with_payload(Payload::One(model));
        ctx.model_mut()
            .unwrap()
            .insert("slug".into(), json!("draft"));
        assert!(matches!(&ctx.payload, Payload::One(m) if m.contains_key("slug")));

        let mut ctx = ActionContext::new(ActionName::UpdateMany, "articles").with_payload(
            Payload::Patch {
                filter: FilterMap::new(),
                attributes: RecordMap::new(),
            },
        );
        assert!(ctx.model_mut().is_some());

        let mut ctx = ActionContext::new(ActionName::Index, "articles");
        assert!(ctx.model_mut().is_none());
    }

    #[test]
    fn record_reads_single_output() {
        let mut ctx = ActionContext::new(ActionName::Show, "articles").with_id("1");
        assert!(ctx.record().is_none());
        ctx.output = Some(ActionOutput::One(RecordMap::new()));
        assert!(ctx.record().is_some());
        ctx.output = Some(ActionOutput::Affected(3));
        assert!(ctx.record().is_none());
    }
}
