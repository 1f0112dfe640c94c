//! Generated CRUD handlers.
//!
//! Every handler follows the same steps: parse the path id and query,
//! parse the body into the action payload, run the controller's pipeline
//! around a data layer operation, and render the result.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawPathParams, RawQuery, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use crudapi_api::{ApiError, Document, DocumentSerializer, JsonApi, PrimaryData, RequestParser};
use crudapi_core::{
    ActionContext, ActionExecutor, ActionName, ActionOutput, ExecutionOutcome, IdKind, Operation,
    Payload, RecordMap, id_to_string,
};
use crudapi_query::{IncludePath, Page, Pagination, parse_query};
use crudapi_storage::{DataLayer, DynDataLayer, Selector};
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::controller::{CustomActionHandler, CustomRoute, ResourceController};

/// Process-wide state shared by all controllers.
pub struct AppState {
    pub data: DynDataLayer,
    pub serializer: DocumentSerializer,
    pub executor: ActionExecutor,
    pub pagination: Pagination,
    pub id_kind: IdKind,
    pub debug: bool,
    /// Prefix of `links` and `Location`; empty for relative links
    pub base_url: String,
}

/// Router state of one controller.
#[derive(Clone)]
pub struct ControllerState {
    pub app: Arc<AppState>,
    pub controller: Arc<ResourceController>,
}

impl ControllerState {
    pub fn new(app: Arc<AppState>, controller: Arc<ResourceController>) -> Self {
        Self { app, controller }
    }

    fn parser(&self) -> RequestParser<'_> {
        RequestParser::new(self.app.serializer.registry(), &self.controller.serializer)
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.app.base_url, self.controller.resource_type)
    }

    fn source_includes(&self, include: &[IncludePath]) -> Result<Vec<IncludePath>, ApiError> {
        self.app
            .serializer
            .source_include_paths(&self.controller.serializer, include)
            .map_err(|e| ApiError::invalid_parameter("include", e.to_string()))
    }

    /// Build the context of an action from the path id and query string.
    fn prepare(
        &self,
        action: ActionName,
        id: Option<String>,
        raw_query: Option<&str>,
    ) -> Result<ActionContext, ApiError> {
        let query = parse_query(
            raw_query.unwrap_or_default(),
            &self.controller.policy,
            &self.app.pagination,
        )?;
        self.source_includes(&query.include)?;

        let mut ctx =
            ActionContext::new(action, self.controller.resource_type.as_str()).with_query(query);
        if let Some(id) = id {
            self.app
                .id_kind
                .validate(&id)
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            ctx = ctx.with_id(id);
        }
        Ok(ctx)
    }

    async fn run<O>(&self, ctx: &mut ActionContext, operation: &O) -> Result<ExecutionOutcome, ApiError>
    where
        O: Operation<Error = ApiError> + ?Sized,
    {
        let outcome = self
            .app
            .executor
            .execute(&self.controller.target, &self.controller.hooks, ctx, operation)
            .await?;
        tracing::debug!(
            resource_type = %ctx.resource_type,
            action = %ctx.action,
            after_failures = outcome.after_failures.len(),
            "Action completed"
        );
        Ok(outcome)
    }

    async fn perform(
        &self,
        action: ActionName,
        id: Option<String>,
        raw_query: Option<&str>,
        payload: Payload,
    ) -> Result<(ActionContext, ExecutionOutcome), ApiError> {
        let mut ctx = self.prepare(action, id, raw_query)?.with_payload(payload);
        let outcome = self.run(&mut ctx, &CrudOperation { state: self }).await?;
        Ok((ctx, outcome))
    }

    /// Render the output of an action as a JSON:API document.
    fn document(&self, ctx: &ActionContext, outcome: &ExecutionOutcome) -> Result<Option<Document>, ApiError> {
        let target = &self.controller.serializer;
        let serializer = &self.app.serializer;
        let mut document = match &ctx.output {
            Some(ActionOutput::One(record)) => serializer.document_one(target, record, &ctx.query)?,
            Some(ActionOutput::Many { records, .. }) => {
                serializer.document_many(target, records, &ctx.query)?
            }
            Some(ActionOutput::Affected(count)) => {
                let key = if ctx.action == ActionName::DeleteMany {
                    "deleted"
                } else {
                    "affected"
                };
                Document::default().with_meta(key, json!(count))
            }
            Some(ActionOutput::None) | None => return Ok(None),
        };
        if self.app.debug && !outcome.is_clean() {
            let warnings = outcome
                .after_failures
                .iter()
                .map(|f| json!({ "hook": f.hook, "detail": f.message }))
                .collect();
            document = document.with_meta("warnings", Value::Array(warnings));
        }
        Ok(Some(document))
    }

    fn respond(
        &self,
        status: StatusCode,
        ctx: &ActionContext,
        outcome: &ExecutionOutcome,
    ) -> Result<Response, ApiError> {
        Ok(match self.document(ctx, outcome)? {
            Some(document) => (status, JsonApi(document)).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        })
    }
}

/// The data layer step of a built-in action.
struct CrudOperation<'a> {
    state: &'a ControllerState,
}

impl CrudOperation<'_> {
    fn data(&self) -> &dyn DataLayer {
        self.state.app.data.as_ref()
    }

    fn id_key(&self) -> &str {
        &self.state.controller.id_key
    }

    /// Re-read a written record when the response asks for included resources.
    async fn reload(
        &self,
        resource_type: &str,
        record: RecordMap,
        include: &[IncludePath],
    ) -> Result<RecordMap, ApiError> {
        if include.is_empty() {
            return Ok(record);
        }
        let Some(id) = record.get(self.id_key()).and_then(id_to_string) else {
            return Ok(record);
        };
        Ok(self
            .data()
            .find_one(resource_type, &id, include)
            .await?
            .unwrap_or(record))
    }

    async fn upsert(
        &self,
        resource_type: &str,
        id: &str,
        mut model: RecordMap,
    ) -> Result<RecordMap, ApiError> {
        if self.data().find_one(resource_type, id, &[]).await?.is_some() {
            let updated = self
                .data()
                .update(resource_type, &Selector::id(id), &model)
                .await?;
            return updated
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::not_found(format!("{resource_type}/{id}")));
        }
        model.insert(self.id_key().to_string(), Value::String(id.to_string()));
        Ok(self.data().create(resource_type, model).await?)
    }
}

fn require_id(ctx: &ActionContext) -> Result<&str, ApiError> {
    ctx.id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("missing resource id"))
}

fn one_payload(ctx: &ActionContext) -> Result<&RecordMap, ApiError> {
    match &ctx.payload {
        Payload::One(model) => Ok(model),
        _ => Err(ApiError::internal(format!("{} expects a single model", ctx.action))),
    }
}

fn many_payload(ctx: &ActionContext) -> Result<&[RecordMap], ApiError> {
    match &ctx.payload {
        Payload::Many(models) => Ok(models.as_slice()),
        _ => Err(ApiError::internal(format!("{} expects a list of models", ctx.action))),
    }
}

#[async_trait]
impl<'a> Operation for CrudOperation<'a> {
    type Error = ApiError;

    async fn perform(&self, ctx: &ActionContext) -> Result<ActionOutput, ApiError> {
        let resource_type = ctx.resource_type.as_str();
        let include = self.state.source_includes(&ctx.query.include)?;
        let data = self.data();

        match &ctx.action {
            ActionName::Index => {
                let mut query = ctx.query.clone();
                query.include = include;
                let found = data.find_many(resource_type, &query).await?;
                Ok(ActionOutput::Many {
                    records: found.records,
                    total: Some(found.total),
                })
            }
            ActionName::Show => {
                let id = require_id(ctx)?;
                data.find_one(resource_type, id, &include)
                    .await?
                    .map(ActionOutput::One)
                    .ok_or_else(|| ApiError::not_found(format!("{resource_type}/{id}")))
            }
            ActionName::Create => {
                let created = data.create(resource_type, one_payload(ctx)?.clone()).await?;
                Ok(ActionOutput::One(
                    self.reload(resource_type, created, &include).await?,
                ))
            }
            ActionName::CreateMany => {
                let mut records = Vec::new();
                for model in many_payload(ctx)? {
                    let created = data.create(resource_type, model.clone()).await?;
                    records.push(self.reload(resource_type, created, &include).await?);
                }
                Ok(ActionOutput::Many {
                    records,
                    total: None,
                })
            }
            ActionName::Update => {
                let id = require_id(ctx)?;
                let updated = data
                    .update(resource_type, &Selector::id(id), one_payload(ctx)?)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::not_found(format!("{resource_type}/{id}")))?;
                Ok(ActionOutput::One(
                    self.reload(resource_type, updated, &include).await?,
                ))
            }
            ActionName::UpdateMany => {
                let Payload::Patch { filter, attributes } = &ctx.payload else {
                    return Err(ApiError::internal("updateMany expects a filter patch"));
                };
                let records = data
                    .update(resource_type, &Selector::filter(filter.clone()), attributes)
                    .await?;
                Ok(ActionOutput::Many {
                    records,
                    total: None,
                })
            }
            ActionName::Upsert => {
                let id = require_id(ctx)?;
                let record = self.upsert(resource_type, id, one_payload(ctx)?.clone()).await?;
                Ok(ActionOutput::One(
                    self.reload(resource_type, record, &include).await?,
                ))
            }
            ActionName::UpsertMany => {
                let mut records = Vec::new();
                for model in many_payload(ctx)? {
                    let record = match model.get(self.id_key()).and_then(id_to_string) {
                        Some(id) => self.upsert(resource_type, &id, model.clone()).await?,
                        None => data.create(resource_type, model.clone()).await?,
                    };
                    records.push(self.reload(resource_type, record, &include).await?);
                }
                Ok(ActionOutput::Many {
                    records,
                    total: None,
                })
            }
            ActionName::Delete => {
                let id = require_id(ctx)?;
                let removed = data.delete(resource_type, &Selector::id(id)).await?;
                Ok(ActionOutput::Affected(removed))
            }
            ActionName::DeleteMany => {
                let Payload::Selection(filter) = &ctx.payload else {
                    return Err(ApiError::internal("deleteMany expects a filter"));
                };
                let removed = data
                    .delete(resource_type, &Selector::filter(filter.clone()))
                    .await?;
                Ok(ActionOutput::Affected(removed))
            }
            ActionName::Custom(name) => Err(ApiError::internal(format!(
                "custom action '{name}' has no handler"
            ))),
        }
    }
}

/// The handler step of a custom action.
struct CustomOperation<'a> {
    handler: &'a dyn CustomActionHandler,
    data: &'a dyn DataLayer,
    body: Option<&'a Value>,
}

#[async_trait]
impl<'a> Operation for CustomOperation<'a> {
    type Error = ApiError;

    async fn perform(&self, ctx: &ActionContext) -> Result<ActionOutput, ApiError> {
        self.handler.handle(ctx, self.data, self.body).await
    }
}

fn pagination_links(
    base: &str,
    raw_query: Option<&str>,
    page: Page,
    total: usize,
) -> IndexMap<String, Value> {
    let kept: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.unwrap_or_default().as_bytes())
        .filter(|(key, _)| !key.starts_with("page["))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let limit = page.limit.max(1);
    let link = |offset: usize| {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.extend_pairs(kept.iter());
        query.append_pair("page[offset]", &offset.to_string());
        query.append_pair("page[limit]", &limit.to_string());
        Value::String(format!("{base}?{}", query.finish()))
    };

    let last = if total == 0 { 0 } else { (total - 1) / limit * limit };
    let mut links = IndexMap::new();
    links.insert("self".to_string(), link(page.offset));
    links.insert("first".to_string(), link(0));
    links.insert(
        "prev".to_string(),
        if page.offset > 0 {
            link(page.offset.saturating_sub(limit))
        } else {
            Value::Null
        },
    );
    links.insert(
        "next".to_string(),
        if page.offset.saturating_add(limit) < total {
            link(page.offset.saturating_add(limit))
        } else {
            Value::Null
        },
    );
    links.insert("last".to_string(), link(last));
    links
}

fn parse_body(body: &Bytes) -> Result<Option<Value>, ApiError> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::bad_request(format!("malformed JSON: {e}")))
}

pub async fn index(
    State(state): State<ControllerState>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, ApiError> {
    let (ctx, outcome) = state
        .perform(ActionName::Index, None, raw_query.as_deref(), Payload::None)
        .await?;
    let Some(mut document) = state.document(&ctx, &outcome)? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    if let Some(ActionOutput::Many { records, total }) = &ctx.output {
        let total = total.unwrap_or(records.len());
        let page = ctx.query.page;
        document = document.with_meta(
            "pagination",
            json!({ "offset": page.offset, "limit": page.limit, "total": total }),
        );
        document.links = pagination_links(&state.collection_url(), raw_query.as_deref(), page, total);
    }
    Ok(JsonApi(document).into_response())
}

pub async fn show(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, ApiError> {
    let (ctx, outcome) = state
        .perform(ActionName::Show, Some(id), raw_query.as_deref(), Payload::None)
        .await?;
    state.respond(StatusCode::OK, &ctx, &outcome)
}

pub async fn create(
    State(state): State<ControllerState>,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let model = state.parser().parse_one(&body, None)?;
    let (ctx, outcome) = state
        .perform(ActionName::Create, None, raw_query.as_deref(), Payload::One(model))
        .await?;
    let Some(document) = state.document(&ctx, &outcome)? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let location = match &document.data {
        Some(PrimaryData::One(Some(resource))) => {
            let url = format!("{}/{}", state.collection_url(), resource.id);
            HeaderValue::from_str(&url).ok()
        }
        _ => None,
    };
    let mut response = (StatusCode::CREATED, JsonApi(document)).into_response();
    if let Some(location) = location {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

pub async fn create_many(
    State(state): State<ControllerState>,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let models = state.parser().parse_many(&body)?;
    let (ctx, outcome) = state
        .perform(ActionName::CreateMany, None, raw_query.as_deref(), Payload::Many(models))
        .await?;
    state.respond(StatusCode::CREATED, &ctx, &outcome)
}

pub async fn update(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let model = state.parser().parse_one(&body, Some(&id))?;
    let (ctx, outcome) = state
        .perform(ActionName::Update, Some(id), raw_query.as_deref(), Payload::One(model))
        .await?;
    state.respond(StatusCode::OK, &ctx, &outcome)
}

pub async fn update_many(
    State(state): State<ControllerState>,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (filter, attributes) = state.parser().parse_patch(&body, &state.controller.policy)?;
    let (ctx, outcome) = state
        .perform(
            ActionName::UpdateMany,
            None,
            raw_query.as_deref(),
            Payload::Patch { filter, attributes },
        )
        .await?;
    state.respond(StatusCode::OK, &ctx, &outcome)
}

pub async fn upsert(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let model = state.parser().parse_one(&body, Some(&id))?;
    let (ctx, outcome) = state
        .perform(ActionName::Upsert, Some(id), raw_query.as_deref(), Payload::One(model))
        .await?;
    state.respond(StatusCode::OK, &ctx, &outcome)
}

pub async fn upsert_many(
    State(state): State<ControllerState>,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let models = state.parser().parse_many(&body)?;
    let (ctx, outcome) = state
        .perform(ActionName::UpsertMany, None, raw_query.as_deref(), Payload::Many(models))
        .await?;
    state.respond(StatusCode::OK, &ctx, &outcome)
}

pub async fn delete(
    State(state): State<ControllerState>,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, ApiError> {
    state
        .perform(ActionName::Delete, Some(id), raw_query.as_deref(), Payload::None)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn delete_many(
    State(state): State<ControllerState>,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let filter = state
        .parser()
        .parse_selection(&body, &state.controller.policy)?;
    let (ctx, outcome) = state
        .perform(ActionName::DeleteMany, None, raw_query.as_deref(), Payload::Selection(filter))
        .await?;
    state.respond(StatusCode::OK, &ctx, &outcome)
}

pub async fn custom(
    state: ControllerState,
    route: CustomRoute,
    params: RawPathParams,
    raw_query: Option<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let id = params
        .iter()
        .find(|(name, _)| *name == "id")
        .map(|(_, value)| value.to_string());
    let body = parse_body(&body)?;
    let mut ctx = state.prepare(route.name.clone(), id, raw_query.as_deref())?;
    let operation = CustomOperation {
        handler: route.handler.as_ref(),
        data: state.app.data.as_ref(),
        body: body.as_ref(),
    };
    let outcome = state.run(&mut ctx, &operation).await?;
    state.respond(StatusCode::OK, &ctx, &outcome)
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn readyz(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "ready", "backend": app.data.backend_name() }))
}
