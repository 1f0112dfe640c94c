use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::http::Method;
use crudapi_api::ApiError;
use crudapi_core::{
    ActionContext, ActionName, ActionOutput, FnHook, HookDescriptor, HookError, IdKind,
    SerializerDeclaration, TargetId,
};
use crudapi_db_memory::InMemoryDataLayer;
use crudapi_server::{AppConfig, ControllerBuilder, CustomActionHandler, ServerBuilder};
use crudapi_storage::{DataLayer, Selector};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

const JSONAPI: &str = "application/vnd.api+json";

struct ArticleSerializer;
struct ArticlesController;

/// Marks an article as published by whoever the before hook recorded.
struct Publish;

#[async_trait]
impl CustomActionHandler for Publish {
    async fn handle(
        &self,
        ctx: &ActionContext,
        data: &dyn DataLayer,
        _body: Option<&Value>,
    ) -> Result<ActionOutput, ApiError> {
        let id = ctx
            .id
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("missing id"))?;
        let mut changes = serde_json::Map::new();
        changes.insert("status".into(), json!("published"));
        if let Some(publisher) = ctx.local("publisher") {
            changes.insert("publishedBy".into(), publisher.clone());
        }
        let mut updated = data
            .update(&ctx.resource_type, &Selector::id(id), &changes)
            .await?;
        Ok(updated
            .pop()
            .map(ActionOutput::One)
            .unwrap_or(ActionOutput::None))
    }
}

fn serializer() -> SerializerDeclaration {
    SerializerDeclaration::for_type::<ArticleSerializer>("articles")
        .attribute("title")
        .attribute("slug")
        .attribute("status")
        .attribute("publishedBy")
}

fn controller() -> ControllerBuilder {
    ControllerBuilder::for_type::<ArticlesController>(TargetId::of::<ArticleSerializer>())
        .except([ActionName::Delete])
        .before_action(HookDescriptor::only(
            "requireTitle",
            [ActionName::Create, ActionName::Update],
        ))
        .before_action(HookDescriptor::only("stampSlug", [ActionName::Create]))
        .before_action(HookDescriptor::only("stampPublisher", ["publish"]))
        .after_action(HookDescriptor::only("audit", [ActionName::Create]))
        .method(
            "requireTitle",
            FnHook::shared(|ctx: &mut ActionContext| {
                let is_create = ctx.action == ActionName::Create;
                let title = ctx
                    .model_mut()
                    .and_then(|model| model.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if is_create && title.is_empty() {
                    return Err(HookError::rejected("title is required"));
                }
                Ok(())
            }),
        )
        .method(
            "stampSlug",
            FnHook::shared(|ctx: &mut ActionContext| {
                if let Some(model) = ctx.model_mut() {
                    let slug = model
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_lowercase()
                        .replace(' ', "-");
                    model.insert("slug".into(), json!(slug));
                }
                Ok(())
            }),
        )
        .method(
            "stampPublisher",
            FnHook::shared(|ctx: &mut ActionContext| {
                ctx.set_local("publisher", json!("editor"));
                Ok(())
            }),
        )
        .method(
            "audit",
            FnHook::shared(|_: &mut ActionContext| Err(HookError::execution("audit sink offline"))),
        )
        .custom_action("publish", Method::POST, "/{id}/publish", Arc::new(Publish))
}

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.api.id_type = IdKind::Integer;
    cfg.api.debug = true;
    cfg
}

async fn start_server() -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    serve(
        ServerBuilder::new()
            .with_config(config())
            .serializer(serializer())
            .controller(controller()),
    )
    .await
}

async fn serve(
    builder: ServerBuilder,
) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = builder.build().expect("build server").into_router();

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

async fn post(client: &reqwest::Client, url: &str, body: Value) -> (StatusCode, Value) {
    let resp = client
        .post(url)
        .header("content-type", JSONAPI)
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn before_hooks_reject_and_mutate_the_model() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        &format!("{base}/articles"),
        json!({"data": {"type": "articles", "attributes": {"status": "draft"}}}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["status"], "422");

    // Nothing was stored
    let resp = client.get(format!("{base}/articles")).send().await.unwrap();
    let list: Value = resp.json().await.unwrap();
    assert_eq!(list["meta"]["pagination"]["total"], 0);

    let (status, body) = post(
        &client,
        &format!("{base}/articles"),
        json!({"data": {"type": "articles", "attributes": {"title": "Hello World"}}}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["attributes"]["slug"], "hello-world");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn after_hook_failures_surface_as_warnings() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        &format!("{base}/articles"),
        json!({"data": {"type": "articles", "attributes": {"title": "Audited"}}}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let warnings = body["meta"]["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["hook"], "audit");
    assert!(
        warnings[0]["detail"]
            .as_str()
            .unwrap()
            .contains("audit sink offline")
    );

    // The record was persisted regardless
    let id = body["data"]["id"].as_str().unwrap();
    let resp = client
        .get(format!("{base}/articles/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn custom_action_runs_through_the_pipeline() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (_, body) = post(
        &client,
        &format!("{base}/articles"),
        json!({"data": {"type": "articles", "attributes": {"title": "Draft", "status": "draft"}}}),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/articles/{id}/publish"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["attributes"]["status"], "published");
    assert_eq!(body["data"]["attributes"]["published-by"], "editor");

    let resp = client
        .post(format!("{base}/articles/999/publish"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn excluded_builtin_actions_are_not_routed() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let (_, body) = post(
        &client,
        &format!("{base}/articles"),
        json!({"data": {"type": "articles", "attributes": {"title": "Keep"}}}),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap();

    let resp = client
        .delete(format!("{base}/articles/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

struct ReadOnlyArticlesController;

/// Publishes the record the `setRecord` hook loaded.
struct PublishLoaded;

#[async_trait]
impl CustomActionHandler for PublishLoaded {
    async fn handle(
        &self,
        ctx: &ActionContext,
        data: &dyn DataLayer,
        _body: Option<&Value>,
    ) -> Result<ActionOutput, ApiError> {
        let id = ctx
            .local("record")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_request("record not loaded"))?;
        let mut changes = serde_json::Map::new();
        changes.insert("status".into(), json!("published"));
        let mut updated = data
            .update(&ctx.resource_type, &Selector::id(id), &changes)
            .await?;
        Ok(updated
            .pop()
            .map(ActionOutput::One)
            .unwrap_or(ActionOutput::None))
    }
}

#[tokio::test]
async fn scoped_hook_runs_for_listed_actions_only() {
    let data = Arc::new(InMemoryDataLayer::with_id_kind(IdKind::Integer));
    let mut seed = serde_json::Map::new();
    seed.insert("title".into(), json!("Seeded"));
    seed.insert("status".into(), json!("draft"));
    let seeded = data.create("articles", seed).await.unwrap();
    let id = seeded["id"].as_str().unwrap().to_string();

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let controller = ControllerBuilder::for_type::<ReadOnlyArticlesController>(
        TargetId::of::<ArticleSerializer>(),
    )
    .only([ActionName::Index, ActionName::Show])
    .before_action(HookDescriptor::only(
        "setRecord",
        [ActionName::Show, ActionName::from("publish")],
    ))
    .method(
        "setRecord",
        FnHook::shared(move |ctx: &mut ActionContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            let id = ctx.id.clone().unwrap_or_default();
            ctx.set_local("record", json!(id));
            Ok(())
        }),
    )
    .custom_action(
        "publish",
        Method::POST,
        "/{id}/publish",
        Arc::new(PublishLoaded),
    );

    let (base, shutdown_tx, handle) = serve(
        ServerBuilder::new()
            .with_config(config())
            .with_data_layer(data.clone())
            .serializer(serializer())
            .controller(controller),
    )
    .await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/articles/{id}/publish"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["attributes"]["status"], "published");
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let resp = client.get(format!("{base}/articles")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let resp = client
        .get(format!("{base}/articles/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    // Built-ins outside `only` are not routed
    let resp = client
        .post(format!("{base}/articles"))
        .header("content-type", JSONAPI)
        .body(json!({"data": {"type": "articles", "attributes": {"title": "New"}}}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let resp = client
        .patch(format!("{base}/articles/{id}"))
        .header("content-type", JSONAPI)
        .body(json!({"data": {"type": "articles", "id": id, "attributes": {"title": "x"}}}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let resp = client
        .delete(format!("{base}/articles/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[test]
fn unbound_hook_fails_the_build() {
    let controller =
        ControllerBuilder::for_type::<ArticlesController>(TargetId::of::<ArticleSerializer>())
            .before_action(HookDescriptor::new("missing"));
    let err = ServerBuilder::new()
        .serializer(serializer())
        .controller(controller)
        .build()
        .err()
        .expect("build should fail");
    assert!(err.to_string().contains("missing"));
}

#[test]
fn custom_route_clashing_with_a_builtin_fails_the_build() {
    let controller =
        ControllerBuilder::for_type::<ArticlesController>(TargetId::of::<ArticleSerializer>())
            .custom_action("archive", Method::GET, "/{id}", Arc::new(Publish));
    let err = ServerBuilder::new()
        .serializer(serializer())
        .controller(controller)
        .build()
        .err()
        .expect("build should fail");
    assert!(err.to_string().contains("already routed"));
}
