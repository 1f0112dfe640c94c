use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{RawPathParams, RawQuery, State},
    http::{HeaderValue, Method, Request, Response},
    middleware,
    routing::{MethodFilter, MethodRouter, get},
};
use crudapi_api::{DocumentSerializer, SerializeError};
use crudapi_core::{
    ActionExecutor, ActionName, CoreError, MetadataRegistryBuilder, SerializerDeclaration,
};
use crudapi_db_memory::InMemoryDataLayer;
use crudapi_storage::DynDataLayer;
use indexmap::IndexMap;
use thiserror::Error;
use tower::ServiceBuilder;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::controller::{ControllerBuilder, ResourceController};
use crate::handlers::{self, AppState, ControllerState};
use crate::middleware as app_middleware;
use crate::resources;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Metadata(#[from] CoreError),
    #[error(transparent)]
    Serializer(#[from] SerializeError),
    #[error("invalid route for {resource_type}: {message}")]
    Route {
        resource_type: String,
        message: String,
    },
}

pub struct CrudapiServer {
    addr: SocketAddr,
    app: Router,
}

impl CrudapiServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn into_router(self) -> Router {
        self.app
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

/// Assembles serializers, controllers and a data layer into a server.
pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    data: Option<DynDataLayer>,
    serializers: Vec<SerializerDeclaration>,
    controllers: Vec<ControllerBuilder>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            data: None,
            serializers: Vec::new(),
            controllers: Vec::new(),
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Data layer backing every controller. Defaults to [`InMemoryDataLayer`].
    pub fn with_data_layer(mut self, data: DynDataLayer) -> Self {
        self.data = Some(data);
        self
    }

    pub fn serializer(mut self, declaration: SerializerDeclaration) -> Self {
        self.serializers.push(declaration);
        self
    }

    pub fn controller(mut self, controller: ControllerBuilder) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn build(self) -> Result<CrudapiServer, BuildError> {
        let app = build_app(
            &self.config,
            self.data,
            self.serializers,
            self.controllers,
        )?;
        Ok(CrudapiServer {
            addr: self.addr,
            app,
        })
    }
}

/// Register all metadata, freeze the registry and route every controller.
pub fn build_app(
    cfg: &AppConfig,
    data: Option<DynDataLayer>,
    serializers: Vec<SerializerDeclaration>,
    controllers: Vec<ControllerBuilder>,
) -> Result<Router, BuildError> {
    cfg.validate().map_err(BuildError::Config)?;

    let mut registry = MetadataRegistryBuilder::new();
    let mut declared_controllers = Vec::new();
    for resource in &cfg.resources {
        let (serializer, controller) = resources::declare(resource, cfg.api.on_disallowed);
        serializer.register(&mut registry)?;
        declared_controllers.push(controller);
    }
    for serializer in serializers {
        serializer.register(&mut registry)?;
    }
    declared_controllers.extend(controllers);
    let mut registered = Vec::with_capacity(declared_controllers.len());
    for controller in declared_controllers {
        registered.push(controller.register(&mut registry)?);
    }
    let registry = registry.freeze();

    let mut serializer = DocumentSerializer::new(registry.clone());
    if let Some(base_url) = cfg.base_url() {
        serializer = serializer.with_base_url(base_url);
    }
    let executor = ActionExecutor::new(registry);

    for controller in &mut registered {
        let resource = serializer.resource_descriptor(&controller.serializer)?;
        controller.resource_type = resource.type_name.clone();
        controller.id_key = resource.id_key.clone();
        executor.validate_bindings(&controller.target, &controller.hooks)?;
    }

    let data = data.unwrap_or_else(|| {
        let memory = registered.iter().fold(
            InMemoryDataLayer::with_id_kind(cfg.api.id_type),
            |memory, controller| memory.with_id_key(&controller.resource_type, &controller.id_key),
        );
        Arc::new(memory) as DynDataLayer
    });
    tracing::info!(backend = data.backend_name(), controllers = registered.len(), "Building application");

    let state = Arc::new(AppState {
        data,
        serializer,
        executor,
        pagination: cfg.pagination(),
        id_kind: cfg.api.id_type,
        debug: cfg.api.debug,
        base_url: cfg.base_url().unwrap_or_default().to_string(),
    });

    let mut router = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .with_state(state.clone());
    for controller in registered {
        router = router.merge(controller_routes(state.clone(), controller)?);
    }

    let body_limit = cfg.server.body_limit_bytes;
    let router = router
        // Outermost last: body limit -> request id -> trace/cors/compression/limit -> content negotiation
        .layer(middleware::from_fn(app_middleware::content_negotiation))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &Request<_>| {
                            use tracing::field::Empty;
                            let req_id = req
                                .extensions()
                                .get::<HeaderValue>()
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("")
                                .to_string();
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = Empty,
                                request_id = %req_id
                            )
                        })
                        .on_response(
                            |res: &Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(ConcurrencyLimitLayer::new(cfg.server.max_concurrency.max(1))),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit));
    Ok(router)
}

/// Routes of one controller, mounted at `/{resource_type}`.
fn controller_routes(
    app: Arc<AppState>,
    controller: ResourceController,
) -> Result<Router, BuildError> {
    let base = format!("/{}", controller.resource_type);
    let custom = controller.custom.clone();
    let state = ControllerState::new(app, Arc::new(controller));
    let enabled = |action: ActionName| state.controller.enables(&action);

    let mut collection = MethodRouter::new();
    if enabled(ActionName::Index) {
        collection = collection.get(handlers::index);
    }
    if enabled(ActionName::Create) {
        collection = collection.post(handlers::create);
    }

    let mut bulk = MethodRouter::new();
    if enabled(ActionName::CreateMany) {
        bulk = bulk.post(handlers::create_many);
    }
    if enabled(ActionName::UpdateMany) {
        bulk = bulk.patch(handlers::update_many);
    }
    if enabled(ActionName::UpsertMany) {
        bulk = bulk.put(handlers::upsert_many);
    }
    if enabled(ActionName::DeleteMany) {
        bulk = bulk.delete(handlers::delete_many);
    }

    let mut member = MethodRouter::new();
    if enabled(ActionName::Show) {
        member = member.get(handlers::show);
    }
    if enabled(ActionName::Update) {
        member = member.patch(handlers::update);
    }
    if enabled(ActionName::Upsert) {
        member = member.put(handlers::upsert);
    }
    if enabled(ActionName::Delete) {
        member = member.delete(handlers::delete);
    }

    let mut routes: IndexMap<String, MethodRouter<ControllerState>> = IndexMap::new();
    routes.insert(base.clone(), collection);
    routes.insert(format!("{base}/bulk"), bulk);
    routes.insert(format!("{base}/{{id}}"), member);

    let mut taken: HashSet<(String, Method)> = HashSet::new();
    for route in custom {
        let path = format!("{base}{}", route.path);
        let route_error = |message: String| BuildError::Route {
            resource_type: state.controller.resource_type.clone(),
            message,
        };
        let filter = method_filter(&route.method).ok_or_else(|| {
            route_error(format!(
                "unsupported method {} for action {}",
                route.method, route.name
            ))
        })?;
        let duplicate = !taken.insert((path.clone(), route.method.clone()))
            || builtin_claims(&state, &base, &path, &route.method);
        if duplicate {
            return Err(route_error(format!(
                "{} {path} is already routed",
                route.method
            )));
        }
        tracing::debug!(path = %path, action = %route.name, "Mounting custom action");
        let handler = move |State(state): State<ControllerState>,
                            params: RawPathParams,
                            RawQuery(raw_query): RawQuery,
                            body: Bytes| {
            let route = route.clone();
            async move { handlers::custom(state, route, params, raw_query, body).await }
        };
        let methods = routes.shift_remove(&path).unwrap_or_else(MethodRouter::new);
        routes.insert(path, methods.on(filter, handler));
    }

    let mut router = Router::new();
    for (path, methods) in routes {
        router = router.route(&path, methods);
    }
    Ok(router.with_state(state))
}

/// Whether a generated route already answers `method` on `path`.
fn builtin_claims(state: &ControllerState, base: &str, path: &str, method: &Method) -> bool {
    let actions = if path == base {
        vec![(Method::GET, ActionName::Index), (Method::POST, ActionName::Create)]
    } else if path == format!("{base}/bulk") {
        vec![
            (Method::POST, ActionName::CreateMany),
            (Method::PATCH, ActionName::UpdateMany),
            (Method::PUT, ActionName::UpsertMany),
            (Method::DELETE, ActionName::DeleteMany),
        ]
    } else if path == format!("{base}/{{id}}") {
        vec![
            (Method::GET, ActionName::Show),
            (Method::PATCH, ActionName::Update),
            (Method::PUT, ActionName::Upsert),
            (Method::DELETE, ActionName::Delete),
        ]
    } else {
        Vec::new()
    };
    actions
        .iter()
        .any(|(m, action)| m == method && state.controller.enables(action))
}

fn method_filter(method: &Method) -> Option<MethodFilter> {
    Some(match *method {
        Method::GET => MethodFilter::GET,
        Method::POST => MethodFilter::POST,
        Method::PUT => MethodFilter::PUT,
        Method::PATCH => MethodFilter::PATCH,
        Method::DELETE => MethodFilter::DELETE,
        _ => return None,
    })
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
