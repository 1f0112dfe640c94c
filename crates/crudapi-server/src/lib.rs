pub mod config;
pub mod controller;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod resources;
pub mod server;

pub use config::{
    ApiConfig, AppConfig, LoggingConfig, PaginationConfig, RelationshipConfig, ResourceConfig,
    ServerConfig,
};
pub use controller::{ControllerBuilder, CustomActionHandler, CustomRoute, ResourceController};
pub use handlers::{AppState, ControllerState};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{BuildError, CrudapiServer, ServerBuilder, build_app};
