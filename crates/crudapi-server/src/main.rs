use std::env;
use std::process::ExitCode;

use crudapi_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use crudapi_server::{ServerBuilder, apply_logging_level, init_tracing};

/// Where the config path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathOrigin {
    Flag,
    Env,
    Default,
}

#[tokio::main]
async fn main() -> ExitCode {
    match dotenvy::dotenv() {
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => eprintln!("ignoring .env: {e}"),
        Ok(_) => {}
    }
    init_tracing();

    let (path, origin) = config_path(env::args().skip(1));
    let explicit = (origin != PathOrigin::Default).then_some(path.as_str());
    let cfg = match load_config(explicit) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    apply_logging_level(&cfg.logging.level);
    tracing::info!(
        path = %path,
        origin = ?origin,
        resources = cfg.resources.len(),
        "Configuration loaded"
    );

    let server = match ServerBuilder::new().with_config(cfg).build() {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            return ExitCode::from(2);
        }
    };
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Server stopped with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// `--config <path>`, then `CRUDAPI_CONFIG`, then `crudapi.toml`.
fn config_path(mut args: impl Iterator<Item = String>) -> (String, PathOrigin) {
    while let Some(arg) = args.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            return (path.to_string(), PathOrigin::Flag);
        }
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, PathOrigin::Flag);
            }
        }
    }
    match env::var("CRUDAPI_CONFIG") {
        Ok(path) if !path.is_empty() => (path, PathOrigin::Env),
        _ => (DEFAULT_CONFIG_PATH.to_string(), PathOrigin::Default),
    }
}
