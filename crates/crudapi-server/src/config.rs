use crudapi_core::IdKind;
use crudapi_query::{OnDisallowed, Pagination};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Resources served without any code, declared as `[[resources]]` tables
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if let Some(base_url) = &self.server.base_url {
            url::Url::parse(base_url)
                .map_err(|e| format!("server.base_url is not a valid URL: {e}"))?;
        }
        // Pagination validations
        if self.pagination.default_limit == 0 {
            return Err("pagination.default_limit must be > 0".into());
        }
        if self.pagination.max_limit == 0 {
            return Err("pagination.max_limit must be > 0".into());
        }
        if self.pagination.default_limit > self.pagination.max_limit {
            return Err("pagination.default_limit must be <= pagination.max_limit".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Resource validations
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.type_name.is_empty() {
                return Err("resources.type must not be empty".into());
            }
            if !seen.insert(resource.type_name.as_str()) {
                return Err(format!("resource type '{}' is declared twice", resource.type_name));
            }
            if !resource.only.is_empty() && !resource.except.is_empty() {
                return Err(format!(
                    "resource '{}' sets both only and except",
                    resource.type_name
                ));
            }
        }
        for resource in &self.resources {
            for relationship in &resource.relationships {
                if !seen.contains(relationship.resource.as_str()) {
                    return Err(format!(
                        "relationship '{}.{}' refers to undeclared resource '{}'",
                        resource.type_name, relationship.name, relationship.resource
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Base URL for links, or `None` to emit relative links.
    pub fn base_url(&self) -> Option<&str> {
        self.server
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.pagination.default_limit, self.pagination.max_limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL used in `links`. Relative links are emitted when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Upper bound on requests handled concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_max_concurrency() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            body_limit_bytes: default_body_limit(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_page_limit() -> usize {
    Pagination::default().default_limit
}
fn default_max_limit() -> usize {
    Pagination::default().max_limit
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// Identifier kind generated by the data layer and accepted in paths
    #[serde(default)]
    pub id_type: IdKind,
    /// Report after-hook failures under `meta.warnings`
    #[serde(default)]
    pub debug: bool,
    /// Default for resources that do not set `on_disallowed` themselves
    #[serde(default)]
    pub on_disallowed: OnDisallowed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A resource declared in configuration.
///
/// ```toml
/// [[resources]]
/// type = "articles"
/// attributes = ["title", "body", "createdAt"]
/// exclude = ["secret"]
/// relationships = [{ name = "author", resource = "people" }]
/// allowed_filters = ["title"]
/// allowed_sorts = ["createdAt"]
/// allowed_includes = ["author"]
/// except = ["deleteMany"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub id_key: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    #[serde(default)]
    pub allowed_filters: Vec<String>,
    #[serde(default)]
    pub allowed_sorts: Vec<String>,
    #[serde(default)]
    pub allowed_includes: Vec<String>,
    #[serde(default)]
    pub max_include_depth: Option<usize>,
    #[serde(default)]
    pub on_disallowed: Option<OnDisallowed>,
    #[serde(default)]
    pub only: Vec<String>,
    #[serde(default)]
    pub except: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Key the relationship is stored under
    pub name: String,
    /// Type of the related resource
    pub resource: String,
    /// Name exposed in documents, kebab-case of `name` when unset
    #[serde(default)]
    pub exposed_as: Option<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_PATH: &str = "crudapi.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            tracing::warn!(path = %pathbuf.display(), "Config file not found, using defaults");
        }
        // Environment variable overrides, e.g., CRUDAPI__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("CRUDAPI")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(type_name: &str) -> ResourceConfig {
        ResourceConfig {
            type_name: type_name.into(),
            id_key: None,
            attributes: vec!["name".into()],
            exclude: Vec::new(),
            relationships: Vec::new(),
            allowed_filters: Vec::new(),
            allowed_sorts: Vec::new(),
            allowed_includes: Vec::new(),
            max_include_depth: None,
            on_disallowed: None,
            only: Vec::new(),
            except: Vec::new(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pagination.default_limit, 20);
        assert_eq!(cfg.pagination.max_limit, 100);
        assert_eq!(cfg.api.id_type, IdKind::Uuid);
        assert!(cfg.base_url().is_none());
    }

    #[test]
    fn base_url_is_trimmed_and_checked() {
        let mut cfg = AppConfig::default();
        cfg.server.base_url = Some("http://api.example.com/".into());
        assert_eq!(cfg.base_url(), Some("http://api.example.com"));

        cfg.server.base_url = Some("not a url".into());
        assert!(cfg.validate().unwrap_err().contains("base_url"));
    }

    #[test]
    fn duplicate_and_dangling_resources_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.resources = vec![resource("people"), resource("people")];
        assert!(cfg.validate().unwrap_err().contains("declared twice"));

        let mut articles = resource("articles");
        articles.relationships.push(RelationshipConfig {
            name: "author".into(),
            resource: "people".into(),
            exposed_as: None,
        });
        cfg.resources = vec![articles.clone()];
        assert!(cfg.validate().unwrap_err().contains("undeclared resource"));

        cfg.resources = vec![articles, resource("people")];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn only_and_except_are_exclusive() {
        let mut cfg = AppConfig::default();
        let mut people = resource("people");
        people.only = vec!["index".into()];
        people.except = vec!["delete".into()];
        cfg.resources = vec![people];
        assert!(cfg.validate().unwrap_err().contains("only and except"));
    }
}
