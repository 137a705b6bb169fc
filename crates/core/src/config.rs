use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LINKFORTY__` and TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub webhooks: WebhookDefaultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_pool_min")]
    pub pool_min: u32,
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: Option<String>,
    #[serde(default = "default_link_cache_ttl_secs")]
    pub link_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Defaults for the deferred-attribution engine: candidate scan bound,
/// score threshold, and the per-link attribution window bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,
    #[serde(default = "default_max_candidate_rows")]
    pub max_candidate_rows: u32,
    #[serde(default = "default_max_window_hours")]
    pub max_window_hours: u32,
}

/// Defaults applied to a webhook's retry policy when none is configured
/// explicitly on the row.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookDefaultsConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_database_url() -> String {
    "postgres://localhost/linkforty".to_string()
}
fn default_pool_min() -> u32 {
    2
}
fn default_pool_max() -> u32 {
    10
}
fn default_redis_url() -> Option<String> {
    Some("redis://localhost:6379".to_string())
}
fn default_link_cache_ttl_secs() -> u64 {
    300
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_confidence_threshold() -> u8 {
    70
}
fn default_max_candidate_rows() -> u32 {
    1000
}
fn default_max_window_hours() -> u32 {
    2160
}
fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_min: default_pool_min(),
            pool_max: default_pool_max(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            link_cache_ttl_secs: default_link_cache_ttl_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_candidate_rows: default_max_candidate_rows(),
            max_window_hours: default_max_window_hours(),
        }
    }
}

impl Default for WebhookDefaultsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            redis: RedisConfig::default(),
            metrics: MetricsConfig::default(),
            attribution: AttributionConfig::default(),
            webhooks: WebhookDefaultsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LINKFORTY")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
