use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use store::DEFAULT_INDEXED_PREDICATES;

/// Well-known subject this service consumes.
pub const DEFAULT_TOPIC: &str = "conthesis.action.dgraph.Import";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub dgraph_url: String,
    pub listen_addr: String,
    pub topic: String,
    pub concurrency: ConcurrencyConfig,
    pub schema: SchemaConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_in_flight: usize,
    pub queue_depth: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub indexed_predicates: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dgraph_url: "http://dgraph:8080".to_string(),
            listen_addr: "0.0.0.0:3000".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            concurrency: ConcurrencyConfig {
                max_in_flight: 16,
                queue_depth: 256,
                request_timeout_secs: 30,
            },
            schema: SchemaConfig {
                indexed_predicates: DEFAULT_INDEXED_PREDICATES
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
            },
            log: LogConfig {
                format: LogFormat::Pretty,
            },
        }
    }
}

impl AppConfig {
    /// Defaults overridden by whatever is set in the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = get("DGRAPH_URL") {
            config.dgraph_url = url;
        }
        if let Some(addr) = get("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(topic) = get("IMPORT_TOPIC") {
            config.topic = topic;
        }
        if let Some(value) = get("MAX_IN_FLIGHT") {
            config.concurrency.max_in_flight = parse_positive("MAX_IN_FLIGHT", &value)?;
        }
        if let Some(value) = get("QUEUE_DEPTH") {
            config.concurrency.queue_depth = parse_positive("QUEUE_DEPTH", &value)?;
        }
        if let Some(value) = get("REQUEST_TIMEOUT_SECS") {
            config.concurrency.request_timeout_secs =
                parse_positive::<u64>("REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("INDEXED_PREDICATES") {
            config.schema.indexed_predicates = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = get("LOG_FORMAT") {
            config.log.format = match value.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => anyhow::bail!("LOG_FORMAT must be `json` or `pretty`, got `{other}`"),
            };
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.concurrency.request_timeout_secs)
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parsed: T = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a number, got `{value}`"))?;
    if parsed <= T::default() {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(parsed)
}
