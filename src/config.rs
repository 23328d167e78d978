use std::{net::SocketAddr, time::Duration};

use secrecy::SecretString;
use serde::Deserialize;

use crate::processor::ProcessorConfig;

/// Database path selecting an in-memory store.
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    OpenSearch,
    Memory,
}

/// Settings read from `OUTBOX_*` environment variables.
#[derive(Clone, Default, Deserialize)]
pub struct Config {
    pub db_path: Option<String>,

    pub batch_size: Option<u32>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub orphan_threshold_secs: Option<u64>,
    pub retention_hours: Option<u64>,
    pub failed_scan_limit: Option<u32>,

    pub sink: Option<SinkKind>,
    pub opensearch_url: Option<String>,
    pub opensearch_index: Option<String>,
    pub opensearch_username: Option<String>,
    pub opensearch_password: Option<SecretString>,
    pub opensearch_timeout_secs: Option<u64>,

    pub admin_addr: Option<SocketAddr>,
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("OUTBOX_").from_env::<Self>()?)
    }

    pub fn in_memory() -> Self {
        Self {
            db_path: Some(IN_MEMORY.to_owned()),
            ..Self::default()
        }
    }

    pub fn db_path(&self) -> &str {
        self.db_path.as_deref().unwrap_or("outbox.db")
    }

    pub fn failed_scan_limit(&self) -> u32 {
        self.failed_scan_limit.unwrap_or(1000)
    }

    pub fn sink(&self) -> SinkKind {
        self.sink.unwrap_or_default()
    }

    pub fn opensearch_url(&self) -> &str {
        self.opensearch_url
            .as_deref()
            .unwrap_or("http://localhost:9200")
    }

    pub fn opensearch_index(&self) -> &str {
        self.opensearch_index.as_deref().unwrap_or("cars")
    }

    pub fn opensearch_timeout(&self) -> Duration {
        Duration::from_secs(self.opensearch_timeout_secs.unwrap_or(30))
    }

    pub fn admin_addr(&self) -> SocketAddr {
        self.admin_addr
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)))
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        let defaults = ProcessorConfig::default();

        ProcessorConfig::builder()
            .batch_size(self.batch_size.unwrap_or(defaults.batch_size))
            .max_retries(self.max_retries.unwrap_or(defaults.max_retries))
            .retry_delay(
                self.retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry_delay),
            )
            .poll_interval(
                self.poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll_interval),
            )
            .orphan_threshold(
                self.orphan_threshold_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.orphan_threshold),
            )
            .retention(
                self.retention_hours
                    .map(|hours| Duration::from_secs(hours.saturating_mul(60 * 60)))
                    .unwrap_or(defaults.retention),
            )
            .build()
    }
}
