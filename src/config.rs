//! Operator configuration from the environment

use std::time::Duration;

use crate::controller::error::{Error, Result};

const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_METADATA_API_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 5;
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30;

/// Runtime settings of the operator
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Only watch this namespace (`WATCH_NAMESPACE`); cluster-wide if unset
    pub watch_namespace: Option<String>,
    /// Reporter instance for events (`POD_NAME`)
    pub pod_name: Option<String>,
    /// Port of the health and metrics server (`HEALTH_PORT`)
    pub health_port: u16,
    /// Per-request timeout towards the metadata tier (`METADATA_API_TIMEOUT_SECS`)
    pub metadata_api_timeout: Duration,
    /// Fixed metadata tier endpoint (`METADATA_API_ENDPOINT`)
    pub metadata_api_endpoint: Option<String>,
    /// Delay before retrying a pass stopped by a readiness gate (`REQUEUE_INTERVAL_SECS`)
    pub requeue_interval: Duration,
    /// Delay before re-checking a converged cluster (`RESYNC_INTERVAL_SECS`)
    pub resync_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            pod_name: None,
            health_port: DEFAULT_HEALTH_PORT,
            metadata_api_timeout: Duration::from_secs(DEFAULT_METADATA_API_TIMEOUT_SECS),
            metadata_api_endpoint: None,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
        }
    }
}

impl OperatorConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            watch_namespace: get("WATCH_NAMESPACE"),
            pod_name: get("POD_NAME"),
            health_port: match get("HEALTH_PORT") {
                Some(v) => parse("HEALTH_PORT", &v)?,
                None => defaults.health_port,
            },
            metadata_api_timeout: secs(get("METADATA_API_TIMEOUT_SECS"), "METADATA_API_TIMEOUT_SECS")?
                .unwrap_or(defaults.metadata_api_timeout),
            metadata_api_endpoint: get("METADATA_API_ENDPOINT"),
            requeue_interval: secs(get("REQUEUE_INTERVAL_SECS"), "REQUEUE_INTERVAL_SECS")?
                .unwrap_or(defaults.requeue_interval),
            resync_interval: secs(get("RESYNC_INTERVAL_SECS"), "RESYNC_INTERVAL_SECS")?
                .unwrap_or(defaults.resync_interval),
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{} has invalid value {:?}", key, value)))
}

fn secs(value: Option<String>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|v| parse::<u64>(key, &v).map(Duration::from_secs))
        .transpose()
}
