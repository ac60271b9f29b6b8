//! Manager configuration.

use std::collections::HashMap;
use std::time::Duration;

use riakpersist_client::ClientConfig;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The only transport this crate provides.
pub const HTTP_TRANSPORT: &str = "http";

fn default_load_bunch_size() -> usize {
    100
}

fn default_mapreduce_timeout() -> u64 {
    4 * 60 * 1000
}

fn default_transport_type() -> String {
    HTTP_TRANSPORT.to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, u32>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Configuration of an [`AsyncManager`](crate::AsyncManager).
///
/// Connection parameters (`host`, `port`, `prefix`, `mapred_prefix`,
/// `client_id`, `transport_options`) sit at the top level next to the
/// manager options:
///
/// ```json
/// {
///     "bucket_prefix": "prod.",
///     "load_bunch_size": 50,
///     "store_versions": {"app.Contact": 2},
///     "host": "riak.internal",
///     "port": 8098
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Prepended to every model's bucket name.
    pub bucket_prefix: String,

    /// Keys loaded per bunch by [`BunchLoader`](crate::BunchLoader).
    #[serde(default = "default_load_bunch_size")]
    pub load_bunch_size: usize,

    /// Map-reduce timeout in milliseconds.
    #[serde(default = "default_mapreduce_timeout")]
    pub mapreduce_timeout: u64,

    #[serde(default = "default_transport_type")]
    pub transport_type: String,

    /// Schema version written to storage per model name, when it differs
    /// from the model's current version.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub store_versions: HashMap<String, u32>,

    /// Upper bound on concurrent blocking store calls. Unbounded if unset.
    #[serde(default)]
    pub max_workers: Option<usize>,

    #[serde(flatten)]
    pub connection: ClientConfig,
}

impl ManagerConfig {
    pub fn new(bucket_prefix: impl Into<String>) -> Self {
        Self {
            bucket_prefix: bucket_prefix.into(),
            load_bunch_size: default_load_bunch_size(),
            mapreduce_timeout: default_mapreduce_timeout(),
            transport_type: default_transport_type(),
            store_versions: HashMap::new(),
            max_workers: None,
            connection: ClientConfig::default(),
        }
    }

    /// Parse and validate a configuration value.
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transport_type != HTTP_TRANSPORT {
            return Err(Error::config(format!(
                "unsupported transport_type {:?}",
                self.transport_type
            )));
        }
        if self.load_bunch_size == 0 {
            return Err(Error::config("load_bunch_size must be positive"));
        }
        if self.max_workers == Some(0) {
            return Err(Error::config("max_workers must be positive"));
        }
        Ok(())
    }

    pub fn with_store_version(mut self, model_name: impl Into<String>, version: u32) -> Self {
        self.store_versions.insert(model_name.into(), version);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_load_bunch_size(mut self, load_bunch_size: usize) -> Self {
        self.load_bunch_size = load_bunch_size;
        self
    }

    pub fn map_reduce_timeout(&self) -> Duration {
        Duration::from_millis(self.mapreduce_timeout)
    }

    /// The version to write for `model_name`, falling back to `current`.
    pub fn store_version(&self, model_name: &str, current: u32) -> u32 {
        self.store_versions.get(model_name).copied().unwrap_or(current)
    }
}
