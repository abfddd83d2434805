// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SinkError;
use crate::index_name::RotationGranularity;
use std::env;
use std::time::Duration;

/// Resolved configuration consumed by the trace sink.
///
/// All values are final: parsing and defaulting happen in [`SinkConfig::from_env`]
/// or at the caller, never inside the pipeline.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Base URI of the Elasticsearch backend.
    pub endpoint: String,
    /// Prefix fed to the index name resolver.
    pub index_prefix: String,
    /// Time unit at which the index name rolls over.
    pub rotation: RotationGranularity,
    /// Optional basic-auth username, passed through to the transport.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
    /// Length of the batching window.
    pub window_duration: Duration,
    /// Number of documents that closes a batch before the window elapses.
    pub max_batch_size: usize,
    /// Documents allowed to sit in the ingestion queue before new ones are
    /// rejected and counted as dropped.
    pub max_pending_docs: usize,
    /// Concurrent bulk requests allowed in flight; batches beyond the cap
    /// are dropped and counted.
    pub max_inflight_ships: usize,
    /// Per-request HTTP timeout.
    pub flush_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index_prefix: "trace".to_string(),
            rotation: RotationGranularity::Monthly,
            username: None,
            password: None,
            window_duration: Duration::from_secs(1),
            max_batch_size: 10,
            max_pending_docs: 50_000,
            max_inflight_ships: 8,
            flush_timeout: Duration::from_secs(5),
        }
    }
}

impl SinkConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, SinkError> {
        let defaults = SinkConfig::default();

        let endpoint = env::var("ES_TRACE_URI").unwrap_or(defaults.endpoint);
        let index_prefix = env::var("ES_TRACE_INDEX").unwrap_or(defaults.index_prefix);
        let rotation = match env::var("ES_TRACE_ROTATION") {
            Ok(value) => RotationGranularity::parse(&value).ok_or_else(|| {
                SinkError::InvalidConfig(format!(
                    "Invalid rotation '{value}'. Must be one of: hourly, daily, monthly"
                ))
            })?,
            Err(_) => defaults.rotation,
        };
        let username = env::var("ES_TRACE_USERNAME").ok().filter(|v| !v.is_empty());
        let password = env::var("ES_TRACE_PASSWORD").ok().filter(|v| !v.is_empty());
        let window_duration = env::var("ES_TRACE_WINDOW_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.window_duration);
        let max_batch_size = env::var("ES_TRACE_BATCH_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.max_batch_size);

        let config = Self {
            endpoint,
            index_prefix,
            rotation,
            username,
            password,
            window_duration,
            max_batch_size,
            max_pending_docs: defaults.max_pending_docs,
            max_inflight_ships: defaults.max_inflight_ships,
            flush_timeout: defaults.flush_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.endpoint.trim().is_empty() {
            return Err(SinkError::InvalidConfig(
                "backend URI cannot be empty".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.endpoint).is_err() {
            return Err(SinkError::InvalidConfig(format!(
                "backend URI '{}' is not a valid URL",
                self.endpoint
            )));
        }

        if self.index_prefix.trim().is_empty() {
            return Err(SinkError::InvalidConfig(
                "index prefix cannot be empty".to_string(),
            ));
        }

        if self.max_batch_size == 0 {
            return Err(SinkError::InvalidConfig(
                "max batch size must be greater than 0".to_string(),
            ));
        }

        if self.window_duration.is_zero() {
            return Err(SinkError::InvalidConfig(
                "window duration must be greater than 0".to_string(),
            ));
        }

        if self.max_inflight_ships == 0 {
            return Err(SinkError::InvalidConfig(
                "in-flight ship cap must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SinkConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_endpoint() {
        let config = SinkConfig {
            endpoint: "   ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_malformed_endpoint() {
        let config = SinkConfig {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_prefix() {
        let config = SinkConfig {
            index_prefix: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let config = SinkConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_window() {
        let config = SinkConfig {
            window_duration: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("ES_TRACE_URI", "http://search.internal:9200");
        env::set_var("ES_TRACE_INDEX", "AppTraces");
        env::set_var("ES_TRACE_ROTATION", "daily");
        env::set_var("ES_TRACE_WINDOW_SECS", "3");
        env::set_var("ES_TRACE_BATCH_SIZE", "25");

        let config = SinkConfig::from_env().expect("config should load");
        assert_eq!(config.endpoint, "http://search.internal:9200");
        assert_eq!(config.index_prefix, "AppTraces");
        assert_eq!(config.rotation, RotationGranularity::Daily);
        assert_eq!(config.window_duration, Duration::from_secs(3));
        assert_eq!(config.max_batch_size, 25);

        // Unknown rotation values are rejected rather than defaulted.
        env::set_var("ES_TRACE_ROTATION", "weekly");
        assert!(SinkConfig::from_env().is_err());

        env::remove_var("ES_TRACE_URI");
        env::remove_var("ES_TRACE_INDEX");
        env::remove_var("ES_TRACE_ROTATION");
        env::remove_var("ES_TRACE_WINDOW_SECS");
        env::remove_var("ES_TRACE_BATCH_SIZE");
    }
}
