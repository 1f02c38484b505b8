//! Unified Configuration System
//!
//! Combines settings from a config file, the environment and CLI arguments into one
//! validated [`Configuration`]. Later sources override earlier ones.
//!
//! # Basic Usage
//!
//! ```rust
//! use kshield::configuration::{Configuration, SinkKind};
//!
//! let config = Configuration::builder()
//!     .from_cli_args(&["--sink", "console", "--workers", "3"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.output.sink, SinkKind::Console);
//! assert_eq!(config.decoder_workers(), 3);
//! ```

pub mod builder;
pub mod types;

pub use builder::ConfigurationBuilder;
pub use types::*;

use crate::errors::KShieldError;
use kshield_common::PERF_EVENT_HEADER_SIZE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub probe: Probe,
    pub pipeline: Pipeline,
    pub decode: Decode,
    pub output: Output,
    pub policy: Policy,
}

impl Configuration {
    /// Create a new builder for configuration
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), KShieldError> {
        self.validate_pipeline()?;
        self.validate_policy()?;
        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), KShieldError> {
        let pipeline = &self.pipeline;
        if pipeline.decoder_workers == 0 {
            return Err(config_error("At least one decoder worker is required"));
        }

        for (name, capacity) in [
            ("chunk_queue_capacity", pipeline.chunk_queue_capacity),
            ("record_queue_capacity", pipeline.record_queue_capacity),
            ("signal_queue_capacity", pipeline.signal_queue_capacity),
            ("read_batch_size", pipeline.read_batch_size),
        ] {
            if capacity == 0 {
                return Err(config_error(&format!("{name} must be greater than zero")));
            }
        }

        if pipeline.max_record_size < PERF_EVENT_HEADER_SIZE {
            return Err(config_error(&format!(
                "max_record_size must be at least {PERF_EVENT_HEADER_SIZE} bytes"
            )));
        }

        if pipeline.perf_buffer_pages == Some(0) {
            return Err(config_error("perf_buffer_pages must be greater than zero"));
        }

        Ok(())
    }

    fn validate_policy(&self) -> Result<(), KShieldError> {
        if self.output.sink != SinkKind::Policy {
            return Ok(());
        }

        let url = self.policy.opa_url.trim();
        if url.is_empty() {
            return Err(config_error("opa_url is required for the policy sink"));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(config_error(&format!(
                "opa_url must be an http(s) URL: {url}"
            )));
        }
        if self.policy.decision_path.trim_matches('/').is_empty() {
            return Err(config_error("decision_path must not be empty"));
        }
        Ok(())
    }

    pub fn decoder_workers(&self) -> usize {
        self.pipeline.decoder_workers
    }
}

fn config_error(message: &str) -> KShieldError {
    KShieldError::ConfigError {
        message: message.to_string(),
    }
}
