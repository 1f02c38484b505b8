//! Configuration Builder
//!
//! Provides a builder pattern for constructing Configuration instances
//! from multiple sources with proper validation.

use super::{Configuration, Decode, Output, Pipeline, Policy, Probe};
use crate::errors::KShieldError;
use crate::Args;
use clap::Parser;
use std::fs;
use std::path::Path;

/// Builder for creating Configuration instances
///
/// Sources are applied in call order, so the usual chain is
/// file, then environment, then CLI.
#[derive(Debug)]
pub struct ConfigurationBuilder {
    probe: Probe,
    pipeline: Pipeline,
    decode: Decode,
    output: Output,
    policy: Policy,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            probe: Probe::default(),
            pipeline: Pipeline::default(),
            decode: Decode::default(),
            output: Output::default(),
            policy: Policy::default(),
        }
    }

    /// Configure from raw CLI arguments (without the program name)
    pub fn from_cli_args(self, args: &[&str]) -> Result<Self, KShieldError> {
        let args = Args::try_parse_from(std::iter::once("kshield").chain(args.iter().copied()))
            .map_err(|e| KShieldError::ConfigError {
                message: format!("Invalid arguments: {e}"),
            })?;
        Ok(self.from_args(&args))
    }

    /// Apply the options that were actually given on the command line
    pub fn from_args(mut self, args: &Args) -> Self {
        if let Some(path) = &args.probe_image {
            self.probe.image_path = path.clone();
        }
        if let Some(workers) = args.workers {
            self.pipeline.decoder_workers = workers;
        }
        if let Some(sink) = args.sink {
            self.output.sink = sink;
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }
        if args.verbose {
            self.output.verbose = true;
        }
        if let Some(url) = &args.opa_url {
            self.policy.opa_url = url.clone();
        }
        if let Some(dir) = &args.policy_dir {
            self.policy.policy_dir = Some(dir.clone());
        }
        self
    }

    /// Configure from YAML or JSON configuration file
    pub fn from_config_file<P: AsRef<Path>>(self, path: P) -> Result<Self, KShieldError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| KShieldError::ConfigError {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        // Auto-detect format by extension or content
        if path.extension().and_then(|s| s.to_str()) == Some("json")
            || content.trim_start().starts_with('{')
        {
            self.from_json_str(&content)
        } else {
            self.from_yaml_str(&content)
        }
    }

    /// Configure from YAML string
    pub fn from_yaml_str(self, yaml: &str) -> Result<Self, KShieldError> {
        let config: Configuration =
            serde_yaml::from_str(yaml).map_err(|e| KShieldError::ConfigError {
                message: format!("Failed to parse YAML config: {}", e),
            })?;
        Ok(self.with_file_config(config))
    }

    /// Configure from JSON string
    pub fn from_json_str(self, json: &str) -> Result<Self, KShieldError> {
        let config: Configuration =
            serde_json::from_str(json).map_err(|e| KShieldError::ConfigError {
                message: format!("Failed to parse JSON config: {}", e),
            })?;
        Ok(self.with_file_config(config))
    }

    /// Configure from `KSHIELD_*` environment variables
    pub fn from_environment(self) -> Result<Self, KShieldError> {
        self.from_env_vars(|key| std::env::var(key).ok())
    }

    fn from_env_vars<F>(mut self, lookup: F) -> Result<Self, KShieldError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("KSHIELD_PROBE_IMAGE") {
            self.probe.image_path = path.into();
        }
        if let Some(url) = lookup("KSHIELD_OPA_URL") {
            self.policy.opa_url = url;
        }
        if let Some(workers) = lookup("KSHIELD_DECODER_WORKERS") {
            self.pipeline.decoder_workers =
                workers.parse().map_err(|_| KShieldError::ConfigError {
                    message: format!("Invalid KSHIELD_DECODER_WORKERS: {workers}"),
                })?;
        }
        Ok(self)
    }

    fn with_file_config(mut self, config: Configuration) -> Self {
        self.probe = config.probe;
        self.pipeline = config.pipeline;
        self.decode = config.decode;
        self.output = config.output;
        self.policy = config.policy;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<Configuration, KShieldError> {
        let config = Configuration {
            probe: self.probe,
            pipeline: self.pipeline,
            decode: self.decode,
            output: self.output,
            policy: self.policy,
        };

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn should_read_overrides_from_environment() {
        let env: HashMap<&str, &str> = [
            ("KSHIELD_OPA_URL", "http://opa:8181"),
            ("KSHIELD_DECODER_WORKERS", "8"),
        ]
        .into_iter()
        .collect();

        let config = ConfigurationBuilder::new()
            .from_env_vars(|key| env.get(key).map(|v| v.to_string()))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.policy.opa_url, "http://opa:8181");
        assert_eq!(config.decoder_workers(), 8);
    }

    #[test]
    fn should_reject_non_numeric_worker_count_in_environment() {
        let result = ConfigurationBuilder::new().from_env_vars(|key| {
            (key == "KSHIELD_DECODER_WORKERS").then(|| "many".to_string())
        });

        assert!(result.is_err());
    }

    #[test]
    fn should_let_cli_override_file_values() {
        let config = ConfigurationBuilder::new()
            .from_yaml_str("pipeline:\n  decoder_workers: 2\n")
            .unwrap()
            .from_cli_args(&["--workers", "7"])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.decoder_workers(), 7);
    }
}
