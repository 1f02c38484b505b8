//! Policy evaluation
//!
//! Every decoded event can be submitted to an external policy engine. The OPA
//! evaluator posts `{"input": <event>}` to the data API and reads the verdict out
//! of `result`, which may be a bare boolean or an object with `allow` and `deny`.

use crate::configuration::Policy;
use crate::errors::PolicyError;
use crate::event_processing::DecodedEvent;
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reasons: Vec<String> },
    /// The policy produced no result for this input.
    Undefined,
}

#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn submit_event(&self, event: &DecodedEvent) -> Result<Decision, PolicyError>;
}

pub struct OpaEvaluator {
    client: reqwest::Client,
    base_url: String,
    decision_path: String,
}

impl OpaEvaluator {
    pub fn new(policy: &Policy) -> Result<Self, PolicyError> {
        let client = reqwest::Client::builder()
            .timeout(policy.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: policy.opa_url.trim_end_matches('/').to_string(),
            decision_path: policy.decision_path.trim_matches('/').to_string(),
        })
    }

    pub fn decision_url(&self) -> String {
        format!("{}/v1/data/{}", self.base_url, self.decision_path)
    }

    pub fn policy_url(&self, id: &str) -> String {
        format!("{}/v1/policies/{}", self.base_url, id)
    }

    /// Upload every `*.rego` file in `dir`, keyed by file stem. Returns how many were loaded.
    pub async fn load_policies(&self, dir: &Path) -> Result<usize, PolicyError> {
        let read_failed = |source| PolicyError::PolicyFile {
            path: dir.display().to_string(),
            source,
        };

        let mut files: Vec<_> = fs::read_dir(dir)
            .map_err(read_failed)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("rego"))
            .collect();
        files.sort();

        for path in &files {
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("policy")
                .to_string();
            let body = fs::read_to_string(path).map_err(|source| PolicyError::PolicyFile {
                path: path.display().to_string(),
                source,
            })?;

            let response = self
                .client
                .put(self.policy_url(&id))
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(body)
                .send()
                .await?;
            check_status(response).await?;
            debug!("loaded policy {id} from {}", path.display());
        }

        info!("Loaded {} policies from {}", files.len(), dir.display());
        Ok(files.len())
    }
}

#[async_trait]
impl PolicyEvaluator for OpaEvaluator {
    async fn submit_event(&self, event: &DecodedEvent) -> Result<Decision, PolicyError> {
        let response = self
            .client
            .post(self.decision_url())
            .json(&json!({ "input": event }))
            .send()
            .await?;
        let body: Value = check_status(response).await?.json().await?;
        parse_decision(&body)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PolicyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PolicyError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Interpret an OPA data API response body.
pub fn parse_decision(body: &Value) -> Result<Decision, PolicyError> {
    let Some(result) = body.get("result") else {
        return Ok(Decision::Undefined);
    };

    match result {
        Value::Bool(true) => Ok(Decision::Allow),
        Value::Bool(false) => Ok(Decision::Deny { reasons: Vec::new() }),
        Value::Object(map) => {
            let reasons = match map.get("deny") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                Some(Value::String(s)) => vec![s.clone()],
                Some(other) => {
                    return Err(PolicyError::InvalidResponse(format!(
                        "deny must be a list, got {other}"
                    )))
                }
            };
            if !reasons.is_empty() {
                return Ok(Decision::Deny { reasons });
            }

            match map.get("allow") {
                Some(Value::Bool(true)) => Ok(Decision::Allow),
                Some(Value::Bool(false)) => Ok(Decision::Deny { reasons }),
                None => Ok(Decision::Undefined),
                Some(other) => Err(PolicyError::InvalidResponse(format!(
                    "allow must be a boolean, got {other}"
                ))),
            }
        }
        other => Err(PolicyError::InvalidResponse(format!(
            "unsupported result {other}"
        ))),
    }
}
