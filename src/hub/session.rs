//! HTTPS hub session.
//!
//! Requests are a small JSON envelope POSTed to the hub endpoint; the
//! response carries either a `result` value or an error string. The session
//! authenticates with the client certificate at construction time and every
//! call is a single attempt; retry policy belongs to the operator, not
//! this client.

use std::fs;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{Certificate, Identity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ClientConfig;

use super::{
    BuildOptions, BuildTarget, HubClient, HubError, InheritanceEntry, TagInfo, TaskId, TaskInfo,
};

#[derive(Debug, Serialize)]
struct HubRequest<'a> {
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct HubResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// A logged-in hub session.
pub struct HubSession {
    client: Client,
    url: String,
}

impl HubSession {
    /// Build the TLS client from the configured certificate paths and log in.
    pub fn connect(config: &ClientConfig) -> Result<Self, HubError> {
        let pem = fs::read(&config.cert).map_err(|e| {
            HubError::Auth(format!(
                "client certificate {} unreadable: {e}",
                config.cert.display()
            ))
        })?;
        let identity = Identity::from_pem(&pem)
            .map_err(|e| HubError::Auth(format!("invalid client certificate: {e}")))?;
        let server_ca = fs::read(&config.serverca_cert).map_err(|e| {
            HubError::Auth(format!(
                "server CA {} unreadable: {e}",
                config.serverca_cert.display()
            ))
        })?;
        let server_ca = Certificate::from_pem(&server_ca)
            .map_err(|e| HubError::Auth(format!("invalid server CA: {e}")))?;

        let client = Client::builder()
            .identity(identity)
            .add_root_certificate(server_ca)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| HubError::Transport(e.to_string()))?;

        let session = Self {
            client,
            url: config.hub_url.clone(),
        };
        let result = session.call("sslLogin", json!({}))?;
        if result.as_bool() != Some(true) {
            return Err(HubError::Auth("login rejected by hub".to_string()));
        }
        Ok(session)
    }

    fn call(&self, method: &str, params: Value) -> Result<Value, HubError> {
        let request = HubRequest { method, params };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| HubError::Transport(e.to_string()))?;
        let body: HubResponse = response
            .json()
            .map_err(|e| HubError::Protocol(e.to_string()))?;
        if !body.ok {
            return Err(HubError::Protocol(
                body.error
                    .unwrap_or_else(|| format!("{method} failed without detail")),
            ));
        }
        Ok(body.result)
    }

    fn call_as<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, HubError> {
        let result = self.call(method, params)?;
        serde_json::from_value(result)
            .map_err(|e| HubError::Protocol(format!("bad {method} result: {e}")))
    }

    /// Like `call_as`, but the hub answers `null` for missing records.
    fn call_optional<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, HubError> {
        let result = self.call(method, params)?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| HubError::Protocol(format!("bad {method} result: {e}")))
    }
}

impl HubClient for HubSession {
    fn get_build_target(&self, name: &str) -> Result<Option<BuildTarget>, HubError> {
        self.call_optional("getBuildTarget", json!({ "name": name }))
    }

    fn get_tag(&self, name: &str) -> Result<Option<TagInfo>, HubError> {
        self.call_optional("getTag", json!({ "tagInfo": name }))
    }

    fn get_full_inheritance(&self, tag_id: u32) -> Result<Vec<InheritanceEntry>, HubError> {
        self.call_as("getFullInheritance", json!({ "tag": tag_id }))
    }

    fn get_task_info(&self, id: TaskId) -> Result<TaskInfo, HubError> {
        self.call_optional("getTaskInfo", json!({ "task": id }))?
            .ok_or(HubError::UnknownTask(id))
    }

    fn get_task_children(&self, id: TaskId) -> Result<Vec<TaskInfo>, HubError> {
        self.call_as("getTaskChildren", json!({ "task": id }))
    }

    fn build(
        &self,
        source: &str,
        target: &str,
        opts: &BuildOptions,
    ) -> Result<TaskId, HubError> {
        self.call_as(
            "build",
            json!({
                "src": source,
                "target": target,
                "opts": opts,
                "priority": opts.priority(),
            }),
        )
    }

    fn chain_build(
        &self,
        groups: &[Vec<String>],
        target: &str,
        opts: &BuildOptions,
    ) -> Result<TaskId, HubError> {
        self.call_as(
            "chainBuild",
            json!({
                "srcs": groups,
                "target": target,
                "opts": opts,
                "priority": opts.priority(),
            }),
        )
    }
}
