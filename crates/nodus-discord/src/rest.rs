//! Platform REST calls, tunneled through the task service.
//!
//! The bot never speaks HTTP itself. Each call runs the API task script on
//! the remote service with `{token, method, endpoint, body}` as arguments
//! and gets the response body back as the task result.

use crate::error::DiscordError;
use crate::Result;
use async_trait::async_trait;
use nodus_core::SecretString;
use nodus_tickrate::{RpcError, ScriptCatalog, TickrateClient};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Runs a named task script remotely.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run `script` with `args` and return its result.
    async fn run(&self, script: &str, args: Value) -> std::result::Result<Value, RpcError>;
}

/// [`TaskRunner`] backed by the task service client and a script catalog.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    client: TickrateClient,
    catalog: ScriptCatalog,
}

impl ScriptRunner {
    pub fn new(client: TickrateClient, catalog: ScriptCatalog) -> Self {
        Self { client, catalog }
    }

    pub fn client(&self) -> &TickrateClient {
        &self.client
    }

    pub fn catalog(&self) -> &ScriptCatalog {
        &self.catalog
    }
}

#[async_trait]
impl TaskRunner for ScriptRunner {
    async fn run(&self, script: &str, args: Value) -> std::result::Result<Value, RpcError> {
        self.client.run_script(&self.catalog, script, args).await
    }
}

/// HTTP method of a tunneled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// REST client for the platform API.
#[derive(Clone)]
pub struct RestClient {
    runner: Arc<dyn TaskRunner>,
    token: SecretString,
    script: String,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("script", &self.script)
            .field("token", &self.token)
            .finish()
    }
}

impl RestClient {
    /// Create a client that runs `script` for every request.
    pub fn new(runner: Arc<dyn TaskRunner>, token: SecretString, script: impl Into<String>) -> Self {
        Self {
            runner,
            token,
            script: script.into(),
        }
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Perform a request and return the decoded response body.
    pub async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value> {
        debug!(method = %method, endpoint, "REST request");
        let args = json!({
            "token": self.token.expose_secret(),
            "method": method.as_str(),
            "endpoint": endpoint,
            "body": body,
        });

        let result = self.runner.run(&self.script, args).await?;
        let value = decode_body(result)?;
        check_api_error(&value)?;
        Ok(value)
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(Method::Get, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.request(Method::Post, endpoint, Some(body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.request(Method::Patch, endpoint, Some(body)).await
    }

    pub async fn put(&self, endpoint: &str) -> Result<Value> {
        self.request(Method::Put, endpoint, None).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value> {
        self.request(Method::Delete, endpoint, None).await
    }
}

/// The API script returns the raw body as a string; anything else is
/// passed through unchanged.
fn decode_body(result: Value) -> Result<Value> {
    match result {
        Value::String(body) if body.trim().is_empty() => Ok(Value::Null),
        Value::String(body) => serde_json::from_str(&body).map_err(|e| {
            DiscordError::InvalidResponse(format!("Failed to process response: {}", e))
        }),
        other => Ok(other),
    }
}

fn check_api_error(value: &Value) -> Result<()> {
    let Some(object) = value.as_object() else {
        return Ok(());
    };

    // Error envelope produced by the task service
    if object.get("type").and_then(Value::as_str) == Some("error") {
        let message = object
            .get("data")
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(DiscordError::api(None, message));
    }

    // Platform error body
    if !object.contains_key("id") {
        if let (Some(code), Some(message)) = (
            object.get("code").and_then(Value::as_i64),
            object.get("message").and_then(Value::as_str),
        ) {
            return Err(DiscordError::api(Some(code), message));
        }
    }

    Ok(())
}

/// Percent-encode one path segment.
pub fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
