//! HTTP result channel
//!
//! Sends GET/POST requests to the TestNet server and decodes JSON bodies.
//! Every response must be `application/json`, including error responses,
//! which carry their diagnostic in a `message` field.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::common::{normalize_base_url, normalize_path, Error, Result};

/// HTTP method used on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A request/response channel to the TestNet server
///
/// No retries happen at this layer.
#[async_trait]
pub trait ResultChannel: Send + Sync {
    /// Issue a request and return the decoded JSON body
    async fn request(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<Value>;
}

/// Channel backed by a `reqwest` client session
#[derive(Debug, Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChannel {
    /// Create a channel with its own client session
    pub fn new(server: &str) -> Self {
        Self::with_client(reqwest::Client::new(), server)
    }

    /// Create a channel sharing an existing client session
    pub fn with_client(client: reqwest::Client, server: &str) -> Self {
        Self {
            client,
            base_url: normalize_base_url(server),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ResultChannel for HttpChannel {
    async fn request(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, normalize_path(path));
        tracing::debug!(%method, %url, "Sending request");

        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(form) = form {
            builder = builder.form(form);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{} {} failed: {}", method, url, e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read body of {}: {}", url, e)))?;

        tracing::trace!(status, ?content_type, bytes = body.len(), "Received response");
        decode_response(status, content_type.as_deref(), &body)
    }
}

/// Whether a content-type header names JSON, ignoring parameters like charset
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Turn a raw response into a JSON value or a typed error
///
/// The body is decoded before the status is inspected, so a non-JSON body
/// always yields a transport error even when the status looks like a failure.
pub fn decode_response(status: u16, content_type: Option<&str>, body: &[u8]) -> Result<Value> {
    match content_type {
        Some(ct) if is_json(ct) => {}
        Some(ct) => {
            return Err(Error::Transport(format!(
                "Did not receive a JSON response (HTTP {}, content-type: {})",
                status, ct
            )))
        }
        None => {
            return Err(Error::Transport(format!(
                "Did not receive a JSON response (HTTP {}, no content-type)",
                status
            )))
        }
    }

    let value: Value = serde_json::from_slice(body).map_err(|e| {
        Error::Transport(format!("Invalid JSON in HTTP {} response: {}", status, e))
    })?;

    if !(200..300).contains(&status) {
        let message = value.get("message").and_then(Value::as_str);
        return Err(Error::remote(status, message));
    }

    Ok(value)
}
