//! Request dispatch: validated arguments in, HTTP response (or classified
//! failure) out.

pub mod request;
pub mod security;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use request::{PreparedRequest, prepare};
pub use security::{AppliedCredential, CredentialKind, CredentialSource, EnvCredentials};

use crate::registry::ToolDefinition;

/// Default cap on buffered response bytes (10 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Validation passed but the path still has `{placeholders}`.
    #[error("Internal error: unresolved path parameters in '{path}' for tool '{tool}'")]
    UnresolvedPlaceholder { tool: String, path: String },

    /// The server answered with a 4xx/5xx status.
    #[error("HTTP {status} {status_text}")]
    Status {
        status: u16,
        status_text: String,
        content_type: Option<String>,
        body: String,
    },

    /// The request went out but no response came back.
    #[error("no response received: {message}")]
    Network {
        message: String,
        code: Option<String>,
    },

    /// The request could not be built or sent.
    #[error("{0}")]
    Request(String),

    #[error("call cancelled before a response arrived")]
    Cancelled,
}

impl DispatchError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_builder() {
            return DispatchError::Request(error_chain(&error));
        }
        let code = if error.is_timeout() {
            Some("ETIMEDOUT".to_string())
        } else {
            match io_error_kind(&error) {
                Some(kind) => errno_name(kind).map(str::to_string),
                None => error.is_connect().then(|| "ECONNREFUSED".to_string()),
            }
        };
        DispatchError::Network {
            message: error_chain(&error),
            code,
        }
    }
}

/// `error` followed by every distinct message in its source chain.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(current) = source {
        let text = current.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = current.source();
    }
    message
}

/// Lowest `std::io::Error` kind in the source chain, if any.
fn io_error_kind(error: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = std::error::Error::source(error);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = current.source();
    }
    None
}

/// Errno-style code for the transport failures a request can hit.
fn errno_name(kind: std::io::ErrorKind) -> Option<&'static str> {
    use std::io::ErrorKind;
    Some(match kind {
        ErrorKind::ConnectionRefused => "ECONNREFUSED",
        ErrorKind::ConnectionReset => "ECONNRESET",
        ErrorKind::ConnectionAborted => "ECONNABORTED",
        ErrorKind::NotConnected => "ENOTCONN",
        ErrorKind::AddrInUse => "EADDRINUSE",
        ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        ErrorKind::BrokenPipe => "EPIPE",
        ErrorKind::TimedOut => "ETIMEDOUT",
        ErrorKind::HostUnreachable => "EHOSTUNREACH",
        ErrorKind::NetworkUnreachable => "ENETUNREACH",
        ErrorKind::UnexpectedEof => "ECONNRESET",
        _ => return None,
    })
}

/// A successful (non-error status) response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// `true` when the body was cut at `max_response_bytes`.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Per-call timeout for the downstream HTTP request
    pub timeout: Duration,
    /// Bytes of response body kept in memory; the rest is discarded
    pub max_response_bytes: usize,
    /// Static headers added to every request (names lower-cased)
    pub extra_headers: Vec<(String, String)>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            extra_headers: Vec::new(),
        }
    }
}

pub struct Dispatcher {
    client: reqwest::Client,
    base_url: Option<String>,
    config: DispatchConfig,
    credentials: Arc<dyn CredentialSource>,
}

impl Dispatcher {
    pub fn new(base_url: Option<String>, config: DispatchConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DispatchError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            config,
            credentials: Arc::new(EnvCredentials),
        })
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Build the request for `tool` without sending it.
    pub fn prepare(
        &self,
        tool: &ToolDefinition,
        arguments: &Map<String, Value>,
    ) -> Result<PreparedRequest, DispatchError> {
        let credentials = security::select_credentials(&tool.security, self.credentials.as_ref());
        let mut prepared =
            request::prepare(tool, arguments, self.base_url.as_deref(), credentials)?;
        for (name, value) in &self.config.extra_headers {
            let name = name.to_ascii_lowercase();
            if !prepared.headers.iter().any(|(key, _)| *key == name) {
                prepared.headers.push((name, value.clone()));
            }
        }
        Ok(prepared)
    }

    /// Dispatch, giving up early if `cancel` fires.
    pub async fn dispatch_with_cancel(
        &self,
        tool: &ToolDefinition,
        arguments: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, DispatchError> {
        tokio::select! {
            result = self.dispatch(tool, arguments) => result,
            () = cancel.cancelled() => {
                log::debug!("Call to tool '{}' cancelled", tool.name);
                Err(DispatchError::Cancelled)
            }
        }
    }

    pub async fn dispatch(
        &self,
        tool: &ToolDefinition,
        arguments: &Map<String, Value>,
    ) -> Result<HttpResponse, DispatchError> {
        let prepared = self.prepare(tool, arguments)?;
        log::debug!(
            "Dispatching tool '{}' as {} {}",
            tool.name,
            prepared.method,
            prepared.url
        );

        let mut builder = self
            .client
            .request(prepared.method.to_reqwest(), &prepared.url)
            .query(&prepared.query);
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &prepared.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some((username, password)) = &prepared.basic {
            builder = builder.basic_auth(username, Some(password));
        }
        if let Some(body) = prepared.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(DispatchError::from_reqwest)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let (body, truncated) = read_body(response, self.config.max_response_bytes).await?;
        if truncated {
            log::warn!(
                "Response for tool '{}' exceeded {} bytes and was truncated",
                tool.name,
                self.config.max_response_bytes
            );
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                content_type,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            content_type,
            body,
            truncated,
        })
    }
}

/// Stream the body, keeping at most `limit` bytes.
async fn read_body(response: reqwest::Response, limit: usize) -> Result<(Vec<u8>, bool), DispatchError> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(DispatchError::from_reqwest)?;
        let room = limit.saturating_sub(body.len());
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }

    Ok((body, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_io_kinds_use_errno_names() {
        assert_eq!(errno_name(ErrorKind::ConnectionRefused), Some("ECONNREFUSED"));
        assert_eq!(errno_name(ErrorKind::ConnectionReset), Some("ECONNRESET"));
        assert_eq!(errno_name(ErrorKind::TimedOut), Some("ETIMEDOUT"));
        assert_eq!(errno_name(ErrorKind::PermissionDenied), None);
    }

    #[tokio::test]
    async fn test_builder_error_keeps_its_cause() {
        let error = reqwest::Client::new()
            .get("/relative/only")
            .send()
            .await
            .unwrap_err();
        let DispatchError::Request(message) = DispatchError::from_reqwest(error) else {
            panic!("expected a request construction error");
        };
        assert!(message.starts_with("builder error"));
        assert!(message.contains("relative URL without a base"), "{message}");
    }
}
