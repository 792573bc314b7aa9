//! Turns a dispatch outcome into the single text item returned to callers.

use serde_json::Value;

use crate::dispatch::{DispatchError, HttpResponse};
use crate::openapi::is_json_content_type;

/// Characters of an error body kept in the rendered message.
pub const DEFAULT_ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedResult {
    Success {
        status: u16,
        text: String,
    },
    /// The server answered with an error status.
    HttpError {
        status: u16,
        status_text: String,
        body: String,
    },
    /// Sent, but nothing came back.
    NetworkError {
        code: Option<String>,
    },
    /// Could not be built or sent at all.
    RequestError {
        message: String,
    },
    Other {
        message: String,
    },
}

impl NormalizedResult {
    pub fn is_error(&self) -> bool {
        !matches!(self, NormalizedResult::Success { .. })
    }

    pub fn render(&self) -> String {
        match self {
            NormalizedResult::Success { status, text } => {
                format!("API Response (Status: {status}):\n{text}")
            }
            NormalizedResult::HttpError {
                status,
                status_text,
                body,
            } => format!("API Error: Status {status} ({status_text}): {body}"),
            NormalizedResult::NetworkError { code } => match code {
                Some(code) => format!("API Network Error: No response received. (Code: {code})"),
                None => "API Network Error: No response received.".to_string(),
            },
            NormalizedResult::RequestError { message } => {
                format!("API Request Setup Error: {message}")
            }
            NormalizedResult::Other { message } => format!("Error: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    error_body_limit: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_BODY_LIMIT)
    }
}

impl Normalizer {
    pub fn new(error_body_limit: usize) -> Self {
        Self { error_body_limit }
    }

    pub fn normalize(&self, result: Result<HttpResponse, DispatchError>) -> NormalizedResult {
        match result {
            Ok(response) => NormalizedResult::Success {
                status: response.status,
                text: success_text(&response),
            },
            Err(DispatchError::Status {
                status,
                status_text,
                content_type,
                body,
            }) => NormalizedResult::HttpError {
                status,
                status_text,
                body: self.truncate(&error_body_text(content_type.as_deref(), body)),
            },
            Err(DispatchError::Network { message, code }) => {
                log::debug!("Network failure: {message}");
                NormalizedResult::NetworkError { code }
            }
            Err(DispatchError::Request(message)) => NormalizedResult::RequestError { message },
            Err(other @ (DispatchError::UnresolvedPlaceholder { .. } | DispatchError::Cancelled)) => {
                NormalizedResult::Other {
                    message: other.to_string(),
                }
            }
        }
    }

    fn truncate(&self, text: &str) -> String {
        match text.char_indices().nth(self.error_body_limit) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        }
    }
}

fn success_text(response: &HttpResponse) -> String {
    if response.body.is_empty() {
        return format!("(Status: {} - No body content)", response.status);
    }

    let json = response
        .content_type
        .as_deref()
        .is_some_and(is_json_content_type);
    let mut text = None;
    if json {
        if let Ok(value @ (Value::Object(_) | Value::Array(_))) =
            serde_json::from_slice::<Value>(&response.body)
        {
            text = serde_json::to_string_pretty(&value).ok();
        }
    }
    let mut text = text.unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned());

    if response.truncated {
        text.push_str(&format!("\n[response truncated after {} bytes]", response.body.len()));
    }
    text
}

/// JSON error bodies are re-serialized compactly before truncation.
fn error_body_text(content_type: Option<&str>, body: String) -> String {
    let looks_json = content_type.is_none_or(is_json_content_type);
    if looks_json {
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            return value.to_string();
        }
    }
    body
}
