//! Loading an API description from a file path or an HTTP(S) URL.

use rand::Rng;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::ApiDescription;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read API description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch API description from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to parse API description: {0}")]
    Parse(String),

    #[error("API description must be a JSON or YAML object at the top level")]
    NotAnObject,
}

/// Retry and timeout settings for remote documents.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Maximum number of fetch attempts
    pub max_attempts: u32,
    /// Initial backoff duration, doubles on each retry
    pub retry_backoff: Duration,
    /// Timeout for each fetch attempt
    pub timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Load and parse an API description from `source` (path or `http(s)://` URL).
pub async fn load(source: &str, options: &LoadOptions) -> Result<ApiDescription, LoadError> {
    let text = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_with_retry(source, options).await?
    } else {
        read_file(Path::new(source)).await?
    };
    parse(&text)
}

/// Parse document text. JSON is tried first when the text looks like JSON; YAML otherwise.
pub fn parse(text: &str) -> Result<ApiDescription, LoadError> {
    let trimmed = text.trim_start();
    let value: Value = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).map_err(|e| LoadError::Parse(e.to_string()))?
    } else {
        serde_yaml::from_str(text).map_err(|e| LoadError::Parse(e.to_string()))?
    };
    ApiDescription::from_value(value)
}

async fn read_file(path: &Path) -> Result<String, LoadError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Fetch a remote document with exponential backoff retry
///
/// Backoff starts at `retry_backoff` and doubles on each retry, capped at 10 seconds,
/// with 0-25% jitter added to each sleep.
async fn fetch_with_retry(url: &str, options: &LoadOptions) -> Result<String, LoadError> {
    let client = reqwest::Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let max_attempts = options.max_attempts.max(1);
    let mut backoff = options.retry_backoff;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        log::debug!("Fetching API description attempt {attempt}/{max_attempts} from {url}");

        match fetch_once(&client, url).await {
            Ok(text) => {
                if attempt > 1 {
                    log::info!("Fetched API description on attempt {attempt}/{max_attempts}");
                }
                return Ok(text);
            }
            Err(FetchFailure::Permanent(message)) => {
                return Err(LoadError::Fetch {
                    url: url.to_string(),
                    message,
                });
            }
            Err(FetchFailure::Transient(message)) => {
                log::debug!(
                    "Fetch attempt {attempt}/{max_attempts} failed: {message}. Retrying in {backoff:?}"
                );
                last_error = message;
            }
        }

        if attempt == max_attempts {
            break;
        }

        let jitter_max = (backoff.as_millis() / 4).max(1);
        let jitter = rand::rng().random_range(0..jitter_max);
        tokio::time::sleep(backoff + Duration::from_millis(jitter as u64)).await;

        backoff = (backoff * 2).min(Duration::from_secs(10));
    }

    Err(LoadError::Fetch {
        url: url.to_string(),
        message: format!(
            "gave up after {} attempt{}: {}",
            max_attempts,
            if max_attempts == 1 { "" } else { "s" },
            last_error
        ),
    })
}

enum FetchFailure {
    Transient(String),
    Permanent(String),
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<String, FetchFailure> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchFailure::Transient(e.to_string()))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(FetchFailure::Transient(format!("server responded {status}")));
    }
    if !status.is_success() {
        return Err(FetchFailure::Permanent(format!("server responded {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| FetchFailure::Transient(e.to_string()))
}
