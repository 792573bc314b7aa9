//! The per-call pipeline: look up, validate, dispatch, normalize.

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::normalize::{NormalizedResult, Normalizer};
use crate::registry::ToolRegistry;
use crate::validate::{self, ValidationFailure};

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The request was dispatched (or failed trying); see `result`.
    Completed {
        tool: String,
        result: NormalizedResult,
    },
    /// Rejected before any HTTP traffic.
    InvalidArguments {
        tool: String,
        failure: ValidationFailure,
    },
    UnknownTool {
        name: String,
    },
}

impl CallOutcome {
    pub fn is_error(&self) -> bool {
        match self {
            CallOutcome::Completed { result, .. } => result.is_error(),
            CallOutcome::InvalidArguments { .. } | CallOutcome::UnknownTool { .. } => true,
        }
    }

    pub fn render(&self) -> String {
        match self {
            CallOutcome::Completed { result, .. } => result.render(),
            CallOutcome::InvalidArguments { tool, failure } => {
                format!("Invalid arguments for tool '{tool}': {}", failure.summary())
            }
            CallOutcome::UnknownTool { name } => format!("Error: Unknown tool requested: {name}"),
        }
    }
}

/// Shared by every session; holds no per-call state.
pub struct ToolService {
    registry: Arc<ToolRegistry>,
    dispatcher: Dispatcher,
    normalizer: Normalizer,
}

impl ToolService {
    pub fn new(registry: Arc<ToolRegistry>, dispatcher: Dispatcher, normalizer: Normalizer) -> Self {
        Self {
            registry,
            dispatcher,
            normalizer,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn call(&self, name: &str, arguments: Value, cancel: &CancellationToken) -> CallOutcome {
        let Some(tool) = self.registry.get(name) else {
            log::warn!("Unknown tool requested: {name}");
            return CallOutcome::UnknownTool {
                name: name.to_string(),
            };
        };

        let arguments = match validate::validate(tool, arguments) {
            Ok(arguments) => arguments,
            Err(failure) => {
                log::info!("Rejected arguments for tool '{}': {}", tool.name, failure);
                return CallOutcome::InvalidArguments {
                    tool: tool.name.clone(),
                    failure,
                };
            }
        };

        let started = std::time::Instant::now();
        let response = self
            .dispatcher
            .dispatch_with_cancel(tool, &arguments, cancel)
            .await;
        let result = self.normalizer.normalize(response);
        log::debug!(
            "Tool '{}' finished in {:?} (error: {})",
            tool.name,
            started.elapsed(),
            result.is_error()
        );

        CallOutcome::Completed {
            tool: tool.name.clone(),
            result,
        }
    }
}
