//! Credentials for security schemes bound to a tool.

use crate::openapi::{ApiKeyLocation, SecurityScheme};
use crate::registry::SecurityBinding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ApiKey,
    BearerToken,
    BasicUsername,
    BasicPassword,
}

impl CredentialKind {
    fn env_prefix(self) -> &'static str {
        match self {
            CredentialKind::ApiKey => "API_KEY",
            CredentialKind::BearerToken => "BEARER_TOKEN",
            CredentialKind::BasicUsername => "BASIC_USERNAME",
            CredentialKind::BasicPassword => "BASIC_PASSWORD",
        }
    }
}

/// Looks up secret material by security scheme name.
pub trait CredentialSource: Send + Sync {
    fn credential(&self, scheme_name: &str, kind: CredentialKind) -> Option<String>;
}

/// Reads `API_KEY_<SCHEME>`, `BEARER_TOKEN_<SCHEME>`, `BASIC_USERNAME_<SCHEME>`
/// and `BASIC_PASSWORD_<SCHEME>` from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn variable_name(scheme_name: &str, kind: CredentialKind) -> String {
        let suffix: String = scheme_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}", kind.env_prefix(), suffix)
    }
}

impl CredentialSource for EnvCredentials {
    fn credential(&self, scheme_name: &str, kind: CredentialKind) -> Option<String> {
        std::env::var(Self::variable_name(scheme_name, kind))
            .ok()
            .filter(|value| !value.is_empty())
    }
}

/// A credential ready to be placed on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedCredential {
    Header { name: String, value: String },
    Query { name: String, value: String },
    Cookie { name: String, value: String },
    Bearer(String),
    Basic { username: String, password: String },
}

/// Pick the first requirement alternative whose credentials are all present.
///
/// Non-empty alternatives are preferred over an empty (anonymous) one.
pub fn select_credentials(
    security: &[Vec<SecurityBinding>],
    source: &dyn CredentialSource,
) -> Vec<AppliedCredential> {
    let mut alternatives: Vec<&Vec<SecurityBinding>> = security.iter().collect();
    alternatives.sort_by_key(|bindings| bindings.is_empty());

    for bindings in alternatives {
        let applied: Option<Vec<AppliedCredential>> = bindings
            .iter()
            .map(|binding| resolve(binding, source))
            .collect();
        match applied {
            Some(applied) => return applied,
            None => log::debug!(
                "Skipping security alternative [{}]: credentials not configured",
                bindings
                    .iter()
                    .map(|b| b.scheme_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
    Vec::new()
}

fn resolve(binding: &SecurityBinding, source: &dyn CredentialSource) -> Option<AppliedCredential> {
    let scheme_name = binding.scheme_name.as_str();
    match &binding.scheme {
        SecurityScheme::ApiKey { name, location } => {
            let value = source.credential(scheme_name, CredentialKind::ApiKey)?;
            let name = name.clone();
            Some(match location {
                ApiKeyLocation::Header => AppliedCredential::Header { name, value },
                ApiKeyLocation::Query => AppliedCredential::Query { name, value },
                ApiKeyLocation::Cookie => AppliedCredential::Cookie { name, value },
            })
        }
        SecurityScheme::Http { scheme } if scheme.eq_ignore_ascii_case("bearer") => source
            .credential(scheme_name, CredentialKind::BearerToken)
            .map(AppliedCredential::Bearer),
        SecurityScheme::Http { scheme } if scheme.eq_ignore_ascii_case("basic") => {
            let username = source.credential(scheme_name, CredentialKind::BasicUsername)?;
            let password = source
                .credential(scheme_name, CredentialKind::BasicPassword)
                .unwrap_or_default();
            Some(AppliedCredential::Basic { username, password })
        }
        _ => None,
    }
}
