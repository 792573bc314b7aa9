//! Base URL resolution.
//!
//! Precedence: explicit override, then the single declared server, then the
//! first of several declared servers (with a warning), then none.

use super::diagnostics::{DiagnosticKind, Diagnostics};
use crate::openapi::Server;

pub fn resolve_base_url(
    explicit: Option<&str>,
    servers: &[Server],
    diagnostics: &mut Diagnostics,
) -> Option<String> {
    if let Some(url) = explicit.map(str::trim).filter(|url| !url.is_empty()) {
        return Some(url.trim_end_matches('/').to_string());
    }

    let first = servers.first()?;
    let url = first.expanded_url();
    if servers.len() > 1 {
        diagnostics.warn(
            DiagnosticKind::MultipleServers,
            "servers",
            format!(
                "{} servers declared, using the first one ({url}); pass a base URL to choose another",
                servers.len()
            ),
        );
    }

    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server(url: &str) -> Server {
        serde_json::from_value(json!({ "url": url })).unwrap()
    }

    #[test]
    fn test_explicit_override_wins() {
        let mut diagnostics = Diagnostics::new();
        let url = resolve_base_url(
            Some("http://localhost:8080/"),
            &[server("https://a.example.com"), server("https://b.example.com")],
            &mut diagnostics,
        );
        assert_eq!(url.as_deref(), Some("http://localhost:8080"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_single_server() {
        let mut diagnostics = Diagnostics::new();
        let url = resolve_base_url(None, &[server("https://api.example.com/v1/")], &mut diagnostics);
        assert_eq!(url.as_deref(), Some("https://api.example.com/v1"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_first_of_many_warns() {
        let mut diagnostics = Diagnostics::new();
        let url = resolve_base_url(
            None,
            &[server("https://a.example.com"), server("https://b.example.com")],
            &mut diagnostics,
        );
        assert_eq!(url.as_deref(), Some("https://a.example.com"));
        assert_eq!(diagnostics.count(DiagnosticKind::MultipleServers), 1);
    }

    #[test]
    fn test_no_servers() {
        let mut diagnostics = Diagnostics::new();
        assert_eq!(resolve_base_url(None, &[], &mut diagnostics), None);
        assert_eq!(resolve_base_url(Some("  "), &[], &mut diagnostics), None);
    }
}
