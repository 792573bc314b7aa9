//! Tool name derivation and collision resolution.

use std::collections::HashSet;

use crate::openapi::HttpMethod;

/// Longest tool name MCP clients reliably accept.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// What to do with an operation that has no declared `operationId`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UnnamedOperationPolicy {
    /// Derive a name from the method and path template.
    #[default]
    Synthesize,
    /// Leave the operation out of the registry.
    Skip,
    /// Name it `operation_<n>` from a running counter.
    Counter,
}

/// Build an identifier such as `getUsersById` from `GET /users/{id}`.
///
/// Literal text is appended in UpperCamelCase; path parameters follow
/// after `By`, joined with `And`. A placeholder may share a segment with
/// literal text, so `/files/{name}.json` gives `getFilesJsonByName`.
pub fn synthesize_operation_id(method: HttpMethod, path: &str) -> String {
    let mut id = method.as_str().to_string();
    let mut params = Vec::new();

    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        let mut rest = segment;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
                break;
            };
            id.push_str(&upper_camel(&rest[..open]));
            params.push(&rest[open + 1..close]);
            rest = &rest[close + 1..];
        }
        id.push_str(&upper_camel(rest));
    }

    if !params.is_empty() {
        id.push_str("By");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                id.push_str("And");
            }
            id.push_str(&upper_camel(param));
        }
    }

    id
}

fn upper_camel(segment: &str) -> String {
    segment
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Replace characters outside `[A-Za-z0-9_-]` with `_` and cap the length.
pub fn sanitize_tool_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect()
}

/// Hands out unique names in request order: `name`, `name_1`, `name_2`, ...
#[derive(Debug, Default)]
pub struct NameAllocator {
    assigned: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, base: &str) -> String {
        if self.assigned.insert(base.to_string()) {
            return base.to_string();
        }

        let mut suffix = 1usize;
        loop {
            let tail = format!("_{suffix}");
            let keep = MAX_TOOL_NAME_LEN.saturating_sub(tail.len()).min(base.len());
            let candidate = format!("{}{}", &base[..keep], tail);
            if self.assigned.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assigned.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_from_method_and_path() {
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/users/{id}"), "getUsersById");
        assert_eq!(synthesize_operation_id(HttpMethod::Post, "/users"), "postUsers");
        assert_eq!(
            synthesize_operation_id(HttpMethod::Delete, "/orgs/{org}/repos/{repo}"),
            "deleteOrgsReposByOrgAndRepo"
        );
        assert_eq!(
            synthesize_operation_id(HttpMethod::Get, "/user-profiles/v1.0/"),
            "getUserProfilesV10"
        );
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/"), "get");
    }

    #[test]
    fn test_synthesize_with_placeholder_inside_segment() {
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/users.{id}"), "getUsersById");
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/{id}.json"), "getJsonById");
        assert_eq!(
            synthesize_operation_id(HttpMethod::Get, "/files/{name}.{ext}"),
            "getFilesByNameAndExt"
        );
    }

    #[test]
    fn test_sanitize_tool_name() {
        assert_eq!(sanitize_tool_name("pets.list"), "pets_list");
        assert_eq!(sanitize_tool_name(" get pet "), "get_pet");
        assert_eq!(sanitize_tool_name(&"a".repeat(100)).len(), MAX_TOOL_NAME_LEN);
    }

    #[test]
    fn test_collisions_get_numbered_suffixes_in_order() {
        let mut names = NameAllocator::new();
        assert_eq!(names.allocate("getPets"), "getPets");
        assert_eq!(names.allocate("getPets"), "getPets_1");
        assert_eq!(names.allocate("getPets"), "getPets_2");
        assert_eq!(names.allocate("other"), "other");
    }

    #[test]
    fn test_suffix_skips_names_already_taken() {
        let mut names = NameAllocator::new();
        names.allocate("list_1");
        names.allocate("list");
        assert_eq!(names.allocate("list"), "list_2");
    }

    #[test]
    fn test_suffixed_names_respect_length_cap() {
        let mut names = NameAllocator::new();
        let long = "x".repeat(MAX_TOOL_NAME_LEN);
        names.allocate(&long);
        let second = names.allocate(&long);
        assert_eq!(second.len(), MAX_TOOL_NAME_LEN);
        assert!(second.ends_with("_1"));
    }
}
