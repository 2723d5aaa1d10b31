//! Component names and namespaces.
//!
//! Every cross-component reference (triggers, controls, context lookups)
//! is by name, so names under one owner must be unique. Unnamed components
//! are allowed for readers, networks, triggers and controls; they simply
//! take no slot in the namespace.

use crate::error::{SimError, SimResult};
use std::collections::HashSet;

/// Anything addressable by name in an assembly.
pub trait Named {
    /// The component's name, or `None` for an anonymous component.
    fn name(&self) -> Option<&str>;

    /// All names reachable under this component, its own included.
    fn namespace(&self) -> Vec<String> {
        self.name().map(|n| vec![n.to_string()]).unwrap_or_default()
    }
}

/// Normalizes a user-supplied name: empty means anonymous.
pub fn to_name(name: impl Into<String>) -> Option<String> {
    let name = name.into();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Normalizes a name that must not be empty.
pub fn require_name(name: impl Into<String>, kind: &str) -> SimResult<String> {
    to_name(name).ok_or_else(|| SimError::config(format!("Empty name for a {}", kind)))
}

/// Concatenates the namespaces of `parts` (plus `owner` when given) and
/// checks that no name appears twice.
pub fn build_namespace(
    owner_kind: &'static str,
    owner: &str,
    parts: Vec<Vec<String>>,
    include_owner: bool,
) -> SimResult<Vec<String>> {
    let mut namespace: Vec<String> = parts.into_iter().flatten().collect();
    if include_owner {
        namespace.push(owner.to_string());
    }

    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = namespace
        .iter()
        .filter(|name| !seen.insert(name.as_str()))
        .cloned()
        .collect();

    if duplicates.is_empty() {
        Ok(namespace)
    } else {
        duplicates.dedup();
        Err(SimError::DuplicateName {
            owner_kind,
            owner: owner.to_string(),
            duplicates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_name() {
        assert_eq!(to_name("abc"), Some("abc".to_string()));
        assert_eq!(to_name(123.to_string()), Some("123".to_string()));
        assert_eq!(to_name(""), None);
    }

    #[test]
    fn test_require_name() {
        assert!(require_name("", "Behavior").is_err());
        assert_eq!(require_name("b", "Behavior").unwrap(), "b");
    }

    #[test]
    fn test_namespace_unique() {
        let ns = build_namespace(
            "Feature",
            "f",
            vec![vec!["b.1".into()], vec!["b.2".into(), "t".into()]],
            true,
        )
        .unwrap();
        assert_eq!(ns, vec!["b.1", "b.2", "t", "f"]);
    }

    #[test]
    fn test_namespace_duplicate_rejected() {
        let err = build_namespace("Signal", "s", vec![vec!["x".into()], vec!["x".into()]], true)
            .unwrap_err();
        match err {
            SimError::DuplicateName { duplicates, .. } => assert_eq!(duplicates, vec!["x"]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_namespace_owner_collision() {
        assert!(build_namespace("Feature", "f", vec![vec!["f".into()]], true).is_err());
        assert!(build_namespace("Assembly", "f", vec![vec!["f".into()]], false).is_ok());
    }
}
