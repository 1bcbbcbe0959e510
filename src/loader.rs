use std::collections::BTreeMap;

use crate::error::AuthorizationError;
use crate::parser;
use crate::types::{Policy, PolicySet};

/// Compile policy text into a `PolicySet`.
///
/// Syntax errors are mapped into `AuthorizationError::ParseError`, and so
/// are two policies that end up with the same id.
///
/// Example:
/// ```rust
/// use slicegate_core::compile_policy;
/// let policy_text = r#"
///     permit (principal, action, resource);
///     forbid  (principal == User::"evil", action, resource);
/// "#;
/// let set = compile_policy(policy_text).unwrap();
/// assert_eq!(set.len(), 2);
/// ```
pub fn compile_policy(text: &str) -> Result<PolicySet, AuthorizationError> {
    let policies = parser::parse_policies(text)?;
    PolicySet::from_policies(policies)
}

/// Compile a map of `id -> policy text`. Each text must hold exactly one
/// policy, and the map key becomes its id.
pub fn compile_policy_map(
    texts: &BTreeMap<String, String>,
) -> Result<PolicySet, AuthorizationError> {
    let policies = texts
        .iter()
        .map(|(id, text)| {
            Policy::parse(id.as_str(), text).map_err(|e| match e {
                AuthorizationError::ParseError(message) => {
                    AuthorizationError::ParseError(format!("policy `{id}`: {message}"))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    PolicySet::from_policies(policies)
}
