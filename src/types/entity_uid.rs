//! Entity identifiers: a (possibly namespaced) type name plus an id.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ValueError;

/// The universal key for entities, principals, actions and resources,
/// rendered as `Ns::Type::"id"`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "EntityUidJson")]
pub struct EntityUid {
    #[serde(rename = "type")]
    type_name: String,
    id: String,
}

/// Accepted JSON shapes: `{"type": .., "id": ..}` or the escaped
/// `{"__entity": {"type": .., "id": ..}}` form used inside values.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityUidJson {
    Explicit {
        #[serde(rename = "type")]
        type_name: String,
        id: String,
    },
    Escaped {
        __entity: Box<EntityUidJson>,
    },
}

impl TryFrom<EntityUidJson> for EntityUid {
    type Error = ValueError;

    fn try_from(json: EntityUidJson) -> Result<Self, Self::Error> {
        match json {
            EntityUidJson::Explicit { type_name, id } => EntityUid::new(type_name, id),
            EntityUidJson::Escaped { __entity } => EntityUid::try_from(*__entity),
        }
    }
}

impl EntityUid {
    /// Build a uid, checking that the type is a `::`-separated path of
    /// identifiers.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Result<Self, ValueError> {
        let type_name = type_name.into();
        if !is_valid_type_name(&type_name) {
            return Err(ValueError::InvalidEntity(format!(
                "`{type_name}` is not a valid entity type name"
            )));
        }
        Ok(Self {
            type_name,
            id: id.into(),
        })
    }

    /// The fully qualified type name, e.g. `App::User`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The last segment of the type name, e.g. `User` for `App::User`.
    pub fn basename(&self) -> &str {
        self.type_name
            .rsplit("::")
            .next()
            .unwrap_or(self.type_name.as_str())
    }

    /// The namespace part of the type name, empty when unqualified.
    pub fn namespace(&self) -> &str {
        self.type_name
            .rfind("::")
            .map(|idx| &self.type_name[..idx])
            .unwrap_or("")
    }

    /// True for `Action` entities, in any namespace.
    pub fn is_action(&self) -> bool {
        self.basename() == "Action"
    }
}

pub(crate) fn is_valid_type_name(name: &str) -> bool {
    !name.is_empty() && name.split("::").all(is_identifier)
}

pub(crate) fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl Display for EntityUid {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}::\"", self.type_name)?;
        for c in self.id.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                other => write!(f, "{other}")?,
            }
        }
        f.write_str("\"")
    }
}

impl FromStr for EntityUid {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_entity_uid(s).map_err(|e| ValueError::InvalidEntity(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { r#"User::"alice""#, "User", "alice" },
        namespaced = { r#"App::Core::User::"alice""#, "App::Core::User", "alice" },
        escaped_quote = { r#"Photo::"say \"hi\"""#, "Photo", r#"say "hi""# },
        empty_id = { r#"User::"""#, "User", "" },
    )]
    fn test_parse_entity_uid(input: &str, type_name: &str, id: &str) {
        let uid: EntityUid = input.parse().unwrap();
        assert_eq!(uid.type_name(), type_name);
        assert_eq!(uid.id(), id);
        assert_eq!(uid.to_string(), input);
    }

    #[parameterized(
        no_type = { r#""alice""# },
        no_quotes = { "User::alice" },
        bad_segment = { r#"1User::"alice""# },
        trailing = { r#"User::"alice" extra"# },
    )]
    fn test_parse_entity_uid_rejects(input: &str) {
        assert!(input.parse::<EntityUid>().is_err());
    }

    #[test]
    fn test_namespace_and_basename() {
        let uid = EntityUid::new("App::Core::User", "alice").unwrap();
        assert_eq!(uid.namespace(), "App::Core");
        assert_eq!(uid.basename(), "User");

        let uid = EntityUid::new("User", "alice").unwrap();
        assert_eq!(uid.namespace(), "");
        assert_eq!(uid.basename(), "User");
    }

    #[test]
    fn test_new_rejects_empty_type() {
        assert!(EntityUid::new("", "alice").is_err());
        assert!(EntityUid::new("App::", "alice").is_err());
    }

    #[test]
    fn test_is_action() {
        assert!(EntityUid::new("Action", "view").unwrap().is_action());
        assert!(EntityUid::new("App::Action", "view").unwrap().is_action());
        assert!(!EntityUid::new("User", "view").unwrap().is_action());
    }

    #[test]
    fn test_serde_explicit_and_escaped_forms() {
        let explicit: EntityUid =
            serde_json::from_value(serde_json::json!({"type": "User", "id": "alice"})).unwrap();
        let escaped: EntityUid = serde_json::from_value(
            serde_json::json!({"__entity": {"type": "User", "id": "alice"}}),
        )
        .unwrap();
        assert_eq!(explicit, escaped);
        assert_eq!(
            serde_json::to_value(&explicit).unwrap(),
            serde_json::json!({"type": "User", "id": "alice"})
        );
    }

    #[test]
    fn test_serde_rejects_invalid_type() {
        let result: Result<EntityUid, _> =
            serde_json::from_value(serde_json::json!({"type": "", "id": "alice"}));
        assert!(result.is_err());
    }
}
