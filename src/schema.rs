//! Schema fragments and the validator that checks requests, slices and
//! policies against them.
//!
//! The JSON form follows the Cedar JSON schema:
//!
//! ```json
//! {
//!   "App": {
//!     "entityTypes": {
//!       "User": {
//!         "memberOfTypes": ["Group"],
//!         "shape": { "type": "Record", "attributes": { "age": { "type": "Long" } } }
//!       },
//!       "Group": {}
//!     },
//!     "actions": {
//!       "view": {
//!         "appliesTo": { "principalTypes": ["User"], "resourceTypes": ["Photo"] }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

use crate::error::AuthorizationError;
use crate::types::{
    ActionConstraint, AuthorizationRequest, Entity, EntityConstraint, EntityUid, PolicyId,
    PolicySet, Value,
};

/// Namespace name → namespace definition. The empty name is the root
/// namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaFragment(pub BTreeMap<String, NamespaceDefinition>);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDefinition {
    #[serde(default)]
    pub entity_types: BTreeMap<String, EntityTypeDefinition>,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    #[serde(default)]
    pub member_of_types: Vec<String>,
    /// A missing shape means the entity carries no attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<AttributeType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<AppliesTo>,
    #[serde(default)]
    pub member_of: Vec<ActionRef>,
}

/// Empty type lists leave that part of the request unrestricted. A missing
/// context shape means the context must be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliesTo {
    #[serde(default)]
    pub principal_types: Vec<String>,
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<AttributeType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl FromStr for SchemaFragment {
    type Err = AuthorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Declared type of an attribute or of the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAttributeType", into = "RawAttributeType")]
pub enum AttributeType {
    Boolean,
    Long,
    String,
    Set(Box<AttributeType>),
    Record {
        attributes: BTreeMap<String, AttributeDecl>,
        additional_attributes: bool,
    },
    Entity(String),
    Extension(String),
}

impl AttributeType {
    /// A closed record with the given required attributes.
    pub fn record(attributes: impl IntoIterator<Item = (&'static str, AttributeType)>) -> Self {
        AttributeType::Record {
            attributes: attributes
                .into_iter()
                .map(|(name, attr_type)| (name.to_string(), AttributeDecl::required(attr_type)))
                .collect(),
            additional_attributes: false,
        }
    }
}

impl Display for AttributeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AttributeType::Boolean => f.write_str("Boolean"),
            AttributeType::Long => f.write_str("Long"),
            AttributeType::String => f.write_str("String"),
            AttributeType::Set(element) => write!(f, "Set<{element}>"),
            AttributeType::Record { .. } => f.write_str("Record"),
            AttributeType::Entity(name) => write!(f, "Entity<{name}>"),
            AttributeType::Extension(name) => write!(f, "Extension<{name}>"),
        }
    }
}

/// One declared record attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAttributeType", into = "RawAttributeType")]
pub struct AttributeDecl {
    pub attr_type: AttributeType,
    pub required: bool,
}

impl AttributeDecl {
    pub fn required(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            required: true,
        }
    }

    pub fn optional(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttributeType {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    element: Option<Box<RawAttributeType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<BTreeMap<String, RawAttributeType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional_attributes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    required: Option<bool>,
}

impl RawAttributeType {
    fn plain(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            element: None,
            attributes: None,
            additional_attributes: None,
            name: None,
            required: None,
        }
    }
}

impl TryFrom<RawAttributeType> for AttributeType {
    type Error = String;

    fn try_from(raw: RawAttributeType) -> Result<Self, Self::Error> {
        let attr_type = match raw.type_name.as_str() {
            "Boolean" => AttributeType::Boolean,
            "Long" => AttributeType::Long,
            "String" => AttributeType::String,
            "Set" => {
                let element = raw.element.ok_or("`Set` requires an `element` type")?;
                AttributeType::Set(Box::new(AttributeType::try_from(*element)?))
            }
            "Record" => AttributeType::Record {
                attributes: raw
                    .attributes
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(name, raw)| Ok((name, AttributeDecl::try_from(raw)?)))
                    .collect::<Result<_, String>>()?,
                additional_attributes: raw.additional_attributes.unwrap_or(false),
            },
            "Entity" => AttributeType::Entity(raw.name.ok_or("`Entity` requires a `name`")?),
            "Extension" => {
                AttributeType::Extension(raw.name.ok_or("`Extension` requires a `name`")?)
            }
            other => return Err(format!("unknown attribute type `{other}`")),
        };
        Ok(attr_type)
    }
}

impl From<AttributeType> for RawAttributeType {
    fn from(attr_type: AttributeType) -> Self {
        match attr_type {
            AttributeType::Boolean => RawAttributeType::plain("Boolean"),
            AttributeType::Long => RawAttributeType::plain("Long"),
            AttributeType::String => RawAttributeType::plain("String"),
            AttributeType::Set(element) => RawAttributeType {
                element: Some(Box::new((*element).into())),
                ..RawAttributeType::plain("Set")
            },
            AttributeType::Record {
                attributes,
                additional_attributes,
            } => RawAttributeType {
                attributes: Some(
                    attributes
                        .into_iter()
                        .map(|(name, decl)| (name, decl.into()))
                        .collect(),
                ),
                additional_attributes: additional_attributes.then_some(true),
                ..RawAttributeType::plain("Record")
            },
            AttributeType::Entity(name) => RawAttributeType {
                name: Some(name),
                ..RawAttributeType::plain("Entity")
            },
            AttributeType::Extension(name) => RawAttributeType {
                name: Some(name),
                ..RawAttributeType::plain("Extension")
            },
        }
    }
}

impl TryFrom<RawAttributeType> for AttributeDecl {
    type Error = String;

    fn try_from(mut raw: RawAttributeType) -> Result<Self, Self::Error> {
        let required = raw.required.take().unwrap_or(true);
        Ok(Self {
            attr_type: AttributeType::try_from(raw)?,
            required,
        })
    }
}

impl From<AttributeDecl> for RawAttributeType {
    fn from(decl: AttributeDecl) -> Self {
        let raw: RawAttributeType = decl.attr_type.into();
        RawAttributeType {
            required: (!decl.required).then_some(false),
            ..raw
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScopeRole {
    Principal,
    Resource,
}

/// A way in which a request, an entity or a policy disagrees with the
/// schema.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SchemaViolation {
    #[error("action {action} is not declared")]
    UndeclaredAction { action: EntityUid },

    #[error("{role} type `{type_name}` is not declared")]
    #[serde(rename_all = "camelCase")]
    UndeclaredEntityType { role: ScopeRole, type_name: String },

    #[error("action {action} does not apply to {role} type `{type_name}`")]
    #[serde(rename_all = "camelCase")]
    NotApplicable {
        action: EntityUid,
        role: ScopeRole,
        type_name: String,
    },

    #[error("action {action} requires a {role}")]
    MissingEntity { action: EntityUid, role: ScopeRole },

    #[error("context: {message}")]
    ContextMismatch { message: String },

    #[error("entity {uid}: {message}")]
    EntityMismatch { uid: EntityUid, message: String },

    #[error("policy {policy_id}: {message}")]
    #[serde(rename_all = "camelCase")]
    PolicyScope { policy_id: PolicyId, message: String },
}

struct EntityTypeEntry<'s> {
    namespace: &'s str,
    definition: &'s EntityTypeDefinition,
}

struct ActionEntry<'s> {
    namespace: &'s str,
    definition: &'s ActionDefinition,
}

/// Checks requests, slices and policies against one schema fragment.
pub struct Validator<'s> {
    entity_types: HashMap<String, EntityTypeEntry<'s>>,
    actions: HashMap<EntityUid, ActionEntry<'s>>,
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}::{name}")
    }
}

fn join_path(path: &str, attr: &str) -> String {
    if path.is_empty() {
        attr.to_string()
    } else {
        format!("{path}.{attr}")
    }
}

impl<'s> Validator<'s> {
    /// Index the fragment. Fails when a namespace name is not a valid path.
    pub fn new(schema: &'s SchemaFragment) -> Result<Self, AuthorizationError> {
        let mut entity_types = HashMap::new();
        let mut actions = HashMap::new();
        for (namespace, definition) in &schema.0 {
            for (name, entity_type) in &definition.entity_types {
                entity_types.insert(
                    qualify(namespace, name),
                    EntityTypeEntry {
                        namespace: namespace.as_str(),
                        definition: entity_type,
                    },
                );
            }
            for (id, action) in &definition.actions {
                let uid = EntityUid::new(qualify(namespace, "Action"), id.as_str()).map_err(
                    |e| AuthorizationError::MalformedRequest(format!("invalid schema: {e}")),
                )?;
                actions.insert(
                    uid,
                    ActionEntry {
                        namespace: namespace.as_str(),
                        definition: action,
                    },
                );
            }
        }
        Ok(Self {
            entity_types,
            actions,
        })
    }

    pub fn is_declared_type(&self, type_name: &str) -> bool {
        self.entity_types.contains_key(type_name)
    }

    pub fn is_declared_action(&self, action: &EntityUid) -> bool {
        self.actions.contains_key(action)
    }

    /// Resolve a type reference written inside `namespace`: qualified names
    /// are taken as is; a bare name prefers the namespace's own declaration
    /// and falls back to the root namespace.
    fn resolve(&self, namespace: &str, name: &str) -> String {
        if namespace.is_empty() || name.contains("::") {
            return name.to_string();
        }
        let qualified = qualify(namespace, name);
        if self.entity_types.contains_key(&qualified) || !self.entity_types.contains_key(name) {
            qualified
        } else {
            name.to_string()
        }
    }

    /// Check the request's principal, action, resource and context.
    pub fn validate_request(&self, request: &AuthorizationRequest) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        let Some(action) = self.actions.get(&request.action) else {
            violations.push(SchemaViolation::UndeclaredAction {
                action: request.action.clone(),
            });
            return violations;
        };
        let applies_to = action.definition.applies_to.as_ref();

        for (role, uid, allowed) in [
            (
                ScopeRole::Principal,
                request.principal.as_ref(),
                applies_to.map(|a| a.principal_types.as_slice()),
            ),
            (
                ScopeRole::Resource,
                request.resource.as_ref(),
                applies_to.map(|a| a.resource_types.as_slice()),
            ),
        ] {
            let allowed: Vec<String> = allowed
                .unwrap_or_default()
                .iter()
                .map(|name| self.resolve(action.namespace, name))
                .collect();
            match uid {
                None if !allowed.is_empty() => violations.push(SchemaViolation::MissingEntity {
                    action: request.action.clone(),
                    role,
                }),
                None => {}
                Some(uid) if !self.is_declared_type(uid.type_name()) => {
                    violations.push(SchemaViolation::UndeclaredEntityType {
                        role,
                        type_name: uid.type_name().to_string(),
                    })
                }
                Some(uid) if !allowed.is_empty() && !allowed.iter().any(|t| t == uid.type_name()) => {
                    violations.push(SchemaViolation::NotApplicable {
                        action: request.action.clone(),
                        role,
                        type_name: uid.type_name().to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        let context = request.context.to_record();
        let mut problems = Vec::new();
        match applies_to.and_then(|a| a.context.as_ref()) {
            Some(shape) => self.check_value(action.namespace, &context, shape, "", &mut problems),
            None => problems.extend(
                request
                    .context
                    .iter()
                    .map(|(key, _)| format!("unexpected attribute `{key}`")),
            ),
        }
        violations.extend(
            problems
                .into_iter()
                .map(|message| SchemaViolation::ContextMismatch { message }),
        );

        debug!(
            event = "Request",
            phase = "Schema",
            action = request.action.to_string(),
            violations = violations.len()
        );
        violations
    }

    /// Check attributes and parents of slice entities. Action entities are
    /// not checked.
    pub fn validate_entities<'e>(
        &self,
        entities: impl IntoIterator<Item = &'e Entity>,
    ) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        for entity in entities {
            let uid = entity.uid();
            if uid.is_action() {
                continue;
            }
            let Some(entry) = self.entity_types.get(uid.type_name()) else {
                violations.push(SchemaViolation::EntityMismatch {
                    uid: uid.clone(),
                    message: format!("entity type `{}` is not declared", uid.type_name()),
                });
                continue;
            };

            let mut problems = Vec::new();
            let attrs = Value::Record(entity.attrs().clone());
            match &entry.definition.shape {
                Some(shape) => self.check_value(entry.namespace, &attrs, shape, "", &mut problems),
                None => problems.extend(
                    entity
                        .attrs()
                        .keys()
                        .map(|key| format!("unexpected attribute `{key}`")),
                ),
            }

            let allowed_parents: Vec<String> = entry
                .definition
                .member_of_types
                .iter()
                .map(|name| self.resolve(entry.namespace, name))
                .collect();
            for parent in entity.parents() {
                if !allowed_parents.iter().any(|t| t == parent.type_name()) {
                    problems.push(format!(
                        "may not be a member of `{}`",
                        parent.type_name()
                    ));
                }
            }

            violations.extend(problems.into_iter().map(|message| {
                SchemaViolation::EntityMismatch {
                    uid: uid.clone(),
                    message,
                }
            }));
        }
        violations
    }

    /// Check that policy scopes only name declared entity types and actions.
    pub fn validate_policies(&self, policies: &PolicySet) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        for policy in policies.policies() {
            let mut problems = Vec::new();
            for constraint in [policy.principal_constraint(), policy.resource_constraint()] {
                match constraint {
                    EntityConstraint::Any => {}
                    EntityConstraint::Eq(uid) | EntityConstraint::In(uid) => {
                        self.check_entity_ref(uid, &mut problems)
                    }
                    EntityConstraint::Is(type_name) => {
                        self.check_type_ref(type_name, &mut problems)
                    }
                    EntityConstraint::IsIn(type_name, uid) => {
                        self.check_type_ref(type_name, &mut problems);
                        self.check_entity_ref(uid, &mut problems);
                    }
                }
            }
            let actions = match policy.action_constraint() {
                ActionConstraint::Any => &[][..],
                ActionConstraint::Eq(uid) => std::slice::from_ref(uid),
                ActionConstraint::In(uids) => uids.as_slice(),
            };
            problems.extend(
                actions
                    .iter()
                    .filter(|uid| !self.is_declared_action(uid))
                    .map(|uid| format!("action {uid} is not declared")),
            );

            violations.extend(problems.into_iter().unique().map(|message| {
                SchemaViolation::PolicyScope {
                    policy_id: policy.id().clone(),
                    message,
                }
            }));
        }
        violations
    }

    fn check_entity_ref(&self, uid: &EntityUid, problems: &mut Vec<String>) {
        if !uid.is_action() {
            self.check_type_ref(uid.type_name(), problems);
        }
    }

    fn check_type_ref(&self, type_name: &str, problems: &mut Vec<String>) {
        if !self.is_declared_type(type_name) {
            problems.push(format!("entity type `{type_name}` is not declared"));
        }
    }

    fn check_value(
        &self,
        namespace: &str,
        value: &Value,
        expected: &AttributeType,
        path: &str,
        problems: &mut Vec<String>,
    ) {
        let describe = |path: &str| {
            if path.is_empty() {
                "value".to_string()
            } else {
                format!("attribute `{path}`")
            }
        };
        match (expected, value) {
            (AttributeType::Boolean, Value::Bool(_))
            | (AttributeType::Long, Value::Long(_))
            | (AttributeType::String, Value::String(_)) => {}
            (AttributeType::Set(element), Value::Set(items)) => {
                for item in items {
                    self.check_value(namespace, item, element, path, problems);
                }
            }
            (
                AttributeType::Record {
                    attributes,
                    additional_attributes,
                },
                Value::Record(fields),
            ) => {
                for (name, decl) in attributes {
                    let attr_path = join_path(path, name);
                    match fields.get(name) {
                        Some(field) => {
                            self.check_value(namespace, field, &decl.attr_type, &attr_path, problems)
                        }
                        None if decl.required => {
                            problems.push(format!("missing required attribute `{attr_path}`"))
                        }
                        None => {}
                    }
                }
                if !additional_attributes {
                    problems.extend(
                        fields
                            .keys()
                            .filter(|key| !attributes.contains_key(*key))
                            .map(|key| format!("unexpected attribute `{}`", join_path(path, key))),
                    );
                }
            }
            (AttributeType::Entity(name), Value::EntityRef(uid)) => {
                let expected_type = self.resolve(namespace, name);
                if uid.type_name() != expected_type {
                    problems.push(format!(
                        "{} should reference a `{expected_type}`, found {uid}",
                        describe(path)
                    ));
                }
            }
            (AttributeType::Extension(name), Value::Extension(ext)) if ext.tag() == name.as_str() => {}
            (expected, found) => problems.push(format!(
                "{} should be {expected}, found {}",
                describe(path),
                found.type_name()
            )),
        }
    }
}
