//! Policies and policy sets.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use super::EntityUid;
use crate::error::AuthorizationError;
use crate::expr::Expr;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Effect {
    Permit,
    Forbid,
}

/// Opaque, stable policy identifier used in diagnostics.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PolicyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PolicyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Scope constraint on `principal` or `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EntityConstraint {
    #[default]
    Any,
    Eq(EntityUid),
    In(EntityUid),
    Is(String),
    IsIn(String, EntityUid),
}

/// Scope constraint on `action`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionConstraint {
    #[default]
    Any,
    Eq(EntityUid),
    In(Vec<EntityUid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ConditionKind {
    When,
    Unless,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub body: Expr,
}

/// A single permit or forbid policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    id: PolicyId,
    effect: Effect,
    principal: EntityConstraint,
    action: ActionConstraint,
    resource: EntityConstraint,
    conditions: Vec<Condition>,
    annotations: BTreeMap<String, String>,
}

impl Policy {
    /// A policy with an unconstrained scope and no conditions.
    pub fn new(id: impl Into<PolicyId>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            effect,
            principal: EntityConstraint::Any,
            action: ActionConstraint::Any,
            resource: EntityConstraint::Any,
            conditions: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn permit(id: impl Into<PolicyId>) -> Self {
        Self::new(id, Effect::Permit)
    }

    pub fn forbid(id: impl Into<PolicyId>) -> Self {
        Self::new(id, Effect::Forbid)
    }

    /// Parse a single policy from text.
    pub fn parse(id: impl Into<PolicyId>, text: &str) -> Result<Self, AuthorizationError> {
        let mut policies = crate::parser::parse_policies(text)?;
        if policies.len() != 1 {
            return Err(AuthorizationError::ParseError(format!(
                "expected exactly one policy, found {}",
                policies.len()
            )));
        }
        let policy = policies.remove(0);
        Ok(policy.with_id(id))
    }

    pub fn with_id(mut self, id: impl Into<PolicyId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_principal(mut self, constraint: EntityConstraint) -> Self {
        self.principal = constraint;
        self
    }

    pub fn with_action(mut self, constraint: ActionConstraint) -> Self {
        self.action = constraint;
        self
    }

    pub fn with_resource(mut self, constraint: EntityConstraint) -> Self {
        self.resource = constraint;
        self
    }

    pub fn when(mut self, body: Expr) -> Self {
        self.conditions.push(Condition {
            kind: ConditionKind::When,
            body,
        });
        self
    }

    pub fn unless(mut self, body: Expr) -> Self {
        self.conditions.push(Condition {
            kind: ConditionKind::Unless,
            body,
        });
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn principal_constraint(&self) -> &EntityConstraint {
        &self.principal
    }

    pub fn action_constraint(&self) -> &ActionConstraint {
        &self.action
    }

    pub fn resource_constraint(&self) -> &EntityConstraint {
        &self.resource
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn annotations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.annotations
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A set of policies keyed by id. Iteration order is by id and carries no
/// meaning for the decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySet {
    policies: BTreeMap<PolicyId, Policy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, rejecting duplicate ids.
    pub fn from_policies(
        policies: impl IntoIterator<Item = Policy>,
    ) -> Result<Self, AuthorizationError> {
        let mut set = Self::new();
        for policy in policies {
            set.add(policy)?;
        }
        Ok(set)
    }

    pub fn add(&mut self, policy: Policy) -> Result<(), AuthorizationError> {
        if self.policies.contains_key(policy.id()) {
            return Err(AuthorizationError::ParseError(format!(
                "duplicate policy id `{}`",
                policy.id()
            )));
        }
        self.policies.insert(policy.id().clone(), policy);
        Ok(())
    }

    pub fn policy(&self, id: &PolicyId) -> Option<&Policy> {
        self.policies.get(id)
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl FromStr for PolicySet {
    type Err = AuthorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::loader::compile_policy(s)
    }
}
