//! Authorization decisions and their diagnostics.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use super::{Effect, PolicyId};
use crate::error::ErrorKind;
use crate::schema::SchemaViolation;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
pub enum Outcome {
    Allow,
    Deny,
}

/// A policy that failed to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyErrorReport {
    pub policy_id: PolicyId,
    pub effect: Effect,
    pub kind: ErrorKind,
    pub message: String,
}

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
pub enum WarningKind {
    HierarchyCycle,
}

/// Something worth knowing about that did not change the outcome.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub policy_id: PolicyId,
    pub kind: WarningKind,
    pub message: String,
}

/// The result of one authorization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub outcome: Outcome,
    /// Satisfied forbids on Deny, satisfied permits on Allow, empty on a
    /// default deny.
    #[schema(value_type = Vec<String>)]
    pub determining_policies: BTreeSet<PolicyId>,
    pub errors: Vec<PolicyErrorReport>,
    /// Forbid policies whose scope matched but whose condition errored.
    #[schema(value_type = Vec<String>)]
    pub forbid_errors: BTreeSet<PolicyId>,
    pub warnings: Vec<Warning>,
    /// Non-empty only when a schema rejected the request, in which case no
    /// policy was evaluated.
    pub schema_violations: Vec<SchemaViolation>,
}

impl Decision {
    /// A deny with nothing to report.
    pub fn default_deny() -> Self {
        Self {
            outcome: Outcome::Deny,
            determining_policies: BTreeSet::new(),
            errors: Vec::new(),
            forbid_errors: BTreeSet::new(),
            warnings: Vec::new(),
            schema_violations: Vec::new(),
        }
    }

    pub fn schema_rejected(violations: Vec<SchemaViolation>) -> Self {
        Self {
            schema_violations: violations,
            ..Self::default_deny()
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    pub fn is_schema_rejected(&self) -> bool {
        !self.schema_violations.is_empty()
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.outcome)?;
        if !self.determining_policies.is_empty() {
            write!(f, " [{}]", self.determining_policies.iter().join(", "))?;
        }
        if !self.errors.is_empty() {
            write!(f, " ({} errors)", self.errors.len())?;
        }
        if self.is_schema_rejected() {
            write!(f, " (schema: {} violations)", self.schema_violations.len())?;
        }
        Ok(())
    }
}
