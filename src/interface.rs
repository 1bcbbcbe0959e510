//! JSON call interface.
//!
//! A call carries the request and its slice:
//!
//! ```json
//! {
//!   "principal": { "type": "User", "id": "alice" },
//!   "action": { "type": "Action", "id": "view" },
//!   "resource": { "type": "Photo", "id": "p1" },
//!   "context": {},
//!   "schema": null,
//!   "slice": {
//!     "policies": "permit(principal, action, resource);",
//!     "entities": []
//!   }
//! }
//! ```
//!
//! The answer is an [`InterfaceResult`] whose `result` holds the JSON
//! encoded [`Decision`](crate::Decision).

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::authorizer::Authorizer;
use crate::error::AuthorizationError;
use crate::loader;
use crate::schema::{SchemaFragment, SchemaViolation, Validator};
use crate::types::{AuthorizationRequest, EntityUid, PolicySet, RequestContext, Slice};

/// Policies either as one concatenated text or as `id -> text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PolicySpecification {
    Concatenated(String),
    Map(BTreeMap<String, String>),
}

impl PolicySpecification {
    pub fn compile(&self) -> Result<PolicySet, AuthorizationError> {
        match self {
            PolicySpecification::Concatenated(text) => loader::compile_policy(text),
            PolicySpecification::Map(texts) => loader::compile_policy_map(texts),
        }
    }
}

impl<'de> Deserialize<'de> for PolicySpecification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PolicySpecificationVisitor)
    }
}

struct PolicySpecificationVisitor;

impl<'de> Visitor<'de> for PolicySpecificationVisitor {
    type Value = PolicySpecification;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(
            "policies as a concatenated string or as a map of policy id to policy text with no duplicate ids",
        )
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
        Ok(PolicySpecification::Concatenated(text.to_string()))
    }

    fn visit_string<E: de::Error>(self, text: String) -> Result<Self::Value, E> {
        Ok(PolicySpecification::Concatenated(text))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut policies = BTreeMap::new();
        while let Some((id, text)) = map.next_entry::<String, String>()? {
            if policies.contains_key(&id) {
                return Err(de::Error::custom(format!("duplicate policy id `{id}`")));
            }
            policies.insert(id, text);
        }
        Ok(PolicySpecification::Map(policies))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecvdSlice {
    pub policies: PolicySpecification,
    #[serde(default)]
    pub entities: Slice,
}

/// One authorization call as received over the JSON interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCall {
    #[serde(default)]
    pub principal: Option<EntityUid>,
    pub action: EntityUid,
    #[serde(default)]
    pub resource: Option<EntityUid>,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default)]
    pub schema: Option<SchemaFragment>,
    pub slice: RecvdSlice,
}

impl AuthorizationCall {
    /// Split the call into its compiled policies and the request.
    pub fn into_parts(self) -> Result<(PolicySet, AuthorizationRequest), AuthorizationError> {
        let policies = self.slice.policies.compile()?;
        let request = AuthorizationRequest {
            principal: self.principal,
            action: self.action,
            resource: self.resource,
            context: self.context,
            schema: self.schema,
            slice: self.slice.entities,
        };
        Ok((policies, request))
    }
}

/// Result of a call to a JSON interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "success")]
pub enum InterfaceResult {
    #[serde(rename = "true")]
    Success {
        /// JSON encoding of the answer.
        result: String,
    },
    #[serde(rename = "false")]
    Failure {
        /// True for faults in the engine itself, false for problems with
        /// what the caller sent.
        #[serde(rename = "isInternal")]
        is_internal: bool,
        errors: Vec<String>,
    },
}

impl InterfaceResult {
    pub fn succeed<T: Serialize>(value: T) -> Self {
        serde_json::to_string(&value).map_or_else(
            |e| Self::fail_internally(format!("error serializing result: {e}")),
            |result| Self::Success { result },
        )
    }

    pub fn fail_internally(message: String) -> Self {
        Self::Failure {
            is_internal: true,
            errors: vec![message],
        }
    }

    pub fn fail_bad_request(errors: Vec<String>) -> Self {
        Self::Failure {
            is_internal: false,
            errors,
        }
    }

    fn from_error(err: AuthorizationError) -> Self {
        warn!(event = "Interface", phase = "Failure", error = err.to_string());
        if err.is_internal() {
            Self::fail_internally(err.to_string())
        } else {
            Self::fail_bad_request(vec![err.to_string()])
        }
    }
}

/// Answer a JSON encoded [`AuthorizationCall`].
pub fn json_is_authorized(input: &str) -> InterfaceResult {
    match serde_json::from_str::<AuthorizationCall>(input) {
        Ok(call) => is_authorized(&Authorizer::new(), call),
        Err(e) => InterfaceResult::fail_bad_request(vec![format!("failed to parse call: {e}")]),
    }
}

pub fn is_authorized(authorizer: &Authorizer, call: AuthorizationCall) -> InterfaceResult {
    let result = call
        .into_parts()
        .and_then(|(policies, request)| authorizer.is_authorized(&request, &policies));
    match result {
        Ok(decision) => InterfaceResult::succeed(decision),
        Err(err) => InterfaceResult::from_error(err),
    }
}

/// A request to check policies against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCall {
    pub schema: SchemaFragment,
    pub policies: PolicySpecification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationAnswer {
    pub violations: Vec<SchemaViolation>,
}

/// Answer a JSON encoded [`ValidationCall`].
pub fn json_validate(input: &str) -> InterfaceResult {
    let call = match serde_json::from_str::<ValidationCall>(input) {
        Ok(call) => call,
        Err(e) => {
            return InterfaceResult::fail_bad_request(vec![format!("failed to parse call: {e}")]);
        }
    };
    let answer = call.policies.compile().and_then(|policies| {
        let validator = Validator::new(&call.schema)?;
        Ok(ValidationAnswer {
            violations: validator.validate_policies(&policies),
        })
    });
    match answer {
        Ok(answer) => InterfaceResult::succeed(answer),
        Err(err) => InterfaceResult::from_error(err),
    }
}
