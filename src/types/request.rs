//! Authorization request type.

use serde::{Deserialize, Serialize};

use super::{EntityUid, RequestContext, Slice};
use crate::schema::SchemaFragment;

/// Everything one call needs besides the policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<EntityUid>,
    pub action: EntityUid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<EntityUid>,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaFragment>,
    #[serde(default)]
    pub slice: Slice,
}

impl AuthorizationRequest {
    /// A request for `action` with no principal, resource, context or slice.
    pub fn new(action: EntityUid) -> Self {
        Self {
            principal: None,
            action,
            resource: None,
            context: RequestContext::new(),
            schema: None,
            slice: Slice::new(),
        }
    }

    pub fn with_principal(mut self, principal: EntityUid) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_resource(mut self, resource: EntityUid) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_schema(mut self, schema: SchemaFragment) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_slice(mut self, slice: Slice) -> Self {
        self.slice = slice;
        self
    }
}
