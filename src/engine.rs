use std::sync::{Arc, RwLock};

use crate::authorizer::Authorizer;
use crate::config::AuthorizerConfig;
use crate::error::AuthorizationError;
use crate::loader;
use crate::schema::{SchemaFragment, SchemaViolation, Validator};
use crate::traits::PolicySource;
use crate::types::{AuthorizationRequest, Decision, Policy, PolicySet};

use tracing::{debug, info};

/// The main engine handle: an authorizer coupled with a policy source.
/// Cloneable and thread-safe; clones share the source.
pub struct PolicyEngine<S: PolicySource = RwLock<PolicySet>> {
    source: Arc<S>,
    authorizer: Authorizer,
}

impl<S: PolicySource> Clone for PolicyEngine<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            authorizer: self.authorizer.clone(),
        }
    }
}

impl PolicyEngine {
    pub fn new_from_str(policy_text: &str) -> Result<Self, AuthorizationError> {
        let set = loader::compile_policy(policy_text)?;
        debug!(event = "Policies", phase = "Loaded", count = set.len());
        Ok(PolicyEngine::new(RwLock::new(set)))
    }

    /// Replace the policy set. Calls already in flight finish against the
    /// set they started with.
    pub fn reload_from_str(&self, policy_text: &str) -> Result<(), AuthorizationError> {
        let new_set = loader::compile_policy(policy_text)?;
        let count = new_set.len();
        *self.source.write()? = new_set;
        info!(event = "Policies", phase = "Reloaded", count);
        Ok(())
    }
}

impl<S: PolicySource> PolicyEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            authorizer: Authorizer::new(),
        }
    }

    pub fn with_config(mut self, config: AuthorizerConfig) -> Self {
        self.authorizer = Authorizer::with_config(config);
        self
    }

    pub fn authorize(&self, request: &AuthorizationRequest) -> Result<Decision, AuthorizationError> {
        let policies = self.source.policy_set()?;
        self.authorizer.is_authorized(request, &policies)
    }

    /// Statically check the current policies against a schema.
    pub fn validate_policies(
        &self,
        schema: &SchemaFragment,
    ) -> Result<Vec<SchemaViolation>, AuthorizationError> {
        let policies = self.source.policy_set()?;
        Ok(Validator::new(schema)?.validate_policies(&policies))
    }

    pub fn policies(&self) -> Result<Vec<Policy>, AuthorizationError> {
        let policies = self.source.policy_set()?;
        Ok(policies.policies().cloned().collect())
    }
}

#[cfg(test)]
mod tests;
