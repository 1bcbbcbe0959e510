//! Configuration for the authorizer.

use serde::{Deserialize, Serialize};

/// Limits applied to every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthorizerConfig {
    /// Evaluation steps each policy may spend before it fails with
    /// `EvaluationBudgetExceeded`.
    pub max_steps: u64,
    /// Deepest expression nesting a policy may evaluate before it fails
    /// with `EvaluationBudgetExceeded`.
    pub max_depth: usize,
    /// Largest slice accepted; bigger slices are a malformed request.
    pub max_slice_entities: usize,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            max_depth: 100,
            max_slice_entities: 100_000,
        }
    }
}

impl AuthorizerConfig {
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_slice_entities(mut self, max_slice_entities: usize) -> Self {
        self.max_slice_entities = max_slice_entities;
        self
    }
}
