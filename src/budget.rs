use crate::error::EvaluationError;

/// Per-policy step counter. Each interpreted node and each hierarchy node
/// visited costs one step.
#[derive(Debug, Clone)]
pub struct StepBudget {
    limit: u64,
    used: u64,
}

impl StepBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Charge one step, failing once the limit is exceeded.
    pub fn charge(&mut self) -> Result<(), EvaluationError> {
        if self.used >= self.limit {
            return Err(EvaluationError::budget_exceeded(self.limit));
        }
        self.used += 1;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}
