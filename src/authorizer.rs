//! The decision combinator: forbid overrides permit, default deny.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::config::AuthorizerConfig;
use crate::entities::EntityStore;
use crate::error::AuthorizationError;
use crate::evaluator::{Evaluator, PolicyEvaluation, PolicyOutcome};
use crate::schema::Validator;
use crate::types::{
    AuthorizationRequest, Decision, Effect, Outcome, PolicyErrorReport, PolicySet,
};

/// Stateless apart from its limits; one instance can serve any number of
/// concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    config: AuthorizerConfig,
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AuthorizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthorizerConfig {
        &self.config
    }

    /// Decide one request.
    ///
    /// `Err` is reserved for requests that cannot be evaluated at all
    /// (`MalformedRequest`) and for broken engine invariants
    /// (`EngineInternal`). A schema rejection is a `Deny` carrying the
    /// violations.
    pub fn is_authorized(
        &self,
        request: &AuthorizationRequest,
        policies: &PolicySet,
    ) -> Result<Decision, AuthorizationError> {
        debug!(
            event = "Request",
            phase = "Received",
            principal = ?request.principal.as_ref().map(ToString::to_string),
            action = request.action.to_string(),
            resource = ?request.resource.as_ref().map(ToString::to_string),
            policies = policies.len(),
            entities = request.slice.len()
        );

        let store = EntityStore::from_slice(&request.slice, self.config.max_slice_entities)?;

        if let Some(schema) = &request.schema {
            let validator = Validator::new(schema)?;
            let mut violations = validator.validate_request(request);
            violations.extend(validator.validate_entities(&request.slice));
            if !violations.is_empty() {
                warn!(
                    event = "Request",
                    phase = "Schema",
                    action = request.action.to_string(),
                    violations = violations.iter().join("; ")
                );
                return Ok(Decision::schema_rejected(violations));
            }
        }

        let evaluator = Evaluator::new(request, &store, self.config.max_steps)
            .with_max_depth(self.config.max_depth);
        let decision = combine(
            policies
                .policies()
                .map(|policy| evaluator.evaluate_policy(policy)),
        )?;

        info!(
            event = "Request",
            phase = "Result",
            outcome = decision.outcome.to_string(),
            determining = decision.determining_policies.iter().join(","),
            errors = decision.errors.len()
        );
        Ok(decision)
    }
}

/// Fold per-policy results into a decision. The result does not depend on
/// the order of `evaluations`.
pub fn combine(
    evaluations: impl IntoIterator<Item = PolicyEvaluation>,
) -> Result<Decision, AuthorizationError> {
    let mut seen = BTreeSet::new();
    let mut forbids = BTreeSet::new();
    let mut permits = BTreeSet::new();
    let mut decision = Decision::default_deny();

    for evaluation in evaluations {
        if !seen.insert(evaluation.id.clone()) {
            return Err(AuthorizationError::EngineInternal(format!(
                "policy {} was evaluated more than once",
                evaluation.id
            )));
        }
        for warning in &evaluation.warnings {
            warn!(
                event = "Request",
                phase = "Hierarchy",
                policy = warning.policy_id.as_str(),
                message = warning.message.as_str()
            );
        }
        decision.warnings.extend(evaluation.warnings);

        match (evaluation.outcome, evaluation.effect) {
            (PolicyOutcome::Satisfied, Effect::Forbid) => {
                forbids.insert(evaluation.id);
            }
            (PolicyOutcome::Satisfied, Effect::Permit) => {
                permits.insert(evaluation.id);
            }
            (PolicyOutcome::NotSatisfied, _) => {}
            (PolicyOutcome::Error(err), effect) => {
                if effect == Effect::Forbid {
                    warn!(
                        event = "Request",
                        phase = "Policy",
                        policy = evaluation.id.as_str(),
                        error = err.to_string(),
                        "forbid policy could not be evaluated"
                    );
                    decision.forbid_errors.insert(evaluation.id.clone());
                }
                decision.errors.push(PolicyErrorReport {
                    policy_id: evaluation.id,
                    effect,
                    kind: err.kind,
                    message: err.message,
                });
            }
        }
    }

    decision
        .errors
        .sort_by(|a, b| a.policy_id.cmp(&b.policy_id));
    decision.warnings.sort();

    if !forbids.is_empty() {
        decision.outcome = Outcome::Deny;
        decision.determining_policies = forbids;
    } else if !permits.is_empty() {
        decision.outcome = Outcome::Allow;
        decision.determining_policies = permits;
    }
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, EvaluationError};
    use crate::types::PolicyId;
    use yare::parameterized;

    fn evaluation(id: &str, effect: Effect, outcome: PolicyOutcome) -> PolicyEvaluation {
        PolicyEvaluation {
            id: PolicyId::new(id),
            effect,
            scope_matched: true,
            outcome,
            warnings: Vec::new(),
        }
    }

    fn error() -> PolicyOutcome {
        PolicyOutcome::Error(EvaluationError::new(ErrorKind::TypeMismatch, "boom"))
    }

    #[parameterized(
        empty = { vec![], Outcome::Deny, vec![] },
        permit = { vec![evaluation("p", Effect::Permit, PolicyOutcome::Satisfied)], Outcome::Allow, vec!["p"] },
        forbid_wins = {
            vec![
                evaluation("p", Effect::Permit, PolicyOutcome::Satisfied),
                evaluation("f", Effect::Forbid, PolicyOutcome::Satisfied),
            ],
            Outcome::Deny,
            vec!["f"]
        },
        not_satisfied = { vec![evaluation("p", Effect::Permit, PolicyOutcome::NotSatisfied)], Outcome::Deny, vec![] },
        errored_permit = { vec![evaluation("p", Effect::Permit, error())], Outcome::Deny, vec![] },
        errored_forbid_does_not_deny = {
            vec![
                evaluation("p", Effect::Permit, PolicyOutcome::Satisfied),
                evaluation("f", Effect::Forbid, error()),
            ],
            Outcome::Allow,
            vec!["p"]
        },
    )]
    fn test_combine(evaluations: Vec<PolicyEvaluation>, outcome: Outcome, determining: Vec<&str>) {
        let decision = combine(evaluations).unwrap();
        assert_eq!(decision.outcome, outcome);
        assert_eq!(
            decision.determining_policies,
            determining.into_iter().map(PolicyId::new).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_errored_forbid_is_reported() {
        let decision = combine([
            evaluation("p", Effect::Permit, error()),
            evaluation("f", Effect::Forbid, error()),
        ])
        .unwrap();
        assert_eq!(decision.errors.len(), 2);
        assert_eq!(decision.errors[0].policy_id.as_str(), "f");
        assert_eq!(
            decision.forbid_errors,
            BTreeSet::from([PolicyId::new("f")])
        );
    }

    #[test]
    fn test_duplicate_evaluation_is_internal() {
        let err = combine([
            evaluation("p", Effect::Permit, PolicyOutcome::Satisfied),
            evaluation("p", Effect::Permit, PolicyOutcome::Satisfied),
        ])
        .unwrap_err();
        assert!(err.is_internal());
    }
}
