//! Policy evaluation against one request and its entity store.
//!
//! Each policy gets its own step budget. Scope constraints are checked
//! first; a policy whose scope does not match is skipped without touching
//! its conditions. Conditions run in order and `&&`, `||` and `if` evaluate
//! strictly left to right, so an error on the right of a short-circuited
//! operator never surfaces.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::debug;

use crate::budget::StepBudget;
use crate::config::AuthorizerConfig;
use crate::entities::{Ancestry, EntityStore};
use crate::error::EvaluationError;
use crate::expr::{BinaryOp, Expr, UnaryOp, Var};
use crate::extensions::EXTENSIONS;
use crate::types::{
    ActionConstraint, AuthorizationRequest, ConditionKind, Effect, EntityConstraint, EntityUid,
    Policy, PolicyId, Value, Warning, WarningKind,
};

/// Three-valued result of one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Satisfied,
    NotSatisfied,
    Error(EvaluationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEvaluation {
    pub id: PolicyId,
    pub effect: Effect,
    /// False when the scope ruled the policy out before any condition ran.
    pub scope_matched: bool,
    pub outcome: PolicyOutcome,
    pub warnings: Vec<Warning>,
}

pub struct Evaluator<'e> {
    principal: Option<&'e EntityUid>,
    action: &'e EntityUid,
    resource: Option<&'e EntityUid>,
    context: Value,
    store: &'e EntityStore,
    max_steps: u64,
    max_depth: usize,
}

/// Per-policy evaluation state.
struct Run<'r, 'e> {
    evaluator: &'r Evaluator<'e>,
    budget: StepBudget,
    depth: usize,
    cycles: Vec<Vec<EntityUid>>,
}

impl<'e> Evaluator<'e> {
    pub fn new(request: &'e AuthorizationRequest, store: &'e EntityStore, max_steps: u64) -> Self {
        Self {
            principal: request.principal.as_ref(),
            action: &request.action,
            resource: request.resource.as_ref(),
            context: request.context.to_record(),
            store,
            max_steps,
            max_depth: AuthorizerConfig::default().max_depth,
        }
    }

    /// Limit how deeply nested an expression may be before it fails.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn evaluate_policy(&self, policy: &Policy) -> PolicyEvaluation {
        let mut run = Run {
            evaluator: self,
            budget: StepBudget::new(self.max_steps),
            depth: 0,
            cycles: Vec::new(),
        };

        let (scope_matched, outcome) = match run.scope_matches(policy) {
            Ok(false) => (false, PolicyOutcome::NotSatisfied),
            Ok(true) => match run.conditions_hold(policy) {
                Ok(true) => (true, PolicyOutcome::Satisfied),
                Ok(false) => (true, PolicyOutcome::NotSatisfied),
                Err(err) => (true, PolicyOutcome::Error(err)),
            },
            Err(err) => (true, PolicyOutcome::Error(err)),
        };

        debug!(
            event = "Request",
            phase = "Policy",
            policy = policy.id().as_str(),
            effect = policy.effect().to_string(),
            scope_matched,
            outcome = ?outcome,
            steps = run.budget.used()
        );

        let warnings = run
            .cycles
            .into_iter()
            .unique()
            .map(|members| Warning {
                policy_id: policy.id().clone(),
                kind: WarningKind::HierarchyCycle,
                message: format!(
                    "entity hierarchy cycle {}",
                    members.iter().join(" -> ")
                ),
            })
            .collect();

        PolicyEvaluation {
            id: policy.id().clone(),
            effect: policy.effect(),
            scope_matched,
            outcome,
            warnings,
        }
    }

    /// Evaluate a standalone expression under this request.
    pub fn interpret(&self, expr: &Expr) -> Result<Value, EvaluationError> {
        let mut run = Run {
            evaluator: self,
            budget: StepBudget::new(self.max_steps),
            depth: 0,
            cycles: Vec::new(),
        };
        run.eval(expr)
    }
}

impl Run<'_, '_> {
    fn scope_matches(&mut self, policy: &Policy) -> Result<bool, EvaluationError> {
        let evaluator = self.evaluator;
        Ok(self.entity_matches(policy.principal_constraint(), evaluator.principal)?
            && self.action_matches(policy.action_constraint())?
            && self.entity_matches(policy.resource_constraint(), evaluator.resource)?)
    }

    /// An absent request entity only matches an unconstrained scope.
    fn entity_matches(
        &mut self,
        constraint: &EntityConstraint,
        uid: Option<&EntityUid>,
    ) -> Result<bool, EvaluationError> {
        let uid = match (constraint, uid) {
            (EntityConstraint::Any, _) => return Ok(true),
            (_, None) => return Ok(false),
            (_, Some(uid)) => uid,
        };
        match constraint {
            EntityConstraint::Any => Ok(true),
            EntityConstraint::Eq(target) => Ok(uid == target),
            EntityConstraint::In(target) => self.is_in(uid, target),
            EntityConstraint::Is(entity_type) => Ok(uid.type_name() == entity_type),
            EntityConstraint::IsIn(entity_type, target) => {
                Ok(uid.type_name() == entity_type && self.is_in(uid, target)?)
            }
        }
    }

    fn action_matches(&mut self, constraint: &ActionConstraint) -> Result<bool, EvaluationError> {
        let action = self.evaluator.action;
        match constraint {
            ActionConstraint::Any => Ok(true),
            ActionConstraint::Eq(target) => Ok(action == target),
            ActionConstraint::In(targets) => {
                for target in targets {
                    if self.is_in(action, target)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// All conditions hold, checked in order.
    fn conditions_hold(&mut self, policy: &Policy) -> Result<bool, EvaluationError> {
        for condition in policy.conditions() {
            let value = self.eval(&condition.body)?.as_bool()?;
            let holds = match condition.kind {
                ConditionKind::When => value,
                ConditionKind::Unless => !value,
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Equality or descent over the slice's hierarchy.
    fn is_in(&mut self, uid: &EntityUid, target: &EntityUid) -> Result<bool, EvaluationError> {
        if uid == target {
            return Ok(true);
        }
        let ancestry = self
            .evaluator
            .store
            .is_descendant_of_bounded(uid, target, &mut self.budget)?;
        Ok(match ancestry {
            Ancestry::Descendant => true,
            Ancestry::NotDescendant => false,
            Ancestry::Cycle(members) => {
                self.cycles.push(members);
                false
            }
        })
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        self.budget.charge()?;
        let limit = self.evaluator.max_depth;
        if self.depth >= limit {
            return Err(EvaluationError::too_deep(limit));
        }
        self.depth += 1;
        let value = self.eval_node(expr);
        self.depth -= 1;
        value
    }

    fn eval_node(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Var(var) => self.var(*var),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.as_bool()? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::And(left, right) => {
                if !self.eval(left)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(right)?.as_bool()?))
            }
            Expr::Or(left, right) => {
                if self.eval(left)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(right)?.as_bool()?))
            }
            Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!self.eval(operand)?.as_bool()?)),
            Expr::Unary(UnaryOp::Neg, operand) => {
                let n = self.eval(operand)?.as_long()?;
                n.checked_neg()
                    .map(Value::Long)
                    .ok_or_else(|| EvaluationError::overflow(format!("negating {n} overflows")))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, &left, &right)
            }
            Expr::GetAttr(target, attr) => {
                let target = self.eval(target)?;
                self.get_attr(&target, attr)
            }
            Expr::HasAttr(target, attr) => {
                let target = self.eval(target)?;
                self.has_attr(&target, attr)
            }
            Expr::Like(target, pattern) => {
                let target = self.eval(target)?;
                Ok(Value::Bool(pattern.matches(target.as_string()?)))
            }
            Expr::Is {
                expr,
                entity_type,
                within,
            } => {
                let value = self.eval(expr)?;
                let uid = value.as_entity_ref()?;
                if uid.type_name() != entity_type {
                    return Ok(Value::Bool(false));
                }
                match within {
                    None => Ok(Value::Bool(true)),
                    Some(within) => {
                        let target = self.eval(within)?;
                        self.in_value(uid, &target).map(Value::Bool)
                    }
                }
            }
            Expr::Set(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    set.insert(self.eval(item)?);
                }
                Ok(Value::Set(set))
            }
            Expr::Record(fields) => {
                let mut record = BTreeMap::new();
                for (key, field) in fields {
                    record.insert(key.clone(), self.eval(field)?);
                }
                Ok(Value::Record(record))
            }
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                EXTENSIONS.call(name, &values)
            }
        }
    }

    fn var(&self, var: Var) -> Result<Value, EvaluationError> {
        let evaluator = self.evaluator;
        let missing = |role: &str| {
            EvaluationError::attribute_access(format!("the request has no {role}"))
        };
        match var {
            Var::Principal => evaluator
                .principal
                .map(|uid| Value::EntityRef(uid.clone()))
                .ok_or_else(|| missing("principal")),
            Var::Action => Ok(Value::EntityRef(evaluator.action.clone())),
            Var::Resource => evaluator
                .resource
                .map(|uid| Value::EntityRef(uid.clone()))
                .ok_or_else(|| missing("resource")),
            Var::Context => Ok(evaluator.context.clone()),
        }
    }

    fn get_attr(&self, target: &Value, attr: &str) -> Result<Value, EvaluationError> {
        match target {
            Value::EntityRef(uid) => {
                let entity = self.evaluator.store.lookup(uid).ok_or_else(|| {
                    EvaluationError::attribute_access(format!("entity {uid} is not in the slice"))
                })?;
                entity.attr(attr).cloned().ok_or_else(|| {
                    EvaluationError::attribute_access(format!(
                        "entity {uid} has no attribute `{attr}`"
                    ))
                })
            }
            Value::Record(fields) => fields.get(attr).cloned().ok_or_else(|| {
                EvaluationError::attribute_access(format!("record has no attribute `{attr}`"))
            }),
            other => Err(EvaluationError::attribute_access(format!(
                "cannot read attribute `{attr}` of a {}",
                other.type_name()
            ))),
        }
    }

    /// `has` on an entity missing from the slice is unknown, not false.
    fn has_attr(&self, target: &Value, attr: &str) -> Result<Value, EvaluationError> {
        match target {
            Value::EntityRef(uid) => {
                let entity = self.evaluator.store.lookup(uid).ok_or_else(|| {
                    EvaluationError::attribute_access(format!("entity {uid} is not in the slice"))
                })?;
                Ok(Value::Bool(entity.attr(attr).is_some()))
            }
            Value::Record(fields) => Ok(Value::Bool(fields.contains_key(attr))),
            other => Err(EvaluationError::type_mismatch(
                "entity or record",
                other.type_name(),
            )),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvaluationError> {
        let result = match op {
            BinaryOp::Eq => Value::Bool(left == right),
            BinaryOp::NotEq => Value::Bool(left != right),
            BinaryOp::Less => Value::Bool(left.as_long()? < right.as_long()?),
            BinaryOp::LessEq => Value::Bool(left.as_long()? <= right.as_long()?),
            BinaryOp::Greater => Value::Bool(left.as_long()? > right.as_long()?),
            BinaryOp::GreaterEq => Value::Bool(left.as_long()? >= right.as_long()?),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                let (a, b) = (left.as_long()?, right.as_long()?);
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                Value::Long(result.ok_or_else(|| {
                    EvaluationError::overflow(format!("{a} {op} {b} overflows"))
                })?)
            }
            BinaryOp::In => Value::Bool(self.in_value(left.as_entity_ref()?, right)?),
            BinaryOp::Contains => Value::Bool(left.as_set()?.contains(right)),
            BinaryOp::ContainsAll => {
                let set = left.as_set()?;
                Value::Bool(right.as_set()?.iter().all(|item| set.contains(item)))
            }
            BinaryOp::ContainsAny => {
                let set = left.as_set()?;
                Value::Bool(right.as_set()?.iter().any(|item| set.contains(item)))
            }
        };
        Ok(result)
    }

    /// `uid in target` where the target is an entity or a set of entities.
    fn in_value(&mut self, uid: &EntityUid, target: &Value) -> Result<bool, EvaluationError> {
        match target {
            Value::EntityRef(target) => self.is_in(uid, target),
            Value::Set(items) => {
                for item in items {
                    if self.is_in(uid, item.as_entity_ref()?)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(EvaluationError::type_mismatch(
                "entity or set of entities",
                other.type_name(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::parse_expr;
    use crate::types::{Entity, RequestContext, Slice};
    use yare::parameterized;

    fn uid(s: &str) -> EntityUid {
        s.parse().unwrap()
    }

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new(uid(r#"Action::"view""#))
            .with_principal(uid(r#"User::"alice""#))
            .with_resource(uid(r#"Photo::"p1""#))
            .with_context(
                RequestContext::new()
                    .with_attr("mfa", true)
                    .with_attr("big", i64::MAX)
                    .with_attr("tags", Value::set([Value::from("a"), Value::from("b")])),
            )
    }

    fn store() -> EntityStore {
        let slice = Slice::new()
            .with_entity(
                Entity::with_uid(uid(r#"User::"alice""#))
                    .with_attr("age", 30_i64)
                    .with_attr("name", "Alice")
                    .with_parent(uid(r#"Group::"devs""#)),
            )
            .with_entity(Entity::with_uid(uid(r#"Group::"devs""#)).with_parent(uid(r#"Group::"staff""#)))
            .with_entity(
                Entity::with_uid(uid(r#"Photo::"p1""#))
                    .with_attr("owner", uid(r#"User::"alice""#))
                    .with_attr("public", false),
            );
        EntityStore::from_slice(&slice, 100).unwrap()
    }

    fn interpret(text: &str) -> Result<Value, EvaluationError> {
        let request = request();
        let store = store();
        let evaluator = Evaluator::new(&request, &store, 1_000);
        evaluator.interpret(&parse_expr(text).unwrap())
    }

    #[parameterized(
        arithmetic = { "1 + 2 * 3 - 4", Value::Long(3) },
        negation = { "-(3 - 5)", Value::Long(2) },
        entity_attr = { "principal.age", Value::Long(30) },
        nested_attr = { "resource.owner.name", Value::from("Alice") },
        context_attr = { r#"context["mfa"]"#, Value::Bool(true) },
        cross_type_eq = { r#"1 == "1""#, Value::Bool(false) },
        entity_eq = { r#"resource.owner == principal"#, Value::Bool(true) },
        in_self = { r#"principal in User::"alice""#, Value::Bool(true) },
        in_transitive = { r#"principal in Group::"staff""#, Value::Bool(true) },
        in_set = { r#"principal in [Group::"ops", Group::"devs"]"#, Value::Bool(true) },
        in_absent_child = { r#"User::"ghost" in Group::"devs""#, Value::Bool(false) },
        has_present = { "principal has age", Value::Bool(true) },
        has_missing_attr = { "principal has email", Value::Bool(false) },
        has_record = { "context has mfa", Value::Bool(true) },
        like = { r#"principal.name like "A*e""#, Value::Bool(true) },
        is_type = { "resource is Photo", Value::Bool(true) },
        is_in = { r#"principal is User in Group::"devs""#, Value::Bool(true) },
        is_wrong_type_skips_in = { "principal is Photo in 42", Value::Bool(false) },
        contains = { r#"context.tags.contains("a")"#, Value::Bool(true) },
        contains_all = { r#"context.tags.containsAll(["a", "b"])"#, Value::Bool(true) },
        contains_any = { r#"context.tags.containsAny(["c"])"#, Value::Bool(false) },
        if_then_else = { "if principal.age > 18 then \"adult\" else \"minor\"", Value::from("adult") },
        record_literal = { "{ a: 1 }.a", Value::Long(1) },
        extension_call = { r#"ip("10.0.0.1").isInRange(ip("10.0.0.0/8"))"#, Value::Bool(true) },
        decimal_call = { r#"decimal("1.5").lessThan(decimal("2.25"))"#, Value::Bool(true) },
    )]
    fn test_interpret(text: &str, expected: Value) {
        assert_eq!(interpret(text).unwrap(), expected);
    }

    #[parameterized(
        add_overflow = { "context.big + 1", ErrorKind::IntegerOverflow },
        mul_overflow = { "context.big * 2", ErrorKind::IntegerOverflow },
        neg_overflow = { "-9223372036854775808 * -1", ErrorKind::IntegerOverflow },
        not_a_bool = { "!1", ErrorKind::TypeMismatch },
        compare_strings = { r#""a" < "b""#, ErrorKind::TypeMismatch },
        absent_entity_attr = { r#"User::"ghost".age"#, ErrorKind::AttributeAccessError },
        absent_entity_has = { r#"User::"ghost" has age"#, ErrorKind::AttributeAccessError },
        missing_attr = { "principal.email", ErrorKind::AttributeAccessError },
        attr_of_long = { "principal.age.years", ErrorKind::AttributeAccessError },
        unknown_function = { "frobnicate(1)", ErrorKind::UnknownFunction },
        bad_extension_arg = { r#"ip("not an address")"#, ErrorKind::ExtensionError },
        in_non_entity = { "principal in 1", ErrorKind::TypeMismatch },
    )]
    fn test_interpret_errors(text: &str, expected: ErrorKind) {
        assert_eq!(interpret(text).unwrap_err().kind, expected);
    }

    #[test]
    fn test_short_circuit_hides_right_hand_errors() {
        assert_eq!(interpret("false && (1 + \"x\")").unwrap(), Value::Bool(false));
        assert_eq!(interpret("true || principal.email").unwrap(), Value::Bool(true));
        assert_eq!(
            interpret(r#"if true then 1 else User::"ghost".age"#).unwrap(),
            Value::Long(1)
        );
        assert_eq!(
            interpret("true && principal.email").unwrap_err().kind,
            ErrorKind::AttributeAccessError
        );
    }

    #[test]
    fn test_absent_principal_only_matches_unconstrained_scope() {
        let request = AuthorizationRequest::new(uid(r#"Action::"view""#));
        let store = EntityStore::default();
        let evaluator = Evaluator::new(&request, &store, 1_000);

        let open = Policy::parse("open", "permit(principal, action, resource);").unwrap();
        let scoped = Policy::parse("scoped", "permit(principal is User, action, resource);").unwrap();
        let uses_principal = Policy::parse(
            "uses",
            "permit(principal, action, resource) when { principal has name };",
        )
        .unwrap();

        assert_eq!(evaluator.evaluate_policy(&open).outcome, PolicyOutcome::Satisfied);
        let result = evaluator.evaluate_policy(&scoped);
        assert!(!result.scope_matched);
        assert_eq!(result.outcome, PolicyOutcome::NotSatisfied);
        assert!(matches!(
            evaluator.evaluate_policy(&uses_principal).outcome,
            PolicyOutcome::Error(EvaluationError { kind: ErrorKind::AttributeAccessError, .. })
        ));
    }

    #[test]
    fn test_scope_mismatch_skips_conditions() {
        let request = request();
        let store = store();
        let evaluator = Evaluator::new(&request, &store, 1_000);
        let policy = Policy::parse(
            "other-action",
            r#"permit(principal, action == Action::"edit", resource) when { 1 + "x" };"#,
        )
        .unwrap();
        let result = evaluator.evaluate_policy(&policy);
        assert!(!result.scope_matched);
        assert_eq!(result.outcome, PolicyOutcome::NotSatisfied);
    }

    #[test]
    fn test_unless_condition() {
        let request = request();
        let store = store();
        let evaluator = Evaluator::new(&request, &store, 1_000);
        let policy = Policy::parse(
            "private",
            "forbid(principal, action, resource) unless { resource.public };",
        )
        .unwrap();
        assert_eq!(evaluator.evaluate_policy(&policy).outcome, PolicyOutcome::Satisfied);
    }

    #[test]
    fn test_budget_is_per_policy() {
        let request = request();
        let store = store();
        let evaluator = Evaluator::new(&request, &store, 5);
        let heavy = Policy::parse(
            "heavy",
            "permit(principal, action, resource) when { 1 + 1 + 1 + 1 + 1 + 1 == 6 };",
        )
        .unwrap();
        let light = Policy::parse("light", "permit(principal, action, resource) when { true };")
            .unwrap();

        assert!(matches!(
            evaluator.evaluate_policy(&heavy).outcome,
            PolicyOutcome::Error(EvaluationError { kind: ErrorKind::EvaluationBudgetExceeded, .. })
        ));
        assert_eq!(evaluator.evaluate_policy(&light).outcome, PolicyOutcome::Satisfied);
    }

    #[test]
    fn test_deep_negation_fails_the_policy() {
        let request = request();
        let store = store();
        let evaluator = Evaluator::new(&request, &store, 1_000);
        let deep = Policy::parse(
            "deep",
            &format!(
                "permit(principal, action, resource) when {{ {}true }};",
                "!".repeat(300)
            ),
        )
        .unwrap();

        let PolicyOutcome::Error(err) = evaluator.evaluate_policy(&deep).outcome else {
            panic!("expected a nesting error");
        };
        assert_eq!(err.kind, ErrorKind::EvaluationBudgetExceeded);
        assert_eq!(err.message, "expression nesting exceeds the limit of 100");
    }

    #[parameterized(
        shallow = { "!!true", true },
        at_limit = { "!!!!true", true },
        one_past = { "!!!!!true", false },
        parenthesized = { "!(!(!(!(!(true)))))", false },
    )]
    fn test_max_depth_bounds_nesting(text: &str, within: bool) {
        let request = request();
        let store = store();
        let evaluator = Evaluator::new(&request, &store, 1_000).with_max_depth(5);
        let result = evaluator.interpret(&parse_expr(text).unwrap());
        if within {
            assert_eq!(result.unwrap(), Value::Bool(true));
        } else {
            assert_eq!(result.unwrap_err().kind, ErrorKind::EvaluationBudgetExceeded);
        }
    }

    #[test]
    fn test_cycle_produces_warning_and_false() {
        let slice = Slice::new()
            .with_entity(Entity::with_uid(uid(r#"User::"alice""#)).with_parent(uid(r#"Group::"a""#)))
            .with_entity(Entity::with_uid(uid(r#"Group::"a""#)).with_parent(uid(r#"Group::"b""#)))
            .with_entity(Entity::with_uid(uid(r#"Group::"b""#)).with_parent(uid(r#"Group::"a""#)));
        let request = request().with_slice(slice);
        let store = EntityStore::from_slice(&request.slice, 100).unwrap();
        let evaluator = Evaluator::new(&request, &store, 1_000);
        let policy = Policy::parse(
            "admins",
            r#"permit(principal in Group::"admins", action, resource);"#,
        )
        .unwrap();

        let result = evaluator.evaluate_policy(&policy);
        assert_eq!(result.outcome, PolicyOutcome::NotSatisfied);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::HierarchyCycle);
        assert_eq!(
            result.warnings[0].message,
            r#"entity hierarchy cycle Group::"a" -> Group::"b" -> Group::"a""#
        );
    }
}
