// src/lib.rs
pub use authorizer::{Authorizer, combine};
pub use budget::StepBudget;
pub use config::AuthorizerConfig;
pub use engine::PolicyEngine;
pub use entities::{Ancestry, EntityStore};
pub use error::{AuthorizationError, ErrorKind, EvaluationError};
pub use evaluator::{Evaluator, PolicyEvaluation, PolicyOutcome};
pub use interface::{
    AuthorizationCall, InterfaceResult, PolicySpecification, RecvdSlice, json_is_authorized,
    json_validate,
};
pub use loader::{compile_policy, compile_policy_map};
pub use schema::{SchemaFragment, SchemaViolation, Validator};
pub use traits::PolicySource;
pub use types::{
    AuthorizationRequest, Decision, Effect, Entity, EntityUid, Outcome, Policy, PolicyId,
    PolicySet, RequestContext, Slice, Value,
};

pub mod expr;
pub mod extensions;
pub mod interface;
pub mod parser;
pub mod schema;
pub mod types;

mod authorizer;
mod budget;
mod config;
mod engine;
mod entities;
mod error;
mod evaluator;
mod loader;
mod traits;
