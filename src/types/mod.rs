//! Data model types: entity uids, values, entities and slices, requests,
//! policies and decisions.
//!
//! Canonical string forms:
//! - Entity uid: `Type::"id"` or `NS::Type::"id"`
//! - Action: `Action::"view"` or `NS::Action::"view"`
//!
//! JSON forms follow the Cedar JSON entity format, with `__entity` and
//! `__extn` escapes inside attribute values.

mod context;
mod decision;
mod entity;
mod entity_uid;
mod policy;
mod request;
mod value;

pub use context::RequestContext;
pub use decision::{Decision, Outcome, PolicyErrorReport, Warning, WarningKind};
pub use entity::{Entity, Slice};
pub use entity_uid::EntityUid;
pub use policy::{
    ActionConstraint, Condition, ConditionKind, Effect, EntityConstraint, Policy, PolicyId,
    PolicySet,
};
pub use request::AuthorizationRequest;
pub use value::{Value, ValueError};
