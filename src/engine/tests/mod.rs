use std::collections::BTreeSet;
use std::str::FromStr;

use super::*;
use crate::error::ErrorKind;
use crate::types::{Entity, EntityUid, Outcome, PolicyId, RequestContext, Slice, Value, WarningKind};
use insta::assert_json_snapshot;
use yare::parameterized;


const TEST_POLICY: &str = r#"
@id("alice-photos")
permit (
    principal == User::"alice",
    action in [Action::"view", Action::"edit", Action::"delete"],
    resource == Photo::"VacationPhoto94.jpg"
);

@id("bob-view")
permit (
    principal == User::"bob",
    action == Action::"view",
    resource == Photo::"VacationPhoto94.jpg"
);
"#;

const TEST_POLICY_WITHOUT_BOB: &str = r#"
@id("alice-photos")
permit (
    principal == User::"alice",
    action in [Action::"view", Action::"edit", Action::"delete"],
    resource == Photo::"VacationPhoto94.jpg"
);
"#;

const TEST_POLICY_WITH_FORBID: &str = r#"
@id("alice-photos")
permit (
    principal == User::"alice",
    action in [Action::"view", Action::"edit", Action::"delete"],
    resource == Photo::"VacationPhoto94.jpg"
);
@id("alice-no-edit")
forbid (
    principal == User::"alice",
    action == Action::"edit",
    resource == Photo::"VacationPhoto94.jpg"
);
@id("nobody-deletes")
forbid (
    principal,
    action == Action::"delete",
    resource == Photo::"VacationPhoto94.jpg"
);
"#;

const TEST_POLICY_WITH_GROUPS: &str = r#"
@id("admins")
permit (
    principal in Group::"admins",
    action in [Action::"delete", Action::"view"],
    resource is Photo
);

@id("users")
permit (
    principal in Group::"users",
    action == Action::"view",
    resource is Photo
);
"#;

const TEST_POLICY_WITH_CONDITIONS: &str = r#"
@id("hosts")
permit (
    principal == User::"alice",
    action == Action::"create_host",
    resource is Host
) when {
    resource.name like "web*" &&
    resource.ip.isInRange(ip("192.0.1.0/24"))
};

@id("business-hours")
forbid (
    principal,
    action,
    resource
) unless {
    context has hour && context.hour >= 8 && context.hour < 18
};
"#;

const TEST_POLICY_WITH_IS_AND_ISIN: &str = r#"
permit (
    principal is User,
    action == Action::"read",
    resource
);

permit (
    principal is User in Group::"admins",
    action == Action::"write",
    resource
);
"#;

const TEST_POLICY_WITH_NAMESPACES: &str = r#"
permit (
    principal == Database::User::"alice",
    action in [Database::Action::"create_table", Database::Action::"view_table"],
    resource is Database::Table
);

permit (
    principal in Database::Group::"dbusers",
    action == Database::Action::"view_table",
    resource is Database::Table
);
"#;

fn uid(s: &str) -> EntityUid {
    EntityUid::from_str(s).unwrap()
}

fn engine_from_policy(policy_text: &str) -> PolicyEngine {
    PolicyEngine::new_from_str(policy_text).expect("policy should load")
}

fn request(principal: &str, action: &str, resource: &str) -> AuthorizationRequest {
    AuthorizationRequest::new(uid(action))
        .with_principal(uid(principal))
        .with_resource(uid(resource))
}

fn member_of(child: &str, parents: &[&str]) -> Entity {
    parents
        .iter()
        .fold(Entity::with_uid(uid(child)), |entity, parent| {
            entity.with_parent(uid(parent))
        })
}

fn ids(names: &[&str]) -> BTreeSet<PolicyId> {
    names.iter().copied().map(PolicyId::new).collect()
}

fn assert_allow(decision: &Decision, determining: &[&str]) {
    assert_eq!(decision.outcome, Outcome::Allow, "{decision:?}");
    assert_eq!(decision.determining_policies, ids(determining));
}

fn assert_deny(decision: &Decision, determining: &[&str]) {
    assert_eq!(decision.outcome, Outcome::Deny, "{decision:?}");
    assert_eq!(decision.determining_policies, ids(determining));
}

include!("core.rs");
include!("hierarchy.rs");
