//! Policy evaluator behaviour against the built-in rule table and small
//! hand-written tables.

use proptest::prelude::*;
use remitgate_authz::{
    store::{InMemoryProfileStore, ProfileStore},
    ActorId, AuthzRequest, Decision, DenyReason, Operation, OwnershipRequirement, PolicyEvaluator,
    PolicyRule, Profile, Role, RoleRequirement, RoleResolver, RuleSet,
};
use std::sync::Arc;

const TABLES: [&str; 5] = [
    "profiles",
    "remittance_types",
    "remittances",
    "remittance_status_history",
    "products",
];

const OPERATIONS: [Operation; 4] = [
    Operation::Read,
    Operation::Create,
    Operation::Update,
    Operation::Delete,
];

fn actor(id: &str) -> ActorId {
    ActorId::new(id).unwrap()
}

fn profile(id: &str, role: Role) -> Profile {
    Profile::provisioned(actor(id), format!("{}@example.com", id), id).with_role(role)
}

fn evaluator(store: InMemoryProfileStore, rules: RuleSet) -> PolicyEvaluator {
    PolicyEvaluator::new(RoleResolver::new(Arc::new(store)), Arc::new(rules))
}

fn default_evaluator(profiles: Vec<Profile>) -> PolicyEvaluator {
    evaluator(InMemoryProfileStore::with_profiles(profiles), RuleSet::remittance_defaults())
}

// ============================================================================
// FAIL-CLOSED INPUTS
// ============================================================================

#[tokio::test]
async fn test_actor_without_profile_is_denied_everywhere() {
    let evaluator = default_evaluator(vec![profile("someone-else", Role::SuperAdmin)]);
    let ghost = actor("ghost");

    for table in TABLES {
        for operation in OPERATIONS {
            let request = AuthzRequest::new(ghost.clone(), operation, table)
                .owned_by(ghost.clone())
                .in_state("pending");
            let decision = evaluator.authorize(&request).await;
            assert_eq!(
                decision.decision,
                Decision::Deny(DenyReason::NoProfile),
                "{}.{} must be denied",
                table,
                operation
            );
        }
    }
}

#[tokio::test]
async fn test_disabled_profile_is_denied_regardless_of_role() {
    for role in Role::ALL {
        let evaluator = default_evaluator(vec![profile("d", role).with_enabled(false)]);

        for table in TABLES {
            for operation in OPERATIONS {
                let request = AuthzRequest::new(actor("d"), operation, table)
                    .owned_by(actor("d"))
                    .in_state("pending");
                let decision = evaluator.authorize(&request).await;
                assert_eq!(decision.decision, Decision::Deny(DenyReason::Disabled));
                assert_eq!(decision.role, Some(role));
            }
        }
    }
}

#[tokio::test]
async fn test_undeclared_table_or_operation_is_no_matching_rule() {
    let evaluator = default_evaluator(vec![profile("root", Role::SuperAdmin)]);

    let undeclared = [
        ("products", Operation::Read),
        ("combos", Operation::Create),
        ("profiles", Operation::Delete),
        ("profiles", Operation::Create),
        ("remittance_status_history", Operation::Delete),
    ];

    for (table, operation) in undeclared {
        let request = AuthzRequest::new(actor("root"), operation, table).owned_by(actor("root"));
        let decision = evaluator.authorize(&request).await;
        assert_eq!(decision.decision, Decision::Deny(DenyReason::NoMatchingRule));
        assert_eq!(decision.rule_id, None);
    }
}

// ============================================================================
// ROLE THRESHOLDS
// ============================================================================

#[tokio::test]
async fn test_manager_promoted_to_admin_can_create_remittance_types() {
    let store = InMemoryProfileStore::with_profiles([profile("a", Role::Manager)]);
    let evaluator = evaluator(store.clone(), RuleSet::remittance_defaults());
    let request = AuthzRequest::new(actor("a"), Operation::Create, "remittance_types");

    let before = evaluator.authorize(&request).await;
    assert_eq!(before.decision, Decision::Deny(DenyReason::InsufficientRole));

    store.set_role(&actor("a"), Role::Admin).await.unwrap();

    let after = evaluator.authorize(&request).await;
    assert_eq!(after.decision, Decision::Allow);
    assert_eq!(after.role, Some(Role::Admin));
}

#[tokio::test]
async fn test_demotion_takes_effect_on_next_decision() {
    let store = InMemoryProfileStore::with_profiles([profile("a", Role::Admin)]);
    let evaluator = evaluator(store.clone(), RuleSet::remittance_defaults());
    let request = AuthzRequest::new(actor("a"), Operation::Delete, "remittance_types");

    assert!(evaluator.authorize(&request).await.allowed());
    store.set_role(&actor("a"), Role::User).await.unwrap();
    assert!(!evaluator.authorize(&request).await.allowed());
}

#[tokio::test]
async fn test_exact_role_rule_excludes_other_roles() {
    let evaluator = default_evaluator(vec![
        profile("admin", Role::Admin),
        profile("root", Role::SuperAdmin),
    ]);

    let as_admin = AuthzRequest::new(actor("admin"), Operation::Delete, "remittances").owned_by(actor("admin"));
    assert_eq!(
        evaluator.authorize(&as_admin).await.decision,
        Decision::Deny(DenyReason::InsufficientRole)
    );

    let as_root = AuthzRequest::new(actor("root"), Operation::Delete, "remittances").owned_by(actor("admin"));
    assert!(evaluator.authorize(&as_root).await.allowed());
}

#[derive(Debug, Clone, Copy)]
enum Owner {
    Own,
    Other,
    Missing,
}

fn role_strategy() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_threshold_rules_are_monotonic(threshold in role_strategy(), lower in role_strategy(), higher in role_strategy()) {
        prop_assume!(lower <= higher);

        let rules = RuleSet::new(vec![PolicyRule::new(
            "t.read",
            "t",
            Operation::Read,
            RoleRequirement::AtLeast(threshold),
        )])
        .unwrap();

        let store = InMemoryProfileStore::with_profiles([profile("lo", lower), profile("hi", higher)]);
        let evaluator = evaluator(store, rules);

        let (lo, hi) = tokio_test::block_on(async {
            let lo = evaluator.authorize(&AuthzRequest::new(actor("lo"), Operation::Read, "t")).await;
            let hi = evaluator.authorize(&AuthzRequest::new(actor("hi"), Operation::Read, "t")).await;
            (lo, hi)
        });

        prop_assert_eq!(lo.allowed(), lower >= threshold);
        if lo.allowed() {
            prop_assert!(hi.allowed());
        }
    }

    #[test]
    fn prop_builtin_table_grants_grow_with_role(
        lower in role_strategy(),
        higher in role_strategy(),
        table in prop::sample::select(TABLES.to_vec()),
        operation in prop::sample::select(OPERATIONS.to_vec()),
        owner in prop::sample::select(vec![Owner::Own, Owner::Other, Owner::Missing]),
        state in prop::sample::select(vec![None, Some("pending"), Some("paid")]),
    ) {
        prop_assume!(lower <= higher);

        let evaluator = default_evaluator(vec![
            profile("lo", lower),
            profile("hi", higher),
            profile("other", Role::User),
        ]);
        let request_for = |id: &str| {
            let request = AuthzRequest::new(actor(id), operation, table);
            let request = match owner {
                Owner::Own => request.owned_by(actor(id)),
                Owner::Other => request.owned_by(actor("other")),
                Owner::Missing => request,
            };
            match state {
                Some(state) => request.in_state(state),
                None => request,
            }
        };

        let (lo, hi) = tokio_test::block_on(async {
            let lo = evaluator.authorize(&request_for("lo")).await;
            let hi = evaluator.authorize(&request_for("hi")).await;
            (lo, hi)
        });

        if lo.allowed() {
            prop_assert!(
                hi.allowed(),
                "{:?} may {}.{} but {:?} is denied: {:?}",
                lower,
                table,
                operation,
                higher,
                hi.decision
            );
        }
    }
}

// ============================================================================
// OWNERSHIP AND STATE
// ============================================================================

#[tokio::test]
async fn test_owner_or_above_for_plain_user() {
    let evaluator = default_evaluator(vec![profile("u", Role::User)]);

    let own = AuthzRequest::new(actor("u"), Operation::Read, "remittances").owned_by(actor("u"));
    assert!(evaluator.authorize(&own).await.allowed());

    let foreign = AuthzRequest::new(actor("u"), Operation::Read, "remittances").owned_by(actor("v"));
    assert_eq!(
        evaluator.authorize(&foreign).await.decision,
        Decision::Deny(DenyReason::NotOwner)
    );
}

#[tokio::test]
async fn test_bypass_role_reads_foreign_rows() {
    let evaluator = default_evaluator(vec![profile("m", Role::Manager)]);
    let request = AuthzRequest::new(actor("m"), Operation::Read, "remittances").owned_by(actor("u"));

    let decision = evaluator.authorize(&request).await;
    assert!(decision.allowed());
    assert_eq!(decision.rule_id.as_deref(), Some("remittances.read"));
}

#[tokio::test]
async fn test_missing_owner_on_ownership_rule() {
    let evaluator = default_evaluator(vec![profile("root", Role::SuperAdmin)]);
    let request = AuthzRequest::new(actor("root"), Operation::Read, "remittance_status_history");

    assert_eq!(
        evaluator.authorize(&request).await.decision,
        Decision::Deny(DenyReason::MissingOwnership)
    );
}

#[tokio::test]
async fn test_owner_edits_only_pending_remittances() {
    let evaluator = default_evaluator(vec![profile("u", Role::User)]);

    let pending = AuthzRequest::new(actor("u"), Operation::Update, "remittances")
        .owned_by(actor("u"))
        .in_state("pending");
    let decision = evaluator.authorize(&pending).await;
    assert!(decision.allowed());
    assert_eq!(decision.rule_id.as_deref(), Some("remittances.update.owner"));

    let paid = AuthzRequest::new(actor("u"), Operation::Update, "remittances")
        .owned_by(actor("u"))
        .in_state("paid");
    assert_eq!(
        evaluator.authorize(&paid).await.decision,
        Decision::Deny(DenyReason::InvalidState)
    );

    let stateless = AuthzRequest::new(actor("u"), Operation::Update, "remittances").owned_by(actor("u"));
    assert_eq!(
        evaluator.authorize(&stateless).await.decision,
        Decision::Deny(DenyReason::InvalidState)
    );
}

#[tokio::test]
async fn test_narrower_staff_rule_governs_managers() {
    let evaluator = default_evaluator(vec![profile("m", Role::Manager)]);
    let request = AuthzRequest::new(actor("m"), Operation::Update, "remittances")
        .owned_by(actor("u"))
        .in_state("paid");

    let decision = evaluator.authorize(&request).await;
    assert!(decision.allowed());
    assert_eq!(decision.rule_id.as_deref(), Some("remittances.update.staff"));
}

#[tokio::test]
async fn test_rules_are_not_or_combined() {
    // The exact rule is narrower for super_admin and carries its own state
    // restriction; the broader rule must not rescue a mismatch.
    let rules = RuleSet::new(vec![
        PolicyRule::new("broad", "ledger", Operation::Update, RoleRequirement::AtLeast(Role::User)),
        PolicyRule::new("root", "ledger", Operation::Update, RoleRequirement::Exactly(Role::SuperAdmin))
            .with_ownership(OwnershipRequirement::owner_only())
            .with_states(["open"]),
    ])
    .unwrap();
    let evaluator = evaluator(
        InMemoryProfileStore::with_profiles([profile("root", Role::SuperAdmin), profile("u", Role::User)]),
        rules,
    );

    let request = AuthzRequest::new(actor("root"), Operation::Update, "ledger")
        .owned_by(actor("u"))
        .in_state("open");
    let decision = evaluator.authorize(&request).await;
    assert_eq!(decision.decision, Decision::Deny(DenyReason::NotOwner));
    assert_eq!(decision.rule_id.as_deref(), Some("root"));

    let as_user = AuthzRequest::new(actor("u"), Operation::Update, "ledger");
    assert!(evaluator.authorize(&as_user).await.allowed());
}

#[tokio::test]
async fn test_decisions_are_independent() {
    let evaluator = default_evaluator(vec![profile("u", Role::User)]);
    let request = AuthzRequest::new(actor("u"), Operation::Read, "remittance_types");

    let first = evaluator.authorize(&request).await;
    let second = evaluator.authorize(&request).await;
    assert_eq!(first.decision, second.decision);
    assert_ne!(first.id, second.id, "every call is a fresh decision");
}

#[tokio::test]
async fn test_concurrent_decisions() {
    let profiles: Vec<Profile> = (0..50)
        .map(|i| profile(&format!("actor-{}", i), Role::ALL[i % 4]))
        .collect();
    let evaluator = default_evaluator(profiles);

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let evaluator = evaluator.clone();
            tokio::spawn(async move {
                let request = AuthzRequest::new(
                    actor(&format!("actor-{}", i)),
                    Operation::Create,
                    "remittance_types",
                );
                (i, evaluator.authorize(&request).await)
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        let (i, decision) = task.unwrap();
        assert_eq!(decision.allowed(), Role::ALL[i % 4] >= Role::Admin);
    }
}

#[test]
fn test_shipped_rule_file_matches_builtin_table() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/rules.toml");
    let from_file = RuleSet::load(path).unwrap();
    assert_eq!(from_file, RuleSet::remittance_defaults());
}
