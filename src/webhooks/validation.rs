//! Validation stage for policy bindings
//!
//! Pure structural checks over the submitted spec and, for updates, the
//! previously stored spec. No external state is consulted, so every check
//! is deterministic and unit-testable without a running server.
//!
//! On update the immutability check runs before the rules check; on create
//! only the rules check applies. Deletions are never validated.

use crate::crd::PolicySpec;

/// Result of a validation check
#[derive(Debug)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
        }
    }

    pub fn denied(reason: &str, message: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }
    }
}

/// Validate a binding spec against its stored version.
///
/// `old_policy` is `None` on create and the stored spec on update.
pub fn validate_policy(policy: &PolicySpec, old_policy: Option<&PolicySpec>) -> ValidationResult {
    let result = validate_policy_server_immutable(policy, old_policy);
    if !result.allowed {
        return result;
    }

    validate_rules(policy)
}

/// The policyServer reference cannot change after creation: runtime wiring
/// is keyed on it, so rebinding requires delete and recreate.
pub fn validate_policy_server_immutable(
    policy: &PolicySpec,
    old_policy: Option<&PolicySpec>,
) -> ValidationResult {
    let Some(old) = old_policy else {
        return ValidationResult::allowed();
    };

    if old.policy_server != policy.policy_server {
        return ValidationResult::denied(
            "PolicyServerImmutable",
            &format!(
                "spec.policyServer is immutable: cannot change from '{}' to '{}'; \
                 delete and recreate the policy to rebind it",
                old.policy_server, policy.policy_server
            ),
        );
    }

    ValidationResult::allowed()
}

/// A binding must carry at least one rule that can match requests, i.e. a
/// rule naming at least one operation and at least one resource.
pub fn validate_rules(policy: &PolicySpec) -> ValidationResult {
    if policy.rules.is_empty() {
        return ValidationResult::denied(
            "InvalidRules",
            "spec.rules must specify at least one rule",
        );
    }

    if policy.rules.iter().any(|rule| rule.is_complete()) {
        return ValidationResult::allowed();
    }

    let index = policy
        .rules
        .iter()
        .position(|rule| !rule.is_complete())
        .unwrap_or(0);

    ValidationResult::denied(
        "InvalidRules",
        &format!(
            "spec.rules[{}] must specify at least one operation and at least one resource",
            index
        ),
    )
}
