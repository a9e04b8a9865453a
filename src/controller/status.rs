//! Binding status projection and PolicyServer condition management
//!
//! The projector is a pure function of the binding spec and the referenced
//! PolicyServer (or its absence); the reconcilers call it on every pass and
//! only write the result when it differs from the stored status.

use chrono::Utc;

use crate::crd::{Condition, PolicyServer, PolicySpec, PolicyState};

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// The worker pool has all desired replicas ready
    pub const READY: &str = "Ready";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Project the scheduling state of a binding from its spec and the current
/// state of the PolicyServer it references.
///
/// Absence of the pool is a state (`unschedulable`), not an error: the pool
/// may be created later, and the periodic resync re-projects the status.
pub fn project(spec: &PolicySpec, policy_server: Option<&PolicyServer>) -> PolicyState {
    if spec.policy_server.is_empty() {
        return PolicyState::Unscheduled;
    }

    match policy_server {
        None => PolicyState::Unschedulable,
        Some(server) if server.is_ready() => PolicyState::Active,
        Some(_) => PolicyState::Scheduled,
    }
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            conditions: Vec::new(),
            generation,
        }
    }

    /// Create from existing conditions
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    ///
    /// The transition timestamp only moves when the condition's status flips,
    /// so repeated reconciles with an unchanged outcome produce an identical
    /// conditions list and the status write is skipped.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the Ready condition
    pub fn ready(self, is_ready: bool, reason: &str, message: &str) -> Self {
        let status = if is_ready {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::READY, status, reason, message)
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}
