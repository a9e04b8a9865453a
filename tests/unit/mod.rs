//! Unit tests for the policy operator
//!
//! This module contains unit tests for:
//! - Admission validation (rule completeness, policyServer immutability)
//! - Finalizer defaulting patches
//! - Binding status projection and PolicyServer conditions
//! - The pool-to-bindings reverse index
//! - Worker runtime configuration rendering
//! - Webhook request handling and response shaping

#[path = "../common/mod.rs"]
mod common;

mod index;
mod status;
