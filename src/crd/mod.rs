mod policy;
mod policy_server;

pub use policy::*;
pub use policy_server::*;

/// Deletion-guard finalizer injected by the mutating webhook and repaired
/// by the reconcilers. Cleanup must complete before this token is removed.
pub const FINALIZER: &str = "policies.example.com/finalizer";
