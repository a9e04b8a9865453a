pub mod context;
pub mod error;
pub mod index;
pub mod policy_reconciler;
pub mod policy_server_reconciler;
pub mod status;

pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use index::{bindings_referencing, collect_binding_refs};
pub use policy_reconciler::{error_policy, reconcile_policy};
pub use policy_server_reconciler::{policy_server_error_policy, reconcile_policy_server};
pub use status::{ConditionBuilder, project};
