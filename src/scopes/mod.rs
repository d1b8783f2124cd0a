//! Scopes: ownership domains for task trees, plus their failure policies.

mod policy;
mod scope;

pub use policy::Policy;
pub use scope::{Scope, ScopeBuilder};

pub(crate) use scope::{FailureHandler, ScopeShared};
