//! Token Lifecycle
//!
//! Persistence, refresh, revocation and introspection of the session's tokens.

pub mod introspection;
pub mod persistence;
pub mod refresh;
pub mod revocation;

pub use introspection::*;
pub use persistence::*;
pub use refresh::*;
pub use revocation::*;
