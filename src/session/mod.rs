//! Session
//!
//! The session store and the public session surface built on it.

pub mod context;
pub mod query;
pub mod resume;
pub mod store;

pub use context::{AuthSession, AuthSessionBuilder};
pub use query::SessionQueryFacade;
pub use resume::ResumeDispatcher;
pub use store::SessionStore;
