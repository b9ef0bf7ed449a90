//! Session Collaborators
//!
//! Interfaces and default implementations for everything the session talks
//! to: HTTP, discovery, PKCE/state generation, and the external user agent.

pub mod discovery;
pub mod form;
pub mod pkce;
pub mod transport;
pub mod user_agent;

pub use discovery::*;
pub use form::*;
pub use pkce::*;
pub use transport::*;
pub use user_agent::*;
