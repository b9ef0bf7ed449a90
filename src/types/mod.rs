//! Session Types
//!
//! Core type definitions for the session manager.

pub mod auth;
pub mod callback;
pub mod config;
pub mod introspection;
pub mod token;

pub use auth::*;
pub use callback::*;
pub use config::*;
pub use introspection::*;
pub use token::*;
