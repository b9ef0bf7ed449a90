//! Authorization Flows
//!
//! Interactive login, password login and browser sign-out.

pub mod controller;
pub mod pending;

pub use controller::AuthorizationFlowController;
pub use pending::{FlowState, PendingAuthorizationSession, PendingSlot};
