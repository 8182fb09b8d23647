//! Session and identity
//!
//! Handles:
//! - Identity checks against the backend
//! - Sign-up, sign-in, and sign-out flows
//! - The persisted session hint

mod hint;
mod session;

pub use hint::SessionHint;
pub use session::{SessionState, SessionStore, SharedSession};
