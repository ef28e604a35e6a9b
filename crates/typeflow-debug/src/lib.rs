//! Typeflow Debug
//!
//! Step-wise execution over persisted debug sessions: breakpoint
//! enforcement, pause-state persistence, step/continue/terminate.

mod controller;
mod error;

pub use controller::DebugController;
pub use error::DebugError;
