//! Core business logic for pollhub.
//!
//! - [`lifecycle`]: the room poll state machine as a pure value type
//! - [`tally`]: per-option vote counts
//! - [`services`]: database-backed operations and the live broadcast coordinator
//! - [`scheduler`]: the periodic expiry sweep

pub mod identity;
pub mod lifecycle;
pub mod scheduler;
pub mod services;
pub mod tally;

pub use identity::Identity;
pub use lifecycle::{PollLifecycle, Transition, TransitionError};
pub use services::*;
pub use tally::Tally;
