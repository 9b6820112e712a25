//! Repositories wrapping sea-orm queries.
//!
//! Methods that take an explicit `conn` parameter accept either the shared
//! connection or an open transaction, so services can group several reads
//! and a write into one atomic unit.

pub mod poll;
pub mod room;
pub mod room_poll;
pub mod user;
pub mod vote;

pub use poll::{PollRepository, PollWithLifecycle};
pub use room::RoomRepository;
pub use room_poll::{LifecycleUpdate, RoomPollRepository};
pub use user::UserRepository;
pub use vote::{OptionCount, PollOptionCount, VoteRepository, is_unique_violation};
