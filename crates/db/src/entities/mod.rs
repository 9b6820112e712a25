//! Database entities.

pub mod poll;
pub mod room;
pub mod room_member;
pub mod room_poll;
pub mod user;
pub mod vote;

pub use poll::Entity as Poll;
pub use room::Entity as Room;
pub use room_member::Entity as RoomMember;
pub use room_poll::Entity as RoomPoll;
pub use user::Entity as User;
pub use vote::Entity as Vote;
