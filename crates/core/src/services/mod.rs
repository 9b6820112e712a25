//! Business logic services.

pub mod broadcast;
pub mod event_publisher;
pub mod lifecycle;
pub mod poll;
pub mod tally;
pub mod user;
pub mod vote;

pub use broadcast::{BroadcastCoordinator, SessionId};
pub use event_publisher::{
    ChannelKey, NoOpPollEventPublisher, PollEventPublisher, PollEventPublisherService,
    PollRoomEvent,
};
pub use lifecycle::LifecycleService;
pub use poll::{CreateGlobalPollInput, CreateRoomPollInput, PollService, PollView, RoomPollView};
pub use tally::TallyService;
pub use user::UserService;
pub use vote::{RecordedVote, VoteScope, VoteService};
