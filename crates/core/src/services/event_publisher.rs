//! Event publisher service.
//!
//! Provides an abstraction for publishing poll room events.
//! The live implementation is [`BroadcastCoordinator`](super::BroadcastCoordinator).

use async_trait::async_trait;
use pollhub_common::AppResult;
use pollhub_db::entities::room_poll::RoomPollStatus;
use std::fmt;
use std::sync::Arc;

use crate::tally::Tally;

/// Identifies the viewers of one poll inside one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub room_id: String,
    pub poll_id: String,
}

impl ChannelKey {
    #[must_use]
    pub fn new(room_id: impl Into<String>, poll_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            poll_id: poll_id.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room {} / poll {}", self.room_id, self.poll_id)
    }
}

/// Events delivered to the viewers of a poll room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollRoomEvent {
    /// Another viewer joined the channel.
    ViewerJoined {
        poll_id: String,
        user_id: String,
        user_name: String,
    },
    /// The tally changed.
    TallyUpdated { poll_id: String, tally: Tally },
    /// The lifecycle status changed.
    StatusChanged {
        poll_id: String,
        status: RoomPollStatus,
        message: Option<String>,
    },
}

/// Trait for publishing poll room events.
///
/// This allows the core services to publish events
/// without depending on the WebSocket transport.
#[async_trait]
pub trait PollEventPublisher: Send + Sync {
    /// Publish a freshly computed tally.
    async fn publish_tally_updated(&self, key: &ChannelKey, tally: Tally) -> AppResult<()>;

    /// Publish a lifecycle status change.
    async fn publish_status_changed(
        &self,
        key: &ChannelKey,
        status: RoomPollStatus,
        message: Option<&str>,
    ) -> AppResult<()>;
}

/// A no-op implementation for tests or when live updates are disabled.
#[derive(Clone, Default)]
pub struct NoOpPollEventPublisher;

#[async_trait]
impl PollEventPublisher for NoOpPollEventPublisher {
    async fn publish_tally_updated(&self, _key: &ChannelKey, _tally: Tally) -> AppResult<()> {
        Ok(())
    }

    async fn publish_status_changed(
        &self,
        _key: &ChannelKey,
        _status: RoomPollStatus,
        _message: Option<&str>,
    ) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed PollEventPublisher trait object.
pub type PollEventPublisherService = Arc<dyn PollEventPublisher>;
