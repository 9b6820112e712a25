//! Live broadcast coordinator.
//!
//! Tracks which viewer sessions watch which (room, poll) channel and fans
//! events out to them. Each session owns one bounded queue, so events reach
//! a given viewer in publish order. A viewer whose queue is full misses the
//! event; nothing waits on a slow viewer.

use std::collections::HashMap;

use async_trait::async_trait;
use pollhub_common::AppResult;
use pollhub_db::entities::room_poll::RoomPollStatus;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use super::event_publisher::{ChannelKey, PollEventPublisher, PollRoomEvent};
use crate::tally::Tally;

/// Identifies one viewer connection.
pub type SessionId = String;

#[derive(Default)]
struct Channels {
    viewers: HashMap<ChannelKey, HashMap<SessionId, mpsc::Sender<PollRoomEvent>>>,
    sessions: HashMap<SessionId, ChannelKey>,
}

impl Channels {
    fn remove_session(&mut self, session_id: &str) -> Option<ChannelKey> {
        let key = self.sessions.remove(session_id)?;
        if let Some(viewers) = self.viewers.get_mut(&key) {
            viewers.remove(session_id);
            if viewers.is_empty() {
                self.viewers.remove(&key);
            }
        }
        Some(key)
    }
}

/// Fan-out of poll room events to connected viewers.
pub struct BroadcastCoordinator {
    channels: RwLock<Channels>,
    buffer: usize,
}

impl BroadcastCoordinator {
    /// Create a coordinator giving each viewer a queue of `buffer` events.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: RwLock::new(Channels::default()),
            buffer: buffer.max(1),
        }
    }

    /// Subscribe a session to a channel.
    ///
    /// A session watches at most one channel; joining another moves it.
    /// Viewers already in the channel are told who joined.
    pub async fn join(
        &self,
        key: ChannelKey,
        session_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> mpsc::Receiver<PollRoomEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut channels = self.channels.write().await;

        if let Some(previous) = channels.remove_session(session_id) {
            debug!(session_id, channel = %previous, "Viewer moved to another channel");
        }

        let joined = PollRoomEvent::ViewerJoined {
            poll_id: key.poll_id.clone(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        };
        if let Some(viewers) = channels.viewers.get(&key) {
            for sender in viewers.values() {
                let _ = sender.try_send(joined.clone());
            }
        }

        channels
            .viewers
            .entry(key.clone())
            .or_default()
            .insert(session_id.to_string(), tx);
        channels.sessions.insert(session_id.to_string(), key.clone());

        info!(session_id, user_id, channel = %key, "Viewer joined");
        rx
    }

    /// Unsubscribe a session. Returns the channel it left, if any.
    pub async fn leave(&self, session_id: &str) -> Option<ChannelKey> {
        let key = self.channels.write().await.remove_session(session_id);
        if let Some(ref key) = key {
            info!(session_id, channel = %key, "Viewer left");
        }
        key
    }

    /// The channel a session currently watches.
    pub async fn channel_of(&self, session_id: &str) -> Option<ChannelKey> {
        self.channels.read().await.sessions.get(session_id).cloned()
    }

    /// Deliver an event to every viewer of a channel.
    ///
    /// Returns the number of viewers the event was queued for.
    pub async fn publish(&self, key: &ChannelKey, event: PollRoomEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let channels = self.channels.read().await;
            let Some(viewers) = channels.viewers.get(key) else {
                return 0;
            };

            for (session_id, sender) in viewers {
                match sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(session_id, channel = %key, "Viewer queue full, dropping event");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(session_id.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut channels = self.channels.write().await;
            for session_id in &closed {
                // The session may have rejoined with a fresh queue meanwhile
                let stale = channels
                    .viewers
                    .get(key)
                    .and_then(|viewers| viewers.get(session_id))
                    .is_some_and(mpsc::Sender::is_closed);
                if stale {
                    channels.remove_session(session_id);
                    debug!(session_id, channel = %key, "Pruned disconnected viewer");
                }
            }
        }

        delivered
    }

    /// Number of viewers watching a channel.
    pub async fn viewer_count(&self, key: &ChannelKey) -> usize {
        self.channels
            .read()
            .await
            .viewers
            .get(key)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl PollEventPublisher for BroadcastCoordinator {
    async fn publish_tally_updated(&self, key: &ChannelKey, tally: Tally) -> AppResult<()> {
        let delivered = self
            .publish(
                key,
                PollRoomEvent::TallyUpdated {
                    poll_id: key.poll_id.clone(),
                    tally,
                },
            )
            .await;
        debug!(channel = %key, delivered, total_votes = tally.total_votes, "Published tally");
        Ok(())
    }

    async fn publish_status_changed(
        &self,
        key: &ChannelKey,
        status: RoomPollStatus,
        message: Option<&str>,
    ) -> AppResult<()> {
        let delivered = self
            .publish(
                key,
                PollRoomEvent::StatusChanged {
                    poll_id: key.poll_id.clone(),
                    status,
                    message: message.map(ToString::to_string),
                },
            )
            .await;
        debug!(channel = %key, delivered, %status, "Published status change");
        Ok(())
    }
}
