//! Lifecycle service: start, close and expire room polls.

use chrono::{DateTime, Utc};
use pollhub_common::{AppError, AppResult};
use pollhub_db::{
    entities::room_poll::{self, RoomPollStatus},
    repositories::{RoomPollRepository, RoomRepository},
};
use tracing::{info, warn};

use super::event_publisher::{ChannelKey, PollEventPublisherService};
use crate::identity::Identity;
use crate::lifecycle::{PollLifecycle, Transition};

/// Drives room polls through `pending -> active -> closed`.
#[derive(Clone)]
pub struct LifecycleService {
    room_repo: RoomRepository,
    room_poll_repo: RoomPollRepository,
    publisher: PollEventPublisherService,
}

impl LifecycleService {
    #[must_use]
    pub fn new(
        room_repo: RoomRepository,
        room_poll_repo: RoomPollRepository,
        publisher: PollEventPublisherService,
    ) -> Self {
        Self {
            room_repo,
            room_poll_repo,
            publisher,
        }
    }

    /// Open voting on a pending room poll. Room admin only.
    pub async fn start(
        &self,
        identity: &Identity,
        room_id: &str,
        poll_id: &str,
    ) -> AppResult<room_poll::Model> {
        self.transition(identity, room_id, poll_id, Transition::Start, Utc::now())
            .await
    }

    /// End voting on an active room poll. Room admin only.
    pub async fn close(
        &self,
        identity: &Identity,
        room_id: &str,
        poll_id: &str,
    ) -> AppResult<room_poll::Model> {
        self.transition(identity, room_id, poll_id, Transition::Close, Utc::now())
            .await
    }

    async fn transition(
        &self,
        identity: &Identity,
        room_id: &str,
        poll_id: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> AppResult<room_poll::Model> {
        let room = self.room_repo.get_by_id(room_id).await?;
        if !room.is_admin(&identity.user_id) {
            return Err(AppError::Forbidden(format!(
                "Only the room admin can {transition} polls"
            )));
        }

        let record = self
            .room_poll_repo
            .find_in_room(room_id, poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found in room: {poll_id}")))?;

        // An expired poll is closed whether or not the expiry was persisted yet
        let record = self.refresh(&record, now).await?;
        let current = PollLifecycle::from_model(&record);
        let next = current.apply(transition, now)?;

        let updated = self
            .room_poll_repo
            .update_if_status(poll_id, current.status, next.update())
            .await?;
        if !updated {
            return Err(AppError::Conflict(format!(
                "Poll {poll_id} changed status concurrently"
            )));
        }

        info!(
            room_id,
            poll_id,
            user_id = %identity.user_id,
            from = %current.status,
            to = %next.status,
            "Poll status changed"
        );
        self.announce(&record, next.status, transition).await;

        Ok(next.to_model(&record))
    }

    /// Persist an expiry observed on `record`, if any.
    ///
    /// Returns the record as it stands at `now`. Viewers are notified only
    /// by the caller whose conditional update performed the close.
    pub async fn refresh(
        &self,
        record: &room_poll::Model,
        now: DateTime<Utc>,
    ) -> AppResult<room_poll::Model> {
        self.expire(record, now).await.map(|(current, _)| current)
    }

    /// Close every active poll past its deadline.
    ///
    /// Returns how many this call closed; polls another writer closed first
    /// are not counted.
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut closed = 0;
        for record in self.room_poll_repo.find_active().await? {
            if !PollLifecycle::from_model(&record).is_expired(now) {
                continue;
            }
            let (_, won) = self.expire(&record, now).await?;
            if won {
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Apply a due expiry. The flag is true when this call wrote it.
    async fn expire(
        &self,
        record: &room_poll::Model,
        now: DateTime<Utc>,
    ) -> AppResult<(room_poll::Model, bool)> {
        let current = PollLifecycle::from_model(record);
        let Ok(expired) = current.apply(Transition::Expire, now) else {
            return Ok((record.clone(), false));
        };

        let updated = self
            .room_poll_repo
            .update_if_status(&record.poll_id, RoomPollStatus::Active, expired.update())
            .await?;
        if updated {
            info!(
                room_id = %record.room_id,
                poll_id = %record.poll_id,
                "Poll expired"
            );
            self.announce(record, expired.status, Transition::Expire).await;
        }

        Ok((expired.to_model(record), updated))
    }

    async fn announce(&self, record: &room_poll::Model, status: RoomPollStatus, transition: Transition) {
        let key = ChannelKey::new(&record.room_id, &record.poll_id);
        if let Err(e) = self
            .publisher
            .publish_status_changed(&key, status, Some(transition.message()))
            .await
        {
            warn!(error = %e, channel = %key, "Failed to publish status change");
        }
    }
}
