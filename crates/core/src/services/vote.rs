//! Vote service: the vote ledger's write path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pollhub_common::{AppError, AppResult, IdGenerator};
use pollhub_db::{
    entities::{room_poll, room_poll::RoomPollStatus, vote},
    repositories::{PollRepository, RoomPollRepository, RoomRepository, VoteRepository},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{debug, info, warn};

use super::event_publisher::{ChannelKey, PollEventPublisherService};
use super::lifecycle::LifecycleService;
use super::tally::TallyService;
use crate::identity::Identity;
use crate::lifecycle::{PollLifecycle, global_poll_is_open};
use crate::tally::Tally;

/// Which endpoint a vote arrived through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteScope {
    /// `/rooms/{room_id}/polls/{poll_id}/vote`
    Room { room_id: String },
    /// `/polls/{poll_id}/vote`
    Global,
}

/// A vote accepted into the ledger.
#[derive(Debug, Clone)]
pub struct RecordedVote {
    pub vote: vote::Model,
    /// Tally right after the vote, if it could be computed.
    pub tally: Option<Tally>,
}

enum Attempt {
    Recorded(vote::Model),
    Expired(room_poll::Model),
}

/// Records votes and announces the resulting tallies.
#[derive(Clone)]
pub struct VoteService {
    db: Arc<DatabaseConnection>,
    poll_repo: PollRepository,
    room_repo: RoomRepository,
    room_poll_repo: RoomPollRepository,
    vote_repo: VoteRepository,
    tally: TallyService,
    lifecycle: LifecycleService,
    publisher: PollEventPublisherService,
    vote_timeout: Duration,
    id_gen: IdGenerator,
}

impl VoteService {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        poll_repo: PollRepository,
        room_repo: RoomRepository,
        room_poll_repo: RoomPollRepository,
        vote_repo: VoteRepository,
        lifecycle: LifecycleService,
        publisher: PollEventPublisherService,
        vote_timeout: Duration,
    ) -> Self {
        Self {
            db,
            poll_repo,
            room_repo,
            room_poll_repo,
            tally: TallyService::new(vote_repo.clone()),
            vote_repo,
            lifecycle,
            publisher,
            vote_timeout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Record one vote.
    ///
    /// All checks and the insert run in a single transaction; the unique
    /// `(poll_id, user_id)` index decides between concurrent duplicates.
    /// Room viewers receive the recomputed tally after commit.
    pub async fn record_vote(
        &self,
        identity: &Identity,
        poll_id: &str,
        option: i32,
        scope: VoteScope,
    ) -> AppResult<RecordedVote> {
        let now = Utc::now();
        let attempt = tokio::time::timeout(
            self.vote_timeout,
            self.try_record(identity, poll_id, option, &scope, now),
        )
        .await
        .map_err(|_| {
            warn!(poll_id, user_id = %identity.user_id, "Vote timed out");
            AppError::Timeout(format!("Recording vote on poll {poll_id}"))
        })??;

        let vote = match attempt {
            Attempt::Recorded(vote) => vote,
            Attempt::Expired(record) => {
                if let Err(e) = self.lifecycle.refresh(&record, now).await {
                    warn!(error = %e, poll_id, "Failed to persist poll expiry");
                }
                return Err(AppError::PollClosed(format!("Poll {poll_id} has ended")));
            }
        };

        info!(
            poll_id,
            user_id = %identity.user_id,
            option = vote.option_selected,
            "Vote recorded"
        );

        let tally = match self.tally.compute(poll_id).await {
            Ok(tally) => Some(tally),
            Err(e) => {
                warn!(error = %e, poll_id, "Failed to compute tally after vote");
                None
            }
        };

        if let (VoteScope::Room { room_id }, Some(tally)) = (&scope, tally) {
            let key = ChannelKey::new(room_id, poll_id);
            if let Err(e) = self.publisher.publish_tally_updated(&key, tally).await {
                warn!(error = %e, channel = %key, "Failed to publish tally");
            }
        }

        Ok(RecordedVote { vote, tally })
    }

    async fn try_record(
        &self,
        identity: &Identity,
        poll_id: &str,
        option: i32,
        scope: &VoteScope,
        now: DateTime<Utc>,
    ) -> AppResult<Attempt> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let poll = self
            .poll_repo
            .find_by_id_on(&txn, poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        // Room polls vote through their room, global polls through /polls
        match (scope, poll.room_id.as_deref()) {
            (VoteScope::Room { room_id }, Some(poll_room)) if poll_room == room_id => {}
            (VoteScope::Global, None) => {}
            _ => return Err(AppError::NotFound(format!("Poll not found: {poll_id}"))),
        }

        match scope {
            VoteScope::Room { .. } => {
                let record = self
                    .room_poll_repo
                    .find_for_vote_on(&txn, poll_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;
                let lifecycle = PollLifecycle::from_model(&record);
                if lifecycle.is_expired(now) {
                    return Ok(Attempt::Expired(record));
                }
                if lifecycle.status != RoomPollStatus::Active {
                    return Err(AppError::PollClosed(format!(
                        "Poll {poll_id} is {}",
                        lifecycle.status
                    )));
                }
            }
            VoteScope::Global => {
                if !global_poll_is_open(&poll, now) {
                    return Err(AppError::PollClosed(format!("Poll {poll_id} has ended")));
                }
            }
        }

        if poll.created_by == identity.user_id {
            return Err(AppError::Forbidden(
                "You cannot vote on your own poll".to_string(),
            ));
        }

        if let VoteScope::Room { room_id } = scope
            && !self
                .room_repo
                .is_member_on(&txn, room_id, &identity.user_id)
                .await?
        {
            return Err(AppError::Forbidden("Not a member of this room".to_string()));
        }

        if poll.option_label(option).is_none() {
            return Err(AppError::InvalidOption(format!(
                "Option {option} is not available on this poll"
            )));
        }

        let vote = vote::Model {
            id: self.id_gen.generate(),
            poll_id: poll.id.clone(),
            user_id: identity.user_id.clone(),
            option_selected: option,
            voted_at: now.into(),
        };
        self.vote_repo.insert_on(&txn, vote.clone()).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Attempt::Recorded(vote))
    }

    /// Recompute a room poll's tally from the ledger and send it to its viewers.
    pub async fn resync(&self, room_id: &str, poll_id: &str) -> AppResult<Tally> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if poll.room_id.as_deref() != Some(room_id) {
            return Err(AppError::NotFound(format!("Poll not found in room: {poll_id}")));
        }

        let tally = self.tally.compute(poll_id).await?;
        let key = ChannelKey::new(room_id, poll_id);
        self.publisher.publish_tally_updated(&key, tally).await?;
        debug!(channel = %key, total_votes = tally.total_votes, "Tally resynced");
        Ok(tally)
    }
}
