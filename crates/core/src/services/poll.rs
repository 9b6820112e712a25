//! Poll service: creation, listings, results and deletion.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use pollhub_common::{AppError, AppResult, IdGenerator};
use pollhub_db::{
    entities::{
        poll,
        room,
        room_poll::{self, RoomPollStatus},
    },
    repositories::{
        PollRepository, PollWithLifecycle, RoomPollRepository, RoomRepository, UserRepository,
        VoteRepository,
    },
};
use sea_orm::{Set, prelude::DateTimeWithTimeZone};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::lifecycle::LifecycleService;
use super::tally::TallyService;
use crate::identity::Identity;
use crate::lifecycle::{PollLifecycle, global_poll_is_open};
use crate::tally::Tally;

/// Input for creating a room poll.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomPollInput {
    #[validate(length(min = 1, max = 512))]
    pub question: String,
    #[validate(length(min = 1, max = 256))]
    pub option1: String,
    #[validate(length(min = 1, max = 256))]
    pub option2: String,
    #[validate(length(max = 256))]
    pub option3: Option<String>,
    #[validate(length(max = 256))]
    pub option4: Option<String>,
    #[validate(length(max = 2048))]
    pub image: Option<String>,
    #[validate(range(min = 1))]
    pub duration_minutes: i32,
}

/// Input for creating a global poll.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGlobalPollInput {
    #[validate(length(min = 1, max = 512))]
    pub question: String,
    #[validate(length(min = 1, max = 256))]
    pub option1: String,
    #[validate(length(min = 1, max = 256))]
    pub option2: String,
    #[validate(length(max = 256))]
    pub option3: Option<String>,
    #[validate(length(max = 256))]
    pub option4: Option<String>,
    #[validate(length(max = 2048))]
    pub image: Option<String>,
    pub end_time: DateTime<Utc>,
}

/// A room poll as shown to room viewers.
#[derive(Debug, Clone, Serialize)]
pub struct RoomPollView {
    #[serde(flatten)]
    pub poll: poll::Model,
    pub poll_status: RoomPollStatus,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub closed_at: Option<DateTimeWithTimeZone>,
    pub duration_minutes: i32,
    #[serde(flatten)]
    pub tally: Tally,
    pub user_voted: bool,
    pub user_vote: Option<i32>,
    pub creator_username: Option<String>,
}

/// A poll with its tally and the caller's own vote.
#[derive(Debug, Clone, Serialize)]
pub struct PollView {
    #[serde(flatten)]
    pub poll: poll::Model,
    #[serde(flatten)]
    pub tally: Tally,
    pub user_vote: Option<i32>,
    pub has_ended: bool,
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    room_repo: RoomRepository,
    room_poll_repo: RoomPollRepository,
    vote_repo: VoteRepository,
    user_repo: UserRepository,
    tally: TallyService,
    lifecycle: LifecycleService,
    max_duration_minutes: i32,
    id_gen: IdGenerator,
}

/// Trimmed text, or `None` when blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_text(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

/// Normalised option3/option4. Options fill in order, so option4 needs option3.
fn trailing_options(
    option3: Option<String>,
    option4: Option<String>,
) -> AppResult<(Option<String>, Option<String>)> {
    let (option3, option4) = (non_blank(option3), non_blank(option4));
    if option3.is_none() && option4.is_some() {
        return Err(AppError::Validation("option4 requires option3".to_string()));
    }
    Ok((option3, option4))
}

impl PollService {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        poll_repo: PollRepository,
        room_repo: RoomRepository,
        room_poll_repo: RoomPollRepository,
        vote_repo: VoteRepository,
        user_repo: UserRepository,
        lifecycle: LifecycleService,
        max_duration_minutes: i32,
    ) -> Self {
        Self {
            poll_repo,
            room_repo,
            room_poll_repo,
            tally: TallyService::new(vote_repo.clone()),
            vote_repo,
            user_repo,
            lifecycle,
            max_duration_minutes,
            id_gen: IdGenerator::new(),
        }
    }

    async fn viewable_room(&self, identity: &Identity, room_id: &str) -> AppResult<room::Model> {
        let room = self.room_repo.get_by_id(room_id).await?;
        if !self.room_repo.can_view(&room, &identity.user_id).await? {
            return Err(AppError::Forbidden("Access denied".to_string()));
        }
        Ok(room)
    }

    /// Create a pending poll in a room. Room admin only.
    pub async fn create_room_poll(
        &self,
        identity: &Identity,
        room_id: &str,
        input: CreateRoomPollInput,
    ) -> AppResult<RoomPollView> {
        input.validate()?;

        let room = self.room_repo.get_by_id(room_id).await?;
        if !room.is_admin(&identity.user_id) {
            return Err(AppError::Forbidden(
                "Only the room admin can create polls".to_string(),
            ));
        }

        if input.duration_minutes > self.max_duration_minutes {
            return Err(AppError::Validation(format!(
                "duration_minutes must be at most {}",
                self.max_duration_minutes
            )));
        }

        let (option3, option4) = trailing_options(input.option3, input.option4)?;

        let now = Utc::now();
        let poll_id = self.id_gen.generate();
        let poll = poll::ActiveModel {
            id: Set(poll_id.clone()),
            question: Set(require_text("question", &input.question)?),
            option1: Set(require_text("option1", &input.option1)?),
            option2: Set(require_text("option2", &input.option2)?),
            option3: Set(option3),
            option4: Set(option4),
            image: Set(non_blank(input.image)),
            room_id: Set(Some(room_id.to_string())),
            created_by: Set(identity.user_id.clone()),
            created_at: Set(now.into()),
            // Informational only; the lifecycle decides when voting ends
            end_time: Set((now + Duration::minutes(i64::from(input.duration_minutes))).into()),
        };
        let lifecycle = PollLifecycle::pending(input.duration_minutes);
        let record = room_poll::ActiveModel {
            poll_id: Set(poll_id.clone()),
            room_id: Set(room_id.to_string()),
            status: Set(lifecycle.status),
            started_at: Set(None),
            closed_at: Set(None),
            duration_minutes: Set(lifecycle.duration_minutes),
        };

        let created = self.poll_repo.create_with_lifecycle(poll, record).await?;
        info!(room_id, poll_id = %poll_id, user_id = %identity.user_id, "Room poll created");

        Ok(Self::room_view(
            created,
            Tally::default(),
            None,
            Some(identity.display_name.clone()),
        ))
    }

    /// All polls of a room with status, tally and the caller's vote.
    ///
    /// Expired polls are closed (and announced) as a side effect.
    pub async fn list_room_polls(
        &self,
        identity: &Identity,
        room_id: &str,
    ) -> AppResult<Vec<RoomPollView>> {
        self.viewable_room(identity, room_id).await?;

        let now = Utc::now();
        let mut polls = self.poll_repo.find_by_room(room_id).await?;
        if polls.is_empty() {
            return Ok(vec![]);
        }

        for entry in &mut polls {
            if let Some(record) = entry.lifecycle.take() {
                entry.lifecycle = Some(self.lifecycle.refresh(&record, now).await?);
            }
        }

        let ids: Vec<String> = polls.iter().map(|p| p.poll.id.clone()).collect();
        let tallies = self.tally.compute_many(&ids).await?;
        let own_votes = self.own_votes(identity, &ids).await?;

        let mut creator_ids: Vec<String> = polls.iter().map(|p| p.poll.created_by.clone()).collect();
        creator_ids.sort();
        creator_ids.dedup();
        let creators: HashMap<String, String> = self
            .user_repo
            .find_by_ids(&creator_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u.username))
            .collect();

        Ok(polls
            .into_iter()
            .map(|entry| {
                let tally = tallies.get(&entry.poll.id).copied().unwrap_or_default();
                let user_vote = own_votes.get(&entry.poll.id).copied();
                let creator = creators.get(&entry.poll.created_by).cloned();
                Self::room_view(entry, tally, user_vote, creator)
            })
            .collect())
    }

    /// Check that the caller may watch a room poll live.
    pub async fn authorize_viewer(
        &self,
        identity: &Identity,
        room_id: &str,
        poll_id: &str,
    ) -> AppResult<()> {
        self.viewable_room(identity, room_id).await?;
        self.room_poll_repo
            .find_in_room(room_id, poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found in room: {poll_id}")))?;
        Ok(())
    }

    /// Create a global poll. Site admins only.
    pub async fn create_global_poll(
        &self,
        identity: &Identity,
        input: CreateGlobalPollInput,
    ) -> AppResult<PollView> {
        if !identity.is_admin {
            return Err(AppError::Forbidden("Admin only".to_string()));
        }
        input.validate()?;

        let now = Utc::now();
        if input.end_time <= now {
            return Err(AppError::Validation(
                "end_time must be in the future".to_string(),
            ));
        }
        let (option3, option4) = trailing_options(input.option3, input.option4)?;

        let model = poll::ActiveModel {
            id: Set(self.id_gen.generate()),
            question: Set(require_text("question", &input.question)?),
            option1: Set(require_text("option1", &input.option1)?),
            option2: Set(require_text("option2", &input.option2)?),
            option3: Set(option3),
            option4: Set(option4),
            image: Set(non_blank(input.image)),
            room_id: Set(None),
            created_by: Set(identity.user_id.clone()),
            created_at: Set(now.into()),
            end_time: Set(input.end_time.into()),
        };

        let poll = self.poll_repo.create(model).await?;
        info!(poll_id = %poll.id, user_id = %identity.user_id, "Global poll created");

        Ok(PollView {
            poll,
            tally: Tally::default(),
            user_vote: None,
            has_ended: false,
        })
    }

    /// Global polls still accepting votes.
    pub async fn list_active(&self, identity: &Identity) -> AppResult<Vec<PollView>> {
        let now = Utc::now();
        let polls = self.poll_repo.find_open_global(now).await?;
        self.decorate(identity, polls, now).await
    }

    /// Polls the caller created.
    pub async fn list_mine(&self, identity: &Identity) -> AppResult<Vec<PollView>> {
        let now = Utc::now();
        let polls = self.poll_repo.find_by_creator(&identity.user_id).await?;
        self.decorate(identity, polls, now).await
    }

    /// Ended global polls the caller voted on.
    pub async fn list_finished(&self, identity: &Identity) -> AppResult<Vec<PollView>> {
        let now = Utc::now();
        let polls = self
            .poll_repo
            .find_finished_voted_by(&identity.user_id, now)
            .await?;
        self.decorate(identity, polls, now).await
    }

    /// One poll with tally and the caller's vote.
    pub async fn get_poll(&self, identity: &Identity, poll_id: &str) -> AppResult<PollView> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        if let Some(room_id) = poll.room_id.as_deref() {
            self.viewable_room(identity, room_id).await?;
        }
        self.single_view(identity, poll, Utc::now()).await
    }

    /// Final results, available once voting has ended.
    pub async fn results(&self, identity: &Identity, poll_id: &str) -> AppResult<PollView> {
        let now = Utc::now();
        let poll = self.poll_repo.get_by_id(poll_id).await?;

        let ended = match poll.room_id.as_deref() {
            Some(room_id) => {
                self.viewable_room(identity, room_id).await?;
                let record = self
                    .room_poll_repo
                    .find_in_room(room_id, poll_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;
                let record = self.lifecycle.refresh(&record, now).await?;
                record.status == RoomPollStatus::Closed
            }
            None => !global_poll_is_open(&poll, now),
        };

        if !ended {
            return Err(AppError::Forbidden(
                "Poll still active, results unavailable".to_string(),
            ));
        }

        self.single_view(identity, poll, now).await
    }

    /// Delete a poll and its votes. Site admins only.
    pub async fn delete_poll(&self, identity: &Identity, poll_id: &str) -> AppResult<()> {
        if !identity.is_admin {
            return Err(AppError::Forbidden("Admin only".to_string()));
        }
        if !self.poll_repo.delete(poll_id).await? {
            return Err(AppError::NotFound(format!("Poll not found: {poll_id}")));
        }
        info!(poll_id, user_id = %identity.user_id, "Poll deleted");
        Ok(())
    }

    async fn own_votes(&self, identity: &Identity, poll_ids: &[String]) -> AppResult<HashMap<String, i32>> {
        Ok(self
            .vote_repo
            .find_by_user_and_polls(&identity.user_id, poll_ids)
            .await?
            .into_iter()
            .map(|v| (v.poll_id, v.option_selected))
            .collect())
    }

    async fn single_view(
        &self,
        identity: &Identity,
        poll: poll::Model,
        now: DateTime<Utc>,
    ) -> AppResult<PollView> {
        let tally = self.tally.compute(&poll.id).await?;
        let user_vote = self
            .vote_repo
            .find_by_user_and_poll(&identity.user_id, &poll.id)
            .await?
            .map(|v| v.option_selected);
        Ok(PollView {
            has_ended: !global_poll_is_open(&poll, now),
            poll,
            tally,
            user_vote,
        })
    }

    async fn decorate(
        &self,
        identity: &Identity,
        polls: Vec<poll::Model>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PollView>> {
        if polls.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = polls.iter().map(|p| p.id.clone()).collect();
        let tallies = self.tally.compute_many(&ids).await?;
        let own_votes = self.own_votes(identity, &ids).await?;

        Ok(polls
            .into_iter()
            .map(|poll| PollView {
                tally: tallies.get(&poll.id).copied().unwrap_or_default(),
                user_vote: own_votes.get(&poll.id).copied(),
                has_ended: !global_poll_is_open(&poll, now),
                poll,
            })
            .collect())
    }

    fn room_view(
        entry: PollWithLifecycle,
        tally: Tally,
        user_vote: Option<i32>,
        creator_username: Option<String>,
    ) -> RoomPollView {
        let (poll_status, started_at, closed_at, duration_minutes) = match entry.lifecycle {
            Some(record) => (
                record.status,
                record.started_at,
                record.closed_at,
                record.duration_minutes,
            ),
            None => (RoomPollStatus::Pending, None, None, 0),
        };

        RoomPollView {
            poll: entry.poll,
            poll_status,
            started_at,
            closed_at,
            duration_minutes,
            tally,
            user_voted: user_vote.is_some(),
            user_vote,
            creator_username,
        }
    }
}
