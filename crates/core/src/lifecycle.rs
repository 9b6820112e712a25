//! Room poll lifecycle state machine.
//!
//! A room poll moves `pending -> active -> closed` and never back. Every
//! status change goes through [`PollLifecycle::apply`]; callers persist the
//! result with a conditional update keyed on the previous status.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use pollhub_common::AppError;
use pollhub_db::entities::{poll, room_poll, room_poll::RoomPollStatus};
use pollhub_db::repositories::LifecycleUpdate;
use thiserror::Error;

/// A requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Room admin opens voting.
    Start,
    /// Room admin ends voting early.
    Close,
    /// The duration has elapsed.
    Expire,
}

impl Transition {
    /// Message sent to viewers alongside the new status.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Start => "Poll started",
            Self::Close => "Poll closed by room admin",
            Self::Expire => "Poll time expired",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Close => "close",
            Self::Expire => "expire",
        })
    }
}

/// A transition that is not allowed from the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {transition} a poll that is {from}")]
pub struct TransitionError {
    pub from: RoomPollStatus,
    pub transition: Transition,
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        Self::Conflict(err.to_string())
    }
}

/// Lifecycle state of a room poll.
///
/// `started_at` is set iff the status is active or closed; `closed_at` is
/// set iff the status is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLifecycle {
    pub status: RoomPollStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub duration_minutes: i32,
}

impl PollLifecycle {
    /// A freshly created lifecycle.
    #[must_use]
    pub const fn pending(duration_minutes: i32) -> Self {
        Self {
            status: RoomPollStatus::Pending,
            started_at: None,
            closed_at: None,
            duration_minutes,
        }
    }

    #[must_use]
    pub fn from_model(model: &room_poll::Model) -> Self {
        Self {
            status: model.status,
            started_at: model.started_at.map(|t| t.with_timezone(&Utc)),
            closed_at: model.closed_at.map(|t| t.with_timezone(&Utc)),
            duration_minutes: model.duration_minutes,
        }
    }

    /// Copy this state onto a stored record.
    #[must_use]
    pub fn to_model(&self, base: &room_poll::Model) -> room_poll::Model {
        room_poll::Model {
            status: self.status,
            started_at: self.started_at.map(Into::into),
            closed_at: self.closed_at.map(Into::into),
            ..base.clone()
        }
    }

    /// Column values to persist for this state.
    #[must_use]
    pub const fn update(&self) -> LifecycleUpdate {
        LifecycleUpdate {
            status: self.status,
            started_at: self.started_at,
            closed_at: self.closed_at,
        }
    }

    /// When voting ends on its own, once started.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .map(|started| started + Duration::minutes(i64::from(self.duration_minutes)))
    }

    /// Active, but past its deadline.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == RoomPollStatus::Active && self.deadline().is_some_and(|d| d <= now)
    }

    /// Apply a transition, or reject it.
    pub fn apply(self, transition: Transition, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        let rejected = TransitionError {
            from: self.status,
            transition,
        };

        match (self.status, transition) {
            (RoomPollStatus::Pending, Transition::Start) => Ok(Self {
                status: RoomPollStatus::Active,
                started_at: Some(now),
                closed_at: None,
                ..self
            }),
            (RoomPollStatus::Active, Transition::Close) => Ok(Self {
                status: RoomPollStatus::Closed,
                closed_at: Some(now),
                ..self
            }),
            // An expired poll closed at its deadline, not when someone noticed.
            (RoomPollStatus::Active, Transition::Expire) if self.is_expired(now) => Ok(Self {
                status: RoomPollStatus::Closed,
                closed_at: self.deadline(),
                ..self
            }),
            _ => Err(rejected),
        }
    }

    /// The state as observed at `now`, with automatic expiry applied.
    #[must_use]
    pub fn effective(self, now: DateTime<Utc>) -> Self {
        self.apply(Transition::Expire, now).unwrap_or(self)
    }

    /// Whether votes are accepted at `now`.
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.effective(now).status == RoomPollStatus::Active
    }
}

/// Whether a global poll accepts votes at `now`.
#[must_use]
pub fn global_poll_is_open(poll: &poll::Model, now: DateTime<Utc>) -> bool {
    now < poll.end_time.with_timezone(&Utc)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn assert_timestamps_match_status(lc: &PollLifecycle) {
        let started = matches!(lc.status, RoomPollStatus::Active | RoomPollStatus::Closed);
        assert_eq!(lc.started_at.is_some(), started);
        assert_eq!(lc.closed_at.is_some(), lc.status == RoomPollStatus::Closed);
    }

    #[test]
    fn test_full_lifecycle() {
        let pending = PollLifecycle::pending(10);
        assert_timestamps_match_status(&pending);

        let active = pending.apply(Transition::Start, t0()).unwrap();
        assert_eq!(active.status, RoomPollStatus::Active);
        assert_eq!(active.started_at, Some(t0()));
        assert_timestamps_match_status(&active);

        let later = t0() + Duration::minutes(3);
        let closed = active.apply(Transition::Close, later).unwrap();
        assert_eq!(closed.status, RoomPollStatus::Closed);
        assert_eq!(closed.closed_at, Some(later));
        assert_eq!(closed.started_at, Some(t0()));
        assert_timestamps_match_status(&closed);
    }

    #[test]
    fn test_rejects_skip_reverse_and_terminal_transitions() {
        let now = t0();
        let pending = PollLifecycle::pending(10);
        let active = pending.apply(Transition::Start, now).unwrap();
        let closed = active.apply(Transition::Close, now).unwrap();

        let cases = [
            (pending, Transition::Close),
            (pending, Transition::Expire),
            (active, Transition::Start),
            (closed, Transition::Start),
            (closed, Transition::Close),
            (closed, Transition::Expire),
        ];

        for (state, transition) in cases {
            let err = state.apply(transition, now).unwrap_err();
            assert_eq!(err.from, state.status);
            assert_eq!(err.transition, transition);
        }
    }

    #[test]
    fn test_transition_error_is_conflict() {
        let err = PollLifecycle::pending(1)
            .apply(Transition::Close, t0())
            .unwrap_err();
        let app: AppError = err.into();
        assert!(matches!(app, AppError::Conflict(ref msg) if msg == "cannot close a poll that is pending"));
    }

    #[test]
    fn test_expiry_at_deadline() {
        let active = PollLifecycle::pending(1).apply(Transition::Start, t0()).unwrap();

        let before = t0() + Duration::seconds(59);
        assert!(!active.is_expired(before));
        assert!(active.is_open(before));
        assert!(active.apply(Transition::Expire, before).is_err());

        let after = t0() + Duration::seconds(61);
        assert!(active.is_expired(after));
        assert!(!active.is_open(after));

        let observed = active.effective(after);
        assert_eq!(observed.status, RoomPollStatus::Closed);
        assert_eq!(observed.closed_at, Some(t0() + Duration::minutes(1)));
        assert_timestamps_match_status(&observed);
    }

    #[test]
    fn test_effective_leaves_other_states_alone() {
        let far_future = t0() + Duration::days(365);
        let pending = PollLifecycle::pending(1);
        assert_eq!(pending.effective(far_future), pending);
        assert!(!pending.is_open(far_future));

        let closed = pending
            .apply(Transition::Start, t0())
            .unwrap()
            .apply(Transition::Close, t0())
            .unwrap();
        assert_eq!(closed.effective(far_future), closed);
    }

    #[test]
    fn test_observed_statuses_never_reverse() {
        let mut lc = PollLifecycle::pending(1);
        let mut seen = vec![lc.status];
        let mut now = t0();

        for transition in [
            Transition::Close,
            Transition::Start,
            Transition::Start,
            Transition::Expire,
            Transition::Close,
            Transition::Start,
        ] {
            now += Duration::seconds(30);
            if let Ok(next) = lc.apply(transition, now) {
                lc = next;
            }
            let observed = lc.effective(now);
            if seen.last() != Some(&observed.status) {
                seen.push(observed.status);
            }
        }

        assert_eq!(
            seen,
            vec![
                RoomPollStatus::Pending,
                RoomPollStatus::Active,
                RoomPollStatus::Closed
            ]
        );
    }

    #[test]
    fn test_model_round_trip_keeps_identity_columns() {
        let base = pollhub_db::test_utils::fixtures::lifecycle_pending("p1", "room1", 5);
        let active = PollLifecycle::from_model(&base)
            .apply(Transition::Start, t0())
            .unwrap();
        let model = active.to_model(&base);

        assert_eq!(model.poll_id, "p1");
        assert_eq!(model.room_id, "room1");
        assert_eq!(model.status, RoomPollStatus::Active);
        assert_eq!(PollLifecycle::from_model(&model), active);
    }

    #[test]
    fn test_global_poll_open_until_end_time() {
        let poll = pollhub_db::test_utils::fixtures::global_poll("g1", "admin", Duration::minutes(5));
        let end = poll.end_time.with_timezone(&Utc);

        assert!(global_poll_is_open(&poll, end - Duration::seconds(1)));
        assert!(!global_poll_is_open(&poll, end));
    }
}
