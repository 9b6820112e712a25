//! WebSocket streaming API.
//!
//! One socket watches at most one poll room channel at a time. Frames are
//! JSON objects of the form `{"type": <event>, "body": {...}}`.

#![allow(missing_docs)]

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use pollhub_common::{AppError, IdGenerator};
use pollhub_core::{ChannelKey, Identity, PollRoomEvent, SessionId, Tally};
use pollhub_db::entities::room_poll::RoomPollStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::middleware::AppState;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Access token for authentication.
    #[serde(rename = "i")]
    pub token: Option<String>,
}

/// A (room, poll) pair as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRoomRef {
    pub room_id: String,
    pub poll_id: String,
}

impl From<PollRoomRef> for ChannelKey {
    fn from(r: PollRoomRef) -> Self {
        Self::new(r.room_id, r.poll_id)
    }
}

/// Join request. Payload ids are informational; the socket's identity wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPollRoom {
    #[serde(flatten)]
    pub channel: PollRoomRef,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

/// Vote hint. Any tally fields the client sends are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCast {
    #[serde(flatten)]
    pub channel: PollRoomRef,
    pub user_id: Option<String>,
}

/// Client message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinPollRoom(JoinPollRoom),
    LeavePollRoom(PollRoomRef),
    VoteCast(VoteCast),
}

/// Body of a `vote-updated` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteUpdated {
    #[serde(rename = "pollId")]
    pub poll_id: String,
    #[serde(rename = "totalVotes")]
    pub total_votes: i64,
    pub option1_count: i64,
    pub option2_count: i64,
    pub option3_count: i64,
    pub option4_count: i64,
}

impl VoteUpdated {
    fn new(poll_id: String, tally: Tally) -> Self {
        Self {
            poll_id,
            total_votes: tally.total_votes,
            option1_count: tally.option1_count,
            option2_count: tally.option2_count,
            option3_count: tally.option3_count,
            option4_count: tally.option4_count,
        }
    }
}

/// Server message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Acknowledges a join.
    #[serde(rename_all = "camelCase")]
    Joined { room_id: String, poll_id: String },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: String,
        user_name: String,
        poll_id: String,
    },
    VoteUpdated(VoteUpdated),
    #[serde(rename_all = "camelCase")]
    PollStatusChanged {
        poll_id: String,
        status: RoomPollStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A rejected client message.
    Error { code: String, message: String },
}

impl From<PollRoomEvent> for ServerMessage {
    fn from(event: PollRoomEvent) -> Self {
        match event {
            PollRoomEvent::ViewerJoined {
                poll_id,
                user_id,
                user_name,
            } => Self::UserJoined {
                user_id,
                user_name,
                poll_id,
            },
            PollRoomEvent::TallyUpdated { poll_id, tally } => {
                Self::VoteUpdated(VoteUpdated::new(poll_id, tally))
            }
            PollRoomEvent::StatusChanged {
                poll_id,
                status,
                message,
            } => Self::PollStatusChanged {
                poll_id,
                status,
                message,
            },
        }
    }
}

impl From<AppError> for ServerMessage {
    fn from(e: AppError) -> Self {
        Self::Error {
            code: e.error_code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Per-socket state.
pub struct StreamSession {
    id: SessionId,
    identity: Option<Identity>,
    events: Option<mpsc::Receiver<PollRoomEvent>>,
}

impl StreamSession {
    #[must_use]
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            id: IdGenerator::new().generate(),
            identity,
            events: None,
        }
    }

    /// Whether the session currently receives channel events.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.events.is_some()
    }

    fn require_identity(&self) -> Result<&Identity, AppError> {
        self.identity.as_ref().ok_or(AppError::Unauthorized)
    }

    async fn next_event(&mut self) -> Option<PollRoomEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}

/// WebSocket upgrade handler.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

async fn handle_socket(socket: WebSocket, query: StreamQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Authenticate if token provided
    let identity = if let Some(token) = &query.token {
        match state.user_service.identify(token).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Streaming auth failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut session = StreamSession::new(identity);
    info!(
        session_id = %session.id,
        user_id = ?session.identity.as_ref().map(|i| &i.user_id),
        "Streaming connection established"
    );

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(client_msg, &mut session, &state).await
                            }
                            Err(e) => {
                                warn!("Failed to parse client message: {}", e);
                                Some(AppError::BadRequest(format!("Malformed frame: {e}")).into())
                            }
                        };
                        if let Some(response) = response {
                            let json = serde_json::to_string(&response).unwrap_or_default();
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session.id, "Client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            event = session.next_event() => {
                match event {
                    Some(event) => {
                        let msg = ServerMessage::from(event);
                        let json = serde_json::to_string(&msg).unwrap_or_default();
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Coordinator dropped this viewer
                    None => session.events = None,
                }
            }
        }
    }

    state.broadcaster.leave(&session.id).await;
    info!(session_id = %session.id, "Streaming connection closed");
}

/// Apply one client message to a session. Returns the direct reply, if any.
pub async fn handle_client_message(
    msg: ClientMessage,
    session: &mut StreamSession,
    state: &AppState,
) -> Option<ServerMessage> {
    let result = match msg {
        ClientMessage::JoinPollRoom(join) => join_poll_room(join, session, state).await.map(Some),
        ClientMessage::LeavePollRoom(channel) => {
            let key = ChannelKey::from(channel);
            if state.broadcaster.channel_of(&session.id).await.as_ref() == Some(&key) {
                state.broadcaster.leave(&session.id).await;
                session.events = None;
            }
            Ok(None)
        }
        ClientMessage::VoteCast(cast) => vote_cast(cast, session, state).await.map(|()| None),
    };

    result.unwrap_or_else(|e| {
        debug!(session_id = %session.id, error = %e, "Streaming request rejected");
        Some(e.into())
    })
}

async fn join_poll_room(
    join: JoinPollRoom,
    session: &mut StreamSession,
    state: &AppState,
) -> Result<ServerMessage, AppError> {
    let identity = session.require_identity()?;
    if let Some(claimed) = join.user_id.as_deref()
        && claimed != identity.user_id
    {
        debug!(claimed, user_id = %identity.user_id, "Ignoring payload user id");
    }

    let PollRoomRef { room_id, poll_id } = join.channel;
    state
        .poll_service
        .authorize_viewer(identity, &room_id, &poll_id)
        .await?;

    let rx = state
        .broadcaster
        .join(
            ChannelKey::new(room_id.clone(), poll_id.clone()),
            &session.id,
            &identity.user_id,
            &identity.display_name,
        )
        .await;
    session.events = Some(rx);

    Ok(ServerMessage::Joined { room_id, poll_id })
}

async fn vote_cast(
    cast: VoteCast,
    session: &StreamSession,
    state: &AppState,
) -> Result<(), AppError> {
    session.require_identity()?;
    let key = ChannelKey::from(cast.channel);
    if state.broadcaster.channel_of(&session.id).await.as_ref() != Some(&key) {
        return Err(AppError::Forbidden(format!("Not watching {key}")));
    }

    // Everyone in the channel, the sender included, gets the ledger tally
    state
        .vote_service
        .resync(&key.room_id, &key.poll_id)
        .await?;
    Ok(())
}
