//! Room and presence management.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::assistant::{AssistantError, AssistantGateway};

use super::history::RoomHistory;
use super::types::{
    ChatMessage, MessageKind, Outbound, Participant, ParticipantId, PresenceUser, Sender,
    ServerEvent,
};

/// Reserved command prefix that routes a message to the assistant.
/// Case-sensitive; the trailing space is mandatory.
pub const ASSISTANT_PREFIX: &str = "@ai ";

/// Size of each room's broadcast channel.
const ROOM_BUFFER_SIZE: usize = 256;

/// Pollers count as present for this long after their last request.
const POLLER_TTL: Duration = Duration::from_secs(5 * 60);

/// Synchronous request-validation errors. Nothing is broadcast and no state
/// changes when one of these is returned.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("message text must not be empty")]
    EmptyMessage,

    #[error("room name must not be empty")]
    MissingRoom,
}

/// Retry policy for transient assistant failures. Only
/// [`AssistantError::Unavailable`] is retried; rate-limit and terminal
/// errors surface immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Per-room state. All fields are mutated under the owning map entry's
/// guard, which serializes same-room operations.
struct Room {
    members: Vec<Participant>,
    history: RoomHistory,
    tx: broadcast::Sender<Outbound>,
    next_id: u64,
}

impl Room {
    fn new(history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(ROOM_BUFFER_SIZE);
        Self {
            members: Vec::new(),
            history: RoomHistory::new(history_capacity),
            tx,
            next_id: 1,
        }
    }

    fn next_message_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn presence(&self) -> Vec<PresenceUser> {
        self.members
            .iter()
            .map(|m| PresenceUser {
                id: m.user_id.clone(),
                handle: m.handle.clone(),
            })
            .collect()
    }

    /// Send to all live receivers. An error only means nobody is listening.
    fn broadcast(&self, skip: Option<ParticipantId>, event: ServerEvent) {
        let _ = self.tx.send(Outbound { skip, event });
    }
}

/// Poll-transport presence entry.
struct Poller {
    user: PresenceUser,
    last_seen: Instant,
}

/// Room/presence hub: owns room membership, message fan-out, bounded
/// history, and the assistant interception path.
///
/// One instance is shared by every connection. Rooms are created lazily on
/// first join and never destroyed. Mutations to a given room are serialized
/// through its map entry; different rooms proceed in parallel. The assistant
/// call is the only unbounded-latency operation and runs on a spawned task,
/// never under a room guard.
pub struct ChatHub {
    rooms: DashMap<String, Room>,
    /// Participant id -> current room. A participant is in at most one room.
    memberships: DashMap<ParticipantId, String>,
    /// (room, user id) -> poll-transport presence.
    pollers: DashMap<(String, String), Poller>,
    assistant: Arc<dyn AssistantGateway>,
    retry: RetryPolicy,
    history_capacity: usize,
}

impl ChatHub {
    pub fn new(
        assistant: Arc<dyn AssistantGateway>,
        retry: RetryPolicy,
        history_capacity: usize,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            pollers: DashMap::new(),
            assistant,
            retry,
            history_capacity,
        }
    }

    fn room_entry(&self, room: &str) -> RefMut<'_, String, Room> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| Room::new(self.history_capacity))
    }

    /// Join `room`, leaving any previous room first. Joining the current
    /// room again only re-broadcasts the presence snapshot.
    ///
    /// Returns the receiver the transport drains for this room. The join
    /// notice and the updated presence snapshot are emitted under a single
    /// room guard, so every member observes them back to back; the notice is
    /// tagged to skip the joiner itself.
    pub fn join(
        &self,
        participant: &Participant,
        room: &str,
    ) -> Result<broadcast::Receiver<Outbound>, HubError> {
        if room.trim().is_empty() {
            return Err(HubError::MissingRoom);
        }

        let previous = self
            .memberships
            .insert(participant.id, room.to_string());

        if previous.as_deref() == Some(room) {
            let entry = self.room_entry(room);
            let rx = entry.tx.subscribe();
            let users = entry.presence();
            entry.broadcast(
                None,
                ServerEvent::Presence {
                    room: room.to_string(),
                    users,
                },
            );
            return Ok(rx);
        }

        if let Some(prev) = previous {
            self.remove_member(&prev, participant.id);
        }

        let mut entry = self.room_entry(room);
        entry.members.push(participant.clone());
        let rx = entry.tx.subscribe();

        let notice = Self::notice(&mut entry, room, format!("{} joined the chat", participant.handle));
        entry.broadcast(Some(participant.id), ServerEvent::Message { message: notice });
        let users = entry.presence();
        entry.broadcast(
            None,
            ServerEvent::Presence {
                room: room.to_string(),
                users,
            },
        );

        info!("{} joined room {}", participant.handle, room);
        Ok(rx)
    }

    /// Remove the participant from its room, notifying remaining members.
    /// Safe to call for participants that never joined a room.
    pub fn leave(&self, participant_id: ParticipantId) {
        if let Some((_, room)) = self.memberships.remove(&participant_id) {
            self.remove_member(&room, participant_id);
        }
    }

    fn remove_member(&self, room: &str, participant_id: ParticipantId) {
        let Some(mut entry) = self.rooms.get_mut(room) else {
            return;
        };
        let Some(pos) = entry.members.iter().position(|m| m.id == participant_id) else {
            return;
        };
        let member = entry.members.remove(pos);

        let notice = Self::notice(&mut entry, room, format!("{} left the chat", member.handle));
        entry.broadcast(None, ServerEvent::Message { message: notice });
        let users = entry.presence();
        entry.broadcast(
            None,
            ServerEvent::Presence {
                room: room.to_string(),
                users,
            },
        );

        info!("{} left room {}", member.handle, room);
    }

    /// Publish `text` to `room` from `participant`.
    ///
    /// The message is broadcast to every member and appended to the room's
    /// history. A text carrying the reserved assistant prefix additionally
    /// dispatches the remainder as a prompt; the dispatch runs on its own
    /// task and never delays concurrent sends.
    pub fn send_message(
        self: &Arc<Self>,
        participant: &Participant,
        room: &str,
        text: &str,
    ) -> Result<ChatMessage, HubError> {
        if room.trim().is_empty() {
            return Err(HubError::MissingRoom);
        }
        if text.trim().is_empty() {
            return Err(HubError::EmptyMessage);
        }

        let message = {
            let mut entry = self.room_entry(room);
            let message = ChatMessage {
                id: entry.next_message_id(),
                room: room.to_string(),
                kind: MessageKind::User,
                sender: Sender::user(&participant.user_id, &participant.handle),
                text: text.to_string(),
                timestamp: Utc::now(),
                is_error: false,
            };
            entry.history.push(message.clone());
            entry.broadcast(None, ServerEvent::Message { message: message.clone() });
            message
        };

        if let Some(prompt) = text.strip_prefix(ASSISTANT_PREFIX) {
            self.dispatch_assistant(room, prompt);
        }

        Ok(message)
    }

    /// Record poll-transport activity for presence purposes.
    pub fn touch_poller(&self, room: &str, user_id: &str, handle: &str) {
        self.pollers.insert(
            (room.to_string(), user_id.to_string()),
            Poller {
                user: PresenceUser {
                    id: user_id.to_string(),
                    handle: handle.to_string(),
                },
                last_seen: Instant::now(),
            },
        );
    }

    /// Messages in `room` strictly newer than `since`, oldest first.
    pub fn history_since(
        &self,
        room: &str,
        since: Option<DateTime<Utc>>,
    ) -> Vec<ChatMessage> {
        self.rooms
            .get(room)
            .map(|r| r.history.since(since))
            .unwrap_or_default()
    }

    /// Current socket members of `room`.
    pub fn presence(&self, room: &str) -> Vec<PresenceUser> {
        self.rooms
            .get(room)
            .map(|r| r.presence())
            .unwrap_or_default()
    }

    /// Socket members plus poll-transport users seen within the recent
    /// window, deduplicated by user id. Stale pollers are pruned on read.
    pub fn online_users(&self, room: &str) -> Vec<PresenceUser> {
        self.pollers
            .retain(|_, poller| poller.last_seen.elapsed() <= POLLER_TTL);

        let mut users = self.presence(room);
        for entry in self.pollers.iter() {
            let (poller_room, user_id) = entry.key();
            if poller_room == room && !users.iter().any(|u| &u.id == user_id) {
                users.push(entry.value().user.clone());
            }
        }
        users
    }

    fn notice(room_state: &mut Room, room: &str, text: String) -> ChatMessage {
        ChatMessage {
            id: room_state.next_message_id(),
            room: room.to_string(),
            kind: MessageKind::System,
            sender: Sender::system(),
            text,
            timestamp: Utc::now(),
            is_error: false,
        }
    }

    fn dispatch_assistant(self: &Arc<Self>, room: &str, prompt: &str) {
        let hub = Arc::clone(self);
        let room = room.to_string();
        let prompt = prompt.trim().to_string();

        tokio::spawn(async move {
            if prompt.is_empty() {
                hub.publish_assistant(
                    &room,
                    "the assistant needs a prompt after \"@ai\"".to_string(),
                    true,
                );
                return;
            }

            match hub.generate_with_retry(&prompt).await {
                Ok(text) => hub.publish_assistant(&room, text, false),
                Err(err) => {
                    warn!("assistant request for room {room} failed: {err}");
                    hub.publish_assistant(&room, format!("assistant error: {err}"), true);
                }
            }
        });
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String, AssistantError> {
        let mut retries = 0;
        loop {
            match self.assistant.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(AssistantError::Unavailable) if retries < self.retry.max_retries => {
                    retries += 1;
                    debug!(
                        "assistant unavailable, retry {retries}/{} in {:?}",
                        self.retry.max_retries, self.retry.backoff
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn publish_assistant(&self, room: &str, text: String, is_error: bool) {
        let mut entry = self.room_entry(room);
        let message = ChatMessage {
            id: entry.next_message_id(),
            room: room.to_string(),
            kind: MessageKind::Assistant,
            sender: Sender::assistant(),
            text,
            timestamp: Utc::now(),
            is_error,
        };
        entry.history.push(message.clone());
        entry.broadcast(None, ServerEvent::Message { message });
    }
}
