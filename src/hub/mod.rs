//! Room/presence hub.
//!
//! The hub owns the set of connected participants, their room memberships,
//! each room's bounded message history, and the fan-out of messages and
//! presence deltas. It also intercepts the reserved `"@ai "` prefix and
//! feeds the assistant's reply back into the issuing room.
//!
//! Transports (the WebSocket handler and the HTTP polling endpoints) are
//! adapters over the same hub semantics: they push commands in through the
//! methods on [`ChatHub`] and drain [`Outbound`] events or query the history
//! buffer for delivery.

mod history;
#[allow(clippy::module_inception)]
mod hub;
mod types;

pub use history::RoomHistory;
pub use hub::{ASSISTANT_PREFIX, ChatHub, HubError, RetryPolicy};
pub use types::{
    ChatMessage, ClientCommand, MessageKind, Outbound, Participant, ParticipantId, PresenceUser,
    ReservedSender, Sender, ServerEvent, UserRef,
};
