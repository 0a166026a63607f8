//! WebSocket transport for chat rooms.

mod handler;

pub use handler::chat_ws;
