//! Huddle Backend Library
//!
//! Core components for the Huddle team chat backend: room hub, assistant
//! gateway, auth, storage, and the HTTP/WebSocket API.

pub mod api;
pub mod assistant;
pub mod auth;
pub mod hub;
pub mod store;
pub mod ws;
