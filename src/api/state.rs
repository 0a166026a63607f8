//! Application state shared across handlers.

use std::sync::Arc;

use crate::assistant::AssistantGateway;
use crate::auth::AuthState;
use crate::hub::ChatHub;
use crate::store::{ProjectStore, UserStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub users: Arc<dyn UserStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub hub: Arc<ChatHub>,
    pub assistant: Arc<dyn AssistantGateway>,
}

impl AppState {
    pub fn new(
        auth: AuthState,
        users: Arc<dyn UserStore>,
        projects: Arc<dyn ProjectStore>,
        hub: Arc<ChatHub>,
        assistant: Arc<dyn AssistantGateway>,
    ) -> Self {
        Self {
            auth,
            users,
            projects,
            hub,
            assistant,
        }
    }
}
