//! Test utilities and common setup.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use tokio::sync::Mutex;

use huddle::api::{self, AppState};
use huddle::assistant::{AssistantError, AssistantGateway};
use huddle::auth::AuthState;
use huddle::hub::{ChatHub, RetryPolicy};
use huddle::store::{MemoryStore, UserStore};

const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

/// Gateway that always fails; for tests that never reach the assistant.
pub struct NullGateway;

#[async_trait]
impl AssistantGateway for NullGateway {
    async fn generate(&self, _prompt: &str) -> Result<String, AssistantError> {
        Err(AssistantError::Unavailable)
    }
}

/// Gateway that replays a queue of canned outcomes and counts calls.
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<Result<String, AssistantError>>>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<Result<String, AssistantError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssistantGateway for ScriptedGateway {
    async fn generate(&self, _prompt: &str) -> Result<String, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(AssistantError::Unavailable))
    }
}

fn test_state(assistant: Arc<dyn AssistantGateway>) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let auth_state = AuthState::new(TEST_SECRET.to_string(), true, Vec::new());
    let hub = Arc::new(ChatHub::new(
        assistant.clone(),
        RetryPolicy::default(),
        100,
    ));
    let state = AppState::new(
        auth_state,
        store.clone(),
        store.clone(),
        hub,
        assistant,
    );
    (state, store)
}

/// Create a test application with an in-memory store.
pub async fn test_app() -> Router {
    let (state, _) = test_state(Arc::new(NullGateway));
    api::create_router(state)
}

/// Create a test application plus a registered user and a valid token.
pub async fn test_app_with_token() -> (Router, String) {
    let (app, token, _) = test_app_with_user("alice@example.com").await;
    (app, token)
}

/// Serve a test application on an ephemeral local port with `emails`
/// registered; returns the bound address and one token per user.
pub async fn spawn_test_server(emails: &[&str]) -> (std::net::SocketAddr, Vec<String>) {
    let (state, store) = test_state(Arc::new(NullGateway));

    let mut tokens = Vec::new();
    for email in emails {
        let hash = bcrypt::hash("password123", 4).unwrap();
        let user = store.create_user(email, &hash).await.unwrap();
        tokens.push(state.auth.generate_token(&user).unwrap());
    }

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, tokens)
}

/// Create a test application with `email` registered; returns the user id too.
pub async fn test_app_with_user(email: &str) -> (Router, String, String) {
    let (state, store) = test_state(Arc::new(NullGateway));

    let hash = bcrypt::hash("password123", 4).unwrap();
    let user = store.create_user(email, &hash).await.unwrap();
    let token = state.auth.generate_token(&user).unwrap();
    let user_id = user.id;

    (api::create_router(state), token, user_id)
}
