//! HTTP request handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::{AUTH_COOKIE, CurrentUser};
use crate::hub::{ChatMessage, Participant, PresenceUser};
use crate::store::{Project, UserInfo};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

fn validate_credentials(request: &CredentialsRequest) -> ApiResult<()> {
    let email = request.email.trim();
    if email.len() < 3 || !email.contains('@') {
        return Err(ApiError::bad_request("a valid email is required"));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn auth_cookie(state: &AppState, token: &str) -> String {
    let secure_flag = if state.auth.is_dev_mode() {
        ""
    } else {
        " Secure;"
    };
    format!(
        "{AUTH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax;{secure_flag} Max-Age={}",
        60 * 60 * 24
    )
}

/// Register a new user.
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_credentials(&request)?;

    let hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let user = state
        .users
        .create_user(request.email.trim(), &hash)
        .await?;
    let token = state.auth.generate_token(&user)?;

    info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(SET_COOKIE, auth_cookie(&state, &token))]),
        Json(AuthResponse {
            token,
            user: user.info(),
        }),
    ))
}

/// Log an existing user in.
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .users
        .user_by_email(request.email.trim())
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid email or password"))?;

    let verified = bcrypt::verify(&request.password, &user.password_hash)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if !verified {
        return Err(ApiError::unauthorized("invalid email or password"));
    }

    let token = state.auth.generate_token(&user)?;

    info!(user_id = %user.id, "user logged in");

    Ok((
        AppendHeaders([(SET_COOKIE, auth_cookie(&state, &token))]),
        Json(AuthResponse {
            token,
            user: user.info(),
        }),
    ))
}

/// Log out: clear the auth cookie.
pub async fn logout() -> impl IntoResponse {
    let cookie = format!("{AUTH_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");

    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        StatusCode::NO_CONTENT,
    )
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserInfo>,
}

/// The caller's profile.
#[instrument(skip(state, user))]
pub async fn get_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<UserResponse>> {
    let record = state
        .users
        .user_by_id(user.id())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user {}", user.id())))?;

    Ok(Json(UserResponse {
        user: record.info(),
    }))
}

/// All users except the caller, for project-member pickers.
#[instrument(skip(state, user))]
pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<UsersResponse>> {
    let users = state
        .users
        .list_users_except(user.id())
        .await?
        .iter()
        .map(|u| u.info())
        .collect();

    Ok(Json(UsersResponse { users }))
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddUsersRequest {
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub project: Project,
    pub members: Vec<UserInfo>,
}

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
}

/// Create a project; the caller becomes its first member.
#[instrument(skip(state, user, request), fields(name = %request.name))]
pub async fn create_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("project name is required"));
    }

    let project = state.projects.create_project(name, user.id()).await?;
    let members = state.projects.project_members(&project.id).await?;

    info!(project_id = %project.id, "project created");

    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse { project, members }),
    ))
}

/// The caller's projects.
#[instrument(skip(state, user))]
pub async fn list_projects(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<ProjectsResponse>> {
    let projects = state.projects.projects_for_user(user.id()).await?;
    Ok(Json(ProjectsResponse { projects }))
}

/// Project details with members; members only.
#[instrument(skip(state, user))]
pub async fn get_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state
        .projects
        .project_by_id(&project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("project {project_id}")))?;

    if !state.projects.is_member(&project_id, user.id()).await? {
        return Err(ApiError::forbidden("not a member of this project"));
    }

    let members = state.projects.project_members(&project_id).await?;
    Ok(Json(ProjectResponse { project, members }))
}

/// Add users to a project; the caller must already be a member.
#[instrument(skip(state, user, request))]
pub async fn add_project_users(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<String>,
    Json(request): Json<AddUsersRequest>,
) -> ApiResult<Json<ProjectResponse>> {
    if request.users.is_empty() {
        return Err(ApiError::bad_request("at least one user is required"));
    }

    let project = state
        .projects
        .project_by_id(&project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("project {project_id}")))?;

    if !state.projects.is_member(&project_id, user.id()).await? {
        return Err(ApiError::forbidden("not a member of this project"));
    }

    match state.projects.add_members(&project_id, &request.users).await {
        Ok(()) => {}
        // Unknown users on this path are a caller mistake, not a missing resource.
        Err(crate::store::StoreError::NotFound(what)) => {
            return Err(ApiError::bad_request(format!("{what} does not exist")));
        }
        Err(e) => return Err(e.into()),
    }

    let members = state.projects.project_members(&project_id).await?;

    info!(project_id = %project.id, added = request.users.len(), "project members added");

    Ok(Json(ProjectResponse { project, members }))
}

// ============================================================================
// Chat (polling transport)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Return only messages strictly newer than this timestamp.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
    pub online_users: Vec<PresenceUser>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: ChatMessage,
}

/// A room whose name matches a project id is restricted to that project's
/// members; any other room is open to authenticated users.
pub(crate) async fn ensure_room_access(
    state: &AppState,
    user_id: &str,
    room: &str,
) -> ApiResult<()> {
    if state.projects.project_by_id(room).await?.is_some()
        && !state.projects.is_member(room, user_id).await?
    {
        return Err(ApiError::forbidden("not a member of this project"));
    }
    Ok(())
}

/// Poll a room: messages newer than `since` plus the current online list.
#[instrument(skip(state, user))]
pub async fn get_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(room): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    ensure_room_access(&state, user.id(), &room).await?;

    state.hub.touch_poller(&room, user.id(), user.handle());

    Ok(Json(MessagesResponse {
        messages: state.hub.history_since(&room, query.since),
        online_users: state.hub.online_users(&room),
    }))
}

/// Publish a message into a room over HTTP.
#[instrument(skip(state, user, request))]
pub async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(room): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<MessageResponse>> {
    ensure_room_access(&state, user.id(), &room).await?;

    state.hub.touch_poller(&room, user.id(), user.handle());

    let participant = Participant::new(user.id(), user.handle());
    let message = state.hub.send_message(&participant, &room, &request.text)?;

    Ok(Json(MessageResponse { message }))
}

// ============================================================================
// Assistant
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct AssistantHealthResponse {
    pub status: String,
    pub message: String,
}

/// One-shot assistant proxy.
#[instrument(skip(state, _user, query))]
pub async fn assistant_generate(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<GenerateQuery>,
) -> ApiResult<Json<GenerateResponse>> {
    if query.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt is required"));
    }

    let result = state.assistant.generate(&query.prompt).await?;
    Ok(Json(GenerateResponse { result }))
}

/// Live assistant probe with a trivial prompt.
#[instrument(skip(state, _user))]
pub async fn assistant_health(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    match state.assistant.generate("Hello").await {
        Ok(_) => Ok(Json(AssistantHealthResponse {
            status: "healthy".to_string(),
            message: "assistant service is working".to_string(),
        })
        .into_response()),
        Err(err) => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(AssistantHealthResponse {
                status: "error".to_string(),
                message: err.to_string(),
            }),
        )
            .into_response()),
    }
}
