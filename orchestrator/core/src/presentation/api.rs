// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! REST surface of the control plane.
//!
//! Every route except `/health` and the first-run/login endpoints sits behind
//! the bearer-session middleware, which resolves the token to an
//! [`Identity`] and hands it to the handler as an extension.

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::application::auth::{AuthService, LoginResult, UserView};
use crate::application::docker_settings::{ConfigureDocker, DockerSettingsService};
use crate::application::error::OperationError;
use crate::application::orchestrator::{
    ActionOutcome, AppListing, AppOrchestrator, ExternalAppRequest, InstallContainerRequest,
    InstallOutcome, InstallStackRequest, LogsOutcome, RebuildOutcome, UninstallOutcome,
};
use crate::application::shared_folders::{CreateSharedFolder, SharedFolderService};
use crate::domain::docker_config::DockerConfig;
use crate::domain::installed_app::InstalledApp;
use crate::domain::runtime::ContainerAction;
use crate::domain::shared_folder::{FolderAccess, SharedFolder};
use crate::domain::user::{Identity, Role};

pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub shares: Arc<SharedFolderService>,
    pub docker: Arc<DockerSettingsService>,
    pub apps: Arc<AppOrchestrator>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        auth: Arc<AuthService>,
        shares: Arc<SharedFolderService>,
        docker: Arc<DockerSettingsService>,
        apps: Arc<AppOrchestrator>,
    ) -> Self {
        Self {
            auth,
            shares,
            docker,
            apps,
            started_at: Instant::now(),
        }
    }
}

/// Token of the session that authenticated the request.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

pub fn router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/api/auth/password", post(change_password_handler))
        .route("/api/users", get(list_users_handler).post(create_user_handler))
        .route("/api/users/{username}", delete(delete_user_handler))
        .route("/api/users/{username}/role", put(set_role_handler))
        .route("/api/shares", get(list_shares_handler).post(create_share_handler))
        .route("/api/shares/{name}", delete(delete_share_handler))
        .route(
            "/api/shares/{name}/users/{username}",
            put(set_share_user_handler).delete(revoke_share_user_handler),
        )
        .route("/api/shares/{name}/apps/{app_id}", put(set_share_app_handler))
        .route("/api/docker", get(get_docker_handler).put(configure_docker_handler))
        .route("/api/docker/reset", post(reset_docker_handler))
        .route(
            "/api/docker/permissions/{username}",
            put(set_docker_permission_handler),
        )
        .route(
            "/api/docker/apps/{app_id}/visibility",
            put(set_app_visibility_handler),
        )
        .route("/api/apps", get(list_apps_handler))
        .route("/api/apps/container", post(install_container_handler))
        .route("/api/apps/stack", post(install_stack_handler))
        .route("/api/apps/external", post(register_external_handler))
        .route("/api/apps/{id}", delete(uninstall_handler))
        .route("/api/apps/{id}/actions/{action}", post(action_handler))
        .route("/api/apps/{id}/rebuild", post(rebuild_handler))
        .route("/api/apps/{id}/logs", get(logs_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/status", get(auth_status_handler))
        .route("/api/auth/setup", post(setup_handler))
        .route("/api/auth/login", post(login_handler))
        .merge(protected)
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError(pub OperationError);

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        ApiError(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OperationError::Validation(_) => StatusCode::BAD_REQUEST,
            OperationError::Unauthorized => StatusCode::UNAUTHORIZED,
            OperationError::Forbidden(_) => StatusCode::FORBIDDEN,
            OperationError::NotFound(_) => StatusCode::NOT_FOUND,
            OperationError::Conflict(_) => StatusCode::CONFLICT,
            OperationError::Execution { .. } => StatusCode::BAD_GATEWAY,
            OperationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let output = match &self.0 {
            OperationError::Execution { output, .. } => output.clone(),
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            output,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Session middleware
// ============================================================================

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn require_session(
    State(state): State<Arc<ApiState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).map(str::to_string);
    let identity = state.auth.authenticate(token.as_deref()).await?;
    debug!(user = %identity.username, path = %request.uri().path(), "Authenticated request");

    request.extensions_mut().insert(identity);
    if let Some(token) = token {
        request.extensions_mut().insert(SessionToken(token));
    }
    Ok(next.run(request).await)
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ShareUserAccess {
    pub access: FolderAccess,
}

#[derive(Debug, Deserialize)]
pub struct ShareAppAccess {
    pub allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct DockerPermission {
    pub granted: bool,
}

#[derive(Debug, Deserialize)]
pub struct AppVisibility {
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub tail: Option<usize>,
}

// ============================================================================
// Public handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn auth_status_handler(State(state): State<Arc<ApiState>>) -> ApiResult<serde_json::Value> {
    let needs_setup = state.auth.needs_setup().await?;
    Ok(Json(serde_json::json!({ "needs_setup": needs_setup })))
}

async fn setup_handler(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<LoginResult>), ApiError> {
    let result = state.auth.setup(&body.username, &body.password).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn login_handler(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Credentials>,
) -> ApiResult<LoginResult> {
    Ok(Json(state.auth.login(&body.username, &body.password).await?))
}

// ============================================================================
// Account handlers
// ============================================================================

async fn logout_handler(
    State(state): State<Arc<ApiState>>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<StatusCode, ApiError> {
    state.auth.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
) -> ApiResult<UserView> {
    Ok(Json(state.auth.me(&requester).await?))
}

async fn change_password_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Json(body): Json<PasswordChange>,
) -> ApiResult<LoginResult> {
    let result = state
        .auth
        .change_password(&requester, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(result))
}

async fn list_users_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
) -> ApiResult<Vec<UserView>> {
    Ok(Json(state.auth.list_users(&requester).await?))
}

async fn create_user_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let user = state
        .auth
        .create_user(&requester, &body.username, &body.password, body.role)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn delete_user_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.auth.delete_user(&requester, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_role_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(username): Path<String>,
    Json(body): Json<RoleChange>,
) -> ApiResult<UserView> {
    Ok(Json(state.auth.set_role(&requester, &username, body.role).await?))
}

// ============================================================================
// Shared folder handlers
// ============================================================================

async fn list_shares_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
) -> ApiResult<Vec<SharedFolder>> {
    Ok(Json(state.shares.list(&requester).await?))
}

async fn create_share_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Json(body): Json<CreateSharedFolder>,
) -> Result<(StatusCode, Json<SharedFolder>), ApiError> {
    let folder = state.shares.create(&requester, body).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn delete_share_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(name): Path<String>,
) -> ApiResult<SharedFolder> {
    Ok(Json(state.shares.delete(&requester, &name).await?))
}

async fn set_share_user_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path((name, username)): Path<(String, String)>,
    Json(body): Json<ShareUserAccess>,
) -> ApiResult<SharedFolder> {
    let folder = state
        .shares
        .set_user_access(&requester, &name, &username, Some(body.access))
        .await?;
    Ok(Json(folder))
}

async fn revoke_share_user_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path((name, username)): Path<(String, String)>,
) -> ApiResult<SharedFolder> {
    let folder = state
        .shares
        .set_user_access(&requester, &name, &username, None)
        .await?;
    Ok(Json(folder))
}

async fn set_share_app_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path((name, app_id)): Path<(String, String)>,
    Json(body): Json<ShareAppAccess>,
) -> ApiResult<SharedFolder> {
    let folder = state
        .shares
        .set_app_access(&requester, &name, &app_id, body.allowed)
        .await?;
    Ok(Json(folder))
}

// ============================================================================
// Docker settings handlers
// ============================================================================

async fn get_docker_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
) -> ApiResult<DockerConfig> {
    Ok(Json(state.docker.get(&requester).await?))
}

async fn configure_docker_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Json(body): Json<ConfigureDocker>,
) -> ApiResult<DockerConfig> {
    Ok(Json(state.docker.configure(&requester, body).await?))
}

async fn reset_docker_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
) -> ApiResult<DockerConfig> {
    Ok(Json(state.docker.reset(&requester).await?))
}

async fn set_docker_permission_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(username): Path<String>,
    Json(body): Json<DockerPermission>,
) -> ApiResult<DockerConfig> {
    let config = state
        .docker
        .set_user_permission(&requester, &username, body.granted)
        .await?;
    Ok(Json(config))
}

async fn set_app_visibility_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(app_id): Path<String>,
    Json(body): Json<AppVisibility>,
) -> ApiResult<DockerConfig> {
    let config = state
        .docker
        .set_app_visibility(&requester, &app_id, body.users)
        .await?;
    Ok(Json(config))
}

// ============================================================================
// App handlers
// ============================================================================

async fn list_apps_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
) -> ApiResult<AppListing> {
    Ok(Json(state.apps.list(&requester).await?))
}

async fn install_container_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Json(body): Json<InstallContainerRequest>,
) -> Result<(StatusCode, Json<InstallOutcome>), ApiError> {
    let outcome = state.apps.install_container(body, &requester).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn install_stack_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Json(body): Json<InstallStackRequest>,
) -> Result<(StatusCode, Json<InstallOutcome>), ApiError> {
    let outcome = state.apps.install_stack(body, &requester).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn register_external_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Json(body): Json<ExternalAppRequest>,
) -> Result<(StatusCode, Json<InstalledApp>), ApiError> {
    let app = state.apps.register_external_app(body, &requester).await?;
    Ok((StatusCode::CREATED, Json(app)))
}

async fn uninstall_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<UninstallOutcome>), ApiError> {
    let outcome = state.apps.uninstall(&id, &requester).await?;
    let status = if outcome.teardown_scheduled {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

async fn action_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path((id, action)): Path<(String, String)>,
) -> ApiResult<ActionOutcome> {
    let action: ContainerAction = action.parse().map_err(OperationError::Validation)?;
    Ok(Json(state.apps.container_action(&id, action, &requester).await?))
}

async fn rebuild_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<RebuildOutcome> {
    Ok(Json(state.apps.rebuild(&id, &requester).await?))
}

async fn logs_handler(
    State(state): State<Arc<ApiState>>,
    Extension(requester): Extension<Identity>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogsOutcome> {
    Ok(Json(state.apps.logs(&id, query.tail, &requester).await?))
}
