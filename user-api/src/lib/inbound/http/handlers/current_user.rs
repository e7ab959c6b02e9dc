use axum::extract::State;
use axum::http::StatusCode;

use super::ApiError;
use super::ApiSuccess;
use super::UserData;
use crate::inbound::http::middleware::AuthenticatedUser;
use crate::inbound::http::router::AppState;

/// Record of the user the presented token belongs to.
pub async fn current_user(
    State(state): State<AppState>,
    identity: AuthenticatedUser,
) -> Result<ApiSuccess<UserData>, ApiError> {
    state
        .user_service
        .get_user(&identity.user_id)
        .await
        .map_err(ApiError::from)
        .map(|ref user| ApiSuccess::new(StatusCode::OK, user.into()))
}
