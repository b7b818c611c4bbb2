use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::auth::{issue_token, ROLE_GUEST};
use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    user_id: String,
    expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/guest", post(login_guest))
}

/// Development identity provider: every call mints a fresh guest user.
async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let user_id = format!("guest-{}", Uuid::new_v4());
    let token = issue_token(&state.auth, &user_id, ROLE_GUEST)
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))?;

    tracing::info!("Issued guest token for {}", user_id);
    Ok(Json(AuthResponse {
        token,
        user_id,
        expires_in: state.auth.expiration,
    }))
}
