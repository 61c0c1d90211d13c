use axum::Json;
use axum::extract::State;
use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use kinpoints_shared::api;
use kinpoints_shared::jwt::{self, JwtClaims};
use tracing::error;

use super::{AppError, AppState};

/// How many days before a session token must be re-issued via resume.
const SESSION_TOKEN_TTL_DAYS: i64 = 30;

/// Authenticated request context, inserted by [`require_bearer`]. Role is
/// not part of it: handlers resolve the role from the store so a freshly
/// picked role takes effect without a new token.
#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub user_id: String,
}

pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let prefix = "Bearer ";
    if !header_str.starts_with(prefix) {
        return unauthorized();
    }
    let token = &header_str[prefix.len()..];

    let claims = match jwt::decode_and_verify(
        token,
        state.config.jwt_secret.as_bytes(),
        &state.config.auth_domain,
    ) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    let auth = AuthCtx {
        user_id: claims.sub,
    };
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

/// Anonymous sign-in: mint a fresh opaque user id and a token for it. No
/// store write happens here; the user record appears at role selection.
pub async fn api_open_session(
    State(state): State<AppState>,
) -> Result<Json<api::SessionResp>, AppError> {
    let user_id = uuid::Uuid::new_v4().to_string();
    let token = issue_session_token(&state, &user_id)?;
    Ok(Json(api::SessionResp { token, user_id }))
}

/// Re-issue a token for a returning user. Only ids that completed role
/// selection can resume; unknown ids get 404 so the client starts over.
pub async fn api_resume_session(
    State(state): State<AppState>,
    Json(body): Json<api::ResumeReq>,
) -> Result<Json<api::SessionResp>, AppError> {
    let known = state
        .store
        .get_guardian(&body.user_id)
        .await
        .map_err(AppError::internal)?
        .is_some()
        || state
            .store
            .get_dependent(&body.user_id)
            .await
            .map_err(AppError::internal)?
            .is_some();
    if !known {
        tracing::warn!(user_id=%body.user_id, "resume: unknown user");
        return Err(AppError::not_found("unknown user"));
    }
    let token = issue_session_token(&state, &body.user_id)?;
    Ok(Json(api::SessionResp {
        token,
        user_id: body.user_id,
    }))
}

pub fn issue_session_token(state: &AppState, user_id: &str) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::days(SESSION_TOKEN_TTL_DAYS)).timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        aud: state.config.auth_domain.clone(),
        exp,
    };
    jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(user_id, error=%e, "session: jwt encode failed");
        AppError::internal(e)
    })
}
