use axum::Json;
use axum::extract::{Extension, State};
use kinpoints_shared::api;
use kinpoints_shared::auth::Role;

use super::auth::AuthCtx;
use super::{AppError, AppState};
use crate::storage::models::{Dependent, Household};

/// Resolve the caller's role from the store. Guardian wins if both rows
/// somehow exist; role selection prevents that in practice.
pub async fn resolve_role(state: &AppState, user_id: &str) -> Result<Option<Role>, AppError> {
    if state
        .store
        .get_guardian(user_id)
        .await
        .map_err(AppError::internal)?
        .is_some()
    {
        return Ok(Some(Role::Guardian));
    }
    if state
        .store
        .get_dependent(user_id)
        .await
        .map_err(AppError::internal)?
        .is_some()
    {
        return Ok(Some(Role::Dependent));
    }
    Ok(None)
}

/// The caller must be the guardian who owns household `hid`.
pub async fn require_guardian(
    state: &AppState,
    auth: &AuthCtx,
    hid: i32,
) -> Result<Household, AppError> {
    let household = state
        .store
        .get_household(hid)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("household not found: {}", hid)))?;
    if household.guardian_uid != auth.user_id {
        tracing::warn!(user_id=%auth.user_id, household_id=hid, "acl: not the household guardian");
        return Err(AppError::forbidden());
    }
    Ok(household)
}

/// The caller must be a dependent attached to household `hid`.
pub async fn require_dependent(
    state: &AppState,
    auth: &AuthCtx,
    hid: i32,
) -> Result<Dependent, AppError> {
    let dependent = state
        .store
        .get_dependent(&auth.user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or(AppError::Forbidden)?;
    if dependent.household_id != Some(hid) {
        tracing::warn!(user_id=%auth.user_id, household_id=hid, "acl: dependent outside household");
        return Err(AppError::forbidden());
    }
    Ok(dependent)
}

/// Either side of the household: the owning guardian or an attached
/// dependent. Returns the caller's role within it.
pub async fn require_member(state: &AppState, auth: &AuthCtx, hid: i32) -> Result<Role, AppError> {
    if let Some(household) = state
        .store
        .get_household(hid)
        .await
        .map_err(AppError::internal)?
        && household.guardian_uid == auth.user_id
    {
        return Ok(Role::Guardian);
    }
    require_dependent(state, auth, hid).await?;
    Ok(Role::Dependent)
}

pub async fn api_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::MeResp>, AppError> {
    if let Some(guardian) = state
        .store
        .get_guardian(&auth.user_id)
        .await
        .map_err(AppError::internal)?
    {
        let household = state
            .store
            .household_for_guardian(&auth.user_id)
            .await
            .map_err(AppError::internal)?;
        return Ok(Json(api::MeResp {
            user_id: auth.user_id,
            role: Some(Role::Guardian),
            household_id: household.map(|h| h.id),
            display_name: Some(guardian.display_name),
            xp_balance: None,
        }));
    }
    if let Some(dependent) = state
        .store
        .get_dependent(&auth.user_id)
        .await
        .map_err(AppError::internal)?
    {
        return Ok(Json(api::MeResp {
            user_id: auth.user_id,
            role: Some(Role::Dependent),
            household_id: dependent.household_id,
            display_name: Some(dependent.display_name),
            xp_balance: Some(dependent.xp_balance),
        }));
    }
    // Fresh session: no role picked yet
    Ok(Json(api::MeResp {
        user_id: auth.user_id,
        role: None,
        household_id: None,
        display_name: None,
        xp_balance: None,
    }))
}

pub async fn api_select_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::RoleSelectReq>,
) -> Result<Json<api::MeResp>, AppError> {
    let name = body.display_name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("display_name cannot be empty"));
    }
    // Roles are permanent once picked; re-picking the same one is a no-op
    if let Some(existing) = resolve_role(&state, &auth.user_id).await?
        && existing != body.role
    {
        return Err(AppError::conflict("role already selected"));
    }
    match body.role {
        Role::Guardian => state
            .store
            .ensure_guardian(&auth.user_id, name)
            .await
            .map_err(AppError::internal)?,
        Role::Dependent => state
            .store
            .ensure_dependent(&auth.user_id, name)
            .await
            .map_err(AppError::internal)?,
    }
    api_me(State(state), Extension(auth)).await
}
