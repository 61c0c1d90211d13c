use axum::Json;
use axum::extract::{Extension, Path, State};
use kinpoints_shared::api;
use kinpoints_shared::auth::Role;
use rand::Rng;
use serde::Deserialize;

use super::auth::AuthCtx;
use super::identity::{require_guardian, require_member, resolve_role};
use super::{AppError, AppState};

const JOIN_CODE_LEN: usize = 6;
const JOIN_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Deserialize)]
pub(super) struct ScopePath {
    household_id: i32,
}

pub async fn api_create_household(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateHouseholdReq>,
) -> Result<Json<api::CreateHouseholdResp>, AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name cannot be empty"));
    }
    let partner_key = body.partner_api_key.trim();
    if partner_key.is_empty() {
        return Err(AppError::bad_request("partner_api_key cannot be empty"));
    }
    // Dependents cannot own a household; anyone else gets a guardian
    // record on the spot if role selection was skipped
    if resolve_role(&state, &auth.user_id).await? == Some(Role::Dependent) {
        return Err(AppError::forbidden());
    }
    state
        .store
        .ensure_guardian(&auth.user_id, &format!("Guardian {}", auth.user_id))
        .await
        .map_err(AppError::internal)?;
    if state
        .store
        .household_for_guardian(&auth.user_id)
        .await
        .map_err(AppError::internal)?
        .is_some()
    {
        return Err(AppError::conflict("household already exists"));
    }
    let code = generate_join_code();
    let household = state
        .store
        .create_household(name, &code, &auth.user_id, partner_key)
        .await
        .map_err(AppError::internal)?;
    tracing::info!(household_id = household.id, "household created");
    Ok(Json(api::CreateHouseholdResp {
        household_id: household.id,
        join_code: household.join_code,
    }))
}

pub async fn api_join_household(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::JoinHouseholdReq>,
) -> Result<Json<api::JoinHouseholdResp>, AppError> {
    // Exact, case-sensitive match; codes are issued uppercase
    let code = body.code.trim().to_string();
    if code.is_empty() {
        return Err(AppError::bad_request("code cannot be empty"));
    }
    // Guardians cannot double as dependents
    if resolve_role(&state, &auth.user_id).await? == Some(Role::Guardian) {
        return Err(AppError::forbidden());
    }
    let household = state
        .store
        .find_household_by_code(&code)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("family code not found"))?;
    state
        .store
        .ensure_dependent(&auth.user_id, &format!("Dependent {}", auth.user_id))
        .await
        .map_err(AppError::internal)?;
    let dependent = state
        .store
        .get_dependent(&auth.user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::internal("dependent record missing after create"))?;
    if let Some(current) = dependent.household_id
        && current != household.id
    {
        return Err(AppError::conflict("already in another household"));
    }
    state
        .store
        .attach_dependent(&auth.user_id, household.id)
        .await
        .map_err(AppError::internal)?;
    tracing::info!(user_id=%auth.user_id, household_id=household.id, "dependent joined household");
    Ok(Json(api::JoinHouseholdResp {
        household_id: household.id,
        household_name: household.display_name,
    }))
}

pub async fn api_get_household(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
) -> Result<Json<api::HouseholdDto>, AppError> {
    require_member(&state, &auth, p.household_id).await?;
    let household = state
        .store
        .get_household(p.household_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("household not found: {}", p.household_id)))?;
    Ok(Json(api::HouseholdDto {
        id: household.id,
        name: household.display_name,
        join_code: household.join_code,
        guardian_id: household.guardian_uid,
    }))
}

pub async fn api_list_dependents(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
) -> Result<Json<Vec<api::DependentDto>>, AppError> {
    require_guardian(&state, &auth, p.household_id).await?;
    let rows = state
        .store
        .list_dependents(p.household_id)
        .await
        .map_err(AppError::internal)?;
    let items = rows
        .into_iter()
        .map(|d| api::DependentDto {
            user_id: d.user_id,
            display_name: d.display_name,
            xp_balance: d.xp_balance,
        })
        .collect();
    Ok(Json(items))
}
