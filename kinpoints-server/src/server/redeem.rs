use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use kinpoints_shared::api::{self, ServerEvent};
use serde::Deserialize;

use super::auth::AuthCtx;
use super::identity::{require_dependent, require_guardian, require_member};
use super::{AppError, AppState};

/// Flat price of one gift-card redemption.
const REDEEM_COST_XP: i32 = 100;

#[derive(Deserialize)]
pub(super) struct ScopePath {
    household_id: i32,
}

/// Spend XP on a gift card. The partner purchase runs as a probe first;
/// XP only leaves the balance after the partner accepted the order, and
/// the debit re-checks the balance so a concurrent spend cannot overdraw.
pub async fn api_redeem(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
) -> Result<Json<api::RedeemResp>, AppError> {
    let dependent = require_dependent(&state, &auth, p.household_id).await?;
    if dependent.xp_balance < REDEEM_COST_XP {
        return Err(AppError::bad_request(format!(
            "not enough XP: need {}, have {}",
            REDEEM_COST_XP, dependent.xp_balance
        )));
    }
    let household = state
        .store
        .get_household(p.household_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("household not found: {}", p.household_id)))?;

    state
        .commerce
        .purchase_test(&household.partner_api_key)
        .await?;

    let new_balance = state
        .store
        .debit_balance(&auth.user_id, REDEEM_COST_XP)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::conflict("balance changed, redemption aborted"))?;
    tracing::info!(user_id=%auth.user_id, xp_balance = new_balance, "redemption completed");
    state.events.publish(
        p.household_id,
        ServerEvent::BalanceChanged {
            dependent_id: auth.user_id,
            xp_balance: new_balance,
        },
    );
    Ok(Json(api::RedeemResp {
        xp_balance: new_balance,
    }))
}

pub async fn api_list_catalog(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
) -> Result<Json<Vec<api::CatalogItemDto>>, AppError> {
    require_member(&state, &auth, p.household_id).await?;
    let rows = state
        .store
        .list_catalog(p.household_id)
        .await
        .map_err(AppError::internal)?;
    let items = rows
        .into_iter()
        .map(|c| api::CatalogItemDto {
            id: c.id,
            product_name: c.product_name,
            value_in_currency: c.value_in_currency,
            currency: c.currency,
            xp_cost: c.xp_cost,
            product_code: c.product_code,
            image_url: c.image_url,
            is_active: c.is_active,
        })
        .collect();
    Ok(Json(items))
}

pub async fn api_add_catalog_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
    Json(body): Json<api::NewCatalogItemReq>,
) -> Result<(StatusCode, Json<api::CatalogItemDto>), AppError> {
    require_guardian(&state, &auth, p.household_id).await?;
    if body.product_name.trim().is_empty() {
        return Err(AppError::bad_request("product_name cannot be empty"));
    }
    if body.xp_cost <= 0 {
        return Err(AppError::bad_request("xp_cost must be positive"));
    }
    let item = state
        .store
        .add_catalog_item(
            p.household_id,
            body.product_name.trim(),
            body.value_in_currency,
            &body.currency,
            body.xp_cost,
            &body.product_code,
            body.image_url.as_deref(),
        )
        .await
        .map_err(AppError::internal)?;
    state.events.publish(
        p.household_id,
        ServerEvent::CatalogChanged {
            household_id: p.household_id,
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(api::CatalogItemDto {
            id: item.id,
            product_name: item.product_name,
            value_in_currency: item.value_in_currency,
            currency: item.currency,
            xp_cost: item.xp_cost,
            product_code: item.product_code,
            image_url: item.image_url,
            is_active: item.is_active,
        }),
    ))
}
