//! Pass-through endpoints for the gift-card partner API. The browser
//! cannot call the partner directly (CORS, credential handling), so the
//! server forwards on its behalf using the api_key the client supplies.

use axum::Json;
use axum::extract::{Extension, Query, State};
use serde::Deserialize;
use serde_json::Value;

use super::auth::AuthCtx;
use super::{AppError, AppState};

#[derive(Deserialize)]
pub(super) struct PartnerQuery {
    api_key: Option<String>,
    #[serde(default)]
    include_test_products: bool,
}

fn require_key(q: &PartnerQuery) -> Result<&str, AppError> {
    q.api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::bad_request("api_key query parameter required"))
}

pub async fn api_partner_balance(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Query(q): Query<PartnerQuery>,
) -> Result<Json<Value>, AppError> {
    let key = require_key(&q)?;
    Ok(Json(state.commerce.account_balance(key).await?))
}

pub async fn api_partner_orders(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Query(q): Query<PartnerQuery>,
) -> Result<Json<Value>, AppError> {
    let key = require_key(&q)?;
    Ok(Json(state.commerce.orders(key).await?))
}

pub async fn api_partner_products(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Query(q): Query<PartnerQuery>,
) -> Result<Json<Value>, AppError> {
    let key = require_key(&q)?;
    Ok(Json(
        state.commerce.products(key, q.include_test_products).await?,
    ))
}

pub async fn api_partner_purchase_test(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Query(q): Query<PartnerQuery>,
) -> Result<Json<Value>, AppError> {
    let key = require_key(&q)?;
    Ok(Json(state.commerce.purchase_test(key).await?))
}
