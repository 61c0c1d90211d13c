use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use kinpoints_shared::api::{self, ServerEvent};
use kinpoints_shared::auth::Role;
use kinpoints_shared::domain::RequestStatus;
use serde::Deserialize;
use std::str::FromStr;

use super::auth::AuthCtx;
use super::identity::{require_dependent, require_guardian, require_member};
use super::{AppError, AppState};
use crate::storage::{DecisionOutcome, SubmitOutcome};

#[derive(Deserialize)]
pub(super) struct ScopePath {
    household_id: i32,
}

#[derive(Deserialize)]
pub(super) struct TaskPath {
    household_id: i32,
    task_id: i32,
}

#[derive(Deserialize)]
pub(super) struct RequestPath {
    household_id: i32,
    request_id: i32,
}

fn rfc3339(dt: chrono::NaiveDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339()
}

pub async fn api_submit_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<TaskPath>,
) -> Result<(StatusCode, Json<api::XpRequestDto>), AppError> {
    let dependent = require_dependent(&state, &auth, p.household_id).await?;
    let outcome = state
        .store
        .submit_request(p.household_id, p.task_id, &auth.user_id)
        .await
        .map_err(AppError::internal)?;
    let row = match outcome {
        SubmitOutcome::Created(row) => row,
        SubmitOutcome::AlreadyPending => {
            return Err(AppError::conflict(
                "you already have a pending request for this task",
            ));
        }
        SubmitOutcome::TaskNotFound => {
            return Err(AppError::not_found(format!("task not found: {}", p.task_id)));
        }
    };
    let task = state
        .store
        .get_task(p.task_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::internal("task vanished after request insert"))?;
    state.events.publish(
        p.household_id,
        ServerEvent::RequestsChanged {
            household_id: p.household_id,
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(api::XpRequestDto {
            id: row.id,
            task_id: row.task_id,
            dependent_id: auth.user_id,
            dependent_name: dependent.display_name,
            task_description: task.description,
            requested_xp: row.requested_xp.unwrap_or(task.xp_value),
            status: RequestStatus::Pending,
            created_at: rfc3339(row.created_at),
        }),
    ))
}

/// Pending requests only. Guardians see the whole household; dependents
/// see just their own.
pub async fn api_list_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
) -> Result<Json<Vec<api::XpRequestDto>>, AppError> {
    let role = require_member(&state, &auth, p.household_id).await?;
    let only = match role {
        Role::Guardian => None,
        Role::Dependent => Some(auth.user_id.as_str()),
    };
    let rows = state
        .store
        .list_pending_requests(p.household_id, only)
        .await
        .map_err(AppError::internal)?;
    let items = rows
        .into_iter()
        .map(|(r, dependent_name, task_description)| api::XpRequestDto {
            id: r.id,
            task_id: r.task_id,
            dependent_id: r.dependent_uid.unwrap_or_default(),
            dependent_name,
            task_description,
            requested_xp: r.requested_xp.unwrap_or(0),
            status: RequestStatus::from_str(&r.status).unwrap_or(RequestStatus::Pending),
            created_at: rfc3339(r.created_at),
        })
        .collect();
    Ok(Json(items))
}

pub async fn api_approve_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<RequestPath>,
) -> Result<Json<api::ApproveResp>, AppError> {
    require_guardian(&state, &auth, p.household_id).await?;
    let outcome = state
        .store
        .decide_request(p.household_id, p.request_id, true)
        .await
        .map_err(AppError::internal)?;
    let (dependent_uid, new_balance) = match outcome {
        DecisionOutcome::Applied {
            dependent_uid: Some(dep),
            new_balance: Some(balance),
            ..
        } => (dep, balance),
        DecisionOutcome::Applied { .. } => {
            return Err(AppError::internal("pending request without requester"));
        }
        DecisionOutcome::NotPending => {
            return Err(AppError::conflict("request already processed"));
        }
        DecisionOutcome::NotFound => {
            return Err(AppError::not_found(format!(
                "request not found: {}",
                p.request_id
            )));
        }
    };
    tracing::info!(request_id = p.request_id, dependent_id=%dependent_uid, xp_balance = new_balance, "request approved");
    state.events.publish(
        p.household_id,
        ServerEvent::RequestsChanged {
            household_id: p.household_id,
        },
    );
    // Approval consumes the task; active lists change too
    state.events.publish(
        p.household_id,
        ServerEvent::TasksChanged {
            household_id: p.household_id,
        },
    );
    state.events.publish(
        p.household_id,
        ServerEvent::BalanceChanged {
            dependent_id: dependent_uid.clone(),
            xp_balance: new_balance,
        },
    );
    Ok(Json(api::ApproveResp {
        dependent_id: dependent_uid,
        xp_balance: new_balance,
    }))
}

pub async fn api_deny_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<RequestPath>,
) -> Result<StatusCode, AppError> {
    require_guardian(&state, &auth, p.household_id).await?;
    let outcome = state
        .store
        .decide_request(p.household_id, p.request_id, false)
        .await
        .map_err(AppError::internal)?;
    match outcome {
        DecisionOutcome::Applied { .. } => {}
        DecisionOutcome::NotPending => {
            return Err(AppError::conflict("request already processed"));
        }
        DecisionOutcome::NotFound => {
            return Err(AppError::not_found(format!(
                "request not found: {}",
                p.request_id
            )));
        }
    }
    tracing::info!(request_id = p.request_id, "request denied");
    state.events.publish(
        p.household_id,
        ServerEvent::RequestsChanged {
            household_id: p.household_id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}
