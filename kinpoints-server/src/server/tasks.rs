use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use kinpoints_shared::api::{self, ServerEvent};
use kinpoints_shared::auth::Role;
use serde::Deserialize;

use super::auth::AuthCtx;
use super::identity::{require_guardian, require_member};
use super::{AppError, AppState};

#[derive(Deserialize)]
pub(super) struct ScopePath {
    household_id: i32,
}

#[derive(Deserialize)]
pub(super) struct TaskPath {
    household_id: i32,
    task_id: i32,
}

pub async fn api_create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
    Json(body): Json<api::CreateTaskReq>,
) -> Result<(StatusCode, Json<api::TaskDto>), AppError> {
    require_guardian(&state, &auth, p.household_id).await?;
    let description = body.description.trim();
    if description.is_empty() {
        return Err(AppError::bad_request("description cannot be empty"));
    }
    if body.xp_value <= 0 {
        return Err(AppError::bad_request("xp_value must be positive"));
    }
    // Assignee must be a dependent of this household
    let assignee = state
        .store
        .get_dependent(&body.assigned_dependent)
        .await
        .map_err(AppError::internal)?
        .filter(|d| d.household_id == Some(p.household_id))
        .ok_or_else(|| {
            AppError::bad_request(format!(
                "dependent not in household: {}",
                body.assigned_dependent
            ))
        })?;
    let task = state
        .store
        .create_task(p.household_id, description, body.xp_value, &assignee.user_id)
        .await
        .map_err(AppError::internal)?;
    state.events.publish(
        p.household_id,
        ServerEvent::TasksChanged {
            household_id: p.household_id,
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(api::TaskDto {
            id: task.id,
            description: task.description,
            xp_value: task.xp_value,
            assigned_dependent: task.assigned_dependent_uid,
            pending: false,
        }),
    ))
}

/// Guardians see every open task of the household; dependents see only
/// their own assignments, flagged when a pending request is outstanding.
pub async fn api_list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
) -> Result<Json<Vec<api::TaskDto>>, AppError> {
    let role = require_member(&state, &auth, p.household_id).await?;
    let items = match role {
        Role::Guardian => state
            .store
            .list_active_tasks(p.household_id)
            .await
            .map_err(AppError::internal)?
            .into_iter()
            .map(|t| api::TaskDto {
                id: t.id,
                description: t.description,
                xp_value: t.xp_value,
                assigned_dependent: t.assigned_dependent_uid,
                pending: false,
            })
            .collect(),
        Role::Dependent => state
            .store
            .list_active_tasks_for_dependent(p.household_id, &auth.user_id)
            .await
            .map_err(AppError::internal)?
            .into_iter()
            .map(|(t, pending)| api::TaskDto {
                id: t.id,
                description: t.description,
                xp_value: t.xp_value,
                assigned_dependent: t.assigned_dependent_uid,
                pending,
            })
            .collect(),
    };
    Ok(Json(items))
}

/// Retire a task without deleting its history: outstanding requests are
/// force-approved (without crediting XP) and the task leaves all active
/// views.
pub async fn api_close_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<TaskPath>,
) -> Result<StatusCode, AppError> {
    require_guardian(&state, &auth, p.household_id).await?;
    let closed = state
        .store
        .close_task(p.household_id, p.task_id)
        .await
        .map_err(AppError::internal)?;
    if !closed {
        return Err(AppError::not_found(format!("task not found: {}", p.task_id)));
    }
    tracing::info!(task_id = p.task_id, "task closed");
    state.events.publish(
        p.household_id,
        ServerEvent::TasksChanged {
            household_id: p.household_id,
        },
    );
    state.events.publish(
        p.household_id,
        ServerEvent::RequestsChanged {
            household_id: p.household_id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}
