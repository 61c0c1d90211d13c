//! Minimal typed REST client for consumers (integration tests, native
//! clients). Feature-gated by `rest-client` to avoid pulling reqwest into
//! the server binary's dependency set.

use once_cell::sync::Lazy;
use std::time::Duration;

use super::endpoints as ep;
use super::*;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    /// HTTP status of a non-success response, if that is what failed.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(180))
        .timeout(Duration::from_secs(180))
        .build()
        .expect("failed to build HTTP client")
});

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn send_get<T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: &str,
) -> Result<T, RestError> {
    let res = HTTP_CLIENT
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn send_post<B: serde::Serialize, T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: &str,
    body: &B,
) -> Result<T, RestError> {
    let res = HTTP_CLIENT
        .post(url)
        .bearer_auth(bearer)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn send_post_empty<T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: &str,
) -> Result<T, RestError> {
    let res = HTTP_CLIENT
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn open_session(base: &str) -> Result<SessionResp, RestError> {
    let res = HTTP_CLIENT
        .post(ep::auth_session(base))
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn resume_session(base: &str, user_id: &str) -> Result<SessionResp, RestError> {
    let res = HTTP_CLIENT
        .post(ep::auth_resume(base))
        .json(&ResumeReq {
            user_id: user_id.to_string(),
        })
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn me(base: &str, bearer: &str) -> Result<MeResp, RestError> {
    send_get(ep::me(base), bearer).await
}

pub async fn select_role(base: &str, bearer: &str, req: &RoleSelectReq) -> Result<MeResp, RestError> {
    send_post(ep::me_role(base), bearer, req).await
}

pub async fn create_household(
    base: &str,
    bearer: &str,
    req: &CreateHouseholdReq,
) -> Result<CreateHouseholdResp, RestError> {
    send_post(ep::households(base), bearer, req).await
}

pub async fn join_household(
    base: &str,
    bearer: &str,
    req: &JoinHouseholdReq,
) -> Result<JoinHouseholdResp, RestError> {
    send_post(ep::households_join(base), bearer, req).await
}

pub async fn get_household(
    base: &str,
    bearer: &str,
    household_id: i32,
) -> Result<HouseholdDto, RestError> {
    send_get(ep::household(base, household_id), bearer).await
}

pub async fn list_dependents(
    base: &str,
    bearer: &str,
    household_id: i32,
) -> Result<Vec<DependentDto>, RestError> {
    send_get(ep::household_dependents(base, household_id), bearer).await
}

pub async fn create_task(
    base: &str,
    bearer: &str,
    household_id: i32,
    req: &CreateTaskReq,
) -> Result<TaskDto, RestError> {
    send_post(ep::household_tasks(base, household_id), bearer, req).await
}

pub async fn list_tasks(
    base: &str,
    bearer: &str,
    household_id: i32,
) -> Result<Vec<TaskDto>, RestError> {
    send_get(ep::household_tasks(base, household_id), bearer).await
}

pub async fn close_task(
    base: &str,
    bearer: &str,
    household_id: i32,
    task_id: i32,
) -> Result<(), RestError> {
    let res = HTTP_CLIENT
        .post(ep::task_close(base, household_id, task_id))
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}

pub async fn submit_request(
    base: &str,
    bearer: &str,
    household_id: i32,
    task_id: i32,
) -> Result<XpRequestDto, RestError> {
    send_post_empty(ep::task_requests(base, household_id, task_id), bearer).await
}

pub async fn list_requests(
    base: &str,
    bearer: &str,
    household_id: i32,
) -> Result<Vec<XpRequestDto>, RestError> {
    send_get(ep::household_requests(base, household_id), bearer).await
}

pub async fn approve_request(
    base: &str,
    bearer: &str,
    household_id: i32,
    request_id: i32,
) -> Result<ApproveResp, RestError> {
    send_post_empty(ep::request_approve(base, household_id, request_id), bearer).await
}

pub async fn deny_request(
    base: &str,
    bearer: &str,
    household_id: i32,
    request_id: i32,
) -> Result<(), RestError> {
    let res = HTTP_CLIENT
        .post(ep::request_deny(base, household_id, request_id))
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}

pub async fn redeem(base: &str, bearer: &str, household_id: i32) -> Result<RedeemResp, RestError> {
    send_post_empty(ep::redemptions(base, household_id), bearer).await
}

pub async fn list_catalog(
    base: &str,
    bearer: &str,
    household_id: i32,
) -> Result<Vec<CatalogItemDto>, RestError> {
    send_get(ep::catalog(base, household_id), bearer).await
}

pub async fn add_catalog_item(
    base: &str,
    bearer: &str,
    household_id: i32,
    req: &NewCatalogItemReq,
) -> Result<CatalogItemDto, RestError> {
    send_post(ep::catalog(base, household_id), bearer, req).await
}
