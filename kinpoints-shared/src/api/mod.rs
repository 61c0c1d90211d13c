use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::RequestStatus;

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

pub fn household_scope(household_id: i32) -> String {
    format!("{}/households/{}", API_V1_PREFIX, household_id)
}

// Sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResp {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResumeReq {
    pub user_id: String,
}

// Identity
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResp {
    pub user_id: String,
    /// None until the user picks a role.
    pub role: Option<Role>,
    /// None until the user creates or joins a household.
    pub household_id: Option<i32>,
    pub display_name: Option<String>,
    /// Present for dependents only.
    pub xp_balance: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleSelectReq {
    pub role: Role,
    pub display_name: String,
}

// Households
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHouseholdReq {
    pub name: String,
    pub partner_api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHouseholdResp {
    pub household_id: i32,
    pub join_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinHouseholdReq {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinHouseholdResp {
    pub household_id: i32,
    pub household_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HouseholdDto {
    pub id: i32,
    pub name: String,
    pub join_code: String,
    pub guardian_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependentDto {
    pub user_id: String,
    pub display_name: String,
    pub xp_balance: i32,
}

// Tasks
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskReq {
    pub description: String,
    pub xp_value: i32,
    pub assigned_dependent: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: i32,
    pub description: String,
    pub xp_value: i32,
    pub assigned_dependent: String,
    /// Set in the dependent view: the caller has an outstanding pending
    /// request for this task.
    #[serde(default)]
    pub pending: bool,
}

// XP requests
#[derive(Debug, Serialize, Deserialize)]
pub struct XpRequestDto {
    pub id: i32,
    pub task_id: i32,
    pub dependent_id: String,
    pub dependent_name: String,
    pub task_description: String,
    pub requested_xp: i32,
    pub status: RequestStatus,
    pub created_at: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveResp {
    pub dependent_id: String,
    pub xp_balance: i32,
}

// Redemption
#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResp {
    pub xp_balance: i32,
}

// Catalog
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogItemDto {
    pub id: i32,
    pub product_name: String,
    pub value_in_currency: f64,
    pub currency: String,
    pub xp_cost: i32,
    pub product_code: String,
    pub image_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewCatalogItemReq {
    pub product_name: String,
    pub value_in_currency: f64,
    pub currency: String,
    pub xp_cost: i32,
    pub product_code: String,
    pub image_url: Option<String>,
}

/// Change notification fanned out to every open session of a household.
/// Consumers re-fetch the affected list; payloads are hints, not deltas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    TasksChanged { household_id: i32 },
    RequestsChanged { household_id: i32 },
    BalanceChanged { dependent_id: String, xp_balance: i32 },
    CatalogChanged { household_id: i32 },
}

/// Uniform user-facing failure body: message text plus severity.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDto {
    pub error: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Info,
}
