use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::storage::schema::{
    catalog_items, dependents, guardians, households, tasks, xp_requests,
};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = guardians)]
#[diesel(primary_key(user_id))]
pub struct Guardian {
    pub user_id: String,
    pub display_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = guardians)]
pub struct NewGuardian<'a> {
    pub user_id: &'a str,
    pub display_name: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = households)]
pub struct Household {
    pub id: i32,
    pub display_name: String,
    pub join_code: String,
    pub guardian_uid: String,
    pub partner_api_key: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = households)]
pub struct NewHousehold<'a> {
    pub display_name: &'a str,
    pub join_code: &'a str,
    pub guardian_uid: &'a str,
    pub partner_api_key: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = dependents)]
#[diesel(primary_key(user_id))]
#[diesel(belongs_to(Household, foreign_key = household_id))]
pub struct Dependent {
    pub user_id: String,
    pub display_name: String,
    pub household_id: Option<i32>,
    pub xp_balance: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = dependents)]
pub struct NewDependent<'a> {
    pub user_id: &'a str,
    pub display_name: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Household, foreign_key = household_id))]
pub struct Task {
    pub id: i32,
    pub household_id: i32,
    pub description: String,
    pub xp_value: i32,
    pub assigned_dependent_uid: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub household_id: i32,
    pub description: &'a str,
    pub xp_value: i32,
    pub assigned_dependent_uid: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = xp_requests)]
#[diesel(belongs_to(Task, foreign_key = task_id))]
#[diesel(belongs_to(Household, foreign_key = household_id))]
pub struct XpRequest {
    pub id: i32,
    pub household_id: i32,
    pub task_id: i32,
    pub dependent_uid: Option<String>,
    pub requested_xp: Option<i32>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = xp_requests)]
pub struct NewXpRequest<'a> {
    pub household_id: i32,
    pub task_id: i32,
    pub dependent_uid: Option<&'a str>,
    pub requested_xp: Option<i32>,
    pub status: &'a str,
    pub processed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = catalog_items)]
#[diesel(belongs_to(Household, foreign_key = household_id))]
pub struct CatalogItem {
    pub id: i32,
    pub household_id: i32,
    pub product_name: String,
    pub value_in_currency: f64,
    pub currency: String,
    pub xp_cost: i32,
    pub product_code: String,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = catalog_items)]
pub struct NewCatalogItem<'a> {
    pub household_id: i32,
    pub product_name: &'a str,
    pub value_in_currency: f64,
    pub currency: &'a str,
    pub xp_cost: i32,
    pub product_code: &'a str,
    pub image_url: Option<&'a str>,
    pub is_active: bool,
}
