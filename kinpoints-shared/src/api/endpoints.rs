use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, household_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_session(base: &str) -> String {
    base_join(base, &format!("{}/auth/session", API_V1_PREFIX))
}
pub fn auth_resume(base: &str) -> String {
    base_join(base, &format!("{}/auth/resume", API_V1_PREFIX))
}
pub fn me(base: &str) -> String {
    base_join(base, &format!("{}/me", API_V1_PREFIX))
}
pub fn me_role(base: &str) -> String {
    base_join(base, &format!("{}/me/role", API_V1_PREFIX))
}
pub fn households(base: &str) -> String {
    base_join(base, &format!("{}/households", API_V1_PREFIX))
}
pub fn households_join(base: &str) -> String {
    base_join(base, &format!("{}/households/join", API_V1_PREFIX))
}
pub fn household(base: &str, household_id: i32) -> String {
    base_join(base, &household_scope(household_id))
}
pub fn household_dependents(base: &str, household_id: i32) -> String {
    base_join(base, &format!("{}/dependents", household_scope(household_id)))
}
pub fn household_tasks(base: &str, household_id: i32) -> String {
    base_join(base, &format!("{}/tasks", household_scope(household_id)))
}
pub fn task_close(base: &str, household_id: i32, task_id: i32) -> String {
    base_join(
        base,
        &format!("{}/tasks/{}/close", household_scope(household_id), task_id),
    )
}
pub fn task_requests(base: &str, household_id: i32, task_id: i32) -> String {
    base_join(
        base,
        &format!("{}/tasks/{}/requests", household_scope(household_id), task_id),
    )
}
pub fn household_requests(base: &str, household_id: i32) -> String {
    base_join(base, &format!("{}/requests", household_scope(household_id)))
}
pub fn request_approve(base: &str, household_id: i32, request_id: i32) -> String {
    base_join(
        base,
        &format!(
            "{}/requests/{}/approve",
            household_scope(household_id),
            request_id
        ),
    )
}
pub fn request_deny(base: &str, household_id: i32, request_id: i32) -> String {
    base_join(
        base,
        &format!(
            "{}/requests/{}/deny",
            household_scope(household_id),
            request_id
        ),
    )
}
pub fn redemptions(base: &str, household_id: i32) -> String {
    base_join(base, &format!("{}/redemptions", household_scope(household_id)))
}
pub fn catalog(base: &str, household_id: i32) -> String {
    base_join(base, &format!("{}/catalog", household_scope(household_id)))
}
pub fn events(base: &str, household_id: i32) -> String {
    base_join(base, &format!("{}/events", household_scope(household_id)))
}
pub fn partner_balance(base: &str, api_key: &str) -> String {
    base_join(
        base,
        &format!("{}/partner/balance?api_key={}", API_V1_PREFIX, enc(api_key)),
    )
}
pub fn partner_orders(base: &str, api_key: &str) -> String {
    base_join(
        base,
        &format!("{}/partner/orders?api_key={}", API_V1_PREFIX, enc(api_key)),
    )
}
pub fn partner_products(base: &str, api_key: &str, include_test_products: bool) -> String {
    base_join(
        base,
        &format!(
            "{}/partner/products?api_key={}&include_test_products={}",
            API_V1_PREFIX,
            enc(api_key),
            include_test_products
        ),
    )
}
pub fn partner_purchase_test(base: &str, api_key: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/partner/purchase-test?api_key={}",
            API_V1_PREFIX,
            enc(api_key)
        ),
    )
}
