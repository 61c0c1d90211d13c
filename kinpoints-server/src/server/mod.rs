pub mod auth;
mod config;
pub mod events;
mod households;
mod identity;
mod redeem;
mod relay;
mod requests;
mod tasks;

use crate::commerce::CommerceClient;
use crate::server::auth::AuthCtx;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Router,
    http::{Method, StatusCode, header},
    routing::{get, post},
};
pub use config::AppConfig;
use kinpoints_shared::api::{ErrorDto, Severity};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    pub commerce: CommerceClient,
    pub events: events::EventHub,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Self {
        let commerce = CommerceClient::new(&config.partner_api_base);
        Self {
            config,
            store,
            commerce,
            events: events::EventHub::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let scoped = Router::new()
        .route("/", get(households::api_get_household))
        .route("/dependents", get(households::api_list_dependents))
        .route("/tasks", get(tasks::api_list_tasks))
        .route("/tasks", post(tasks::api_create_task))
        .route("/tasks/{task_id}/close", post(tasks::api_close_task))
        .route(
            "/tasks/{task_id}/requests",
            post(requests::api_submit_request),
        )
        .route("/requests", get(requests::api_list_requests))
        .route(
            "/requests/{request_id}/approve",
            post(requests::api_approve_request),
        )
        .route(
            "/requests/{request_id}/deny",
            post(requests::api_deny_request),
        )
        .route("/redemptions", post(redeem::api_redeem))
        .route("/catalog", get(redeem::api_list_catalog))
        .route("/catalog", post(redeem::api_add_catalog_item))
        .route("/events", get(events::api_events));

    let private = Router::new()
        .route("/api/v1/me", get(identity::api_me))
        .route("/api/v1/me/role", post(identity::api_select_role))
        .route("/api/v1/households", post(households::api_create_household))
        .route(
            "/api/v1/households/join",
            post(households::api_join_household),
        )
        .nest("/api/v1/households/{household_id}", scoped)
        .route("/api/v1/partner/balance", get(relay::api_partner_balance))
        .route("/api/v1/partner/orders", get(relay::api_partner_orders))
        .route("/api/v1/partner/products", get(relay::api_partner_products))
        .route(
            "/api/v1/partner/purchase-test",
            post(relay::api_partner_purchase_test),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(middleware::from_fn(set_auth_span_fields));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            user_id = tracing::field::Empty,
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/auth/session", post(auth::api_open_session))
        .route("/api/v1/auth/resume", post(auth::api_resume_session))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    // Put into request extensions for trace layer & handlers
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS; harmless otherwise
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            HeaderName::from_static("expires"),
            HeaderValue::from_static("0"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        Span::current().record("user_id", tracing::field::display(&auth.user_id));
    }
    Ok(next.run(req).await)
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    /// 409 with `severity: info`; the client shows it as a notice, not a
    /// failure (e.g. submitting a duplicate pending request).
    Conflict(String),
    /// Partner answered with an error; relay its status and body.
    Upstream { status: u16, body: String },
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, severity, kind, detail) = match self {
            AppError::BadRequest(m) => {
                (StatusCode::BAD_REQUEST, m, Severity::Error, "bad_request", None)
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                Severity::Error,
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden".into(),
                Severity::Error,
                "forbidden",
                None,
            ),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, Severity::Error, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, Severity::Info, "conflict", None),
            AppError::Upstream { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
                Severity::Error,
                "upstream",
                None,
            ),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                Severity::Error,
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else if severity == Severity::Info {
            tracing::info!(status = %status, kind = kind, message = %msg, "request rejected");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorDto {
            error: msg,
            severity,
        });
        (status, body).into_response()
    }
}

impl From<crate::commerce::CommerceError> for AppError {
    fn from(e: crate::commerce::CommerceError) -> Self {
        match e {
            crate::commerce::CommerceError::Status { status, body } => {
                AppError::Upstream { status, body }
            }
            other => AppError::internal(other),
        }
    }
}
