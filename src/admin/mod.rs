//! Admin API.
//!
//! # Routes
//! ```text
//! GET    /health                          (no auth)
//! GET    /api/status
//! GET    /api/namespaces
//! GET    /api/namespaces/{ns}             PUT replaces the whole map
//! GET    /api/namespaces/{ns}/{key}       PUT {value}, DELETE
//! GET    /api/plugins                     PUT [rows] reconciles the list
//! GET    /api/plugins/{key}               PUT editor save
//! PUT    /api/plugins/{key}/content       raw body
//! POST   /api/backup, /api/restore        {path, password}
//! GET    /api/files?path=                 PUT raw body
//! GET    /api/dir?path=
//! GET    /api/forms/wifi/{ap|client}      PUT
//! GET    /api/forms/locations             PUT
//! GET    /api/forms/logging               PUT
//! GET    /api/forms/password              PUT {old_password, new_password, confirm}
//! GET    /api/forms/notifications         PUT
//! GET    /api/forms/webserver             PUT
//! ```

pub mod auth;
pub mod error;
pub mod handlers;

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;
use crate::observability::metrics;

pub use error::ApiError;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/namespaces", get(list_namespaces))
        .route("/namespaces/{ns}", get(get_namespace).put(put_namespace))
        .route(
            "/namespaces/{ns}/{key}",
            get(get_value).put(put_value).delete(delete_value),
        )
        .route("/plugins", get(list_plugins).put(put_plugins))
        .route("/plugins/{key}", get(get_plugin).put(put_plugin))
        .route("/plugins/{key}/content", put(put_plugin_content))
        .route("/backup", post(post_backup))
        .route("/restore", post(post_restore))
        .route("/files", get(get_file).put(put_file))
        .route("/dir", get(list_dir))
        .route("/forms/wifi/{table}", get(get_wifi).put(put_wifi))
        .route("/forms/locations", get(get_locations).put(put_locations))
        .route("/forms/logging", get(get_logging).put(put_logging))
        .route("/forms/password", get(get_password).put(put_password))
        .route(
            "/forms/notifications",
            get(get_notifications).put(put_notifications),
        )
        .route("/forms/webserver", get(get_webserver).put(put_webserver))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(middleware::from_fn(record_request))
        .with_state(state)
}

async fn record_request(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_admin_request(method.as_str(), response.status().as_u16());
    response
}
