//! JSON handlers of the admin API.
//!
//! Store, plugin, archive and file operations do blocking I/O and run on the
//! blocking pool. A restore, once started there, runs to completion even if
//! the request times out.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::error::ApiError;
use crate::backup::{BackupSummary, RestoreSummary};
use crate::error::CfgResult;
use crate::forms::{
    self, FormOutcome, Location, LocationRow, LoggingForm, NotificationForm, PasswordChanged,
    PasswordForm, PasswordStatus, WebServerForm, WifiTable, WifiTableForm, WifiTableView,
};
use crate::http::server::AppState;
use crate::plugins::{PluginDescriptor, PluginEdit, PluginRow, PluginView, ReconcileOutcome};
use crate::store::{ParamMap, StorePhase};
use crate::vfs::DirEntry;

type ApiResult<T> = Result<T, ApiError>;

/// Run a blocking operation off the async workers.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> CfgResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub phase: StorePhase,
    pub namespaces: usize,
    pub plugins: usize,
}

#[derive(Deserialize)]
pub struct ValueBody {
    pub value: String,
}

#[derive(Deserialize)]
pub struct ArchiveRequest {
    pub path: String,
    /// Empty selects the module password.
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct PathQuery {
    pub path: String,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<SystemStatus>> {
    blocking(move || {
        Ok(SystemStatus {
            version: env!("CARGO_PKG_VERSION"),
            phase: state.store.phase(),
            namespaces: state.store.namespaces()?.len(),
            plugins: state.plugins.list_descriptors().len(),
        })
    })
    .await
    .map(Json)
}

// --- namespaces ---

pub async fn list_namespaces(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    blocking(move || Ok(state.store.namespaces()?)).await.map(Json)
}

pub async fn get_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> ApiResult<Json<ParamMap>> {
    blocking(move || {
        crate::store::validate_namespace(&namespace)?;
        Ok(state.store.get_map(&namespace))
    })
    .await
    .map(Json)
}

pub async fn put_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(map): Json<ParamMap>,
) -> ApiResult<StatusCode> {
    blocking(move || Ok(state.store.set_map(&namespace, map)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_value(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> ApiResult<Json<ValueView>> {
    let lookup = key.clone();
    let value = blocking(move || {
        crate::store::validate_namespace(&namespace)?;
        Ok(state.store.snapshot(&namespace).get(&lookup).cloned())
    })
    .await?;
    match value {
        Some(value) => Ok(Json(ValueView { key, value })),
        None => Err(ApiError::NotFound(format!("key `{}`", key))),
    }
}

#[derive(Serialize)]
pub struct ValueView {
    pub key: String,
    pub value: String,
}

pub async fn put_value(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    Json(body): Json<ValueBody>,
) -> ApiResult<StatusCode> {
    blocking(move || Ok(state.store.set_value(&namespace, &key, &body.value)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_value(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    blocking(move || Ok(state.store.delete_value(&namespace, &key)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- plugins ---

pub async fn list_plugins(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PluginDescriptor>>> {
    blocking(move || Ok(state.plugins.list_descriptors()))
        .await
        .map(Json)
}

pub async fn put_plugins(
    State(state): State<AppState>,
    Json(rows): Json<Vec<PluginRow>>,
) -> ApiResult<Json<ReconcileOutcome>> {
    blocking(move || state.plugins.reconcile_list(&rows))
        .await
        .map(Json)
}

pub async fn get_plugin(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<PluginView>> {
    let lookup = key.clone();
    blocking(move || state.plugins.load_plugin(&lookup))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("plugin `{}`", key)))
}

pub async fn put_plugin(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(edit): Json<PluginEdit>,
) -> ApiResult<Json<PluginDescriptor>> {
    blocking(move || state.plugins.update_plugin(&key, &edit))
        .await
        .map(Json)
}

pub async fn put_plugin_content(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    blocking(move || state.plugins.save_content(&key, &body)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- backup ---

pub async fn post_backup(
    State(state): State<AppState>,
    Json(request): Json<ArchiveRequest>,
) -> ApiResult<Json<BackupSummary>> {
    blocking(move || {
        state
            .archiver
            .create_backup(&request.path, &request.password)
    })
    .await
    .map(Json)
}

pub async fn post_restore(
    State(state): State<AppState>,
    Json(request): Json<ArchiveRequest>,
) -> ApiResult<Json<RestoreSummary>> {
    blocking(move || {
        state
            .archiver
            .restore_backup(&request.path, &request.password)
    })
    .await
    .map(Json)
}

// --- files ---

pub async fn get_file(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Response> {
    let path = query.path.clone();
    match blocking(move || state.editor.read(&query.path)).await? {
        Some(bytes) => Ok((
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response()),
        None => Err(ApiError::NotFound(format!("file `{}`", path))),
    }
}

pub async fn put_file(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    blocking(move || state.editor.write(&query.path, &body)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_dir(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<Vec<DirEntry>>> {
    blocking(move || state.editor.list(&query.path))
        .await
        .map(Json)
}

// --- forms ---

pub async fn get_wifi(
    State(state): State<AppState>,
    Path(table): Path<WifiTable>,
) -> ApiResult<Json<WifiTableView>> {
    blocking(move || Ok(forms::load_wifi_table(&state.store, table)))
        .await
        .map(Json)
}

pub async fn put_wifi(
    State(state): State<AppState>,
    Path(table): Path<WifiTable>,
    Json(form): Json<WifiTableForm>,
) -> ApiResult<Json<FormOutcome>> {
    blocking(move || forms::save_wifi_table(&state.store, table, &form))
        .await
        .map(Json)
}

pub async fn get_locations(State(state): State<AppState>) -> ApiResult<Json<Vec<Location>>> {
    blocking(move || Ok(forms::list_locations(&state.store)))
        .await
        .map(Json)
}

pub async fn put_locations(
    State(state): State<AppState>,
    Json(rows): Json<Vec<LocationRow>>,
) -> ApiResult<StatusCode> {
    blocking(move || forms::save_locations(&state.store, &rows)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_logging(State(state): State<AppState>) -> ApiResult<Json<LoggingForm>> {
    blocking(move || Ok(forms::load_logging(&state.store)))
        .await
        .map(Json)
}

pub async fn put_logging(
    State(state): State<AppState>,
    Json(form): Json<LoggingForm>,
) -> ApiResult<StatusCode> {
    blocking(move || forms::save_logging(&state.store, &state.policy.load(), &form)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_password(State(state): State<AppState>) -> ApiResult<Json<PasswordStatus>> {
    blocking(move || Ok(forms::password_status(&state.store)))
        .await
        .map(Json)
}

pub async fn put_password(
    State(state): State<AppState>,
    Json(form): Json<PasswordForm>,
) -> ApiResult<Json<PasswordChanged>> {
    blocking(move || forms::change_password(&state.store, &form))
        .await
        .map(Json)
}

pub async fn get_notifications(
    State(state): State<AppState>,
) -> ApiResult<Json<NotificationForm>> {
    blocking(move || Ok(forms::load_notifications(&state.store)))
        .await
        .map(Json)
}

pub async fn put_notifications(
    State(state): State<AppState>,
    Json(form): Json<NotificationForm>,
) -> ApiResult<Json<FormOutcome>> {
    blocking(move || forms::save_notifications(&state.store, &form))
        .await
        .map(Json)
}

pub async fn get_webserver(State(state): State<AppState>) -> ApiResult<Json<WebServerForm>> {
    blocking(move || Ok(forms::load_webserver(&state.store)))
        .await
        .map(Json)
}

pub async fn put_webserver(
    State(state): State<AppState>,
    Json(form): Json<WebServerForm>,
) -> ApiResult<Json<FormOutcome>> {
    blocking(move || forms::save_webserver(&state.store, &state.policy.load(), &form))
        .await
        .map(Json)
}
