//! Admin API server setup.
//!
//! # Responsibilities
//! - Build the shared application state from the service configuration
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Serve plain HTTP or TLS until shutdown is triggered
//! - Apply hot-reloaded configuration

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::backup::{BackupArchiver, KdfParams};
use crate::config::ServiceConfig;
use crate::events::EventBus;
use crate::lifecycle::{RestartHandle, Shutdown};
use crate::net::tls::load_tls_config;
use crate::observability::tracing::request_span;
use crate::plugins::PluginRegistry;
use crate::store::{FileBackend, ParamBackend, ParamStore, StorageError, StorageResult};
use crate::vfs::{FileEditor, ProtectedPathPolicy, SharedPolicy, Vfs};

/// Grace period for in-flight TLS connections on shutdown.
const TLS_DRAIN: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ParamStore>,
    pub plugins: Arc<PluginRegistry>,
    pub archiver: Arc<BackupArchiver>,
    pub editor: Arc<FileEditor>,
    pub policy: SharedPolicy,
    pub events: EventBus,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// Wire every component on top of `backend`.
    pub fn new(
        config: ServiceConfig,
        backend: Arc<dyn ParamBackend>,
        restarter: Arc<dyn RestartHandle>,
    ) -> Self {
        let events = EventBus::new();
        let vfs = Arc::new(Vfs::from_config(&config.storage));
        let policy =
            ProtectedPathPolicy::from_config(&config.storage, &config.protection).shared();
        let store = Arc::new(ParamStore::new(backend, events.clone()));
        let plugins = Arc::new(PluginRegistry::new(
            store.clone(),
            vfs.clone(),
            policy.clone(),
            events.clone(),
            config.plugins.content_dir.clone(),
        ));
        let archiver = Arc::new(BackupArchiver::new(
            store.clone(),
            vfs.clone(),
            policy.clone(),
            config.backup.include_dirs.clone(),
            events.clone(),
            restarter,
        )
        .with_kdf(KdfParams {
            memory_kib: config.backup.kdf_memory_kib,
            iterations: config.backup.kdf_iterations,
        }));
        let editor = Arc::new(FileEditor::new(
            vfs,
            policy.clone(),
            store.clone(),
            events.clone(),
        ));

        Self {
            store,
            plugins,
            archiver,
            editor,
            policy,
            events,
            config: Arc::new(config),
        }
    }

    /// State backed by one JSON file per namespace in the configuration directory.
    pub fn with_file_backend(
        config: ServiceConfig,
        restarter: Arc<dyn RestartHandle>,
    ) -> StorageResult<Self> {
        let dir = Vfs::from_config(&config.storage).resolve(&config.storage.config_dir)?;
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        tracing::info!(path = ?dir, "Using configuration directory");
        Ok(Self::new(config, Arc::new(FileBackend::new(dir)), restarter))
    }

    /// Apply the parts of a reloaded configuration that take effect live.
    pub fn apply_reload(&self, config: &ServiceConfig) {
        let policy = ProtectedPathPolicy::from_config(&config.storage, &config.protection);
        if **self.policy.load() != policy {
            self.policy.store(Arc::new(policy));
            tracing::info!("Protected-path policy updated");
        }
    }
}

/// HTTP server for the admin API.
pub struct AdminServer {
    router: Router,
    config: Arc<ServiceConfig>,
}

impl AdminServer {
    pub fn new(state: AppState) -> Self {
        let config = state.config.clone();
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Admin routes with the full middleware stack.
    #[allow(deprecated)]
    pub fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        admin::router(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| request_span(request)),
                )
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.timeouts.request_secs,
                )))
                .map_response(|res: axum::http::Response<_>| res.map(Body::new))
                .layer(RequestBodyLimitLayer::new(config.admin.max_body_size)),
        )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, on TLS if configured.
    pub async fn run(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;

        match self.config.listener.tls.clone() {
            None => {
                tracing::info!(address = %addr, "Admin API listening");
                axum::serve(
                    listener,
                    self.router
                        .into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await?;
            }
            Some(tls) => {
                let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                tokio::spawn(async move {
                    shutdown.wait().await;
                    drain.graceful_shutdown(Some(TLS_DRAIN));
                });

                tracing::info!(address = %addr, "Admin API listening (TLS)");
                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(
                        self.router
                            .into_make_service_with_connect_info::<SocketAddr>(),
                    )
                    .await?;
            }
        }

        tracing::info!("Admin API stopped");
        Ok(())
    }
}
