use crate::api::error::{AppError, ServiceResult};
use crate::error::Result;
use crate::settings::AppSettings;
use crate::store::Store;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub mod error;
pub mod matches;
pub mod socket;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    /// Pushes queued per socket before it is closed.
    pub socket_buffer: usize,
}

impl AppState {
    pub fn new(store: Arc<Store>, socket_buffer: usize) -> Self {
        Self {
            store,
            socket_buffer,
        }
    }
}

/// Run a store call off the async workers. Any call may wait on a lane or
/// the registry while they are held across an fsync.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> ServiceResult<T>
where
    F: FnOnce(&Store) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    match tokio::task::spawn_blocking(move || f(&store)).await {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!("Store task failed: {e}");
            Err(AppError::Unexpected)
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(matches::health))
        .route(
            "/matches",
            get(matches::list_matches).post(matches::create_match),
        )
        .route("/matches/start", post(matches::create_match))
        .route("/matches/{match_id}", get(matches::get_match))
        .route("/matches/{match_id}/status", put(matches::update_status))
        .route(
            "/matches/{match_id}/commentary",
            get(matches::list_commentary).post(matches::add_commentary),
        )
        .route("/ws", get(socket::upgrade))
        .with_state(state)
}

pub async fn serve(settings: &AppSettings) -> anyhow::Result<()> {
    let store = Arc::new(Store::open_or_create(settings.store_config())?);
    let state = AppState::new(Arc::clone(&store), settings.subscriber_buffer.max(1));

    let listener = TcpListener::bind(settings.bind_addr()).await?;
    info!(
        addr = %listener.local_addr()?,
        persistent = store.is_persistent(),
        "serving commentary"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.sync()?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
