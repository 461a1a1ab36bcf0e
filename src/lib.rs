pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod index;
pub mod lifecycle;
pub mod realtime;
pub mod res;
pub mod rooms;
pub mod token;

use std::{future::Future, io, sync::Arc};

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};

use config::Config;
use db::Rooms;
use realtime::Fanout;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub rooms: Rooms,
    pub fanout: Fanout,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(rooms: Rooms, fanout: Fanout, config: Config) -> AppState {
        AppState {
            rooms,
            fanout,
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> anyhow::Result<Router> {
    let mut app = Router::new()
        .route("/", get(index::index))

        .merge(rooms::pages(state.clone()))
        .nest("/api", rooms::router())

        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = &state.config.cors_origin {
        let origin = HeaderValue::from_str(origin).context("CORS_ORIGIN is not a valid header value")?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    Ok(app)
}

/// Resolves once `signal` fires. A signal source that fails to install never
/// resolves, so the server keeps running instead of stopping at startup.
pub async fn shutdown_on(signal: impl Future<Output = io::Result<()>>) {
    if let Err(err) = signal.await {
        tracing::error!(error = %err, "cannot listen for shutdown signal, graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn shutdown_waits_for_the_signal() {
        shutdown_on(async { Ok(()) }).await;
    }

    #[tokio::test]
    async fn broken_signal_source_never_shuts_down() {
        let broken = async { Err(io::Error::other("no signal handler")) };
        let waited = tokio::time::timeout(Duration::from_millis(50), shutdown_on(broken)).await;
        assert!(waited.is_err());
    }
}
