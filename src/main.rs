use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voidchat::{config::Config, db::Rooms, lifecycle, realtime::Fanout, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voidchat=info,tower_http=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let rooms = Rooms::connect(&config.database_url, config.database_max_connections)
        .await
        .with_context(|| format!("opening room store at {}", config.database_url))?;
    let sweeper = lifecycle::spawn_sweeper(rooms.clone(), config.sweep_interval);

    let bind_addr = config.bind_addr.clone();
    let app = voidchat::app(AppState::new(rooms.clone(), Fanout::new(), config))?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(voidchat::shutdown_on(tokio::signal::ctrl_c()))
        .await?;

    sweeper.abort();
    rooms.close().await;
    Ok(())
}
