use checkin_calendar::{
    AppState, AuthProvider, AuthSession, BackendConfig, CalendarStore, Config, LocalStore,
    RemoteAuth, RemoteStore, router,
};
use checkin_calendar::config::log_filter;
use std::{env, net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(log_filter(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .init();

    let config = Config::from_env()?;

    let state = match &config.backend {
        BackendConfig::Local { data_path } => {
            let local = Arc::new(LocalStore::open(data_path.clone()).await?);
            if config.seed_sample_data {
                let seeded = local.seed_sample_data().await?;
                if seeded > 0 {
                    info!(seeded, "seeded sample calendars");
                }
            }
            info!(path = %data_path.display(), "using local store");
            let calendars = CalendarStore::new(local.clone(), config.week_start);
            AppState::local(local, calendars)
        }
        BackendConfig::Remote {
            url,
            api_key,
            session_path,
        } => {
            let provider = Arc::new(RemoteAuth::new(
                url.clone(),
                api_key.clone(),
                session_path.clone(),
            ));
            let repository = RemoteStore::new(url.clone(), api_key.clone(), provider.subscribe());
            let auth = AuthSession::new(provider);
            auth.init().await;
            if let Some(message) = auth.error().await {
                warn!("session restore failed: {message}");
            }
            info!(%url, "using remote backend");
            let calendars = CalendarStore::new(Arc::new(repository), config.week_start);
            AppState::remote(calendars, auth)
        }
    };

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
