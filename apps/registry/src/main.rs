use gc_registry_api::config::Settings;
use gc_registry_api::routes::build_router;
use gc_registry_api::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        let port = settings.port;
        let state = AppState::connect(settings).await?;
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        info!(%port, "registry listening");
        axum::serve(listener, router).await?;

        Ok::<(), anyhow::Error>(())
    })
}
