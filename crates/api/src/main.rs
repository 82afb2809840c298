//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::AppState;
use common::SystemClock;
use payments::{
    CachedSecrets, EnvSecrets, InMemoryPaymentGateway, SecretProvider, WebhookVerifier,
};
use saga::{FulfillmentContext, LogNotifier, Reaper};
use store::{
    IdempotencyStore, InventoryStore, MemoryBackend, OrderStore, PgBackend, ProductStore,
    SessionStore,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Wires a fulfillment context over one backend implementing all five
/// stores. The payment gateway here is the in-memory stand-in; the live
/// provider client is deployment-specific and plugs into the same trait.
fn build_context<B>(backend: Arc<B>, config: &Config) -> Arc<FulfillmentContext>
where
    B: OrderStore + ProductStore + SessionStore + InventoryStore + IdempotencyStore + 'static,
{
    Arc::new(FulfillmentContext::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Arc::new(InMemoryPaymentGateway::new()),
        Arc::new(LogNotifier::new(config.notify_sender.clone())),
        Arc::new(SystemClock),
        config.fulfillment(),
    ))
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env();

    // 2. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(?config, "loaded configuration");

    // 3. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Pick the store backend and wire the context
    let ctx = match &config.database_url {
        Some(url) => {
            let backend = PgBackend::connect(url)
                .await
                .expect("failed to connect to database");
            backend.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL backend");
            build_context(Arc::new(backend), &config)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory backend");
            build_context(Arc::new(MemoryBackend::default()), &config)
        }
    };

    // 5. Fetch the webhook signing secret (cached for the process lifetime)
    let secrets = CachedSecrets::new(EnvSecrets::new("WEBHOOK_SIGNING_SECRET"));
    let secret = secrets
        .webhook_signing_secret()
        .await
        .expect("failed to read webhook signing secret");
    if secret.is_none() && !config.allow_unverified_webhooks {
        tracing::warn!("no webhook signing secret configured; webhook deliveries will be rejected");
    }
    let verifier = WebhookVerifier::from_config(secret, config.allow_unverified_webhooks);

    // 6. Build handler state and start the reaper
    let state = AppState::new(ctx.clone(), verifier);
    let reaper = Reaper::new(ctx);
    tokio::spawn(reaper.run(std::time::Duration::from_secs(config.reaper_interval_secs)));

    // 7. Start the server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
