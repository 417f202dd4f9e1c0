use safiri_backend::api::{self, AppState};
use safiri_backend::booking::orchestrator::{BookingOrchestrator, TicketActivation};
use safiri_backend::config::{AppConfig, LogFormat};
use safiri_backend::database::{
    init_pool_from_config, PgLedgerStore, PgSeatStore, PgSubscriptionStore, PgTripStore,
};
use safiri_backend::health::HealthChecker;
use safiri_backend::ledger::PaymentLedger;
use safiri_backend::payments::factory::PaymentProviderFactory;
use safiri_backend::reconciliation::ReconciliationEngine;
use safiri_backend::subscriptions::SubscriptionActivation;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "🚀 starting safiri backend"
    );

    info!("📊 initializing database connection pool...");
    let pool = init_pool_from_config(&config.database).await?;

    let trips = Arc::new(PgTripStore::new(pool.clone()));
    let seats = Arc::new(PgSeatStore::new(pool.clone()));
    let subscriptions = Arc::new(PgSubscriptionStore::new(pool.clone()));
    let ledger = PaymentLedger::new(Arc::new(PgLedgerStore::new(pool.clone())));

    let providers = Arc::new(
        PaymentProviderFactory::from_env()
            .map_err(|e| anyhow::anyhow!("payment provider setup failed: {}", e))?,
    );
    info!(
        providers = ?providers
            .list_available_providers()
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
        "💳 payment providers configured"
    );

    let orchestrator = BookingOrchestrator::new(
        trips.clone(),
        seats.clone(),
        ledger.clone(),
        providers.clone(),
        config.payments.webhook_base_url.clone(),
    );
    let engine = ReconciliationEngine::new(
        providers,
        ledger.clone(),
        TicketActivation::new(seats),
        SubscriptionActivation::new(subscriptions),
    );

    let state = Arc::new(AppState {
        orchestrator,
        ledger,
        engine,
        health: HealthChecker::new(pool),
    });

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✅ listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 safiri backend stopped");
    Ok(())
}
