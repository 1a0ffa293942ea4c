use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use tribune_server::config::Config;
use tribune_server::external::{ArtifactStore, FsArtifactStore, Mailer, TracingMailer};
use tribune_server::routes::{create_routes, AppState};
use tribune_server::services::{ExpiryScheduler, TransactionService};
use tribune_server::store::{LedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool));
    let artifacts: Arc<dyn ArtifactStore> =
        Arc::new(FsArtifactStore::new(config.artifact_dir.clone()));
    let mailer: Arc<dyn Mailer> = Arc::new(TracingMailer);

    let (scheduler, inbox) = ExpiryScheduler::new();
    let service = Arc::new(TransactionService::new(
        store.clone(),
        artifacts,
        mailer,
        scheduler.clone(),
        config.payment_window,
    ));
    ExpiryScheduler::spawn_dispatcher(inbox, service.clone());

    // Timers do not survive restarts; the pending rows in the ledger do.
    match scheduler.rearm_pending(store.as_ref()).await {
        Ok(count) => tracing::info!(count, "pending transaction expiries rearmed"),
        Err(err) => tracing::error!(error = ?err, "failed to rearm pending expiries"),
    }

    let app: Router = create_routes(AppState { service }, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
