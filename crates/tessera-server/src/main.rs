mod digest_loop;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use tessera_db::Database;
use tessera_db::directory::{SqliteListingCatalog, SqliteUserDirectory};
use tessera_messaging::fanout::NotificationFanout;
use tessera_messaging::mailer::TracingMailer;
use tessera_messaging::{DigestBatcher, EventBus, MessagingConfig, MessagingContext, SystemClock};
use tessera_realtime::Hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera=debug,tessera_messaging=debug,tessera_db=info".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("TESSERA_DB_PATH").unwrap_or_else(|_| "tessera.db".into());
    let digest_interval_secs: u64 = std::env::var("TESSERA_DIGEST_INTERVAL_SECS")
        .unwrap_or_else(|_| "900".into())
        .parse()?;
    let config = MessagingConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Realtime fan-out
    let hub = Hub::new();
    let bus = EventBus::new();
    bus.subscribe(Arc::new(NotificationFanout::new(db.clone(), Arc::new(hub.clone()))));

    let ctx = Arc::new(MessagingContext {
        db: db.clone(),
        users: Arc::new(SqliteUserDirectory::new(db.clone())),
        listings: Arc::new(SqliteListingCatalog::new(db.clone())),
        clock: Arc::new(SystemClock),
        bus,
        config: config.clone(),
    });

    let batcher = Arc::new(DigestBatcher::new(ctx, Arc::new(TracingMailer)));
    tokio::spawn(digest_loop::run_digest_loop(
        batcher,
        digest_interval_secs,
        config.digest_batch_size,
    ));

    info!(
        "Tessera messaging running (db {}, digest every {}s)",
        db_path, digest_interval_secs
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
