//! Web server for TrafficLink.

pub mod router;
pub mod state;

pub use router::create_router;
pub use state::ServerState;

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;
use trafficlink_commands::GatewaySettings;
use trafficlink_core::AppConfig;
use trafficlink_storage::Database;

use crate::shutdown::shutdown_signal;

/// Start the web server and run until Ctrl+C or SIGTERM.
///
/// The database is opened here and closed when the server has drained.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;

    let db = Database::open(&config.storage.db_path).with_context(|| {
        format!("cannot open database at {}", config.storage.db_path.display())
    })?;

    let settings = GatewaySettings::from(&config);
    info!(
        category = "server",
        batch_limit = settings.batch_limit,
        claim_lease_secs = settings.claim_lease.map(|d| d.as_secs()).unwrap_or(0),
        require_device_key = settings.require_device_key,
        "Polling gateway configured"
    );

    let state = ServerState::new(db, settings);
    let app = create_router(state, &config.server.cors_origin);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {}", bind))?;
    info!(category = "server", address = %bind, "TrafficLink listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!(category = "server", "Server stopped");
    Ok(())
}
