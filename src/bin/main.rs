//! Composition root for the custody gateway.
//!
//! Owns the startup phase (role table and chain configuration load, both
//! fatal on failure) and the shutdown phase (signal-driven best-effort
//! disconnect). The HTTP layer attaches to the [`Gateway`] built here.

use std::env;
use std::sync::Arc;

use log::{error, info};

use custody_gateway::chain::{ChainConfig, ChainId, ChainSessionManager};
use custody_gateway::{Gateway, RoleTable};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Startup phase: configuration must load and validate before any
    // traffic is accepted. Either failure aborts the process.
    let roles_path =
        env::var("RBAC_ROLES_PATH").unwrap_or_else(|_| "etc/roles.json".to_string());
    let roles = match RoleTable::load(&roles_path) {
        Ok(table) => {
            info!(
                "Loaded role table from {roles_path} ({} roles)",
                table.role_names().count()
            );
            Arc::new(table)
        }
        Err(e) => {
            error!("Failed to load role configuration: {e}");
            return Err(e.into());
        }
    };

    let hot = ChainConfig::from_env(ChainId::Hot)?;
    let cold = ChainConfig::from_env(ChainId::Cold)?;
    let manager = Arc::new(ChainSessionManager::new(hot, cold));
    let gateway = Gateway::new(roles, manager);

    info!("Connecting to ledger networks");
    let report = gateway.connect_all().await;
    for (chain, outcome) in [("hot", &report.hot), ("cold", &report.cold)] {
        match outcome {
            Ok(()) => info!("{chain} chain connected"),
            Err(e) => error!("{chain} chain unavailable: {e}"),
        }
    }
    if !report.any_connected() {
        error!("Neither chain is reachable; refusing to start");
        std::process::exit(1);
    }
    if !report.all_connected() {
        // Degraded single-chain operation: reported, not rolled back.
        info!("Starting degraded: one chain unavailable");
    }

    info!("Gateway ready");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, closing chain sessions");
    gateway.disconnect_all().await;
    Ok(())
}
