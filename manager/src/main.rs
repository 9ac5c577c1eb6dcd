//! Vault manager driver
//!
//! Replays a scripted manage-vault session against an in-process
//! environment and prints the final state as JSON.

use anyhow::{Context, Result};
use std::sync::Arc;
use vault_management::{
    replay, start, Config, SessionContext, SimulatedIssuer, SnapshotEnvironment,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("init") {
        let path = args.next().unwrap_or_else(|| "vault-manager.toml".to_string());
        return Config::write_default(&path);
    }

    log::info!("Starting vault manager");

    // Load configuration; an invalid file is fatal, a missing one is not
    let config = Config::load_if_present()?.unwrap_or_else(|| {
        log::warn!("No config at {}, using default local config", Config::path());
        Config::default_local()
    });
    let scenario = config.scenario;

    let environment = Arc::new(SnapshotEnvironment::new(&scenario.environment));
    let issuer = Arc::new(SimulatedIssuer::new(scenario.tx_outcome.clone()));
    let context = SessionContext {
        account: scenario.account.clone(),
        vault_id: scenario.environment.vault.id,
    };
    log::info!(
        "Managing vault {} ({}) with {} scripted command(s)",
        context.vault_id,
        scenario.environment.vault.ilk,
        scenario.commands.len()
    );

    let handle = start(environment.clone(), issuer.clone(), context, config.session)
        .await
        .context("Failed to start manage vault session")?;

    let state = replay(&handle, &environment, &scenario.commands)
        .await
        .context("Scenario failed")?;

    log::info!(
        "Finished in stage {} after {} transaction(s)",
        state.stage,
        issuer.sent().len()
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&state).context("Failed to serialize state")?
    );

    handle.shutdown().await.context("Session ended with an error")?;
    Ok(())
}
