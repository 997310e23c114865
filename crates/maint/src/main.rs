use anyhow::Context;
use clap::Parser;

use agora_infra::config::AppConfig;
use agora_infra::lifecycle::DataLifecycleCoordinator;
use agora_infra::store::PostgresCommunityStore;
use agora_maint::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    agora_observability::init_with(&config.telemetry.log_level, config.telemetry.log_format);

    let database = config
        .database
        .as_ref()
        .context("database.url is not configured (set AGORA_DATABASE__URL)")?;
    let store = PostgresCommunityStore::connect(database).await?;
    store.apply_schema().await?;
    store.sync_seed_groups(&config.community.seed_groups).await?;

    let coordinator = DataLifecycleCoordinator::with_config(store, config.lifecycle.coordinator_config());
    let outcome = agora_maint::run(&coordinator, cli.command).await?;

    println!("{}", serde_json::to_string_pretty(&outcome.body)?);
    if !outcome.success {
        tracing::error!("maintenance command failed");
        std::process::exit(1);
    }
    Ok(())
}
