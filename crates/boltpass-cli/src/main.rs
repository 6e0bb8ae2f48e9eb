mod cli;
mod config;
mod credentials;
mod diagnostics;
mod storage;

use crate::cli::{Command, ConfigCommand};
use boltpass_core::storage::KeyValueStore;
use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(Command::List { reveal: false }) {
        Command::Version => print_version(),
        Command::Health => run_health_check(&config).await?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Stress { max, steps, batch } => diagnostics::run(max, steps, batch).await?,
        cmd => credentials::handle(cmd, &config).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("boltpass {}", env!("CARGO_PKG_VERSION"));
}

/// Checks the configured store and key source without touching the vault slot.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    run_store_health(&store).await?;
    let codec = storage::codec_from_config(config).await?;
    println!("Storage: ok ({})", store.root().display());
    println!("Key: ok ({})", codec.key_id());
    Ok(())
}

async fn run_store_health<S: KeyValueStore>(store: &S) -> Result<()> {
    let check_key = "health/check";
    let payload = "ok";
    store.put(check_key, payload).await?;
    let round_trip = store.get(check_key).await?;
    store.delete(check_key).await?;

    if round_trip.as_deref() != Some(payload) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use boltpass_core::storage::InMemoryKeyValueStore;
    use boltpass_storage::file_store::FileKeyValueStore;

    use super::*;

    #[tokio::test]
    async fn health_check_with_file_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileKeyValueStore::new(dir.path());
        run_store_health(&store)
            .await
            .expect("health check should succeed");
        assert_eq!(store.get("health/check").await.expect("get"), None);
    }

    #[tokio::test]
    async fn health_check_reports_full_store() {
        let store = InMemoryKeyValueStore::with_quota(4);
        assert!(run_store_health(&store).await.is_err());
    }
}
