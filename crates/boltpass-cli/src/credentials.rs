use std::{fs, path::Path};

use boltpass_core::{record::Credential, storage::KeyValueStore};
use boltpass_vault::Vault;
use color_eyre::{eyre::WrapErr, Result};
use tracing::info;

use crate::{cli::Command, config, storage};

/// Execute a credential subcommand against the configured vault.
/// Every mutation is flushed before returning so the process can exit safely.
pub async fn handle(cmd: Command, config: &config::Config) -> Result<()> {
    let vault = storage::vault_from_config(config).await?;

    match cmd {
        Command::List { reveal } => {
            let credentials = vault.retrieve().await;
            // Reading legacy data queues a migration write.
            vault.flush().await?;
            if credentials.is_empty() {
                println!("No credentials yet. Add one with `boltpass add -u <user> -p <password>`.");
                return Ok(());
            }
            for credential in &credentials {
                println!("{}", describe(credential, reveal));
            }
        }
        Command::Add {
            username,
            password,
            notes,
        } => {
            let credential = add(&vault, username, password, notes).await?;
            println!("Added {} ({})", credential.username, credential.id);
        }
        Command::Remove { id } => {
            if remove(&vault, &id).await? {
                println!("Removed {id}");
            } else {
                color_eyre::eyre::bail!("no credential with id {id}");
            }
        }
        Command::Export { output } => {
            vault.flush().await?;
            let exported = vault.export_snapshot().await?;
            match output {
                Some(path) => {
                    fs::write(&path, exported)?;
                    println!("Exported vault to {}", path.display());
                }
                None => println!("{exported}"),
            }
        }
        Command::Import { path } => {
            let count = import_file(&vault, &path).await?;
            println!("Imported {count} credentials from {}", path.display());
        }
        Command::Clear { yes } => {
            if !yes {
                color_eyre::eyre::bail!("refusing to clear the vault without --yes");
            }
            vault.clear().await;
            println!("Vault cleared.");
        }
        other => color_eyre::eyre::bail!("not a credential command: {other:?}"),
    }

    Ok(())
}

async fn add<S: KeyValueStore + 'static>(
    vault: &Vault<Credential, S>,
    username: String,
    password: String,
    notes: String,
) -> Result<Credential> {
    let mut credentials = editable(vault).await?;
    let credential = Credential::new(username, password, notes);
    credentials.push(credential.clone());
    vault.store(credentials);
    vault.flush().await?;
    info!(id = %credential.id, "credential added");
    Ok(credential)
}

async fn remove<S: KeyValueStore + 'static>(vault: &Vault<Credential, S>, id: &str) -> Result<bool> {
    let mut credentials = editable(vault).await?;
    let before = credentials.len();
    credentials.retain(|c| c.id != id);
    if credentials.len() == before {
        return Ok(false);
    }
    vault.store(credentials);
    vault.flush().await?;
    info!(%id, "credential removed");
    Ok(true)
}

/// Current credentials for a read-modify-write. An unreadable blob is an error
/// here, so the edit does not replace it with a near-empty snapshot.
async fn editable<S: KeyValueStore + 'static>(
    vault: &Vault<Credential, S>,
) -> Result<Vec<Credential>> {
    vault.load().await.wrap_err(
        "stored vault is unreadable and was left untouched; \
         check key_source or run `boltpass clear --yes` to start over",
    )
}

async fn import_file<S: KeyValueStore + 'static>(
    vault: &Vault<Credential, S>,
    path: &Path,
) -> Result<usize> {
    let data = fs::read_to_string(path)?;
    if !vault.import_snapshot(&data) {
        color_eyre::eyre::bail!("{} is not a valid vault export", path.display());
    }
    vault.flush().await?;
    Ok(vault.retrieve().await.len())
}

fn describe(credential: &Credential, reveal: bool) -> String {
    let password = if reveal {
        credential.password.clone()
    } else {
        "*".repeat(credential.password.chars().count().min(12))
    };
    let mut line = format!(
        "{} {} {} (created {})",
        credential.id,
        credential.username,
        password,
        credential.created_at.format("%Y-%m-%d")
    );
    if !credential.notes.is_empty() {
        line.push_str(&format!("\n    {}", credential.notes));
    }
    line
}
