use std::time::{Duration, Instant};

use boltpass_core::{
    record::Credential,
    storage::{InMemoryKeyValueStore, KeyValueStore},
};
use boltpass_storage::codec::VaultCodec;
use boltpass_vault::Vault;
use color_eyre::Result;
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, warn};

/// Timing for one diagnostics run.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub operation: String,
    pub count: usize,
    pub total: Duration,
    pub average: Duration,
    /// Percentage of records (or batches) read back intact.
    pub success_rate: f64,
}

impl Metrics {
    fn row(&self) -> String {
        format!(
            "{:<16} {:>8} {:>10.2} {:>10.3} {:>7.1}%",
            self.operation,
            self.count,
            self.total.as_secs_f64() * 1000.0,
            self.average.as_secs_f64() * 1000.0,
            self.success_rate
        )
    }
}

fn alphanumeric<G: Rng>(rng: &mut G, len: usize) -> String {
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn random_credential<G: Rng>(rng: &mut G) -> Credential {
    let username = format!("user_{}", alphanumeric(rng, 8));
    let suffix: u8 = rng.gen_range(0..100);
    let password = format!("pass_{}#{suffix}", alphanumeric(rng, 12));
    let mut credential = Credential::new(username, password, String::new());
    credential.notes = format!(
        "Test notes for credential {}. Generated for performance testing.",
        credential.id
    );
    credential
}

pub fn random_credentials(count: usize) -> Vec<Credential> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| random_credential(&mut rng)).collect()
}

/// Store, flush and read back snapshots of increasing size.
pub async fn stress<S: KeyValueStore + 'static>(
    vault: &Vault<Credential, S>,
    max: usize,
    steps: usize,
) -> Result<Vec<Metrics>> {
    if steps == 0 || max < steps {
        color_eyre::eyre::bail!("need 1 <= steps <= max (got steps={steps}, max={max})");
    }

    let step = max / steps;
    let mut results = Vec::with_capacity(steps);
    for i in 1..=steps {
        let count = i * step;
        vault.clear().await;
        let snapshot = random_credentials(count);

        let started = Instant::now();
        vault.store(snapshot.clone());
        let outcome = vault.flush().await;
        let retrieved = vault.retrieve().await;
        let total = started.elapsed();

        let success_rate = match outcome {
            Ok(()) => {
                let intact = retrieved
                    .iter()
                    .zip(&snapshot)
                    .filter(|(a, b)| a == b)
                    .count();
                intact as f64 / count as f64 * 100.0
            }
            Err(err) => {
                warn!(error = %err, count, "stress step failed");
                0.0
            }
        };

        info!(count, ?total, "stress step finished");
        results.push(Metrics {
            operation: format!("stress-{count}"),
            count,
            total,
            // One store and one retrieve.
            average: total / 2,
            success_rate,
        });
    }
    vault.clear().await;
    Ok(results)
}

/// Repeated store/flush/retrieve/clear cycles of a fixed size.
pub async fn batches<S: KeyValueStore + 'static>(
    vault: &Vault<Credential, S>,
    batch_size: usize,
    batch_count: usize,
) -> Metrics {
    vault.clear().await;
    let started = Instant::now();
    let mut passed = 0usize;

    for batch in 0..batch_count {
        vault.store(random_credentials(batch_size));
        if let Err(err) = vault.flush().await {
            warn!(error = %err, batch, "batch write failed");
        } else if vault.retrieve().await.len() == batch_size {
            passed += 1;
        }
        vault.clear().await;
    }

    let total = started.elapsed();
    let runs = batch_count.max(1);
    Metrics {
        operation: "batch".to_string(),
        count: batch_count,
        total,
        average: total / runs as u32,
        success_rate: passed as f64 / runs as f64 * 100.0,
    }
}

/// Entry point for `boltpass stress`; runs against an in-memory vault so the
/// user's data is never touched.
pub async fn run(max: usize, steps: usize, batch: Option<usize>) -> Result<()> {
    let vault = Vault::new(InMemoryKeyValueStore::new(), VaultCodec::embedded());

    println!(
        "{:<16} {:>8} {:>10} {:>10} {:>8}",
        "operation", "count", "total ms", "avg ms", "success"
    );
    for metrics in stress(&vault, max, steps).await? {
        println!("{}", metrics.row());
    }
    if let Some(size) = batch {
        println!("{}", batches(&vault, size, 10).await.row());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_credentials_have_unique_ids() {
        let credentials = random_credentials(50);
        let mut ids: Vec<_> = credentials.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
        assert!(credentials[0].username.starts_with("user_"));
        assert!(credentials[0].password.starts_with("pass_"));
    }

    #[tokio::test]
    async fn stress_reports_full_success_for_each_step() {
        let store = InMemoryKeyValueStore::new();
        let vault = Vault::new(store.clone(), VaultCodec::embedded());

        let results = stress(&vault, 30, 3).await.expect("stress");
        let counts: Vec<_> = results.iter().map(|m| m.count).collect();
        assert_eq!(counts, [10, 20, 30]);
        assert!(results.iter().all(|m| m.success_rate == 100.0));
        assert!(store.is_empty(), "stress cleans up after itself");
    }

    #[tokio::test]
    async fn stress_rejects_zero_steps() {
        let vault = Vault::new(InMemoryKeyValueStore::new(), VaultCodec::embedded());
        assert!(stress(&vault, 10, 0).await.is_err());
    }

    #[tokio::test]
    async fn batches_fail_when_quota_is_exhausted() {
        let vault = Vault::new(
            InMemoryKeyValueStore::with_quota(64),
            VaultCodec::embedded(),
        );
        let metrics = batches(&vault, 5, 3).await;
        assert_eq!(metrics.count, 3);
        assert_eq!(metrics.success_rate, 0.0);
    }

    #[tokio::test]
    async fn batches_pass_with_room_to_spare() {
        let vault = Vault::new(InMemoryKeyValueStore::new(), VaultCodec::embedded());
        let metrics = batches(&vault, 5, 4).await;
        assert_eq!(metrics.success_rate, 100.0);
    }
}
