//! `mystery-garden demo` - end-to-end run against the simulated deployment.

use std::sync::Arc;

use crate::config::GardenConfig;
use crate::controller::{Collaborators, GardenController, GardenSnapshot, OperationOutcome};
use crate::sim::{LOCAL_CHAIN_ID, SimulatedFhe, SimulatedGarden};
use crate::storage::FileStringStore;
use crate::wallet::{LocalSigner, SharedWalletContext, Signer};

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub grows: u32,
    pub seed: Option<u64>,
    pub threshold: Option<u64>,
}

/// Final state of a demo run.
#[derive(Debug)]
pub struct DemoReport {
    pub snapshot: GardenSnapshot,
    pub grows: u32,
    pub matured: bool,
    pub threshold: u64,
    /// Signing prompts shown to the demo account.
    pub signatures: usize,
}

fn print_step(step: &str, outcome: &OperationOutcome, controller: &GardenController) {
    let snapshot = controller.snapshot();
    println!("[{step}] {outcome:?} | {}", snapshot.message);
    match serde_json::to_string(&snapshot) {
        Ok(json) => println!("  {json}"),
        Err(e) => tracing::warn!("Failed to render snapshot: {}", e),
    }
}

/// Plant one seed, grow it until its decrypted growth reaches the threshold
/// (or `grows` rounds pass), then mark it mature.
///
/// The simulated contract is registered on the local chain on top of the
/// resolved `config`; decryption signatures persist at its
/// `signature_store_path`.
pub async fn run_demo(
    mut config: GardenConfig,
    options: DemoOptions,
) -> anyhow::Result<DemoReport> {
    let garden = SimulatedGarden::new();
    let fhe = SimulatedFhe::new(garden.vault());
    let account = Arc::new(
        options
            .seed
            .map_or_else(LocalSigner::random, LocalSigner::from_seed),
    );
    let signer: Arc<dyn Signer> = account.clone();
    let wallet = SharedWalletContext::new(Some(LOCAL_CHAIN_ID), Some(signer.clone()));

    config
        .deployments
        .insert(LOCAL_CHAIN_ID, garden.address(), Some("hardhat".to_string()));
    if let Some(threshold) = options.threshold {
        config.maturity_threshold = threshold;
    }
    config.input_seed = options.seed.or(config.input_seed);
    anyhow::ensure!(config.maturity_threshold > 0, "threshold must be > 0");

    let store = FileStringStore::new(&config.signature_store_path);
    tracing::debug!(path = %store.path().display(), "Using signature store");
    let collaborators = Collaborators::new(wallet, garden.clone(), Arc::new(store))
    .with_reader(garden.clone())
    .with_fhe(fhe.clone());
    let controller = GardenController::new(&config, collaborators)?;

    tracing::info!(account = %signer.address(), contract = %garden.address(), "Starting demo");

    let outcome = controller.refresh_plant_count().await;
    print_step("refresh", &outcome, &controller);

    let outcome = controller.plant().await;
    print_step("plant", &outcome, &controller);
    anyhow::ensure!(outcome.is_completed(), "planting failed: {outcome:?}");

    let Some(count) = controller.plant_count().filter(|count| *count > 0) else {
        anyhow::bail!("plant count did not update after planting");
    };
    controller.select_plant(Some(count - 1)).await;
    print_step("select", &OperationOutcome::Completed, &controller);

    let mut grows = 0;
    while grows < options.grows && !controller.capabilities().can_mark_mature {
        let outcome = controller.grow().await;
        print_step("grow", &outcome, &controller);
        anyhow::ensure!(outcome.is_completed(), "grow failed: {outcome:?}");
        grows += 1;

        let outcome = controller.decrypt_growth_handle().await;
        print_step("decrypt", &outcome, &controller);
        anyhow::ensure!(outcome.is_completed(), "decrypt failed: {outcome:?}");
    }

    let matured = if controller.capabilities().can_mark_mature {
        let outcome = controller.mark_as_mature().await;
        print_step("mature", &outcome, &controller);
        outcome.is_completed()
    } else {
        println!(
            "Growth stayed below {} after {grows} rounds",
            controller.maturity_threshold()
        );
        false
    };

    let outcome = controller.load_garden().await;
    print_step("garden", &outcome, &controller);
    let outcome = controller.my_plants().await;
    print_step("mine", &outcome, &controller);

    println!(
        "Decryption service calls: {}, wallet signatures: {}",
        fhe.decrypt_calls(),
        account.signatures_issued()
    );

    Ok(DemoReport {
        snapshot: controller.snapshot(),
        grows,
        matured,
        threshold: controller.maturity_threshold(),
        signatures: account.signatures_issued(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn config_in(dir: &Path) -> GardenConfig {
        GardenConfig {
            signature_store_path: dir.join("signatures.json"),
            ..GardenConfig::default()
        }
    }

    #[tokio::test]
    async fn demo_reaches_maturity() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_demo(
            config_in(dir.path()),
            DemoOptions {
                grows: 200,
                seed: Some(3),
                threshold: Some(50),
            },
        )
        .await
        .expect("demo runs");

        assert!(report.matured);
        assert!(report.snapshot.is_mature);
        assert!(report.grows >= 1);
        assert!(!report.snapshot.capabilities.can_grow);
    }

    #[tokio::test]
    async fn demo_stops_after_round_limit() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_demo(
            config_in(dir.path()),
            DemoOptions {
                grows: 1,
                seed: Some(3),
                threshold: Some(u64::MAX),
            },
        )
        .await
        .expect("demo runs");

        assert!(!report.matured);
        assert_eq!(report.grows, 1);
        assert!(report.snapshot.is_decrypted);
    }

    #[tokio::test]
    async fn demo_reuses_persisted_signature() {
        let dir = tempfile::tempdir().unwrap();
        let options = DemoOptions {
            grows: 1,
            seed: Some(5),
            threshold: Some(u64::MAX),
        };

        let first = run_demo(config_in(dir.path()), options.clone())
            .await
            .expect("first run");
        assert_eq!(first.signatures, 1);
        assert!(dir.path().join("signatures.json").exists());

        let second = run_demo(config_in(dir.path()), options)
            .await
            .expect("second run");
        assert_eq!(second.signatures, 0);
        assert!(second.snapshot.is_decrypted);
    }

    #[tokio::test]
    async fn demo_threshold_falls_back_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = GardenConfig {
            maturity_threshold: u64::MAX,
            ..config_in(dir.path())
        };
        let report = run_demo(
            config,
            DemoOptions {
                grows: 1,
                seed: Some(3),
                threshold: None,
            },
        )
        .await
        .expect("demo runs");

        assert!(!report.matured);
        assert_eq!(report.threshold, u64::MAX);
    }
}
