//! `mystery-garden doctor` - configuration diagnostics.
//!
//! Resolves configuration the same way the controller does and reports
//! pass/fail for each piece with actionable detail on failures.

use std::path::Path;

use crate::config::GardenConfig;
use crate::settings::Settings;
use crate::storage::{FileStringStore, StringStore};

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(
    config_path: Option<&Path>,
    chain_id: Option<u64>,
    strict: bool,
) -> anyhow::Result<()> {
    println!("Mystery Garden Doctor");
    println!("=====================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    check(
        "Config directory",
        check_config_dir(&Settings::base_dir()),
        &mut passed,
        &mut failed,
    );

    let config = GardenConfig::from_env_with_toml(config_path);
    check(
        "Configuration",
        match &config {
            Ok(config) => CheckResult::Pass(format!(
                "{} deployment(s), maturity threshold {}, signatures valid {} day(s)",
                config.deployments.len(),
                config.maturity_threshold,
                config.decryption_duration_days
            )),
            Err(e) => CheckResult::Fail(e.to_string()),
        },
        &mut passed,
        &mut failed,
    );

    if let Ok(config) = &config {
        check(
            "Deployment",
            check_deployment(config, chain_id),
            &mut passed,
            &mut failed,
        );
        check(
            "Signature store",
            check_signature_store(&config.signature_store_path).await,
            &mut passed,
            &mut failed,
        );
    }

    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 && strict {
        anyhow::bail!("doctor strict mode failed with {failed} check(s)");
    }

    Ok(())
}

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

#[derive(Debug)]
enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_config_dir(dir: &Path) -> CheckResult {
    if dir.exists() {
        if dir.is_dir() {
            CheckResult::Pass(format!("{}", dir.display()))
        } else {
            CheckResult::Fail(format!("{} exists but is not a directory", dir.display()))
        }
    } else {
        CheckResult::Pass(format!("{} will be created on first run", dir.display()))
    }
}

fn check_deployment(config: &GardenConfig, chain_id: Option<u64>) -> CheckResult {
    let Some(chain_id) = chain_id else {
        return CheckResult::Skip("no chain id given (--chain-id or GARDEN_CHAIN_ID)".to_string());
    };

    let deployment = config.deployments.resolve(Some(chain_id));
    match deployment.address {
        Some(address) => {
            let name = deployment
                .chain_name
                .map(|name| format!(" ({name})"))
                .unwrap_or_default();
            CheckResult::Pass(format!("chain {chain_id}{name} -> {address}"))
        }
        None => CheckResult::Fail(format!(
            "no deployment for chainId={chain_id}; add [deployments.\"{chain_id}\"] to the config"
        )),
    }
}

async fn check_signature_store(path: &Path) -> CheckResult {
    let store = FileStringStore::new(path);
    match store.get("doctor-check").await {
        Ok(_) if path.exists() => CheckResult::Pass(format!("{}", path.display())),
        Ok(_) => CheckResult::Pass(format!(
            "{} will be created on first signature",
            path.display()
        )),
        Err(e) => CheckResult::Fail(e.to_string()),
    }
}
