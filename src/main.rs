use clap::Parser;
use tracing_subscriber::EnvFilter;

use mystery_garden::GardenConfig;
use mystery_garden::cli::{Cli, Command, DemoOptions, run_demo, run_doctor_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mystery_garden=info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Demo {
            grows,
            seed,
            threshold,
        } => {
            let config = GardenConfig::from_env_with_toml(cli.config.as_deref())?;
            let report = run_demo(
                config,
                DemoOptions {
                    grows,
                    seed,
                    threshold,
                },
            )
            .await?;
            println!(
                "\nPlant {} after {} grow(s): growth={:?}, mature={}",
                report
                    .snapshot
                    .selected_plant
                    .map_or_else(|| "-".to_string(), |id| id.to_string()),
                report.grows,
                report.snapshot.clear_growth,
                report.matured
            );
        }
        Command::Doctor { chain_id, strict } => {
            run_doctor_command(cli.config.as_deref(), chain_id, strict).await?;
        }
    }

    Ok(())
}
