//! Configuration for the garden controller.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! `./.env` is loaded via dotenvy before env vars are read.

pub(crate) mod helpers;

use std::path::{Path, PathBuf};

use crate::deployments::DeploymentRegistry;
use crate::error::ConfigError;
use crate::settings::Settings;
use crate::types::Address;

/// Resolved controller configuration.
#[derive(Debug, Clone)]
pub struct GardenConfig {
    pub deployments: DeploymentRegistry,
    pub maturity_threshold: u64,
    pub decryption_duration_days: u32,
    pub input_seed: Option<u64>,
    pub signature_store_path: PathBuf,
}

impl Default for GardenConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            deployments: DeploymentRegistry::new(),
            maturity_threshold: settings.maturity_threshold,
            decryption_duration_days: settings.decryption_duration_days,
            input_seed: None,
            signature_store_path: Settings::default_signature_store_path(),
        }
    }
}

impl GardenConfig {
    /// Resolve configuration from settings with env var overrides.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let mut deployments = DeploymentRegistry::from_settings(&settings.deployments)?;

        let env_chain_id =
            helpers::parse_optional_env::<u64>("GARDEN_CHAIN_ID", "an unsigned integer")?;
        let env_address = helpers::optional_env("GARDEN_CONTRACT_ADDRESS")?;
        match (env_chain_id, env_address) {
            (Some(chain_id), Some(raw)) => {
                let address: Address = raw.parse().map_err(|message| ConfigError::InvalidValue {
                    key: "GARDEN_CONTRACT_ADDRESS".to_string(),
                    message,
                })?;
                let chain_name = helpers::optional_env("GARDEN_CHAIN_NAME")?;
                deployments.insert(chain_id, address, chain_name);
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingRequired {
                    key: "GARDEN_CHAIN_ID".to_string(),
                    hint: "GARDEN_CONTRACT_ADDRESS needs the chain it is deployed on".to_string(),
                });
            }
            _ => {}
        }

        let maturity_threshold =
            helpers::parse_optional_env::<u64>("GARDEN_MATURITY_THRESHOLD", "a positive integer")?
                .unwrap_or(settings.maturity_threshold);
        if maturity_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GARDEN_MATURITY_THRESHOLD".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let decryption_duration_days = helpers::parse_optional_env::<u32>(
            "GARDEN_DECRYPTION_DURATION_DAYS",
            "a positive integer",
        )?
        .unwrap_or(settings.decryption_duration_days);
        if decryption_duration_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GARDEN_DECRYPTION_DURATION_DAYS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let input_seed =
            helpers::parse_optional_env::<u64>("GARDEN_INPUT_SEED", "an unsigned integer")?
                .or(settings.input_seed);

        let signature_store_path = helpers::optional_env("GARDEN_SIGNATURE_STORE_PATH")?
            .map(PathBuf::from)
            .or_else(|| settings.signature_store_path.clone())
            .unwrap_or_else(Settings::default_signature_store_path);

        Ok(Self {
            deployments,
            maturity_threshold,
            decryption_duration_days,
            input_seed,
            signature_store_path,
        })
    }

    /// Load configuration from `./.env`, env vars and the default TOML file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional explicit TOML config file.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;
        Self::resolve(&settings)
    }

    /// Load and merge a TOML config file into settings.
    ///
    /// An explicit path must exist and parse. The default path
    /// (`~/.mystery-garden/config.toml`) is optional.
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }
}
