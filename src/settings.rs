//! User settings persistence.
//!
//! Stores deployment and controller preferences in
//! ~/.mystery-garden/config.toml. Settings are loaded with
//! env var > config.toml > default priority (see `config`).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default growth value a plant must reach before it may be marked mature.
pub const DEFAULT_MATURITY_THRESHOLD: u64 = 100;

/// Default validity window of a decryption signature.
pub const DEFAULT_DECRYPTION_DURATION_DAYS: u32 = 365;

fn default_maturity_threshold() -> u64 {
    DEFAULT_MATURITY_THRESHOLD
}

fn default_decryption_duration_days() -> u32 {
    DEFAULT_DECRYPTION_DURATION_DAYS
}

/// One contract deployment, keyed by chain id in [`Settings::deployments`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeploymentSettings {
    /// Contract address (0x-prefixed). The zero address means "not deployed".
    pub address: String,

    /// Human-readable chain name (e.g. "sepolia", "hardhat").
    #[serde(default)]
    pub chain_name: Option<String>,
}

/// User settings persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Growth a plant must reach before `mark_as_mature` is offered.
    #[serde(default = "default_maturity_threshold")]
    pub maturity_threshold: u64,

    /// How long a freshly signed decryption authorization stays valid.
    #[serde(default = "default_decryption_duration_days")]
    pub decryption_duration_days: u32,

    /// Fixed seed for the encrypted input generator (reproducible runs).
    #[serde(default)]
    pub input_seed: Option<u64>,

    /// Where decryption signatures are persisted.
    #[serde(default)]
    pub signature_store_path: Option<PathBuf>,

    /// Known deployments by chain id (decimal string, TOML table keys).
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploymentSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            maturity_threshold: DEFAULT_MATURITY_THRESHOLD,
            decryption_duration_days: DEFAULT_DECRYPTION_DURATION_DAYS,
            input_seed: None,
            signature_store_path: None,
            deployments: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Base directory for local state (~/.mystery-garden).
    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mystery-garden")
    }

    /// Default TOML config file path (~/.mystery-garden/config.toml).
    pub fn default_toml_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// Default signature store path (~/.mystery-garden/signatures.json).
    pub fn default_signature_store_path() -> PathBuf {
        Self::base_dir().join("signatures.json")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &std::path::Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }

    /// Write the settings as TOML, creating parent directories.
    pub fn save_toml(&self, path: &std::path::Path) -> Result<(), String> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize settings: {}", e))?;

        let content = format!(
            "# MysteryGarden controller configuration.\n\
             #\n\
             # Priority: env var > this file > defaults.\n\
             \n\
             {raw}"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
        }

        std::fs::write(path, content)
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }

    /// Overlay `other` onto `self`. Only fields where `other` differs from
    /// [`Settings::default`] replace the current value.
    pub fn merge_from(&mut self, other: &Self) {
        let (Ok(defaults), Ok(overlay), Ok(mut merged)) = (
            serde_json::to_value(Self::default()),
            serde_json::to_value(other),
            serde_json::to_value(&*self),
        ) else {
            return;
        };

        overlay_json(&mut merged, &overlay, &defaults);
        match serde_json::from_value(merged) {
            Ok(settings) => *self = settings,
            Err(e) => tracing::warn!("Discarding settings overlay: {}", e),
        }
    }
}

/// Recursive JSON overlay that skips values equal to their default.
fn overlay_json(base: &mut Value, overlay: &Value, defaults: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let default = defaults.get(key).unwrap_or(&Value::Null);
                match base.get_mut(key) {
                    Some(slot) => overlay_json(slot, value, default),
                    None if value != default => {
                        base.insert(key.clone(), value.clone());
                    }
                    None => {}
                }
            }
        }
        (base, overlay) => {
            if overlay != defaults {
                *base = overlay.clone();
            }
        }
    }
}
