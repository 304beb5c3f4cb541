//! Contract deployment lookup by chain id.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::settings::DeploymentSettings;
use crate::types::Address;

/// A resolved deployment for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GardenDeployment {
    pub chain_id: Option<u64>,
    pub chain_name: Option<String>,
    /// `None` when the chain has no usable deployment.
    pub address: Option<Address>,
}

impl GardenDeployment {
    pub fn is_deployed(&self) -> bool {
        self.address.is_some()
    }
}

/// Known contract deployments keyed by chain id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentRegistry {
    entries: BTreeMap<u64, (Address, Option<String>)>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a deployment.
    pub fn insert(&mut self, chain_id: u64, address: Address, chain_name: Option<String>) {
        self.entries.insert(chain_id, (address, chain_name));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, chain_id: u64, address: Address, chain_name: Option<&str>) -> Self {
        self.insert(chain_id, address, chain_name.map(str::to_string));
        self
    }

    /// Parse the `[deployments]` table of the settings file.
    pub fn from_settings(
        deployments: &BTreeMap<String, DeploymentSettings>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for (chain_id, entry) in deployments {
            let key = format!("deployments.{chain_id}");
            let id: u64 = chain_id.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: key.clone(),
                message: format!("chain id must be an unsigned integer: {e}"),
            })?;
            let address: Address =
                entry.address.parse().map_err(|message| ConfigError::InvalidValue {
                    key: format!("{key}.address"),
                    message,
                })?;
            registry.insert(id, address, entry.chain_name.clone());
        }
        Ok(registry)
    }

    /// Resolve the deployment for `chain_id`.
    ///
    /// Unknown chains and zero-address entries resolve to "not deployed".
    pub fn resolve(&self, chain_id: Option<u64>) -> GardenDeployment {
        let Some(id) = chain_id else {
            return GardenDeployment {
                chain_id: None,
                chain_name: None,
                address: None,
            };
        };

        match self.entries.get(&id) {
            Some((address, chain_name)) => GardenDeployment {
                chain_id: Some(id),
                chain_name: chain_name.clone(),
                address: (!address.is_zero()).then_some(*address),
            },
            None => GardenDeployment {
                chain_id: Some(id),
                chain_name: None,
                address: None,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn resolves_known_chain() {
        let registry = DeploymentRegistry::new().with(31337, addr(1), Some("hardhat"));
        let deployment = registry.resolve(Some(31337));

        assert_eq!(deployment.address, Some(addr(1)));
        assert_eq!(deployment.chain_name.as_deref(), Some("hardhat"));
        assert!(deployment.is_deployed());
    }

    #[test]
    fn zero_address_and_unknown_chain_are_not_deployed() {
        let registry = DeploymentRegistry::new().with(11155111, Address::ZERO, Some("sepolia"));

        let zero = registry.resolve(Some(11155111));
        assert!(!zero.is_deployed());
        assert_eq!(zero.chain_id, Some(11155111));

        assert!(!registry.resolve(Some(1)).is_deployed());
        assert!(!registry.resolve(None).is_deployed());
    }

    #[test]
    fn from_settings_rejects_bad_entries() {
        let mut table = BTreeMap::new();
        table.insert(
            "not-a-number".to_string(),
            DeploymentSettings {
                address: format!("0x{}", "11".repeat(20)),
                chain_name: None,
            },
        );
        let err = DeploymentRegistry::from_settings(&table).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "deployments.not-a-number"),
            other => panic!("unexpected error: {other}"),
        }

        let mut table = BTreeMap::new();
        table.insert(
            "31337".to_string(),
            DeploymentSettings {
                address: "0x1234".to_string(),
                chain_name: None,
            },
        );
        let err = DeploymentRegistry::from_settings(&table).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "deployments.31337.address"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
