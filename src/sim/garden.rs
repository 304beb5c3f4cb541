//! In-process garden contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha3::{Digest, Keccak256};

use super::vault::CiphertextVault;
use crate::chain::{GardenReader, GardenWriter, PendingTx, TxReceipt, TxStatus};
use crate::error::ChainError;
use crate::types::{Address, CiphertextHandle, PlantId, PlantInfo};

/// Address of the first contract deployed on a fresh local node.
pub const DEFAULT_GARDEN_ADDRESS: Address = Address::from_bytes([
    0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f, 0x64,
    0x2f, 0x64, 0x18, 0x0a, 0xa3,
]);

#[derive(Debug, Clone)]
struct Plant {
    owner: Address,
    planted_at: DateTime<Utc>,
    is_mature: bool,
    weather: CiphertextHandle,
    fertility: CiphertextHandle,
    water_level: CiphertextHandle,
    growth: CiphertextHandle,
}

#[derive(Debug, Default)]
struct ContractState {
    plants: Vec<Plant>,
    owners: HashMap<Address, Vec<PlantId>>,
    receipts: HashMap<String, TxReceipt>,
    nonce: u64,
}

/// Simulated deployment of the garden contract.
///
/// Growth accumulates as `growth += weather * fertility * water_level * time`
/// over plaintexts kept in the shared [`CiphertextVault`]. Failed contract
/// checks are recorded as reverted transactions, not submission errors.
#[derive(Debug)]
pub struct SimulatedGarden {
    address: Address,
    vault: Arc<CiphertextVault>,
    state: Mutex<ContractState>,
    fail_reads: AtomicBool,
}

impl SimulatedGarden {
    pub fn new() -> Arc<Self> {
        Self::at(DEFAULT_GARDEN_ADDRESS, Arc::new(CiphertextVault::new()))
    }

    pub fn at(address: Address, vault: Arc<CiphertextVault>) -> Arc<Self> {
        Arc::new(Self {
            address,
            vault,
            state: Mutex::new(ContractState::default()),
            fail_reads: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn vault(&self) -> Arc<CiphertextVault> {
        self.vault.clone()
    }

    /// Make every read call fail as if the node were unreachable.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Plaintext growth of `id` (test and demo introspection).
    pub fn clear_growth(&self, id: PlantId) -> Option<u64> {
        let growth = self.lock().plants.get(usize::try_from(id).ok()?)?.growth;
        if growth.is_empty() {
            Some(0)
        } else {
            self.vault.value(growth)
        }
    }

    fn lock(&self) -> MutexGuard<'_, ContractState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_contract(&self, contract: Address) -> Result<(), ChainError> {
        if contract == self.address {
            Ok(())
        } else {
            Err(ChainError::NoContract {
                address: contract.to_string(),
            })
        }
    }

    fn check_read(&self, method: &'static str, contract: Address) -> Result<(), ChainError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ChainError::CallFailed {
                method,
                reason: "connection refused".to_string(),
            });
        }
        self.check_contract(contract)
    }

    fn plant_at(state: &ContractState, id: PlantId) -> Result<&Plant, ChainError> {
        usize::try_from(id)
            .ok()
            .and_then(|index| state.plants.get(index))
            .ok_or(ChainError::UnknownPlant { id })
    }

    /// Record a mined transaction and return its pending handle.
    fn mine(
        &self,
        state: &mut ContractState,
        method: &str,
        outcome: Result<(), String>,
    ) -> PendingTx {
        state.nonce += 1;
        let mut hasher = Keccak256::new();
        hasher.update(self.address.as_bytes());
        hasher.update(method.as_bytes());
        hasher.update(state.nonce.to_be_bytes());
        let hash = format!("0x{}", hex::encode(hasher.finalize()));

        let status = match outcome {
            Ok(()) => TxStatus::Success,
            Err(reason) => {
                tracing::debug!(method, %hash, "Simulated transaction reverted: {}", reason);
                TxStatus::Reverted
            }
        };
        state.receipts.insert(
            hash.clone(),
            TxReceipt {
                hash: hash.clone(),
                status,
            },
        );
        PendingTx { hash }
    }

    fn apply_plant(
        &self,
        state: &mut ContractState,
        from: Address,
        handles: [CiphertextHandle; 3],
        proofs: &[Vec<u8>; 3],
    ) -> Result<(), String> {
        for (handle, proof) in handles.iter().zip(proofs) {
            if !self.vault.verify_input(*handle, proof, self.address, from) {
                return Err(format!("invalid input proof for {}", handle.short()));
            }
        }
        let id = state.plants.len() as PlantId;
        let [weather, fertility, water_level] = handles;
        state.plants.push(Plant {
            owner: from,
            planted_at: Utc::now(),
            is_mature: false,
            weather,
            fertility,
            water_level,
            growth: CiphertextHandle::EMPTY,
        });
        state.owners.entry(from).or_default().push(id);
        Ok(())
    }

    fn apply_growth(
        &self,
        state: &mut ContractState,
        from: Address,
        id: PlantId,
        time: CiphertextHandle,
        proof: &[u8],
    ) -> Result<(), String> {
        if !self.vault.verify_input(time, proof, self.address, from) {
            return Err("invalid input proof for time".to_string());
        }
        let index = usize::try_from(id).map_err(|e| e.to_string())?;
        let plant = state
            .plants
            .get_mut(index)
            .ok_or_else(|| format!("plant {id} does not exist"))?;
        if plant.is_mature {
            return Err("plant is already mature".to_string());
        }

        let read = |handle: CiphertextHandle| {
            self.vault
                .value(handle)
                .ok_or_else(|| format!("unknown ciphertext {}", handle.short()))
        };
        let previous = if plant.growth.is_empty() {
            0
        } else {
            read(plant.growth)?
        };
        let increment = read(plant.weather)?
            * read(plant.fertility)?
            * read(plant.water_level)?
            * read(time)?;

        plant.growth = self
            .vault
            .store(previous.saturating_add(increment), &[plant.owner, self.address]);
        Ok(())
    }

    fn apply_mark_mature(
        &self,
        state: &mut ContractState,
        from: Address,
        id: PlantId,
    ) -> Result<(), String> {
        let index = usize::try_from(id).map_err(|e| e.to_string())?;
        let plant = state
            .plants
            .get_mut(index)
            .ok_or_else(|| format!("plant {id} does not exist"))?;
        if plant.owner != from {
            return Err("only the owner can mark a plant as mature".to_string());
        }
        if plant.is_mature {
            return Err("plant is already mature".to_string());
        }
        plant.is_mature = true;
        Ok(())
    }
}

#[async_trait]
impl GardenReader for SimulatedGarden {
    async fn total_plants(&self, contract: Address) -> Result<u64, ChainError> {
        self.check_read("totalPlants", contract)?;
        Ok(self.lock().plants.len() as u64)
    }

    async fn plant_info(&self, contract: Address, id: PlantId) -> Result<PlantInfo, ChainError> {
        self.check_read("getPlantInfo", contract)?;
        let state = self.lock();
        let plant = Self::plant_at(&state, id)?;
        Ok(PlantInfo {
            owner: plant.owner,
            planted_at: plant.planted_at,
            is_mature: plant.is_mature,
        })
    }

    async fn growth_handle(
        &self,
        contract: Address,
        id: PlantId,
    ) -> Result<CiphertextHandle, ChainError> {
        self.check_read("getGrowth", contract)?;
        let state = self.lock();
        Ok(Self::plant_at(&state, id)?.growth)
    }

    async fn owner_plant_count(
        &self,
        contract: Address,
        owner: Address,
    ) -> Result<u64, ChainError> {
        self.check_read("getOwnerPlantCount", contract)?;
        Ok(self.lock().owners.get(&owner).map_or(0, |ids| ids.len() as u64))
    }

    async fn owner_plant(
        &self,
        contract: Address,
        owner: Address,
        index: u64,
    ) -> Result<PlantId, ChainError> {
        self.check_read("getOwnerPlant", contract)?;
        let state = self.lock();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.owners.get(&owner)?.get(i).copied())
            .ok_or_else(|| ChainError::CallFailed {
                method: "getOwnerPlant",
                reason: format!("index {index} out of range for {owner}"),
            })
    }
}

#[async_trait]
impl GardenWriter for SimulatedGarden {
    async fn plant(
        &self,
        contract: Address,
        from: Address,
        handles: [CiphertextHandle; 3],
        proofs: [Vec<u8>; 3],
    ) -> Result<PendingTx, ChainError> {
        self.check_contract(contract)?;
        let mut state = self.lock();
        let outcome = self.apply_plant(&mut state, from, handles, &proofs);
        Ok(self.mine(&mut state, "plant", outcome))
    }

    async fn calculate_growth(
        &self,
        contract: Address,
        from: Address,
        id: PlantId,
        time: CiphertextHandle,
        proof: Vec<u8>,
    ) -> Result<PendingTx, ChainError> {
        self.check_contract(contract)?;
        let mut state = self.lock();
        let outcome = self.apply_growth(&mut state, from, id, time, &proof);
        Ok(self.mine(&mut state, "calculateGrowth", outcome))
    }

    async fn mark_as_mature(
        &self,
        contract: Address,
        from: Address,
        id: PlantId,
    ) -> Result<PendingTx, ChainError> {
        self.check_contract(contract)?;
        let mut state = self.lock();
        let outcome = self.apply_mark_mature(&mut state, from, id);
        Ok(self.mine(&mut state, "markAsMature", outcome))
    }

    async fn wait_for_receipt(&self, tx: &PendingTx) -> Result<TxReceipt, ChainError> {
        self.lock()
            .receipts
            .get(&tx.hash)
            .cloned()
            .ok_or_else(|| ChainError::InclusionFailed {
                hash: tx.hash.clone(),
                reason: "unknown transaction".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::from_bytes([0xaa; 20])
    }

    async fn plant_with(garden: &SimulatedGarden, from: Address, values: [u32; 3]) -> PendingTx {
        let inputs = garden.vault.encrypt_inputs(garden.address(), from, &values);
        let handles: [CiphertextHandle; 3] = inputs.handles.as_slice().try_into().unwrap();
        let proof = inputs.input_proof;
        garden
            .plant(garden.address(), from, handles, [proof.clone(), proof.clone(), proof])
            .await
            .unwrap()
    }

    async fn grow_with(
        garden: &SimulatedGarden,
        from: Address,
        id: PlantId,
        time: u32,
    ) -> TxReceipt {
        let inputs = garden.vault.encrypt_inputs(garden.address(), from, &[time]);
        let tx = garden
            .calculate_growth(garden.address(), from, id, inputs.handles[0], inputs.input_proof)
            .await
            .unwrap();
        garden.wait_for_receipt(&tx).await.unwrap()
    }

    #[tokio::test]
    async fn growth_accumulates_product_of_inputs() {
        let garden = SimulatedGarden::new();
        let tx = plant_with(&garden, owner(), [2, 3, 4]).await;
        assert_eq!(garden.wait_for_receipt(&tx).await.unwrap().status, TxStatus::Success);

        let contract = garden.address();
        assert_eq!(garden.total_plants(contract).await.unwrap(), 1);
        assert!(garden.growth_handle(contract, 0).await.unwrap().is_empty());

        grow_with(&garden, owner(), 0, 2).await;
        assert_eq!(garden.clear_growth(0), Some(48));
        grow_with(&garden, owner(), 0, 1).await;
        assert_eq!(garden.clear_growth(0), Some(72));

        let handle = garden.growth_handle(contract, 0).await.unwrap();
        assert!(garden.vault.is_allowed(handle, owner()));
    }

    #[tokio::test]
    async fn tracks_plants_per_owner() {
        let garden = SimulatedGarden::new();
        let other = Address::from_bytes([0xbb; 20]);
        plant_with(&garden, owner(), [1, 1, 1]).await;
        plant_with(&garden, other, [1, 1, 1]).await;
        plant_with(&garden, owner(), [1, 1, 1]).await;

        let contract = garden.address();
        assert_eq!(garden.owner_plant_count(contract, owner()).await.unwrap(), 2);
        assert_eq!(garden.owner_plant(contract, owner(), 1).await.unwrap(), 2);
        assert_eq!(garden.owner_plant(contract, other, 0).await.unwrap(), 1);
        assert!(garden.owner_plant(contract, other, 1).await.is_err());
    }

    #[tokio::test]
    async fn contract_checks_revert() {
        let garden = SimulatedGarden::new();
        let contract = garden.address();

        // Proof issued for a different sender.
        let inputs = garden.vault.encrypt_inputs(contract, owner(), &[1, 2, 3]);
        let handles: [CiphertextHandle; 3] = inputs.handles.as_slice().try_into().unwrap();
        let proof = inputs.input_proof;
        let tx = garden
            .plant(
                contract,
                Address::from_bytes([1; 20]),
                handles,
                [proof.clone(), proof.clone(), proof],
            )
            .await
            .unwrap();
        assert_eq!(garden.wait_for_receipt(&tx).await.unwrap().status, TxStatus::Reverted);

        plant_with(&garden, owner(), [1, 1, 1]).await;
        let not_owner = garden
            .mark_as_mature(contract, Address::from_bytes([1; 20]), 0)
            .await
            .unwrap();
        assert_eq!(garden.wait_for_receipt(&not_owner).await.unwrap().status, TxStatus::Reverted);

        let mature = garden.mark_as_mature(contract, owner(), 0).await.unwrap();
        assert_eq!(garden.wait_for_receipt(&mature).await.unwrap().status, TxStatus::Success);
        assert!(garden.plant_info(contract, 0).await.unwrap().is_mature);
        assert_eq!(grow_with(&garden, owner(), 0, 1).await.status, TxStatus::Reverted);
    }

    #[tokio::test]
    async fn reads_fail_on_request_and_for_other_contracts() {
        let garden = SimulatedGarden::new();
        assert!(matches!(
            garden.total_plants(Address::from_bytes([3; 20])).await,
            Err(ChainError::NoContract { .. })
        ));
        assert!(matches!(
            garden.plant_info(garden.address(), 9).await,
            Err(ChainError::UnknownPlant { id: 9 })
        ));

        garden.set_fail_reads(true);
        assert!(matches!(
            garden.total_plants(garden.address()).await,
            Err(ChainError::CallFailed { method: "totalPlants", .. })
        ));
    }
}
