//! Contract read/write surface consumed by the controller.
//!
//! Implementations bind to a contract address per call, so one reader can
//! serve every deployment the wallet may switch between.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::types::{Address, CiphertextHandle, PlantId, PlantInfo};

/// Read-only view of the garden contract.
#[async_trait]
pub trait GardenReader: Send + Sync {
    /// `totalPlants()`
    async fn total_plants(&self, contract: Address) -> Result<u64, ChainError>;

    /// `getPlantInfo(id)`
    async fn plant_info(&self, contract: Address, id: PlantId) -> Result<PlantInfo, ChainError>;

    /// `getGrowth(id)`; the empty handle while the plant never grew.
    async fn growth_handle(
        &self,
        contract: Address,
        id: PlantId,
    ) -> Result<CiphertextHandle, ChainError>;

    /// `getOwnerPlantCount(owner)`
    async fn owner_plant_count(&self, contract: Address, owner: Address)
    -> Result<u64, ChainError>;

    /// `getOwnerPlant(owner, index)`
    async fn owner_plant(
        &self,
        contract: Address,
        owner: Address,
        index: u64,
    ) -> Result<PlantId, ChainError>;
}

/// A submitted transaction that can be awaited for inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingTx {
    pub hash: String,
}

/// Inclusion status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Reverted,
}

impl TxStatus {
    /// Numeric receipt status (1 success, 0 failure).
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 1,
            Self::Reverted => 0,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Receipt returned once a transaction is included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
    pub status: TxStatus,
}

/// State-changing calls on the garden contract, sent from `from`.
#[async_trait]
pub trait GardenWriter: Send + Sync {
    /// `plant(weather, fertility, water, weatherProof, fertilityProof, waterProof)`
    async fn plant(
        &self,
        contract: Address,
        from: Address,
        handles: [CiphertextHandle; 3],
        proofs: [Vec<u8>; 3],
    ) -> Result<PendingTx, ChainError>;

    /// `calculateGrowth(id, time, timeProof)`
    async fn calculate_growth(
        &self,
        contract: Address,
        from: Address,
        id: PlantId,
        time: CiphertextHandle,
        proof: Vec<u8>,
    ) -> Result<PendingTx, ChainError>;

    /// `markAsMature(id)`
    async fn mark_as_mature(
        &self,
        contract: Address,
        from: Address,
        id: PlantId,
    ) -> Result<PendingTx, ChainError>;

    /// Wait until `tx` is included and return its receipt.
    async fn wait_for_receipt(&self, tx: &PendingTx) -> Result<TxReceipt, ChainError>;
}
