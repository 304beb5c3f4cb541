//! Shared harness: a controller wired to the simulated deployment through
//! gateable wrappers, so a test can pause a round trip, change the wallet
//! context and then let the round trip resolve.

#![allow(dead_code)]

use std::sync::Arc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use mystery_garden::chain::{GardenReader, GardenWriter, PendingTx, TxReceipt};
use mystery_garden::config::GardenConfig;
use mystery_garden::controller::{Collaborators, GardenController};
use mystery_garden::deployments::DeploymentRegistry;
use mystery_garden::error::{ChainError, FheError, SignatureError};
use mystery_garden::fhe::{
    EncryptedInputBatch, EncryptedInputs, FheInstance, HandleContractPair, Keypair,
};
use mystery_garden::signature::{DecryptionSignature, ManualClock};
use mystery_garden::sim::{LOCAL_CHAIN_ID, SimulatedFhe, SimulatedGarden};
use mystery_garden::storage::InMemoryStringStore;
use mystery_garden::types::{Address, CiphertextHandle, ClearScalar, PlantId, PlantInfo};
use mystery_garden::wallet::{LocalSigner, SharedWalletContext, Signer};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Chain id with no garden deployment.
pub const OTHER_CHAIN_ID: u64 = 11155111;

/// A one-shot rendezvous between a paused round trip and the test body.
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Pause the next round trip that passes this gate.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    /// Wait until a round trip is paused at the gate.
    pub async fn entered(&self) {
        tokio::time::timeout(TIMEOUT, self.entered.notified())
            .await
            .expect("round trip never reached the gate");
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Simulated garden whose receipt waits and reads can be paused.
pub struct GatedGarden {
    pub inner: Arc<SimulatedGarden>,
    pub receipts: Gate,
    pub growth_reads: Gate,
    pub count_reads: Gate,
    submitted: AtomicUsize,
}

impl GatedGarden {
    /// Transactions sent through this view.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GardenReader for GatedGarden {
    async fn total_plants(&self, contract: Address) -> Result<u64, ChainError> {
        let result = self.inner.total_plants(contract).await;
        self.count_reads.pass().await;
        result
    }

    async fn plant_info(&self, contract: Address, id: PlantId) -> Result<PlantInfo, ChainError> {
        self.inner.plant_info(contract, id).await
    }

    async fn growth_handle(
        &self,
        contract: Address,
        id: PlantId,
    ) -> Result<CiphertextHandle, ChainError> {
        let result = self.inner.growth_handle(contract, id).await;
        self.growth_reads.pass().await;
        result
    }

    async fn owner_plant_count(
        &self,
        contract: Address,
        owner: Address,
    ) -> Result<u64, ChainError> {
        self.inner.owner_plant_count(contract, owner).await
    }

    async fn owner_plant(
        &self,
        contract: Address,
        owner: Address,
        index: u64,
    ) -> Result<PlantId, ChainError> {
        self.inner.owner_plant(contract, owner, index).await
    }
}

#[async_trait]
impl GardenWriter for GatedGarden {
    async fn plant(
        &self,
        contract: Address,
        from: Address,
        handles: [CiphertextHandle; 3],
        proofs: [Vec<u8>; 3],
    ) -> Result<PendingTx, ChainError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.plant(contract, from, handles, proofs).await
    }

    async fn calculate_growth(
        &self,
        contract: Address,
        from: Address,
        id: PlantId,
        time: CiphertextHandle,
        proof: Vec<u8>,
    ) -> Result<PendingTx, ChainError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner
            .calculate_growth(contract, from, id, time, proof)
            .await
    }

    async fn mark_as_mature(
        &self,
        contract: Address,
        from: Address,
        id: PlantId,
    ) -> Result<PendingTx, ChainError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_as_mature(contract, from, id).await
    }

    async fn wait_for_receipt(&self, tx: &PendingTx) -> Result<TxReceipt, ChainError> {
        self.receipts.pass().await;
        self.inner.wait_for_receipt(tx).await
    }
}

/// Simulated encryption service whose round trips can be paused.
pub struct GatedFhe {
    pub inner: Arc<SimulatedFhe>,
    pub encrypts: Gate,
    pub decrypts: Gate,
}

#[async_trait]
impl FheInstance for GatedFhe {
    async fn encrypt(&self, batch: EncryptedInputBatch) -> Result<EncryptedInputs, FheError> {
        let result = self.inner.encrypt(batch).await;
        self.encrypts.pass().await;
        result
    }

    fn generate_keypair(&self) -> Result<Keypair, FheError> {
        self.inner.generate_keypair()
    }

    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<CiphertextHandle, ClearScalar>, FheError> {
        let result = self.inner.user_decrypt(requests, signature).await;
        self.decrypts.pass().await;
        result
    }
}

/// Local signer whose signing prompt can be paused.
pub struct GatedSigner {
    pub inner: LocalSigner,
    pub prompt: Gate,
}

impl GatedSigner {
    pub fn from_seed(seed: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalSigner::from_seed(seed),
            prompt: Gate::default(),
        })
    }

    pub fn signatures_issued(&self) -> usize {
        self.inner.signatures_issued()
    }
}

#[async_trait]
impl Signer for GatedSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, SignatureError> {
        self.prompt.pass().await;
        self.inner.sign_message(message).await
    }
}

pub struct Harness {
    pub controller: GardenController,
    pub garden: Arc<GatedGarden>,
    pub fhe: Arc<SimulatedFhe>,
    pub encryption: Arc<GatedFhe>,
    pub wallet: Arc<SharedWalletContext>,
    pub alice: Arc<GatedSigner>,
    pub bob: Arc<GatedSigner>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(maturity_threshold: u64) -> Self {
        Self::on(SimulatedGarden::new(), maturity_threshold)
    }

    /// A second view of the same deployment, e.g. another browser tab.
    pub fn on(garden: Arc<SimulatedGarden>, maturity_threshold: u64) -> Self {
        let clock = ManualClock::new(Utc::now());
        let fhe = SimulatedFhe::with_clock(garden.vault(), clock.clone());
        let alice = GatedSigner::from_seed(1);
        let bob = GatedSigner::from_seed(2);
        let signer: Arc<dyn Signer> = alice.clone();
        let wallet = SharedWalletContext::new(Some(LOCAL_CHAIN_ID), Some(signer));
        let gated = Arc::new(GatedGarden {
            inner: garden.clone(),
            receipts: Gate::default(),
            growth_reads: Gate::default(),
            count_reads: Gate::default(),
            submitted: AtomicUsize::new(0),
        });
        let encryption = Arc::new(GatedFhe {
            inner: fhe.clone(),
            encrypts: Gate::default(),
            decrypts: Gate::default(),
        });

        let config = GardenConfig {
            deployments: DeploymentRegistry::new().with(
                LOCAL_CHAIN_ID,
                garden.address(),
                Some("hardhat"),
            ),
            maturity_threshold,
            decryption_duration_days: 365,
            input_seed: Some(17),
            ..GardenConfig::default()
        };
        let collaborators = Collaborators::new(
            wallet.clone(),
            gated.clone(),
            Arc::new(InMemoryStringStore::new()),
        )
        .with_reader(gated.clone())
        .with_fhe(encryption.clone())
        .with_clock(clock.clone());

        Self {
            controller: GardenController::new(&config, collaborators).expect("controller"),
            garden: gated,
            fhe,
            encryption,
            wallet,
            alice,
            bob,
            clock,
        }
    }

    pub fn connect(&self, signer: &Arc<GatedSigner>) {
        self.wallet.connect(signer.clone());
    }

    pub fn sim(&self) -> &Arc<SimulatedGarden> {
        &self.garden.inner
    }

    /// Plant one seed and select it.
    pub async fn planted(&self) -> PlantId {
        assert!(self.controller.plant().await.is_completed());
        let id = self.controller.plant_count().expect("count after planting") - 1;
        self.controller.select_plant(Some(id)).await;
        id
    }
}
