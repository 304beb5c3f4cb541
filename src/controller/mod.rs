//! Synchronization and decryption controller for one garden deployment.
//!
//! The controller mirrors remote plant state, runs the plant/grow/mark-mature
//! transaction pipelines and the decryption workflow. Each pipeline is
//! single-flight: a call made while the same pipeline is in flight is
//! dropped, not queued. Every pipeline captures an [`OperationContext`] at
//! start and re-validates it after each suspension point; results computed
//! against a context that is no longer live are discarded.
//!
//! Pipelines never return errors. Failures become a user-visible message
//! ([`GardenController::message`]) and an [`OperationOutcome`].

mod capabilities;
mod context;
mod decrypt;
mod guard;
mod mirror;
mod mutation;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;

use crate::chain::{GardenReader, GardenWriter};
use crate::config::GardenConfig;
use crate::deployments::{DeploymentRegistry, GardenDeployment};
use crate::error::Error;
use crate::fhe::FheInstance;
use crate::inputs::InputGenerator;
use crate::signature::{Clock, SignatureCache, SystemClock};
use crate::storage::StringStore;
use crate::types::{
    Address, CiphertextHandle, ClearScalar, ClearValue, PlantId, PlantInfo, PlantSummary,
};
use crate::wallet::{Signer, WalletContext};

pub use self::capabilities::{Capabilities, Readiness};
pub use self::context::OperationContext;
pub use self::guard::{GuardState, Pipeline};

use self::capabilities::{CapabilityInputs, clear_for, evaluate};
use self::context::{Checked, Scope};
use self::guard::Guards;

/// Progress of the decryption workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptionPhase {
    #[default]
    Idle,
    AwaitingSignature,
    Decrypting,
    Done,
}

impl DecryptionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingSignature => "awaiting_signature",
            Self::Decrypting => "decrypting",
            Self::Done => "done",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::AwaitingSignature | Self::Decrypting)
    }
}

/// Why a pipeline did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The same pipeline is already running.
    InFlight,
    /// Contract, reader, encryption instance or signer is missing.
    NotReady,
    NoSelection,
    /// The current state does not allow the operation.
    NotPermitted,
    AlreadyDecrypted,
    NoHandle,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum OperationOutcome {
    Completed,
    Skipped(SkipReason),
    /// The context changed while the pipeline was suspended.
    Ignored,
    /// The transaction was included with a failure status.
    Reverted { hash: String },
    Failed(String),
}

impl OperationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Presentation-layer view of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GardenSnapshot {
    pub chain_id: Option<u64>,
    pub chain_name: Option<String>,
    pub contract_address: Option<Address>,
    pub is_deployed: bool,
    pub plant_count: Option<u64>,
    pub selected_plant: Option<PlantId>,
    pub growth_handle: Option<CiphertextHandle>,
    pub clear_growth: Option<ClearScalar>,
    pub is_decrypted: bool,
    pub is_mature: bool,
    pub decryption: DecryptionPhase,
    pub in_flight: Vec<Pipeline>,
    pub capabilities: Capabilities,
    pub message: String,
}

#[derive(Debug, Default)]
pub(crate) struct ControllerState {
    guards: Guards,
    decryption: DecryptionPhase,
    plant_count: Option<u64>,
    selected_plant: Option<PlantId>,
    plant_info: Option<PlantInfo>,
    is_mature: bool,
    growth_handle: Option<CiphertextHandle>,
    clear: Option<ClearValue>,
    garden: Vec<PlantSummary>,
    my_plants: Option<Vec<PlantId>>,
    message: String,
}

/// External collaborators handed to [`GardenController::new`].
pub struct Collaborators {
    pub wallet: Arc<dyn WalletContext>,
    pub reader: Option<Arc<dyn GardenReader>>,
    pub writer: Arc<dyn GardenWriter>,
    pub fhe: Option<Arc<dyn FheInstance>>,
    pub store: Arc<dyn StringStore>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(
        wallet: Arc<dyn WalletContext>,
        writer: Arc<dyn GardenWriter>,
        store: Arc<dyn StringStore>,
    ) -> Self {
        Self {
            wallet,
            reader: None,
            writer,
            fhe: None,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn GardenReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_fhe(mut self, fhe: Arc<dyn FheInstance>) -> Self {
        self.fhe = Some(fhe);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub struct GardenController {
    deployments: DeploymentRegistry,
    maturity_threshold: u64,
    wallet: Arc<dyn WalletContext>,
    reader: RwLock<Option<Arc<dyn GardenReader>>>,
    writer: Arc<dyn GardenWriter>,
    fhe: RwLock<Option<Arc<dyn FheInstance>>>,
    signatures: SignatureCache,
    inputs: Mutex<InputGenerator>,
    state: Mutex<ControllerState>,
}

impl GardenController {
    pub fn new(config: &GardenConfig, collaborators: Collaborators) -> Result<Self, Error> {
        let inputs = InputGenerator::new(config.input_seed)?;
        let signatures = SignatureCache::new(collaborators.store, config.decryption_duration_days)
            .with_clock(collaborators.clock);

        let controller = Self {
            deployments: config.deployments.clone(),
            maturity_threshold: config.maturity_threshold,
            wallet: collaborators.wallet,
            reader: RwLock::new(collaborators.reader),
            writer: collaborators.writer,
            fhe: RwLock::new(collaborators.fhe),
            signatures,
            inputs: Mutex::new(inputs),
            state: Mutex::new(ControllerState::default()),
        };

        let context = controller.live_context();
        controller.note_missing_deployment(&context);
        Ok(controller)
    }

    /// Install or drop the encryption instance (it loads asynchronously).
    pub fn set_fhe_instance(&self, fhe: Option<Arc<dyn FheInstance>>) {
        tracing::debug!(present = fhe.is_some(), "encryption instance changed");
        *self.fhe.write().unwrap_or_else(PoisonError::into_inner) = fhe;
    }

    /// Install or drop the read-only chain connection.
    pub fn set_reader(&self, reader: Option<Arc<dyn GardenReader>>) {
        *self.reader.write().unwrap_or_else(PoisonError::into_inner) = reader;
    }

    pub fn maturity_threshold(&self) -> u64 {
        self.maturity_threshold
    }

    /// Deployment on the live chain.
    pub fn deployment(&self) -> GardenDeployment {
        self.deployments.resolve(self.wallet.chain_id())
    }

    pub fn contract_address(&self) -> Option<Address> {
        self.deployment().address
    }

    pub fn is_deployed(&self) -> bool {
        self.deployment().is_deployed()
    }

    pub fn message(&self) -> String {
        self.lock().message.clone()
    }

    pub fn plant_count(&self) -> Option<u64> {
        self.lock().plant_count
    }

    pub fn selected_plant(&self) -> Option<PlantId> {
        self.lock().selected_plant
    }

    pub fn plant_info(&self) -> Option<PlantInfo> {
        self.lock().plant_info.clone()
    }

    pub fn is_mature(&self) -> bool {
        self.lock().is_mature
    }

    pub fn growth_handle(&self) -> Option<CiphertextHandle> {
        self.lock().growth_handle
    }

    /// Decrypted growth of the selected plant, if known for its live handle.
    pub fn clear_growth(&self) -> Option<ClearScalar> {
        let state = self.lock();
        clear_for(state.growth_handle, state.clear).map(|c| c.clear)
    }

    pub fn is_decrypted(&self) -> bool {
        self.clear_growth().is_some()
    }

    pub fn decryption_phase(&self) -> DecryptionPhase {
        self.lock().decryption
    }

    /// Result of the last [`load_garden`](Self::load_garden).
    pub fn garden(&self) -> Vec<PlantSummary> {
        self.lock().garden.clone()
    }

    /// Result of the last [`my_plants`](Self::my_plants).
    pub fn my_plant_ids(&self) -> Option<Vec<PlantId>> {
        self.lock().my_plants.clone()
    }

    pub fn is_in_flight(&self, pipeline: Pipeline) -> bool {
        self.lock().guards.is_in_flight(pipeline)
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            contract: self.contract_address().is_some(),
            fhe: self.fhe().is_some(),
            signer: self.wallet.signer().is_some(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let readiness = self.readiness();
        let state = self.lock();
        self.evaluate(readiness, &state)
    }

    pub fn snapshot(&self) -> GardenSnapshot {
        let deployment = self.deployment();
        let readiness = self.readiness();
        let state = self.lock();
        let clear = clear_for(state.growth_handle, state.clear);

        GardenSnapshot {
            chain_id: deployment.chain_id,
            chain_name: deployment.chain_name,
            contract_address: deployment.address,
            is_deployed: deployment.address.is_some(),
            plant_count: state.plant_count,
            selected_plant: state.selected_plant,
            growth_handle: state.growth_handle,
            clear_growth: clear.map(|c| c.clear),
            is_decrypted: clear.is_some(),
            is_mature: state.is_mature,
            decryption: state.decryption,
            in_flight: state.guards.in_flight(),
            capabilities: self.evaluate(readiness, &state),
            message: state.message.clone(),
        }
    }

    fn evaluate(&self, readiness: Readiness, state: &ControllerState) -> Capabilities {
        evaluate(&CapabilityInputs {
            readiness,
            guards: &state.guards,
            selected_plant: state.selected_plant,
            is_mature: state.is_mature,
            growth_handle: state.growth_handle,
            clear: state.clear,
            maturity_threshold: self.maturity_threshold,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fhe(&self) -> Option<Arc<dyn FheInstance>> {
        self.fhe
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reader(&self) -> Option<Arc<dyn GardenReader>> {
        self.reader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn live_context(&self) -> OperationContext {
        self.capture().0
    }

    /// Live context together with the signer it names.
    fn capture(&self) -> (OperationContext, Option<Arc<dyn Signer>>) {
        let chain_id = self.wallet.chain_id();
        let signer = self.wallet.signer();
        let context = OperationContext {
            chain_id,
            contract: self.deployments.resolve(chain_id).address,
            signer: signer.as_ref().map(|s| s.address()),
        };
        (context, signer)
    }

    fn is_current(&self, scope: &Scope) -> bool {
        let live = self.live_context();
        let selection = self.lock().selected_plant;
        scope.matches(&live, selection)
    }

    /// Await `step`, then report whether the captured scope is still live.
    async fn checked<F: Future>(&self, scope: &Scope, step: F) -> Checked<F::Output> {
        let output = step.await;
        if self.is_current(scope) {
            Checked::Fresh(output)
        } else {
            Checked::Stale
        }
    }

    fn set_message(&self, message: impl Into<String>) {
        self.lock().message = message.into();
    }

    fn fail(&self, message: String) -> OperationOutcome {
        tracing::warn!("{}", message);
        self.set_message(message.clone());
        OperationOutcome::Failed(message)
    }

    fn ignore(&self, message: &str) -> OperationOutcome {
        tracing::info!("Context changed during operation; result discarded: {}", message);
        self.set_message(message);
        OperationOutcome::Ignored
    }

    fn note_missing_deployment(&self, context: &OperationContext) {
        if let (Some(chain_id), None) = (context.chain_id, context.contract) {
            tracing::warn!(chain_id, "No garden deployment for chain");
            self.set_message(format!(
                "MysteryGarden deployment not found for chainId={chain_id}."
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedFhe, SimulatedGarden};
    use crate::storage::InMemoryStringStore;
    use crate::wallet::{LocalSigner, SharedWalletContext};

    const CHAIN: u64 = 31337;

    fn setup() -> (GardenController, Arc<SharedWalletContext>) {
        let garden = SimulatedGarden::new();
        let fhe = SimulatedFhe::new(garden.vault());
        let signer: Arc<dyn Signer> = Arc::new(LocalSigner::from_seed(1));
        let wallet = SharedWalletContext::new(Some(CHAIN), Some(signer));
        let config = GardenConfig {
            deployments: DeploymentRegistry::new().with(CHAIN, garden.address(), Some("hardhat")),
            input_seed: Some(5),
            ..GardenConfig::default()
        };
        let collaborators = Collaborators::new(
            wallet.clone(),
            garden.clone(),
            Arc::new(InMemoryStringStore::new()),
        )
        .with_reader(garden)
        .with_fhe(fhe);
        (
            GardenController::new(&config, collaborators).unwrap(),
            wallet,
        )
    }

    #[test]
    fn reports_missing_deployment() {
        let (controller, wallet) = setup();
        assert!(controller.is_deployed());
        assert!(controller.message().is_empty());

        wallet.switch_chain(Some(1));
        assert!(!controller.is_deployed());
        assert!(!controller.capabilities().can_plant);
    }

    #[tokio::test]
    async fn refresh_on_unknown_chain_clears_and_reports() {
        let (controller, wallet) = setup();
        assert!(controller.refresh_plant_count().await.is_completed());
        assert_eq!(controller.plant_count(), Some(0));

        wallet.switch_chain(Some(11155111));
        assert_eq!(
            controller.refresh_plant_count().await,
            OperationOutcome::Skipped(SkipReason::NotReady)
        );
        assert_eq!(controller.plant_count(), None);
        assert_eq!(
            controller.message(),
            "MysteryGarden deployment not found for chainId=11155111."
        );
    }

    #[tokio::test]
    async fn missing_instance_is_a_silent_no_op() {
        let (controller, _wallet) = setup();
        controller.set_fhe_instance(None);

        assert_eq!(
            controller.plant().await,
            OperationOutcome::Skipped(SkipReason::NotReady)
        );
        assert!(controller.message().is_empty());
        assert!(!controller.is_in_flight(Pipeline::Plant));
    }

    #[tokio::test]
    async fn snapshot_reflects_selection() {
        let (controller, _wallet) = setup();
        assert!(controller.plant().await.is_completed());
        controller.select_plant(Some(0)).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.plant_count, Some(1));
        assert_eq!(snapshot.selected_plant, Some(0));
        assert_eq!(snapshot.growth_handle, Some(CiphertextHandle::EMPTY));
        assert!(snapshot.in_flight.is_empty());
        assert!(snapshot.capabilities.can_grow);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["decryption"], "idle");
        assert_eq!(json["chain_name"], "hardhat");
    }
}
