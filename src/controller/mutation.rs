//! Encrypt, submit and confirm pipelines: plant, grow and mark-as-mature.

use std::future::Future;
use std::sync::PoisonError;

use super::capabilities::clear_for;
use super::context::{Checked, Scope};
use super::guard::{InFlightGuard, Pipeline};
use super::{GardenController, OperationOutcome, SkipReason};
use crate::chain::{PendingTx, TxReceipt, TxStatus};
use crate::error::{ChainError, FheError};
use crate::fhe::{EncryptedInputBatch, EncryptedInputs};
use crate::inputs::PlantInputs;
use crate::types::CiphertextHandle;

/// Status lines of one transaction pipeline.
struct Messages {
    completed: &'static str,
    failed: &'static str,
    ignored: &'static str,
}

const PLANT: Messages = Messages {
    completed: "Plant completed",
    failed: "Plant Failed!",
    ignored: "Ignore plant",
};

const GROW: Messages = Messages {
    completed: "Grow completed",
    failed: "Grow Failed!",
    ignored: "Ignore grow",
};

const MARK_MATURE: Messages = Messages {
    completed: "Mark as mature completed",
    failed: "Mark as mature failed!",
    ignored: "Ignore mark as mature",
};

impl GardenController {
    /// Plant a new seed with three encrypted, randomly drawn inputs.
    pub async fn plant(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::Plant) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let (context, signer) = self.capture();
        let (Some(contract), Some(fhe), Some(signer)) = (context.contract, self.fhe(), signer)
        else {
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let scope = Scope::context(context);
        self.set_message("Start planting...");
        tracing::debug!(chain_id = ?context.chain_id, %contract, "Planting");

        let inputs = self.next_plant_inputs();
        let mut batch = EncryptedInputBatch::new(contract, signer.address());
        for value in inputs.as_array() {
            batch.add32(value);
        }

        let encrypted = match self.encrypt(&scope, fhe.encrypt(batch), &PLANT).await {
            Ok(encrypted) => encrypted,
            Err(outcome) => return outcome,
        };
        let handles: [CiphertextHandle; 3] = match encrypted.handles.as_slice().try_into() {
            Ok(handles) => handles,
            Err(_) => {
                return self.fail(format!(
                    "{} encryption returned {} handles, expected 3",
                    PLANT.failed,
                    encrypted.handles.len()
                ));
            }
        };
        // One batch proof covers all three handles; the call takes it once
        // per argument.
        let proof = encrypted.input_proof;
        let proofs = [proof.clone(), proof.clone(), proof];

        self.set_message("Call plant...");
        let submit = self
            .writer
            .plant(contract, signer.address(), handles, proofs);
        let receipt = match self.confirm(&scope, submit, &PLANT).await {
            Ok(receipt) => receipt,
            Err(outcome) => return outcome,
        };

        tracing::info!(tx = %receipt.hash, "Plant confirmed");
        self.refresh_plant_count().await;
        OperationOutcome::Completed
    }

    /// Grow the selected plant by an encrypted time factor.
    pub async fn grow(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::Grow) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let (selected, is_mature) = {
            let state = self.lock();
            (state.selected_plant, state.is_mature)
        };
        let Some(plant_id) = selected else {
            return OperationOutcome::Skipped(SkipReason::NoSelection);
        };

        let (context, signer) = self.capture();
        let (Some(contract), Some(fhe), Some(signer)) = (context.contract, self.fhe(), signer)
        else {
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };
        if is_mature {
            return OperationOutcome::Skipped(SkipReason::NotPermitted);
        }

        let scope = Scope::context(context);
        self.set_message("Start growing...");
        tracing::debug!(plant_id, "Growing");

        let time = self.next_time_factor();
        let mut batch = EncryptedInputBatch::new(contract, signer.address());
        batch.add32(time);

        let encrypted = match self.encrypt(&scope, fhe.encrypt(batch), &GROW).await {
            Ok(encrypted) => encrypted,
            Err(outcome) => return outcome,
        };
        let Some(handle) = encrypted.handles.first().copied() else {
            return self.fail(format!("{} encryption returned no handle", GROW.failed));
        };

        self.set_message("Call calculateGrowth...");
        let submit = self.writer.calculate_growth(
            contract,
            signer.address(),
            plant_id,
            handle,
            encrypted.input_proof,
        );
        let receipt = match self.confirm(&scope, submit, &GROW).await {
            Ok(receipt) => receipt,
            Err(outcome) => return outcome,
        };

        tracing::info!(plant_id, tx = %receipt.hash, "Grow confirmed");
        self.refresh_growth_handle().await;
        OperationOutcome::Completed
    }

    /// Mark the selected plant as mature.
    ///
    /// Only permitted once the decrypted growth of the live handle reaches
    /// the maturity threshold.
    pub async fn mark_as_mature(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::MarkMature) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let (context, signer) = self.capture();
        let (Some(contract), Some(signer)) = (context.contract, signer) else {
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let (selected, permitted) = {
            let state = self.lock();
            let grown = clear_for(state.growth_handle, state.clear)
                .is_some_and(|c| c.clear >= self.maturity_threshold);
            (state.selected_plant, grown && !state.is_mature)
        };
        let Some(plant_id) = selected else {
            return OperationOutcome::Skipped(SkipReason::NoSelection);
        };
        if !permitted {
            return OperationOutcome::Skipped(SkipReason::NotPermitted);
        }

        let scope = Scope::context(context);
        self.set_message("Marking plant as mature...");
        let submit = self
            .writer
            .mark_as_mature(contract, signer.address(), plant_id);
        let receipt = match self.confirm(&scope, submit, &MARK_MATURE).await {
            Ok(receipt) => receipt,
            Err(outcome) => return outcome,
        };

        tracing::info!(plant_id, tx = %receipt.hash, "Plant marked as mature");
        self.set_message("Plant marked as mature!");
        tokio::join!(self.refresh_growth_handle(), self.refresh_plant_info());
        OperationOutcome::Completed
    }

    fn next_plant_inputs(&self) -> PlantInputs {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plant_inputs()
    }

    fn next_time_factor(&self) -> u32 {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .time_factor()
    }

    async fn encrypt<F>(
        &self,
        scope: &Scope,
        encrypt: F,
        messages: &Messages,
    ) -> Result<EncryptedInputs, OperationOutcome>
    where
        F: Future<Output = Result<EncryptedInputs, FheError>>,
    {
        match self.checked(scope, encrypt).await {
            Checked::Fresh(Ok(encrypted)) => Ok(encrypted),
            Checked::Fresh(Err(e)) => Err(self.fail(format!("{} {e}", messages.failed))),
            Checked::Stale => Err(self.ignore(messages.ignored)),
        }
    }

    /// Submit, wait for inclusion and check the receipt status.
    async fn confirm<F>(
        &self,
        scope: &Scope,
        submit: F,
        messages: &Messages,
    ) -> Result<TxReceipt, OperationOutcome>
    where
        F: Future<Output = Result<PendingTx, ChainError>>,
    {
        let tx = match self.checked(scope, submit).await {
            Checked::Fresh(Ok(tx)) => tx,
            Checked::Fresh(Err(e)) => return Err(self.fail(format!("{} {e}", messages.failed))),
            Checked::Stale => return Err(self.ignore(messages.ignored)),
        };

        self.set_message(format!("Wait for tx:{}...", tx.hash));
        tracing::debug!(tx = %tx.hash, "Waiting for inclusion");

        let receipt = match self.checked(scope, self.writer.wait_for_receipt(&tx)).await {
            Checked::Fresh(Ok(receipt)) => receipt,
            Checked::Fresh(Err(e)) => return Err(self.fail(format!("{} {e}", messages.failed))),
            Checked::Stale => return Err(self.ignore(messages.ignored)),
        };

        self.set_message(format!("{} status={}", messages.completed, receipt.status));
        if receipt.status == TxStatus::Reverted {
            tracing::warn!(tx = %receipt.hash, "Transaction reverted");
            return Err(OperationOutcome::Reverted { hash: receipt.hash });
        }
        Ok(receipt)
    }
}
