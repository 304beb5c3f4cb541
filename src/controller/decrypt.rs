//! Decryption of the selected plant's growth handle.

use super::context::{Checked, Scope};
use super::guard::{InFlightGuard, Pipeline};
use super::{DecryptionPhase, GardenController, OperationOutcome, SkipReason};
use crate::error::Error;
use crate::fhe::HandleContractPair;
use crate::types::{CiphertextHandle, ClearScalar, ClearValue};

const IGNORED: &str = "Ignore FHEVM decryption";

impl GardenController {
    /// Decrypt the live growth handle of the selected plant.
    ///
    /// A stored decryption signature is reused while valid; otherwise the
    /// signer is asked for a new one. The empty handle decrypts to zero
    /// without contacting the encryption service.
    pub async fn decrypt_growth_handle(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::Decrypt) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let (refreshing, handle, cached) = {
            let state = self.lock();
            (
                state.guards.any_in_flight(&Pipeline::MIRROR_REFRESHES),
                state.growth_handle,
                state.clear,
            )
        };
        if refreshing {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        }

        let (context, signer) = self.capture();
        let (Some(contract), Some(fhe), Some(signer)) = (context.contract, self.fhe(), signer)
        else {
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let Some(handle) = handle else {
            let mut state = self.lock();
            state.clear = None;
            state.decryption = DecryptionPhase::Idle;
            return OperationOutcome::Skipped(SkipReason::NoHandle);
        };
        if cached.is_some_and(|c| c.handle == handle) {
            return OperationOutcome::Skipped(SkipReason::AlreadyDecrypted);
        }
        if handle.is_empty() {
            tracing::debug!("Empty growth handle decrypts to zero");
            self.commit_clear(CiphertextHandle::EMPTY, 0);
            return OperationOutcome::Completed;
        }

        let scope = Scope::context(context);
        self.set_phase(DecryptionPhase::AwaitingSignature);
        self.set_message("Start decrypt");
        tracing::debug!(handle = %handle.short(), "Decrypting growth handle");

        let signature = match self
            .signatures
            .load_or_sign(fhe.as_ref(), &[contract], signer.as_ref())
            .await
        {
            Ok(signature) => signature,
            Err(e) => {
                let reason = e.to_string();
                let class = Error::from(e).classify();
                tracing::warn!(
                    user = %signer.address(),
                    code = class.code,
                    "Decryption signature unavailable: {}",
                    reason
                );
                self.set_message("Unable to build FHEVM decryption signature");
                return OperationOutcome::Failed(reason);
            }
        };
        if !self.is_current(&scope) {
            return self.ignore(IGNORED);
        }

        self.set_phase(DecryptionPhase::Decrypting);
        self.set_message("Call FHEVM userDecrypt...");
        let request = [HandleContractPair {
            handle,
            contract_address: contract,
        }];

        let values = match self
            .checked(&scope, fhe.user_decrypt(&request, &signature))
            .await
        {
            Checked::Fresh(Ok(values)) => values,
            Checked::Fresh(Err(e)) => return self.fail(format!("FHEVM userDecrypt failed! {e}")),
            Checked::Stale => return self.ignore(IGNORED),
        };
        let Some(clear) = values.get(&handle).copied() else {
            return self.fail(format!(
                "FHEVM userDecrypt returned no value for {}",
                handle.short()
            ));
        };

        if !self.commit_clear(handle, clear) {
            return self.ignore(IGNORED);
        }
        OperationOutcome::Completed
    }

    /// Record `clear` as the value of `handle`, unless the live growth
    /// handle moved on (another selection or a newer growth) meanwhile.
    fn commit_clear(&self, handle: CiphertextHandle, clear: ClearScalar) -> bool {
        let mut state = self.lock();
        if state.growth_handle != Some(handle) {
            tracing::debug!(handle = %handle.short(), "Decrypted handle is no longer live");
            return false;
        }
        tracing::info!(handle = %handle.short(), clear, "Growth handle decrypted");
        state.clear = Some(ClearValue { handle, clear });
        state.decryption = DecryptionPhase::Done;
        state.message = format!("Growth handle clear value is {clear}");
        true
    }

    fn set_phase(&self, phase: DecryptionPhase) {
        self.lock().decryption = phase;
    }
}
