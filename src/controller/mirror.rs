//! Read-only mirror of remote garden state.

use super::context::{Checked, Scope};
use super::guard::{InFlightGuard, Pipeline};
use super::{DecryptionPhase, GardenController, OperationOutcome, SkipReason};
use crate::error::{ChainError, Error};
use crate::types::{PlantId, PlantSummary};

impl GardenController {
    /// Re-read `totalPlants()`.
    pub async fn refresh_plant_count(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::RefreshCount) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let context = self.live_context();
        let (Some(contract), Some(reader)) = (context.contract, self.reader()) else {
            self.lock().plant_count = None;
            self.note_missing_deployment(&context);
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let scope = Scope::context(context);
        let step = self.checked(&scope, reader.total_plants(contract)).await;
        let count = match self.settle_read(step, "totalPlants()") {
            Ok(count) => count,
            Err(outcome) => return outcome,
        };

        tracing::info!(chain_id = ?context.chain_id, count, "totalPlants()");
        self.lock().plant_count = Some(count);
        OperationOutcome::Completed
    }

    /// Re-read the growth handle of the selected plant.
    pub async fn refresh_growth_handle(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::RefreshHandle) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let selected = self.lock().selected_plant;
        let Some(plant_id) = selected else {
            self.lock().growth_handle = None;
            return OperationOutcome::Skipped(SkipReason::NoSelection);
        };

        let context = self.live_context();
        let (Some(contract), Some(reader)) = (context.contract, self.reader()) else {
            self.lock().growth_handle = None;
            self.note_missing_deployment(&context);
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let scope = Scope::selection(context, Some(plant_id));
        let step = self
            .checked(&scope, reader.growth_handle(contract, plant_id))
            .await;
        let handle = match self.settle_read(step, "getGrowth()") {
            Ok(handle) => handle,
            Err(outcome) => return outcome,
        };

        tracing::info!(plant_id, handle = %handle.short(), "getGrowth()");
        let mut state = self.lock();
        state.growth_handle = Some(handle);
        if state.clear.is_some_and(|c| c.handle != handle)
            && state.decryption == DecryptionPhase::Done
        {
            state.decryption = DecryptionPhase::Idle;
        }
        OperationOutcome::Completed
    }

    /// Re-read the metadata (and maturity) of the selected plant.
    pub async fn refresh_plant_info(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::RefreshInfo) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let selected = self.lock().selected_plant;
        let Some(plant_id) = selected else {
            self.reset_plant_info();
            return OperationOutcome::Skipped(SkipReason::NoSelection);
        };

        let context = self.live_context();
        let (Some(contract), Some(reader)) = (context.contract, self.reader()) else {
            self.reset_plant_info();
            self.note_missing_deployment(&context);
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let scope = Scope::selection(context, Some(plant_id));
        let step = self
            .checked(&scope, reader.plant_info(contract, plant_id))
            .await;
        let info = match self.settle_read(step, "getPlantInfo()") {
            Ok(info) => info,
            Err(OperationOutcome::Ignored) => return OperationOutcome::Ignored,
            Err(outcome) => {
                self.reset_plant_info();
                return outcome;
            }
        };

        tracing::info!(
            plant_id,
            owner = %info.owner,
            is_mature = info.is_mature,
            "getPlantInfo()"
        );
        let mut state = self.lock();
        state.is_mature = info.is_mature;
        state.plant_info = Some(info);
        OperationOutcome::Completed
    }

    /// Change the selected plant and refresh its handle and metadata.
    ///
    /// Cached maturity and handle of the previous selection are dropped
    /// immediately; selecting `None` leaves both cleared.
    pub async fn select_plant(&self, plant_id: Option<PlantId>) {
        {
            let mut state = self.lock();
            state.selected_plant = plant_id;
            state.is_mature = false;
            state.plant_info = None;
            state.growth_handle = None;
        }
        tracing::debug!(?plant_id, "Selected plant");

        if plant_id.is_some() {
            tokio::join!(self.refresh_growth_handle(), self.refresh_plant_info());
        }
    }

    /// Read every plant's metadata and growth handle.
    pub async fn load_garden(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::LoadGarden) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let context = self.live_context();
        let (Some(contract), Some(reader)) = (context.contract, self.reader()) else {
            self.lock().garden.clear();
            self.note_missing_deployment(&context);
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let scope = Scope::context(context);
        let step = self.checked(&scope, reader.total_plants(contract)).await;
        let count = match self.settle_read(step, "totalPlants()") {
            Ok(count) => count,
            Err(outcome) => return outcome,
        };

        let mut plants = Vec::new();
        for id in 0..count {
            let step = self.checked(&scope, reader.plant_info(contract, id)).await;
            let info = match self.settle_read(step, "getPlantInfo()") {
                Ok(info) => info,
                Err(outcome) => return outcome,
            };
            let step = self.checked(&scope, reader.growth_handle(contract, id)).await;
            let handle = match self.settle_read(step, "getGrowth()") {
                Ok(handle) => handle,
                Err(outcome) => return outcome,
            };
            plants.push(PlantSummary {
                id,
                info,
                growth_handle: (!handle.is_empty()).then_some(handle),
            });
        }

        tracing::info!(count, "Loaded garden");
        let mut state = self.lock();
        state.plant_count = Some(count);
        state.garden = plants;
        OperationOutcome::Completed
    }

    /// Look up the plants owned by the current signer.
    pub async fn my_plants(&self) -> OperationOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.state, Pipeline::MyPlants) else {
            return OperationOutcome::Skipped(SkipReason::InFlight);
        };

        let context = self.live_context();
        let (Some(contract), Some(owner), Some(reader)) =
            (context.contract, context.signer, self.reader())
        else {
            self.lock().my_plants = None;
            return OperationOutcome::Skipped(SkipReason::NotReady);
        };

        let scope = Scope::context(context);
        let step = self
            .checked(&scope, reader.owner_plant_count(contract, owner))
            .await;
        let count = match self.settle_read(step, "getOwnerPlantCount()") {
            Ok(count) => count,
            Err(outcome) => return outcome,
        };

        let mut ids = Vec::new();
        for index in 0..count {
            let step = self
                .checked(&scope, reader.owner_plant(contract, owner, index))
                .await;
            match self.settle_read(step, "getOwnerPlant()") {
                Ok(id) => ids.push(id),
                Err(outcome) => return outcome,
            }
        }

        tracing::info!(%owner, count, "Loaded owned plants");
        self.lock().my_plants = Some(ids);
        OperationOutcome::Completed
    }

    fn reset_plant_info(&self) {
        let mut state = self.lock();
        state.is_mature = false;
        state.plant_info = None;
    }

    /// Unwrap a checked read, turning staleness and errors into outcomes.
    fn settle_read<T>(
        &self,
        step: Checked<Result<T, ChainError>>,
        call: &str,
    ) -> Result<T, OperationOutcome> {
        match step {
            Checked::Fresh(Ok(value)) => Ok(value),
            Checked::Fresh(Err(e)) => {
                let message = format!("MysteryGarden.{call} call failed! error={e}");
                let class = Error::from(e).classify();
                tracing::debug!(code = class.code, retryable = class.retryable, "Read failed");
                Err(self.fail(message))
            }
            Checked::Stale => {
                tracing::debug!(call, "Discarding read from a stale context");
                Err(OperationOutcome::Ignored)
            }
        }
    }
}
