//! Single-flight guards, one per pipeline.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::{ControllerState, DecryptionPhase};

/// Every guarded operation of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    RefreshCount,
    RefreshHandle,
    RefreshInfo,
    LoadGarden,
    MyPlants,
    Plant,
    Grow,
    Decrypt,
    MarkMature,
}

impl Pipeline {
    pub const ALL: [Pipeline; 9] = [
        Self::RefreshCount,
        Self::RefreshHandle,
        Self::RefreshInfo,
        Self::LoadGarden,
        Self::MyPlants,
        Self::Plant,
        Self::Grow,
        Self::Decrypt,
        Self::MarkMature,
    ];

    /// Refreshes of the selected-plant mirror; decryption waits for these.
    pub const MIRROR_REFRESHES: [Pipeline; 3] =
        [Self::RefreshCount, Self::RefreshHandle, Self::RefreshInfo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshCount => "refresh_count",
            Self::RefreshHandle => "refresh_handle",
            Self::RefreshInfo => "refresh_info",
            Self::LoadGarden => "load_garden",
            Self::MyPlants => "my_plants",
            Self::Plant => "plant",
            Self::Grow => "grow",
            Self::Decrypt => "decrypt",
            Self::MarkMature => "mark_mature",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    #[default]
    Idle,
    InFlight,
}

/// Guard state for every pipeline.
#[derive(Debug, Clone, Default)]
pub(crate) struct Guards {
    slots: [GuardState; Pipeline::ALL.len()],
}

impl Guards {
    pub(crate) fn get(&self, pipeline: Pipeline) -> GuardState {
        self.slots[pipeline.slot()]
    }

    pub(crate) fn is_in_flight(&self, pipeline: Pipeline) -> bool {
        self.get(pipeline) == GuardState::InFlight
    }

    pub(crate) fn any_in_flight(&self, pipelines: &[Pipeline]) -> bool {
        pipelines.iter().any(|p| self.is_in_flight(*p))
    }

    pub(crate) fn in_flight(&self) -> Vec<Pipeline> {
        Pipeline::ALL
            .into_iter()
            .filter(|p| self.is_in_flight(*p))
            .collect()
    }

    fn set(&mut self, pipeline: Pipeline, state: GuardState) {
        self.slots[pipeline.slot()] = state;
    }
}

/// Holds a pipeline's guard; the guard returns to `Idle` when this drops,
/// on every exit path.
pub(crate) struct InFlightGuard<'a> {
    state: &'a Mutex<ControllerState>,
    pipeline: Pipeline,
}

impl<'a> InFlightGuard<'a> {
    /// Set the guard, or return `None` if the pipeline is already in flight.
    pub(crate) fn try_acquire(
        state: &'a Mutex<ControllerState>,
        pipeline: Pipeline,
    ) -> Option<Self> {
        let mut locked = state.lock().unwrap_or_else(PoisonError::into_inner);
        if locked.guards.is_in_flight(pipeline) {
            tracing::debug!(%pipeline, "already in flight; dropping request");
            return None;
        }
        locked.guards.set(pipeline, GuardState::InFlight);
        Some(Self { state, pipeline })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        locked.guards.set(self.pipeline, GuardState::Idle);
        if self.pipeline == Pipeline::Decrypt && locked.decryption.is_busy() {
            locked.decryption = DecryptionPhase::Idle;
        }
    }
}
