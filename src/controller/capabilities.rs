//! Which operations the current state permits.

use serde::Serialize;

use super::guard::{Guards, Pipeline};
use crate::types::{CiphertextHandle, ClearValue, PlantId};

/// Collaborators present right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Readiness {
    /// A contract is deployed on the live chain.
    pub contract: bool,
    pub fhe: bool,
    pub signer: bool,
}

impl Readiness {
    fn can_transact(&self) -> bool {
        self.contract && self.fhe && self.signer
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_plant: bool,
    pub can_grow: bool,
    pub can_decrypt: bool,
    pub can_mark_mature: bool,
}

pub(crate) struct CapabilityInputs<'a> {
    pub readiness: Readiness,
    pub guards: &'a Guards,
    pub selected_plant: Option<PlantId>,
    pub is_mature: bool,
    pub growth_handle: Option<CiphertextHandle>,
    pub clear: Option<ClearValue>,
    pub maturity_threshold: u64,
}

/// Plaintext of `handle`, if `clear` was decrypted from exactly that handle.
pub(crate) fn clear_for(
    handle: Option<CiphertextHandle>,
    clear: Option<ClearValue>,
) -> Option<ClearValue> {
    match (handle, clear) {
        (Some(handle), Some(clear)) if clear.handle == handle => Some(clear),
        _ => None,
    }
}

pub(crate) fn evaluate(inputs: &CapabilityInputs<'_>) -> Capabilities {
    let ready = inputs.readiness;
    let guards = inputs.guards;

    let can_plant = ready.can_transact() && !guards.is_in_flight(Pipeline::Plant);

    let can_grow = ready.can_transact()
        && inputs.selected_plant.is_some()
        && !guards.is_in_flight(Pipeline::Grow)
        && !inputs.is_mature;

    let decrypted = clear_for(inputs.growth_handle, inputs.clear);
    let can_decrypt = ready.can_transact()
        && !guards.any_in_flight(&Pipeline::MIRROR_REFRESHES)
        && !guards.is_in_flight(Pipeline::Decrypt)
        && inputs.growth_handle.is_some_and(|h| !h.is_empty())
        && decrypted.is_none();

    let can_mark_mature = ready.contract
        && ready.signer
        && inputs.selected_plant.is_some()
        && !inputs.is_mature
        && !guards.is_in_flight(Pipeline::MarkMature)
        && decrypted.is_some_and(|c| c.clear >= inputs.maturity_threshold);

    Capabilities {
        can_plant,
        can_grow,
        can_decrypt,
        can_mark_mature,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const READY: Readiness = Readiness {
        contract: true,
        fhe: true,
        signer: true,
    };

    fn handle(byte: u8) -> CiphertextHandle {
        CiphertextHandle::from_bytes([byte; 32])
    }

    fn inputs(guards: &Guards) -> CapabilityInputs<'_> {
        CapabilityInputs {
            readiness: READY,
            guards,
            selected_plant: Some(0),
            is_mature: false,
            growth_handle: Some(handle(1)),
            clear: None,
            maturity_threshold: 100,
        }
    }

    #[test]
    fn everything_but_maturity_when_ready() {
        let guards = Guards::default();
        assert_eq!(
            evaluate(&inputs(&guards)),
            Capabilities {
                can_plant: true,
                can_grow: true,
                can_decrypt: true,
                can_mark_mature: false,
            }
        );
    }

    #[test]
    fn missing_collaborators_disable_transactions() {
        let guards = Guards::default();
        for readiness in [
            Readiness { contract: false, ..READY },
            Readiness { fhe: false, ..READY },
            Readiness { signer: false, ..READY },
        ] {
            let caps = evaluate(&CapabilityInputs {
                readiness,
                ..inputs(&guards)
            });
            assert!(!caps.can_plant && !caps.can_grow && !caps.can_decrypt);
        }
    }

    #[test]
    fn decrypt_follows_the_live_handle() {
        let guards = Guards::default();
        let decrypted = CapabilityInputs {
            clear: Some(ClearValue {
                handle: handle(1),
                clear: 42,
            }),
            ..inputs(&guards)
        };
        assert!(!evaluate(&decrypted).can_decrypt);

        let moved_on = CapabilityInputs {
            growth_handle: Some(handle(2)),
            ..decrypted
        };
        assert!(evaluate(&moved_on).can_decrypt);

        let empty = CapabilityInputs {
            growth_handle: Some(CiphertextHandle::EMPTY),
            ..inputs(&guards)
        };
        assert!(!evaluate(&empty).can_decrypt);
    }

    #[test]
    fn mature_plants_cannot_grow() {
        let guards = Guards::default();
        let caps = evaluate(&CapabilityInputs {
            is_mature: true,
            ..inputs(&guards)
        });
        assert!(!caps.can_grow);
        assert!(caps.can_plant);
    }

    #[test]
    fn mark_mature_needs_decrypted_growth_over_threshold() {
        let guards = Guards::default();
        let below = CapabilityInputs {
            clear: Some(ClearValue {
                handle: handle(1),
                clear: 99,
            }),
            ..inputs(&guards)
        };
        assert!(!evaluate(&below).can_mark_mature);

        let at = CapabilityInputs {
            clear: Some(ClearValue {
                handle: handle(1),
                clear: 100,
            }),
            ..inputs(&guards)
        };
        assert!(evaluate(&at).can_mark_mature);

        let stale_clear = CapabilityInputs {
            growth_handle: Some(handle(2)),
            ..at
        };
        assert!(!evaluate(&stale_clear).can_mark_mature);
    }
}
