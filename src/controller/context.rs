//! Operation context captured at pipeline start and re-validated after
//! every suspension point.

use serde::Serialize;

use crate::types::{Address, PlantId};

/// The (chain, contract, signer) tuple an async result is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationContext {
    pub chain_id: Option<u64>,
    pub contract: Option<Address>,
    pub signer: Option<Address>,
}

/// What a pipeline pins besides its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pin {
    ContextOnly,
    /// The selected plant must also be unchanged.
    Selection(Option<PlantId>),
}

/// Context plus pin captured at pipeline start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scope {
    pub context: OperationContext,
    pub pin: Pin,
}

impl Scope {
    pub(crate) fn context(context: OperationContext) -> Self {
        Self {
            context,
            pin: Pin::ContextOnly,
        }
    }

    pub(crate) fn selection(context: OperationContext, selected: Option<PlantId>) -> Self {
        Self {
            context,
            pin: Pin::Selection(selected),
        }
    }

    /// True if `live` matches the capture. The live contract is re-resolved
    /// from the live chain by the caller, so a redeploy is detected too.
    pub(crate) fn matches(&self, live: &OperationContext, live_selection: Option<PlantId>) -> bool {
        if self.context != *live {
            return false;
        }
        match self.pin {
            Pin::ContextOnly => true,
            Pin::Selection(selected) => selected == live_selection,
        }
    }
}

/// Result of a step that passed through the staleness check.
#[derive(Debug)]
pub(crate) enum Checked<T> {
    Fresh(T),
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(chain: u64, signer: u8) -> OperationContext {
        OperationContext {
            chain_id: Some(chain),
            contract: Some(Address::from_bytes([9; 20])),
            signer: Some(Address::from_bytes([signer; 20])),
        }
    }

    #[test]
    fn context_scope_ignores_selection() {
        let scope = Scope::context(ctx(1, 1));
        assert!(scope.matches(&ctx(1, 1), Some(4)));
        assert!(scope.matches(&ctx(1, 1), None));
        assert!(!scope.matches(&ctx(2, 1), None));
        assert!(!scope.matches(&ctx(1, 2), None));
    }

    #[test]
    fn selection_scope_pins_plant() {
        let scope = Scope::selection(ctx(1, 1), Some(3));
        assert!(scope.matches(&ctx(1, 1), Some(3)));
        assert!(!scope.matches(&ctx(1, 1), Some(4)));
        assert!(!scope.matches(&ctx(1, 1), None));
    }

    #[test]
    fn contract_change_is_stale() {
        let scope = Scope::context(ctx(1, 1));
        let mut live = ctx(1, 1);
        live.contract = Some(Address::from_bytes([8; 20]));
        assert!(!scope.matches(&live, None));
        live.contract = None;
        assert!(!scope.matches(&live, None));
    }
}
