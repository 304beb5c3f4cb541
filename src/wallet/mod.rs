//! Wallet side of the controller: the signer and the live chain/account
//! context that every async step is re-validated against.

mod local;

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::SignatureError;
use crate::types::Address;

pub use self::local::{LocalSigner, eip191_personal_sign_hash, verify_personal_signature};

/// An account able to sign messages (may prompt the user).
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// Personal-sign `message`, returning a 0x-prefixed 65-byte signature.
    ///
    /// Returns [`SignatureError::Rejected`] when the user declines.
    async fn sign_message(&self, message: &[u8]) -> Result<String, SignatureError>;
}

/// Live wallet state as seen at the moment of the call.
pub trait WalletContext: Send + Sync {
    fn chain_id(&self) -> Option<u64>;

    fn signer(&self) -> Option<Arc<dyn Signer>>;

    fn signer_address(&self) -> Option<Address> {
        self.signer().map(|signer| signer.address())
    }

    /// True if the live chain still equals `chain_id`.
    fn same_chain(&self, chain_id: Option<u64>) -> bool {
        self.chain_id() == chain_id
    }

    /// True if the live signer still equals `signer`.
    fn same_signer(&self, signer: Option<Address>) -> bool {
        self.signer_address() == signer
    }
}

#[derive(Default)]
struct WalletState {
    chain_id: Option<u64>,
    signer: Option<Arc<dyn Signer>>,
}

/// Host-updated wallet context (account and network switches land here).
#[derive(Default)]
pub struct SharedWalletContext {
    state: RwLock<WalletState>,
}

impl SharedWalletContext {
    pub fn new(chain_id: Option<u64>, signer: Option<Arc<dyn Signer>>) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(WalletState { chain_id, signer }),
        })
    }

    pub fn switch_chain(&self, chain_id: Option<u64>) {
        tracing::debug!(?chain_id, "wallet chain changed");
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .chain_id = chain_id;
    }

    pub fn connect(&self, signer: Arc<dyn Signer>) {
        tracing::debug!(address = %signer.address(), "wallet account changed");
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .signer = Some(signer);
    }

    pub fn disconnect(&self) {
        tracing::debug!("wallet disconnected");
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .signer = None;
    }
}

impl WalletContext for SharedWalletContext {
    fn chain_id(&self) -> Option<u64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chain_id
    }

    fn signer(&self) -> Option<Arc<dyn Signer>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .signer
            .clone()
    }
}
