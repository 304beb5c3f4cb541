//! Decryption signature caching.
//!
//! A decryption signature authorizes one user to decrypt values held by a
//! set of contracts for a bounded number of days. Producing one prompts the
//! user, so a valid signature is persisted and reused across plants and
//! operations. Signatures are keyed by (user, sorted contract set) and never
//! shared across users or contract sets.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::SignatureError;
use crate::fhe::{FheInstance, authorization_message};
use crate::storage::StringStore;
use crate::types::Address;
use crate::wallet::Signer;

const STORAGE_KEY_PREFIX: &str = "fhevm-decryption-signature";
const SECONDS_PER_DAY: i64 = 86_400;

/// Time source for signature expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for simulations and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: RwLock::new(start),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A signed, time-bounded decryption authorization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub public_key: String,
    pub private_key: String,
    pub signature: String,
    /// Sorted and deduplicated.
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    /// Unix seconds.
    pub start_timestamp: i64,
    pub duration_days: u32,
}

impl std::fmt::Debug for DecryptionSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionSignature")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .field("signature", &self.signature)
            .field("contract_addresses", &self.contract_addresses)
            .field("user_address", &self.user_address)
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish()
    }
}

impl DecryptionSignature {
    /// Unix second at which the authorization stops being valid.
    pub fn expires_at(&self) -> i64 {
        self.start_timestamp + i64::from(self.duration_days) * SECONDS_PER_DAY
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() < self.expires_at()
    }

    /// True if this signature was issued for exactly `user` and `contracts`.
    pub fn covers(&self, user: Address, contracts: &[Address]) -> bool {
        self.user_address == user && self.contract_addresses == normalize_contracts(contracts)
    }

    /// The message the user signed to produce `signature`.
    pub fn signed_message(&self) -> Vec<u8> {
        authorization_message(
            &self.public_key,
            &self.contract_addresses,
            self.start_timestamp,
            self.duration_days,
        )
    }
}

fn normalize_contracts(contracts: &[Address]) -> Vec<Address> {
    let mut sorted = contracts.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Store key for a (user, contract set) pair.
pub fn storage_key(user: Address, contracts: &[Address]) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(user.as_bytes());
    for contract in normalize_contracts(contracts) {
        hasher.update(contract.as_bytes());
    }
    format!("{STORAGE_KEY_PREFIX}:{user}:{}", hex::encode(hasher.finalize()))
}

/// Loads persisted decryption signatures or runs a new signing ceremony.
pub struct SignatureCache {
    store: Arc<dyn StringStore>,
    clock: Arc<dyn Clock>,
    duration_days: u32,
}

impl SignatureCache {
    pub fn new(store: Arc<dyn StringStore>, duration_days: u32) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            duration_days,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    /// Return a stored, unexpired signature for `user` over `contracts`.
    pub async fn load(
        &self,
        user: Address,
        contracts: &[Address],
    ) -> Result<Option<DecryptionSignature>, SignatureError> {
        let key = storage_key(user, contracts);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let signature: DecryptionSignature = match serde_json::from_str(&raw) {
            Ok(signature) => signature,
            Err(e) => {
                let e = SignatureError::Malformed(e.to_string());
                tracing::warn!(%user, "Discarding stored decryption signature: {}", e);
                return Ok(None);
            }
        };

        if !signature.covers(user, contracts) {
            tracing::warn!(
                %user,
                "Stored decryption signature does not cover the requested contracts"
            );
            return Ok(None);
        }

        let now = self.clock.now();
        if !signature.is_valid_at(now) {
            tracing::debug!(
                %user,
                expires_at = signature.expires_at(),
                "Stored decryption signature expired"
            );
            return Ok(None);
        }

        Ok(Some(signature))
    }

    /// Reuse a valid stored signature or sign a fresh one.
    ///
    /// A rejected signing request is returned as
    /// [`SignatureError::Rejected`]; callers must not retry on their own.
    pub async fn load_or_sign(
        &self,
        fhe: &dyn FheInstance,
        contracts: &[Address],
        signer: &dyn Signer,
    ) -> Result<DecryptionSignature, SignatureError> {
        let user = signer.address();
        match self.load(user, contracts).await {
            Ok(Some(signature)) => {
                tracing::debug!(%user, "Reusing stored decryption signature");
                return Ok(signature);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%user, "Failed to read stored decryption signature: {}", e);
            }
        }

        let contract_addresses = normalize_contracts(contracts);
        let keypair = fhe
            .generate_keypair()
            .map_err(|e| SignatureError::KeyGeneration(e.to_string()))?;
        let start_timestamp = self.clock.now().timestamp();
        let message = fhe.decryption_message(
            &keypair.public_key,
            &contract_addresses,
            start_timestamp,
            self.duration_days,
        );

        tracing::info!(%user, "Requesting decryption signature from wallet");
        let signature = signer.sign_message(&message).await?;

        let signature = DecryptionSignature {
            public_key: keypair.public_key,
            private_key: keypair.private_key,
            signature,
            contract_addresses,
            user_address: user,
            start_timestamp,
            duration_days: self.duration_days,
        };

        // A failed write only costs a future prompt; the signature is still
        // usable for this call.
        match serde_json::to_string(&signature) {
            Ok(encoded) => {
                if let Err(e) = self.store.put(&storage_key(user, contracts), &encoded).await {
                    tracing::warn!(%user, "Failed to persist decryption signature: {}", e);
                }
            }
            Err(e) => tracing::warn!(%user, "Failed to encode decryption signature: {}", e),
        }

        Ok(signature)
    }
}
