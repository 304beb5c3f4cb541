//! Encryption SDK surface: encrypted input batches and user decryption.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FheError;
use crate::signature::DecryptionSignature;
use crate::types::{Address, CiphertextHandle, ClearScalar};

/// Scalars to encrypt together for one contract call.
///
/// All values share a single input proof, which binds them to `contract` and
/// `user`; they must be submitted in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInputBatch {
    contract: Address,
    user: Address,
    values: Vec<u32>,
}

impl EncryptedInputBatch {
    pub fn new(contract: Address, user: Address) -> Self {
        Self {
            contract,
            user,
            values: Vec::new(),
        }
    }

    /// Append a 32-bit scalar.
    pub fn add32(&mut self, value: u32) -> &mut Self {
        self.values.push(value);
        self
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn user(&self) -> Address {
        self.user
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Output of encrypting a batch: one handle per value plus the batch proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInputs {
    pub handles: Vec<CiphertextHandle>,
    pub input_proof: Vec<u8>,
}

/// Reencryption keypair generated for a decryption signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// One ciphertext to decrypt, with the contract that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract_address: Address,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationMessage<'a> {
    kind: &'static str,
    public_key: &'a str,
    contract_addresses: Vec<String>,
    start_timestamp: i64,
    duration_days: u32,
}

/// Canonical message a user signs to authorize decryption.
///
/// Contract addresses are sorted so the same set always yields the same
/// message.
pub fn authorization_message(
    public_key: &str,
    contract_addresses: &[Address],
    start_timestamp: i64,
    duration_days: u32,
) -> Vec<u8> {
    let mut contracts: Vec<String> = contract_addresses.iter().map(Address::to_string).collect();
    contracts.sort();
    contracts.dedup();

    let message = AuthorizationMessage {
        kind: "UserDecryptRequest",
        public_key,
        contract_addresses: contracts,
        start_timestamp,
        duration_days,
    };
    // Serializing a struct of strings and integers cannot fail.
    serde_json::to_vec(&message).unwrap_or_default()
}

/// The encryption SDK instance bound to the current chain.
#[async_trait]
pub trait FheInstance: Send + Sync {
    /// Encrypt every value of `batch` under one input proof.
    async fn encrypt(&self, batch: EncryptedInputBatch) -> Result<EncryptedInputs, FheError>;

    /// Generate a fresh reencryption keypair.
    fn generate_keypair(&self) -> Result<Keypair, FheError>;

    /// Message the user signs to authorize decryption under `public_key`.
    fn decryption_message(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: i64,
        duration_days: u32,
    ) -> Vec<u8> {
        authorization_message(public_key, contract_addresses, start_timestamp, duration_days)
    }

    /// Decrypt `requests` using the credentials carried by `signature`.
    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<CiphertextHandle, ClearScalar>, FheError>;
}
