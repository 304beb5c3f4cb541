//! In-process encryption service backed by the ciphertext vault.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::RngCore;
use sha3::{Digest, Keccak256};

use super::vault::CiphertextVault;
use crate::error::FheError;
use crate::fhe::{EncryptedInputBatch, EncryptedInputs, FheInstance, HandleContractPair, Keypair};
use crate::signature::{Clock, DecryptionSignature, SystemClock};
use crate::types::{CiphertextHandle, ClearScalar};
use crate::wallet::verify_personal_signature;

/// Simulated encryption SDK instance.
///
/// `user_decrypt` enforces what the real relayer does: the signature must
/// recover to the requesting user and still be valid, each contract must be
/// in the signed set, and both the user and the contract must be on the
/// handle's access list.
pub struct SimulatedFhe {
    vault: Arc<CiphertextVault>,
    clock: Arc<dyn Clock>,
    encrypt_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
}

impl SimulatedFhe {
    pub fn new(vault: Arc<CiphertextVault>) -> Arc<Self> {
        Self::with_clock(vault, Arc::new(SystemClock))
    }

    pub fn with_clock(vault: Arc<CiphertextVault>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            vault,
            clock,
            encrypt_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
        })
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    /// Number of `user_decrypt` calls that reached the service.
    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn authorize(
        &self,
        requests: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<(), FheError> {
        verify_personal_signature(
            &signature.signed_message(),
            &signature.signature,
            signature.user_address,
        )
        .map_err(|e| FheError::DecryptionFailed(format!("bad decryption signature: {e}")))?;

        if !signature.is_valid_at(self.clock.now()) {
            return Err(FheError::DecryptionFailed(
                "decryption signature expired".to_string(),
            ));
        }

        let user = signature.user_address;
        for request in requests {
            let authorized = signature.contract_addresses.contains(&request.contract_address)
                && self.vault.is_allowed(request.handle, user)
                && self.vault.is_allowed(request.handle, request.contract_address);
            if !authorized {
                return Err(FheError::Unauthorized {
                    handle: request.handle.to_string(),
                    user: user.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FheInstance for SimulatedFhe {
    async fn encrypt(&self, batch: EncryptedInputBatch) -> Result<EncryptedInputs, FheError> {
        if batch.is_empty() {
            return Err(FheError::EncryptionFailed("empty input batch".to_string()));
        }
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .vault
            .encrypt_inputs(batch.contract(), batch.user(), batch.values()))
    }

    fn generate_keypair(&self) -> Result<Keypair, FheError> {
        let mut private = [0u8; 32];
        rand::thread_rng()
            .try_fill_bytes(&mut private)
            .map_err(|e| FheError::KeyGeneration(e.to_string()))?;
        let public = Keccak256::digest(private);
        Ok(Keypair {
            public_key: format!("0x{}", hex::encode(public)),
            private_key: format!("0x{}", hex::encode(private)),
        })
    }

    async fn user_decrypt(
        &self,
        requests: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<CiphertextHandle, ClearScalar>, FheError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(requests, signature)?;

        requests
            .iter()
            .map(|request| {
                self.vault
                    .value(request.handle)
                    .map(|clear| (request.handle, clear))
                    .ok_or_else(|| {
                        FheError::DecryptionFailed(format!("unknown handle {}", request.handle))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureCache;
    use crate::storage::InMemoryStringStore;
    use crate::types::Address;
    use crate::wallet::{LocalSigner, Signer};

    #[tokio::test]
    async fn only_listed_users_can_decrypt() {
        let vault = Arc::new(CiphertextVault::new());
        let fhe = SimulatedFhe::new(vault.clone());
        let contract = Address::from_bytes([5; 20]);
        let owner = LocalSigner::from_seed(1);
        let stranger = LocalSigner::from_seed(2);
        let handle = vault.store(77, &[owner.address(), contract]);
        let request = [HandleContractPair {
            handle,
            contract_address: contract,
        }];

        let cache = SignatureCache::new(Arc::new(InMemoryStringStore::new()), 365);
        let signature = cache.load_or_sign(fhe.as_ref(), &[contract], &owner).await.unwrap();
        let values = fhe.user_decrypt(&request, &signature).await.unwrap();
        assert_eq!(values.get(&handle), Some(&77));

        let theirs = cache
            .load_or_sign(fhe.as_ref(), &[contract], &stranger)
            .await
            .unwrap();
        assert!(matches!(
            fhe.user_decrypt(&request, &theirs).await,
            Err(FheError::Unauthorized { .. })
        ));
        assert_eq!(fhe.decrypt_calls(), 2);
    }

    #[tokio::test]
    async fn forged_signature_is_rejected() {
        let vault = Arc::new(CiphertextVault::new());
        let fhe = SimulatedFhe::new(vault.clone());
        let contract = Address::from_bytes([5; 20]);
        let owner = LocalSigner::from_seed(1);
        let handle = vault.store(1, &[owner.address(), contract]);

        let cache = SignatureCache::new(Arc::new(InMemoryStringStore::new()), 365);
        let mut signature = cache.load_or_sign(fhe.as_ref(), &[contract], &owner).await.unwrap();
        signature.duration_days = 10_000;

        let err = fhe
            .user_decrypt(
                &[HandleContractPair {
                    handle,
                    contract_address: contract,
                }],
                &signature,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FheError::DecryptionFailed(_)));
    }

    #[tokio::test]
    async fn encrypt_rejects_empty_batch() {
        let fhe = SimulatedFhe::new(Arc::new(CiphertextVault::new()));
        let batch =
            EncryptedInputBatch::new(Address::from_bytes([1; 20]), Address::from_bytes([2; 20]));
        assert!(fhe.encrypt(batch).await.is_err());
        assert_eq!(fhe.encrypt_calls(), 0);
    }
}
