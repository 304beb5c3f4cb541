//! Plaintext store behind simulated ciphertext handles.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha3::{Digest, Keccak256};

use crate::fhe::EncryptedInputs;
use crate::types::{Address, CiphertextHandle, ClearScalar};

#[derive(Debug)]
struct Entry {
    value: ClearScalar,
    acl: HashSet<Address>,
}

#[derive(Debug)]
struct ProofRecord {
    contract: Address,
    user: Address,
    handles: Vec<CiphertextHandle>,
}

#[derive(Debug, Default)]
struct VaultState {
    entries: HashMap<CiphertextHandle, Entry>,
    proofs: HashMap<Vec<u8>, ProofRecord>,
    counter: u64,
}

/// Maps handles to plaintexts and access lists, standing in for the
/// coprocessor of a real deployment.
#[derive(Debug, Default)]
pub struct CiphertextVault {
    state: Mutex<VaultState>,
}

impl CiphertextVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_handle(state: &mut VaultState) -> CiphertextHandle {
        state.counter += 1;
        let mut hasher = Keccak256::new();
        hasher.update(b"mystery-garden/handle");
        hasher.update(state.counter.to_be_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        // Never collide with the empty handle.
        bytes[31] |= 1;
        CiphertextHandle::from_bytes(bytes)
    }

    /// Encrypt user inputs bound to (`contract`, `user`) under one proof.
    pub fn encrypt_inputs(
        &self,
        contract: Address,
        user: Address,
        values: &[u32],
    ) -> EncryptedInputs {
        let mut state = self.lock();
        let handles: Vec<CiphertextHandle> = values
            .iter()
            .map(|value| {
                let handle = Self::next_handle(&mut state);
                state.entries.insert(
                    handle,
                    Entry {
                        value: ClearScalar::from(*value),
                        acl: HashSet::new(),
                    },
                );
                handle
            })
            .collect();

        let mut hasher = Keccak256::new();
        hasher.update(contract.as_bytes());
        hasher.update(user.as_bytes());
        for handle in &handles {
            hasher.update(handle.as_bytes());
        }
        let input_proof = hasher.finalize().to_vec();
        state.proofs.insert(
            input_proof.clone(),
            ProofRecord {
                contract,
                user,
                handles: handles.clone(),
            },
        );

        EncryptedInputs {
            handles,
            input_proof,
        }
    }

    /// True if `proof` binds `handle` to `contract` and `user`.
    pub fn verify_input(
        &self,
        handle: CiphertextHandle,
        proof: &[u8],
        contract: Address,
        user: Address,
    ) -> bool {
        self.lock().proofs.get(proof).is_some_and(|record| {
            record.contract == contract && record.user == user && record.handles.contains(&handle)
        })
    }

    /// Store a computed value readable by `acl`.
    pub fn store(&self, value: ClearScalar, acl: &[Address]) -> CiphertextHandle {
        let mut state = self.lock();
        let handle = Self::next_handle(&mut state);
        state.entries.insert(
            handle,
            Entry {
                value,
                acl: acl.iter().copied().collect(),
            },
        );
        handle
    }

    pub fn value(&self, handle: CiphertextHandle) -> Option<ClearScalar> {
        self.lock().entries.get(&handle).map(|entry| entry.value)
    }

    pub fn is_allowed(&self, handle: CiphertextHandle, account: Address) -> bool {
        self.lock()
            .entries
            .get(&handle)
            .is_some_and(|entry| entry.acl.contains(&account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proofs_bind_contract_user_and_handles() {
        let vault = CiphertextVault::new();
        let contract = Address::from_bytes([1; 20]);
        let user = Address::from_bytes([2; 20]);
        let inputs = vault.encrypt_inputs(contract, user, &[3, 4]);

        assert_eq!(inputs.handles.len(), 2);
        assert_eq!(vault.value(inputs.handles[1]), Some(4));
        assert!(vault.verify_input(inputs.handles[0], &inputs.input_proof, contract, user));
        assert!(!vault.verify_input(inputs.handles[0], &inputs.input_proof, user, user));

        let other = vault.encrypt_inputs(contract, user, &[5]);
        assert!(!vault.verify_input(other.handles[0], &inputs.input_proof, contract, user));
    }

    #[test]
    fn stored_values_honor_acl() {
        let vault = CiphertextVault::new();
        let owner = Address::from_bytes([7; 20]);
        let handle = vault.store(42, &[owner]);

        assert!(!handle.is_empty());
        assert!(vault.is_allowed(handle, owner));
        assert!(!vault.is_allowed(handle, Address::from_bytes([8; 20])));
    }
}
