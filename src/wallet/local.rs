//! In-process secp256k1 signer producing EIP-191 personal signatures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::SignatureError;
use crate::types::Address;
use crate::wallet::Signer;

/// Software wallet holding a single secp256k1 key.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
    rejecting: AtomicBool,
    signatures_issued: AtomicUsize,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self {
            key,
            address,
            rejecting: AtomicBool::new(false),
            signatures_issued: AtomicUsize::new(0),
        }
    }

    /// Fresh random key.
    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Key from a 0x-prefixed 32-byte hex private key.
    pub fn from_hex(private_key: &str) -> Result<Self, SignatureError> {
        let trimmed = private_key.trim();
        let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(body)
            .map_err(|e| SignatureError::Invalid(format!("private key is not hex: {e}")))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| SignatureError::Invalid(format!("invalid private key: {e}")))?;
        Ok(Self::new(key))
    }

    /// Deterministic key derived from `seed` (demo and test accounts).
    pub fn from_seed(seed: u64) -> Self {
        let mut material = keccak256(&seed.to_be_bytes());
        loop {
            if let Ok(key) = SigningKey::from_slice(&material) {
                return Self::new(key);
            }
            material = keccak256(&material);
        }
    }

    /// Make subsequent signing requests fail as if the user declined them.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Number of signatures produced so far.
    pub fn signatures_issued(&self) -> usize {
        self.signatures_issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, SignatureError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(SignatureError::Rejected {
                address: self.address.to_string(),
                reason: "user rejected the request".to_string(),
            });
        }

        let prehash = eip191_personal_sign_hash(message);
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| SignatureError::Invalid(format!("signing failed: {e}")))?;

        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recid.to_byte() + 27);
        self.signatures_issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Keccak-256 of the EIP-191 prefixed message.
pub fn eip191_personal_sign_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    // Uncompressed SEC1: 0x04 || X || Y.
    let digest = keccak256(&encoded.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address::from_bytes(out)
}

fn normalize_recovery_id(raw: u8) -> Result<RecoveryId, SignatureError> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => {
            return Err(SignatureError::Invalid(
                "signature recovery id must be 0/1 or 27/28".to_string(),
            ));
        }
    };
    RecoveryId::try_from(id)
        .map_err(|_| SignatureError::Invalid("signature recovery id is invalid".to_string()))
}

/// Recover the signer of a personal signature and compare it to `expected`.
pub fn verify_personal_signature(
    message: &[u8],
    signature_hex: &str,
    expected: Address,
) -> Result<(), SignatureError> {
    let trimmed = signature_hex.trim();
    let body = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| SignatureError::Invalid("signature must be 0x-prefixed".to_string()))?;
    let bytes = hex::decode(body)
        .map_err(|e| SignatureError::Invalid(format!("signature is not hex: {e}")))?;
    if bytes.len() != 65 {
        return Err(SignatureError::Invalid(
            "signature must decode to 65 bytes".to_string(),
        ));
    }

    let sig = EcdsaSignature::try_from(&bytes[..64])
        .map_err(|e| SignatureError::Invalid(format!("invalid ECDSA signature bytes: {e}")))?;
    let recovery_id = normalize_recovery_id(bytes[64])?;
    let prehash = eip191_personal_sign_hash(message);
    let verifying_key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|e| SignatureError::Invalid(format!("failed recovering signer: {e}")))?;

    let recovered = address_from_verifying_key(&verifying_key);
    if recovered != expected {
        return Err(SignatureError::Invalid(format!(
            "signature was produced by {recovered}, expected {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (hardhat account #0).
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_known_dev_address() {
        let signer = LocalSigner::from_hex(DEV_KEY).expect("valid key");
        assert_eq!(
            signer.address().to_string(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[tokio::test]
    async fn signature_recovers_to_signer() {
        let signer = LocalSigner::from_seed(7);
        let message = b"authorize decryption";
        let signature = signer.sign_message(message).await.expect("sign");

        assert_eq!(signature.len(), 2 + 130);
        verify_personal_signature(message, &signature, signer.address()).expect("verifies");
        assert_eq!(signer.signatures_issued(), 1);

        let other = LocalSigner::from_seed(8);
        assert!(verify_personal_signature(message, &signature, other.address()).is_err());
        assert!(verify_personal_signature(b"tampered", &signature, signer.address()).is_err());
    }

    #[tokio::test]
    async fn rejecting_signer_returns_rejected() {
        let signer = LocalSigner::from_seed(3);
        signer.set_rejecting(true);

        let err = signer.sign_message(b"anything").await.unwrap_err();
        assert!(matches!(err, SignatureError::Rejected { .. }));
        assert_eq!(signer.signatures_issued(), 0);
    }

    #[test]
    fn seeded_signers_are_stable() {
        assert_eq!(
            LocalSigner::from_seed(11).address(),
            LocalSigner::from_seed(11).address()
        );
        assert_ne!(
            LocalSigner::from_seed(11).address(),
            LocalSigner::from_seed(12).address()
        );
    }
}
