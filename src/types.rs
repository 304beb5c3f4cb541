//! Core value types shared by the controller and its collaborators.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Plaintext value of a decrypted growth handle.
pub type ClearScalar = u64;

/// Plant identifier assigned by the contract (sequential from zero).
pub type PlantId = u64;

fn decode_prefixed<const N: usize>(value: &str, what: &str) -> Result<[u8; N], String> {
    let trimmed = value.trim();
    let Some(body) = trimmed.strip_prefix("0x") else {
        return Err(format!("{what} must be 0x-prefixed"));
    };
    if body.len() != N * 2 {
        return Err(format!(
            "{what} must have {} hex characters, got {}",
            N * 2,
            body.len()
        ));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(body, &mut out).map_err(|e| format!("invalid {what}: {e}"))?;
    Ok(out)
}

/// 20-byte EVM account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<20>(s, "address").map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Opaque 32-byte reference to an encrypted value held by the chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CiphertextHandle([u8; 32]);

impl CiphertextHandle {
    /// The handle of a slot that was never written.
    pub const EMPTY: CiphertextHandle = CiphertextHandle([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Shortened form for logs and status lines.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..10], &full[full.len() - 8..])
    }
}

impl FromStr for CiphertextHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<32>(s, "ciphertext handle").map(Self)
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({})", self.short())
    }
}

macro_rules! hex_string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_string_serde!(Address);
hex_string_serde!(CiphertextHandle);

/// Cache entry asserting that the plaintext of `handle` is known.
///
/// Only trusted while `handle` equals the live growth handle of the plant it
/// was decrypted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearValue {
    pub handle: CiphertextHandle,
    pub clear: ClearScalar,
}

/// Public metadata of a plant as returned by `getPlantInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantInfo {
    pub owner: Address,
    pub planted_at: DateTime<Utc>,
    pub is_mature: bool,
}

/// One row of the garden overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantSummary {
    pub id: PlantId,
    pub info: PlantInfo,
    /// `None` while the plant has never grown.
    pub growth_handle: Option<CiphertextHandle>,
}
