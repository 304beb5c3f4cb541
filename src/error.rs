//! Error types for the garden controller.

use serde::Serialize;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("FHE error: {0}")]
    Fhe(#[from] FheError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Read/write failures against the garden contract.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("{method}() call failed: {reason}")]
    CallFailed { method: &'static str, reason: String },

    #[error("Transaction {hash} was not included: {reason}")]
    InclusionFailed { hash: String, reason: String },

    #[error("Plant {id} does not exist")]
    UnknownPlant { id: u64 },

    #[error("No contract deployed at {address}")]
    NoContract { address: String },
}

/// Encryption SDK failures.
#[derive(Debug, thiserror::Error)]
pub enum FheError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Handle {handle} is not authorized for {user}")]
    Unauthorized { handle: String, user: String },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
}

/// Decryption-signature failures.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Signer {address} rejected the signing request: {reason}")]
    Rejected { address: String, reason: String },

    #[error("Invalid signature: {0}")]
    Invalid(String),

    #[error("Stored signature is malformed: {0}")]
    Malformed(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Signature store error: {0}")]
    Store(#[from] StoreError),
}

/// Key-value store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Input generator construction failures.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Invalid weights for {name}: {reason}")]
    InvalidWeights { name: &'static str, reason: String },
}

/// Coarse failure domain surfaced to presentation layers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    Config,
    Chain,
    Encryption,
    Signature,
    Storage,
}

/// Structured classification of an [`Error`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorClass {
    pub domain: ErrorDomain,
    pub code: &'static str,
    pub retryable: bool,
}

impl ErrorClass {
    fn new(domain: ErrorDomain, code: &'static str, retryable: bool) -> Self {
        Self {
            domain,
            code,
            retryable,
        }
    }
}

impl Error {
    /// Classify this error for status consumers.
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::new(ErrorDomain::Config, "config.invalid", false),
            Self::Input(_) => ErrorClass::new(ErrorDomain::Config, "config.input_weights", false),
            Self::Chain(err) => match err {
                ChainError::CallFailed { .. } => {
                    ErrorClass::new(ErrorDomain::Chain, "chain.call_failed", true)
                }
                ChainError::InclusionFailed { .. } => {
                    ErrorClass::new(ErrorDomain::Chain, "chain.inclusion_failed", true)
                }
                ChainError::UnknownPlant { .. } => {
                    ErrorClass::new(ErrorDomain::Chain, "chain.unknown_plant", false)
                }
                ChainError::NoContract { .. } => {
                    ErrorClass::new(ErrorDomain::Chain, "chain.no_contract", false)
                }
            },
            Self::Fhe(err) => match err {
                FheError::Unauthorized { .. } => {
                    ErrorClass::new(ErrorDomain::Encryption, "fhe.unauthorized", false)
                }
                FheError::EncryptionFailed(_) => {
                    ErrorClass::new(ErrorDomain::Encryption, "fhe.encryption_failed", true)
                }
                FheError::DecryptionFailed(_) => {
                    ErrorClass::new(ErrorDomain::Encryption, "fhe.decryption_failed", true)
                }
                FheError::KeyGeneration(_) => {
                    ErrorClass::new(ErrorDomain::Encryption, "fhe.keygen_failed", true)
                }
            },
            Self::Signature(err) => match err {
                // A rejected ceremony is terminal for the attempt; the user
                // has to start a new decrypt.
                SignatureError::Rejected { .. } => {
                    ErrorClass::new(ErrorDomain::Signature, "signature.rejected", false)
                }
                SignatureError::Store(_) => {
                    ErrorClass::new(ErrorDomain::Storage, "storage.signature_store", true)
                }
                _ => ErrorClass::new(ErrorDomain::Signature, "signature.invalid", false),
            },
            Self::Store(_) => ErrorClass::new(ErrorDomain::Storage, "storage.io", true),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
