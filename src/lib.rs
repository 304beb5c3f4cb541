//! Mystery Garden: client-side synchronization and decryption controller for
//! an encrypted on-chain garden.
//!
//! Plants live in a contract whose growth values are encrypted; reads return
//! opaque ciphertext handles and only a plant's owner can decrypt them. The
//! [`controller::GardenController`] mirrors remote state, runs the
//! plant/grow/mark-mature transaction pipelines and the decryption workflow,
//! and discards any async result whose wallet context changed underneath it.
//!
//! Collaborators (chain reader/writer, encryption SDK, wallet, key-value
//! store) are traits; [`sim`] provides an in-process implementation of each.

pub mod chain;
pub mod cli;
pub mod config;
pub mod controller;
pub mod deployments;
pub mod error;
pub mod fhe;
pub mod inputs;
pub mod settings;
pub mod signature;
pub mod sim;
pub mod storage;
pub mod types;
pub mod wallet;

pub use config::GardenConfig;
pub use controller::{
    Capabilities, Collaborators, DecryptionPhase, GardenController, GardenSnapshot,
    OperationOutcome, Pipeline, SkipReason,
};
pub use error::{Error, Result};
