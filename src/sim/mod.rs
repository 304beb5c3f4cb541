//! In-process simulated deployment: contract, ciphertext vault and
//! encryption service. Drives the demo binary and the integration tests.

mod fhe;
mod garden;
mod vault;

pub use self::fhe::SimulatedFhe;
pub use self::garden::{DEFAULT_GARDEN_ADDRESS, SimulatedGarden};
pub use self::vault::CiphertextVault;

/// Chain id of a local development node.
pub const LOCAL_CHAIN_ID: u64 = 31337;
