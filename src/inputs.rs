//! Plaintext inputs for plant and grow transactions.
//!
//! Each plant input is drawn from 1..=8 with weights 8,7,...,1 so small
//! values dominate; the contract multiplies them together on every grow,
//! and skewing low keeps cumulative growth bounded. Seed the generator for
//! reproducible runs.

use rand::distributions::{Distribution, Uniform, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::InputError;

const PLANT_INPUT_MIN: u32 = 1;
const PLANT_INPUT_MAX: u32 = 8;
const TIME_FACTOR_MIN: u32 = 1;
const TIME_FACTOR_MAX: u32 = 2;

/// Discrete weighted distribution over `low..low + weights.len()`.
#[derive(Debug, Clone)]
pub struct WeightedRange {
    low: u32,
    high: u32,
    index: WeightedIndex<u32>,
}

impl WeightedRange {
    /// Weights are listed from `low` upward and must not increase.
    pub fn new(name: &'static str, low: u32, weights: &[u32]) -> Result<Self, InputError> {
        if weights.is_empty() {
            return Err(InputError::InvalidWeights {
                name,
                reason: "no weights given".to_string(),
            });
        }
        if weights.windows(2).any(|pair| pair[1] > pair[0]) {
            return Err(InputError::InvalidWeights {
                name,
                reason: "weights must not increase with value".to_string(),
            });
        }
        let span = u32::try_from(weights.len() - 1).map_err(|_| InputError::InvalidWeights {
            name,
            reason: "too many weights".to_string(),
        })?;
        let high = low.checked_add(span).ok_or_else(|| InputError::InvalidWeights {
            name,
            reason: "range overflows u32".to_string(),
        })?;
        let index = WeightedIndex::new(weights).map_err(|e| InputError::InvalidWeights {
            name,
            reason: e.to_string(),
        })?;
        Ok(Self { low, high, index })
    }

    /// `low..=high` weighted `n, n-1, ..., 1`.
    pub fn descending(name: &'static str, low: u32, high: u32) -> Result<Self, InputError> {
        if high < low {
            return Err(InputError::InvalidWeights {
                name,
                reason: format!("empty range {low}..={high}"),
            });
        }
        let weights: Vec<u32> = (1..=high - low + 1).rev().collect();
        Self::new(name, low, &weights)
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.low, self.high)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        // The index is bounded by the number of weights, which fits in u32.
        self.low + self.index.sample(rng) as u32
    }
}

/// The three encrypted inputs of a `plant` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantInputs {
    pub weather: u32,
    pub fertility: u32,
    pub water_level: u32,
}

impl PlantInputs {
    /// Positional order of the contract call.
    pub fn as_array(&self) -> [u32; 3] {
        [self.weather, self.fertility, self.water_level]
    }
}

/// Seedable source of plant inputs and grow time factors.
#[derive(Debug, Clone)]
pub struct InputGenerator {
    rng: StdRng,
    plant: WeightedRange,
    time: Uniform<u32>,
}

impl InputGenerator {
    /// A generator seeded with `seed`, or from OS entropy when `None`.
    pub fn new(seed: Option<u64>) -> Result<Self, InputError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            plant: WeightedRange::descending("plant input", PLANT_INPUT_MIN, PLANT_INPUT_MAX)?,
            time: Uniform::new_inclusive(TIME_FACTOR_MIN, TIME_FACTOR_MAX),
        })
    }

    pub fn seeded(seed: u64) -> Result<Self, InputError> {
        Self::new(Some(seed))
    }

    pub fn plant_inputs(&mut self) -> PlantInputs {
        PlantInputs {
            weather: self.plant.sample(&mut self.rng),
            fertility: self.plant.sample(&mut self.rng),
            water_level: self.plant.sample(&mut self.rng),
        }
    }

    pub fn time_factor(&mut self) -> u32 {
        self.time.sample(&mut self.rng)
    }
}
