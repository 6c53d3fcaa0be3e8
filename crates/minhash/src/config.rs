//! Configuration and error types for SimLSH MinHash signatures.
//!
//! This module defines the public configuration surface for the signature
//! layer. It is free of any I/O or environment-dependent behavior: given the
//! same configuration (including the seed) the resulting hash family, and
//! therefore every signature, is bit identical.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::family::HashKind;

/// Default number of hash functions per signature.
pub const DEFAULT_HASH_FUNCTIONS: usize = 100;

/// Default modulus for the hash family.
pub const DEFAULT_PRIME: u64 = 10_513;

/// Default seed used when a config does not ask for fresh randomness.
pub const DEFAULT_SEED: u64 = 0xF00D_BAAD_F00D_BAAD;

/// What batch signature generation does with an entity whose item set is empty.
///
/// A single [`crate::SignatureEngine::compute_signature`] call always rejects
/// an empty set; this policy only decides whether a batch aborts or skips.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmptySetPolicy {
    /// Abort the batch with [`MinHashError::EmptySignatureInput`].
    #[default]
    Reject,
    /// Leave the entity out of the resulting store and log a warning.
    Skip,
}

/// Configuration for hash family construction and signature generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinHashConfig {
    /// Configuration schema version.
    pub version: u32,
    /// Number of hash functions, which is also the signature length.
    pub n_hash_functions: usize,
    /// Modulus of the hash family. Must exceed every item id that will be
    /// hashed, otherwise distinct items collide systematically.
    pub prime: u64,
    /// Hash function shape.
    pub kind: HashKind,
    /// Seed for coefficient generation. `None` draws fresh coefficients on
    /// every construction.
    ///
    /// Signatures built from families with different seeds are not
    /// comparable.
    pub seed: Option<u64>,
    /// Compute batch signatures across entities with rayon.
    pub use_parallel: bool,
    /// Batch behavior for entities with no items.
    pub empty_set_policy: EmptySetPolicy,
}

impl MinHashConfig {
    /// Create a new configuration with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of hash functions (signature length).
    pub fn with_hash_functions(mut self, n: usize) -> Self {
        self.n_hash_functions = n;
        self
    }

    /// Set the family modulus.
    pub fn with_prime(mut self, prime: u64) -> Self {
        self.prime = prime;
        self
    }

    /// Set the hash function shape.
    pub fn with_kind(mut self, kind: HashKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the coefficient seed for reproducible families.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Draw fresh coefficients on every family construction.
    pub fn unseeded(mut self) -> Self {
        self.seed = None;
        self
    }

    /// Enable or disable parallel batch signature generation.
    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    /// Choose how batches treat empty item sets.
    pub fn with_empty_set_policy(mut self, policy: EmptySetPolicy) -> Self {
        self.empty_set_policy = policy;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), MinHashError> {
        if self.version < 1 {
            return Err(MinHashError::InvalidParameter(format!(
                "config version must be >= 1 (got {})",
                self.version
            )));
        }
        crate::family::check_family_params(self.n_hash_functions, self.prime)
    }
}

impl Default for MinHashConfig {
    fn default() -> Self {
        Self {
            version: 1,
            n_hash_functions: DEFAULT_HASH_FUNCTIONS,
            prime: DEFAULT_PRIME,
            kind: HashKind::Polynomial,
            seed: Some(DEFAULT_SEED),
            use_parallel: false,
            empty_set_policy: EmptySetPolicy::Reject,
        }
    }
}

/// Errors returned by the MinHash layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MinHashError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("signature length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("jaccard similarity is undefined for two empty inputs")]
    UndefinedSimilarity,

    #[error("entity {entity} references item {item} outside the declared universe")]
    UnknownItem { entity: u64, item: u64 },

    #[error("cannot compute a signature for an empty item set (entity {entity:?})")]
    EmptySignatureInput { entity: Option<u64> },

    #[error("item {item} is not below the family modulus {prime}")]
    ItemOutOfRange { item: u64, prime: u64 },
}
