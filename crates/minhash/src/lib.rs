//! # SimLSH MinHash
//!
//! This crate turns item sets into fixed-length MinHash signatures whose
//! position-wise agreement estimates Jaccard similarity. It is the first
//! stage of the SimLSH pipeline; the banded bucket index in the `bucket`
//! crate consumes the signatures produced here.
//!
//! ## Contract
//!
//! - A [`HashFamily`] is drawn once from an explicit, seedable generator and
//!   never changes. Signatures from different families are not comparable.
//! - [`SignatureEngine::compute_signature`] is a pure function of
//!   `(item_set, family)`; the order in which items are visited is irrelevant.
//! - No finished signature ever carries a sentinel: empty sets are rejected
//!   with [`MinHashError::EmptySignatureInput`], or skipped by batch
//!   operations when [`EmptySetPolicy::Skip`] is configured.
//!
//! ## Pipeline
//!
//! 1.  **Family**: `n` linear, polynomial or universal hash functions over
//!     integer keys, reduced by a prime larger than every item id.
//! 2.  **Signatures**: per set, the minimum value of every function over the
//!     set's items. Batches may run in parallel via Rayon with identical
//!     output. A matrix-oriented path computes the same signatures from a
//!     characteristic matrix in a single pass over its item rows.
//! 3.  **Similarity**: [`estimate_jaccard`] compares signatures,
//!     [`exact_jaccard`] compares the original sets for validation.
//!
//! ## Example Usage
//!
//! ```
//! use minhash::{estimate_jaccard, exact_jaccard, MinHashConfig, SignatureEngine};
//!
//! let cfg = MinHashConfig::default().with_hash_functions(200).with_seed(7);
//! let engine = SignatureEngine::from_config(&cfg).unwrap();
//!
//! let a = [1u64, 2, 3, 4, 5];
//! let b = [3u64, 4, 5, 6, 7];
//! let sig_a = engine.compute_signature(&a).unwrap();
//! let sig_b = engine.compute_signature(&b).unwrap();
//!
//! let estimate = estimate_jaccard(sig_a.values(), sig_b.values()).unwrap();
//! let exact = exact_jaccard(&a, &b).unwrap();
//! assert!((estimate - exact).abs() < 0.25);
//! ```
pub mod config;
pub mod family;
pub mod matrix;
mod signature;
mod similarity;

pub use crate::config::{EmptySetPolicy, MinHashConfig, MinHashError};
pub use crate::family::{next_prime, HashCoefficients, HashFamily, HashKind, UNIVERSAL_MODULUS};
pub use crate::matrix::{
    CharacteristicMatrixBuilder, DenseMembership, MembershipMatrix, SparseMembership,
};
pub use crate::signature::{EntityId, ItemId, ItemSet, Signature, SignatureEngine, SignatureStore};
pub use crate::similarity::{estimate_jaccard, exact_jaccard, SimilarityMatrix};

/// Current signature algorithm version for this crate.
pub const MINHASH_VERSION: u16 = 1;
