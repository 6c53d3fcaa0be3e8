//! YAML configuration file support for SimLSH.
//!
//! A single file describes the signature stage, the bucket stage and the
//! estimate validation run. Every section is optional and falls back to the
//! library defaults.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "movielens"
//!
//! minhash:
//!   version: 1
//!   n_hash_functions: 100
//!   prime: 10513
//!   kind: "linear"
//!   seed: 17361
//!   use_parallel: true
//!   empty_set_policy: "skip"
//!
//! bucket:
//!   num_bands: 20
//!   scheme: "folded"
//!   code_space: 1000000
//!   use_parallel: true
//!
//! validation:
//!   sample_size: 1000
//!   similarity_threshold: 0.6
//!   max_results: 10
//!   seed: 213242
//! ```

use std::fs;
use std::path::Path;

use bucket::{BucketConfig, BucketKeyScheme, DEFAULT_CODE_SPACE};
use minhash::config::{DEFAULT_HASH_FUNCTIONS, DEFAULT_PRIME, DEFAULT_SEED};
use minhash::{EmptySetPolicy, HashKind, MinHashConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::ValidationConfig;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SimLshConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub minhash: MinHashYamlConfig,

    #[serde(default)]
    pub bucket: BucketYamlConfig,

    #[serde(default)]
    pub validation: ValidationYamlConfig,
}

impl SimLshConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: SimLshConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.minhash.validate()?;
        self.bucket.validate()?;
        self.validation.validate()?;

        // Bands must tile the signature exactly.
        let n = self.minhash.n_hash_functions;
        match self.bucket.rows_per_band {
            Some(rows) if self.bucket.num_bands.checked_mul(rows) != Some(n) => {
                Err(ConfigLoadError::Validation(format!(
                    "bucket.num_bands ({}) x bucket.rows_per_band ({rows}) must equal minhash.n_hash_functions ({n})",
                    self.bucket.num_bands
                )))
            }
            None if n % self.bucket.num_bands != 0 => Err(ConfigLoadError::Validation(format!(
                "bucket.num_bands ({}) must divide minhash.n_hash_functions ({n})",
                self.bucket.num_bands
            ))),
            _ => Ok(()),
        }
    }

    pub fn minhash_config(&self) -> Result<MinHashConfig, ConfigLoadError> {
        self.minhash.to_config()
    }

    pub fn bucket_config(&self) -> Result<BucketConfig, ConfigLoadError> {
        self.bucket.to_config()
    }

    pub fn validation_config(&self) -> ValidationConfig {
        self.validation.to_config()
    }
}

impl Default for SimLshConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            minhash: MinHashYamlConfig::default(),
            bucket: BucketYamlConfig::default(),
            validation: ValidationYamlConfig::default(),
        }
    }
}

/// Signature stage YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinHashYamlConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_hash_functions")]
    pub n_hash_functions: usize,

    #[serde(default = "default_prime")]
    pub prime: u64,

    /// `linear`, `polynomial` or `universal` (or `l` / `p` / `u`).
    #[serde(default = "default_kind")]
    pub kind: String,

    /// `null` draws fresh coefficients on every run.
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,

    #[serde(default)]
    pub use_parallel: bool,

    #[serde(default)]
    pub empty_set_policy: EmptySetPolicy,
}

impl MinHashYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.version == 0 {
            return Err(ConfigLoadError::Validation(
                "minhash.version must be >= 1".to_string(),
            ));
        }
        if self.n_hash_functions == 0 {
            return Err(ConfigLoadError::Validation(
                "minhash.n_hash_functions must be >= 1".to_string(),
            ));
        }
        if self.prime < 2 {
            return Err(ConfigLoadError::Validation(
                "minhash.prime must be >= 2".to_string(),
            ));
        }
        self.kind()?;
        Ok(())
    }

    fn kind(&self) -> Result<HashKind, ConfigLoadError> {
        self.kind
            .parse()
            .map_err(|err| ConfigLoadError::Validation(format!("minhash.kind: {err}")))
    }

    pub fn to_config(&self) -> Result<MinHashConfig, ConfigLoadError> {
        let cfg = MinHashConfig {
            version: self.version,
            n_hash_functions: self.n_hash_functions,
            prime: self.prime,
            kind: self.kind()?,
            seed: self.seed,
            use_parallel: self.use_parallel,
            empty_set_policy: self.empty_set_policy,
        };
        cfg.validate()
            .map_err(|err| ConfigLoadError::Validation(format!("minhash: {err}")))?;
        Ok(cfg)
    }
}

impl Default for MinHashYamlConfig {
    fn default() -> Self {
        Self {
            version: 1,
            n_hash_functions: DEFAULT_HASH_FUNCTIONS,
            prime: DEFAULT_PRIME,
            kind: default_kind(),
            seed: default_seed(),
            use_parallel: false,
            empty_set_policy: EmptySetPolicy::Reject,
        }
    }
}

/// Bucket stage YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketYamlConfig {
    #[serde(default = "default_num_bands")]
    pub num_bands: usize,

    /// Derived from the signature length when absent.
    #[serde(default)]
    pub rows_per_band: Option<usize>,

    /// `folded` or `exact`.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Number of folded codes per band; ignored by the exact scheme.
    #[serde(default = "default_code_space")]
    pub code_space: u64,

    #[serde(default)]
    pub use_parallel: bool,
}

impl BucketYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.num_bands == 0 {
            return Err(ConfigLoadError::Validation(
                "bucket.num_bands must be >= 1".to_string(),
            ));
        }
        if self.rows_per_band == Some(0) {
            return Err(ConfigLoadError::Validation(
                "bucket.rows_per_band must be >= 1".to_string(),
            ));
        }
        if self.code_space == 0 {
            return Err(ConfigLoadError::Validation(
                "bucket.code_space must be >= 1".to_string(),
            ));
        }
        self.scheme()?;
        Ok(())
    }

    fn scheme(&self) -> Result<BucketKeyScheme, ConfigLoadError> {
        match self.scheme.trim().to_ascii_lowercase().as_str() {
            "folded" => Ok(BucketKeyScheme::Folded {
                code_space: self.code_space,
            }),
            "exact" => Ok(BucketKeyScheme::Exact),
            other => Err(ConfigLoadError::Validation(format!(
                "bucket.scheme must be 'folded' or 'exact' (got '{other}')"
            ))),
        }
    }

    pub fn to_config(&self) -> Result<BucketConfig, ConfigLoadError> {
        let cfg = BucketConfig {
            num_bands: self.num_bands,
            rows_per_band: self.rows_per_band,
            scheme: self.scheme()?,
            use_parallel: self.use_parallel,
        };
        cfg.validate()
            .map_err(|err| ConfigLoadError::Validation(format!("bucket: {err}")))?;
        Ok(cfg)
    }
}

impl Default for BucketYamlConfig {
    fn default() -> Self {
        Self {
            num_bands: default_num_bands(),
            rows_per_band: None,
            scheme: default_scheme(),
            code_space: default_code_space(),
            use_parallel: false,
        }
    }
}

/// Estimate validation YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationYamlConfig {
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_validation_seed")]
    pub seed: u64,
}

impl ValidationYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.sample_size < 2 {
            return Err(ConfigLoadError::Validation(
                "validation.sample_size must be >= 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigLoadError::Validation(
                "validation.similarity_threshold must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_config(&self) -> ValidationConfig {
        ValidationConfig {
            sample_size: self.sample_size,
            similarity_threshold: self.similarity_threshold,
            max_results: self.max_results,
            seed: self.seed,
        }
    }
}

impl Default for ValidationYamlConfig {
    fn default() -> Self {
        ValidationConfig::default().into()
    }
}

impl From<ValidationConfig> for ValidationYamlConfig {
    fn from(cfg: ValidationConfig) -> Self {
        Self {
            sample_size: cfg.sample_size,
            similarity_threshold: cfg.similarity_threshold,
            max_results: cfg.max_results,
            seed: cfg.seed,
        }
    }
}

fn default_version() -> u32 {
    1
}
fn default_hash_functions() -> usize {
    DEFAULT_HASH_FUNCTIONS
}
fn default_prime() -> u64 {
    DEFAULT_PRIME
}
fn default_kind() -> String {
    HashKind::default().as_str().to_string()
}
fn default_seed() -> Option<u64> {
    Some(DEFAULT_SEED)
}
fn default_num_bands() -> usize {
    BucketConfig::default().num_bands
}
fn default_scheme() -> String {
    "folded".to_string()
}
fn default_code_space() -> u64 {
    DEFAULT_CODE_SPACE
}
fn default_sample_size() -> usize {
    ValidationConfig::default().sample_size
}
fn default_similarity_threshold() -> f64 {
    ValidationConfig::default().similarity_threshold
}
fn default_max_results() -> usize {
    ValidationConfig::default().max_results
}
fn default_validation_seed() -> u64 {
    ValidationConfig::default().seed
}
