//! Dataset configuration
//!
//! Every recognized option of a dataset lives here so a configuration can be
//! written to and read from JSON. Source/target transforms are closures and
//! are attached on [`crate::DatasetBuilder`] instead.

use crate::shape::SourceShape;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Upper bound of each rank's identifier range.
///
/// `Inclusive` selects `id <= range_end`, so the boundary identifier shared by
/// two adjacent ranks is read by both of them. `Exclusive` selects
/// `id < range_end` and gives disjoint ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpperBound {
    #[default]
    Inclusive,
    Exclusive,
}

/// Configuration of a [`crate::DeltaIterableDataset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Table location: local directory (absolute or relative) or object store URI
    pub path: String,

    /// Integer-like column used for row-range partitioning
    pub id_field: String,

    /// Column yielded as the sample input
    pub src_field: String,

    /// Column yielded as the sample target
    pub target_field: String,

    /// When set, yield groups of raw records instead of (source, target) pairs
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Reinterpret the raw source bytes as a `u8` array of this shape
    #[serde(default, alias = "apply_src_numpy_shape")]
    pub src_shape: Option<SourceShape>,

    #[serde(default)]
    pub use_fixed_rank: bool,

    #[serde(default)]
    pub fixed_rank: Option<usize>,

    #[serde(default)]
    pub num_ranks: Option<usize>,

    #[serde(default)]
    pub upper_bound: UpperBound,

    /// Delta table version to read (latest when unset)
    #[serde(default)]
    pub version: Option<i64>,

    /// Options forwarded to the object store (credentials, endpoint, ...)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl DatasetConfig {
    pub fn new(
        path: impl Into<String>,
        id_field: impl Into<String>,
        src_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            id_field: id_field.into(),
            src_field: src_field.into(),
            target_field: target_field.into(),
            batch_size: None,
            src_shape: None,
            use_fixed_rank: false,
            fixed_rank: None,
            num_ranks: None,
            upper_bound: UpperBound::default(),
            version: None,
            storage_options: HashMap::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_src_shape(mut self, shape: impl Into<SourceShape>) -> Self {
        self.src_shape = Some(shape.into());
        self
    }

    /// Pin this dataset to `rank` out of `num_ranks`, overriding any worker context
    pub fn with_fixed_rank(mut self, rank: usize, num_ranks: usize) -> Self {
        self.use_fixed_rank = true;
        self.fixed_rank = Some(rank);
        self.num_ranks = Some(num_ranks);
        self
    }

    pub fn with_upper_bound(mut self, upper_bound: UpperBound) -> Self {
        self.upper_bound = upper_bound;
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_storage_options(mut self, options: HashMap<String, String>) -> Self {
        self.storage_options = options;
        self
    }

    /// Parse a configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check option combinations that can be rejected before any I/O
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("id_field", &self.id_field),
            ("src_field", &self.src_field),
            ("target_field", &self.target_field),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidConfig(format!("{} must not be empty", name)));
            }
        }

        if self.batch_size == Some(0) {
            return Err(Error::InvalidConfig(
                "batch_size must be a positive integer".to_string(),
            ));
        }

        if self.use_fixed_rank {
            let (rank, num_ranks) = match (self.fixed_rank, self.num_ranks) {
                (Some(rank), Some(num_ranks)) => (rank, num_ranks),
                _ => {
                    return Err(Error::InvalidConfig(
                        "use_fixed_rank requires both fixed_rank and num_ranks".to_string(),
                    ))
                }
            };
            if num_ranks == 0 {
                return Err(Error::InvalidConfig(
                    "num_ranks must be a positive integer".to_string(),
                ));
            }
            if rank >= num_ranks {
                return Err(Error::InvalidConfig(format!(
                    "fixed_rank {} is out of range for {} ranks",
                    rank, num_ranks
                )));
            }
        }

        if let Some(shape) = &self.src_shape {
            shape.validate()?;
        }

        Ok(())
    }
}

/// Storage options for an S3-compatible endpoint (MinIO, LocalStack, AWS)
pub fn s3_storage_options(
    endpoint: &str,
    access_key: &str,
    secret_key: &str,
) -> HashMap<String, String> {
    let mut storage_options = HashMap::new();
    storage_options.insert("AWS_ENDPOINT_URL".to_string(), endpoint.to_string());
    storage_options.insert("AWS_ACCESS_KEY_ID".to_string(), access_key.to_string());
    storage_options.insert("AWS_SECRET_ACCESS_KEY".to_string(), secret_key.to_string());
    storage_options.insert("AWS_REGION".to_string(), "us-east-1".to_string());
    storage_options.insert("AWS_ALLOW_HTTP".to_string(), "true".to_string());
    storage_options
}
