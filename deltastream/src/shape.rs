//! Reshaping raw source bytes into fixed-shape `u8` arrays
//!
//! A shape follows numpy conventions: each dimension is a non-negative size,
//! and at most one dimension may be `-1`, in which case it is inferred from
//! the byte length.

use crate::{Error, Result};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

/// Target shape for the source column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceShape(Vec<i64>);

impl SourceShape {
    pub fn dims(&self) -> &[i64] {
        &self.0
    }

    /// Reject shapes numpy would reject regardless of input length
    pub fn validate(&self) -> Result<()> {
        let mut inferred = 0;
        for &dim in &self.0 {
            if dim == -1 {
                inferred += 1;
            } else if dim < 0 {
                return Err(Error::InvalidConfig(format!(
                    "invalid dimension {} in source shape {:?}",
                    dim, self.0
                )));
            }
        }
        if inferred > 1 {
            return Err(Error::InvalidConfig(format!(
                "source shape {:?} can only infer one dimension",
                self.0
            )));
        }
        Ok(())
    }

    /// Concrete dimensions for a buffer of `len` bytes
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>> {
        self.validate()?;
        let mismatch = || Error::ShapeMismatch {
            shape: self.0.clone(),
            len,
        };

        let known: usize = self
            .0
            .iter()
            .filter(|&&dim| dim >= 0)
            .map(|&dim| dim as usize)
            .product();
        let infer = self.0.contains(&-1);

        let missing = if infer {
            if known == 0 || len % known != 0 {
                return Err(mismatch());
            }
            len / known
        } else {
            if known != len {
                return Err(mismatch());
            }
            0
        };

        Ok(self
            .0
            .iter()
            .map(|&dim| if dim == -1 { missing } else { dim as usize })
            .collect())
    }

    /// Reinterpret `bytes` as an array of this shape, in row-major order
    pub fn reshape(&self, bytes: Vec<u8>) -> Result<ArrayD<u8>> {
        let dims = self.resolve(bytes.len())?;
        let len = bytes.len();
        ArrayD::from_shape_vec(IxDyn(&dims), bytes).map_err(|_| Error::ShapeMismatch {
            shape: self.0.clone(),
            len,
        })
    }
}

impl From<Vec<i64>> for SourceShape {
    fn from(dims: Vec<i64>) -> Self {
        Self(dims)
    }
}

impl From<&[i64]> for SourceShape {
    fn from(dims: &[i64]) -> Self {
        Self(dims.to_vec())
    }
}
