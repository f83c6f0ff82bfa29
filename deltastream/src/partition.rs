//! Static row-range partitioning across ranks
//!
//! The identifier domain `[start, end]` is cut into `num_ranks` contiguous
//! chunks of `ceil((end - start) / num_ranks)` identifiers; rank `r` reads the
//! `r`-th chunk. With [`UpperBound::Inclusive`] the last identifier of one
//! chunk is also the first identifier of the next one.

use crate::config::{DatasetConfig, UpperBound};
use crate::worker::WorkerContext;
use crate::{Error, Result};
use deltalake::datafusion::common::Column;
use deltalake::datafusion::prelude::{lit, Expr};
use tracing::debug;

/// Which rank is reading, out of how many
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub rank: usize,
    pub num_ranks: usize,
}

impl Partition {
    pub fn new(rank: usize, num_ranks: usize) -> Result<Self> {
        if num_ranks == 0 {
            return Err(Error::InvalidConfig(
                "number of ranks must be a positive integer".to_string(),
            ));
        }
        if rank >= num_ranks {
            return Err(Error::InvalidConfig(format!(
                "rank {} is out of range for {} ranks",
                rank, num_ranks
            )));
        }
        if i64::try_from(num_ranks).is_err() {
            return Err(Error::InvalidConfig(format!(
                "{} ranks exceed the identifier domain",
                num_ranks
            )));
        }
        Ok(Self { rank, num_ranks })
    }
}

/// Where the partition of a dataset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSource {
    Fixed,
    Worker,
}

/// Resolve the partition for the current caller.
///
/// Fixed configuration wins over the worker context; with neither, the
/// caller reads the whole table.
pub fn resolve_partition(
    config: &DatasetConfig,
    workers: &dyn WorkerContext,
) -> Result<Option<(Partition, PartitionSource)>> {
    if config.use_fixed_rank {
        let (rank, num_ranks) = config.fixed_rank.zip(config.num_ranks).ok_or_else(|| {
            Error::InvalidConfig("use_fixed_rank requires both fixed_rank and num_ranks".to_string())
        })?;
        return Ok(Some((Partition::new(rank, num_ranks)?, PartitionSource::Fixed)));
    }

    match workers.current() {
        Some(info) => {
            debug!("Worker {} of {} resolved from context", info.id, info.num_workers);
            Ok(Some((
                Partition::new(info.id, info.num_workers)?,
                PartitionSource::Worker,
            )))
        }
        None => Ok(None),
    }
}

/// Identifier range read by one rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: i64,
    pub end: i64,
    pub upper_bound: UpperBound,
}

impl RowRange {
    /// Chunk of `[start, end]` assigned to `partition`
    pub fn for_partition(
        start: i64,
        end: i64,
        partition: Partition,
        upper_bound: UpperBound,
    ) -> Self {
        let size = chunk_size(start, end, partition.num_ranks);
        let rank = i64::try_from(partition.rank).unwrap_or(i64::MAX);
        let range_start = start.saturating_add(rank.saturating_mul(size));
        let range_end = range_start.saturating_add(size).min(end);
        Self {
            start: range_start,
            end: range_end,
            upper_bound,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        match self.upper_bound {
            UpperBound::Inclusive => id >= self.start && id <= self.end,
            UpperBound::Exclusive => id >= self.start && id < self.end,
        }
    }

    /// Filter expression selecting this range of `id_field`
    pub fn predicate(&self, id_field: &str) -> Expr {
        let id = Expr::Column(Column::new_unqualified(id_field));
        let lower = id.clone().gt_eq(lit(self.start));
        let upper = match self.upper_bound {
            UpperBound::Inclusive => id.lt_eq(lit(self.end)),
            UpperBound::Exclusive => id.lt(lit(self.end)),
        };
        lower.and(upper)
    }
}

/// `ceil((end - start) / num_ranks)`, zero for an empty domain
pub fn chunk_size(start: i64, end: i64, num_ranks: usize) -> i64 {
    let span = (end - start).max(0);
    let ranks = i64::try_from(num_ranks.max(1)).unwrap_or(i64::MAX);
    span / ranks + i64::from(span % ranks != 0)
}
