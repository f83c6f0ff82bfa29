//! Column-projected, range-filtered scan over a Delta table

use crate::config::DatasetConfig;
use crate::partition::{Partition, PartitionSource, RowRange};
use crate::table;
use crate::{Error, Result};
use deltalake::datafusion::dataframe::DataFrame;
use deltalake::datafusion::physical_plan::SendableRecordBatchStream;
use deltalake::DeltaTable;
use std::sync::Arc;
use tracing::info;

/// A scan bound to one table snapshot, one projection and one row filter.
///
/// The partition is fixed when the scanner is built; every stream started from
/// it reads the same rows.
#[derive(Clone)]
pub struct Scanner {
    frame: DataFrame,
    partition: Option<(Partition, PartitionSource)>,
    range: Option<RowRange>,
}

impl Scanner {
    /// Build the scan of `config.src_field` and `config.target_field`,
    /// restricted to the partition's identifier range when there is one.
    /// `total_rows` is the unpartitioned row count of `table`.
    pub fn build(
        table: &DeltaTable,
        config: &DatasetConfig,
        partition: Option<(Partition, PartitionSource)>,
        total_rows: u64,
    ) -> Result<Self> {
        let mut frame = table::session().read_table(Arc::new(table.clone()))?;

        for field in [&config.id_field, &config.src_field, &config.target_field] {
            if !frame.schema().has_column_with_unqualified_name(field) {
                return Err(Error::ColumnNotFound(field.clone()));
            }
        }

        let range = partition.map(|(partition, _)| {
            RowRange::for_partition(0, total_rows as i64, partition, config.upper_bound)
        });

        if let Some(range) = &range {
            frame = frame.filter(range.predicate(&config.id_field))?;
        }
        let frame =
            frame.select_columns(&[config.src_field.as_str(), config.target_field.as_str()])?;

        match (&partition, &range) {
            (Some((partition, source)), Some(range)) => info!(
                "Scanner for rank {} of {} ({:?}) reads {} in [{}, {}] ({:?} upper bound)",
                partition.rank,
                partition.num_ranks,
                source,
                config.id_field,
                range.start,
                range.end,
                range.upper_bound
            ),
            _ => info!("Scanner reads the whole table"),
        }

        Ok(Self {
            frame,
            partition,
            range,
        })
    }

    pub fn partition(&self) -> Option<Partition> {
        self.partition.map(|(partition, _)| partition)
    }

    pub fn partition_source(&self) -> Option<PartitionSource> {
        self.partition.map(|(_, source)| source)
    }

    pub fn range(&self) -> Option<RowRange> {
        self.range
    }

    /// Start a new pass over the scanned rows
    pub async fn execute(&self) -> Result<SendableRecordBatchStream> {
        Ok(self.frame.clone().execute_stream().await?)
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("partition", &self.partition)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}
