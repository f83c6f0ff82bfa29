//! Delta table exposed as a stream of training samples
//!
//! Opening a dataset counts the table's rows with a full scan of the
//! identifier column. That scan happens exactly once, inside
//! [`DatasetBuilder::open`]; [`DeltaIterableDataset::len`] reports its result.
//!
//! The scanner is built on the first call to [`DeltaIterableDataset::stream`]
//! (or [`DeltaIterableDataset::scanner`]). The partition is resolved at that
//! moment and kept for the lifetime of the dataset: later calls reuse the same
//! scanner even if the worker context would now resolve differently.
//! Clones start with no scanner and resolve their own partition.

use crate::config::DatasetConfig;
use crate::partition::resolve_partition;
use crate::scanner::Scanner;
use crate::shape::SourceShape;
use crate::table;
use crate::value::{Record, Value};
use crate::worker::{TaskLocalWorkers, WorkerContext};
use crate::{Error, Result};
use deltalake::DeltaTable;
use futures::stream::{self, BoxStream};
use futures::{future, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Unary function applied to a source or target value
pub type Transform = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// One unit of dataset output
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetItem {
    /// Up to `batch_size` raw records, when a batch size is configured
    Batch(Vec<Record>),
    /// `(source, target)` after reshape and transforms
    Pair(Value, Value),
}

impl DatasetItem {
    pub fn into_pair(self) -> Option<(Value, Value)> {
        match self {
            DatasetItem::Pair(source, target) => Some((source, target)),
            DatasetItem::Batch(_) => None,
        }
    }

    pub fn into_batch(self) -> Option<Vec<Record>> {
        match self {
            DatasetItem::Batch(records) => Some(records),
            DatasetItem::Pair(..) => None,
        }
    }
}

/// Turns a scanned record into a `(source, target)` pair
struct SampleShaper {
    src_field: String,
    target_field: String,
    src_shape: Option<SourceShape>,
    transform: Option<Transform>,
    target_transform: Option<Transform>,
}

impl SampleShaper {
    fn sample(&self, mut record: Record) -> Result<DatasetItem> {
        let mut source = record
            .take(&self.src_field)
            .ok_or_else(|| Error::ColumnNotFound(self.src_field.clone()))?;
        let mut target = record
            .take(&self.target_field)
            .ok_or_else(|| Error::ColumnNotFound(self.target_field.clone()))?;

        if let Some(shape) = &self.src_shape {
            source = match source {
                Value::Binary(bytes) => Value::Tensor(shape.reshape(bytes)?),
                other => {
                    return Err(Error::UnsupportedType(format!(
                        "cannot reshape {} value of {}",
                        other.type_name(),
                        self.src_field
                    )))
                }
            };
        }
        if let Some(transform) = &self.transform {
            source = transform(source)?;
        }
        if let Some(transform) = &self.target_transform {
            target = transform(target)?;
        }

        Ok(DatasetItem::Pair(source, target))
    }
}

/// Split `records` into consecutive groups of at most `size`
fn chunk_records(mut records: Vec<Record>, size: usize) -> Vec<Vec<Record>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(records.len().div_ceil(size));
    while !records.is_empty() {
        let rest = records.split_off(size.min(records.len()));
        chunks.push(records);
        records = rest;
    }
    chunks
}

/// Builder for datasets with transforms or a custom worker context
pub struct DatasetBuilder {
    config: DatasetConfig,
    transform: Option<Transform>,
    target_transform: Option<Transform>,
    workers: Arc<dyn WorkerContext>,
}

impl DatasetBuilder {
    pub fn new(config: DatasetConfig) -> Self {
        Self {
            config,
            transform: None,
            target_transform: None,
            workers: Arc::new(TaskLocalWorkers),
        }
    }

    /// Applied to each source value, after reshaping
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Applied to each target value
    pub fn target_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.target_transform = Some(Arc::new(transform));
        self
    }

    /// Where the worker identity comes from (task-local scope by default)
    pub fn worker_context<W: WorkerContext + 'static>(mut self, workers: W) -> Self {
        self.workers = Arc::new(workers);
        self
    }

    /// Validate the configuration, open the table and count its rows
    pub async fn open(self) -> Result<DeltaIterableDataset> {
        self.config.validate()?;

        let table = table::open_table(&self.config).await?;
        info!(
            "Counting rows of {} with a full scan of {}",
            self.config.path, self.config.id_field
        );
        let end = table::count_rows(&table, &self.config.id_field).await?;

        let samples = Arc::new(SampleShaper {
            src_field: self.config.src_field.clone(),
            target_field: self.config.target_field.clone(),
            src_shape: self.config.src_shape.clone(),
            transform: self.transform,
            target_transform: self.target_transform,
        });

        Ok(DeltaIterableDataset {
            config: self.config,
            samples,
            workers: self.workers,
            table,
            end,
            scanner: OnceCell::new(),
        })
    }
}

/// Delta table read as a finite, restartable stream of samples
pub struct DeltaIterableDataset {
    config: DatasetConfig,
    samples: Arc<SampleShaper>,
    workers: Arc<dyn WorkerContext>,
    table: DeltaTable,
    end: u64,
    scanner: OnceCell<Scanner>,
}

impl DeltaIterableDataset {
    /// Open a dataset without transforms, using the task-local worker context
    pub async fn open(config: DatasetConfig) -> Result<Self> {
        DatasetBuilder::new(config).open().await
    }

    pub fn builder(config: DatasetConfig) -> DatasetBuilder {
        DatasetBuilder::new(config)
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Version of the table snapshot this dataset reads
    pub fn table_version(&self) -> Option<i64> {
        self.table.version()
    }

    /// Row count captured when the dataset was opened, ignoring partitioning
    pub fn len(&self) -> usize {
        self.end as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Count the rows again with a fresh unfiltered scan
    pub async fn count(&self) -> Result<u64> {
        table::count_rows(&self.table, &self.config.id_field).await
    }

    /// The memoized scanner, built and partitioned on first use
    pub async fn scanner(&self) -> Result<&Scanner> {
        self.scanner
            .get_or_try_init(|| async {
                let partition = resolve_partition(&self.config, self.workers.as_ref())?;
                Scanner::build(&self.table, &self.config, partition, self.end)
            })
            .await
    }

    /// Start a new pass over this dataset's rows.
    ///
    /// Yields [`DatasetItem::Batch`] groups when a batch size is configured,
    /// otherwise one [`DatasetItem::Pair`] per row. Errors end the pass.
    pub async fn stream(&self) -> Result<BoxStream<'static, Result<DatasetItem>>> {
        let batches = self.scanner().await?.execute().await?;
        let batch_size = self.config.batch_size;
        let samples = Arc::clone(&self.samples);

        let items = batches
            .map_err(Error::from)
            .and_then(|batch| {
                debug!("Scanned batch of {} rows", batch.num_rows());
                future::ready(Record::from_batch(&batch))
            })
            .map_ok(move |records| -> BoxStream<'static, Result<DatasetItem>> {
                match batch_size {
                    Some(size) => stream::iter(
                        chunk_records(records, size)
                            .into_iter()
                            .map(|chunk| Ok(DatasetItem::Batch(chunk))),
                    )
                    .boxed(),
                    None => {
                        let samples = Arc::clone(&samples);
                        stream::iter(records.into_iter().map(move |record| samples.sample(record)))
                            .boxed()
                    }
                }
            })
            .try_flatten()
            .boxed();

        Ok(items)
    }
}

impl Clone for DeltaIterableDataset {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            samples: Arc::clone(&self.samples),
            workers: Arc::clone(&self.workers),
            table: self.table.clone(),
            end: self.end,
            scanner: OnceCell::new(),
        }
    }
}

impl std::fmt::Debug for DeltaIterableDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaIterableDataset")
            .field("config", &self.config)
            .field("len", &self.end)
            .field("scanner", &self.scanner.get())
            .finish_non_exhaustive()
    }
}
