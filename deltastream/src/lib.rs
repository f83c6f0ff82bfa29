// deltastream - Delta Lake tables as worker-partitioned training streams

// Core modules
pub mod config;
pub mod dataset;
pub mod error;
pub mod partition;
pub mod scanner;
pub mod shape;
pub mod table;
pub mod value;
pub mod worker;

// Public API
pub use config::{s3_storage_options, DatasetConfig, UpperBound};
pub use dataset::{DatasetBuilder, DatasetItem, DeltaIterableDataset, Transform};
pub use error::{Error, Result};
pub use partition::{Partition, PartitionSource, RowRange};
pub use scanner::Scanner;
pub use shape::SourceShape;
pub use value::{Record, Value};
pub use worker::{EnvWorkers, NoWorkers, TaskLocalWorkers, WorkerContext, WorkerInfo};
