//! deltastream CLI - inspect Delta tables the way a training loop reads them
//!
//! Usage:
//!   deltastream count <TABLE> [--id-field id] [--version N]
//!   deltastream partitions <TABLE> --num-ranks 4 [--exclusive-upper]
//!   deltastream scan <TABLE> --src-field image --target-field label [--shape 28,28] [--limit 10]
//!   deltastream scan --config dataset.json [--limit 10]

use clap::{Args, Parser, Subcommand};
use deltastream::partition::{Partition, RowRange};
use deltastream::{
    s3_storage_options, DatasetConfig, DatasetItem, DeltaIterableDataset, EnvWorkers, Error,
    Result, SourceShape, UpperBound, Value,
};
use futures::TryStreamExt;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// deltastream - Delta Lake tables as partitioned training streams
#[derive(Parser, Debug)]
#[command(name = "deltastream")]
#[command(version = "0.1.0")]
#[command(about = "Inspect Delta tables as worker-partitioned sample streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TableArgs {
    /// Table location (local directory or s3:// URI)
    #[arg(value_name = "TABLE")]
    table: Option<String>,

    /// Identifier column used for partitioning and counting
    #[arg(long, default_value = "id")]
    id_field: String,

    /// Table version to read (latest when omitted)
    #[arg(long)]
    version: Option<i64>,

    /// S3-compatible endpoint (e.g. http://localhost:9000)
    #[arg(long, requires_all = ["access_key", "secret_key"])]
    endpoint: Option<String>,

    #[arg(long)]
    access_key: Option<String>,

    #[arg(long)]
    secret_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count rows with a full scan of the identifier column
    Count {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Print the identifier range each rank would read
    Partitions {
        #[command(flatten)]
        table: TableArgs,

        /// Number of ranks to split the table across
        #[arg(long)]
        num_ranks: usize,

        /// Use `id < range_end` instead of `id <= range_end`
        #[arg(long)]
        exclusive_upper: bool,
    },

    /// Print the first items of a dataset
    Scan {
        #[command(flatten)]
        table: TableArgs,

        /// Dataset configuration file (JSON); replaces the options below.
        /// TABLE, --version and the S3 flags still override the file.
        #[arg(
            long,
            conflicts_with_all = [
                "src_field",
                "target_field",
                "batch_size",
                "shape",
                "rank",
                "num_ranks",
                "exclusive_upper",
            ]
        )]
        config: Option<PathBuf>,

        #[arg(long, default_value = "src")]
        src_field: String,

        #[arg(long, default_value = "target")]
        target_field: String,

        /// Yield groups of raw records instead of (source, target) pairs
        #[arg(long)]
        batch_size: Option<usize>,

        /// Reshape source bytes, e.g. "28,28" or "-1,3"
        #[arg(long, allow_hyphen_values = true)]
        shape: Option<String>,

        /// Fixed rank; requires --num-ranks
        #[arg(long, requires = "num_ranks")]
        rank: Option<usize>,

        /// Number of fixed ranks; requires --rank
        #[arg(long, requires = "rank")]
        num_ranks: Option<usize>,

        #[arg(long)]
        exclusive_upper: bool,

        /// Stop after this many items
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Count { table } => {
            let config = table_config(&table)?;
            let dataset = DeltaIterableDataset::open(config).await?;
            println!("{}", dataset.len());
            Ok(())
        }

        Commands::Partitions {
            table,
            num_ranks,
            exclusive_upper,
        } => {
            let config = table_config(&table)?;
            let dataset = DeltaIterableDataset::open(config).await?;
            let upper_bound = upper_bound(exclusive_upper);
            println!("{} rows across {} ranks", dataset.len(), num_ranks);
            for rank in 0..num_ranks {
                let range = RowRange::for_partition(
                    0,
                    dataset.len() as i64,
                    Partition::new(rank, num_ranks)?,
                    upper_bound,
                );
                let close = match upper_bound {
                    UpperBound::Inclusive => ']',
                    UpperBound::Exclusive => ')',
                };
                println!(
                    "  rank {}: {} in [{}, {}{}",
                    rank, table.id_field, range.start, range.end, close
                );
            }
            Ok(())
        }

        Commands::Scan {
            table,
            config,
            src_field,
            target_field,
            batch_size,
            shape,
            rank,
            num_ranks,
            exclusive_upper,
            limit,
        } => {
            let config = match config {
                Some(path) => apply_table_args(&table, DatasetConfig::from_json_file(path)?),
                None => {
                    let mut config = table_config(&table)?;
                    config.src_field = src_field;
                    config.target_field = target_field;
                    config.batch_size = batch_size;
                    config.src_shape = shape.as_deref().map(parse_shape).transpose()?;
                    config.upper_bound = upper_bound(exclusive_upper);
                    if let (Some(rank), Some(num_ranks)) = (rank, num_ranks) {
                        config = config.with_fixed_rank(rank, num_ranks);
                    }
                    config
                }
            };

            let dataset = DeltaIterableDataset::builder(config)
                .worker_context(EnvWorkers::default())
                .open()
                .await?;
            eprintln!("Dataset has {} rows", dataset.len());

            let mut items = dataset.stream().await?;
            let mut shown = 0;
            while shown < limit {
                let Some(item) = items.try_next().await? else {
                    break;
                };
                match item {
                    DatasetItem::Pair(source, target) => {
                        println!("{}\t{}", describe(&source), describe(&target))
                    }
                    DatasetItem::Batch(records) => {
                        println!("batch of {} records", records.len());
                        for record in &records {
                            let fields: Vec<String> = record
                                .iter()
                                .map(|(name, value)| format!("{}={}", name, describe(value)))
                                .collect();
                            println!("  {}", fields.join(" "));
                        }
                    }
                }
                shown += 1;
            }

            if let Some(range) = dataset.scanner().await?.range() {
                eprintln!("Read ids in [{}, {}]", range.start, range.end);
            }
            Ok(())
        }
    }
}

fn table_config(args: &TableArgs) -> Result<DatasetConfig> {
    let table = args
        .table
        .clone()
        .ok_or_else(|| Error::InvalidConfig("a table location is required".to_string()))?;

    let config = DatasetConfig::new(table, &args.id_field, &args.id_field, &args.id_field);
    Ok(apply_table_args(args, config))
}

/// Overlay the table location, version and S3 credentials given on the command line
fn apply_table_args(args: &TableArgs, mut config: DatasetConfig) -> DatasetConfig {
    if let Some(table) = &args.table {
        config.path = table.clone();
    }
    if args.version.is_some() {
        config.version = args.version;
    }
    if let (Some(endpoint), Some(access_key), Some(secret_key)) =
        (&args.endpoint, &args.access_key, &args.secret_key)
    {
        config = config.with_storage_options(s3_storage_options(endpoint, access_key, secret_key));
    }
    config
}

fn upper_bound(exclusive: bool) -> UpperBound {
    if exclusive {
        UpperBound::Exclusive
    } else {
        UpperBound::Inclusive
    }
}

/// Parse a shape in format "d1,d2,..." where one dimension may be -1
fn parse_shape(shape_str: &str) -> Result<SourceShape> {
    let dims = shape_str
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| {
                Error::InvalidConfig(format!(
                    "Invalid dimension '{}' in shape '{}'",
                    part, shape_str
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let shape = SourceShape::from(dims);
    shape.validate()?;
    Ok(shape)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Utf8(v) => format!("{:?}", v),
        Value::Binary(v) => format!("binary[{}]", v.len()),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(describe).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Struct(record) => {
            let fields: Vec<String> = record
                .iter()
                .map(|(name, value)| format!("{}: {}", name, describe(value)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        Value::Tensor(v) => format!("tensor{:?}", v.shape()),
    }
}
