//! Opening Delta tables and counting their rows

use crate::config::DatasetConfig;
use crate::{Error, Result};
use deltalake::datafusion::prelude::{SessionConfig, SessionContext};
use deltalake::{DeltaTable, DeltaTableBuilder};
use futures::TryStreamExt;
use std::path::Path;
use std::sync::{Arc, Once};
use tracing::{debug, info};
use url::Url;

/// Resolve a table location to a URL.
///
/// Anything with a scheme is parsed as a URI; everything else is a local
/// directory, made absolute against the current directory.
pub fn table_url(location: &str) -> Result<Url> {
    if location.contains("://") {
        return Url::parse(location)
            .map_err(|e| Error::Other(format!("Invalid table URI {}: {}", location, e)));
    }

    let path = Path::new(location);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_directory_path(&absolute)
        .map_err(|_| Error::Other(format!("Invalid path for Delta table: {}", absolute.display())))
}

fn register_object_stores(url: &Url) {
    static AWS: Once = Once::new();
    if matches!(url.scheme(), "s3" | "s3a") {
        AWS.call_once(|| deltalake::aws::register_handlers(None));
    }
}

/// Open the table described by `config`, at `config.version` when set
pub async fn open_table(config: &DatasetConfig) -> Result<DeltaTable> {
    let url = table_url(&config.path)?;
    register_object_stores(&url);
    info!("Opening Delta table at: {}", url);

    let mut builder = DeltaTableBuilder::from_valid_uri(url)?;
    if !config.storage_options.is_empty() {
        builder = builder.with_storage_options(config.storage_options.clone());
    }
    if let Some(version) = config.version {
        builder = builder.with_version(version);
    }

    let table = builder.load().await?;
    info!("Opened Delta table at version {:?}", table.version());
    Ok(table)
}

/// Session that scans with a single partition.
///
/// Each file is read in row order and files are read one after another in the
/// order the snapshot lists them. For a table built by appends that listing is
/// newest file first, so identifiers are only ascending within a file.
pub fn session() -> SessionContext {
    SessionContext::new_with_config(SessionConfig::new().with_target_partitions(1))
}

/// Rows visible in `table`, summed batch by batch over a full scan of `id_field`
pub async fn count_rows(table: &DeltaTable, id_field: &str) -> Result<u64> {
    let frame = session()
        .read_table(Arc::new(table.clone()))?
        .select_columns(&[id_field])?;

    let mut batches = frame.execute_stream().await?;
    let mut count = 0u64;
    while let Some(batch) = batches.try_next().await? {
        debug!("Counted batch of {} rows", batch.num_rows());
        count += batch.num_rows() as u64;
    }

    info!("Delta table has {} rows", count);
    Ok(count)
}
