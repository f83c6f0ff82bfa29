//! Dataset Integration Tests
//! Reading fixture Delta tables as (source, target) pairs and record batches

use deltastream::{
    DatasetConfig, DatasetItem, DeltaIterableDataset, Error, TaskLocalWorkers, Value, WorkerInfo,
};
use deltastream_tests::{
    append, collect_ids, collect_pairs, create_table, embedding_table, sample_batch, sample_id,
    table_with_rows,
};
use futures::{StreamExt, TryStreamExt};
use tempfile::TempDir;

fn config(path: &str) -> DatasetConfig {
    DatasetConfig::new(path, "id", "src", "target")
}

/// Ten rows, no partitioning, no batching, no transforms:
/// exactly ten (4-byte buffer, int) pairs in ascending id order
#[tokio::test]
async fn test_ten_rows_yield_ten_pairs_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("ten"), 10, 4).await;

    let dataset = DeltaIterableDataset::open(config(&path)).await.unwrap();
    assert_eq!(dataset.len(), 10);

    let pairs = collect_pairs(&dataset).await.unwrap();
    assert_eq!(pairs.len(), 10, "Should yield one pair per row");

    for (expected_id, (source, target)) in pairs.iter().enumerate() {
        let expected_id = expected_id as i64;
        assert_eq!(source, &Value::Binary(vec![expected_id as u8; 4]));
        assert_eq!(target, &Value::Int(expected_id * 10));
    }
}

#[tokio::test]
async fn test_len_ignores_partitioning() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("len"), 25, 1).await;

    let fixed = DeltaIterableDataset::open(config(&path).with_fixed_rank(1, 4))
        .await
        .unwrap();
    assert_eq!(fixed.len(), 25);
    assert_eq!(fixed.count().await.unwrap(), 25);

    // Partitioned reads do not change the reported length
    let ids = collect_ids(&fixed).await;
    assert!(ids.len() < 25);
    assert_eq!(fixed.len(), 25);

    let in_worker = TaskLocalWorkers::scope(WorkerInfo::new(0, 2), async {
        DeltaIterableDataset::open(config(&path)).await.unwrap().len()
    })
    .await;
    assert_eq!(in_worker, 25);
}

#[tokio::test]
async fn test_empty_table() {
    let temp_dir = TempDir::new().unwrap();
    let table_path = temp_dir.path().join("empty");
    create_table(&table_path).await;

    let dataset = DeltaIterableDataset::open(config(table_path.to_str().unwrap()))
        .await
        .unwrap();
    assert!(dataset.is_empty());
    assert!(collect_pairs(&dataset).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_batched_mode_yields_groups_of_raw_records() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("batched"), 10, 2).await;

    let dataset = DeltaIterableDataset::open(config(&path).with_batch_size(4))
        .await
        .unwrap();

    let groups: Vec<_> = dataset
        .stream()
        .await
        .unwrap()
        .map_ok(|item| item.into_batch().expect("batched mode yields batches"))
        .try_collect()
        .await
        .unwrap();

    let sizes: Vec<_> = groups.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 4, 2]);

    // Records carry the projected columns only, in scan order
    let first = &groups[0][0];
    assert_eq!(first.field_names().collect::<Vec<_>>(), vec!["src", "target"]);
    let ids: Vec<_> = groups
        .iter()
        .flatten()
        .map(|record| sample_id(record.get("target").unwrap()))
        .collect();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());

    // Raw records are not reshaped
    assert_eq!(first.get("src"), Some(&Value::Binary(vec![0, 0])));
}

#[tokio::test]
async fn test_batch_larger_than_table() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("big_batch"), 3, 1).await;

    let dataset = DeltaIterableDataset::open(config(&path).with_batch_size(64))
        .await
        .unwrap();
    let items: Vec<DatasetItem> = dataset.stream().await.unwrap().try_collect().await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].clone().into_batch().unwrap().len(), 3);
}

fn embedding(id: i64) -> Value {
    Value::List(vec![Value::Float(id as f64), Value::Float(id as f64 + 0.5)])
}

#[tokio::test]
async fn test_list_target_unbatched() {
    let temp_dir = TempDir::new().unwrap();
    let path = embedding_table(&temp_dir.path().join("embeddings"), 4).await;

    let dataset = DeltaIterableDataset::builder(config(&path))
        .target_transform(|target| match target.as_list() {
            Some(values) => Ok(Value::Int(values.len() as i64)),
            None => Err(Error::Transform(format!("expected list, got {:?}", target))),
        })
        .open()
        .await
        .unwrap();
    let pairs = collect_pairs(&dataset).await.unwrap();
    assert_eq!(pairs.len(), 4);
    assert!(pairs.iter().all(|(_, target)| target == &Value::Int(2)));

    let raw = DeltaIterableDataset::open(config(&path)).await.unwrap();
    let targets: Vec<_> = collect_pairs(&raw)
        .await
        .unwrap()
        .into_iter()
        .map(|(_, target)| target)
        .collect();
    assert_eq!(targets, (0..4).map(embedding).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_list_target_batched() {
    let temp_dir = TempDir::new().unwrap();
    let path = embedding_table(&temp_dir.path().join("embeddings_batched"), 5).await;

    let dataset = DeltaIterableDataset::open(config(&path).with_batch_size(2))
        .await
        .unwrap();
    let groups: Vec<_> = dataset
        .stream()
        .await
        .unwrap()
        .map_ok(|item| item.into_batch().expect("batched mode yields batches"))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(groups.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    let targets: Vec<_> = groups
        .iter()
        .flatten()
        .map(|record| record.get("target").cloned().unwrap())
        .collect();
    assert_eq!(targets, (0..5).map(embedding).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_reshape_then_transforms() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("reshape"), 4, 6).await;

    let dataset = DeltaIterableDataset::builder(config(&path).with_src_shape(vec![2, 3]))
        .transform(|source| match source {
            Value::Tensor(tensor) => {
                assert_eq!(tensor.shape(), &[2, 3]);
                Ok(Value::Int(tensor.iter().map(|&b| i64::from(b)).sum()))
            }
            other => Err(Error::Transform(format!("expected tensor, got {:?}", other))),
        })
        .target_transform(|target| Ok(Value::Int(target.as_i64().unwrap_or_default() + 1)))
        .open()
        .await
        .unwrap();

    let pairs = collect_pairs(&dataset).await.unwrap();
    assert_eq!(pairs.len(), 4);
    for (id, (source, target)) in pairs.into_iter().enumerate() {
        let id = id as i64;
        assert_eq!(source, Value::Int(id * 6), "sum of six bytes equal to the id");
        assert_eq!(target, Value::Int(id * 10 + 1));
    }
}

#[tokio::test]
async fn test_reshape_without_transform_yields_tensor() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("tensor"), 2, 4).await;

    let dataset = DeltaIterableDataset::open(config(&path).with_src_shape(vec![-1, 2]))
        .await
        .unwrap();
    let pairs = collect_pairs(&dataset).await.unwrap();

    let tensor = pairs[1].0.as_tensor().expect("source should be reshaped");
    assert_eq!(tensor.shape(), &[2, 2]);
    assert_eq!(tensor, &ndarray::ArrayD::from_elem(ndarray::IxDyn(&[2, 2]), 1u8));
    assert_eq!(pairs[1].1, Value::Int(10), "target is untouched");
}

#[tokio::test]
async fn test_reshape_mismatch_propagates() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("mismatch"), 3, 4).await;

    let dataset = DeltaIterableDataset::open(config(&path).with_src_shape(vec![3, 3]))
        .await
        .unwrap();
    let mut items = dataset.stream().await.unwrap();

    let first = items.next().await.expect("stream should yield the failure");
    assert!(matches!(first, Err(Error::ShapeMismatch { len: 4, .. })));
}

#[tokio::test]
async fn test_transform_error_stops_after_good_rows() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("transform_err"), 5, 1).await;

    let dataset = DeltaIterableDataset::builder(config(&path))
        .target_transform(|target| match target.as_i64() {
            Some(30) => Err(Error::Transform("label 30 is not allowed".to_string())),
            _ => Ok(target),
        })
        .open()
        .await
        .unwrap();

    let results: Vec<_> = dataset.stream().await.unwrap().collect().await;
    assert!(results[..3].iter().all(Result::is_ok));
    assert!(matches!(results[3], Err(Error::Transform(_))));
}

#[tokio::test]
async fn test_stream_restarts_each_call() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("restart"), 6, 1).await;

    let dataset = DeltaIterableDataset::open(config(&path)).await.unwrap();
    let first = collect_ids(&dataset).await;
    let second = collect_ids(&dataset).await;

    assert_eq!(first, (0..6).collect::<Vec<_>>());
    assert_eq!(first, second);
}

/// Appended files are scanned newest first, rows within a file in write order
#[tokio::test]
async fn test_multi_file_scan_order() {
    let temp_dir = TempDir::new().unwrap();
    let table_path = temp_dir.path().join("appends");

    let mut table = create_table(&table_path).await;
    for start in (0..15).step_by(3) {
        table = append(table, sample_batch(start..start + 3, 1)).await;
    }

    let dataset = DeltaIterableDataset::open(config(table_path.to_str().unwrap()))
        .await
        .unwrap();
    let first = collect_ids(&dataset).await;
    assert_eq!(first, vec![12, 13, 14, 9, 10, 11, 6, 7, 8, 3, 4, 5, 0, 1, 2]);
    assert_eq!(collect_ids(&dataset).await, first, "order is stable across passes");
}

#[tokio::test]
async fn test_missing_table_fails_to_open() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does_not_exist");

    let result = DeltaIterableDataset::open(config(missing.to_str().unwrap())).await;
    assert!(result.is_err(), "Opening a missing table should fail");
}

#[tokio::test]
async fn test_missing_column_fails_on_first_stream() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("missing_col"), 3, 1).await;

    let dataset = DeltaIterableDataset::open(DatasetConfig::new(&path, "id", "image", "target"))
        .await
        .unwrap();

    match dataset.stream().await {
        Err(Error::ColumnNotFound(column)) => assert_eq!(column, "image"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("stream should fail for a missing column"),
    }
}

#[tokio::test]
async fn test_invalid_config_rejected_before_io() {
    let mut config = config("/definitely/not/a/table");
    config.use_fixed_rank = true;
    config.num_ranks = Some(2);

    let result = DeltaIterableDataset::open(config).await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn test_version_pins_count_and_scan() {
    let temp_dir = TempDir::new().unwrap();
    let table_path = temp_dir.path().join("versions");

    let table = create_table(&table_path).await;
    let table = append(table, sample_batch(0..4, 1)).await;
    append(table, sample_batch(4..10, 1)).await;

    let path = table_path.to_str().unwrap();
    let v1 = DeltaIterableDataset::open(config(path).with_version(1))
        .await
        .unwrap();
    assert_eq!(v1.table_version(), Some(1));
    assert_eq!(v1.len(), 4);
    assert_eq!(collect_ids(&v1).await, vec![0, 1, 2, 3]);

    let latest = DeltaIterableDataset::open(config(path)).await.unwrap();
    assert_eq!(latest.table_version(), Some(2));
    assert_eq!(latest.len(), 10);

    let mut ids = collect_ids(&latest).await;
    ids.sort_unstable();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_open_from_json_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = table_with_rows(&temp_dir.path().join("json"), 8, 4).await;

    let config_path = temp_dir.path().join("dataset.json");
    std::fs::write(
        &config_path,
        format!(
            r#"{{
                "path": {:?},
                "id_field": "id",
                "src_field": "src",
                "target_field": "target",
                "apply_src_numpy_shape": [2, 2],
                "use_fixed_rank": true,
                "fixed_rank": 1,
                "num_ranks": 2,
                "upper_bound": "exclusive"
            }}"#,
            path
        ),
    )
    .unwrap();

    let dataset = DeltaIterableDataset::open(DatasetConfig::from_json_file(&config_path).unwrap())
        .await
        .unwrap();
    let pairs = collect_pairs(&dataset).await.unwrap();

    let ids: Vec<_> = pairs.iter().map(|(_, target)| sample_id(target)).collect();
    assert_eq!(ids, vec![4, 5, 6, 7]);
    assert!(pairs.iter().all(|(source, _)| source.as_tensor().is_some()));
}
