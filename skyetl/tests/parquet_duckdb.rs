#![cfg(feature = "test-utils")]

use skyetl::destination::Destination;
use skyetl::destination::parquet_duckdb::ParquetDuckDbDestination;
use skyetl::ingest::{BatchFlusher, FlushTrigger};
use skyetl::state::SharedIngestState;
use skyetl::test_utils::builders::row;
use skyetl_telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn persist_writes_one_new_file_per_batch() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let destination = ParquetDuckDbDestination::new(dir.path().join("data"), None, 2).unwrap();

    let first = destination
        .persist(vec![row("at://1", "databs"), row("at://2", "databs")])
        .await
        .unwrap()
        .unwrap();
    let second = destination
        .persist(vec![row("at://3", "datasky")])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.rows, 2);
    assert_eq!(second.rows, 1);
    assert_ne!(first.path, second.path);
    assert!(first.path.exists());
    assert!(second.path.exists());
    assert_eq!(destination.writer().batch_files().unwrap().len(), 2);

    assert!(destination.persist(vec![]).await.unwrap().is_none());
    assert_eq!(destination.writer().batch_files().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_is_cumulative_and_idempotent() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("posts.duckdb");
    let destination = ParquetDuckDbDestination::new(
        dir.path().join("data"),
        Some(database.to_str().unwrap()),
        2,
    )
    .unwrap();

    assert_eq!(destination.reload().await.unwrap(), 0);

    destination
        .persist(vec![row("at://1", "databs"), row("at://2", "databs")])
        .await
        .unwrap();
    assert_eq!(destination.reload().await.unwrap(), 2);
    assert_eq!(destination.reload().await.unwrap(), 2);

    destination
        .persist(vec![row("at://3", "databs")])
        .await
        .unwrap();
    assert_eq!(destination.reload().await.unwrap(), 3);
    assert_eq!(destination.warehouse().count().await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_empties_the_table_when_batch_files_are_gone() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("data");
    let database = dir.path().join("posts.duckdb");
    let database = database.to_str().unwrap();

    let previous = ParquetDuckDbDestination::new(&output_dir, Some(database), 1).unwrap();
    previous
        .persist(vec![row("at://1", "databs"), row("at://2", "databs")])
        .await
        .unwrap();
    assert_eq!(previous.reload().await.unwrap(), 2);
    drop(previous);

    std::fs::remove_dir_all(&output_dir).unwrap();

    let destination = ParquetDuckDbDestination::new(&output_dir, Some(database), 1).unwrap();
    assert_eq!(destination.reload().await.unwrap(), 0);
    assert_eq!(destination.warehouse().count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn files_left_by_a_previous_run_are_reloaded() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("data");

    let previous = ParquetDuckDbDestination::new(&output_dir, None, 1).unwrap();
    previous
        .persist(vec![row("at://1", "databs")])
        .await
        .unwrap();
    drop(previous);

    let destination = ParquetDuckDbDestination::new(&output_dir, None, 1).unwrap();
    assert_eq!(destination.reload().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn timer_flush_writes_buffered_rows_and_reloads_history() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let destination = ParquetDuckDbDestination::new(dir.path().join("data"), None, 2).unwrap();
    destination
        .persist(vec![row("at://old", "databs")])
        .await
        .unwrap();

    let state = SharedIngestState::new(700);
    for n in 0..3 {
        state.lock().unwrap().append(row(&format!("at://{n}"), "databs"));
    }
    let flusher = BatchFlusher::new(destination.clone(), state.clone());

    let report = flusher.flush(FlushTrigger::Timer).await;

    assert_eq!(report.file.map(|file| file.rows), Some(3));
    assert_eq!(report.dropped_rows, 0);
    assert_eq!(report.warehouse_rows, Some(4));
    assert_eq!(state.buffered().unwrap(), 0);
}
