//! Tests for the disk-backed bufferer

use super::*;
use sir_protocol::{Batch, FieldValue, Point};
use std::time::Duration;
use tempfile::TempDir;

fn batch_with_points(database: &str, n: usize) -> Batch {
    let mut batch = Batch::new(database, "", "s").unwrap();
    for i in 0..n {
        batch.add_point(
            Point::new("cpu")
                .with_field("idle", FieldValue::Float(1.0))
                .with_timestamp(1_000_000_000 + i as i64),
        );
    }
    batch
}

#[test]
fn test_init_creates_root_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("nested").join("buffer");

    let bufferer = Bufferer::new(&root, Duration::from_secs(1));
    bufferer.init().unwrap();

    assert!(root.is_dir());
    assert!(bufferer.is_empty());
}

#[test]
fn test_write_then_pop_round_trips() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    let batch = batch_with_points("a", 1);
    bufferer.write(&batch).unwrap();
    assert_eq!(bufferer.len(), 1);

    let restored = bufferer.pop().unwrap().expect("one batch buffered");
    assert_eq!(restored.database(), "a");
    assert_eq!(restored.retention_policy(), "");
    assert_eq!(restored.precision(), "s");
    assert!(restored.to_line_protocol().contains("cpu idle=1 1000000000"));

    assert_eq!(bufferer.len(), 0);
    // Only the directory itself remains; the payload file is gone.
    let leftover = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftover, 0);
}

#[test]
fn test_pop_on_empty_index_returns_none() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    assert!(bufferer.pop().unwrap().is_none());
}

#[test]
fn test_pop_is_fifo() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    for database in ["one", "two", "three"] {
        bufferer.write(&batch_with_points(database, 1)).unwrap();
    }

    let order: Vec<String> = std::iter::from_fn(|| bufferer.pop().unwrap())
        .map(|b| b.database().to_string())
        .collect();
    assert_eq!(order, ["one", "two", "three"]);
}

#[test]
fn test_flush_coalesces_by_key() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    // Three batches for db "a", three for db "b", interleaved.
    bufferer.enqueue(batch_with_points("a", 1)).unwrap();
    bufferer.enqueue(batch_with_points("b", 1)).unwrap();
    bufferer.enqueue(batch_with_points("a", 1)).unwrap();
    bufferer.enqueue(batch_with_points("b", 1)).unwrap();
    bufferer.enqueue(batch_with_points("a", 1)).unwrap();
    bufferer.enqueue(batch_with_points("b", 1)).unwrap();

    bufferer.flush().unwrap();

    let index = bufferer.index();
    assert_eq!(index.len(), 2);
    // Groups are ordered by first arrival: "a" came first.
    assert_eq!(index[0].database, "a");
    assert_eq!(index[0].num_metrics, 3);
    assert_eq!(index[1].database, "b");
    assert_eq!(index[1].num_metrics, 3);
}

#[test]
fn test_flush_does_not_coalesce_across_keys() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    let mut same_db_other_rp = Batch::new("a", "oneweek", "s").unwrap();
    same_db_other_rp.add_point(Point::new("cpu").with_field("idle", FieldValue::Float(0.0)));

    bufferer.enqueue(batch_with_points("a", 1)).unwrap();
    bufferer.enqueue(same_db_other_rp).unwrap();
    bufferer.flush().unwrap();

    assert_eq!(bufferer.len(), 2);
}

#[test]
fn test_flush_with_empty_input_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    bufferer.flush().unwrap();
    assert!(bufferer.is_empty());
}

#[test]
fn test_save_index_then_reinit_recovers_fifo_state() {
    let dir = TempDir::new().unwrap();

    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();
    for _ in 0..3 {
        bufferer.enqueue(batch_with_points("a", 1)).unwrap();
        bufferer.enqueue(batch_with_points("b", 1)).unwrap();
    }
    bufferer.flush().unwrap();
    bufferer.save_index().unwrap();
    let saved = bufferer.index();

    // Same root, fresh instance: simulates a process restart.
    let recovered = Bufferer::new(dir.path(), Duration::from_secs(1));
    recovered.init().unwrap();

    assert_eq!(recovered.index(), saved);
    assert!(
        !dir.path().join("index.json").exists(),
        "index.json must be consumed on init"
    );

    let first = recovered.pop().unwrap().expect("recovered batch");
    assert_eq!(first.database(), "a");
    assert_eq!(first.num_points(), 3);
}

#[test]
fn test_corrupt_payload_is_dropped_without_wedging() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    bufferer.write(&batch_with_points("first", 1)).unwrap();
    bufferer.write(&batch_with_points("second", 1)).unwrap();

    // Scribble over the head payload.
    let head = &bufferer.index()[0];
    std::fs::write(dir.path().join(&head.filename), b"not json").unwrap();

    match bufferer.pop() {
        Err(BackendError::Corrupt { .. }) => {}
        other => panic!("expected corruption error, got {other:?}"),
    }

    // The queue moved on; the next entry is intact.
    let next = bufferer.pop().unwrap().expect("second batch");
    assert_eq!(next.database(), "second");
    assert!(bufferer.is_empty());
}

#[test]
fn test_missing_payload_is_dropped_without_wedging() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    bufferer.write(&batch_with_points("gone", 1)).unwrap();
    let head = &bufferer.index()[0];
    std::fs::remove_file(dir.path().join(&head.filename)).unwrap();

    assert!(matches!(
        bufferer.pop(),
        Err(BackendError::Corrupt { .. })
    ));
    assert!(bufferer.is_empty());
}

#[test]
fn test_full_input_queue_fails_with_overloaded() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::with_capacity(dir.path(), Duration::from_secs(1), 2);
    bufferer.init().unwrap();

    bufferer.enqueue(batch_with_points("a", 1)).unwrap();
    bufferer.enqueue(batch_with_points("a", 1)).unwrap();
    assert!(matches!(
        bufferer.enqueue(batch_with_points("a", 1)),
        Err(BackendError::Overloaded)
    ));

    // The first two still flush fine.
    bufferer.flush().unwrap();
    assert_eq!(bufferer.len(), 1);
    assert_eq!(bufferer.index()[0].num_metrics, 2);
}

#[test]
fn test_stats_report_files_and_metrics() {
    let dir = TempDir::new().unwrap();
    let bufferer = Bufferer::new(dir.path(), Duration::from_secs(1));
    bufferer.init().unwrap();

    bufferer.write(&batch_with_points("a", 2)).unwrap();
    bufferer.write(&batch_with_points("b", 3)).unwrap();

    let point = bufferer.stats();
    assert_eq!(point.measurement(), BUFFER_MEASUREMENT);
    assert_eq!(point.fields().get("files"), Some(&FieldValue::Integer(2)));
    assert_eq!(
        point.fields().get("num_metrics"),
        Some(&FieldValue::Integer(5))
    );
}

#[tokio::test]
async fn test_run_flushes_and_saves_index_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let bufferer = std::sync::Arc::new(Bufferer::new(dir.path(), Duration::from_millis(20)));
    bufferer.init().unwrap();

    let token = CancellationToken::new();
    let task = {
        let bufferer = std::sync::Arc::clone(&bufferer);
        let token = token.clone();
        tokio::spawn(async move { bufferer.run(token).await })
    };

    bufferer.enqueue(batch_with_points("a", 1)).unwrap();
    bufferer.enqueue(batch_with_points("a", 1)).unwrap();

    // Let at least one flush tick pass.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(bufferer.len(), 1);

    // A batch still queued at shutdown is flushed before the index saves.
    bufferer.enqueue(batch_with_points("b", 1)).unwrap();
    token.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(bufferer.len(), 2);
    assert!(dir.path().join("index.json").exists());
}
