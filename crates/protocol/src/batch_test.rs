//! Tests for the batch model

use super::*;
use crate::{FieldValue, Point};

fn sample_batch(database: &str, n: usize) -> Batch {
    let mut batch = Batch::new(database, "autogen", "s").unwrap();
    for i in 0..n {
        batch.add_point(
            Point::new("cpu")
                .with_tag("host", format!("web{i:02}"))
                .with_field("idle", FieldValue::Float(i as f64))
                .with_timestamp(1_000_000_000 + i as i64),
        );
    }
    batch
}

#[test]
fn test_empty_database_rejected() {
    assert!(matches!(
        Batch::new("", "autogen", "s"),
        Err(ProtocolError::EmptyDatabase)
    ));
}

#[test]
fn test_parse_lines_preserves_order() {
    let text = "cpu idle=1 1\ncpu idle=2 2\n\ncpu idle=3 3\n";
    let batch = Batch::parse_lines("metrics", "", "ns", text).unwrap();
    assert_eq!(batch.num_points(), 3);

    let timestamps: Vec<_> = batch.points().iter().map(|p| p.timestamp()).collect();
    assert_eq!(timestamps, vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn test_parse_lines_reports_line_number() {
    let text = "cpu idle=1 1\nbroken\ncpu idle=3 3";
    let err = Batch::parse_lines("metrics", "", "ns", text).unwrap_err();
    match err {
        ProtocolError::InvalidLine { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_coalesce_key_matches_on_all_three_parts() {
    let a = Batch::new("db", "rp", "s").unwrap();
    assert!(a.can_coalesce(&Batch::new("db", "rp", "s").unwrap()));
    assert!(!a.can_coalesce(&Batch::new("other", "rp", "s").unwrap()));
    assert!(!a.can_coalesce(&Batch::new("db", "other", "s").unwrap()));
    assert!(!a.can_coalesce(&Batch::new("db", "rp", "ns").unwrap()));
}

#[test]
fn test_merge_appends_in_order() {
    let mut first = sample_batch("metrics", 2);
    let second = sample_batch("metrics", 3);

    first.merge(second);
    assert_eq!(first.num_points(), 5);

    // The first batch's points precede the second's.
    let timestamps: Vec<_> = first.points().iter().filter_map(|p| p.timestamp()).collect();
    assert_eq!(
        timestamps,
        vec![1_000_000_000, 1_000_000_001, 1_000_000_000, 1_000_000_001, 1_000_000_002]
    );
}

#[test]
fn test_line_protocol_round_trip() {
    let batch = sample_batch("metrics", 4);
    let text = batch.to_line_protocol();
    let reparsed = Batch::parse_lines("metrics", "autogen", "s", &text).unwrap();
    assert_eq!(batch, reparsed);
}

#[test]
fn test_to_line_protocol_empty_batch() {
    let batch = Batch::new("metrics", "", "s").unwrap();
    assert_eq!(batch.to_line_protocol(), "");
}
