//! Tests for the range index
//!
//! These tests verify:
//! - Filename encode/decode round-trips key bounds for both key kinds
//! - Intersection is inclusive at both endpoints
//! - Malformed names and key-kind mismatches never intersect

use std::sync::Arc;

use floe::codec::{Compression, RowCodec, Schema};
use floe::index::{self, SEPARATOR};
use floe::{Block, FloeError, KeyValue, Row, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn block(keys: &[KeyValue]) -> Block {
    let codec = Arc::new(RowCodec::new(Schema::open("test.Row"), Compression::None));
    let rows = keys.iter().map(|key| {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::from("u1"));
        row.insert("ts".to_string(), Value::from(key.clone()));
        row
    });
    Block::from_rows("u1", "ts", codec, rows)
}

fn int_name(start: i64, end: i64) -> String {
    index::encode_parts(&KeyValue::Integer(start), &KeyValue::Integer(end), &[0u8; 20])
}

fn str_name(start: &str, end: &str) -> String {
    index::encode_parts(&KeyValue::from(start), &KeyValue::from(end), &[0u8; 20])
}

fn int(v: i64) -> KeyValue {
    KeyValue::Integer(v)
}

// =============================================================================
// Encode / Decode Tests
// =============================================================================

#[test]
fn test_decode_recovers_integer_bounds() {
    let block = block(&[int(250), int(100), int(300)]);
    let filename = index::encode(&block).unwrap();

    let name = index::decode(&filename).unwrap();

    assert_eq!(name.key_range_like(&int(0)), Some((int(100), int(300))));
}

#[test]
fn test_decode_recovers_string_bounds() {
    let keys = [KeyValue::from("2024-01-02"), KeyValue::from("2023-12-31"), KeyValue::from("2024-03-01")];
    let filename = index::encode(&block(&keys)).unwrap();

    let name = index::decode(&filename).unwrap();

    assert_eq!(
        name.key_range_like(&KeyValue::from("")),
        Some((KeyValue::from("2023-12-31"), KeyValue::from("2024-03-01")))
    );
}

#[test]
fn test_negative_integer_bounds_round_trip() {
    let filename = index::encode(&block(&[int(-500), int(-2), int(i64::MIN)])).unwrap();

    let name = index::decode(&filename).unwrap();

    assert_eq!(name.key_range_like(&int(0)), Some((int(i64::MIN), int(-2))));
}

#[test]
fn test_filename_has_three_components() {
    let filename = index::encode(&block(&[int(1)])).unwrap();

    assert_eq!(filename.split(SEPARATOR).count(), 3);
}

#[test]
fn test_known_integer_encoding() {
    // "100" and "300" in RFC 4648 base32
    let filename = int_name(100, 300);

    assert!(filename.starts_with("GEYDA===-GMYDA===-"), "got {}", filename);
}

#[test]
fn test_string_keys_containing_separator_round_trip() {
    let filename = str_name("a-b", "c-d");

    let name = index::decode(&filename).unwrap();

    assert_eq!(name.start_key, b"a-b".to_vec());
    assert_eq!(name.end_key, b"c-d".to_vec());
}

#[test]
fn test_encode_empty_block_fails() {
    let empty = block(&[]);

    assert!(matches!(index::encode(&empty), Err(FloeError::EmptyBlock(_))));
}

#[test]
fn test_decode_wrong_component_count() {
    assert!(matches!(
        index::decode("GEYDA===-GMYDA==="),
        Err(FloeError::InvalidFilename { .. })
    ));
    assert!(matches!(
        index::decode("GEYDA===-GMYDA===-AAAA-BBBB"),
        Err(FloeError::InvalidFilename { .. })
    ));
}

#[test]
fn test_decode_invalid_base32() {
    assert!(matches!(
        index::decode("not!base32-GMYDA===-GEYDA==="),
        Err(FloeError::InvalidFilename { .. })
    ));
}

// =============================================================================
// Intersection Tests
// =============================================================================

#[test]
fn test_intersects_overlapping_ranges() {
    let name = int_name(100, 300);

    assert!(index::intersects(&name, &int(150), &int(250)));
    assert!(index::intersects(&name, &int(0), &int(1000)));
    assert!(index::intersects(&name, &int(50), &int(150)));
    assert!(index::intersects(&name, &int(250), &int(350)));
}

#[test]
fn test_intersects_inclusive_endpoints() {
    let name = int_name(100, 300);

    assert!(index::intersects(&name, &int(300), &int(400)));
    assert!(index::intersects(&name, &int(0), &int(100)));
    assert!(index::intersects(&name, &int(100), &int(100)));
}

#[test]
fn test_disjoint_ranges_do_not_intersect() {
    let name = int_name(100, 300);

    assert!(!index::intersects(&name, &int(301), &int(400)));
    assert!(!index::intersects(&name, &int(0), &int(99)));
}

#[test]
fn test_integer_comparison_is_numeric() {
    // Lexicographically "9" > "10", numerically it is not
    let name = int_name(9, 10);

    assert!(index::intersects(&name, &int(10), &int(10)));
    assert!(!index::intersects(&name, &int(11), &int(20)));
}

#[test]
fn test_string_comparison_is_lexicographic() {
    let name = str_name("apple", "banana");

    assert!(index::intersects(&name, &KeyValue::from("b"), &KeyValue::from("c")));
    assert!(index::intersects(&name, &KeyValue::from("banana"), &KeyValue::from("z")));
    assert!(!index::intersects(&name, &KeyValue::from("bananas"), &KeyValue::from("z")));
}

#[test]
fn test_malformed_names_never_intersect() {
    for bad in ["", "garbage", "a-b", "!!!-GMYDA===-AAAA", "GEYDA===-GMYDA===-AA-AA"] {
        assert!(!index::intersects(bad, &int(i64::MIN), &int(i64::MAX)), "{:?}", bad);
    }
}

#[test]
fn test_string_block_does_not_match_integer_query() {
    let name = str_name("abc", "xyz");

    assert!(!index::intersects(&name, &int(i64::MIN), &int(i64::MAX)));
}

#[test]
fn test_mismatched_query_bounds_never_intersect() {
    let name = int_name(100, 300);

    assert!(!index::intersects(&name, &int(0), &KeyValue::from("999")));
}

#[test]
fn test_intersecting_filters_listing() {
    let a = int_name(0, 100);
    let b = int_name(200, 300);
    let c = int_name(150, 160);
    let listing = vec![a.as_str(), b.as_str(), c.as_str(), "junk"];

    let hits = index::intersecting(listing, &int(150), &int(180));

    assert_eq!(hits, vec![c.as_str()]);
}
