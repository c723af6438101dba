//! Tests for the row codec and container format
//!
//! These tests verify:
//! - Containers decode to the rows that were encoded, for every compression
//! - The embedded schema and row count are exposed
//! - Corruption is detected (magic, version, CRC, truncation)
//! - Schema validation on encode
//! - Replaying a container into a row channel

use std::collections::BTreeMap;
use std::io::Cursor;

use crossbeam::channel;
use floe::codec::{Compression, ContainerReader, Field, FieldKind, RowCodec, Schema};
use floe::{FloeError, Row, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Schema {
    Schema::new(
        "events.Event",
        vec![
            Field::new("id", FieldKind::String),
            Field::new("ts", FieldKind::Long),
            Field::new("score", FieldKind::Double).nullable(),
            Field::new("payload", FieldKind::Bytes).nullable(),
            Field::new("meta", FieldKind::Map).nullable(),
        ],
    )
}

fn event(ts: i64) -> Row {
    let mut meta = BTreeMap::new();
    meta.insert("source".to_string(), Value::from("sensor"));
    meta.insert("ok".to_string(), Value::Boolean(ts % 2 == 0));

    let mut row = Row::new();
    row.insert("id".to_string(), Value::from("u1"));
    row.insert("ts".to_string(), Value::Long(ts));
    row.insert("score".to_string(), Value::Double(ts as f64 / 3.0));
    row.insert("payload".to_string(), Value::Bytes(vec![ts as u8; 16]));
    row.insert("meta".to_string(), Value::Map(meta));
    row
}

fn events(n: i64) -> Vec<Row> {
    (0..n).map(event).collect()
}

fn decode_all(data: &[u8]) -> Vec<Row> {
    RowCodec::decode_container(Cursor::new(data.to_vec()))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

// =============================================================================
// Encode / Decode Tests
// =============================================================================

#[test]
fn test_container_preserves_rows_for_every_compression() {
    let rows = events(200);

    for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
        let codec = RowCodec::new(schema(), compression);
        let data = codec.encode_container(&rows).unwrap();

        assert_eq!(decode_all(&data), rows, "compression {}", compression);
    }
}

#[test]
fn test_container_exposes_header() {
    let codec = RowCodec::new(schema(), Compression::Zstd);
    let data = codec.encode_container(&events(7)).unwrap();

    let reader = ContainerReader::from_bytes(data).unwrap();

    assert_eq!(reader.row_count(), 7);
    assert_eq!(reader.compression(), Compression::Zstd);
    assert_eq!(reader.schema(), &schema());
}

#[test]
fn test_empty_container() {
    let codec = RowCodec::new(schema(), Compression::Lz4);
    let data = codec.encode_container(&[]).unwrap();

    let reader = ContainerReader::from_bytes(data).unwrap();

    assert_eq!(reader.row_count(), 0);
    assert_eq!(reader.count(), 0);
}

#[test]
fn test_compression_shrinks_repetitive_rows() {
    let rows = events(500);
    let plain = RowCodec::new(schema(), Compression::None).encode_container(&rows).unwrap();
    let lz4 = RowCodec::new(schema(), Compression::Lz4).encode_container(&rows).unwrap();
    let zstd = RowCodec::new(schema(), Compression::Zstd).encode_container(&rows).unwrap();

    assert!(lz4.len() < plain.len());
    assert!(zstd.len() < plain.len());
}

#[test]
fn test_reader_is_lazy() {
    let codec = RowCodec::new(schema(), Compression::None);
    let data = codec.encode_container(&events(10)).unwrap();

    let mut reader = ContainerReader::from_bytes(data).unwrap();

    assert_eq!(reader.next().unwrap().unwrap(), event(0));
    assert_eq!(reader.next().unwrap().unwrap(), event(1));
    assert_eq!(reader.count(), 8);
}

#[test]
fn test_encode_row_is_deterministic() {
    let codec = RowCodec::new(schema(), Compression::None);

    assert_eq!(codec.encode_row(&event(3)).unwrap(), codec.encode_row(&event(3)).unwrap());
    assert_ne!(codec.encode_row(&event(3)).unwrap(), codec.encode_row(&event(4)).unwrap());
}

// =============================================================================
// Schema Tests
// =============================================================================

#[test]
fn test_missing_required_column_rejected() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut row = event(1);
    row.remove("ts");

    assert!(matches!(codec.encode_container(&[row]), Err(FloeError::Schema(_))));
}

#[test]
fn test_nullable_column_may_be_absent_or_null() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut absent = event(1);
    absent.remove("payload");
    let mut null = event(2);
    null.insert("score".to_string(), Value::Null);

    let data = codec.encode_container(&[absent.clone(), null.clone()]).unwrap();

    assert_eq!(decode_all(&data), vec![absent, null]);
}

#[test]
fn test_wrong_kind_rejected() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut row = event(1);
    row.insert("ts".to_string(), Value::from("not a number"));

    assert!(matches!(codec.encode_row(&row), Err(FloeError::Schema(_))));
}

#[test]
fn test_double_column_accepts_long() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut row = event(1);
    row.insert("score".to_string(), Value::Long(10));

    assert!(codec.encode_row(&row).is_ok());
}

#[test]
fn test_unknown_column_rejected_unless_open() {
    let mut row = event(1);
    row.insert("extra".to_string(), Value::Boolean(true));

    let strict = RowCodec::new(schema(), Compression::None);
    assert!(matches!(strict.encode_row(&row), Err(FloeError::Schema(_))));

    let open = RowCodec::new(Schema::open("any"), Compression::None);
    assert!(open.encode_row(&row).is_ok());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_flipped_body_byte_fails_crc() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut data = codec.encode_container(&events(5)).unwrap().to_vec();

    // Last byte before the 16-byte footer is body
    let idx = data.len() - 17;
    data[idx] ^= 0xFF;

    let result = RowCodec::decode_container(Cursor::new(data));
    assert!(matches!(result, Err(FloeError::Corruption(_))));
}

#[test]
fn test_bad_magic_rejected() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut data = codec.encode_container(&events(1)).unwrap().to_vec();
    data[0] = b'X';

    assert!(matches!(
        RowCodec::decode_container(Cursor::new(data)),
        Err(FloeError::Corruption(_))
    ));
}

#[test]
fn test_unknown_version_rejected() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut data = codec.encode_container(&events(1)).unwrap().to_vec();
    data[4] = 99;

    assert!(matches!(
        RowCodec::decode_container(Cursor::new(data)),
        Err(FloeError::Corruption(_))
    ));
}

#[test]
fn test_unknown_compression_code_rejected() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut data = codec.encode_container(&events(1)).unwrap().to_vec();
    data[6] = 7;

    assert!(matches!(
        RowCodec::decode_container(Cursor::new(data)),
        Err(FloeError::UnsupportedCompression(_))
    ));
}

#[test]
fn test_truncated_container_rejected() {
    let codec = RowCodec::new(schema(), Compression::Lz4);
    let data = codec.encode_container(&events(20)).unwrap();

    for len in [0, 10, data.len() / 2, data.len() - 1] {
        let result = RowCodec::decode_container(Cursor::new(data[..len].to_vec()));
        assert!(result.is_err(), "truncated to {} bytes", len);
    }
}

#[test]
fn test_inflated_row_count_rejected_at_open() {
    for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
        let codec = RowCodec::new(schema(), compression);
        let mut data = codec.encode_container(&events(1)).unwrap().to_vec();

        // Row count sits outside the CRC
        data[8..16].copy_from_slice(&(1u64 << 50).to_le_bytes());

        match RowCodec::decode_container(Cursor::new(data)) {
            Err(FloeError::Corruption(msg)) => assert!(msg.contains("Row count"), "{}", msg),
            other => panic!("expected corruption for {}, got {:?}", compression, other.map(|r| r.row_count())),
        }
    }
}

#[test]
fn test_row_count_past_last_row_fails_on_read() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut data = codec.encode_container(&events(3)).unwrap().to_vec();
    data[8..16].copy_from_slice(&4u64.to_le_bytes());

    let reader = RowCodec::decode_container(Cursor::new(data)).unwrap();
    let results: Vec<_> = reader.collect();

    assert_eq!(results.len(), 4);
    assert!(results[..3].iter().all(|r| r.is_ok()));
    assert!(matches!(results[3], Err(FloeError::Corruption(_))));
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_read_container_into_sends_rows_in_order() {
    let codec = RowCodec::new(schema(), Compression::Zstd);
    let data = codec.encode_container(&events(25)).unwrap();
    let (tx, rx) = channel::unbounded();

    let sent = floe::codec::read_container_into(Cursor::new(data.to_vec()), &tx).unwrap();

    assert_eq!(sent, 25);
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), events(25));
}

#[test]
fn test_read_container_into_delivers_rows_before_bad_one() {
    let codec = RowCodec::new(schema(), Compression::None);
    let mut data = codec.encode_container(&events(3)).unwrap().to_vec();
    data[8..16].copy_from_slice(&4u64.to_le_bytes());
    let (tx, rx) = channel::unbounded();

    let result = floe::codec::read_container_into(Cursor::new(data), &tx);

    assert!(matches!(result, Err(FloeError::Corruption(_))));
    assert_eq!(rx.try_iter().count(), 3);
}

#[test]
fn test_read_container_into_rejects_corrupt_container_before_sending() {
    let codec = RowCodec::new(schema(), Compression::Lz4);
    let mut data = codec.encode_container(&events(3)).unwrap().to_vec();
    data[0] = b'X';
    let (tx, rx) = channel::unbounded();

    assert!(floe::codec::read_container_into(Cursor::new(data), &tx).is_err());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_read_container_into_closed_channel() {
    let codec = RowCodec::new(schema(), Compression::None);
    let data = codec.encode_container(&events(2)).unwrap();
    let (tx, rx) = channel::unbounded();
    drop(rx);

    assert!(matches!(
        floe::codec::read_container_into(Cursor::new(data.to_vec()), &tx),
        Err(FloeError::ChannelClosed(_))
    ));
}

// =============================================================================
// Compression Name Tests
// =============================================================================

#[test]
fn test_compression_names() {
    assert_eq!("null".parse::<Compression>().unwrap(), Compression::None);
    assert_eq!("".parse::<Compression>().unwrap(), Compression::None);
    assert_eq!("LZ4".parse::<Compression>().unwrap(), Compression::Lz4);
    assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
    assert!(matches!(
        "snappy".parse::<Compression>(),
        Err(FloeError::UnsupportedCompression(_))
    ));
}
