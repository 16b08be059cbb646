//! Tests for the WAL record codec
//!
//! These tests verify:
//! - Round-trip encoding for every record type
//! - CRC32 corruption detection over the key/value region
//! - Edge cases (truncation, short buffers, unknown tags, field limits)

use wald::wal::{Record, RecordType, HEADER_SIZE, MAX_FIELD_LEN};
use wald::WalError;

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_encode_decode_write() {
    let record = Record::write(1, 0, b"hello".to_vec(), b"world".to_vec());

    let bytes = record.encode().unwrap();
    let decoded = Record::decode(&bytes).unwrap();

    assert_eq!(record, decoded);
}

#[test]
fn test_encode_decode_every_record_type() {
    let types = [
        RecordType::Write,
        RecordType::Commit,
        RecordType::Abort,
        RecordType::Checkpoint,
        RecordType::TxnBegin,
        RecordType::TxnCommit,
        RecordType::TxnRollback,
    ];

    for (i, record_type) in types.into_iter().enumerate() {
        let mut record = Record::marker(record_type, i as u64 + 1, 7);
        record.flags = 0xA5;
        record.key = format!("key{}", i).into_bytes();

        let decoded = Record::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(record, decoded);
    }
}

#[test]
fn test_encode_decode_empty_key_and_value() {
    let record = Record::marker(RecordType::TxnCommit, 9, 3);

    let bytes = record.encode().unwrap();
    assert_eq!(bytes.len(), HEADER_SIZE);

    let decoded = Record::decode(&bytes).unwrap();
    assert_eq!(record, decoded);
}

#[test]
fn test_encode_decode_max_size_fields() {
    let key = vec![0x11; MAX_FIELD_LEN];
    let value = vec![0x22; MAX_FIELD_LEN];
    let record = Record::write(u64::MAX, u64::MAX, key, value);

    let bytes = record.encode().unwrap();
    assert_eq!(bytes.len(), HEADER_SIZE + 2 * MAX_FIELD_LEN);

    let decoded = Record::decode(&bytes).unwrap();
    assert_eq!(record, decoded);
}

#[test]
fn test_decode_ignores_trailing_bytes() {
    let first = Record::write(1, 0, b"a".to_vec(), b"1".to_vec());
    let second = Record::write(2, 0, b"b".to_vec(), b"2".to_vec());

    let mut bytes = first.encode().unwrap().to_vec();
    bytes.extend_from_slice(&second.encode().unwrap());

    assert_eq!(Record::decode(&bytes).unwrap(), first);
}

// =============================================================================
// Wire Format Tests
// =============================================================================

#[test]
fn test_header_layout_is_big_endian() {
    let record = Record::write(
        0x0102030405060708,
        0x1112131415161718,
        b"ab".to_vec(),
        b"xyz".to_vec(),
    );
    let bytes = record.encode().unwrap();

    assert_eq!(&bytes[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&bytes[8..16], &[0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]);
    assert_eq!(bytes[16], RecordType::Write as u8);
    assert_eq!(bytes[17], 0);
    assert_eq!(&bytes[18..20], &[0, 2]);
    assert_eq!(&bytes[20..22], &[0, 3]);
    assert_eq!(&bytes[22..26], &record.checksum().to_be_bytes());
    assert_eq!(&bytes[26..], b"abxyz");
}

#[test]
fn test_encoded_len_matches() {
    let record = Record::write(1, 2, b"test_key".to_vec(), b"test_value".to_vec());

    assert_eq!(record.encoded_len(), HEADER_SIZE + 8 + 10);
    assert_eq!(record.encode().unwrap().len(), record.encoded_len());
}

#[test]
fn test_record_type_tags() {
    assert_eq!(RecordType::Write as u8, 1);
    assert_eq!(RecordType::TxnRollback as u8, 7);
    assert_eq!(RecordType::try_from(6).unwrap(), RecordType::TxnCommit);
    assert!(matches!(RecordType::try_from(0), Err(WalError::UnknownRecordType(0))));
    assert!(matches!(RecordType::try_from(8), Err(WalError::UnknownRecordType(8))));
}

// =============================================================================
// CRC Corruption Detection Tests
// =============================================================================

#[test]
fn test_any_payload_byte_flip_detected() {
    let record = Record::write(5, 0, b"key".to_vec(), b"value".to_vec());
    let bytes = record.encode().unwrap();

    for i in HEADER_SIZE..bytes.len() {
        let mut corrupted = bytes.to_vec();
        corrupted[i] ^= 0xFF;

        let result = Record::decode(&corrupted);
        assert!(
            matches!(result, Err(WalError::ChecksumMismatch { .. })),
            "flip at byte {} not detected",
            i
        );
    }
}

#[test]
fn test_checksum_field_corruption_detected() {
    let record = Record::write(1, 0, b"key".to_vec(), b"value".to_vec());
    let mut bytes = record.encode().unwrap().to_vec();

    bytes[22] ^= 0x01;

    let err = Record::decode(&bytes).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_unknown_tag_rejected() {
    let record = Record::write(1, 0, b"k".to_vec(), b"v".to_vec());
    let mut bytes = record.encode().unwrap().to_vec();

    bytes[16] = 0x7F;

    let err = Record::decode(&bytes).unwrap_err();
    assert!(matches!(err, WalError::UnknownRecordType(0x7F)));
    assert!(err.is_corruption());
}

// =============================================================================
// Edge Case Tests
// =============================================================================

#[test]
fn test_truncated_payload() {
    let record = Record::write(1, 0, b"key".to_vec(), b"value".to_vec());
    let bytes = record.encode().unwrap();

    let err = Record::decode(&bytes[..HEADER_SIZE + 2]).unwrap_err();

    match &err {
        WalError::UnexpectedEof { len, needed } => {
            assert_eq!(*len, HEADER_SIZE + 2);
            assert_eq!(*needed, HEADER_SIZE + 8);
        }
        other => panic!("expected UnexpectedEof, got {:?}", other),
    }
    assert!(err.is_truncation());
}

#[test]
fn test_header_too_small() {
    let bytes = [0u8; 10];
    let err = Record::decode(&bytes).unwrap_err();

    assert!(matches!(err, WalError::ShortBuffer { len: 10, needed: HEADER_SIZE }));
}

#[test]
fn test_empty_buffer() {
    let bytes: [u8; 0] = [];
    assert!(matches!(Record::decode(&bytes), Err(WalError::ShortBuffer { len: 0, .. })));
}

#[test]
fn test_oversized_key_rejected() {
    let record = Record::write(1, 0, vec![0; MAX_FIELD_LEN + 1], b"v".to_vec());

    let err = record.encode().unwrap_err();
    assert!(matches!(err, WalError::FieldTooLarge { field: "key", .. }));
}

#[test]
fn test_oversized_value_rejected() {
    let record = Record::write(1, 0, b"k".to_vec(), vec![0; MAX_FIELD_LEN + 1]);

    let err = record.encode().unwrap_err();
    assert!(matches!(err, WalError::FieldTooLarge { field: "value", .. }));
}

#[test]
fn test_checksum_deterministic() {
    let a = Record::write(1, 0, b"key".to_vec(), b"value".to_vec());
    let b = Record::write(99, 4, b"key".to_vec(), b"value".to_vec());

    // Only the payload is covered
    assert_eq!(a.checksum(), b.checksum());
    assert_eq!(a.checksum(), crc32fast::hash(b"keyvalue"));
}
