//! Tests for crash recovery
//!
//! These tests verify:
//! - Transaction state rebuilt from the log on open
//! - Sequence and transaction id continuity across restarts
//! - Strict vs truncate-tail handling of damaged logs

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use wald::wal::segment::{list_segments, segment_path};
use wald::wal::{Record, RecordType, HEADER_SIZE};
use wald::{Config, RecoveryPolicy, Wal};

// =============================================================================
// Test Helpers
// =============================================================================

fn config(dir: &Path) -> Config {
    Config::builder()
        .dir(dir)
        .sync(true)
        .flush_interval(Duration::from_millis(50))
        .build()
}

fn truncating_config(dir: &Path) -> Config {
    Config::builder()
        .dir(dir)
        .sync(true)
        .flush_interval(Duration::from_millis(50))
        .recovery_policy(RecoveryPolicy::TruncateTail)
        .build()
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

fn keys(records: &[Record]) -> Vec<Vec<u8>> {
    records.iter().map(|r| r.key.clone()).collect()
}

// =============================================================================
// Clean Log Tests
// =============================================================================

#[test]
fn test_recover_empty_directory() {
    let temp = TempDir::new().unwrap();
    let wal = Wal::open(config(temp.path())).unwrap();

    let report = wal.recovery_report();
    assert_eq!(report.records_scanned, 0);
    assert_eq!(report.last_sequence, 0);
    assert_eq!(report.max_transaction_id, 0);
    assert!(report.active_transactions.is_empty());
    assert!(report.truncated_at.is_none());

    assert_eq!(wal.next_transaction_id(), 1);
    assert_eq!(wal.begin().unwrap(), 1);
}

#[test]
fn test_sequence_continues_after_reopen() {
    let temp = TempDir::new().unwrap();

    {
        let wal = Wal::open(config(temp.path())).unwrap();
        wal.write(0, b"a", b"1").unwrap();
        wal.write(0, b"b", b"2").unwrap();
        wal.checkpoint().unwrap();
        wal.close().unwrap();
    }

    let wal = Wal::open(config(temp.path())).unwrap();
    assert_eq!(wal.recovery_report().records_scanned, 3);
    assert_eq!(wal.last_sequence(), 3);
    assert_eq!(wal.write(0, b"c", b"3").unwrap(), 4);
}

#[test]
fn test_unresolved_transaction_recovered_as_active() {
    let temp = TempDir::new().unwrap();

    let (committed, pending) = {
        let wal = Wal::open(config(temp.path())).unwrap();
        let committed = wal.begin().unwrap();
        let pending = wal.begin().unwrap();
        wal.write(committed, b"c", b"1").unwrap();
        wal.write(pending, b"p", b"1").unwrap();
        wal.commit(committed).unwrap();
        wal.close().unwrap();
        (committed, pending)
    };

    let wal = Wal::open(config(temp.path())).unwrap();
    assert_eq!(wal.active_transactions(), vec![pending]);
    assert_eq!(wal.recovery_report().active_transactions, vec![pending]);
    assert!(wal.transaction_state(committed).is_none());
    assert_eq!(wal.next_transaction_id(), pending + 1);
}

#[test]
fn test_aborted_transaction_not_recovered() {
    let temp = TempDir::new().unwrap();

    {
        let wal = Wal::open(config(temp.path())).unwrap();
        let tx = wal.begin().unwrap();
        wal.write(tx, b"k", b"v").unwrap();
        wal.abort(tx).unwrap();
        wal.close().unwrap();
    }

    let wal = Wal::open(config(temp.path())).unwrap();
    assert!(wal.active_transactions().is_empty());
    assert_eq!(wal.recovery_report().max_transaction_id, 1);
    assert_eq!(wal.next_transaction_id(), 2);
}

#[test]
fn test_begin_without_writes_leaves_no_trace() {
    let temp = TempDir::new().unwrap();

    let tx = {
        let wal = Wal::open(config(temp.path())).unwrap();
        let tx = wal.begin().unwrap();
        wal.close().unwrap();
        tx
    };

    let wal = Wal::open(config(temp.path())).unwrap();
    assert!(wal.active_transactions().is_empty());
    assert_eq!(wal.recovery_report().records_scanned, 0);
    assert!(wal.commit(tx).is_err());
}

#[test]
fn test_begin_marker_registers_transaction() {
    let temp = TempDir::new().unwrap();
    let path = segment_path(temp.path(), 1);

    append_raw(&path, &Record::marker(RecordType::TxnBegin, 1, 9).encode().unwrap());

    let wal = Wal::open(config(temp.path())).unwrap();
    assert_eq!(wal.active_transactions(), vec![9]);
    assert_eq!(wal.next_transaction_id(), 10);

    wal.commit(9).unwrap();
    assert!(wal.active_transactions().is_empty());
}

#[test]
fn test_next_transaction_id_covers_foreign_writes() {
    let temp = TempDir::new().unwrap();

    {
        let wal = Wal::open(config(temp.path())).unwrap();
        // Id handed out by another process
        wal.write(41, b"k", b"v").unwrap();
        wal.close().unwrap();
    }

    let wal = Wal::open(config(temp.path())).unwrap();
    assert_eq!(wal.active_transactions(), vec![41]);
    assert_eq!(wal.begin().unwrap(), 42);
}

#[test]
fn test_recovery_is_idempotent() {
    let temp = TempDir::new().unwrap();

    {
        let wal = Wal::open(config(temp.path())).unwrap();
        let tx = wal.begin().unwrap();
        wal.write(tx, b"a", b"1").unwrap();
        wal.write(0, b"b", b"2").unwrap();
        wal.commit(tx).unwrap();
        let open = wal.begin().unwrap();
        wal.write(open, b"c", b"3").unwrap();
        wal.close().unwrap();
    }

    let first = {
        let wal = Wal::open(config(temp.path())).unwrap();
        let snapshot = (wal.read_all().unwrap(), wal.recovery_report().clone());
        wal.close().unwrap();
        snapshot
    };
    let second = {
        let wal = Wal::open(config(temp.path())).unwrap();
        let snapshot = (wal.read_all().unwrap(), wal.recovery_report().clone());
        wal.close().unwrap();
        snapshot
    };

    assert_eq!(first, second);
    assert_eq!(keys(&first.0), vec![b"a".to_vec(), b"b".to_vec()]);
}

// =============================================================================
// Damaged Log Tests
// =============================================================================

#[test]
fn test_strict_refuses_torn_tail() {
    let temp = TempDir::new().unwrap();

    {
        let wal = Wal::open(config(temp.path())).unwrap();
        wal.write(0, b"k", b"v").unwrap();
        wal.close().unwrap();
    }
    append_raw(&segment_path(temp.path(), 1), &[0u8; 10]);

    let err = Wal::open(config(temp.path())).err().unwrap();
    assert!(err.is_truncation());
}

#[test]
fn test_strict_refuses_corruption() {
    let temp = TempDir::new().unwrap();
    let path = segment_path(temp.path(), 1);

    {
        let wal = Wal::open(config(temp.path())).unwrap();
        wal.write(0, b"key", b"value").unwrap();
        wal.close().unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    bytes[HEADER_SIZE] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let err = Wal::open(config(temp.path())).err().unwrap();
    assert!(err.is_corruption());
}

#[test]
fn test_truncate_tail_repairs_torn_write() {
    let temp = TempDir::new().unwrap();
    let path = segment_path(temp.path(), 1);

    {
        let wal = Wal::open(config(temp.path())).unwrap();
        wal.write(0, b"a", b"1").unwrap();
        wal.write(0, b"b", b"2").unwrap();
        wal.close().unwrap();
    }
    let good_len = fs::metadata(&path).unwrap().len();

    let torn = Record::write(3, 0, b"c".to_vec(), b"3".to_vec()).encode().unwrap();
    append_raw(&path, &torn[..HEADER_SIZE + 1]);

    let wal = Wal::open(truncating_config(temp.path())).unwrap();
    assert_eq!(wal.recovery_report().truncated_at, Some((1, good_len)));
    assert_eq!(wal.recovery_report().records_scanned, 2);
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

    assert_eq!(wal.write(0, b"d", b"4").unwrap(), 3);
    let records = wal.read_all().unwrap();
    assert_eq!(keys(&records), vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]);
    wal.close().unwrap();

    // The repaired log opens cleanly under the strict policy
    let wal = Wal::open(config(temp.path())).unwrap();
    assert!(wal.recovery_report().truncated_at.is_none());
    assert_eq!(wal.read_all().unwrap().len(), 3);
}

#[test]
fn test_truncate_tail_drops_later_segments() {
    let temp = TempDir::new().unwrap();
    let cfg = Config::builder()
        .dir(temp.path())
        .sync(true)
        .max_segment_bytes(64)
        .build();

    {
        let wal = Wal::open(cfg.clone()).unwrap();
        // 26 + 2 + 2 = 30 bytes: two records per segment
        for i in 0..6 {
            let key = format!("k{}", i);
            wal.write(0, key.as_bytes(), b"vv").unwrap();
        }
        wal.close().unwrap();
    }
    assert_eq!(list_segments(temp.path()).unwrap().len(), 3);

    // Damage the second record of segment 2
    let path = segment_path(temp.path(), 2);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let cfg = Config {
        recovery_policy: RecoveryPolicy::TruncateTail,
        ..cfg
    };
    let wal = Wal::open(cfg).unwrap();

    assert_eq!(wal.recovery_report().truncated_at, Some((2, 30)));
    assert_eq!(wal.current_segment(), 2);
    assert_eq!(list_segments(temp.path()).unwrap().len(), 2);

    let records = wal.read_all().unwrap();
    assert_eq!(
        keys(&records),
        vec![b"k0".to_vec(), b"k1".to_vec(), b"k2".to_vec()]
    );
    assert_eq!(wal.last_sequence(), 3);
}

#[test]
fn test_truncate_tail_keeps_committed_state() {
    let temp = TempDir::new().unwrap();
    let path = segment_path(temp.path(), 1);

    let tx = {
        let wal = Wal::open(config(temp.path())).unwrap();
        let tx = wal.begin().unwrap();
        wal.write(tx, b"k", b"v").unwrap();
        wal.commit(tx).unwrap();
        wal.close().unwrap();
        tx
    };
    append_raw(&path, &[0xAB; 5]);

    let wal = Wal::open(truncating_config(temp.path())).unwrap();
    assert!(wal.active_transactions().is_empty());
    assert_eq!(wal.next_transaction_id(), tx + 1);

    let records = wal.read_all().unwrap();
    assert_eq!(keys(&records), vec![b"k".to_vec()]);
}
