//! Tests for Index operations
//!
//! These tests verify:
//! - Opening a fresh directory
//! - get/insert/delete with durable records
//! - Key length validation
//! - Rotation (explicit and threshold driven)
//! - Sequence ids and run modes
//! - Health transitions and read-only behaviour

use std::fs;

use atlaskv_index::config::{RunMode, Settings};
use atlaskv_index::dkey::{sequence_key, DirectKey};
use atlaskv_index::entry::{EntryFlags, Location};
use atlaskv_index::error::IndexError;
use atlaskv_index::journal::{
    index_file_path, IndexReader, IndexRecovery, IndexWriter, ItemRecord, WriterOptions,
};
use atlaskv_index::{Health, Index};
use tempfile::TempDir;

use super::{settings, settings_with_mode, setup_temp_index};

fn records_in(temp: &TempDir, file_id: u16) -> Vec<ItemRecord> {
    IndexReader::open(&index_file_path(temp.path(), file_id), file_id)
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_directory_and_first_file() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("nested").join("index");
    let settings = Settings {
        index_dir: dir.clone(),
        ..settings(&temp)
    };

    let index = Index::open(settings).unwrap();

    assert!(dir.exists());
    assert!(index_file_path(&dir, 0).exists());
    assert_eq!(index.health(), Health::Healthy);
    assert_eq!(index.current_file_id(), 0);
    assert!(index.is_empty());
}

#[test]
fn test_open_path_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let index = Index::open_path(temp.path()).unwrap();

    assert_eq!(index.index_dir(), temp.path());
    assert_eq!(index.settings().mode, RunMode::User);
    assert_eq!(index.health(), Health::Healthy);
}

#[test]
fn test_open_rejects_invalid_settings() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        branch_count: 0,
        ..settings(&temp)
    };

    assert!(matches!(Index::open(settings), Err(IndexError::Config(_))));
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_insert_get() {
    let (_temp, index) = setup_temp_index();

    let committed = index.insert(b"hello", Location::new(3, 100, 10)).unwrap();

    assert_eq!(committed, Location::new(3, 100, 10));
    assert_eq!(index.get(b"hello"), Some(Location::new(3, 100, 10)));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_get_missing() {
    let (_temp, index) = setup_temp_index();
    assert_eq!(index.get(b"nonexistent"), None);
}

#[test]
fn test_insert_writes_one_record() {
    let (temp, index) = setup_temp_index();

    index.insert(b"k", Location::new(1, 2, 3)).unwrap();

    let expected = ItemRecord::new(b"k", Location::new(1, 2, 3), EntryFlags::empty()).unwrap();
    assert_eq!(records_in(&temp, 0), vec![expected]);
}

#[test]
fn test_update_semantics() {
    let (temp, index) = setup_temp_index();

    index.insert(b"key", Location::new(1, 10, 5)).unwrap();
    index.insert(b"key", Location::new(2, 20, 6)).unwrap();

    assert_eq!(index.get(b"key"), Some(Location::new(2, 20, 6)));
    assert_eq!(index.len(), 1);

    let records = records_in(&temp, 0);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].location, Location::new(1, 10, 5));
    assert_eq!(records[1].location, Location::new(2, 20, 6));
    assert!(records.iter().all(|r| !r.is_tombstone()));
}

#[test]
fn test_delete() {
    let (temp, index) = setup_temp_index();

    index.insert(b"key", Location::new(1, 0, 1)).unwrap();
    assert!(index.delete(b"key").unwrap());

    assert_eq!(index.get(b"key"), None);
    assert!(index.is_empty());

    let records = records_in(&temp, 0);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1], ItemRecord::tombstone(b"key").unwrap());
}

#[test]
fn test_delete_twice_logs_one_tombstone() {
    let (temp, index) = setup_temp_index();

    index.insert(b"key", Location::new(1, 0, 1)).unwrap();
    assert!(index.delete(b"key").unwrap());
    assert!(!index.delete(b"key").unwrap());

    let tombstones = records_in(&temp, 0)
        .iter()
        .filter(|r| r.is_tombstone())
        .count();
    assert_eq!(tombstones, 1);
}

#[test]
fn test_delete_missing_writes_nothing() {
    let (temp, index) = setup_temp_index();

    assert!(!index.delete(b"ghost").unwrap());
    assert!(records_in(&temp, 0).is_empty());
}

#[test]
fn test_entry_accessor() {
    let (_temp, index) = setup_temp_index();
    index.insert(b"k", Location::new(4, 5, 6)).unwrap();

    let entry = index.entry(b"k").unwrap();
    assert_eq!(entry.id(), b"k");
    assert_eq!(entry.location(), Location::new(4, 5, 6));
    assert!(!entry.is_deleted());
}

// =============================================================================
// Key Length Tests
// =============================================================================

#[test]
fn test_max_length_key_accepted() {
    let (_temp, index) = setup_temp_index();
    let id = vec![b'k'; 255];

    index.insert(&id, Location::new(0, 0, 1)).unwrap();
    assert_eq!(index.get(&id), Some(Location::new(0, 0, 1)));
}

#[test]
fn test_key_too_long_rejected_without_effect() {
    let (temp, index) = setup_temp_index();
    let id = vec![b'k'; 256];
    let size_before = fs::metadata(index_file_path(temp.path(), 0)).unwrap().len();

    let insert = index.insert(&id, Location::new(0, 0, 1));
    let delete = index.delete(&id);
    let raw = index.insert_raw(&id, Location::new(0, 0, 1), EntryFlags::empty());

    assert!(matches!(insert, Err(IndexError::KeyTooLong { len: 256 })));
    assert!(matches!(delete, Err(IndexError::KeyTooLong { len: 256 })));
    assert!(matches!(raw, Err(IndexError::KeyTooLong { len: 256 })));
    assert!(index.is_empty());
    assert_eq!(index.get(&id), None);
    assert_eq!(
        fs::metadata(index_file_path(temp.path(), 0)).unwrap().len(),
        size_before
    );
    assert_eq!(index.health(), Health::Healthy);
}

// =============================================================================
// insert_raw Tests
// =============================================================================

#[test]
fn test_insert_raw_is_memory_only() {
    let (temp, index) = setup_temp_index();

    index
        .insert_raw(b"mem", Location::new(1, 1, 1), EntryFlags::empty())
        .unwrap();

    assert_eq!(index.get(b"mem"), Some(Location::new(1, 1, 1)));
    assert!(records_in(&temp, 0).is_empty());
}

#[test]
fn test_insert_raw_deleted_removes_entry() {
    let (_temp, index) = setup_temp_index();

    index
        .insert_raw(b"k", Location::new(1, 1, 1), EntryFlags::empty())
        .unwrap();
    index
        .insert_raw(b"k", Location::default(), EntryFlags::DELETED)
        .unwrap();

    assert_eq!(index.get(b"k"), None);
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_explicit_rotate() {
    let (temp, index) = setup_temp_index();

    index.insert(b"before", Location::new(0, 0, 1)).unwrap();
    assert_eq!(index.rotate().unwrap(), 1);
    assert_eq!(index.current_file_id(), 1);
    index.insert(b"after", Location::new(0, 1, 1)).unwrap();

    assert_eq!(records_in(&temp, 0).len(), 1);
    assert_eq!(records_in(&temp, 1)[0].id, b"after".to_vec());
    assert_eq!(index.get(b"before"), Some(Location::new(0, 0, 1)));
}

#[test]
fn test_rotation_on_record_threshold() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        max_file_records: Some(3),
        ..settings(&temp)
    };
    let index = Index::open(settings).unwrap();

    for i in 0..3u64 {
        index.insert(format!("k{}", i).as_bytes(), Location::new(0, i, 1)).unwrap();
    }
    assert_eq!(index.current_file_id(), 0);

    index.insert(b"k3", Location::new(0, 3, 1)).unwrap();

    assert_eq!(index.current_file_id(), 1);
    assert_eq!(records_in(&temp, 0).len(), 3);
    assert!(records_in(&temp, 0).iter().all(|r| r.id != b"k3".to_vec()));
    assert_eq!(records_in(&temp, 1)[0].id, b"k3".to_vec());
}

#[test]
fn test_rotation_on_size_threshold() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        // Header (27) + two 21-byte records
        max_file_size: 69,
        ..settings(&temp)
    };
    let index = Index::open(settings).unwrap();

    index.insert(b"a", Location::new(0, 0, 1)).unwrap();
    index.insert(b"b", Location::new(0, 1, 1)).unwrap();
    assert_eq!(index.current_file_id(), 0);

    index.insert(b"c", Location::new(0, 2, 1)).unwrap();
    assert_eq!(index.current_file_id(), 1);

    let ids = IndexRecovery::discover(temp.path()).unwrap();
    assert_eq!(ids, vec![0, 1]);
    assert_eq!(records_in(&temp, 1).len(), 1);
}

#[test]
fn test_rotation_keeps_ids_contiguous() {
    let (temp, index) = setup_temp_index();

    for expected in 1..=5u16 {
        assert_eq!(index.rotate().unwrap(), expected);
    }

    assert_eq!(IndexRecovery::discover(temp.path()).unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

// =============================================================================
// Sequence Id Tests
// =============================================================================

#[test]
fn test_sequence_ids_increase() {
    let temp = TempDir::new().unwrap();
    let index = Index::open(settings_with_mode(&temp, RunMode::Sequential)).unwrap();

    let ids: Vec<u64> = (0..10)
        .map(|_| index.allocate_next_sequence_id().unwrap())
        .collect();

    assert_eq!(ids, (0..10).collect::<Vec<_>>());
    assert_eq!(index.next_sequence_id(), 10);
}

#[test]
fn test_sequence_ids_in_direct_mode() {
    let temp = TempDir::new().unwrap();
    let index = Index::open(settings_with_mode(&temp, RunMode::Direct)).unwrap();

    assert_eq!(index.allocate_next_sequence_id().unwrap(), 0);
    assert_eq!(index.allocate_next_sequence_id().unwrap(), 1);
}

#[test]
fn test_sequence_ids_rejected_in_user_mode() {
    let (_temp, index) = setup_temp_index();

    assert!(matches!(
        index.allocate_next_sequence_id(),
        Err(IndexError::WrongMode(RunMode::User))
    ));
    assert!(matches!(
        index.insert_next(Location::new(0, 0, 1)),
        Err(IndexError::WrongMode(RunMode::User))
    ));
}

#[test]
fn test_insert_next() {
    let temp = TempDir::new().unwrap();
    let index = Index::open(settings_with_mode(&temp, RunMode::Sequential)).unwrap();

    let first = index.insert_next(Location::new(0, 0, 10)).unwrap();
    let second = index.insert_next(Location::new(0, 10, 10)).unwrap();

    assert_eq!((first, second), (0, 1));
    assert_eq!(index.get_sequence(1), Some(Location::new(0, 10, 10)));
    assert_eq!(index.get(&sequence_key(0)), Some(Location::new(0, 0, 10)));
}

#[test]
fn test_sequence_ids_stop_at_exhaustion() {
    let temp = TempDir::new().unwrap();
    let settings = settings_with_mode(&temp, RunMode::Sequential);

    let mut writer = IndexWriter::create(temp.path(), 0, WriterOptions::from(&settings)).unwrap();
    let record = ItemRecord::new(
        &sequence_key(u64::MAX - 2),
        Location::new(0, 0, 1),
        EntryFlags::empty(),
    )
    .unwrap();
    writer.append(&record).unwrap();
    drop(writer);

    let index = Index::open(settings).unwrap();

    assert_eq!(index.allocate_next_sequence_id().unwrap(), u64::MAX - 1);
    assert!(matches!(
        index.allocate_next_sequence_id(),
        Err(IndexError::SequenceExhausted)
    ));
    assert!(matches!(
        index.insert_next(Location::new(0, 1, 1)),
        Err(IndexError::SequenceExhausted)
    ));
    assert_eq!(index.next_sequence_id(), u64::MAX);
    assert_eq!(index.len(), 1);
}

// =============================================================================
// Direct Key Tests
// =============================================================================

#[test]
fn test_direct_key_resolves_sequence_id() {
    let temp = TempDir::new().unwrap();
    let index = Index::open(settings_with_mode(&temp, RunMode::Direct)).unwrap();

    let id = index.insert_next(Location::new(4, 1000, 10)).unwrap();
    let key = index.direct_key(id).unwrap();

    assert_eq!(key, DirectKey::new(4, 1000));
    assert_eq!(DirectKey::from_slice(&key.to_bytes()), Some(key));
    assert!(key.addresses(index.get_sequence(id).unwrap()));
    assert_eq!(index.direct_key(id + 1), None);
}

#[test]
fn test_direct_key_needs_32_bit_offset() {
    let temp = TempDir::new().unwrap();
    let index = Index::open(settings_with_mode(&temp, RunMode::Direct)).unwrap();

    let id = index.insert_next(Location::new(1, 1 << 32, 10)).unwrap();

    assert_eq!(index.direct_key(id), None);
    assert!(index.get_sequence(id).is_some());
}

#[test]
fn test_direct_key_only_in_direct_mode() {
    let temp = TempDir::new().unwrap();
    let index = Index::open(settings_with_mode(&temp, RunMode::Sequential)).unwrap();

    let id = index.insert_next(Location::new(4, 1000, 10)).unwrap();
    assert_eq!(index.direct_key(id), None);
}

// =============================================================================
// Health / Read-Only Tests
// =============================================================================

#[test]
fn test_force_read_only_rejects_mutations() {
    let (temp, index) = setup_temp_index();
    index.insert(b"kept", Location::new(0, 0, 1)).unwrap();
    let size_before = fs::metadata(index_file_path(temp.path(), 0)).unwrap().len();

    index.force_read_only();

    assert_eq!(index.health(), Health::ReadOnly);
    assert!(matches!(
        index.insert(b"new", Location::new(0, 1, 1)),
        Err(IndexError::ReadOnly)
    ));
    assert!(matches!(index.delete(b"kept"), Err(IndexError::ReadOnly)));
    assert!(matches!(index.rotate(), Err(IndexError::ReadOnly)));

    // Reads are still served from memory
    assert_eq!(index.get(b"kept"), Some(Location::new(0, 0, 1)));
    assert_eq!(index.get(b"new"), None);
    assert_eq!(
        fs::metadata(index_file_path(temp.path(), 0)).unwrap().len(),
        size_before
    );
}

#[test]
fn test_read_only_is_terminal() {
    let (_temp, index) = setup_temp_index();

    index.force_read_only();
    index.force_read_only();

    assert_eq!(index.health(), Health::ReadOnly);
    assert!(index.sync().is_ok());
}

#[test]
fn test_close() {
    let (_temp, index) = setup_temp_index();
    index.insert(b"k", Location::new(0, 0, 1)).unwrap();
    index.close().unwrap();
}

#[test]
fn test_write_failure_degrades_and_hides_mutation() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        max_file_records: Some(1),
        ..settings(&temp)
    };
    let index = Index::open(settings.clone()).unwrap();
    index.insert(b"a", Location::new(0, 0, 1)).unwrap();

    // The next insert must rotate, and file 1 cannot be created
    let blocker = index_file_path(temp.path(), 1);
    fs::create_dir(&blocker).unwrap();

    assert!(index.insert(b"b", Location::new(0, 1, 1)).is_err());
    assert_eq!(index.health(), Health::Degraded);
    assert_eq!(index.get(b"b"), None);
    assert_eq!(index.get(b"a"), Some(Location::new(0, 0, 1)));
    assert_eq!(index.current_file_id(), 0);

    // Degraded keeps trying and keeps reporting
    assert!(index.delete(b"a").is_err());
    assert_eq!(index.get(b"a"), Some(Location::new(0, 0, 1)));
    assert_eq!(index.health(), Health::Degraded);
    index.close().unwrap();

    fs::remove_dir(&blocker).unwrap();
    let index = Index::open(settings).unwrap();
    assert_eq!(index.health(), Health::Healthy);
    assert_eq!(index.get(b"a"), Some(Location::new(0, 0, 1)));
    assert_eq!(index.get(b"b"), None);
    assert_eq!(index.replay_report().records(), 1);
}

#[cfg(unix)]
#[test]
fn test_refused_writes_at_open_load_read_only() {
    use std::fs::{OpenOptions, Permissions};
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    {
        let index = Index::open(settings(&temp)).unwrap();
        index.insert(b"k", Location::new(2, 20, 4)).unwrap();
        index.close().unwrap();
    }

    let path = index_file_path(temp.path(), 0);
    let size = fs::metadata(&path).unwrap().len();
    fs::set_permissions(&path, Permissions::from_mode(0o444)).unwrap();

    // Privileged users ignore file permissions; nothing to observe then
    if OpenOptions::new().write(true).open(&path).is_ok() {
        return;
    }

    let index = Index::open(settings(&temp)).unwrap();

    assert_eq!(index.health(), Health::ReadOnly);
    assert_eq!(index.current_file_id(), 0);
    assert_eq!(index.get(b"k"), Some(Location::new(2, 20, 4)));
    assert!(matches!(
        index.insert(b"new", Location::new(0, 0, 1)),
        Err(IndexError::ReadOnly)
    ));
    assert!(matches!(index.rotate(), Err(IndexError::ReadOnly)));
    assert!(index.sync().is_ok());
    index.close().unwrap();

    assert_eq!(fs::metadata(&path).unwrap().len(), size);
    fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();
}
