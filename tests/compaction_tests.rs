//! Integration tests for compaction: trigger thresholds, data survival,
//! dedup, and tombstone handling end to end.

use riftkv::{MemTable, VersionSet};
use tempfile::TempDir;

/// Flushes one memtable writing `value` for every key in `keys`.
fn flush_values(versions: &VersionSet, keys: &[String], value: &str, seq: &mut u64) {
    let memtable = MemTable::new();
    for key in keys {
        *seq += 1;
        memtable.put(key.as_bytes(), value.as_bytes(), *seq);
    }
    versions.flush_memtable(&memtable).unwrap();
}

#[test]
fn test_level0_compaction_drains_level0() {
    env_logger::try_init().ok();

    let temp_dir = TempDir::new().unwrap();
    let versions = VersionSet::new(temp_dir.path());
    let keys: Vec<String> = (0..50).map(|i| format!("key{:04}", i)).collect();

    // Identical key ranges: the first two flushes sink to levels 2 and 1,
    // the next five pile up at level 0 and push its score past 1.0.
    let mut seq = 0u64;
    for round in 0..7 {
        flush_values(&versions, &keys, &format!("v{}", round), &mut seq);
    }
    assert_eq!(versions.current().num_level_files(0), 5);

    assert!(versions.compact().unwrap());

    let current = versions.current();
    assert_eq!(current.num_level_files(0), 0);
    assert!(current.num_level_files(1) > 0);

    // Every key reads the value of the newest round.
    for key in &keys {
        assert_eq!(versions.get(key.as_bytes()).unwrap(), Some(b"v6".to_vec()));
    }
}

#[test]
fn test_compact_when_balanced_returns_false() {
    env_logger::try_init().ok();

    let temp_dir = TempDir::new().unwrap();
    let versions = VersionSet::new(temp_dir.path());
    let keys: Vec<String> = (0..10).map(|i| format!("key{:04}", i)).collect();

    let mut seq = 0u64;
    flush_values(&versions, &keys, "v", &mut seq);

    assert!(!versions.compact().unwrap());
    assert_eq!(versions.current().num_level_files(2), 1);
}

#[test]
fn test_compaction_keeps_only_newest_version() {
    env_logger::try_init().ok();

    let temp_dir = TempDir::new().unwrap();
    let versions = VersionSet::new(temp_dir.path());
    let keys = vec!["duplicate_key".to_string()];

    let mut seq = 0u64;
    for round in 0..7 {
        flush_values(&versions, &keys, &format!("version_{}", round), &mut seq);
    }

    assert!(versions.compact().unwrap());

    // Level 1 now holds one table with a single surviving record.
    let current = versions.current();
    let level1 = current.level_files(1);
    assert_eq!(level1.len(), 1);
    let table = current.table_cache().find_table(level1[0].number()).unwrap();
    assert_eq!(table.num_entries(), 1);

    assert_eq!(versions.get(b"duplicate_key").unwrap(), Some(b"version_6".to_vec()));
}

#[test]
fn test_deleted_key_stays_deleted_after_compaction() {
    env_logger::try_init().ok();

    let temp_dir = TempDir::new().unwrap();
    let versions = VersionSet::new(temp_dir.path());
    let keys: Vec<String> = (0..20).map(|i| format!("key{:04}", i)).collect();

    let mut seq = 0u64;
    for round in 0..6 {
        flush_values(&versions, &keys, &format!("v{}", round), &mut seq);
    }

    // The final flush deletes one key and rewrites the rest.
    let memtable = MemTable::new();
    for key in &keys {
        seq += 1;
        if key == "key0007" {
            memtable.delete(key.as_bytes(), seq);
        } else {
            memtable.put(key.as_bytes(), b"final", seq);
        }
    }
    versions.flush_memtable(&memtable).unwrap();

    assert_eq!(versions.get(b"key0007").unwrap(), None);

    assert!(versions.compact().unwrap());

    assert_eq!(versions.get(b"key0007").unwrap(), None);
    assert_eq!(versions.get(b"key0003").unwrap(), Some(b"final".to_vec()));

    // With the catalog rebalanced, another round finds nothing to do.
    assert!(!versions.compact().unwrap());
}
