//! Compaction selection.
//!
//! This module scores the levels and picks the input files for the next
//! compaction.
//!
//! Level 0 is scored by file count rather than bytes: its files are
//! consulted on every read, so too many of them hurts lookups long before
//! their total size matters. Deeper levels are scored by total bytes
//! against a per-level budget that grows tenfold per level.

use crate::compaction::version::{FileMetaData, Version};
use crate::config::{self, L0_COMPACTION_TRIGGER, NUM_LEVELS};
use std::sync::Arc;

/// A selected compaction: the files at `level` to merge and the
/// overlapping files at `level + 1` they merge into.
#[derive(Debug, Clone)]
pub struct Compaction {
    level: usize,
    inputs: [Vec<Arc<FileMetaData>>; 2],
}

impl Compaction {
    pub(crate) fn new(
        level: usize,
        base: Vec<Arc<FileMetaData>>,
        parent: Vec<Arc<FileMetaData>>,
    ) -> Self {
        Self { level, inputs: [base, parent] }
    }

    /// The level being compacted; outputs land at `level + 1`.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Input files: side 0 is the compacted level, side 1 the overlap at
    /// the level below.
    pub fn inputs(&self, side: usize) -> &[Arc<FileMetaData>] {
        &self.inputs[side]
    }

    /// A compaction with a single input file and nothing overlapping at
    /// the parent level can reassign the file instead of rewriting it.
    pub fn is_trivial_move(&self) -> bool {
        self.inputs[0].len() == 1 && self.inputs[1].is_empty()
    }

    pub(crate) fn log(&self) {
        log::info!("compaction at level {}", self.level);
        for f in &self.inputs[0] {
            log::info!("inputs[0]: {}", f.number());
        }
        for f in &self.inputs[1] {
            log::info!("inputs[1]: {}", f.number());
        }
    }
}

/// Total bytes across a run of files.
pub(crate) fn total_file_size(files: &[Arc<FileMetaData>]) -> u64 {
    files.iter().map(|f| f.file_size()).sum()
}

impl Version {
    /// The level most in need of compaction, or `None` when every level
    /// is within budget.
    ///
    /// A level qualifies when its score exceeds 1.0; ties go to the
    /// shallowest level. The deepest level is never compacted (there is
    /// nowhere to push its data).
    pub fn pick_compaction_level(&self) -> Option<usize> {
        let mut compaction_level = None;
        let mut best_score = 1.0f64;
        for level in 0..NUM_LEVELS - 1 {
            let score = if level == 0 {
                self.num_level_files(0) as f64 / L0_COMPACTION_TRIGGER as f64
            } else {
                total_file_size(self.level_files(level)) as f64
                    / config::max_bytes_for_level(level) as f64
            };

            if score > best_score {
                best_score = score;
                compaction_level = Some(level);
            }
        }
        compaction_level
    }

    /// Picks the input files for the next compaction, or `None` when no
    /// level is over budget.
    ///
    /// Level 0 takes every level-0 file (they may all overlap). A deeper
    /// level takes the first file past its round-robin cursor, wrapping
    /// to the front when the cursor ran off the end. Side 1 collects
    /// every parent-level file whose key range intersects the inputs'.
    pub fn pick_compaction(&self) -> Option<Compaction> {
        let level = self.pick_compaction_level()?;

        let mut base: Vec<Arc<FileMetaData>> = Vec::new();
        let (smallest, largest);

        if level == 0 {
            base.extend(self.level_files(0).iter().cloned());
            let mut lo = base[0].smallest().clone();
            let mut hi = base[0].largest().clone();
            for f in &base[1..] {
                if f.smallest() < &lo {
                    lo = f.smallest().clone();
                }
                if f.largest() > &hi {
                    hi = f.largest().clone();
                }
            }
            smallest = lo;
            largest = hi;
        } else {
            for f in self.level_files(level) {
                match &self.compact_pointer[level] {
                    Some(cursor) if f.largest() <= cursor => continue,
                    _ => {
                        base.push(f.clone());
                        break;
                    }
                }
            }
            if base.is_empty() {
                base.push(self.level_files(level)[0].clone());
            }
            smallest = base[0].smallest().clone();
            largest = base[0].largest().clone();
        }

        let mut parent: Vec<Arc<FileMetaData>> = Vec::new();
        for f in self.level_files(level + 1) {
            if f.largest() < &smallest || f.smallest() > &largest {
                // Entirely before or entirely after the input range.
                continue;
            }
            parent.push(f.clone());
        }

        Some(Compaction::new(level, base, parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::{InternalKey, ValueType};
    use tempfile::TempDir;

    fn ikey(user_key: &str, seq: u64) -> InternalKey {
        InternalKey::new(user_key.as_bytes().to_vec(), seq, ValueType::Value)
    }

    fn meta_sized(number: u64, size: u64, smallest: &str, largest: &str) -> Arc<FileMetaData> {
        Arc::new(FileMetaData::new(number, size, ikey(smallest, 1), ikey(largest, 1)))
    }

    fn meta(number: u64, smallest: &str, largest: &str) -> Arc<FileMetaData> {
        meta_sized(number, 1024, smallest, largest)
    }

    #[test]
    fn test_no_compaction_when_balanced() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());

        // Four level-0 files score exactly 1.0, which does not qualify.
        for number in 1..=4 {
            version.add_file(0, meta(number, "a", "z"));
        }
        assert_eq!(version.pick_compaction_level(), None);
        assert!(version.pick_compaction().is_none());
    }

    #[test]
    fn test_level0_triggers_on_file_count() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        for number in 1..=5 {
            version.add_file(0, meta(number, "a", "z"));
        }

        assert_eq!(version.pick_compaction_level(), Some(0));
    }

    #[test]
    fn test_deeper_level_triggers_on_bytes() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        version.add_file(1, meta_sized(1, 11 * 1024 * 1024, "a", "m"));

        assert_eq!(version.pick_compaction_level(), Some(1));
    }

    #[test]
    fn test_tie_goes_to_shallowest_level() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());

        // Both levels score 1.5.
        for number in 1..=6 {
            version.add_file(0, meta(number, "a", "z"));
        }
        version.add_file(1, meta_sized(7, 15 * 1024 * 1024, "a", "m"));

        assert_eq!(version.pick_compaction_level(), Some(0));
    }

    #[test]
    fn test_score_grows_with_added_files() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        version.add_file(1, meta_sized(1, 11 * 1024 * 1024, "a", "b"));
        assert_eq!(version.pick_compaction_level(), Some(1));

        // Adding bytes to an over-budget level keeps it over budget.
        version.add_file(1, meta_sized(2, 5 * 1024 * 1024, "c", "d"));
        assert_eq!(version.pick_compaction_level(), Some(1));
    }

    #[test]
    fn test_level0_compaction_takes_all_files() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        for number in 1..=5 {
            version.add_file(0, meta(number, "c", "m"));
        }
        // Parent files inside, touching, and outside the input range.
        version.add_file(1, meta(6, "a", "b"));
        version.add_file(1, meta(7, "d", "e"));
        version.add_file(1, meta(8, "m", "q"));
        version.add_file(1, meta(9, "r", "z"));

        let c = version.pick_compaction().unwrap();
        assert_eq!(c.level(), 0);
        assert_eq!(c.inputs(0).len(), 5);
        let parents: Vec<u64> = c.inputs(1).iter().map(|f| f.number()).collect();
        assert_eq!(parents, vec![7, 8]);
        assert!(!c.is_trivial_move());
    }

    #[test]
    fn test_level0_range_is_union_of_inputs() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        version.add_file(0, meta(1, "f", "h"));
        version.add_file(0, meta(2, "b", "g"));
        version.add_file(0, meta(3, "e", "t"));
        version.add_file(0, meta(4, "c", "d"));
        version.add_file(0, meta(5, "g", "k"));
        // Only a parent overlapping the union [b, t] is selected.
        version.add_file(1, meta(6, "a", "a"));
        version.add_file(1, meta(7, "s", "u"));
        version.add_file(1, meta(8, "v", "z"));

        let c = version.pick_compaction().unwrap();
        let parents: Vec<u64> = c.inputs(1).iter().map(|f| f.number()).collect();
        assert_eq!(parents, vec![7]);
    }

    #[test]
    fn test_round_robin_cursor_picks_next_file() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        version.add_file(1, meta_sized(1, 4 * 1024 * 1024, "a", "b"));
        version.add_file(1, meta_sized(2, 4 * 1024 * 1024, "c", "d"));
        version.add_file(1, meta_sized(3, 4 * 1024 * 1024, "e", "f"));

        // No cursor: start from the first file.
        let c = version.pick_compaction().unwrap();
        assert_eq!(c.inputs(0)[0].number(), 1);

        // Cursor at file 1's upper bound: move on to file 2.
        let cursor = version.level_files(1)[0].largest().clone();
        version.compact_pointer[1] = Some(cursor);
        let c = version.pick_compaction().unwrap();
        assert_eq!(c.inputs(0)[0].number(), 2);

        // Cursor past the last file: wrap to the front.
        let cursor = version.level_files(1)[2].largest().clone();
        version.compact_pointer[1] = Some(cursor);
        let c = version.pick_compaction().unwrap();
        assert_eq!(c.inputs(0)[0].number(), 1);
    }

    #[test]
    fn test_single_file_without_parent_overlap_is_trivial_move() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        version.add_file(1, meta_sized(1, 11 * 1024 * 1024, "d", "k"));
        version.add_file(2, meta(2, "m", "z"));

        let c = version.pick_compaction().unwrap();
        assert_eq!(c.level(), 1);
        assert_eq!(c.inputs(0).len(), 1);
        assert!(c.inputs(1).is_empty());
        assert!(c.is_trivial_move());
    }

    #[test]
    fn test_parent_touching_boundary_is_included() {
        let dir = TempDir::new().unwrap();
        let mut version = Version::new(dir.path());
        version.add_file(1, meta_sized(1, 11 * 1024 * 1024, "d", "k"));
        // Shares exactly the boundary key "k" (same user key, same
        // sequence as the input's largest).
        version.add_file(2, meta(2, "k", "p"));

        let c = version.pick_compaction().unwrap();
        assert_eq!(c.inputs(1).len(), 1);
        assert!(!c.is_trivial_move());
    }
}
