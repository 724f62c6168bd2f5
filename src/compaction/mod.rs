//! Compaction module: version management and the compaction process.
//!
//! Compaction reshapes the table catalog to keep reads cheap and levels
//! within their budgets: it merges the files of one level with the
//! overlapping files of the next, drops superseded versions of each user
//! key, and replaces the inputs with freshly written outputs.
//!
//! ## Strategy
//!
//! Leveled compaction in the LevelDB tradition:
//! - Level 0 holds flushed memtables and its files may overlap
//! - Levels 1 and deeper are sorted runs with disjoint key ranges
//! - Level 0 is scored by file count, deeper levels by total bytes
//!
//! ## Process
//!
//! 1. Score the levels and pick input files (picker.rs)
//! 2. Merge the inputs through a multi-way merge (merge.rs)
//! 3. Write outputs to the next level, rolling over by size
//! 4. Substitute outputs for inputs in the version (version.rs)
//! 5. Evict the replaced tables from the table cache
//!
//! A compaction with one input file and no parent overlap skips the
//! rewrite entirely and just reassigns the file (a trivial move).

pub mod merge;
pub mod picker;
pub mod version;

pub use merge::MergingIterator;
pub use picker::Compaction;
pub use version::{find_file, FileMetaData, Version, VersionSet};

use crate::config::MAX_FILE_SIZE;
use crate::error::{Error, Result};
use crate::filename::table_file_name;
use crate::memtable::InternalKey;
use crate::sstable::SSTableBuilder;
use std::cmp::Ordering;
use std::sync::Arc;

/// One in-progress compaction output table.
struct OutputState {
    builder: SSTableBuilder,
    number: u64,
    smallest: InternalKey,
    largest: InternalKey,
}

impl OutputState {
    fn finish(self) -> Result<Arc<FileMetaData>> {
        let file_size = self.builder.finish()?;
        Ok(Arc::new(FileMetaData::new(self.number, file_size, self.smallest, self.largest)))
    }
}

impl Version {
    /// Runs one compaction round, if any level is over budget.
    ///
    /// Returns `Ok(false)` when no level qualifies. On success the inputs
    /// have been replaced by the outputs at the parent level and evicted
    /// from the table cache. On failure the catalog is unchanged and the
    /// error lists the orphaned output files.
    pub fn do_compaction_work(&mut self) -> Result<bool> {
        let c = match self.pick_compaction() {
            Some(c) => c,
            None => return Ok(false),
        };
        self.apply_compaction(&c)?;
        Ok(true)
    }

    /// Executes a specific compaction and installs its result.
    pub fn apply_compaction(&mut self, c: &Compaction) -> Result<()> {
        c.log();

        if c.is_trivial_move() {
            let f = c.inputs(0)[0].clone();
            log::info!(
                "trivial move: table {} from level {} to level {}",
                f.number(),
                c.level(),
                c.level() + 1
            );
            self.delete_file(c.level(), f.number());
            self.add_file(c.level() + 1, f);
            return Ok(());
        }

        let mut orphans: Vec<u64> = Vec::new();
        let outputs = match self.merge_inputs(c, &mut orphans) {
            Ok(outputs) => outputs,
            Err(cause) => {
                log::error!("compaction at level {} aborted: {}", c.level(), cause);
                return Err(Error::CompactionAborted {
                    orphaned_files: orphans,
                    cause: Box::new(cause),
                });
            }
        };

        for f in c.inputs(0) {
            self.delete_file(c.level(), f.number());
        }
        for f in c.inputs(1) {
            self.delete_file(c.level() + 1, f.number());
        }
        if let Some(last) = outputs.last() {
            self.compact_pointer[c.level()] = Some(last.largest().clone());
        }
        let num_outputs = outputs.len();
        for meta in outputs {
            self.add_file(c.level() + 1, meta);
        }
        for f in c.inputs(0).iter().chain(c.inputs(1).iter()) {
            self.table_cache().evict(f.number());
        }

        log::info!(
            "compaction at level {} finished: {} inputs -> {} outputs",
            c.level(),
            c.inputs(0).len() + c.inputs(1).len(),
            num_outputs
        );
        Ok(())
    }

    fn make_inputs_iterator(&self, c: &Compaction) -> Result<MergingIterator> {
        let mut iterators = Vec::with_capacity(c.inputs(0).len() + c.inputs(1).len());
        for f in c.inputs(0).iter().chain(c.inputs(1).iter()) {
            iterators.push(self.table_cache().new_iterator(f.number())?);
        }
        Ok(MergingIterator::new(iterators))
    }

    /// Streams the merged inputs into size-bounded output tables.
    ///
    /// Every output number is pushed to `orphans` as soon as its file is
    /// created, so an error at any point leaves the caller a complete
    /// list of garbage files to report.
    fn merge_inputs(
        &mut self,
        c: &Compaction,
        orphans: &mut Vec<u64>,
    ) -> Result<Vec<Arc<FileMetaData>>> {
        let mut iter = self.make_inputs_iterator(c)?;
        iter.seek_to_first();

        let mut outputs: Vec<Arc<FileMetaData>> = Vec::new();
        let mut current: Option<OutputState> = None;
        let mut current_user_key: Option<Vec<u8>> = None;

        loop {
            let key = match iter.internal_key() {
                Some(key) => key.clone(),
                None => break,
            };

            if let Some(cur) = &current_user_key {
                match key.user_key().cmp(cur) {
                    Ordering::Equal => {
                        // An older version of the key just written.
                        iter.next();
                        continue;
                    }
                    Ordering::Less => {
                        return Err(Error::invariant(format!(
                            "merged user keys out of order: {:?} after {:?}",
                            String::from_utf8_lossy(key.user_key()),
                            String::from_utf8_lossy(cur),
                        )));
                    }
                    Ordering::Greater => {}
                }
            }
            current_user_key = Some(key.user_key().to_vec());

            if current.is_none() {
                let number = self.allocate_file_number();
                let builder =
                    SSTableBuilder::new(table_file_name(self.table_cache().db_path(), number))?;
                orphans.push(number);
                current = Some(OutputState {
                    builder,
                    number,
                    smallest: key.clone(),
                    largest: key.clone(),
                });
            }
            let mut over_size = false;
            if let Some(out) = current.as_mut() {
                out.builder.add(&key)?;
                out.largest = key;
                over_size = out.builder.file_size() > MAX_FILE_SIZE;
            }
            if over_size {
                if let Some(full) = current.take() {
                    outputs.push(full.finish()?);
                }
            }

            iter.next();
        }

        if let Some(out) = current.take() {
            outputs.push(out.finish()?);
        }

        Ok(outputs)
    }
}
