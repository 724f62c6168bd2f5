//! Filesystem naming conventions for files under the database directory.

use std::path::{Path, PathBuf};

/// Path of the SST file with the given number: `<db>/<number>.sst`.
pub fn table_file_name(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("{:06}.sst", number))
}

/// Path of the descriptor snapshot with the given number:
/// `<db>/MANIFEST-<number>`.
pub fn descriptor_file_name(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("MANIFEST-{:06}", number))
}
