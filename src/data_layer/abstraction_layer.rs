use std::path::{Path, PathBuf};

use errors::*;

/// A `DataLayer` is a byte-addressable store reachable through path strings.
///
/// Input sources, the intermediate scratch space and the output sink all sit behind this
/// trait, so the engine never touches a filesystem directly. `rename` must be atomic; it
/// is the commit point for map-task run directories and reduce-task output files.
pub trait DataLayer {
    /// Reads the bytes in `[start, end)`, clamped to the end of the file.
    fn read_range(&self, path: &Path, start: u64, end: u64) -> Result<Vec<u8>>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn file_size(&self, path: &Path) -> Result<u64>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Removes a file. A missing path is not an error.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Removes a directory and everything under it. A missing path is not an error.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn exists(&self, path: &Path) -> Result<bool>;

    fn is_file(&self, path: &Path) -> Result<bool>;

    fn is_dir(&self, path: &Path) -> Result<bool>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;
}
