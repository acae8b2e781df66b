use std::fs;
use std::fs::{DirEntry, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use data_layer::abstraction_layer::DataLayer;
use errors::*;

/// `LocalDataLayer` serves paths from the local filesystem, rooted at a given directory.
///
/// A path handed to the engine is treated as absolute within the root, so the same job
/// description works against any mount point.
pub struct LocalDataLayer {
    root_path: PathBuf,
}

impl LocalDataLayer {
    pub fn new(root_path: &Path) -> Self {
        LocalDataLayer { root_path: PathBuf::from(root_path) }
    }

    fn absolute_path(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            let relative_path = path.strip_prefix("/").chain_err(
                || "Error occured stripping prefix",
            )?;
            Ok(self.root_path.join(relative_path))
        } else {
            Ok(self.root_path.join(path))
        }
    }

    fn abstracted_path(&self, path: &Path) -> Result<PathBuf> {
        if path.starts_with(self.root_path.clone()) {
            let abstracted_path = path.strip_prefix(self.root_path.as_path()).chain_err(
                || "Unable to strip prefix from path",
            )?;
            return Ok(Path::new("/").join(abstracted_path));
        }
        Ok(PathBuf::from(path))
    }
}

impl DataLayer for LocalDataLayer {
    fn read_range(&self, path: &Path, start: u64, end: u64) -> Result<Vec<u8>> {
        let file_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        let mut file = File::open(file_path.clone()).chain_err(|| {
            format!("unable to open file {:?}", file_path)
        })?;

        let file_size = file.metadata()
            .chain_err(|| format!("unable to stat file {:?}", file_path))?
            .len();
        let start = start.min(file_size);
        let end = end.min(file_size);

        file.seek(SeekFrom::Start(start)).chain_err(|| {
            format!("unable to seek file {:?}", file_path)
        })?;
        let mut buffer = vec![0; (end - start) as usize];
        file.read_exact(&mut buffer).chain_err(|| {
            format!("unable to read range of file {:?}", file_path)
        })?;
        Ok(buffer)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let file_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        let mut file = File::open(file_path.clone()).chain_err(|| {
            format!("unable to open file {:?}", file_path)
        })?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).chain_err(|| {
            format!("unable to read content of {:?}", file_path)
        })?;
        Ok(buffer)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let file_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        debug!("Writing file: {}", file_path.to_string_lossy());
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(file_path.clone())
            .chain_err(|| format!("unable to create file {:?}", file_path))?;
        file.write_all(data).chain_err(|| {
            format!("unable to write content to {:?}", file_path)
        })?;
        Ok(())
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        let file_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        let metadata = fs::metadata(file_path.clone()).chain_err(|| {
            format!("unable to stat file {:?}", file_path)
        })?;
        Ok(metadata.len())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.absolute_path(from).chain_err(|| "Unable to get path")?;
        let to_path = self.absolute_path(to).chain_err(|| "Unable to get path")?;
        debug!(
            "Renaming {} to {}",
            from_path.to_string_lossy(),
            to_path.to_string_lossy()
        );
        fs::rename(&from_path, &to_path).chain_err(|| {
            format!("unable to rename {:?} to {:?}", from_path, to_path)
        })
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let file_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        if !file_path.exists() {
            return Ok(());
        }
        fs::remove_file(&file_path).chain_err(|| {
            format!("unable to remove file {:?}", file_path)
        })
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let dir_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        if !dir_path.exists() {
            return Ok(());
        }
        debug!("Removing directory: {:?}", dir_path);
        fs::remove_dir_all(&dir_path).chain_err(|| {
            format!("unable to remove directory {:?}", dir_path)
        })
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let absolute_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        let entries = fs::read_dir(absolute_path.as_path()).chain_err(
            || "Unable to read input directory",
        )?;
        let mut abstracted_entries: Vec<PathBuf> = vec![];
        for entry in entries {
            let entry: DirEntry = entry.chain_err(|| "Error reading input directory")?;
            let abstracted_path = self.abstracted_path(&entry.path()).chain_err(
                || "Unable to get abstracted path",
            )?;
            abstracted_entries.push(abstracted_path);
        }
        abstracted_entries.sort();
        Ok(abstracted_entries)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let absolute_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        Ok(absolute_path.exists())
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        let absolute_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        Ok(absolute_path.is_file())
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        let absolute_path = self.absolute_path(path).chain_err(|| "Unable to get path")?;
        Ok(absolute_path.is_dir())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let absolute_path = self.absolute_path(path).chain_err(
            || "Unable to get absolute_path",
        )?;
        debug!("Creating directory: {:?}", absolute_path);
        fs::create_dir_all(absolute_path.as_path()).chain_err(
            || "Unable to create directories",
        )
    }
}
