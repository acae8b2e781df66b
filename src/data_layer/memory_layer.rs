use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use data_layer::abstraction_layer::DataLayer;
use errors::*;

#[derive(Default)]
struct Inner {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
}

/// `MemoryDataLayer` is an in-memory store used by tests and by callers whose input is
/// not on disk. It implements the same commit semantics as the filesystem layers:
/// `rename` atomically moves a file or an entire directory subtree.
#[derive(Default)]
pub struct MemoryDataLayer {
    inner: Mutex<Inner>,
}

impl MemoryDataLayer {
    pub fn new() -> Self {
        Default::default()
    }
}

fn add_dir_chain(dirs: &mut HashSet<PathBuf>, path: &Path) {
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component.as_os_str());
        dirs.insert(current.clone());
    }
}

fn swap_prefix(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    match path.strip_prefix(from) {
        Ok(rest) => Some(to.join(rest)),
        Err(_) => None,
    }
}

impl DataLayer for MemoryDataLayer {
    fn read_range(&self, path: &Path, start: u64, end: u64) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let data = inner.files.get(path).ok_or_else(|| {
            format!("unable to open file {:?}", path)
        })?;
        let start = (start as usize).min(data.len());
        let end = (end as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let data = inner.files.get(path).ok_or_else(|| {
            format!("unable to open file {:?}", path)
        })?;
        Ok(data.clone())
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(parent) = path.parent() {
            add_dir_chain(&mut inner.dirs, parent);
        }
        inner.files.insert(PathBuf::from(path), data.to_vec());
        Ok(())
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        let data = inner.files.get(path).ok_or_else(|| {
            format!("unable to stat file {:?}", path)
        })?;
        Ok(data.len() as u64)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        if inner.files.contains_key(from) {
            let data = inner.files.remove(from).ok_or_else(|| {
                format!("unable to rename {:?}", from)
            })?;
            if let Some(parent) = to.parent() {
                add_dir_chain(&mut inner.dirs, parent);
            }
            inner.files.insert(PathBuf::from(to), data);
            return Ok(());
        }

        if !inner.dirs.contains(from) {
            return Err(format!("unable to rename {:?}: no such file or directory", from).into());
        }

        let moved_files: Vec<(PathBuf, PathBuf)> = inner
            .files
            .keys()
            .filter_map(|path| {
                swap_prefix(path, from, to).map(|new_path| (path.clone(), new_path))
            })
            .collect();
        for (old_path, new_path) in moved_files {
            let data = inner.files.remove(&old_path).ok_or_else(|| {
                format!("unable to rename {:?}", old_path)
            })?;
            inner.files.insert(new_path, data);
        }

        let moved_dirs: Vec<(PathBuf, PathBuf)> = inner
            .dirs
            .iter()
            .filter_map(|path| {
                swap_prefix(path, from, to).map(|new_path| (path.clone(), new_path))
            })
            .collect();
        for (old_path, new_path) in moved_dirs {
            inner.dirs.remove(&old_path);
            inner.dirs.insert(new_path);
        }

        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let doomed_files: Vec<PathBuf> = inner
            .files
            .keys()
            .filter(|entry| entry.starts_with(path))
            .cloned()
            .collect();
        for entry in doomed_files {
            inner.files.remove(&entry);
        }
        let doomed_dirs: Vec<PathBuf> = inner
            .dirs
            .iter()
            .filter(|entry| entry.starts_with(path))
            .cloned()
            .collect();
        for entry in doomed_dirs {
            inner.dirs.remove(&entry);
        }
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let inner = self.inner.lock().unwrap();
        if !inner.dirs.contains(path) {
            return Err(format!("unable to read directory {:?}", path).into());
        }
        let mut entries: Vec<PathBuf> = inner
            .files
            .keys()
            .chain(inner.dirs.iter())
            .filter(|entry| entry.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.files.contains_key(path) || inner.dirs.contains(path))
    }

    fn is_file(&self, path: &Path) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.files.contains_key(path))
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.dirs.contains(path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        add_dir_chain(&mut inner.dirs, path);
        Ok(())
    }
}
