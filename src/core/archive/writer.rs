use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::core::cache::StagedFile;
use crate::core::error::{ProvisionError, ProvisionResult};

use super::reader::normalize_entry_path;

/// Collects entries in memory and writes them as one deterministic jar:
/// sorted paths, implied parent directories, fixed timestamps. Nothing
/// appears at the destination until [`JarWriter::finish`] succeeds.
pub struct JarWriter {
    staged: StagedFile,
    entries: BTreeMap<String, Vec<u8>>,
}

impl JarWriter {
    pub fn new(dest: &Path) -> ProvisionResult<Self> {
        Ok(Self {
            staged: StagedFile::new(dest)?,
            entries: BTreeMap::new(),
        })
    }

    pub fn destination(&self) -> &Path {
        self.staged.destination()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize_entry_path(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Insert or replace an entry.
    pub fn put(&mut self, path: &str, data: Vec<u8>) {
        self.entries.insert(normalize_entry_path(path), data);
    }

    /// Insert unless an entry already exists. Returns whether it was added.
    pub fn put_if_absent(&mut self, path: &str, data: Vec<u8>) -> bool {
        let key = normalize_entry_path(path);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, data);
        true
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.entries.remove(&normalize_entry_path(path))
    }

    /// Write the archive and move it into place.
    pub fn finish(self) -> ProvisionResult<PathBuf> {
        let temp = self.staged.path().to_path_buf();
        write_zip(&temp, &self.entries)?;
        debug!(
            "Wrote {} entries to {:?}",
            self.entries.len(),
            self.staged.destination()
        );
        self.staged.commit()
    }
}

fn write_zip(path: &Path, entries: &BTreeMap<String, Vec<u8>>) -> ProvisionResult<()> {
    let file = File::create(path).map_err(|e| ProvisionError::io(path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let file_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let dir_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o755);

    let mut dirs = BTreeSet::new();
    for name in entries.keys() {
        let mut end = 0;
        while let Some(pos) = name[end..].find('/') {
            end += pos + 1;
            dirs.insert(name[..end].to_string());
        }
    }

    // Directories and files interleaved in one sorted sequence.
    let mut all: BTreeMap<&str, Option<&[u8]>> = BTreeMap::new();
    for d in &dirs {
        all.insert(d.as_str(), None);
    }
    for (name, data) in entries {
        all.insert(name.as_str(), Some(data.as_slice()));
    }

    for (name, data) in all {
        match data {
            None => zip.add_directory(name, dir_options)?,
            Some(bytes) => {
                zip.start_file(name, file_options)?;
                zip.write_all(bytes).map_err(|e| ProvisionError::io(path, e))?;
            }
        }
    }

    let mut inner = zip.finish()?;
    inner.flush().map_err(|e| ProvisionError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::reader::{open_archive, read_all};

    #[test]
    fn output_is_byte_identical_for_same_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");

        let mut w = JarWriter::new(&a).unwrap();
        w.put("net/minecraft/B.class", vec![2]);
        w.put("net/minecraft/A.class", vec![1]);
        w.finish().unwrap();

        let mut w = JarWriter::new(&b).unwrap();
        w.put("net/minecraft/A.class", vec![1]);
        w.put("net/minecraft/B.class", vec![2]);
        w.finish().unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn implied_directories_precede_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jar");
        let mut w = JarWriter::new(&out).unwrap();
        w.put("a/b/C.class", vec![0]);
        assert!(!w.put_if_absent("a/b/C.class", vec![9]));
        w.finish().unwrap();

        let archive = open_archive(&out).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("a/") < pos("a/b/"));
        assert!(pos("a/b/") < pos("a/b/C.class"));
        assert_eq!(read_all(&out).unwrap()["a/b/C.class"], vec![0]);
    }

    #[test]
    fn lookups_use_the_stored_form_of_a_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = JarWriter::new(&dir.path().join("out.jar")).unwrap();
        w.put("a/B.class", vec![1]);
        assert!(w.contains("./a/B.class"));
        assert!(w.contains("a\\B.class"));
        assert!(w.contains("/a/B.class"));
        assert_eq!(w.remove("./a/B.class"), Some(vec![1]));
        assert!(w.is_empty());
    }

    #[test]
    fn dropped_writer_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jar");
        {
            let mut w = JarWriter::new(&out).unwrap();
            w.put("x", vec![1]);
        }
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
