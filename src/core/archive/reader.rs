use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::core::error::{ProvisionError, ProvisionResult};

/// An open zip container that remembers where it came from, so read
/// failures can name it.
pub struct Archive {
    zip: ZipArchive<BufReader<File>>,
    path: PathBuf,
}

impl Archive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.zip.file_names()
    }
}

fn corrupt(path: &Path, source: ZipError) -> ProvisionError {
    ProvisionError::ArchiveCorrupt {
        path: path.to_path_buf(),
        source,
    }
}

/// A file entry read out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub data: Vec<u8>,
}

/// Open a zip container. An unreadable container is `ArchiveCorrupt`.
pub fn open_archive(path: &Path) -> ProvisionResult<Archive> {
    let file = File::open(path).map_err(|e| ProvisionError::io(path, e))?;
    let zip = ZipArchive::new(BufReader::new(file)).map_err(|source| corrupt(path, source))?;
    Ok(Archive {
        zip,
        path: path.to_path_buf(),
    })
}

pub fn is_class_entry(name: &str) -> bool {
    name.ends_with(".class")
}

/// Forward slashes, no leading `/` or `./`. Case is preserved.
pub fn normalize_entry_path(name: &str) -> String {
    let mut s = name.replace('\\', "/");
    loop {
        if let Some(rest) = s.strip_prefix("./") {
            s = rest.to_owned();
        } else if let Some(rest) = s.strip_prefix('/') {
            s = rest.to_owned();
        } else {
            break;
        }
    }
    s
}

/// Lazily yields file entries accepted by a predicate. Each call to
/// [`for_each_entry`] opens the archive afresh, so iteration can be restarted.
pub struct EntryIter<P> {
    archive: Archive,
    next: usize,
    predicate: P,
}

pub fn for_each_entry<P>(path: &Path, predicate: P) -> ProvisionResult<EntryIter<P>>
where
    P: FnMut(&str) -> bool,
{
    Ok(EntryIter {
        archive: open_archive(path)?,
        next: 0,
        predicate,
    })
}

impl<P> Iterator for EntryIter<P>
where
    P: FnMut(&str) -> bool,
{
    type Item = ProvisionResult<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.archive.len() {
            let i = self.next;
            self.next += 1;

            let (name, data) = match read_index(&mut self.archive, i, &mut self.predicate) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            };
            return Some(Ok(ArchiveEntry { path: name, data }));
        }
        None
    }
}

/// Every file entry of an archive, keyed by normalized path.
pub fn read_all(path: &Path) -> ProvisionResult<BTreeMap<String, Vec<u8>>> {
    for_each_entry(path, |_| true)?
        .map(|e| e.map(|e| (e.path, e.data)))
        .collect()
}

/// Name and data of entry `i` if it is a file the predicate accepts.
/// A body that fails to inflate or verify makes the archive corrupt.
fn read_index<P>(
    archive: &mut Archive,
    i: usize,
    predicate: &mut P,
) -> ProvisionResult<Option<(String, Vec<u8>)>>
where
    P: FnMut(&str) -> bool,
{
    let mut file = match archive.zip.by_index(i) {
        Ok(f) => f,
        Err(source) => return Err(corrupt(&archive.path, source)),
    };
    if file.is_dir() {
        return Ok(None);
    }
    let name = normalize_entry_path(file.name());
    if !predicate(&name) {
        return Ok(None);
    }
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| corrupt(&archive.path, ZipError::Io(e)))?;
    Ok(Some((name, data)))
}

/// Contents of a single entry, `None` if absent.
pub fn read_entry(archive: &mut Archive, name: &str) -> ProvisionResult<Option<Vec<u8>>> {
    let mut file = match archive.zip.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(source) => return Err(corrupt(&archive.path, source)),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| corrupt(&archive.path, ZipError::Io(e)))?;
    Ok(Some(data))
}
