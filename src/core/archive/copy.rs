use std::path::Path;

use tracing::debug;

use crate::core::error::ProvisionResult;

use super::reader::{for_each_entry, read_entry, Archive};
use super::writer::JarWriter;

/// Collision policy when the destination already has an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    SkipIfExists,
    Overwrite,
}

/// Copy one entry. Returns whether the destination changed.
pub fn copy_entry(
    src: &mut Archive,
    dst: &mut JarWriter,
    path: &str,
    mode: CopyMode,
) -> ProvisionResult<bool> {
    if mode == CopyMode::SkipIfExists && dst.contains(path) {
        return Ok(false);
    }
    let Some(data) = read_entry(src, path)? else {
        return Ok(false);
    };
    dst.put(path, data);
    Ok(true)
}

/// Copy every entry of `src` accepted by `filter`. Returns how many landed.
pub fn copy_entries<F>(
    src: &Path,
    dst: &mut JarWriter,
    filter: F,
    mode: CopyMode,
) -> ProvisionResult<usize>
where
    F: FnMut(&str) -> bool,
{
    let mut copied = 0;
    for entry in for_each_entry(src, filter)? {
        let entry = entry?;
        let added = match mode {
            CopyMode::Overwrite => {
                dst.put(&entry.path, entry.data);
                true
            }
            CopyMode::SkipIfExists => dst.put_if_absent(&entry.path, entry.data),
        };
        if added {
            copied += 1;
        }
    }
    debug!("Copied {} entries from {:?}", copied, src);
    Ok(copied)
}

/// Writer pre-filled with every entry of an existing archive.
pub fn reopen(src: &Path, dest: &Path) -> ProvisionResult<JarWriter> {
    let mut writer = JarWriter::new(dest)?;
    copy_entries(src, &mut writer, |_| true, CopyMode::Overwrite)?;
    Ok(writer)
}

/// Rewrite `target` in place with the accepted entries of `src` added.
pub fn update_archive<F>(target: &Path, src: &Path, filter: F, mode: CopyMode) -> ProvisionResult<usize>
where
    F: FnMut(&str) -> bool,
{
    let mut writer = reopen(target, target)?;
    let copied = copy_entries(src, &mut writer, filter, mode)?;
    writer.finish()?;
    Ok(copied)
}

/// `primary` in full, overlaid in order with the entries of each secondary
/// that `filter` accepts, written to `into` in one commit.
pub fn merge_archives<F>(
    primary: &Path,
    secondaries: &[&Path],
    into: &Path,
    mut filter: F,
) -> ProvisionResult<usize>
where
    F: FnMut(&str) -> bool,
{
    let mut writer = reopen(primary, into)?;
    let mut copied = 0;
    for secondary in secondaries {
        copied += copy_entries(secondary, &mut writer, &mut filter, CopyMode::Overwrite)?;
    }
    writer.finish()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::reader::{is_class_entry, open_archive, read_all};
    use crate::core::testing::write_jar;

    #[test]
    fn skip_if_exists_keeps_destination_entry() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.jar");
        write_jar(&src, &[("A.class", b"new".as_slice()), ("B.class", b"b")]);

        let out = dir.path().join("out.jar");
        let mut w = JarWriter::new(&out).unwrap();
        w.put("A.class", b"old".to_vec());
        let mut archive = open_archive(&src).unwrap();
        assert!(!copy_entry(&mut archive, &mut w, "A.class", CopyMode::SkipIfExists).unwrap());
        assert!(copy_entry(&mut archive, &mut w, "B.class", CopyMode::SkipIfExists).unwrap());
        assert!(copy_entry(&mut archive, &mut w, "A.class", CopyMode::Overwrite).unwrap());
        assert!(!copy_entry(&mut archive, &mut w, "Missing.class", CopyMode::Overwrite).unwrap());
        w.finish().unwrap();

        let entries = read_all(&out).unwrap();
        assert_eq!(entries["A.class"], b"new");
        assert_eq!(entries["B.class"], b"b");
    }

    #[test]
    fn skip_if_exists_matches_unnormalized_source_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.jar");
        write_jar(&src, &[("./B.class", b"dotted".as_slice())]);

        let out = dir.path().join("out.jar");
        let mut w = JarWriter::new(&out).unwrap();
        w.put("B.class", b"kept".to_vec());
        let mut archive = open_archive(&src).unwrap();
        assert!(!copy_entry(&mut archive, &mut w, "./B.class", CopyMode::SkipIfExists).unwrap());
        w.finish().unwrap();
        assert_eq!(read_all(&out).unwrap()["B.class"], b"kept");
    }

    #[test]
    fn update_in_place_is_atomic_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t.jar");
        let src = dir.path().join("src.jar");
        write_jar(&target, &[("A.class", b"a".as_slice())]);
        write_jar(&src, &[("A.class", b"z".as_slice()), ("C.class", b"c")]);

        let n = update_archive(&target, &src, is_class_entry, CopyMode::SkipIfExists).unwrap();
        assert_eq!(n, 1);
        let entries = read_all(&target).unwrap();
        assert_eq!(entries["A.class"], b"a");
        assert_eq!(entries["C.class"], b"c");
    }

    #[test]
    fn merge_overlays_filtered_entries() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("p.jar");
        let secondary = dir.path().join("s.jar");
        write_jar(&primary, &[("A.class", b"p".as_slice()), ("pack.mcmeta", b"p")]);
        write_jar(&secondary, &[("A.class", b"s".as_slice()), ("pack.mcmeta", b"s"), ("x.png", b"s")]);

        let last = dir.path().join("l.jar");
        write_jar(&last, &[("x.png", b"l".as_slice())]);

        let out = dir.path().join("out.jar");
        let copied =
            merge_archives(&primary, &[&secondary, &last], &out, |n| !is_class_entry(n)).unwrap();
        assert_eq!(copied, 3);
        let entries = read_all(&out).unwrap();
        assert_eq!(entries["A.class"], b"p");
        assert_eq!(entries["pack.mcmeta"], b"s");
        assert_eq!(entries["x.png"], b"l");
        assert_eq!(read_all(&primary).unwrap()["pack.mcmeta"], b"p");
    }
}
