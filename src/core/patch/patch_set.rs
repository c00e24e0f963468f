// ─── Patch Set ───
// Bundles of per-entry binary patches and the stage steps built on them.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::archive::{
    copy_entries, for_each_entry, is_class_entry, open_archive, read_entry, reopen, update_archive,
    CopyMode, JarWriter,
};
use crate::core::error::ProvisionResult;

use super::binpatch::BinPatch;

const PATCH_SUFFIX: &str = ".binpatch";

/// Ordered patches, applied in the order they were stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    pub patches: Vec<BinPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub patched: usize,
    pub added: usize,
    pub resources: usize,
}

impl PatchSet {
    pub fn new(patches: Vec<BinPatch>) -> Self {
        Self { patches }
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Read every `*.binpatch` entry of a bundle, in archive order.
    pub fn load(bundle: &Path) -> ProvisionResult<Self> {
        let mut patches = Vec::new();
        for entry in for_each_entry(bundle, |p| p.ends_with(PATCH_SUFFIX))? {
            patches.push(BinPatch::parse(&entry?.data)?);
        }
        debug!("Loaded {} patches from {:?}", patches.len(), bundle);
        Ok(Self { patches })
    }

    /// Write the set as a bundle. Entry names carry the position so the
    /// sorted archive keeps the application order.
    pub fn write_bundle(&self, bundle: &Path) -> ProvisionResult<()> {
        let mut writer = JarWriter::new(bundle)?;
        for (i, patch) in self.patches.iter().enumerate() {
            writer.put(&format!("{i:05}{PATCH_SUFFIX}"), patch.to_bytes()?);
        }
        writer.finish()?;
        Ok(())
    }
}

/// Patch `base` into `output`. The output holds the non-class resources of
/// `base` plus every patched or added entry; untouched classes are left for
/// [`copy_missing`]. Nothing is written unless every patch applies.
pub fn apply_patches(base: &Path, set: &PatchSet, output: &Path) -> ProvisionResult<PatchReport> {
    info!(
        ":applying {} patches to {:?} -> {:?}",
        set.len(),
        base,
        output
    );
    let mut writer = JarWriter::new(output)?;
    let mut report = PatchReport {
        resources: copy_entries(base, &mut writer, |p| !is_class_entry(p), CopyMode::Overwrite)?,
        ..PatchReport::default()
    };

    let mut archive = open_archive(base)?;
    for patch in &set.patches {
        let old = read_entry(&mut archive, &patch.target)?;
        let new = patch.apply(old.as_deref())?;
        writer.put(&patch.target, new);
        if patch.is_addition() {
            report.added += 1;
        } else {
            report.patched += 1;
        }
    }

    writer.finish()?;
    debug!(
        "Patched {} entries, added {}",
        report.patched, report.added
    );
    Ok(report)
}

/// Copy class entries of `base` that `output` lacks. Existing entries are
/// never overwritten.
pub fn copy_missing(base: &Path, output: &Path) -> ProvisionResult<usize> {
    info!(":copying missing classes from {:?} into {:?}", base, output);
    update_archive(output, base, is_class_entry, CopyMode::SkipIfExists)
}

/// `base` overlaid with every entry of each archive, later archives winning.
/// `output` may be `base` itself.
pub fn inject(base: &Path, archives: &[PathBuf], output: &Path) -> ProvisionResult<usize> {
    let mut writer = reopen(base, output)?;
    let mut total = 0;
    for archive in archives {
        info!(":injecting {:?} into {:?}", archive, output);
        total += copy_entries(archive, &mut writer, |_| true, CopyMode::Overwrite)?;
    }
    writer.finish()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::read_all;
    use crate::core::error::ProvisionError;
    use crate::core::testing::write_jar;

    fn base(dir: &Path) -> PathBuf {
        let path = dir.join("base.jar");
        write_jar(
            &path,
            &[
                ("A.class", b"class A original body"),
                ("B.class", b"class B original body"),
                ("C.class", b"class C original body"),
                ("data/loot.json", b"{}"),
            ],
        );
        path
    }

    fn set() -> PatchSet {
        PatchSet::new(vec![
            BinPatch::diff("A.class", Some(b"class A original body".as_slice()), b"class A patched body")
                .unwrap(),
            BinPatch::diff("B.class", Some(b"class B original body".as_slice()), b"class B patched")
                .unwrap(),
            BinPatch::diff("D.class", None, b"class D added").unwrap(),
        ])
    }

    #[test]
    fn bundle_keeps_application_order() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("client.lzma.zip");
        let mut patches = set().patches;
        patches.reverse();
        let set = PatchSet::new(patches);
        set.write_bundle(&bundle).unwrap();
        assert_eq!(PatchSet::load(&bundle).unwrap(), set);
    }

    #[test]
    fn patches_then_copy_missing_recovers_untouched_classes() {
        let dir = tempfile::tempdir().unwrap();
        let base = base(dir.path());
        let out = dir.path().join("patched.jar");

        let report = apply_patches(&base, &set(), &out).unwrap();
        assert_eq!(report, PatchReport { patched: 2, added: 1, resources: 1 });
        let entries = read_all(&out).unwrap();
        assert_eq!(
            entries.keys().cloned().collect::<Vec<_>>(),
            vec!["A.class", "B.class", "D.class", "data/loot.json"]
        );

        assert_eq!(copy_missing(&base, &out).unwrap(), 1);
        let entries = read_all(&out).unwrap();
        assert_eq!(entries["A.class"], b"class A patched body");
        assert_eq!(entries["C.class"], b"class C original body");
        assert_eq!(entries["D.class"], b"class D added");
    }

    #[test]
    fn conflict_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let base = base(dir.path());
        let out = dir.path().join("patched.jar");
        let bad = PatchSet::new(vec![
            BinPatch::diff("A.class", Some(b"class A original body".as_slice()), b"ok").unwrap(),
            BinPatch::diff("C.class", Some(b"some other pre-image".as_slice()), b"nope").unwrap(),
        ]);

        let err = apply_patches(&base, &bad, &out).unwrap_err();
        assert!(matches!(err, ProvisionError::PatchConflict { ref target, .. } if target == "C.class"));
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn inject_overwrites_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.jar");
        write_jar(&target, &[("A.class", b"a"), ("B.class", b"b")]);
        let first = dir.path().join("first.jar");
        write_jar(&first, &[("B.class", b"first"), ("x/Extra.class", b"x")]);
        let second = dir.path().join("second.jar");
        write_jar(&second, &[("B.class", b"second")]);

        assert_eq!(inject(&target, &[first, second], &target).unwrap(), 3);
        let entries = read_all(&target).unwrap();
        assert_eq!(entries["A.class"], b"a");
        assert_eq!(entries["B.class"], b"second");
        assert_eq!(entries["x/Extra.class"], b"x");
    }
}
