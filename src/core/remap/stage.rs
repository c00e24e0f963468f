// ─── Remap Stage ───
// Jar in, jar out: every class entry rewritten through the mapping table,
// everything else copied through.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::archive::{for_each_entry, is_class_entry, JarWriter};
use crate::core::classfile::parse_entry;
use crate::core::error::ProvisionResult;
use crate::core::mappings::MappingTable;

use super::hierarchy::ClassHierarchy;
use super::remapper::Remapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemapDirection {
    /// Source names of the table to target names.
    Forward,
    /// Target names back to source names, using the inverted table.
    Reverse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport {
    pub classes: usize,
    pub resources: usize,
}

/// Remap `input` into `output`. `classpath` only feeds the hierarchy and is
/// never rewritten. Nothing appears at `output` unless every entry succeeds.
pub fn remap_jar(
    input: &Path,
    output: &Path,
    table: &MappingTable,
    direction: RemapDirection,
    classpath: &[PathBuf],
    strict: bool,
) -> ProvisionResult<RemapReport> {
    info!(
        ":remapping {:?} -> {:?} ({:?}, {} classpath entries)",
        input,
        output,
        direction,
        classpath.len()
    );

    let reversed;
    let table = match direction {
        RemapDirection::Forward => table,
        RemapDirection::Reverse => {
            reversed = table.reversed();
            &reversed
        }
    };

    let hierarchy = ClassHierarchy::build(input, classpath)?;
    let remapper = Remapper::new(table, &hierarchy, strict);

    let mut writer = JarWriter::new(output)?;
    let mut report = RemapReport::default();
    for entry in for_each_entry(input, |_| true)? {
        let entry = entry?;
        if !is_class_entry(&entry.path) || is_unmappable(&entry.path) {
            writer.put(&entry.path, entry.data);
            report.resources += 1;
            continue;
        }

        let mut class = parse_entry(&entry.path, &entry.data)?;
        let name = remapper.remap_class(&mut class)?;
        writer.put(&format!("{name}.class"), class.to_bytes());
        report.classes += 1;
    }

    writer.finish()?;
    debug!(
        "Remapped {} classes, passed through {} resources",
        report.classes, report.resources
    );
    Ok(report)
}

fn is_unmappable(path: &str) -> bool {
    path.starts_with("META-INF/") || path.ends_with("module-info.class")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::read_all;
    use crate::core::classfile::ClassFile;
    use crate::core::error::ProvisionError;
    use crate::core::mappings::tsrg;
    use crate::core::testing::{write_jar, ClassBuilder};

    fn table() -> MappingTable {
        tsrg::parse("a net/minecraft/Alpha\n\tf health\n\tg (I)La; grow\nb net/minecraft/Beta\n")
            .unwrap()
    }

    fn input(dir: &Path) -> PathBuf {
        let path = dir.join("in.jar");
        write_jar(
            &path,
            &[
                (
                    "a.class",
                    &ClassBuilder::new("a")
                        .field("f", "I")
                        .field("unlisted", "J")
                        .method("g", "(I)La;")
                        .build(),
                ),
                ("b.class", &ClassBuilder::new("b").super_class("a").build()),
                ("c.class", &ClassBuilder::new("c").interface("lib/Api").build()),
                ("assets/lang.json", b"{}"),
            ],
        );
        path
    }

    fn names(path: &Path) -> Vec<String> {
        read_all(path).unwrap().into_keys().collect()
    }

    #[test]
    fn forward_renames_classes_and_passes_resources() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jar");
        let report = remap_jar(&input(dir.path()), &out, &table(), RemapDirection::Forward, &[], false)
            .unwrap();

        assert_eq!(report, RemapReport { classes: 3, resources: 1 });
        assert_eq!(
            names(&out),
            vec![
                "assets/lang.json",
                "c.class",
                "net/minecraft/Alpha.class",
                "net/minecraft/Beta.class"
            ]
        );
        let entries = read_all(&out).unwrap();
        let alpha = ClassFile::parse(&entries["net/minecraft/Alpha.class"]).unwrap();
        assert_eq!(alpha.fields[0].name(&alpha.pool).unwrap(), "health");
        assert_eq!(alpha.methods[0].name(&alpha.pool).unwrap(), "grow");
        assert_eq!(
            alpha.methods[0].descriptor(&alpha.pool).unwrap(),
            "(I)Lnet/minecraft/Alpha;"
        );
    }

    #[test]
    fn reverse_restores_covered_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let original = input(dir.path());
        let there = dir.path().join("there.jar");
        let back = dir.path().join("back.jar");
        remap_jar(&original, &there, &table(), RemapDirection::Forward, &[], false).unwrap();
        remap_jar(&there, &back, &table(), RemapDirection::Reverse, &[], false).unwrap();

        assert_eq!(names(&back), names(&original));
        let entries = read_all(&back).unwrap();
        let a = ClassFile::parse(&entries["a.class"]).unwrap();
        let fields: Vec<String> = a.fields.iter().map(|f| f.name(&a.pool).unwrap()).collect();
        assert_eq!(fields, vec!["f", "unlisted"]);
        assert_eq!(a.methods[0].name(&a.pool).unwrap(), "g");
        assert_eq!(a.methods[0].descriptor(&a.pool).unwrap(), "(I)La;");
        let b = ClassFile::parse(&entries["b.class"]).unwrap();
        assert_eq!(b.super_name().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn strict_failure_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.jar");
        let err = remap_jar(&input(dir.path()), &out, &table(), RemapDirection::Forward, &[], true)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::UnmappedSymbol(_)));
        assert!(!out.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn classpath_supplies_inherited_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.jar");
        write_jar(
            &lib,
            &[("a.class", &ClassBuilder::new("a").field("f", "I").build())],
        );
        let jar = dir.path().join("in.jar");
        write_jar(
            &jar,
            &[(
                "z.class",
                &ClassBuilder::new("z")
                    .super_class("a")
                    .method_with_code("read", "()I", |pool| {
                        let owner = pool.intern_class("z").unwrap();
                        let nat = pool.intern_name_and_type("f", "I").unwrap();
                        let f = pool
                            .intern(crate::core::classfile::Constant::FieldRef {
                                class: owner,
                                name_and_type: nat,
                            })
                            .unwrap();
                        let [h, l] = f.to_be_bytes();
                        vec![0x2a, 0xb4, h, l, 0xac]
                    })
                    .build(),
            )],
        );

        let out = dir.path().join("out.jar");
        remap_jar(&jar, &out, &table(), RemapDirection::Forward, &[lib.clone()], false).unwrap();
        assert_eq!(names(&out), vec!["z.class"]);
        assert!(lib.is_file());

        let z = ClassFile::parse(&read_all(&out).unwrap()["z.class"]).unwrap();
        let refs: Vec<_> = z
            .pool
            .iter()
            .filter(|(_, c)| matches!(c, crate::core::classfile::Constant::FieldRef { .. }))
            .map(|(i, _)| z.pool.member_ref(i).unwrap())
            .collect();
        assert_eq!(
            refs,
            vec![("z".to_string(), "health".to_string(), "I".to_string())]
        );
    }
}
