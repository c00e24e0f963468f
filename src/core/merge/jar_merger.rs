// ─── Jar Merger ───
// Client + server → one merged jar. Two algorithms, selected by profile:
//
//   Structural      : entry-by-entry reconciliation, shared classes merged
//                     member by member, exclusive content marked by side.
//   ResourceOverlay : a patched client is taken verbatim and only non-class
//                     resources of both raw jars are laid over it.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::core::archive::{is_class_entry, merge_archives, read_all, JarWriter};
use crate::core::cache::layout::Side;
use crate::core::classfile::parse_entry;
use crate::core::error::ProvisionResult;

use super::class_merger::merge_classes;
use super::markers::mark_class;
use super::synthetic::apply_param_offset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    #[default]
    Structural,
    ResourceOverlay,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Classes present on both sides with differing bytes.
    pub merged: usize,
    /// Entries byte-identical on both sides.
    pub identical: usize,
    pub client_only: usize,
    pub server_only: usize,
    /// Resources present on both sides with differing bytes (client kept).
    pub conflicting_resources: usize,
}

/// Jar signature files no longer verify once the content changes.
fn is_signature_file(path: &str) -> bool {
    let Some(name) = path.strip_prefix("META-INF/") else {
        return false;
    };
    !name.contains('/')
        && [".SF", ".RSA", ".DSA", ".EC"]
            .iter()
            .any(|ext| name.to_ascii_uppercase().ends_with(ext))
}

fn mark_single_side(
    entry: &str,
    data: Vec<u8>,
    side: Side,
    synthetic_offset: bool,
) -> ProvisionResult<Vec<u8>> {
    if !is_class_entry(entry) {
        return Ok(data);
    }
    let mut class = parse_entry(entry, &data)?;
    mark_class(&mut class, side)?;
    if synthetic_offset {
        apply_param_offset(&mut class)?;
    }
    Ok(class.to_bytes())
}

fn offset_params(entry: &str, data: Vec<u8>) -> ProvisionResult<Vec<u8>> {
    let mut class = parse_entry(entry, &data)?;
    if apply_param_offset(&mut class)? {
        Ok(class.to_bytes())
    } else {
        Ok(data)
    }
}

/// Structural merge of `client` and `server` into `output`. Output entries
/// are sorted and timestamps fixed, so equal inputs give equal bytes.
pub fn merge_jars(
    client: &Path,
    server: &Path,
    output: &Path,
    synthetic_offset: bool,
) -> ProvisionResult<MergeReport> {
    info!(":merging jars {:?} + {:?} -> {:?}", client, server, output);

    let mut client_entries = read_all(client)?;
    let mut server_entries = read_all(server)?;
    let paths: BTreeSet<String> = client_entries
        .keys()
        .chain(server_entries.keys())
        .filter(|p| !is_signature_file(p))
        .cloned()
        .collect();

    let mut writer = JarWriter::new(output)?;
    let mut report = MergeReport::default();

    for path in paths {
        let is_class = is_class_entry(&path);
        let data = match (client_entries.remove(&path), server_entries.remove(&path)) {
            (Some(c), Some(s)) if c == s => {
                report.identical += 1;
                if is_class && synthetic_offset {
                    offset_params(&path, c)?
                } else {
                    c
                }
            }
            (Some(c), Some(s)) if is_class => {
                report.merged += 1;
                let merged = merge_classes(&path, &c, &s)?;
                if synthetic_offset {
                    offset_params(&path, merged)?
                } else {
                    merged
                }
            }
            (Some(c), Some(_)) => {
                trace!("Resource {} differs between sides, keeping client copy", path);
                report.conflicting_resources += 1;
                c
            }
            (Some(c), None) => {
                report.client_only += 1;
                mark_single_side(&path, c, Side::Client, synthetic_offset)?
            }
            (None, Some(s)) => {
                report.server_only += 1;
                mark_single_side(&path, s, Side::Server, synthetic_offset)?
            }
            (None, None) => continue,
        };
        writer.put(&path, data);
    }

    writer.finish()?;
    debug!(
        "Merge done: {} merged, {} identical, {} client-only, {} server-only",
        report.merged, report.identical, report.client_only, report.server_only
    );
    Ok(report)
}

/// Resource-overlay merge: the patched client verbatim, then every non-class
/// entry of the raw client and server jars on top. Returns the number of
/// overlaid resources.
pub fn overlay_resources(
    patched_client: &Path,
    client_raw: &Path,
    server_raw: &Path,
    output: &Path,
) -> ProvisionResult<usize> {
    info!(
        ":merging jars by resource overlay onto {:?} -> {:?}",
        patched_client, output
    );
    let resources = |p: &str| !is_class_entry(p) && !is_signature_file(p);
    merge_archives(patched_client, &[client_raw, server_raw], output, resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classfile::ClassFile;
    use crate::core::error::ProvisionError;
    use crate::core::merge::markers::environment_of;
    use crate::core::testing::{write_jar, ClassBuilder};
    use std::path::PathBuf;

    fn inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let client = dir.join("client.jar");
        let server = dir.join("server.jar");
        let shared = ClassBuilder::new("Shared").field("x", "I").build();
        write_jar(
            &client,
            &[
                ("Shared.class", &shared),
                ("Both.class", &ClassBuilder::new("Both").method("render", "()V").build()),
                ("Screen.class", &ClassBuilder::new("Screen").build()),
                ("pack.mcmeta", b"client"),
                ("META-INF/MOJANGCS.SF", b"sig"),
            ],
        );
        write_jar(
            &server,
            &[
                ("Both.class", &ClassBuilder::new("Both").method("save", "()V").build()),
                ("Shared.class", &shared),
                ("Dedicated.class", &ClassBuilder::new("Dedicated").build()),
                ("pack.mcmeta", b"server"),
                ("log4j2.xml", b"<Configuration/>"),
            ],
        );
        (client, server)
    }

    fn side_of(entries: &std::collections::BTreeMap<String, Vec<u8>>, path: &str) -> Option<Side> {
        let class = ClassFile::parse(&entries[path]).unwrap();
        environment_of(&class.pool, &class.attributes).unwrap()
    }

    #[test]
    fn structural_merge_marks_exclusive_classes() {
        let dir = tempfile::tempdir().unwrap();
        let (client, server) = inputs(dir.path());
        let out = dir.path().join("merged.jar");
        let report = merge_jars(&client, &server, &out, true).unwrap();

        assert_eq!(
            report,
            MergeReport {
                merged: 1,
                identical: 1,
                client_only: 1,
                server_only: 2,
                conflicting_resources: 1,
            }
        );
        let entries = read_all(&out).unwrap();
        assert!(!entries.contains_key("META-INF/MOJANGCS.SF"));
        assert_eq!(entries["pack.mcmeta"], b"client");
        assert_eq!(side_of(&entries, "Screen.class"), Some(Side::Client));
        assert_eq!(side_of(&entries, "Dedicated.class"), Some(Side::Server));
        assert_eq!(side_of(&entries, "Shared.class"), None);

        let both = ClassFile::parse(&entries["Both.class"]).unwrap();
        let methods: Vec<String> = both.methods.iter().map(|m| m.name(&both.pool).unwrap()).collect();
        assert_eq!(methods, vec!["render", "save"]);
    }

    #[test]
    fn merge_output_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let (client, server) = inputs(dir.path());
        let first = dir.path().join("first.jar");
        let second = dir.path().join("second.jar");
        merge_jars(&client, &server, &first, true).unwrap();
        merge_jars(&client, &server, &second, true).unwrap();
        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }

    #[test]
    fn corrupt_input_is_reported_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = inputs(dir.path());
        let broken = dir.path().join("broken.jar");
        std::fs::write(&broken, b"PK\x03\x04 definitely not a zip").unwrap();
        let out = dir.path().join("merged.jar");

        let err = merge_jars(&client, &broken, &out, false).unwrap_err();
        assert!(matches!(err, ProvisionError::ArchiveCorrupt { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn overlay_keeps_patched_classes_and_adds_resources() {
        let dir = tempfile::tempdir().unwrap();
        let (client, server) = inputs(dir.path());
        let patched = dir.path().join("patched.jar");
        write_jar(
            &patched,
            &[("Screen.class", b"patched"), ("Dedicated.class", b"patched too")],
        );
        let out = dir.path().join("merged.jar");
        let copied = overlay_resources(&patched, &client, &server, &out).unwrap();

        assert_eq!(copied, 3);
        let entries = read_all(&out).unwrap();
        assert_eq!(
            entries.keys().cloned().collect::<Vec<_>>(),
            vec!["Dedicated.class", "Screen.class", "log4j2.xml", "pack.mcmeta"]
        );
        assert_eq!(entries["Screen.class"], b"patched");
        assert_eq!(entries["pack.mcmeta"], b"server");
    }

    #[test]
    fn overlay_with_corrupt_server_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = inputs(dir.path());
        let server = dir.path().join("broken-server.jar");
        std::fs::write(&server, b"not a jar").unwrap();
        let patched = dir.path().join("patched.jar");
        write_jar(&patched, &[("Screen.class", b"patched".as_slice())]);
        let out = dir.path().join("merged.jar");

        let err = overlay_resources(&patched, &client, &server, &out).unwrap_err();
        assert!(matches!(err, ProvisionError::ArchiveCorrupt { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn signature_files_are_recognised() {
        assert!(is_signature_file("META-INF/MOJANGCS.SF"));
        assert!(is_signature_file("META-INF/mojangcs.rsa"));
        assert!(!is_signature_file("META-INF/MANIFEST.MF"));
        assert!(!is_signature_file("META-INF/versions/9/a.SF"));
    }
}
