// ─── Class Hierarchy ───
// Supertype graph over the input artifact and its classpath, used to find
// which class a member reference actually resolves to.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::archive::{for_each_entry, is_class_entry};
use crate::core::classfile::{parse_entry, ClassFile};
use crate::core::error::ProvisionResult;

#[derive(Debug, Clone, Default)]
pub struct ClassNode {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: HashSet<String>,
    pub methods: HashSet<(String, String)>,
}

impl ClassNode {
    pub fn from_class(class: &ClassFile) -> ProvisionResult<Self> {
        let pool = &class.pool;
        Ok(Self {
            name: class.name()?,
            super_name: class.super_name()?,
            interfaces: class.interface_names()?,
            fields: class
                .fields
                .iter()
                .map(|f| f.name(pool))
                .collect::<ProvisionResult<_>>()?,
            methods: class
                .methods
                .iter()
                .map(|m| Ok((m.name(pool)?, m.descriptor(pool)?)))
                .collect::<ProvisionResult<_>>()?,
        })
    }
}

#[derive(Debug, Default)]
pub struct ClassHierarchy {
    nodes: HashMap<String, ClassNode>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First definition of a name wins, so the input artifact should be
    /// added before its classpath.
    pub fn insert(&mut self, node: ClassNode) {
        self.nodes.entry(node.name.clone()).or_insert(node);
    }

    pub fn get(&self, name: &str) -> Option<&ClassNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Index every class in `path`. Classes that fail to parse are fatal for
    /// the input artifact but only skipped for classpath entries.
    pub fn add_archive(&mut self, path: &Path, lenient: bool) -> ProvisionResult<usize> {
        let mut added = 0;
        for entry in for_each_entry(path, is_class_entry)? {
            let entry = entry?;
            if entry.path.starts_with("META-INF/") {
                continue;
            }
            let node = match parse_entry(&entry.path, &entry.data).and_then(|c| ClassNode::from_class(&c)) {
                Ok(node) => node,
                Err(e) if lenient => {
                    warn!("Skipping unreadable class {} in {:?}: {}", entry.path, path, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.insert(node);
            added += 1;
        }
        debug!("Indexed {} classes from {:?}", added, path);
        Ok(added)
    }

    /// Index the input artifact, then each classpath archive.
    pub fn build(input: &Path, classpath: &[impl AsRef<Path>]) -> ProvisionResult<Self> {
        let mut hierarchy = Self::new();
        hierarchy.add_archive(input, false)?;
        for lib in classpath {
            hierarchy.add_archive(lib.as_ref(), true)?;
        }
        Ok(hierarchy)
    }

    /// `name` and every known supertype: the superclass chain first, then
    /// interfaces breadth-first. Unknown types end their branch.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut out = vec![name.to_string()];
        let mut seen: HashSet<String> = out.iter().cloned().collect();
        let mut interfaces = VecDeque::new();

        let mut current = self.nodes.get(name);
        while let Some(node) = current {
            interfaces.extend(node.interfaces.iter().cloned());
            current = match &node.super_name {
                Some(sup) if seen.insert(sup.clone()) => {
                    out.push(sup.clone());
                    self.nodes.get(sup)
                }
                _ => None,
            };
        }

        while let Some(itf) = interfaces.pop_front() {
            if !seen.insert(itf.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&itf) {
                interfaces.extend(node.interfaces.iter().cloned());
            }
            out.push(itf);
        }
        out
    }

    /// Class that declares the field `name` as seen from `owner`.
    pub fn resolve_field(&self, owner: &str, name: &str) -> Option<String> {
        self.ancestors(owner)
            .into_iter()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.fields.contains(name)))
    }

    /// Class that declares `name desc` as seen from `owner`.
    pub fn resolve_method(&self, owner: &str, name: &str, desc: &str) -> Option<String> {
        let key = (name.to_string(), desc.to_string());
        self.ancestors(owner)
            .into_iter()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.methods.contains(&key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{write_jar, ClassBuilder};

    fn hierarchy() -> ClassHierarchy {
        let mut h = ClassHierarchy::new();
        for bytes in [
            ClassBuilder::new("a").super_class("b").interface("i").build(),
            ClassBuilder::new("b").field("x", "I").method("m", "()V").build(),
            ClassBuilder::new("i").interface("j").build(),
            ClassBuilder::new("j").method("run", "()V").build(),
        ] {
            let class = ClassFile::parse(&bytes).unwrap();
            h.insert(ClassNode::from_class(&class).unwrap());
        }
        h
    }

    #[test]
    fn ancestors_walk_supers_then_interfaces() {
        assert_eq!(
            hierarchy().ancestors("a"),
            vec!["a", "b", "java/lang/Object", "i", "j"]
        );
    }

    #[test]
    fn members_resolve_to_their_declaring_class() {
        let h = hierarchy();
        assert_eq!(h.resolve_field("a", "x").as_deref(), Some("b"));
        assert_eq!(h.resolve_method("a", "m", "()V").as_deref(), Some("b"));
        assert_eq!(h.resolve_method("a", "run", "()V").as_deref(), Some("j"));
        assert_eq!(h.resolve_method("a", "m", "(I)V"), None);
    }

    #[test]
    fn classpath_garbage_is_skipped_but_input_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.jar");
        write_jar(
            &lib,
            &[
                ("Bad.class", b"nope".as_slice()),
                ("Good.class", &ClassBuilder::new("Good").build()),
            ],
        );

        let mut h = ClassHierarchy::new();
        assert_eq!(h.add_archive(&lib, true).unwrap(), 1);
        assert!(h.contains("Good"));
        assert!(h.add_archive(&lib, false).is_err());
    }
}
