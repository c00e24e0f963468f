use std::path::Path;

use indexmap::IndexMap;

use crate::core::classfile::descriptor;
use crate::core::error::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub deobf: String,
    /// Descriptor in the source namespace, when the format carries one.
    pub descriptor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    pub obf: String,
    pub deobf: String,
    pub fields: IndexMap<String, FieldMapping>,
    /// `(name, descriptor)` in the source namespace → new name.
    pub methods: IndexMap<(String, String), String>,
}

impl ClassMapping {
    pub fn new(obf: impl Into<String>, deobf: impl Into<String>) -> Self {
        Self {
            obf: obf.into(),
            deobf: deobf.into(),
            fields: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }
}

/// Ordered class/member rename rules, keyed by source-namespace names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    classes: IndexMap<String, ClassMapping>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TSRG file from disk.
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ProvisionError::io(path, e))?;
        super::tsrg::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    pub fn class(&self, obf: &str) -> Option<&ClassMapping> {
        self.classes.get(obf)
    }

    pub fn insert_class(&mut self, mapping: ClassMapping) -> &mut ClassMapping {
        let key = mapping.obf.clone();
        self.classes.entry(key).or_insert(mapping)
    }

    pub fn class_mut(&mut self, obf: &str) -> Option<&mut ClassMapping> {
        self.classes.get_mut(obf)
    }

    /// New name of a class. Nested classes without their own rule follow
    /// their outer class (`a$b` becomes `Outer$b`).
    pub fn map_class(&self, name: &str) -> Option<String> {
        if let Some(c) = self.classes.get(name) {
            return Some(c.deobf.clone());
        }
        let (outer, inner) = name.rsplit_once('$')?;
        let outer = self.map_class(outer)?;
        Some(format!("{outer}${inner}"))
    }

    pub fn field(&self, owner: &str, name: &str) -> Option<&str> {
        self.classes
            .get(owner)?
            .fields
            .get(name)
            .map(|f| f.deobf.as_str())
    }

    pub fn method(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.classes
            .get(owner)?
            .methods
            .get(&(name.to_owned(), desc.to_owned()))
            .map(String::as_str)
    }

    pub fn remap_descriptor(&self, desc: &str) -> String {
        descriptor::remap_descriptor(desc, &|n| self.map_class(n))
    }

    /// Swap source and target namespaces. Method keys are rewritten so their
    /// descriptors are expressed in the new source namespace.
    pub fn reversed(&self) -> MappingTable {
        let mut out = MappingTable::new();
        for class in self.classes.values() {
            let mut rev = ClassMapping::new(class.deobf.clone(), class.obf.clone());
            for (obf, field) in &class.fields {
                rev.fields.insert(
                    field.deobf.clone(),
                    FieldMapping {
                        deobf: obf.clone(),
                        descriptor: field.descriptor.as_deref().map(|d| self.remap_descriptor(d)),
                    },
                );
            }
            for ((name, desc), deobf) in &class.methods {
                rev.methods
                    .insert((deobf.clone(), self.remap_descriptor(desc)), name.clone());
            }
            out.insert_class(rev);
        }
        out
    }
}
