// ─── Class Remapper ───
// Rewrites every symbolic reference of one class file through a mapping
// table. Existing pool slots keep their indices so bytecode operands stay
// valid; renamed strings are appended and the referencing entries repointed.

use crate::core::classfile::annotations::{
    parse_annotation_default, parse_annotations, parse_parameter_annotations,
    write_annotation_default, write_annotations, write_parameter_annotations, Annotation,
    ElementValue,
};
use crate::core::classfile::attributes::{self as attr, read_u16_at, write_u16_at};
use crate::core::classfile::code::CodeAttribute;
use crate::core::classfile::descriptor::{remap_class_name, remap_signature, return_type};
use crate::core::classfile::{parse_attributes, write_attributes, AttributeInfo, ClassFile, Constant, ConstantPool};
use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::mappings::MappingTable;

use super::hierarchy::ClassHierarchy;

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

pub struct Remapper<'a> {
    table: &'a MappingTable,
    hierarchy: &'a ClassHierarchy,
    strict: bool,
}

impl<'a> Remapper<'a> {
    pub fn new(table: &'a MappingTable, hierarchy: &'a ClassHierarchy, strict: bool) -> Self {
        Self {
            table,
            hierarchy,
            strict,
        }
    }

    // ── Name lookups ────────────────────────────────────

    pub fn map_class(&self, name: &str) -> String {
        remap_class_name(name, &|n| self.table.map_class(n)).unwrap_or_else(|| name.to_string())
    }

    pub fn map_descriptor(&self, desc: &str) -> String {
        self.table.remap_descriptor(desc)
    }

    pub fn map_signature(&self, sig: &str) -> String {
        remap_signature(sig, &|n| self.table.map_class(n))
    }

    /// New name of a field referenced through `owner`, searching the
    /// hierarchy for the class whose rule applies.
    pub fn map_field(&self, owner: &str, name: &str) -> String {
        self.hierarchy
            .ancestors(owner)
            .iter()
            .find_map(|c| self.table.field(c, name))
            .unwrap_or(name)
            .to_string()
    }

    pub fn map_method(&self, owner: &str, name: &str, desc: &str) -> String {
        if name.starts_with('<') {
            return name.to_string();
        }
        self.hierarchy
            .ancestors(owner)
            .iter()
            .find_map(|c| self.table.method(c, name, desc))
            .unwrap_or(name)
            .to_string()
    }

    /// Annotation elements are referenced by name only; match any
    /// no-argument method of that name.
    fn map_element(&self, annotation: &str, name: &str) -> String {
        self.table
            .class(annotation)
            .and_then(|c| {
                c.methods
                    .iter()
                    .find(|((n, d), _)| n == name && d.starts_with("()"))
                    .map(|(_, new)| new.clone())
            })
            .unwrap_or_else(|| name.to_string())
    }

    // ── Class rewrite ───────────────────────────────────

    /// Remap `class` in place and return its new internal name.
    pub fn remap_class(&self, class: &mut ClassFile) -> ProvisionResult<String> {
        let old = class.pool.clone();
        let this_name = class.name()?;

        if self.strict && self.table.map_class(&this_name).is_none() {
            return Err(ProvisionError::UnmappedSymbol(format!("class {this_name}")));
        }

        self.remap_pool(class, &old)?;

        let pool = &mut class.pool;
        for field in &mut class.fields {
            let name = old.utf8(field.name_index)?;
            let desc = old.utf8(field.descriptor_index)?;
            if self.strict && self.table.field(&this_name, &name).is_none() {
                return Err(ProvisionError::UnmappedSymbol(format!(
                    "field {this_name}.{name}"
                )));
            }
            field.name_index = pool.intern_utf8(&self.map_field(&this_name, &name))?;
            field.descriptor_index = pool.intern_utf8(&self.map_descriptor(&desc))?;
            self.remap_attributes(&old, pool, &this_name, &mut field.attributes)?;
        }
        for method in &mut class.methods {
            let name = old.utf8(method.name_index)?;
            let desc = old.utf8(method.descriptor_index)?;
            method.name_index = pool.intern_utf8(&self.map_method(&this_name, &name, &desc))?;
            method.descriptor_index = pool.intern_utf8(&self.map_descriptor(&desc))?;
            self.remap_attributes(&old, pool, &this_name, &mut method.attributes)?;
        }
        self.remap_attributes(&old, pool, &this_name, &mut class.attributes)?;

        class.name()
    }

    fn remap_pool(&self, class: &mut ClassFile, old: &ConstantPool) -> ProvisionResult<()> {
        let bootstrap = match class.attribute(attr::BOOTSTRAP_METHODS) {
            Some(a) => attr::parse_bootstrap_methods(&a.info)?,
            None => Vec::new(),
        };

        let mut rewrites = Vec::new();
        for (idx, constant) in old.iter() {
            let pool = &mut class.pool;
            let rewritten = match *constant {
                Constant::Class(n) => {
                    let name = old.utf8(n)?;
                    let mapped = self.map_class(&name);
                    if mapped == name {
                        None
                    } else {
                        Some(Constant::Class(pool.intern_utf8(&mapped)?))
                    }
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => {
                    let (owner, name, desc) = old.member_ref(idx)?;
                    let nat = self.renamed_nat(pool, &self.map_field(&owner, &name), &desc)?;
                    (nat != name_and_type).then_some(Constant::FieldRef {
                        class,
                        name_and_type: nat,
                    })
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => {
                    let (owner, name, desc) = old.member_ref(idx)?;
                    let nat = self.renamed_nat(pool, &self.map_method(&owner, &name, &desc), &desc)?;
                    (nat != name_and_type).then_some(Constant::MethodRef {
                        class,
                        name_and_type: nat,
                    })
                }
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    let (owner, name, desc) = old.member_ref(idx)?;
                    let nat = self.renamed_nat(pool, &self.map_method(&owner, &name, &desc), &desc)?;
                    (nat != name_and_type).then_some(Constant::InterfaceMethodRef {
                        class,
                        name_and_type: nat,
                    })
                }
                Constant::MethodType(n) => {
                    let desc = old.utf8(n)?;
                    let mapped = self.map_descriptor(&desc);
                    if mapped == desc {
                        None
                    } else {
                        Some(Constant::MethodType(pool.intern_utf8(&mapped)?))
                    }
                }
                Constant::InvokeDynamic {
                    bootstrap: bsm,
                    name_and_type,
                } => {
                    let (name, desc) = old.name_and_type(name_and_type)?;
                    let new_name = self.call_site_name(old, &bootstrap, bsm, &name, &desc)?;
                    let nat = self.renamed_nat(pool, &new_name, &desc)?;
                    (nat != name_and_type).then_some(Constant::InvokeDynamic {
                        bootstrap: bsm,
                        name_and_type: nat,
                    })
                }
                Constant::Dynamic {
                    bootstrap: bsm,
                    name_and_type,
                } => {
                    let (name, desc) = old.name_and_type(name_and_type)?;
                    let nat = self.renamed_nat(pool, &name, &desc)?;
                    (nat != name_and_type).then_some(Constant::Dynamic {
                        bootstrap: bsm,
                        name_and_type: nat,
                    })
                }
                _ => None,
            };
            if let Some(c) = rewritten {
                rewrites.push((idx, c));
            }
        }

        for (idx, constant) in rewrites {
            class.pool.set(idx, constant)?;
        }
        Ok(())
    }

    /// `NameAndType` for `name` plus the remapped descriptor.
    fn renamed_nat(&self, pool: &mut ConstantPool, name: &str, desc: &str) -> ProvisionResult<u16> {
        pool.intern_name_and_type(name, &self.map_descriptor(desc))
    }

    /// Lambda call sites are named after the functional interface method
    /// they implement; other call sites keep their name.
    fn call_site_name(
        &self,
        old: &ConstantPool,
        bootstrap: &[attr::BootstrapMethod],
        bsm: u16,
        name: &str,
        desc: &str,
    ) -> ProvisionResult<String> {
        let Some(method) = bootstrap.get(bsm as usize) else {
            return Ok(name.to_string());
        };
        let Constant::MethodHandle { reference, .. } = old.get(method.method_ref)? else {
            return Ok(name.to_string());
        };
        let (owner, _, _) = old.member_ref(*reference)?;
        if owner != LAMBDA_METAFACTORY {
            return Ok(name.to_string());
        }
        let sam = match method.arguments.first().map(|&a| old.get(a)).transpose()? {
            Some(Constant::MethodType(n)) => old.utf8(*n)?,
            _ => return Ok(name.to_string()),
        };
        let Some(interface) = return_type(desc)
            .and_then(|r| r.strip_prefix('L'))
            .and_then(|r| r.strip_suffix(';'))
        else {
            return Ok(name.to_string());
        };
        Ok(self.map_method(interface, name, &sam))
    }

    // ── Attributes ──────────────────────────────────────

    fn remap_attributes(
        &self,
        old: &ConstantPool,
        pool: &mut ConstantPool,
        this_name: &str,
        attributes: &mut [AttributeInfo],
    ) -> ProvisionResult<()> {
        for attribute in attributes {
            let name = pool.utf8(attribute.name_index)?;
            match name.as_str() {
                attr::SIGNATURE => {
                    let sig = pool.utf8(attr::parse_u16(&attribute.info)?)?;
                    attribute.info = attr::write_u16(pool.intern_utf8(&self.map_signature(&sig))?);
                }
                attr::CODE => {
                    let mut code = CodeAttribute::parse(&attribute.info)?;
                    self.remap_attributes(old, pool, this_name, &mut code.attributes)?;
                    attribute.info = code.to_bytes();
                }
                attr::LOCAL_VARIABLE_TABLE | attr::LOCAL_VARIABLE_TYPE_TABLE => {
                    let typed = name == attr::LOCAL_VARIABLE_TYPE_TABLE;
                    for (_, desc_at) in attr::local_variable_index_offsets(&attribute.info)? {
                        let desc = pool.utf8(read_u16_at(&attribute.info, desc_at))?;
                        let mapped = if typed {
                            self.map_signature(&desc)
                        } else {
                            self.map_descriptor(&desc)
                        };
                        write_u16_at(&mut attribute.info, desc_at, pool.intern_utf8(&mapped)?);
                    }
                }
                attr::INNER_CLASSES => {
                    let mut entries = attr::parse_inner_classes(&attribute.info)?;
                    for entry in &mut entries {
                        if entry.inner_name == 0 {
                            continue;
                        }
                        let inner = old.class_name(entry.inner_class)?;
                        let mapped = self.map_class(&inner);
                        if mapped == inner {
                            continue;
                        }
                        if let Some((_, simple)) = mapped.rsplit_once('$') {
                            entry.inner_name = pool.intern_utf8(simple)?;
                        }
                    }
                    attribute.info = attr::write_inner_classes(&entries);
                }
                attr::ENCLOSING_METHOD => {
                    let method = read_u16_at(&attribute.info, 2);
                    if method != 0 {
                        let owner = old.class_name(read_u16_at(&attribute.info, 0))?;
                        let (m, desc) = old.name_and_type(method)?;
                        let nat = pool.intern_name_and_type(
                            &self.map_method(&owner, &m, &desc),
                            &self.map_descriptor(&desc),
                        )?;
                        write_u16_at(&mut attribute.info, 2, nat);
                    }
                }
                attr::RUNTIME_VISIBLE_ANNOTATIONS | attr::RUNTIME_INVISIBLE_ANNOTATIONS => {
                    let mut annotations = parse_annotations(&attribute.info)?;
                    for a in &mut annotations {
                        self.remap_annotation(pool, a)?;
                    }
                    attribute.info = write_annotations(&annotations);
                }
                attr::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
                | attr::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                    let mut params = parse_parameter_annotations(&attribute.info)?;
                    for a in params.iter_mut().flatten() {
                        self.remap_annotation(pool, a)?;
                    }
                    attribute.info = write_parameter_annotations(&params);
                }
                attr::ANNOTATION_DEFAULT => {
                    let mut value = parse_annotation_default(&attribute.info)?;
                    self.remap_element_value(pool, &mut value)?;
                    attribute.info = write_annotation_default(&value);
                }
                attr::RECORD => {
                    attribute.info = self.remap_record(old, pool, this_name, &attribute.info)?;
                }
                // Everything else refers to the pool only through entries
                // that were repointed above.
                _ => {}
            }
        }
        Ok(())
    }

    fn remap_record(
        &self,
        old: &ConstantPool,
        pool: &mut ConstantPool,
        this_name: &str,
        data: &[u8],
    ) -> ProvisionResult<Vec<u8>> {
        let mut r = ByteReader::new(data);
        let mut w = ByteWriter::with_capacity(data.len());
        let count = r.u16()?;
        w.u16(count);
        for _ in 0..count {
            let name = pool.utf8(r.u16()?)?;
            let desc = pool.utf8(r.u16()?)?;
            let mut attributes = parse_attributes(&mut r)?;
            self.remap_attributes(old, pool, this_name, &mut attributes)?;
            w.u16(pool.intern_utf8(&self.map_field(this_name, &name))?);
            w.u16(pool.intern_utf8(&self.map_descriptor(&desc))?);
            write_attributes(&mut w, &attributes);
        }
        Ok(w.into_inner())
    }

    fn remap_annotation(&self, pool: &mut ConstantPool, a: &mut Annotation) -> ProvisionResult<()> {
        let type_desc = pool.utf8(a.type_index)?;
        let type_name = type_desc
            .strip_prefix('L')
            .and_then(|t| t.strip_suffix(';'))
            .unwrap_or(&type_desc)
            .to_string();
        a.type_index = pool.intern_utf8(&self.map_descriptor(&type_desc))?;
        for (name_index, value) in &mut a.elements {
            let name = pool.utf8(*name_index)?;
            *name_index = pool.intern_utf8(&self.map_element(&type_name, &name))?;
            self.remap_element_value(pool, value)?;
        }
        Ok(())
    }

    fn remap_element_value(&self, pool: &mut ConstantPool, value: &mut ElementValue) -> ProvisionResult<()> {
        match value {
            ElementValue::Const { .. } => {}
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                let desc = pool.utf8(*type_name)?;
                let name = pool.utf8(*const_name)?;
                let owner = desc
                    .strip_prefix('L')
                    .and_then(|t| t.strip_suffix(';'))
                    .unwrap_or(&desc);
                *const_name = pool.intern_utf8(&self.map_field(owner, &name))?;
                *type_name = pool.intern_utf8(&self.map_descriptor(&desc))?;
            }
            ElementValue::Class(index) => {
                let desc = pool.utf8(*index)?;
                *index = pool.intern_utf8(&self.map_descriptor(&desc))?;
            }
            ElementValue::Annotation(a) => self.remap_annotation(pool, a)?,
            ElementValue::Array(values) => {
                for v in values {
                    self.remap_element_value(pool, v)?;
                }
            }
        }
        Ok(())
    }
}
