// ─── Relocation ───
// Copies members and attributes of one class definition onto a fresh
// constant pool. Used by the jar merger to splice client and server
// variants of a class into a single definition.

use std::collections::HashMap;

use tracing::trace;

use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{ProvisionError, ProvisionResult};

use super::annotations::{
    parse_annotation_default, parse_annotations, parse_parameter_annotations,
    write_annotation_default, write_annotations, write_parameter_annotations,
};
use super::attributes::{self as attr, BootstrapMethod};
use super::code::{pool_operands, stack_map_class_offsets, CodeAttribute, LDC};
use super::constant_pool::{Constant, ConstantPool};
use super::{AttributeInfo, ClassFile, MemberInfo};

/// Largest index a one-byte `ldc` operand can address.
const MAX_LDC_INDEX: usize = u8::MAX as usize;

/// Constant pool and bootstrap table being assembled for a merged class.
#[derive(Debug, Default)]
pub struct MergeTarget {
    pub pool: ConstantPool,
    pub bootstrap: Vec<BootstrapMethod>,
    bootstrap_index: HashMap<BootstrapMethod, u16>,
}

impl MergeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_bootstrap(&mut self, method: BootstrapMethod) -> u16 {
        if let Some(&i) = self.bootstrap_index.get(&method) {
            return i;
        }
        let i = self.bootstrap.len() as u16;
        self.bootstrap_index.insert(method.clone(), i);
        self.bootstrap.push(method);
        i
    }

    /// `BootstrapMethods` attribute for the merged class, if any call site
    /// needs one.
    pub fn bootstrap_attribute(&mut self) -> ProvisionResult<Option<AttributeInfo>> {
        if self.bootstrap.is_empty() {
            return Ok(None);
        }
        Ok(Some(AttributeInfo {
            name_index: self.pool.intern_utf8(attr::BOOTSTRAP_METHODS)?,
            info: attr::write_bootstrap_methods(&self.bootstrap),
        }))
    }
}

/// Moves constants from one source class into a [`MergeTarget`].
pub struct Importer<'a> {
    source: &'a ClassFile,
    bootstrap: Vec<BootstrapMethod>,
    memo: HashMap<u16, u16>,
}

impl<'a> Importer<'a> {
    pub fn new(source: &'a ClassFile) -> ProvisionResult<Self> {
        let bootstrap = match source.attribute(attr::BOOTSTRAP_METHODS) {
            Some(a) => attr::parse_bootstrap_methods(&a.info)?,
            None => Vec::new(),
        };
        Ok(Self {
            source,
            bootstrap,
            memo: HashMap::new(),
        })
    }

    pub fn source(&self) -> &'a ClassFile {
        self.source
    }

    fn pool(&self) -> &ConstantPool {
        &self.source.pool
    }

    /// Index in the target pool of the source constant at `idx`. 0 maps to 0.
    pub fn constant(&mut self, target: &mut MergeTarget, idx: u16) -> ProvisionResult<u16> {
        if idx == 0 {
            return Ok(0);
        }
        if let Some(&mapped) = self.memo.get(&idx) {
            return Ok(mapped);
        }
        let constant = self.rebuild(target, idx)?;
        let mapped = target.pool.intern(constant)?;
        self.memo.insert(idx, mapped);
        Ok(mapped)
    }

    /// The source constant with every child index moved into the target.
    fn rebuild(&mut self, target: &mut MergeTarget, idx: u16) -> ProvisionResult<Constant> {
        let constant = self.pool().get(idx)?.clone();
        Ok(match constant {
            Constant::Unusable
            | Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_) => constant,
            Constant::Class(n) => Constant::Class(self.constant(target, n)?),
            Constant::String(n) => Constant::String(self.constant(target, n)?),
            Constant::MethodType(n) => Constant::MethodType(self.constant(target, n)?),
            Constant::Module(n) => Constant::Module(self.constant(target, n)?),
            Constant::Package(n) => Constant::Package(self.constant(target, n)?),
            Constant::FieldRef {
                class,
                name_and_type,
            } => Constant::FieldRef {
                class: self.constant(target, class)?,
                name_and_type: self.constant(target, name_and_type)?,
            },
            Constant::MethodRef {
                class,
                name_and_type,
            } => Constant::MethodRef {
                class: self.constant(target, class)?,
                name_and_type: self.constant(target, name_and_type)?,
            },
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => Constant::InterfaceMethodRef {
                class: self.constant(target, class)?,
                name_and_type: self.constant(target, name_and_type)?,
            },
            Constant::NameAndType { name, descriptor } => Constant::NameAndType {
                name: self.constant(target, name)?,
                descriptor: self.constant(target, descriptor)?,
            },
            Constant::MethodHandle { kind, reference } => Constant::MethodHandle {
                kind,
                reference: self.constant(target, reference)?,
            },
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            } => Constant::Dynamic {
                bootstrap: self.bootstrap_method(target, bootstrap)?,
                name_and_type: self.constant(target, name_and_type)?,
            },
            Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => Constant::InvokeDynamic {
                bootstrap: self.bootstrap_method(target, bootstrap)?,
                name_and_type: self.constant(target, name_and_type)?,
            },
        })
    }

    fn bootstrap_method(&mut self, target: &mut MergeTarget, idx: u16) -> ProvisionResult<u16> {
        let method = self.bootstrap.get(idx as usize).cloned().ok_or_else(|| {
            ProvisionError::class_format(
                "BootstrapMethods",
                format!("missing bootstrap method {idx}"),
            )
        })?;
        let method_ref = self.constant(target, method.method_ref)?;
        let arguments = method
            .arguments
            .iter()
            .map(|a| self.constant(target, *a))
            .collect::<ProvisionResult<Vec<_>>>()?;
        Ok(target.add_bootstrap(BootstrapMethod {
            method_ref,
            arguments,
        }))
    }

    /// Structural text form of a constant, equal across pools for equal
    /// constants. Used to deduplicate `ldc` targets between sides.
    fn render(&self, idx: u16) -> ProvisionResult<String> {
        let pool = self.pool();
        Ok(match pool.get(idx)? {
            Constant::Unusable => String::new(),
            Constant::Utf8(b) => format!("u:{}", hex::encode(b)),
            Constant::Integer(v) => format!("i:{v}"),
            Constant::Float(v) => format!("f:{v}"),
            Constant::Long(v) => format!("j:{v}"),
            Constant::Double(v) => format!("d:{v}"),
            Constant::Class(n) => format!("C({})", self.render(*n)?),
            Constant::String(n) => format!("S({})", self.render(*n)?),
            Constant::MethodType(n) => format!("MT({})", self.render(*n)?),
            Constant::Module(n) => format!("Mo({})", self.render(*n)?),
            Constant::Package(n) => format!("P({})", self.render(*n)?),
            Constant::FieldRef {
                class,
                name_and_type,
            } => format!("F({},{})", self.render(*class)?, self.render(*name_and_type)?),
            Constant::MethodRef {
                class,
                name_and_type,
            } => format!("M({},{})", self.render(*class)?, self.render(*name_and_type)?),
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => format!("IM({},{})", self.render(*class)?, self.render(*name_and_type)?),
            Constant::NameAndType { name, descriptor } => {
                format!("NT({},{})", self.render(*name)?, self.render(*descriptor)?)
            }
            Constant::MethodHandle { kind, reference } => {
                format!("MH({kind},{})", self.render(*reference)?)
            }
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                let method = self.bootstrap.get(*bootstrap as usize).ok_or_else(|| {
                    ProvisionError::class_format(
                        "BootstrapMethods",
                        format!("missing bootstrap method {bootstrap}"),
                    )
                })?;
                let mut s = format!("D({}", self.render(method.method_ref)?);
                for a in &method.arguments {
                    s.push(',');
                    s.push_str(&self.render(*a)?);
                }
                s.push_str(&format!(";{})", self.render(*name_and_type)?));
                s
            }
        })
    }

    /// Source indices loaded by a one-byte `ldc` anywhere in the class.
    fn ldc_indices(&self) -> ProvisionResult<Vec<u16>> {
        let mut out = Vec::new();
        for method in &self.source.methods {
            let Some(code) = method.attribute(self.pool(), attr::CODE) else {
                continue;
            };
            let code = CodeAttribute::parse(&code.info)?;
            for op in pool_operands(&code.code)? {
                if op.opcode == LDC {
                    let idx = op.read(&code.code);
                    if !out.contains(&idx) {
                        out.push(idx);
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn member(&mut self, target: &mut MergeTarget, member: &MemberInfo) -> ProvisionResult<MemberInfo> {
        Ok(MemberInfo {
            access_flags: member.access_flags,
            name_index: self.constant(target, member.name_index)?,
            descriptor_index: self.constant(target, member.descriptor_index)?,
            attributes: self.attributes(target, &member.attributes)?,
        })
    }

    /// Relocate an attribute list. Attributes that cannot be relocated are
    /// dropped. `BootstrapMethods` is always dropped; the target regenerates it.
    pub fn attributes(
        &mut self,
        target: &mut MergeTarget,
        attrs: &[AttributeInfo],
    ) -> ProvisionResult<Vec<AttributeInfo>> {
        let mut out = Vec::with_capacity(attrs.len());
        for a in attrs {
            let name = self.pool().utf8(a.name_index)?;
            let info = match name.as_str() {
                attr::CODE => self.code(target, &a.info)?,
                attr::SIGNATURE | attr::SOURCE_FILE | attr::CONSTANT_VALUE | attr::NEST_HOST => {
                    attr::write_u16(self.constant(target, attr::parse_u16(&a.info)?)?)
                }
                attr::EXCEPTIONS | attr::NEST_MEMBERS | attr::PERMITTED_SUBCLASSES => {
                    let items = attr::parse_u16_list(&a.info)?
                        .into_iter()
                        .map(|i| self.constant(target, i))
                        .collect::<ProvisionResult<Vec<_>>>()?;
                    attr::write_u16_list(&items)
                }
                attr::RUNTIME_VISIBLE_ANNOTATIONS | attr::RUNTIME_INVISIBLE_ANNOTATIONS => {
                    let mut anns = parse_annotations(&a.info)?;
                    for ann in &mut anns {
                        ann.visit_indices(&mut |_, idx| {
                            *idx = self.constant(target, *idx)?;
                            Ok(())
                        })?;
                    }
                    write_annotations(&anns)
                }
                attr::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
                | attr::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                    let mut params = parse_parameter_annotations(&a.info)?;
                    for ann in params.iter_mut().flatten() {
                        ann.visit_indices(&mut |_, idx| {
                            *idx = self.constant(target, *idx)?;
                            Ok(())
                        })?;
                    }
                    write_parameter_annotations(&params)
                }
                attr::ANNOTATION_DEFAULT => {
                    let mut value = parse_annotation_default(&a.info)?;
                    value.visit_indices(&mut |_, idx| {
                        *idx = self.constant(target, *idx)?;
                        Ok(())
                    })?;
                    write_annotation_default(&value)
                }
                attr::METHOD_PARAMETERS => self.method_parameters(target, &a.info)?,
                attr::RECORD => self.record(target, &a.info)?,
                attr::ENCLOSING_METHOD => {
                    let mut r = ByteReader::new(&a.info);
                    let class = self.constant(target, r.u16()?)?;
                    let method = self.constant(target, r.u16()?)?;
                    let mut w = ByteWriter::with_capacity(4);
                    w.u16(class);
                    w.u16(method);
                    w.into_inner()
                }
                attr::INNER_CLASSES => {
                    let mut entries = attr::parse_inner_classes(&a.info)?;
                    for e in &mut entries {
                        e.inner_class = self.constant(target, e.inner_class)?;
                        e.outer_class = self.constant(target, e.outer_class)?;
                        e.inner_name = self.constant(target, e.inner_name)?;
                    }
                    attr::write_inner_classes(&entries)
                }
                attr::DEPRECATED
                | attr::SYNTHETIC
                | attr::SOURCE_DEBUG_EXTENSION
                | attr::LINE_NUMBER_TABLE => a.info.clone(),
                attr::LOCAL_VARIABLE_TABLE | attr::LOCAL_VARIABLE_TYPE_TABLE => {
                    let mut info = a.info.clone();
                    for (name_at, desc_at) in attr::local_variable_index_offsets(&info)? {
                        for at in [name_at, desc_at] {
                            let mapped = self.constant(target, attr::read_u16_at(&info, at))?;
                            attr::write_u16_at(&mut info, at, mapped);
                        }
                    }
                    info
                }
                attr::STACK_MAP_TABLE => {
                    let mut info = a.info.clone();
                    for at in stack_map_class_offsets(&info)? {
                        let mapped = self.constant(target, attr::read_u16_at(&info, at))?;
                        attr::write_u16_at(&mut info, at, mapped);
                    }
                    info
                }
                attr::BOOTSTRAP_METHODS => continue,
                other => {
                    trace!("Dropping attribute {} while relocating {:?}", other, self.source.name());
                    continue;
                }
            };
            out.push(AttributeInfo {
                name_index: target.pool.intern_utf8(&name)?,
                info,
            });
        }
        Ok(out)
    }

    fn code(&mut self, target: &mut MergeTarget, data: &[u8]) -> ProvisionResult<Vec<u8>> {
        let mut code = CodeAttribute::parse(data)?;
        for op in pool_operands(&code.code)? {
            let mapped = self.constant(target, op.read(&code.code))?;
            op.write(&mut code.code, mapped)?;
        }
        for handler in &mut code.exception_table {
            handler.catch_type = self.constant(target, handler.catch_type)?;
        }
        code.attributes = self.attributes(target, &code.attributes)?;
        Ok(code.to_bytes())
    }

    fn method_parameters(&mut self, target: &mut MergeTarget, data: &[u8]) -> ProvisionResult<Vec<u8>> {
        let mut r = ByteReader::new(data);
        let count = r.u8()?;
        let mut w = ByteWriter::with_capacity(data.len());
        w.u8(count);
        for _ in 0..count {
            let name = self.constant(target, r.u16()?)?;
            w.u16(name);
            w.u16(r.u16()?);
        }
        Ok(w.into_inner())
    }

    fn record(&mut self, target: &mut MergeTarget, data: &[u8]) -> ProvisionResult<Vec<u8>> {
        let mut r = ByteReader::new(data);
        let count = r.u16()?;
        let mut w = ByteWriter::with_capacity(data.len());
        w.u16(count);
        for _ in 0..count {
            let name = self.constant(target, r.u16()?)?;
            let descriptor = self.constant(target, r.u16()?)?;
            let attrs = super::parse_attributes(&mut r)?;
            let attrs = self.attributes(target, &attrs)?;
            w.u16(name);
            w.u16(descriptor);
            super::write_attributes(&mut w, &attrs);
        }
        Ok(w.into_inner())
    }
}

/// Place every constant loaded by a one-byte `ldc` (from any side) in the
/// first slots of the target pool, so the operands still fit after the
/// merge. Must run on a fresh target before anything else is imported.
pub fn seed_ldc_constants(
    target: &mut MergeTarget,
    importers: &mut [&mut Importer<'_>],
) -> ProvisionResult<()> {
    // key -> (first importer, its source index)
    let mut order: Vec<(String, usize, u16)> = Vec::new();
    let mut by_key: HashMap<String, Vec<(usize, u16)>> = HashMap::new();

    for (side, importer) in importers.iter().enumerate() {
        for idx in importer.ldc_indices()? {
            let key = importer.render(idx)?;
            let seen = by_key.entry(key.clone()).or_default();
            if seen.is_empty() {
                order.push((key, side, idx));
            }
            seen.push((side, idx));
        }
    }

    if order.is_empty() {
        return Ok(());
    }
    if target.pool.len() - 1 + order.len() > MAX_LDC_INDEX {
        return Err(ProvisionError::class_format(
            "constant pool",
            format!("{} distinct ldc constants exceed the one-byte operand range", order.len()),
        ));
    }

    let slots = order
        .iter()
        .map(|_| target.pool.reserve())
        .collect::<ProvisionResult<Vec<_>>>()?;

    for ((key, side, idx), slot) in order.iter().zip(&slots) {
        let constant = importers[*side].rebuild(target, *idx)?;
        target.pool.set(*slot, constant)?;
        for (other_side, other_idx) in by_key.get(key).into_iter().flatten() {
            importers[*other_side].memo.insert(*other_idx, *slot);
        }
    }
    Ok(())
}
