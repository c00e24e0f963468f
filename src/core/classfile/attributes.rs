// ─── Attributes ───
// Names and small structured views over the attributes the transforms touch.

use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::ProvisionResult;

use super::constant_pool::ConstantPool;
use super::AttributeInfo;

pub const CODE: &str = "Code";
pub const SIGNATURE: &str = "Signature";
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
pub const STACK_MAP_TABLE: &str = "StackMapTable";
pub const INNER_CLASSES: &str = "InnerClasses";
pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
pub const NEST_HOST: &str = "NestHost";
pub const NEST_MEMBERS: &str = "NestMembers";
pub const PERMITTED_SUBCLASSES: &str = "PermittedSubclasses";
pub const RECORD: &str = "Record";
pub const SOURCE_FILE: &str = "SourceFile";
pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
pub const EXCEPTIONS: &str = "Exceptions";
pub const CONSTANT_VALUE: &str = "ConstantValue";
pub const DEPRECATED: &str = "Deprecated";
pub const SYNTHETIC: &str = "Synthetic";
pub const METHOD_PARAMETERS: &str = "MethodParameters";
pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";

/// Position of the first attribute called `name`.
pub fn find(pool: &ConstantPool, attributes: &[AttributeInfo], name: &str) -> Option<usize> {
    attributes
        .iter()
        .position(|a| pool.utf8(a.name_index).map(|n| n == name).unwrap_or(false))
}

/// Entry of the `BootstrapMethods` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    pub method_ref: u16,
    pub arguments: Vec<u16>,
}

pub fn parse_bootstrap_methods(data: &[u8]) -> ProvisionResult<Vec<BootstrapMethod>> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let method_ref = r.u16()?;
        let argc = r.u16()?;
        let mut arguments = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            arguments.push(r.u16()?);
        }
        out.push(BootstrapMethod {
            method_ref,
            arguments,
        });
    }
    Ok(out)
}

pub fn write_bootstrap_methods(methods: &[BootstrapMethod]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.u16(methods.len() as u16);
    for m in methods {
        w.u16(m.method_ref);
        w.u16(m.arguments.len() as u16);
        for a in &m.arguments {
            w.u16(*a);
        }
    }
    w.into_inner()
}

/// Entry of the `InnerClasses` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner_class: u16,
    pub outer_class: u16,
    pub inner_name: u16,
    pub access_flags: u16,
}

pub fn parse_inner_classes(data: &[u8]) -> ProvisionResult<Vec<InnerClassEntry>> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(InnerClassEntry {
            inner_class: r.u16()?,
            outer_class: r.u16()?,
            inner_name: r.u16()?,
            access_flags: r.u16()?,
        });
    }
    Ok(out)
}

pub fn write_inner_classes(entries: &[InnerClassEntry]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(2 + entries.len() * 8);
    w.u16(entries.len() as u16);
    for e in entries {
        w.u16(e.inner_class);
        w.u16(e.outer_class);
        w.u16(e.inner_name);
        w.u16(e.access_flags);
    }
    w.into_inner()
}

/// `u2 count, u2[count]` tables (`Exceptions`, `NestMembers`, `PermittedSubclasses`).
pub fn parse_u16_list(data: &[u8]) -> ProvisionResult<Vec<u16>> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    (0..count).map(|_| r.u16()).collect()
}

pub fn write_u16_list(items: &[u16]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(2 + items.len() * 2);
    w.u16(items.len() as u16);
    for i in items {
        w.u16(*i);
    }
    w.into_inner()
}

/// Single `u2` payload (`Signature`, `SourceFile`, `ConstantValue`, `NestHost`).
pub fn parse_u16(data: &[u8]) -> ProvisionResult<u16> {
    ByteReader::new(data).u16()
}

pub fn write_u16(value: u16) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Offsets of the name/descriptor (or signature) indices inside a
/// `LocalVariableTable` / `LocalVariableTypeTable` payload.
pub fn local_variable_index_offsets(data: &[u8]) -> ProvisionResult<Vec<(usize, usize)>> {
    let mut r = ByteReader::new(data);
    let count = r.u16()? as usize;
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let base = 2 + i * 10;
        r.bytes(10)?;
        offsets.push((base + 4, base + 6));
    }
    Ok(offsets)
}

pub fn read_u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub fn write_u16_at(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}
