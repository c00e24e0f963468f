// ─── Class File Model ───
// Just enough of the JVM class format to rename symbols and splice members
// between two definitions of the same class. Bytes we do not interpret
// (attribute payloads, bytecode) are kept as-is and rewritten in place.

pub mod annotations;
pub mod attributes;
pub mod code;
pub mod constant_pool;
pub mod descriptor;
pub mod relocate;

use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{ProvisionError, ProvisionResult};

pub use constant_pool::{Constant, ConstantPool};

const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ENUM: u16 = 0x4000;

/// Raw attribute: name index plus an uninterpreted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// Field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn parse(data: &[u8]) -> ProvisionResult<Self> {
        let mut r = ByteReader::new(data);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ProvisionError::class_format(
                "class",
                format!("bad magic {magic:#010x}"),
            ));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;

        let interface_count = r.u16()?;
        let interfaces = (0..interface_count)
            .map(|_| r.u16())
            .collect::<ProvisionResult<Vec<_>>>()?;

        let fields = parse_members(&mut r)?;
        let methods = parse_members(&mut r)?;
        let attributes = parse_attributes(&mut r)?;

        if !r.is_empty() {
            return Err(ProvisionError::class_format(
                "class",
                format!("{} trailing bytes", r.remaining()),
            ));
        }

        Ok(Self {
            minor_version,
            major_version,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(4096);
        w.u32(MAGIC);
        w.u16(self.minor_version);
        w.u16(self.major_version);
        self.pool.write(&mut w);
        w.u16(self.access_flags);
        w.u16(self.this_class);
        w.u16(self.super_class);
        w.u16(self.interfaces.len() as u16);
        for i in &self.interfaces {
            w.u16(*i);
        }
        write_members(&mut w, &self.fields);
        write_members(&mut w, &self.methods);
        write_attributes(&mut w, &self.attributes);
        w.into_inner()
    }

    /// Internal name (`net/minecraft/Foo`).
    pub fn name(&self) -> ProvisionResult<String> {
        self.pool.class_name(self.this_class)
    }

    /// `None` only for `java/lang/Object` and module-info.
    pub fn super_name(&self) -> ProvisionResult<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> ProvisionResult<Vec<String>> {
        self.interfaces
            .iter()
            .map(|i| self.pool.class_name(*i))
            .collect()
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags & ACC_ENUM != 0
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        attributes::find(&self.pool, &self.attributes, name).map(|i| &self.attributes[i])
    }
}

impl MemberInfo {
    pub fn name(&self, pool: &ConstantPool) -> ProvisionResult<String> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> ProvisionResult<String> {
        pool.utf8(self.descriptor_index)
    }

    pub fn attribute<'a>(&'a self, pool: &ConstantPool, name: &str) -> Option<&'a AttributeInfo> {
        attributes::find(pool, &self.attributes, name).map(|i| &self.attributes[i])
    }
}

fn parse_members(r: &mut ByteReader<'_>) -> ProvisionResult<Vec<MemberInfo>> {
    let count = r.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        members.push(MemberInfo {
            access_flags: r.u16()?,
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
            attributes: parse_attributes(r)?,
        });
    }
    Ok(members)
}

fn write_members(w: &mut ByteWriter, members: &[MemberInfo]) {
    w.u16(members.len() as u16);
    for m in members {
        w.u16(m.access_flags);
        w.u16(m.name_index);
        w.u16(m.descriptor_index);
        write_attributes(w, &m.attributes);
    }
}

pub(crate) fn parse_attributes(r: &mut ByteReader<'_>) -> ProvisionResult<Vec<AttributeInfo>> {
    let count = r.u16()?;
    let mut attrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = r.u16()?;
        let len = r.u32()? as usize;
        attrs.push(AttributeInfo {
            name_index,
            info: r.bytes(len)?.to_vec(),
        });
    }
    Ok(attrs)
}

pub(crate) fn write_attributes(w: &mut ByteWriter, attrs: &[AttributeInfo]) {
    w.u16(attrs.len() as u16);
    for a in attrs {
        w.u16(a.name_index);
        w.u32(a.info.len() as u32);
        w.bytes(&a.info);
    }
}

/// Parse a jar entry, naming the entry in any format error.
pub fn parse_entry(entry: &str, data: &[u8]) -> ProvisionResult<ClassFile> {
    ClassFile::parse(data).map_err(|e| match e {
        ProvisionError::ClassFormat { reason, .. } => ProvisionError::class_format(entry, reason),
        ProvisionError::Truncated { offset, needed } => ProvisionError::class_format(
            entry,
            format!("truncated at offset {offset} (needed {needed} bytes)"),
        ),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ClassBuilder;

    #[test]
    fn parses_what_the_builder_writes() {
        let bytes = ClassBuilder::new("net/minecraft/Foo")
            .super_class("net/minecraft/Base")
            .interface("java/lang/Runnable")
            .field("count", "I")
            .method("run", "()V")
            .build();

        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.name().unwrap(), "net/minecraft/Foo");
        assert_eq!(
            class.super_name().unwrap().as_deref(),
            Some("net/minecraft/Base")
        );
        assert_eq!(class.interface_names().unwrap(), vec!["java/lang/Runnable"]);
        assert_eq!(class.fields[0].name(&class.pool).unwrap(), "count");
        assert_eq!(class.methods[0].descriptor(&class.pool).unwrap(), "()V");
        assert_eq!(class.to_bytes(), bytes);
    }

    #[test]
    fn rejects_bad_magic_with_entry_name() {
        let err = parse_entry("a.class", &[0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        match err {
            ProvisionError::ClassFormat { entry, .. } => assert_eq!(entry, "a.class"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncated_class_names_entry() {
        let err = parse_entry("b.class", &[0xCA, 0xFE, 0xBA, 0xBE, 0]).unwrap_err();
        assert!(matches!(err, ProvisionError::ClassFormat { ref entry, .. } if entry == "b.class"));
    }
}
