use std::collections::HashMap;

use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{ProvisionError, ProvisionResult};

/// Highest usable constant pool index (the count is stored as a u16).
const MAX_POOL_LEN: usize = u16::MAX as usize;

/// One constant pool slot.
///
/// `Utf8` keeps the raw modified-UTF-8 bytes so strings the JVM accepts but
/// Rust cannot represent (unpaired surrogates) survive a rewrite untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Index 0 and the slot following a `Long`/`Double`.
    Unusable,
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    pub fn utf8(s: &str) -> Self {
        Constant::Utf8(encode_mutf8(s))
    }
}

/// Class-file constant pool with an interning index for appends.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            index: HashMap::new(),
        }
    }

    pub fn parse(r: &mut ByteReader<'_>) -> ProvisionResult<Self> {
        let count = r.u16()? as usize;
        let mut pool = Self::new();
        pool.entries.reserve(count);

        while pool.entries.len() < count {
            let tag = r.u8()?;
            let constant = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    Constant::Utf8(r.bytes(len)?.to_vec())
                }
                3 => Constant::Integer(r.u32()?),
                4 => Constant::Float(r.u32()?),
                5 => Constant::Long(r.u64()?),
                6 => Constant::Double(r.u64()?),
                7 => Constant::Class(r.u16()?),
                8 => Constant::String(r.u16()?),
                9 => Constant::FieldRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                10 => Constant::MethodRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                12 => Constant::NameAndType {
                    name: r.u16()?,
                    descriptor: r.u16()?,
                },
                15 => Constant::MethodHandle {
                    kind: r.u8()?,
                    reference: r.u16()?,
                },
                16 => Constant::MethodType(r.u16()?),
                17 => Constant::Dynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                19 => Constant::Module(r.u16()?),
                20 => Constant::Package(r.u16()?),
                other => {
                    return Err(ProvisionError::class_format(
                        "constant pool",
                        format!("unknown tag {} at index {}", other, pool.entries.len()),
                    ))
                }
            };
            pool.push_unchecked(constant);
        }

        Ok(pool)
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.u16(self.entries.len() as u16);
        for constant in &self.entries[1..] {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    w.u8(1);
                    w.u16(bytes.len() as u16);
                    w.bytes(bytes);
                }
                Constant::Integer(v) => {
                    w.u8(3);
                    w.u32(*v);
                }
                Constant::Float(v) => {
                    w.u8(4);
                    w.u32(*v);
                }
                Constant::Long(v) => {
                    w.u8(5);
                    w.u64(*v);
                }
                Constant::Double(v) => {
                    w.u8(6);
                    w.u64(*v);
                }
                Constant::Class(i) => {
                    w.u8(7);
                    w.u16(*i);
                }
                Constant::String(i) => {
                    w.u8(8);
                    w.u16(*i);
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => {
                    w.u8(9);
                    w.u16(*class);
                    w.u16(*name_and_type);
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => {
                    w.u8(10);
                    w.u16(*class);
                    w.u16(*name_and_type);
                }
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    w.u8(11);
                    w.u16(*class);
                    w.u16(*name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    w.u8(12);
                    w.u16(*name);
                    w.u16(*descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    w.u8(15);
                    w.u8(*kind);
                    w.u16(*reference);
                }
                Constant::MethodType(i) => {
                    w.u8(16);
                    w.u16(*i);
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    w.u8(17);
                    w.u16(*bootstrap);
                    w.u16(*name_and_type);
                }
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    w.u8(18);
                    w.u16(*bootstrap);
                    w.u16(*name_and_type);
                }
                Constant::Module(i) => {
                    w.u8(19);
                    w.u16(*i);
                }
                Constant::Package(i) => {
                    w.u8(20);
                    w.u16(*i);
                }
            }
        }
    }

    /// Number of slots including the unusable slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, idx: u16) -> ProvisionResult<&Constant> {
        match self.entries.get(idx as usize) {
            Some(Constant::Unusable) | None => Err(ProvisionError::class_format(
                "constant pool",
                format!("invalid constant index {idx}"),
            )),
            Some(c) => Ok(c),
        }
    }

    /// Iterate `(index, constant)` over usable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    pub fn utf8(&self, idx: u16) -> ProvisionResult<String> {
        match self.get(idx)? {
            Constant::Utf8(bytes) => decode_mutf8(bytes).ok_or_else(|| {
                ProvisionError::class_format("constant pool", format!("malformed utf8 at {idx}"))
            }),
            other => Err(unexpected(idx, "Utf8", other)),
        }
    }

    pub fn class_name(&self, idx: u16) -> ProvisionResult<String> {
        match self.get(idx)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(unexpected(idx, "Class", other)),
        }
    }

    pub fn name_and_type(&self, idx: u16) -> ProvisionResult<(String, String)> {
        match self.get(idx)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(unexpected(idx, "NameAndType", other)),
        }
    }

    /// Owner, name and descriptor of a field/method/interface-method reference.
    pub fn member_ref(&self, idx: u16) -> ProvisionResult<(String, String, String)> {
        match self.get(idx)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                let owner = self.class_name(*class)?;
                let (name, desc) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, desc))
            }
            other => Err(unexpected(idx, "member reference", other)),
        }
    }

    /// Append a constant without deduplication.
    pub fn push(&mut self, constant: Constant) -> ProvisionResult<u16> {
        let width = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + width > MAX_POOL_LEN {
            return Err(ProvisionError::class_format(
                "constant pool",
                "constant pool exceeds 65535 entries",
            ));
        }
        Ok(self.push_unchecked(constant))
    }

    fn push_unchecked(&mut self, constant: Constant) -> u16 {
        let idx = self.entries.len() as u16;
        let wide = constant.is_wide();
        if !matches!(constant, Constant::Unusable) {
            self.index.entry(constant.clone()).or_insert(idx);
        }
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        idx
    }

    /// Return the index of an equal constant, appending one if absent.
    pub fn intern(&mut self, constant: Constant) -> ProvisionResult<u16> {
        if let Some(&idx) = self.index.get(&constant) {
            return Ok(idx);
        }
        self.push(constant)
    }

    pub fn intern_utf8(&mut self, s: &str) -> ProvisionResult<u16> {
        self.intern(Constant::utf8(s))
    }

    pub fn intern_class(&mut self, name: &str) -> ProvisionResult<u16> {
        let name = self.intern_utf8(name)?;
        self.intern(Constant::Class(name))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> ProvisionResult<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Replace the constant at `idx`. Width (wide vs narrow) must not change.
    pub fn set(&mut self, idx: u16, constant: Constant) -> ProvisionResult<()> {
        let slot = idx as usize;
        let Some(old) = self.entries.get(slot).cloned() else {
            return Err(ProvisionError::class_format(
                "constant pool",
                format!("cannot set missing index {idx}"),
            ));
        };
        if old.is_wide() != constant.is_wide() {
            return Err(ProvisionError::class_format(
                "constant pool",
                format!("width change at index {idx}"),
            ));
        }
        if self.index.get(&old) == Some(&idx) {
            self.index.remove(&old);
        }
        if !matches!(constant, Constant::Unusable) {
            self.index.entry(constant.clone()).or_insert(idx);
        }
        self.entries[slot] = constant;
        Ok(())
    }

    /// Append a placeholder slot to be filled later with [`ConstantPool::set`].
    pub fn reserve(&mut self) -> ProvisionResult<u16> {
        if self.entries.len() + 1 > MAX_POOL_LEN {
            return Err(ProvisionError::class_format(
                "constant pool",
                "constant pool exceeds 65535 entries",
            ));
        }
        Ok(self.push_unchecked(Constant::Unusable))
    }
}

fn unexpected(idx: u16, wanted: &str, found: &Constant) -> ProvisionError {
    ProvisionError::class_format(
        "constant pool",
        format!("expected {wanted} at index {idx}, found {found:?}"),
    )
}

/// Decode the JVM's modified UTF-8. Returns `None` for malformed input.
pub fn decode_mutf8(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|&b| b != 0 && b < 0x80) {
        return std::str::from_utf8(bytes).ok().map(str::to_owned);
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            units.push(
                (((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

pub fn encode_mutf8(s: &str) -> Vec<u8> {
    if s.bytes().all(|b| b != 0 && b < 0x80) {
        return s.as_bytes().to_vec();
    }

    let mut out = Vec::with_capacity(s.len() + 8);
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
