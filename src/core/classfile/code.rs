use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{ProvisionError, ProvisionResult};

use super::{parse_attributes, write_attributes, AttributeInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// 0 for `finally`.
    pub catch_type: u16,
}

/// Decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn parse(data: &[u8]) -> ProvisionResult<Self> {
        let mut r = ByteReader::new(data);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let code_len = r.u32()? as usize;
        let code = r.bytes(code_len)?.to_vec();
        let handlers = r.u16()?;
        let mut exception_table = Vec::with_capacity(handlers as usize);
        for _ in 0..handlers {
            exception_table.push(ExceptionHandler {
                start_pc: r.u16()?,
                end_pc: r.u16()?,
                handler_pc: r.u16()?,
                catch_type: r.u16()?,
            });
        }
        let attributes = parse_attributes(&mut r)?;
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(self.code.len() + 32);
        w.u16(self.max_stack);
        w.u16(self.max_locals);
        w.u32(self.code.len() as u32);
        w.bytes(&self.code);
        w.u16(self.exception_table.len() as u16);
        for h in &self.exception_table {
            w.u16(h.start_pc);
            w.u16(h.end_pc);
            w.u16(h.handler_pc);
            w.u16(h.catch_type);
        }
        write_attributes(&mut w, &self.attributes);
        w.into_inner()
    }
}

/// Constant pool operand inside a bytecode stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOperand {
    pub opcode: u8,
    /// Byte offset of the operand (not the opcode).
    pub offset: usize,
    /// `ldc` carries a one-byte index; everything else two.
    pub wide: bool,
}

impl PoolOperand {
    pub fn read(&self, code: &[u8]) -> u16 {
        if self.wide {
            u16::from_be_bytes([code[self.offset], code[self.offset + 1]])
        } else {
            code[self.offset] as u16
        }
    }

    pub fn write(&self, code: &mut [u8], index: u16) -> ProvisionResult<()> {
        if self.wide {
            code[self.offset..self.offset + 2].copy_from_slice(&index.to_be_bytes());
        } else {
            code[self.offset] = u8::try_from(index).map_err(|_| {
                ProvisionError::class_format(
                    "code",
                    format!("ldc operand {index} does not fit in one byte"),
                )
            })?;
        }
        Ok(())
    }
}

pub const LDC: u8 = 0x12;
pub const INVOKEDYNAMIC: u8 = 0xba;

/// Walk the instruction stream and list every constant pool operand.
pub fn pool_operands(code: &[u8]) -> ProvisionResult<Vec<PoolOperand>> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        let len = match op {
            LDC => {
                out.push(PoolOperand {
                    opcode: op,
                    offset: pc + 1,
                    wide: false,
                });
                2
            }
            // ldc_w, ldc2_w, get/put field/static, invoke*, new, anewarray,
            // checkcast, instanceof
            0x13 | 0x14 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1 => {
                out.push(PoolOperand {
                    opcode: op,
                    offset: pc + 1,
                    wide: true,
                });
                3
            }
            // invokeinterface, invokedynamic
            0xb9 | INVOKEDYNAMIC => {
                out.push(PoolOperand {
                    opcode: op,
                    offset: pc + 1,
                    wide: true,
                });
                5
            }
            // multianewarray
            0xc5 => {
                out.push(PoolOperand {
                    opcode: op,
                    offset: pc + 1,
                    wide: true,
                });
                4
            }
            _ => instruction_length(code, pc)?,
        };
        pc += len;
    }
    if pc != code.len() {
        return Err(ProvisionError::class_format(
            "code",
            "instruction runs past the end of the method body",
        ));
    }
    Ok(out)
}

/// Total length of the non-pool instruction at `pc`, opcode included.
fn instruction_length(code: &[u8], pc: usize) -> ProvisionResult<usize> {
    let op = code[pc];
    Ok(match op {
        // bipush, loads/stores with an index, ret, newarray
        0x10 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        // sipush, iinc, branches
        0x11 | 0x84 | 0x99..=0xa8 | 0xc6 | 0xc7 => 3,
        // goto_w, jsr_w
        0xc8 | 0xc9 => 5,
        // tableswitch
        0xaa => {
            let base = pc + 1 + padding(pc);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return Err(ProvisionError::class_format("code", "tableswitch high < low"));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            base + 12 + count * 4 - pc
        }
        // lookupswitch
        0xab => {
            let base = pc + 1 + padding(pc);
            let pairs = read_i32(code, base + 4)?;
            if pairs < 0 {
                return Err(ProvisionError::class_format("code", "negative lookupswitch count"));
            }
            base + 8 + pairs as usize * 8 - pc
        }
        // wide
        0xc4 => match code.get(pc + 1) {
            Some(0x84) => 6,
            Some(_) => 4,
            None => {
                return Err(ProvisionError::class_format("code", "truncated wide instruction"))
            }
        },
        0xcb..=0xfd => {
            return Err(ProvisionError::class_format(
                "code",
                format!("unknown opcode {op:#04x} at {pc}"),
            ))
        }
        _ => 1,
    })
}

fn padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn read_i32(code: &[u8], at: usize) -> ProvisionResult<i32> {
    code.get(at..at + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ProvisionError::Truncated {
            offset: at,
            needed: 4,
        })
}

/// Offsets of `Object_variable_info` class indices inside a `StackMapTable`.
pub fn stack_map_class_offsets(data: &[u8]) -> ProvisionResult<Vec<usize>> {
    let mut r = ByteReader::new(data);
    let mut out = Vec::new();
    let frames = r.u16()?;
    for _ in 0..frames {
        let frame_type = r.u8()?;
        match frame_type {
            0..=63 => {}
            64..=127 => verification_type(&mut r, &mut out)?,
            247 => {
                r.u16()?;
                verification_type(&mut r, &mut out)?;
            }
            248..=251 => {
                r.u16()?;
            }
            252..=254 => {
                r.u16()?;
                for _ in 0..(frame_type - 251) {
                    verification_type(&mut r, &mut out)?;
                }
            }
            255 => {
                r.u16()?;
                let locals = r.u16()?;
                for _ in 0..locals {
                    verification_type(&mut r, &mut out)?;
                }
                let stack = r.u16()?;
                for _ in 0..stack {
                    verification_type(&mut r, &mut out)?;
                }
            }
            other => {
                return Err(ProvisionError::class_format(
                    "StackMapTable",
                    format!("reserved frame type {other}"),
                ))
            }
        }
    }
    Ok(out)
}

fn verification_type(r: &mut ByteReader<'_>, out: &mut Vec<usize>) -> ProvisionResult<()> {
    match r.u8()? {
        0..=6 => {}
        7 => {
            out.push(r.position());
            r.u16()?;
        }
        // Uninitialized(offset)
        8 => {
            r.u16()?;
        }
        other => {
            return Err(ProvisionError::class_format(
                "StackMapTable",
                format!("unknown verification type {other}"),
            ))
        }
    }
    Ok(())
}
