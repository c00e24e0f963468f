use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{ProvisionError, ProvisionResult};

/// What a constant pool index inside an annotation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationSlot {
    /// Utf8 field descriptor of the annotation type.
    TypeDescriptor,
    /// Utf8 element (annotation method) name.
    ElementName,
    /// Primitive or string constant of a `const_value`.
    ConstValue,
    /// Utf8 field descriptor of an enum type.
    EnumType,
    /// Utf8 enum constant name.
    EnumConst,
    /// Utf8 return descriptor of a class literal.
    ClassInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_index: u16,
    pub elements: Vec<(u16, ElementValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    Const { tag: u8, index: u16 },
    Enum { type_name: u16, const_name: u16 },
    Class(u16),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl Annotation {
    pub fn parse(r: &mut ByteReader<'_>) -> ProvisionResult<Self> {
        let type_index = r.u16()?;
        let count = r.u16()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = r.u16()?;
            elements.push((name, ElementValue::parse(r)?));
        }
        Ok(Self {
            type_index,
            elements,
        })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.u16(self.type_index);
        w.u16(self.elements.len() as u16);
        for (name, value) in &self.elements {
            w.u16(*name);
            value.write(w);
        }
    }

    /// Visit every constant pool index with its role, allowing rewrites.
    pub fn visit_indices(
        &mut self,
        f: &mut dyn FnMut(AnnotationSlot, &mut u16) -> ProvisionResult<()>,
    ) -> ProvisionResult<()> {
        f(AnnotationSlot::TypeDescriptor, &mut self.type_index)?;
        for (name, value) in &mut self.elements {
            f(AnnotationSlot::ElementName, name)?;
            value.visit_indices(f)?;
        }
        Ok(())
    }
}

impl ElementValue {
    pub fn parse(r: &mut ByteReader<'_>) -> ProvisionResult<Self> {
        let tag = r.u8()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                index: r.u16()?,
            },
            b'e' => ElementValue::Enum {
                type_name: r.u16()?,
                const_name: r.u16()?,
            },
            b'c' => ElementValue::Class(r.u16()?),
            b'@' => ElementValue::Annotation(Annotation::parse(r)?),
            b'[' => {
                let count = r.u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(ElementValue::parse(r)?);
                }
                ElementValue::Array(values)
            }
            other => {
                return Err(ProvisionError::class_format(
                    "annotation",
                    format!("unknown element value tag {:?}", other as char),
                ))
            }
        })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        match self {
            ElementValue::Const { tag, index } => {
                w.u8(*tag);
                w.u16(*index);
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                w.u8(b'e');
                w.u16(*type_name);
                w.u16(*const_name);
            }
            ElementValue::Class(index) => {
                w.u8(b'c');
                w.u16(*index);
            }
            ElementValue::Annotation(a) => {
                w.u8(b'@');
                a.write(w);
            }
            ElementValue::Array(values) => {
                w.u8(b'[');
                w.u16(values.len() as u16);
                for v in values {
                    v.write(w);
                }
            }
        }
    }

    pub fn visit_indices(
        &mut self,
        f: &mut dyn FnMut(AnnotationSlot, &mut u16) -> ProvisionResult<()>,
    ) -> ProvisionResult<()> {
        match self {
            ElementValue::Const { index, .. } => f(AnnotationSlot::ConstValue, index),
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                f(AnnotationSlot::EnumType, type_name)?;
                f(AnnotationSlot::EnumConst, const_name)
            }
            ElementValue::Class(index) => f(AnnotationSlot::ClassInfo, index),
            ElementValue::Annotation(a) => a.visit_indices(f),
            ElementValue::Array(values) => {
                for v in values {
                    v.visit_indices(f)?;
                }
                Ok(())
            }
        }
    }
}

/// `RuntimeVisibleAnnotations` / `RuntimeInvisibleAnnotations` payload.
pub fn parse_annotations(data: &[u8]) -> ProvisionResult<Vec<Annotation>> {
    let mut r = ByteReader::new(data);
    let count = r.u16()?;
    (0..count).map(|_| Annotation::parse(&mut r)).collect()
}

pub fn write_annotations(annotations: &[Annotation]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.u16(annotations.len() as u16);
    for a in annotations {
        a.write(&mut w);
    }
    w.into_inner()
}

/// `Runtime*ParameterAnnotations` payload: one annotation list per parameter.
pub fn parse_parameter_annotations(data: &[u8]) -> ProvisionResult<Vec<Vec<Annotation>>> {
    let mut r = ByteReader::new(data);
    let params = r.u8()?;
    let mut out = Vec::with_capacity(params as usize);
    for _ in 0..params {
        let count = r.u16()?;
        let anns = (0..count)
            .map(|_| Annotation::parse(&mut r))
            .collect::<ProvisionResult<Vec<_>>>()?;
        out.push(anns);
    }
    Ok(out)
}

pub fn write_parameter_annotations(params: &[Vec<Annotation>]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.u8(params.len() as u8);
    for anns in params {
        w.u16(anns.len() as u16);
        for a in anns {
            a.write(&mut w);
        }
    }
    w.into_inner()
}

/// `AnnotationDefault` payload: a single element value.
pub fn parse_annotation_default(data: &[u8]) -> ProvisionResult<ElementValue> {
    ElementValue::parse(&mut ByteReader::new(data))
}

pub fn write_annotation_default(value: &ElementValue) -> Vec<u8> {
    let mut w = ByteWriter::new();
    value.write(&mut w);
    w.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Annotation {
        Annotation {
            type_index: 1,
            elements: vec![
                (
                    2,
                    ElementValue::Enum {
                        type_name: 3,
                        const_name: 4,
                    },
                ),
                (
                    5,
                    ElementValue::Array(vec![
                        ElementValue::Class(6),
                        ElementValue::Const { tag: b's', index: 7 },
                    ]),
                ),
            ],
        }
    }

    #[test]
    fn nested_values_parse_back() {
        let bytes = write_annotations(&[sample()]);
        assert_eq!(parse_annotations(&bytes).unwrap(), vec![sample()]);
    }

    #[test]
    fn visitor_reports_slot_roles_in_order() {
        let mut a = sample();
        let mut seen = Vec::new();
        a.visit_indices(&mut |slot, idx| {
            seen.push((slot, *idx));
            *idx += 100;
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (AnnotationSlot::TypeDescriptor, 1),
                (AnnotationSlot::ElementName, 2),
                (AnnotationSlot::EnumType, 3),
                (AnnotationSlot::EnumConst, 4),
                (AnnotationSlot::ElementName, 5),
                (AnnotationSlot::ClassInfo, 6),
                (AnnotationSlot::ConstValue, 7),
            ]
        );
        assert_eq!(a.type_index, 101);
    }
}
