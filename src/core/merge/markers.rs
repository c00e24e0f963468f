// ─── Side Markers ───
// `@Environment` / `@EnvironmentInterface` annotations recording which side
// contributed a class, member or interface.

use crate::core::cache::layout::Side;
use crate::core::classfile::annotations::{parse_annotations, write_annotations, Annotation, ElementValue};
use crate::core::classfile::attributes::RUNTIME_VISIBLE_ANNOTATIONS;
use crate::core::classfile::{AttributeInfo, ClassFile, ConstantPool};
use crate::core::error::ProvisionResult;

pub const ENVIRONMENT: &str = "Lnet/fabricmc/api/Environment;";
pub const ENV_TYPE: &str = "Lnet/fabricmc/api/EnvType;";
pub const ENVIRONMENT_INTERFACE: &str = "Lnet/fabricmc/api/EnvironmentInterface;";
pub const ENVIRONMENT_INTERFACES: &str = "Lnet/fabricmc/api/EnvironmentInterfaces;";

fn env_value(pool: &mut ConstantPool, side: Side) -> ProvisionResult<ElementValue> {
    Ok(ElementValue::Enum {
        type_name: pool.intern_utf8(ENV_TYPE)?,
        const_name: pool.intern_utf8(side.env_type())?,
    })
}

/// `@Environment(EnvType.<side>)`
pub fn environment(pool: &mut ConstantPool, side: Side) -> ProvisionResult<Annotation> {
    Ok(Annotation {
        type_index: pool.intern_utf8(ENVIRONMENT)?,
        elements: vec![(pool.intern_utf8("value")?, env_value(pool, side)?)],
    })
}

/// `@EnvironmentInterface(value = EnvType.<side>, itf = <interface>.class)`
pub fn environment_interface(
    pool: &mut ConstantPool,
    side: Side,
    interface: &str,
) -> ProvisionResult<Annotation> {
    Ok(Annotation {
        type_index: pool.intern_utf8(ENVIRONMENT_INTERFACE)?,
        elements: vec![
            (pool.intern_utf8("value")?, env_value(pool, side)?),
            (
                pool.intern_utf8("itf")?,
                ElementValue::Class(pool.intern_utf8(&format!("L{interface};"))?),
            ),
        ],
    })
}

/// One `@EnvironmentInterface` as-is, several wrapped in
/// `@EnvironmentInterfaces`.
pub fn environment_interfaces(
    pool: &mut ConstantPool,
    mut markers: Vec<Annotation>,
) -> ProvisionResult<Option<Annotation>> {
    Ok(match markers.len() {
        0 => None,
        1 => markers.pop(),
        _ => Some(Annotation {
            type_index: pool.intern_utf8(ENVIRONMENT_INTERFACES)?,
            elements: vec![(
                pool.intern_utf8("value")?,
                ElementValue::Array(markers.into_iter().map(ElementValue::Annotation).collect()),
            )],
        }),
    })
}

/// Append annotations to the `RuntimeVisibleAnnotations` of an attribute
/// list, creating the attribute when missing.
pub fn add_annotations(
    pool: &mut ConstantPool,
    attributes: &mut Vec<AttributeInfo>,
    annotations: Vec<Annotation>,
) -> ProvisionResult<()> {
    if annotations.is_empty() {
        return Ok(());
    }
    for attribute in attributes.iter_mut() {
        if pool.utf8(attribute.name_index)? == RUNTIME_VISIBLE_ANNOTATIONS {
            let mut existing = parse_annotations(&attribute.info)?;
            existing.extend(annotations);
            attribute.info = write_annotations(&existing);
            return Ok(());
        }
    }
    attributes.push(AttributeInfo {
        name_index: pool.intern_utf8(RUNTIME_VISIBLE_ANNOTATIONS)?,
        info: write_annotations(&annotations),
    });
    Ok(())
}

/// Mark a class that only one side ships.
pub fn mark_class(class: &mut ClassFile, side: Side) -> ProvisionResult<()> {
    let marker = environment(&mut class.pool, side)?;
    add_annotations(&mut class.pool, &mut class.attributes, vec![marker])
}

/// Side recorded by an `@Environment` marker in `attributes`, if any.
pub fn environment_of(pool: &ConstantPool, attributes: &[AttributeInfo]) -> ProvisionResult<Option<Side>> {
    for attribute in attributes {
        if pool.utf8(attribute.name_index)? != RUNTIME_VISIBLE_ANNOTATIONS {
            continue;
        }
        for a in parse_annotations(&attribute.info)? {
            if pool.utf8(a.type_index)? != ENVIRONMENT {
                continue;
            }
            for (_, value) in &a.elements {
                if let ElementValue::Enum { const_name, .. } = value {
                    let side = pool.utf8(*const_name)?;
                    return Ok(Side::BOTH.into_iter().find(|s| s.env_type() == side));
                }
            }
        }
    }
    Ok(None)
}
