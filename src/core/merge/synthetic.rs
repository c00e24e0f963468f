// ─── Synthetic Parameter Offset ───
// javac leaves the synthetic leading constructor parameters of enums
// (name, ordinal) and inner classes (outer instance) out of the parameter
// annotation tables. Pad those tables so annotation `i` lines up with
// descriptor parameter `i`.

use crate::core::classfile::annotations::{parse_parameter_annotations, write_parameter_annotations};
use crate::core::classfile::attributes::{self as attr, parse_inner_classes};
use crate::core::classfile::descriptor::parameter_count;
use crate::core::classfile::{ClassFile, ACC_STATIC};
use crate::core::error::ProvisionResult;

/// Number of synthetic leading constructor parameters.
pub fn synthetic_param_offset(class: &ClassFile) -> ProvisionResult<usize> {
    if class.is_enum() {
        return Ok(2);
    }
    let Some(inner) = class.attribute(attr::INNER_CLASSES) else {
        return Ok(0);
    };
    for entry in parse_inner_classes(&inner.info)? {
        if entry.inner_class == class.this_class
            && entry.outer_class != 0
            && entry.access_flags & ACC_STATIC == 0
        {
            return Ok(1);
        }
    }
    Ok(0)
}

/// Pad constructor parameter annotations. Returns whether anything changed.
pub fn apply_param_offset(class: &mut ClassFile) -> ProvisionResult<bool> {
    let offset = synthetic_param_offset(class)?;
    if offset == 0 {
        return Ok(false);
    }

    let mut changed = false;
    for method in &mut class.methods {
        if class.pool.utf8(method.name_index)? != "<init>" {
            continue;
        }
        let Some(params) = parameter_count(&class.pool.utf8(method.descriptor_index)?) else {
            continue;
        };
        for attribute in &mut method.attributes {
            let name = class.pool.utf8(attribute.name_index)?;
            if name != attr::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
                && name != attr::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
            {
                continue;
            }
            let mut table = parse_parameter_annotations(&attribute.info)?;
            let pad = offset.min(params.saturating_sub(table.len()));
            if pad == 0 {
                continue;
            }
            let mut padded = vec![Vec::new(); pad];
            padded.append(&mut table);
            attribute.info = write_parameter_annotations(&padded);
            changed = true;
        }
    }
    Ok(changed)
}
