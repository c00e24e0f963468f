// ─── Class Merger ───
// Splices the client and server definitions of one class into a single
// class on a fresh constant pool. Client is primary: shared members keep
// the client body; side-exclusive members and interfaces are marked.

use std::collections::HashSet;
use std::hash::Hash;

use tracing::debug;

use crate::core::cache::layout::Side;
use crate::core::classfile::attributes::{self as attr, parse_inner_classes, parse_u16_list};
use crate::core::classfile::relocate::{seed_ldc_constants, Importer, MergeTarget};
use crate::core::classfile::{parse_entry, AttributeInfo, ClassFile, MemberInfo};
use crate::core::error::ProvisionResult;

use super::markers;

/// Where an element of a merged list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Both,
    Only(Side),
}

/// Merge two ordered lists, keeping each side's relative order. Elements
/// exclusive to one side are emitted next to their neighbours; when the
/// sides disagree on the order of shared elements the client order wins.
pub fn interleave<K: Eq + Hash + Clone>(client: &[K], server: &[K]) -> Vec<(K, Origin)> {
    let in_client: HashSet<&K> = client.iter().collect();
    let in_server: HashSet<&K> = server.iter().collect();
    let mut emitted: HashSet<K> = HashSet::new();
    let mut out = Vec::with_capacity(client.len().max(server.len()));
    let (mut i, mut j) = (0, 0);

    loop {
        while i < client.len() && emitted.contains(&client[i]) {
            i += 1;
        }
        while j < server.len() && emitted.contains(&server[j]) {
            j += 1;
        }
        if i >= client.len() && j >= server.len() {
            break;
        }

        if i < client.len() && j < server.len() && client[i] == server[j] {
            emitted.insert(client[i].clone());
            out.push((client[i].clone(), Origin::Both));
            i += 1;
            j += 1;
            continue;
        }

        let mut progressed = false;
        while i < client.len() && !in_server.contains(&client[i]) {
            out.push((client[i].clone(), Origin::Only(Side::Client)));
            i += 1;
            progressed = true;
        }
        while j < server.len() && !in_client.contains(&server[j]) {
            out.push((server[j].clone(), Origin::Only(Side::Server)));
            j += 1;
            progressed = true;
        }
        if !progressed && i < client.len() {
            emitted.insert(client[i].clone());
            out.push((client[i].clone(), Origin::Both));
            i += 1;
        }
    }
    out
}

fn member_keys(class: &ClassFile, members: &[MemberInfo]) -> ProvisionResult<Vec<(String, String)>> {
    members
        .iter()
        .map(|m| Ok((m.name(&class.pool)?, m.descriptor(&class.pool)?)))
        .collect()
}

/// Merge the member lists of one kind (fields or methods).
fn merge_members(
    target: &mut MergeTarget,
    client: &mut Importer<'_>,
    server: &mut Importer<'_>,
    pick: fn(&ClassFile) -> &[MemberInfo],
) -> ProvisionResult<Vec<MemberInfo>> {
    let c = client.source();
    let s = server.source();
    let c_members = pick(c);
    let s_members = pick(s);
    let c_keys = member_keys(c, c_members)?;
    let s_keys = member_keys(s, s_members)?;

    let mut out = Vec::new();
    for (key, origin) in interleave(&c_keys, &s_keys) {
        let mut member = match origin {
            Origin::Both | Origin::Only(Side::Client) => {
                let pos = c_keys.iter().position(|k| *k == key).unwrap_or_default();
                client.member(target, &c_members[pos])?
            }
            Origin::Only(Side::Server) => {
                let pos = s_keys.iter().position(|k| *k == key).unwrap_or_default();
                server.member(target, &s_members[pos])?
            }
        };
        if let Origin::Only(side) = origin {
            let marker = markers::environment(&mut target.pool, side)?;
            markers::add_annotations(&mut target.pool, &mut member.attributes, vec![marker])?;
        }
        out.push(member);
    }
    Ok(out)
}

/// Union the server's inner-class and nest tables into the client's.
fn union_tables(
    target: &mut MergeTarget,
    attributes: &mut Vec<AttributeInfo>,
    server_tables: Vec<AttributeInfo>,
) -> ProvisionResult<()> {
    for table in server_tables {
        let name = target.pool.utf8(table.name_index)?;
        let existing = attributes.iter_mut().find(|a| a.name_index == table.name_index);
        let Some(existing) = existing else {
            attributes.push(table);
            continue;
        };
        if name == attr::INNER_CLASSES {
            let mut entries = parse_inner_classes(&existing.info)?;
            for entry in parse_inner_classes(&table.info)? {
                if !entries.iter().any(|e| e.inner_class == entry.inner_class) {
                    entries.push(entry);
                }
            }
            existing.info = attr::write_inner_classes(&entries);
        } else {
            let mut items = parse_u16_list(&existing.info)?;
            for item in parse_u16_list(&table.info)? {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            existing.info = attr::write_u16_list(&items);
        }
    }
    Ok(())
}

fn is_union_table(name: &str) -> bool {
    matches!(
        name,
        attr::INNER_CLASSES | attr::NEST_MEMBERS | attr::PERMITTED_SUBCLASSES
    )
}

/// Merge two differing definitions of the class stored at `entry`.
pub fn merge_classes(entry: &str, client: &[u8], server: &[u8]) -> ProvisionResult<Vec<u8>> {
    let c = parse_entry(entry, client)?;
    let s = parse_entry(entry, server)?;

    let mut target = MergeTarget::new();
    let mut ci = Importer::new(&c)?;
    let mut si = Importer::new(&s)?;
    seed_ldc_constants(&mut target, &mut [&mut ci, &mut si])?;

    let this_class = ci.constant(&mut target, c.this_class)?;
    let super_class = ci.constant(&mut target, c.super_class)?;

    // Interfaces
    let c_itfs = c.interface_names()?;
    let s_itfs = s.interface_names()?;
    let mut interfaces = Vec::new();
    let mut itf_markers = Vec::new();
    for (name, origin) in interleave(&c_itfs, &s_itfs) {
        let idx = match origin {
            Origin::Both | Origin::Only(Side::Client) => {
                let pos = c_itfs.iter().position(|n| *n == name).unwrap_or_default();
                ci.constant(&mut target, c.interfaces[pos])?
            }
            Origin::Only(Side::Server) => {
                let pos = s_itfs.iter().position(|n| *n == name).unwrap_or_default();
                si.constant(&mut target, s.interfaces[pos])?
            }
        };
        interfaces.push(idx);
        if let Origin::Only(side) = origin {
            itf_markers.push(markers::environment_interface(&mut target.pool, side, &name)?);
        }
    }

    let fields = merge_members(&mut target, &mut ci, &mut si, |c| &c.fields)?;
    let methods = merge_members(&mut target, &mut ci, &mut si, |c| &c.methods)?;

    let mut attributes = ci.attributes(&mut target, &c.attributes)?;
    let server_tables: Vec<AttributeInfo> = s
        .attributes
        .iter()
        .filter(|a| s.pool.utf8(a.name_index).is_ok_and(|n| is_union_table(&n)))
        .cloned()
        .collect();
    let server_tables = si.attributes(&mut target, &server_tables)?;
    union_tables(&mut target, &mut attributes, server_tables)?;

    if let Some(marker) = markers::environment_interfaces(&mut target.pool, itf_markers)? {
        markers::add_annotations(&mut target.pool, &mut attributes, vec![marker])?;
    }
    if let Some(bootstrap) = target.bootstrap_attribute()? {
        attributes.push(bootstrap);
    }

    let merged = ClassFile {
        minor_version: c.minor_version,
        major_version: c.major_version,
        pool: target.pool,
        access_flags: c.access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    };
    debug!(
        "Merged {}: {} fields, {} methods",
        entry,
        merged.fields.len(),
        merged.methods.len()
    );
    Ok(merged.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classfile::Constant;
    use crate::core::testing::ClassBuilder;

    fn names(class: &ClassFile, members: &[MemberInfo]) -> Vec<String> {
        members.iter().map(|m| m.name(&class.pool).unwrap()).collect()
    }

    fn side(class: &ClassFile, member: &MemberInfo) -> Option<Side> {
        markers::environment_of(&class.pool, &member.attributes).unwrap()
    }

    #[test]
    fn interleave_keeps_relative_order() {
        let merged = interleave(&["a", "b", "d"], &["a", "c", "d", "e"]);
        let keys: Vec<&str> = merged.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(merged[1].1, Origin::Only(Side::Client));
        assert_eq!(merged[2].1, Origin::Only(Side::Server));
        assert_eq!(merged[3].1, Origin::Both);
    }

    #[test]
    fn interleave_survives_disagreeing_order() {
        let merged = interleave(&["x", "y"], &["y", "x"]);
        assert_eq!(merged, vec![("x", Origin::Both), ("y", Origin::Both)]);
    }

    #[test]
    fn exclusive_members_are_unioned_and_marked() {
        let client = ClassBuilder::new("net/Foo")
            .field("shared", "I")
            .field("render", "J")
            .method("tick", "()V")
            .method_with_code("draw", "()Ljava/lang/String;", |pool| {
                let s = pool.intern_utf8("client").unwrap();
                let s = pool.intern(Constant::String(s)).unwrap();
                vec![0x12, s as u8, 0xb0]
            })
            .build();
        let server = ClassBuilder::new("net/Foo")
            .interface("net/Ticking")
            .field("shared", "I")
            .method("tick", "()V")
            .method("save", "()V")
            .build();

        let merged = ClassFile::parse(&merge_classes("net/Foo.class", &client, &server).unwrap())
            .unwrap();
        assert_eq!(merged.name().unwrap(), "net/Foo");
        assert_eq!(names(&merged, &merged.fields), vec!["shared", "render"]);
        assert_eq!(names(&merged, &merged.methods), vec!["tick", "draw", "save"]);
        assert_eq!(side(&merged, &merged.fields[0]), None);
        assert_eq!(side(&merged, &merged.fields[1]), Some(Side::Client));
        assert_eq!(side(&merged, &merged.methods[1]), Some(Side::Client));
        assert_eq!(side(&merged, &merged.methods[2]), Some(Side::Server));
        assert_eq!(merged.interface_names().unwrap(), vec!["net/Ticking"]);

        let annotations = merged.attribute(attr::RUNTIME_VISIBLE_ANNOTATIONS).unwrap();
        let parsed = crate::core::classfile::annotations::parse_annotations(&annotations.info).unwrap();
        assert_eq!(
            merged.pool.utf8(parsed[0].type_index).unwrap(),
            markers::ENVIRONMENT_INTERFACE
        );

        // ldc operand still resolves to the client string
        let code = merged.methods[1].attribute(&merged.pool, attr::CODE).unwrap();
        let code = crate::core::classfile::code::CodeAttribute::parse(&code.info).unwrap();
        match merged.pool.get(code.code[1] as u16).unwrap() {
            Constant::String(s) => assert_eq!(merged.pool.utf8(*s).unwrap(), "client"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn inner_class_tables_are_unioned() {
        let table = |inner: &'static str| {
            move |pool: &mut crate::core::classfile::ConstantPool| {
                attr::write_inner_classes(&[attr::InnerClassEntry {
                    inner_class: pool.intern_class(inner).unwrap(),
                    outer_class: pool.intern_class("o").unwrap(),
                    inner_name: pool.intern_utf8(&inner[2..]).unwrap(),
                    access_flags: 0x0008,
                }])
            }
        };
        let client = ClassBuilder::new("o").class_attribute(attr::INNER_CLASSES, table("o$C")).build();
        let server = ClassBuilder::new("o")
            .field("x", "I")
            .class_attribute(attr::INNER_CLASSES, table("o$S"))
            .build();

        let merged = ClassFile::parse(&merge_classes("o.class", &client, &server).unwrap()).unwrap();
        let inner = merged.attribute(attr::INNER_CLASSES).unwrap();
        let inner: Vec<String> = parse_inner_classes(&inner.info)
            .unwrap()
            .iter()
            .map(|e| merged.pool.class_name(e.inner_class).unwrap())
            .collect();
        assert_eq!(inner, vec!["o$C", "o$S"]);
    }
}
