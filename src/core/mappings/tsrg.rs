use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};

use super::table::{ClassMapping, FieldMapping, MappingTable};

/// Parse TSRG text.
///
/// ```text
/// a net/minecraft/Foo
/// 	b count
/// 	c (La;)V accept
/// ```
///
/// Package lines (`a/ net/minecraft/`) are accepted and ignored.
pub fn parse(text: &str) -> ProvisionResult<MappingTable> {
    let mut table = MappingTable::new();
    let mut current: Option<String> = None;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let content = raw.split('#').next().unwrap_or("").trim_end();
        if content.trim().is_empty() {
            continue;
        }
        let indented = content.starts_with('\t') || content.starts_with(' ');
        let parts: Vec<&str> = content.split_whitespace().collect();

        if !indented {
            if parts.len() != 2 {
                return Err(parse_error(line_no, "class line needs two names"));
            }
            if parts[0].ends_with('/') {
                debug!("Ignoring package mapping {} -> {}", parts[0], parts[1]);
                current = None;
                continue;
            }
            table.insert_class(ClassMapping::new(parts[0], parts[1]));
            current = Some(parts[0].to_owned());
            continue;
        }

        let owner = current
            .as_deref()
            .ok_or_else(|| parse_error(line_no, "member line before any class"))?;
        let Some(class) = table.class_mut(owner) else {
            return Err(parse_error(line_no, "member line before any class"));
        };
        match parts.as_slice() {
            [obf, deobf] => {
                class.fields.insert(
                    (*obf).to_owned(),
                    FieldMapping {
                        deobf: (*deobf).to_owned(),
                        descriptor: None,
                    },
                );
            }
            [obf, desc, deobf] if desc.starts_with('(') => {
                class
                    .methods
                    .insert(((*obf).to_owned(), (*desc).to_owned()), (*deobf).to_owned());
            }
            [obf, desc, deobf] => {
                class.fields.insert(
                    (*obf).to_owned(),
                    FieldMapping {
                        deobf: (*deobf).to_owned(),
                        descriptor: Some((*desc).to_owned()),
                    },
                );
            }
            _ => return Err(parse_error(line_no, "member line needs two or three columns")),
        }
    }

    debug!("Parsed {} class mappings", table.len());
    Ok(table)
}

fn parse_error(line: usize, reason: &str) -> ProvisionError {
    ProvisionError::MappingParse {
        line,
        reason: reason.to_owned(),
    }
}

/// Serialise a table back to TSRG. Used to author mapping files.
pub fn write(table: &MappingTable) -> String {
    let mut out = String::new();
    for class in table.classes() {
        out.push_str(&format!("{} {}\n", class.obf, class.deobf));
        for (obf, field) in &class.fields {
            match &field.descriptor {
                Some(desc) => out.push_str(&format!("\t{obf} {desc} {}\n", field.deobf)),
                None => out.push_str(&format!("\t{obf} {}\n", field.deobf)),
            }
        }
        for ((obf, desc), deobf) in &class.methods {
            out.push_str(&format!("\t{obf} {desc} {deobf}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# header comment
a/ net/minecraft/
a net/minecraft/Alpha
\tb count
\tc (La;)V accept # trailing

d net/minecraft/Delta
\te I level
";

    #[test]
    fn parses_classes_fields_and_methods() {
        let t = parse(SAMPLE).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.field("a", "b"), Some("count"));
        assert_eq!(t.method("a", "c", "(La;)V"), Some("accept"));
        assert_eq!(t.field("d", "e"), Some("level"));
        assert_eq!(
            t.class("d").unwrap().fields["e"].descriptor.as_deref(),
            Some("I")
        );
    }

    #[test]
    fn written_tables_parse_back() {
        let t = parse(SAMPLE).unwrap();
        assert_eq!(parse(&write(&t)).unwrap(), t);
    }

    #[test]
    fn member_before_class_reports_line() {
        match parse("\ta b\n") {
            Err(ProvisionError::MappingParse { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
