// ─── Descriptors & Signatures ───
// Rewriting of class names embedded in field/method descriptors and in
// generic `Signature` strings.

/// Class-name lookup used while rewriting. `None` keeps the name unchanged.
pub type ClassLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Rewrite every `L<name>;` in a field or method descriptor.
pub fn remap_descriptor(desc: &str, map: ClassLookup<'_>) -> String {
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(pos) = rest.find('L') {
        out.push_str(&rest[..=pos]);
        let tail = &rest[pos + 1..];
        match tail.find(';') {
            Some(end) => {
                let name = &tail[..end];
                match map(name) {
                    Some(mapped) => out.push_str(&mapped),
                    None => out.push_str(name),
                }
                out.push(';');
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Rewrite an internal class name, including array class names like `[Lfoo;`.
pub fn remap_class_name(name: &str, map: ClassLookup<'_>) -> Option<String> {
    if name.starts_with('[') {
        let mapped = remap_descriptor(name, map);
        (mapped != name).then_some(mapped)
    } else {
        map(name)
    }
}

/// Rewrite a generic signature (class, method or field). Malformed input is
/// returned unchanged.
pub fn remap_signature(sig: &str, map: ClassLookup<'_>) -> String {
    let mut p = SignatureRewriter {
        src: sig.as_bytes(),
        sig,
        pos: 0,
        out: String::with_capacity(sig.len()),
        map,
    };
    match p.signature() {
        Some(()) if p.pos == p.src.len() => p.out,
        _ => sig.to_owned(),
    }
}

struct SignatureRewriter<'s, 'm> {
    src: &'s [u8],
    sig: &'s str,
    pos: usize,
    out: String,
    map: ClassLookup<'m>,
}

impl SignatureRewriter<'_, '_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        self.out.push(c as char);
        Some(c)
    }

    fn expect(&mut self, c: u8) -> Option<()> {
        (self.bump()? == c).then_some(())
    }

    /// Consume up to (not including) one of `stops`, without echoing.
    fn ident(&mut self, stops: &[u8]) -> Option<&str> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start || self.peek().is_none() {
            return None;
        }
        self.sig.get(start..self.pos)
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.formals()?;
        }
        if self.peek() == Some(b'(') {
            self.bump();
            while self.peek()? != b')' {
                self.java_type()?;
            }
            self.bump();
            self.java_type()?;
            while self.peek() == Some(b'^') {
                self.bump();
                self.java_type()?;
            }
        } else {
            // Field signature, or superclass followed by interfaces.
            while self.peek().is_some() {
                self.java_type()?;
            }
        }
        Some(())
    }

    fn formals(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            let name = self.ident(b":")?.to_owned();
            self.out.push_str(&name);
            while self.peek() == Some(b':') {
                self.bump();
                if matches!(self.peek()?, b'L' | b'T' | b'[') {
                    self.java_type()?;
                }
            }
        }
        self.expect(b'>')
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => {
                self.bump();
                Some(())
            }
            b'[' => {
                self.bump();
                self.java_type()
            }
            b'T' => {
                self.bump();
                let var = self.ident(b";")?.to_owned();
                self.out.push_str(&var);
                self.expect(b';')
            }
            b'L' => self.class_type(),
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let outer = self.ident(b"<.;")?.to_owned();
        let mut mapped_outer = (self.map)(&outer).unwrap_or_else(|| outer.clone());
        self.out.push_str(&mapped_outer);
        let mut orig_outer = outer;

        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    self.bump();
                    let simple = self.ident(b"<.;")?.to_owned();
                    let orig_inner = format!("{orig_outer}${simple}");
                    let mapped_inner = (self.map)(&orig_inner)
                        .unwrap_or_else(|| format!("{mapped_outer}${simple}"));
                    let prefix = format!("{mapped_outer}$");
                    let mapped_simple = match mapped_inner.strip_prefix(&prefix) {
                        Some(s) => s.to_owned(),
                        None => mapped_inner
                            .rsplit(['$', '/'])
                            .next()
                            .unwrap_or(&simple)
                            .to_owned(),
                    };
                    self.out.push_str(&mapped_simple);
                    orig_outer = orig_inner;
                    mapped_outer = mapped_inner;
                }
                b';' => {
                    self.bump();
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => {
                    self.bump();
                }
                b'+' | b'-' => {
                    self.bump();
                    self.java_type()?;
                }
                _ => self.java_type()?,
            }
        }
        self.expect(b'>')
    }
}

/// Parameter types of a method descriptor, each as a field descriptor.
pub fn parameter_types(desc: &str) -> Option<Vec<String>> {
    let inner = desc.strip_prefix('(')?;
    let close = inner.find(')')?;
    let params = &inner[..close];
    let bytes = params.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while bytes[i] == b'[' {
            i += 1;
            if i >= bytes.len() {
                return None;
            }
        }
        if bytes[i] == b'L' {
            i += params[i..].find(';')? + 1;
        } else {
            i += 1;
        }
        out.push(params[start..i].to_owned());
    }
    Some(out)
}

pub fn parameter_count(desc: &str) -> Option<usize> {
    parameter_types(desc).map(|p| p.len())
}

pub fn return_type(desc: &str) -> Option<&str> {
    desc.rfind(')').map(|i| &desc[i + 1..])
}
