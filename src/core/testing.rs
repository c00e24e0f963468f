// ─── Test Fixtures ───
// Class and jar builders plus an in-memory remote for network-free tests.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::core::classfile::code::CodeAttribute;
use crate::core::classfile::{attributes as attr, AttributeInfo, ClassFile, ConstantPool, MemberInfo};
use crate::core::downloader::{sha1_hex, FetchRequest, FetchResponse, RemoteSource};
use crate::core::error::{ProvisionError, ProvisionResult};

/// Write a zip with entries in exactly the given order.
pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Flip the stored bytes of the first entry, leaving headers intact.
pub fn corrupt_first_entry(path: &Path) {
    let mut bytes = std::fs::read(path).unwrap();
    let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]) as usize;
    let compressed = u32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]) as usize;
    let start = 30 + u16_at(26) + u16_at(28);
    for b in &mut bytes[start..start + compressed] {
        *b ^= 0xA5;
    }
    std::fs::write(path, bytes).unwrap();
}

/// Minimal class file builder. Members get no attributes unless built with
/// code or annotations.
pub struct ClassBuilder {
    pool: ConstantPool,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<MemberInfo>,
    methods: Vec<MemberInfo>,
    attributes: Vec<AttributeInfo>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(name).unwrap();
        let super_class = pool.intern_class("java/lang/Object").unwrap();
        Self {
            pool,
            access_flags: 0x0021,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_class = self.pool.intern_class(name).unwrap();
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        let idx = self.pool.intern_class(name).unwrap();
        self.interfaces.push(idx);
        self
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    fn member(&mut self, access_flags: u16, name: &str, desc: &str) -> MemberInfo {
        MemberInfo {
            access_flags,
            name_index: self.pool.intern_utf8(name).unwrap(),
            descriptor_index: self.pool.intern_utf8(desc).unwrap(),
            attributes: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, desc: &str) -> Self {
        let f = self.member(0x0001, name, desc);
        self.fields.push(f);
        self
    }

    pub fn method(mut self, name: &str, desc: &str) -> Self {
        let m = self.member(0x0001, name, desc);
        self.methods.push(m);
        self
    }

    /// Method with a `Code` attribute; `body` interns whatever the bytecode
    /// references and returns the instructions.
    pub fn method_with_code<F>(mut self, name: &str, desc: &str, body: F) -> Self
    where
        F: FnOnce(&mut ConstantPool) -> Vec<u8>,
    {
        let mut m = self.member(0x0001, name, desc);
        let code = body(&mut self.pool);
        let code = CodeAttribute {
            max_stack: 4,
            max_locals: 4,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        };
        m.attributes.push(AttributeInfo {
            name_index: self.pool.intern_utf8(attr::CODE).unwrap(),
            info: code.to_bytes(),
        });
        self.methods.push(m);
        self
    }

    /// Attach a raw attribute to the last method.
    pub fn method_attribute(mut self, name: &str, info: Vec<u8>) -> Self {
        let name_index = self.pool.intern_utf8(name).unwrap();
        self.methods
            .last_mut()
            .expect("method_attribute needs a method")
            .attributes
            .push(AttributeInfo { name_index, info });
        self
    }

    /// Class attribute whose payload may reference pool entries.
    pub fn class_attribute<F>(mut self, name: &str, info: F) -> Self
    where
        F: FnOnce(&mut ConstantPool) -> Vec<u8>,
    {
        let name_index = self.pool.intern_utf8(name).unwrap();
        let info = info(&mut self.pool);
        self.attributes.push(AttributeInfo { name_index, info });
        self
    }

    pub fn build_class(self) -> ClassFile {
        ClassFile {
            minor_version: 0,
            major_version: 61,
            pool: self.pool,
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
    }

    pub fn build(self) -> Vec<u8> {
        self.build_class().to_bytes()
    }
}

/// In-memory remote. ETags are derived from content, so a request carrying
/// the current tag gets `NotModified`.
#[derive(Default)]
pub struct FakeSource {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, usize>>,
    requested: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }

    /// Fail the next `n` requests for `url` with a network failure.
    pub fn fail_next(&self, url: &str, n: usize) {
        self.failures.lock().unwrap().insert(url.to_string(), n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    fn etag(body: &[u8]) -> String {
        format!("\"{}\"", sha1_hex(body))
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn fetch(&self, request: &FetchRequest) -> ProvisionResult<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(request.url.clone());

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&request.url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProvisionError::NetworkFailure {
                        url: request.url.clone(),
                        reason: "connection reset".into(),
                    });
                }
            }
        }

        let bodies = self.bodies.lock().unwrap();
        let Some(body) = bodies.get(&request.url) else {
            return Err(ProvisionError::DownloadFailed {
                url: request.url.clone(),
                status: 404,
            });
        };
        let etag = Self::etag(body);
        if request.etag.as_deref() == Some(etag.as_str()) {
            return Ok(FetchResponse::NotModified);
        }
        Ok(FetchResponse::Body {
            bytes: body.clone(),
            etag: Some(etag),
            last_modified: None,
        })
    }
}
