// ─── Binary Patch ───
// One patch for one archive entry.
//
// Layout (big-endian):
//   u8   format version (1)
//   utf  target entry path
//   u8   pre-image exists
//   [20] pre-image SHA-1            (only when the pre-image exists)
//   u32  post-image length
//   u32  control count
//   per control:
//     u32 add length, u32 extra length, i64 seek
//     [add length]   bytes added to the pre-image at the cursor
//     [extra length] bytes written verbatim
//
// Applying a control writes `old[cursor + k] + add[k]`, then the extra bytes,
// then moves the cursor by `add length + seek`.

use std::collections::HashMap;

use sha1::{Digest, Sha1};

use crate::core::codec::{ByteReader, ByteWriter};
use crate::core::error::{ProvisionError, ProvisionResult};

pub const FORMAT_VERSION: u8 = 1;

/// Shortest run of equal bytes the differ treats as a match.
const MIN_MATCH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub add: Vec<u8>,
    pub extra: Vec<u8>,
    pub seek: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinPatch {
    pub target: String,
    /// SHA-1 of the entry the patch expects; `None` for an added entry.
    pub pre_image: Option<[u8; 20]>,
    pub new_len: u32,
    pub controls: Vec<Control>,
}

fn sha1(bytes: &[u8]) -> [u8; 20] {
    Sha1::digest(bytes).into()
}

enum Segment<'a> {
    Match { old_start: usize, len: usize },
    Literal(&'a [u8]),
}

/// Greedy block matcher: positions of every `MIN_MATCH` window of `old`
/// (first occurrence), then a scan over `new` that prefers continuing at
/// the current cursor.
fn segments<'a>(old: &[u8], new: &'a [u8]) -> Vec<Segment<'a>> {
    let mut index: HashMap<&[u8], usize> = HashMap::new();
    if old.len() >= MIN_MATCH {
        for i in 0..=old.len() - MIN_MATCH {
            index.entry(&old[i..i + MIN_MATCH]).or_insert(i);
        }
    }

    let mut out = Vec::new();
    let (mut pos, mut literal_start, mut cursor) = (0, 0, 0);
    while pos + MIN_MATCH <= new.len() {
        let window = &new[pos..pos + MIN_MATCH];
        let start = if old.get(cursor..cursor + MIN_MATCH) == Some(window) {
            Some(cursor)
        } else {
            index.get(window).copied()
        };
        let Some(old_start) = start else {
            pos += 1;
            continue;
        };

        let mut len = MIN_MATCH;
        while old_start + len < old.len() && pos + len < new.len() && old[old_start + len] == new[pos + len] {
            len += 1;
        }
        if literal_start < pos {
            out.push(Segment::Literal(&new[literal_start..pos]));
        }
        out.push(Segment::Match { old_start, len });
        pos += len;
        literal_start = pos;
        cursor = old_start + len;
    }
    if literal_start < new.len() {
        out.push(Segment::Literal(&new[literal_start..]));
    }
    out
}

impl BinPatch {
    /// Patch turning `old` into `new`. `old == None` makes an add patch.
    pub fn diff(target: &str, old: Option<&[u8]>, new: &[u8]) -> ProvisionResult<Self> {
        let new_len = u32::try_from(new.len()).map_err(|_| ProvisionError::MalformedPatch {
            target: target.to_owned(),
            reason: format!("post-image of {} bytes is too large", new.len()),
        })?;
        let base = old.unwrap_or_default();

        let mut controls: Vec<Control> = Vec::new();
        let mut cursor = 0usize;
        for segment in segments(base, new) {
            match segment {
                Segment::Match { old_start, len } => {
                    if old_start != cursor {
                        let delta = old_start as i64 - cursor as i64;
                        match controls.last_mut() {
                            Some(last) => last.seek += delta,
                            None => controls.push(Control {
                                add: Vec::new(),
                                extra: Vec::new(),
                                seek: delta,
                            }),
                        }
                    }
                    controls.push(Control {
                        add: vec![0; len],
                        extra: Vec::new(),
                        seek: 0,
                    });
                    cursor = old_start + len;
                }
                Segment::Literal(bytes) => match controls.last_mut() {
                    Some(last) => last.extra.extend_from_slice(bytes),
                    None => controls.push(Control {
                        add: Vec::new(),
                        extra: bytes.to_vec(),
                        seek: 0,
                    }),
                },
            }
        }

        Ok(Self {
            target: target.to_owned(),
            pre_image: old.map(sha1),
            new_len,
            controls,
        })
    }

    pub fn is_addition(&self) -> bool {
        self.pre_image.is_none()
    }

    fn malformed(&self, reason: impl Into<String>) -> ProvisionError {
        ProvisionError::MalformedPatch {
            target: self.target.clone(),
            reason: reason.into(),
        }
    }

    /// Check the pre-image, then rebuild the post-image.
    pub fn apply(&self, old: Option<&[u8]>) -> ProvisionResult<Vec<u8>> {
        let conflict = |expected: String, actual: String| ProvisionError::PatchConflict {
            target: self.target.clone(),
            expected,
            actual,
        };
        match (&self.pre_image, old) {
            (Some(expected), Some(data)) => {
                let actual = sha1(data);
                if actual != *expected {
                    return Err(conflict(hex::encode(expected), hex::encode(actual)));
                }
            }
            (Some(expected), None) => return Err(conflict(hex::encode(expected), "absent".into())),
            (None, Some(data)) => return Err(conflict("absent".into(), hex::encode(sha1(data)))),
            (None, None) => {}
        }

        let old = old.unwrap_or_default();
        // Sized from the bytes actually carried, not the declared length
        let carried: usize = self.controls.iter().map(|c| c.add.len() + c.extra.len()).sum();
        let mut out = Vec::with_capacity(carried);
        let mut cursor: i64 = 0;
        for control in &self.controls {
            let start = usize::try_from(cursor).map_err(|_| self.malformed("cursor before start"))?;
            let source = start
                .checked_add(control.add.len())
                .and_then(|end| old.get(start..end))
                .ok_or_else(|| self.malformed("add region past end of pre-image"))?;
            out.extend(source.iter().zip(&control.add).map(|(o, a)| o.wrapping_add(*a)));
            out.extend_from_slice(&control.extra);
            cursor = i64::try_from(control.add.len())
                .ok()
                .and_then(|n| cursor.checked_add(n))
                .and_then(|c| c.checked_add(control.seek))
                .ok_or_else(|| self.malformed("seek overflows the cursor"))?;
        }

        if out.len() != self.new_len as usize {
            return Err(self.malformed(format!(
                "produced {} bytes, expected {}",
                out.len(),
                self.new_len
            )));
        }
        Ok(out)
    }

    pub fn to_bytes(&self) -> ProvisionResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.u8(FORMAT_VERSION);
        w.utf(&self.target)?;
        match &self.pre_image {
            Some(hash) => {
                w.u8(1);
                w.bytes(hash);
            }
            None => w.u8(0),
        }
        w.u32(self.new_len);
        w.u32(self.controls.len() as u32);
        for c in &self.controls {
            w.u32(c.add.len() as u32);
            w.u32(c.extra.len() as u32);
            w.i64(c.seek);
            w.bytes(&c.add);
            w.bytes(&c.extra);
        }
        Ok(w.into_inner())
    }

    pub fn parse(data: &[u8]) -> ProvisionResult<Self> {
        let mut r = ByteReader::new(data);
        let version = r.u8()?;
        let target = r.utf()?;
        if version != FORMAT_VERSION {
            return Err(ProvisionError::MalformedPatch {
                target,
                reason: format!("unsupported format version {version}"),
            });
        }
        let pre_image = match r.u8()? {
            0 => None,
            _ => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(r.bytes(20)?);
                Some(hash)
            }
        };
        let new_len = r.u32()?;
        let count = r.u32()?;
        let mut controls = Vec::new();
        for _ in 0..count {
            let add_len = r.u32()? as usize;
            let extra_len = r.u32()? as usize;
            let seek = r.i64()?;
            controls.push(Control {
                add: r.bytes(add_len)?.to_vec(),
                extra: r.bytes(extra_len)?.to_vec(),
                seek,
            });
        }
        Ok(Self {
            target,
            pre_image,
            new_len,
            controls,
        })
    }
}
