// src/relocate/classfile.rs

//! Constant-pool rewriting for `.class` files
//!
//! Every binary reference a class makes to another class goes through a
//! `CONSTANT_Utf8` entry: plain internal names for `CONSTANT_Class`,
//! field and method descriptors, generic signatures, and string literals.
//! Relocation therefore only has to rewrite those entries; every other
//! constant and everything after the pool is copied byte-for-byte.
//!
//! Utf8 constants are modified UTF-8, but package prefixes are ASCII, so
//! matching and splicing work directly on the bytes.

use super::rules::RelocationMap;
use thiserror::Error;

const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Bytes after which an `L` starts a class type, for values that are not
/// well-formed descriptors
const SIGNATURE_DELIMITERS: &[u8] = b"();[<>*+-:^";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("not a class file (bad magic)")]
    BadMagic,

    #[error("class file truncated at offset {0}")]
    Truncated(usize),

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag { tag: u8, index: u16 },

    #[error("constant pool index {0} does not name a class")]
    BadClassIndex(u16),

    #[error("long or double constant at index {0} overruns the constant pool")]
    WideConstantOverrun(u16),

    #[error("relocated constant at index {0} exceeds 65535 bytes")]
    ConstantTooLong(u16),
}

type ClassResult<T> = std::result::Result<T, ClassFileError>;

#[derive(Debug, Clone, Copy)]
enum Constant {
    /// Utf8 payload span (without tag and length)
    Utf8 { start: usize, end: usize },
    Class { name_index: u16 },
    /// Any other constant; span includes the tag
    Other { start: usize, end: usize },
    /// Second slot of a long or double
    Unusable,
}

struct ConstantPool {
    /// Index 0 is unused, as in the class file
    constants: Vec<Constant>,
    /// Offset of the first byte after the pool
    end: usize,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> ClassResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(ClassFileError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> ClassResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ClassResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}

/// Offset of the constant pool count
const POOL_COUNT_OFFSET: usize = 8;

fn parse_pool(bytes: &[u8]) -> ClassResult<ConstantPool> {
    if bytes.len() < 4 || bytes[..4] != MAGIC {
        return Err(ClassFileError::BadMagic);
    }
    let mut cur = Cursor {
        bytes,
        pos: POOL_COUNT_OFFSET,
    };
    let count = u32::from(cur.u16()?);

    let mut constants = Vec::with_capacity(count as usize);
    constants.push(Constant::Unusable);

    // Wider than the u16 count so a long in the last slot cannot wrap
    let mut index: u32 = 1;
    while index < count {
        let start = cur.pos;
        let tag = cur.u8()?;
        let constant = match tag {
            1 => {
                let len = cur.u16()? as usize;
                let payload = cur.pos;
                cur.take(len)?;
                Constant::Utf8 {
                    start: payload,
                    end: cur.pos,
                }
            }
            7 => Constant::Class {
                name_index: cur.u16()?,
            },
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                cur.take(4)?;
                Constant::Other { start, end: cur.pos }
            }
            5 | 6 => {
                cur.take(8)?;
                Constant::Other { start, end: cur.pos }
            }
            8 | 16 | 19 | 20 => {
                cur.take(2)?;
                Constant::Other { start, end: cur.pos }
            }
            15 => {
                cur.take(3)?;
                Constant::Other { start, end: cur.pos }
            }
            tag => {
                return Err(ClassFileError::UnknownTag {
                    tag,
                    index: index as u16,
                });
            }
        };
        constants.push(constant);
        index += 1;

        // Longs and doubles take two slots
        if matches!(tag, 5 | 6) {
            if index >= count {
                return Err(ClassFileError::WideConstantOverrun((index - 1) as u16));
            }
            constants.push(Constant::Unusable);
            index += 1;
        }
    }

    Ok(ConstantPool {
        constants,
        end: cur.pos,
    })
}

/// Relocate every class reference in a class file
///
/// Returns `Ok(None)` when nothing in the class needs to change.
pub fn relocate_class(map: &RelocationMap, bytes: &[u8]) -> ClassResult<Option<Vec<u8>>> {
    let pool = parse_pool(bytes)?;

    let mut replacements: Vec<(usize, Vec<u8>)> = Vec::new();
    for (index, constant) in pool.constants.iter().enumerate() {
        if let Constant::Utf8 { start, end } = *constant
            && let Some(mapped) = remap_utf8(map, &bytes[start..end])
        {
            if mapped.len() > u16::MAX as usize {
                return Err(ClassFileError::ConstantTooLong(index as u16));
            }
            replacements.push((index, mapped));
        }
    }

    if replacements.is_empty() {
        return Ok(None);
    }

    let grown: usize = replacements.iter().map(|(_, v)| v.len()).sum();
    let mut out = Vec::with_capacity(bytes.len() + grown);
    out.extend_from_slice(&bytes[..POOL_COUNT_OFFSET + 2]);

    let mut pending = replacements.into_iter().peekable();
    for (index, constant) in pool.constants.iter().enumerate() {
        match *constant {
            Constant::Utf8 { start, end } => {
                let value = match pending.peek() {
                    Some((i, _)) if *i == index => pending.next().map(|(_, v)| v),
                    _ => None,
                };
                let value = value.as_deref().unwrap_or(&bytes[start..end]);
                out.push(1);
                out.extend_from_slice(&(value.len() as u16).to_be_bytes());
                out.extend_from_slice(value);
            }
            Constant::Class { name_index } => {
                out.push(7);
                out.extend_from_slice(&name_index.to_be_bytes());
            }
            Constant::Other { start, end } => out.extend_from_slice(&bytes[start..end]),
            Constant::Unusable => {}
        }
    }

    out.extend_from_slice(&bytes[pool.end..]);
    Ok(Some(out))
}

/// The internal name of the class a class file declares (`this_class`)
pub fn class_name(bytes: &[u8]) -> ClassResult<String> {
    let pool = parse_pool(bytes)?;
    let mut cur = Cursor {
        bytes,
        pos: pool.end,
    };
    let _access_flags = cur.u16()?;
    let this_class = cur.u16()?;

    let name_index = match pool.constants.get(this_class as usize) {
        Some(Constant::Class { name_index }) => *name_index,
        _ => return Err(ClassFileError::BadClassIndex(this_class)),
    };
    match pool.constants.get(name_index as usize) {
        Some(Constant::Utf8 { start, end }) => {
            Ok(String::from_utf8_lossy(&bytes[*start..*end]).into_owned())
        }
        _ => Err(ClassFileError::BadClassIndex(this_class)),
    }
}

/// Every Utf8 constant in the pool, in pool order
pub fn utf8_constants(bytes: &[u8]) -> ClassResult<Vec<String>> {
    let pool = parse_pool(bytes)?;
    Ok(pool
        .constants
        .iter()
        .filter_map(|c| match *c {
            Constant::Utf8 { start, end } => {
                Some(String::from_utf8_lossy(&bytes[start..end]).into_owned())
            }
            _ => None,
        })
        .collect())
}

/// Walks a field or method descriptor, or a generic signature, following
/// the JVM grammar and collecting the spans of the class names it names
struct SignatureScanner<'a> {
    value: &'a [u8],
    pos: usize,
    names: Vec<(usize, usize)>,
}

impl<'a> SignatureScanner<'a> {
    /// Class-name spans of `value`, or `None` if it is not a descriptor
    /// or signature
    fn scan(value: &'a [u8]) -> Option<Vec<(usize, usize)>> {
        let mut scanner = Self {
            value,
            pos: 0,
            names: Vec::new(),
        };
        match value.first()? {
            b'(' => scanner.method()?,
            b'<' => {
                scanner.type_params()?;
                if scanner.peek() == Some(b'(') {
                    scanner.method()?;
                } else {
                    scanner.class_signature()?;
                }
            }
            b'L' => scanner.class_signature()?,
            _ => scanner.field_type()?,
        }
        (scanner.pos == value.len()).then_some(scanner.names)
    }

    fn peek(&self) -> Option<u8> {
        self.value.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        (self.peek()? == byte).then(|| self.pos += 1)
    }

    /// A non-empty identifier; internal names keep their `/` separators
    fn identifier(&mut self) -> Option<(usize, usize)> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b';' | b'<' | b'>' | b'.' | b':' | b'(' | b')' | b'[') {
                break;
            }
            self.pos += 1;
        }
        (self.pos > start).then_some((start, self.pos))
    }

    fn field_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                self.pos += 1;
                Some(())
            }
            b'[' => {
                self.pos += 1;
                self.field_type()
            }
            b'L' => self.class_type(),
            b'T' => {
                self.pos += 1;
                self.identifier()?;
                self.expect(b';')
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let name = self.identifier()?;
        self.names.push(name);
        self.type_args()?;
        // Inner classes of a parameterized outer: `.Inner<...>`
        while self.peek() == Some(b'.') {
            self.pos += 1;
            self.identifier()?;
            self.type_args()?;
        }
        self.expect(b';')
    }

    fn type_args(&mut self) -> Option<()> {
        if self.peek() != Some(b'<') {
            return Some(());
        }
        self.pos += 1;
        loop {
            match self.peek()? {
                b'>' => {
                    self.pos += 1;
                    return Some(());
                }
                b'*' => self.pos += 1,
                b'+' | b'-' => {
                    self.pos += 1;
                    self.field_type()?;
                }
                _ => self.field_type()?,
            }
        }
    }

    fn type_params(&mut self) -> Option<()> {
        self.expect(b'<')?;
        loop {
            self.identifier()?;
            self.expect(b':')?;
            if matches!(self.peek()?, b'L' | b'T' | b'[') {
                self.field_type()?;
            }
            while self.peek() == Some(b':') {
                self.pos += 1;
                self.field_type()?;
            }
            if self.peek()? == b'>' {
                self.pos += 1;
                return Some(());
            }
        }
    }

    fn method(&mut self) -> Option<()> {
        self.expect(b'(')?;
        while self.peek()? != b')' {
            self.field_type()?;
        }
        self.pos += 1;
        if self.peek()? == b'V' {
            self.pos += 1;
        } else {
            self.field_type()?;
        }
        while self.peek() == Some(b'^') {
            self.pos += 1;
            self.field_type()?;
        }
        Some(())
    }

    /// Superclass followed by interfaces, all class types
    fn class_signature(&mut self) -> Option<()> {
        self.class_type()?;
        while self.peek().is_some() {
            self.class_type()?;
        }
        Some(())
    }
}

/// Whether a class name can start at `i` in a value that is not a
/// well-formed descriptor: the start of the value, or right after an `L`
/// that opens a class type
fn is_name_start(value: &[u8], i: usize) -> bool {
    if i == 0 {
        return true;
    }
    if value[i - 1] != b'L' {
        return false;
    }
    i == 1 || SIGNATURE_DELIMITERS.contains(&value[i - 2])
}

fn name_end(value: &[u8], start: usize) -> usize {
    value[start..]
        .iter()
        .position(|b| matches!(b, b';' | b'<' | b'>') || b.is_ascii_whitespace())
        .map_or(value.len(), |p| start + p)
}

/// Candidate name spans for values the scanner rejects
fn loose_name_spans(map: &RelocationMap, value: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut i = 0;
    while i < value.len() {
        if is_name_start(value, i) {
            let end = name_end(value, i);
            let relocated = std::str::from_utf8(&value[i..end])
                .is_ok_and(|name| map.map_internal_name(name).is_some());
            if relocated {
                spans.push((i, end));
                i = end;
                continue;
            }
        }
        i += 1;
    }
    spans
}

/// Rewrite the class names inside one Utf8 constant
pub(crate) fn remap_utf8(map: &RelocationMap, value: &[u8]) -> Option<Vec<u8>> {
    if value.is_empty() {
        return None;
    }

    // String literals holding a dotted class name, e.g. for Class.forName
    if let Ok(text) = std::str::from_utf8(value)
        && let Some(mapped) = map.map_dotted_name(text)
    {
        return Some(mapped.into_bytes());
    }

    let spans = SignatureScanner::scan(value).unwrap_or_else(|| loose_name_spans(map, value));

    let mut out: Option<Vec<u8>> = None;
    let mut copied = 0;
    for (start, end) in spans {
        let Ok(name) = std::str::from_utf8(&value[start..end]) else {
            continue;
        };
        let Some(mapped) = map.map_internal_name(name) else {
            continue;
        };
        let buf = out.get_or_insert_with(|| Vec::with_capacity(value.len() + 32));
        buf.extend_from_slice(&value[copied..start]);
        buf.extend_from_slice(mapped.as_bytes());
        copied = end;
    }

    out.map(|mut buf| {
        buf.extend_from_slice(&value[copied..]);
        buf
    })
}
