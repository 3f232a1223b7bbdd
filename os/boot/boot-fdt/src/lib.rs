//! # Flattened Device Tree Reader
//!
//! A read-only, allocation-free view over a flattened device tree (DTB) blob
//! as handed over by the boot ROM or a previous boot stage.
//!
//! ```text
//! ┌──────────────────────┐ 0
//! │ header (10 × u32 BE) │
//! ├──────────────────────┤ off_mem_rsvmap
//! │ memory reservations  │
//! ├──────────────────────┤ off_dt_struct
//! │ structure block      │  BEGIN_NODE name / PROP len nameoff value / END_NODE ... END
//! ├──────────────────────┤ off_dt_strings
//! │ strings block        │  NUL-terminated property names
//! └──────────────────────┘ totalsize
//! ```
//!
//! [`Fdt::new`] validates the header and walks the whole structure block once,
//! so later navigation only has to distinguish "present" from "absent".
//! Property values are decoded on demand through [`Node`].
//!
//! With the `builder` feature, [`builder::FdtBuilder`] assembles blobs on the
//! host, mostly for fixtures.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

#[cfg(any(test, feature = "builder"))]
extern crate alloc;

#[cfg(any(test, feature = "builder"))]
pub mod builder;
mod node;

pub use node::{Children, Node, Properties, Property, RegEntry};

/// Magic number at offset 0 of every DTB.
pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// Oldest structure version we understand.
pub const FDT_FIRST_SUPPORTED_VERSION: u32 = 16;

/// Newest structure version we understand.
pub const FDT_LAST_SUPPORTED_VERSION: u32 = 17;

/// Size of the version-17 header in bytes.
pub const FDT_HEADER_SIZE: usize = 40;

/// Deepest node nesting accepted.
pub const FDT_MAX_DEPTH: usize = 16;

pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FdtError {
    #[error("blob is shorter than its header")]
    TooShort,
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported structure version {0}")]
    UnsupportedVersion(u32),
    #[error("offset or size points outside the blob")]
    OutOfBounds,
    #[error("malformed structure block at offset {0:#x}")]
    Malformed(usize),
    #[error("node or property not found")]
    NotFound,
    #[error("property value has an unexpected length or encoding")]
    BadValue,
}

/// Header fields, host-endian.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FdtHeader {
    pub totalsize: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    pub size_dt_strings: u32,
    pub size_dt_struct: u32,
}

/// Validated view over a DTB.
#[derive(Debug, Copy, Clone)]
pub struct Fdt<'a> {
    header: FdtHeader,
    structs: &'a [u8],
    strings: &'a [u8],
}

/// One decoded structure-block token.
#[derive(Debug, Copy, Clone)]
pub(crate) enum Token<'a> {
    BeginNode(&'a str),
    EndNode,
    Prop(&'a str, &'a [u8]),
    Nop,
    End,
}

#[inline]
pub(crate) fn read_u32_be(buf: &[u8], off: usize) -> Result<u32, FdtError> {
    let end = off.checked_add(4).ok_or(FdtError::OutOfBounds)?;
    let s = buf.get(off..end).ok_or(FdtError::OutOfBounds)?;
    Ok(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
}

#[inline]
const fn align4(x: usize) -> usize {
    (x + 3) & !3
}

/// NUL-terminated UTF-8 string starting at `off`.
fn cstr_at(buf: &[u8], off: usize) -> Result<&str, FdtError> {
    let tail = buf.get(off..).ok_or(FdtError::OutOfBounds)?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(FdtError::OutOfBounds)?;
    core::str::from_utf8(&tail[..len]).map_err(|_| FdtError::Malformed(off))
}

fn section(blob: &[u8], off: u32, size: u32) -> Result<&[u8], FdtError> {
    let start = off as usize;
    let end = start
        .checked_add(size as usize)
        .ok_or(FdtError::OutOfBounds)?;
    blob.get(start..end).ok_or(FdtError::OutOfBounds)
}

impl<'a> Fdt<'a> {
    /// Validate `blob` and return a view over it.
    ///
    /// # Errors
    /// Any header inconsistency, or a structure block that does not nest
    /// properly and terminate with an `END` token.
    pub fn new(blob: &'a [u8]) -> Result<Self, FdtError> {
        if blob.len() < FDT_HEADER_SIZE {
            return Err(FdtError::TooShort);
        }

        let magic = read_u32_be(blob, 0)?;
        if magic != FDT_MAGIC {
            return Err(FdtError::BadMagic(magic));
        }

        let header = FdtHeader {
            totalsize: read_u32_be(blob, 4)?,
            off_dt_struct: read_u32_be(blob, 8)?,
            off_dt_strings: read_u32_be(blob, 12)?,
            off_mem_rsvmap: read_u32_be(blob, 16)?,
            version: read_u32_be(blob, 20)?,
            last_comp_version: read_u32_be(blob, 24)?,
            boot_cpuid_phys: read_u32_be(blob, 28)?,
            size_dt_strings: read_u32_be(blob, 32)?,
            size_dt_struct: read_u32_be(blob, 36)?,
        };

        if header.version < FDT_FIRST_SUPPORTED_VERSION
            || header.last_comp_version > FDT_LAST_SUPPORTED_VERSION
        {
            return Err(FdtError::UnsupportedVersion(header.version));
        }

        let total = header.totalsize as usize;
        if total < FDT_HEADER_SIZE || total > blob.len() {
            return Err(FdtError::OutOfBounds);
        }
        let blob = &blob[..total];

        // Version 16 blobs carry no structure size; the block runs to the end.
        let struct_size = if header.version >= 17 {
            header.size_dt_struct
        } else {
            header.totalsize.saturating_sub(header.off_dt_struct)
        };

        let fdt = Self {
            header,
            structs: section(blob, header.off_dt_struct, struct_size)?,
            strings: section(blob, header.off_dt_strings, header.size_dt_strings)?,
        };
        fdt.check_structure()?;
        Ok(fdt)
    }

    #[must_use]
    pub const fn header(&self) -> &FdtHeader {
        &self.header
    }

    /// Walk the structure block once: balanced nodes, properties only inside
    /// nodes, a single root, terminated by `END`.
    fn check_structure(&self) -> Result<(), FdtError> {
        let mut off = self.skip_nops(0)?;
        let (Token::BeginNode(_), _) = self.token(off)? else {
            return Err(FdtError::Malformed(off));
        };

        let mut depth = 0_usize;
        let mut seen_root = false;
        loop {
            let (tok, next) = self.token(off)?;
            match tok {
                Token::BeginNode(_) => {
                    if depth == 0 {
                        if seen_root {
                            return Err(FdtError::Malformed(off));
                        }
                        seen_root = true;
                    }
                    depth += 1;
                    if depth > FDT_MAX_DEPTH {
                        return Err(FdtError::Malformed(off));
                    }
                }
                Token::EndNode => {
                    depth = depth.checked_sub(1).ok_or(FdtError::Malformed(off))?;
                }
                Token::Prop(..) if depth == 0 => return Err(FdtError::Malformed(off)),
                Token::Prop(..) | Token::Nop => {}
                Token::End => {
                    return if depth == 0 {
                        Ok(())
                    } else {
                        Err(FdtError::Malformed(off))
                    };
                }
            }
            off = next;
        }
    }

    /// Decode the token at `off` (relative to the structure block) and return
    /// it along with the offset of the following token.
    pub(crate) fn token(&self, off: usize) -> Result<(Token<'a>, usize), FdtError> {
        let structs = self.structs;
        let tag = read_u32_be(structs, off)?;
        match tag {
            FDT_BEGIN_NODE => {
                let name = cstr_at(structs, off + 4)?;
                Ok((Token::BeginNode(name), align4(off + 4 + name.len() + 1)))
            }
            FDT_END_NODE => Ok((Token::EndNode, off + 4)),
            FDT_PROP => {
                let len = read_u32_be(structs, off + 4)? as usize;
                let name_off = read_u32_be(structs, off + 8)? as usize;
                let start = off + 12;
                let end = start.checked_add(len).ok_or(FdtError::OutOfBounds)?;
                let value = structs.get(start..end).ok_or(FdtError::OutOfBounds)?;
                let name = cstr_at(self.strings, name_off)?;
                Ok((Token::Prop(name, value), align4(end)))
            }
            FDT_NOP => Ok((Token::Nop, off + 4)),
            FDT_END => Ok((Token::End, off + 4)),
            _ => Err(FdtError::Malformed(off)),
        }
    }

    pub(crate) fn skip_nops(&self, mut off: usize) -> Result<usize, FdtError> {
        loop {
            match self.token(off)? {
                (Token::Nop, next) => off = next,
                _ => return Ok(off),
            }
        }
    }

    /// Offset just past the `END_NODE` closing the node that begins at `off`.
    pub(crate) fn skip_node(&self, off: usize) -> Result<usize, FdtError> {
        let mut depth = 0_usize;
        let mut cur = off;
        loop {
            let (tok, next) = self.token(cur)?;
            match tok {
                Token::BeginNode(_) => depth += 1,
                Token::EndNode => {
                    depth = depth.checked_sub(1).ok_or(FdtError::Malformed(cur))?;
                    if depth == 0 {
                        return Ok(next);
                    }
                }
                Token::End => return Err(FdtError::Malformed(cur)),
                Token::Prop(..) | Token::Nop => {}
            }
            cur = next;
        }
    }

    /// The root node `/`.
    #[must_use]
    pub fn root(&self) -> Node<'a> {
        // check_structure() guarantees a BEGIN_NODE here
        let off = self.skip_nops(0).unwrap_or(0);
        let name = match self.token(off) {
            Ok((Token::BeginNode(name), _)) => name,
            _ => "",
        };
        Node::new(*self, off, name, None)
    }

    /// Look up a node by absolute path, e.g. `/cpus/cpu@0` or `/intc/its`.
    ///
    /// A path component without a unit address matches a node name ignoring
    /// its `@unit` suffix; the first such child wins.
    #[must_use]
    pub fn find_node(&self, path: &str) -> Option<Node<'a>> {
        let rest = path.strip_prefix('/')?;
        let mut node = self.root();
        for component in rest.split('/').filter(|c| !c.is_empty()) {
            node = node.children().find(|child| child.matches_name(component))?;
        }
        Some(node)
    }

    /// First node, in document order, whose `compatible` list contains
    /// `compatible`.
    #[must_use]
    pub fn find_compatible(&self, compatible: &str) -> Option<Node<'a>> {
        let mut stack = [0_usize; FDT_MAX_DEPTH];
        let mut depth = 0_usize;
        let mut off = 0_usize;

        loop {
            let (tok, next) = self.token(off).ok()?;
            match tok {
                Token::BeginNode(name) => {
                    let parent = depth.checked_sub(1).map(|d| stack[d]);
                    let node = Node::new(*self, off, name, parent);
                    if node.is_compatible(compatible) {
                        return Some(node);
                    }
                    *stack.get_mut(depth)? = off;
                    depth += 1;
                }
                Token::EndNode => depth = depth.checked_sub(1)?,
                Token::End => return None,
                Token::Prop(..) | Token::Nop => {}
            }
            off = next;
        }
    }
}
