//! Host-side DTB assembly.
//!
//! ```
//! use boot_fdt::{Fdt, builder::FdtBuilder};
//!
//! let mut b = FdtBuilder::new();
//! b.begin_node("").prop_u32("#address-cells", 2);
//! b.begin_node("cpus").end_node();
//! b.end_node();
//! let blob = b.finish();
//!
//! let fdt = Fdt::new(&blob).unwrap();
//! assert!(fdt.find_node("/cpus").is_some());
//! ```

use crate::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_HEADER_SIZE, FDT_MAGIC, FDT_NOP, FDT_PROP};
use alloc::vec::Vec;

/// Version written into the header.
const BUILD_VERSION: u32 = 17;
const BUILD_LAST_COMP_VERSION: u32 = 16;

/// Size of the empty memory reservation map (one terminating entry).
const RSVMAP_SIZE: usize = 16;

/// Incrementally writes a structure block and its strings table.
///
/// Nodes are not closed implicitly: every [`begin_node`](Self::begin_node)
/// needs a matching [`end_node`](Self::end_node) for the result to validate.
#[derive(Debug, Default, Clone)]
pub struct FdtBuilder {
    structs: Vec<u8>,
    strings: Vec<u8>,
    boot_cpuid_phys: u32,
}

fn pad4(buf: &mut Vec<u8>) {
    while !buf.len().is_multiple_of(4) {
        buf.push(0);
    }
}

impl FdtBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boot_cpuid_phys(&mut self, cpu: u32) -> &mut Self {
        self.boot_cpuid_phys = cpu;
        self
    }

    fn token(&mut self, tag: u32) {
        self.structs.extend_from_slice(&tag.to_be_bytes());
    }

    /// Offset of `name` in the strings table, appending it on first use.
    fn string_offset(&mut self, name: &str) -> u32 {
        let mut off = 0;
        for s in self.strings.split(|&b| b == 0) {
            if s == name.as_bytes() && off < self.strings.len() {
                return u32::try_from(off).unwrap_or(u32::MAX);
            }
            off += s.len() + 1;
        }

        let off = self.strings.len();
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        u32::try_from(off).unwrap_or(u32::MAX)
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        self.token(FDT_BEGIN_NODE);
        self.structs.extend_from_slice(name.as_bytes());
        self.structs.push(0);
        pad4(&mut self.structs);
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        self.token(FDT_END_NODE);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.token(FDT_NOP);
        self
    }

    /// A property with a raw value.
    pub fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let name_off = self.string_offset(name);
        let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.token(FDT_PROP);
        self.structs.extend_from_slice(&len.to_be_bytes());
        self.structs.extend_from_slice(&name_off.to_be_bytes());
        self.structs.extend_from_slice(value);
        pad4(&mut self.structs);
        self
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop(name, &value.to_be_bytes())
    }

    /// A two-cell integer.
    pub fn prop_u64(&mut self, name: &str, value: u64) -> &mut Self {
        self.prop(name, &value.to_be_bytes())
    }

    pub fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let bytes: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        self.prop(name, &bytes)
    }

    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.prop(name, &bytes)
    }

    /// A string list, e.g. `compatible = "a", "b"`.
    pub fn prop_strs(&mut self, name: &str, values: &[&str]) -> &mut Self {
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(v.as_bytes());
            bytes.push(0);
        }
        self.prop(name, &bytes)
    }

    /// Terminate the structure block and lay out the blob:
    /// header, reservation map, structure block, strings.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        let off_mem_rsvmap = FDT_HEADER_SIZE;
        let off_dt_struct = off_mem_rsvmap + RSVMAP_SIZE;
        let size_dt_struct = self.structs.len() + 4;
        let off_dt_strings = off_dt_struct + size_dt_struct;
        let totalsize = off_dt_strings + self.strings.len();

        let to32 = |v: usize| u32::try_from(v).unwrap_or(u32::MAX);
        let fields = [
            FDT_MAGIC,
            to32(totalsize),
            to32(off_dt_struct),
            to32(off_dt_strings),
            to32(off_mem_rsvmap),
            BUILD_VERSION,
            BUILD_LAST_COMP_VERSION,
            self.boot_cpuid_phys,
            to32(self.strings.len()),
            to32(size_dt_struct),
        ];

        let mut out = Vec::with_capacity(totalsize);
        for f in fields {
            out.extend_from_slice(&f.to_be_bytes());
        }
        out.resize(off_dt_struct, 0);
        out.extend_from_slice(&self.structs);
        out.extend_from_slice(&FDT_END.to_be_bytes());
        out.extend_from_slice(&self.strings);
        out
    }
}
