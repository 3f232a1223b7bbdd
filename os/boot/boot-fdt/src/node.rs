use crate::{Fdt, FdtError, Token, read_u32_be};

/// A node in the structure block.
#[derive(Debug, Copy, Clone)]
pub struct Node<'a> {
    fdt: Fdt<'a>,
    /// Offset of the node's `BEGIN_NODE` token.
    offset: usize,
    name: &'a str,
    /// Offset of the parent's `BEGIN_NODE` token; `None` for the root.
    parent: Option<usize>,
}

/// A raw property: name and undecoded big-endian value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Property<'a> {
    pub name: &'a str,
    pub value: &'a [u8],
}

/// One decoded `reg` tuple.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RegEntry {
    pub address: u64,
    pub size: u64,
}

/// Properties of a node, in blob order.
pub struct Properties<'a> {
    fdt: Fdt<'a>,
    off: Option<usize>,
}

/// Direct children of a node, in blob order.
pub struct Children<'a> {
    fdt: Fdt<'a>,
    parent: usize,
    off: Option<usize>,
}

const DEFAULT_ADDRESS_CELLS: u32 = 2;
const DEFAULT_SIZE_CELLS: u32 = 1;

/// Combine one or two big-endian cells into a `u64`.
fn cells_to_u64(bytes: &[u8], cells: usize) -> Result<u64, FdtError> {
    match cells {
        0 => Ok(0),
        1 => Ok(u64::from(read_u32_be(bytes, 0)?)),
        2 => {
            let hi = u64::from(read_u32_be(bytes, 0)?);
            let lo = u64::from(read_u32_be(bytes, 4)?);
            Ok((hi << 32) | lo)
        }
        _ => Err(FdtError::BadValue),
    }
}

impl<'a> Node<'a> {
    pub(crate) const fn new(
        fdt: Fdt<'a>,
        offset: usize,
        name: &'a str,
        parent: Option<usize>,
    ) -> Self {
        Self {
            fdt,
            offset,
            name,
            parent,
        }
    }

    /// Full node name including any `@unit` suffix; empty for the root.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Node name without the `@unit` suffix.
    #[must_use]
    pub fn base_name(&self) -> &'a str {
        self.name.split_once('@').map_or(self.name, |(base, _)| base)
    }

    /// Structure-block offset of this node; stable for the lifetime of the blob.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn matches_name(&self, component: &str) -> bool {
        if component.contains('@') {
            self.name == component
        } else {
            self.base_name() == component
        }
    }

    /// Offset of the first token after the node name.
    fn body(&self) -> Option<usize> {
        self.fdt.token(self.offset).ok().map(|(_, next)| next)
    }

    /// Offset of the first child `BEGIN_NODE` (or the closing `END_NODE`),
    /// i.e. the first token after all properties.
    fn after_properties(&self) -> Option<usize> {
        let mut off = self.body()?;
        loop {
            match self.fdt.token(off).ok()? {
                (Token::Prop(..) | Token::Nop, next) => off = next,
                _ => return Some(off),
            }
        }
    }

    #[must_use]
    pub fn properties(&self) -> Properties<'a> {
        Properties {
            fdt: self.fdt,
            off: self.body(),
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<Property<'a>> {
        self.properties().find(|p| p.name == name)
    }

    #[must_use]
    pub fn children(&self) -> Children<'a> {
        Children {
            fdt: self.fdt,
            parent: self.offset,
            off: self.after_properties(),
        }
    }

    /// The node following this one under the same parent.
    #[must_use]
    pub fn next_sibling(&self) -> Option<Self> {
        let parent = self.parent?;
        let off = self.fdt.skip_node(self.offset).ok()?;
        let off = self.fdt.skip_nops(off).ok()?;
        match self.fdt.token(off).ok()? {
            (Token::BeginNode(name), _) => Some(Self::new(self.fdt, off, name, Some(parent))),
            _ => None,
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let parent = self.parent?;
        self.fdt.root().find_by_offset(parent)
    }

    /// Depth-first search below `self` for the node starting at `target`.
    fn find_by_offset(&self, target: usize) -> Option<Self> {
        if self.offset == target {
            return Some(*self);
        }
        self.children()
            .filter(|c| c.offset <= target)
            .last()
            .and_then(|c| c.find_by_offset(target))
    }

    /// # Errors
    /// [`FdtError::NotFound`] if absent, [`FdtError::BadValue`] unless the
    /// value is exactly one cell.
    pub fn read_u32(&self, name: &str) -> Result<u32, FdtError> {
        let prop = self.property(name).ok_or(FdtError::NotFound)?;
        if prop.value.len() != 4 {
            return Err(FdtError::BadValue);
        }
        read_u32_be(prop.value, 0)
    }

    /// Reads a one- or two-cell integer.
    ///
    /// # Errors
    /// [`FdtError::NotFound`] if absent, [`FdtError::BadValue`] for any other
    /// length.
    pub fn read_u64(&self, name: &str) -> Result<u64, FdtError> {
        let prop = self.property(name).ok_or(FdtError::NotFound)?;
        match prop.value.len() {
            4 => cells_to_u64(prop.value, 1),
            8 => cells_to_u64(prop.value, 2),
            _ => Err(FdtError::BadValue),
        }
    }

    /// Reads the first string of a string(-list) property.
    ///
    /// # Errors
    /// [`FdtError::NotFound`] if absent, [`FdtError::BadValue`] if it is not
    /// NUL-terminated UTF-8.
    pub fn read_str(&self, name: &str) -> Result<&'a str, FdtError> {
        let prop = self.property(name).ok_or(FdtError::NotFound)?;
        let len = prop
            .value
            .iter()
            .position(|&b| b == 0)
            .ok_or(FdtError::BadValue)?;
        core::str::from_utf8(&prop.value[..len]).map_err(|_| FdtError::BadValue)
    }

    /// Whether the `compatible` string list contains `compatible`.
    #[must_use]
    pub fn is_compatible(&self, compatible: &str) -> bool {
        self.property("compatible").is_some_and(|p| {
            p.value
                .split(|&b| b == 0)
                .any(|s| s == compatible.as_bytes())
        })
    }

    /// `(#address-cells, #size-cells)` that apply to this node's children.
    #[must_use]
    pub fn cell_sizes(&self) -> (u32, u32) {
        (
            self.read_u32("#address-cells")
                .unwrap_or(DEFAULT_ADDRESS_CELLS),
            self.read_u32("#size-cells").unwrap_or(DEFAULT_SIZE_CELLS),
        )
    }

    /// Decode entry `index` of the `reg` property using the parent's cell
    /// sizes.
    ///
    /// # Errors
    /// [`FdtError::NotFound`] if there is no `reg` property or fewer than
    /// `index + 1` entries; [`FdtError::BadValue`] if the length is not a
    /// multiple of the entry size or the cell counts are unsupported.
    pub fn reg(&self, index: usize) -> Result<RegEntry, FdtError> {
        let (ac, sc) = self
            .parent()
            .map_or((DEFAULT_ADDRESS_CELLS, DEFAULT_SIZE_CELLS), |p| {
                p.cell_sizes()
            });
        let (ac, sc) = (ac as usize, sc as usize);
        if !(1..=2).contains(&ac) || sc > 2 {
            return Err(FdtError::BadValue);
        }

        let prop = self.property("reg").ok_or(FdtError::NotFound)?;
        let stride = (ac + sc) * 4;
        if !prop.value.len().is_multiple_of(stride) {
            return Err(FdtError::BadValue);
        }

        let start = index.checked_mul(stride).ok_or(FdtError::NotFound)?;
        let end = start.checked_add(stride).ok_or(FdtError::NotFound)?;
        let entry = prop.value.get(start..end).ok_or(FdtError::NotFound)?;
        Ok(RegEntry {
            address: cells_to_u64(entry, ac)?,
            size: cells_to_u64(&entry[ac * 4..], sc)?,
        })
    }
}

impl<'a> Iterator for Properties<'a> {
    type Item = Property<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let off = self.off?;
            match self.fdt.token(off) {
                Ok((Token::Prop(name, value), next)) => {
                    self.off = Some(next);
                    return Some(Property { name, value });
                }
                Ok((Token::Nop, next)) => self.off = Some(next),
                _ => {
                    self.off = None;
                    return None;
                }
            }
        }
    }
}

impl core::iter::FusedIterator for Properties<'_> {}

impl<'a> Iterator for Children<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let off = self.off.take()?;
        let off = self.fdt.skip_nops(off).ok()?;
        let (Token::BeginNode(name), _) = self.fdt.token(off).ok()? else {
            return None;
        };
        self.off = self.fdt.skip_node(off).ok();
        Some(Node::new(self.fdt, off, name, Some(self.parent)))
    }
}

impl core::iter::FusedIterator for Children<'_> {}
