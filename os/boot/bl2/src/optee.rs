//! # Composite Trusted OS Images
//!
//! OP-TEE ships either as a plain binary or behind a small header that splits
//! it into a pager (resident core) and a paged overlay:
//!
//! ```text
//! offset  size  field
//! 0x00    4     magic       "OPTE" (0x4554504f, little-endian)
//! 0x04    1     version     2
//! 0x05    1     arch        0 = AArch32, 1 = AArch64
//! 0x06    2     flags
//! 0x08    4     nb_images   1 (pager only) or 2 (pager + paged)
//! 0x0c    16×n  images      { load_addr_hi, load_addr_lo, image_id, size }
//! ```
//!
//! [`classify`] only looks at bytes and never fails: anything that does not
//! carry a well-formed header is a monolithic image. Once a header has been
//! recognized, [`OpteeHeader::resolve`] checks the requested placements
//! against the reserved areas; a mismatch there is fatal.

use boot_info::image::ExecutionState;
use boot_info::memory::PhysRegion;

pub const OPTEE_MAGIC: u32 = 0x4554_504f;
pub const OPTEE_VERSION: u8 = 2;
pub const OPTEE_ARCH_ARM32: u8 = 0;
pub const OPTEE_ARCH_ARM64: u8 = 1;
pub const OPTEE_PAGER_IMAGE_ID: u32 = 0;
pub const OPTEE_PAGED_IMAGE_ID: u32 = 1;
pub const OPTEE_MAX_IMAGES: usize = 2;

/// Load address meaning "wherever the reserved area starts".
pub const OPTEE_DEFAULT_LOAD_ADDR: u64 = u64::MAX;

const HEADER_SIZE: usize = 12;
const IMAGE_RECORD_SIZE: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("header record has unknown image id {0}")]
    UnknownImageId(u32),
    #[error("header has no pager record")]
    MissingPager,
    #[error("reserved area {base:#x}+{max_size:#x} is empty or wraps")]
    BadReservedArea { base: u64, max_size: u64 },
    #[error("image {load_addr:#x}+{size:#x} is empty or wraps")]
    BadImageRange { load_addr: u64, size: u64 },
    #[error("image {load_addr:#x}+{size:#x} lies outside reserved area {base:#x}+{max_size:#x}")]
    OutsideReservedArea {
        load_addr: u64,
        size: u64,
        base: u64,
        max_size: u64,
    },
}

/// One `{load address, id, size}` record from the header.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct OpteeImage {
    pub load_addr: u64,
    pub image_id: u32,
    pub size: u32,
}

/// A structurally valid header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OpteeHeader {
    pub execution_state: ExecutionState,
    pub flags: u16,
    images: [OpteeImage; OPTEE_MAX_IMAGES],
    nb_images: usize,
}

/// Placement of a composite image after refinement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CompositeHeader {
    /// Refined pager placement `{load address, size}`.
    pub pager: PhysRegion,
    /// Refined paged-overlay placement, `None` for a pager-only image.
    pub paged: Option<PhysRegion>,
    /// Where execution starts: the pager base.
    pub entry_point: u64,
    pub execution_state: ExecutionState,
    /// Argument words for the started image: paged base, then an unused
    /// word. A pager-only image still reports the reserved paged base.
    pub args: [u64; 2],
}

#[inline]
fn read_u32_le(buf: &[u8], off: usize) -> Option<u32> {
    let s = buf.get(off..off.checked_add(4)?)?;
    Some(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

/// Inspect the leading bytes of a loaded trusted OS image.
///
/// Returns `None` for anything that is not a well-formed version-2 header,
/// i.e. for a monolithic image.
#[must_use]
pub fn classify(bytes: &[u8]) -> Option<OpteeHeader> {
    if read_u32_le(bytes, 0)? != OPTEE_MAGIC {
        return None;
    }
    if *bytes.get(4)? != OPTEE_VERSION {
        return None;
    }
    let execution_state = match *bytes.get(5)? {
        OPTEE_ARCH_ARM32 => ExecutionState::Aarch32,
        OPTEE_ARCH_ARM64 => ExecutionState::Aarch64,
        _ => return None,
    };
    let flags = u16::from_le_bytes([*bytes.get(6)?, *bytes.get(7)?]);

    let nb_images = usize::try_from(read_u32_le(bytes, 8)?).ok()?;
    if !(1..=OPTEE_MAX_IMAGES).contains(&nb_images) {
        return None;
    }

    let mut images = [OpteeImage::default(); OPTEE_MAX_IMAGES];
    for (i, image) in images.iter_mut().take(nb_images).enumerate() {
        let off = HEADER_SIZE + i * IMAGE_RECORD_SIZE;
        let hi = u64::from(read_u32_le(bytes, off)?);
        let lo = u64::from(read_u32_le(bytes, off + 4)?);
        *image = OpteeImage {
            load_addr: (hi << 32) | lo,
            image_id: read_u32_le(bytes, off + 8)?,
            size: read_u32_le(bytes, off + 12)?,
        };
    }

    Some(OpteeHeader {
        execution_state,
        flags,
        images,
        nb_images,
    })
}

/// Place `image` inside the reserved `area` (`size` = maximum size).
fn refine(image: &OpteeImage, area: PhysRegion) -> Result<PhysRegion, HeaderError> {
    let reserved_last = area
        .size
        .checked_sub(1)
        .and_then(|len| area.base.checked_add(len))
        .ok_or(HeaderError::BadReservedArea {
            base: area.base,
            max_size: area.size,
        })?;

    let load_addr = if image.load_addr == OPTEE_DEFAULT_LOAD_ADDR {
        area.base
    } else {
        image.load_addr
    };
    let size = u64::from(image.size);
    let image_last = size
        .checked_sub(1)
        .and_then(|len| load_addr.checked_add(len))
        .ok_or(HeaderError::BadImageRange { load_addr, size })?;

    if load_addr < area.base || image_last > reserved_last {
        return Err(HeaderError::OutsideReservedArea {
            load_addr,
            size,
            base: area.base,
            max_size: area.size,
        });
    }

    Ok(PhysRegion::new(load_addr, size))
}

impl OpteeHeader {
    #[must_use]
    pub fn images(&self) -> &[OpteeImage] {
        &self.images[..self.nb_images]
    }

    /// Refine the reserved pager and paged areas with the header's records.
    ///
    /// A later record for the same role replaces an earlier one.
    ///
    /// # Errors
    /// Unknown record ids, a missing pager record, or a requested range that
    /// does not fit its reserved area.
    pub fn resolve(
        &self,
        pager_area: PhysRegion,
        paged_area: PhysRegion,
    ) -> Result<CompositeHeader, HeaderError> {
        let mut pager = None;
        let mut paged = None;

        for image in self.images() {
            match image.image_id {
                OPTEE_PAGER_IMAGE_ID => pager = Some(refine(image, pager_area)?),
                OPTEE_PAGED_IMAGE_ID => paged = Some(refine(image, paged_area)?),
                other => return Err(HeaderError::UnknownImageId(other)),
            }
        }

        let pager = pager.ok_or(HeaderError::MissingPager)?;
        Ok(CompositeHeader {
            pager,
            paged,
            entry_point: pager.base,
            execution_state: self.execution_state,
            args: [paged.map_or(paged_area.base, |p| p.base), 0],
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assemble a header with the given `(load_addr, id, size)` records.
    pub(crate) fn header(arch: u8, records: &[(u64, u32, u32)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&OPTEE_MAGIC.to_le_bytes());
        out.push(OPTEE_VERSION);
        out.push(arch);
        out.extend_from_slice(&0_u16.to_le_bytes());
        out.extend_from_slice(&u32::try_from(records.len()).unwrap().to_le_bytes());
        for &(addr, id, size) in records {
            out.extend_from_slice(&((addr >> 32) as u32).to_le_bytes());
            out.extend_from_slice(&(addr as u32).to_le_bytes());
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }
        out
    }

    const PAGER_AREA: PhysRegion = PhysRegion::new(0x2ffc_0000, 0x4_0000);
    const PAGED_AREA: PhysRegion = PhysRegion::new(0xdee0_0000, 0x100_0000);

    #[test]
    fn plain_binary_is_monolithic() {
        assert_eq!(classify(&[0xea; 64]), None);
        assert_eq!(classify(&[]), None);
        assert_eq!(classify(&OPTEE_MAGIC.to_le_bytes()), None);
    }

    #[test]
    fn classification_checks_version_arch_and_count() {
        let good = header(OPTEE_ARCH_ARM32, &[(0x2ffc_0000, 0, 0x1000)]);
        assert!(classify(&good).is_some());

        let mut bad_version = good.clone();
        bad_version[4] = 1;
        assert_eq!(classify(&bad_version), None);

        let mut bad_arch = good.clone();
        bad_arch[5] = 7;
        assert_eq!(classify(&bad_arch), None);

        assert_eq!(classify(&header(0, &[])), None);
        assert_eq!(
            classify(&header(0, &[(0, 0, 1), (0, 1, 1), (0, 1, 1)])),
            None
        );

        // record table truncated
        assert_eq!(classify(&good[..good.len() - 1]), None);
    }

    #[test]
    fn classification_is_pure() {
        let bytes = header(OPTEE_ARCH_ARM64, &[(u64::MAX, 0, 0x100), (u64::MAX, 1, 0x200)]);
        assert_eq!(classify(&bytes), classify(&bytes));
        let h = classify(&bytes).unwrap();
        assert_eq!(h.execution_state, ExecutionState::Aarch64);
        assert_eq!(h.images().len(), 2);
    }

    #[test]
    fn resolve_pager_and_paged() {
        let bytes = header(
            OPTEE_ARCH_ARM32,
            &[(0x2ffc_1000, 0, 0x1_0000), (u64::MAX, 1, 0x8_0000)],
        );
        let c = classify(&bytes).unwrap().resolve(PAGER_AREA, PAGED_AREA).unwrap();

        assert_eq!(c.pager, PhysRegion::new(0x2ffc_1000, 0x1_0000));
        assert_eq!(c.paged, Some(PhysRegion::new(0xdee0_0000, 0x8_0000)));
        assert_eq!(c.entry_point, 0x2ffc_1000);
        assert_eq!(c.args, [0xdee0_0000, 0]);
        assert_eq!(c.execution_state, ExecutionState::Aarch32);
    }

    #[test]
    fn pager_only_has_no_paged_image() {
        let bytes = header(OPTEE_ARCH_ARM32, &[(u64::MAX, 0, 0x4_0000)]);
        let c = classify(&bytes).unwrap().resolve(PAGER_AREA, PAGED_AREA).unwrap();

        assert_eq!(c.pager, PAGER_AREA);
        assert_eq!(c.paged, None);
        assert_eq!(c.args, [PAGED_AREA.base, 0]);
    }

    #[test]
    fn image_must_fit_reserved_area() {
        // one byte too long
        let bytes = header(OPTEE_ARCH_ARM32, &[(u64::MAX, 0, 0x4_0001)]);
        let err = classify(&bytes).unwrap().resolve(PAGER_AREA, PAGED_AREA);
        assert!(matches!(err, Err(HeaderError::OutsideReservedArea { .. })));

        // starts below the area
        let bytes = header(OPTEE_ARCH_ARM32, &[(0x2ffb_f000, 0, 0x100)]);
        let err = classify(&bytes).unwrap().resolve(PAGER_AREA, PAGED_AREA);
        assert!(matches!(err, Err(HeaderError::OutsideReservedArea { .. })));

        // wraps around the address space
        let bytes = header(OPTEE_ARCH_ARM32, &[(u64::MAX - 1, 0, 0x100)]);
        let err = classify(&bytes).unwrap().resolve(PAGER_AREA, PAGED_AREA);
        assert!(matches!(err, Err(HeaderError::BadImageRange { .. })));
    }

    #[test]
    fn empty_reserved_area_is_rejected() {
        let bytes = header(OPTEE_ARCH_ARM32, &[(u64::MAX, 0, 0x100)]);
        let err = classify(&bytes)
            .unwrap()
            .resolve(PhysRegion::new(0x1000, 0), PAGED_AREA);
        assert_eq!(
            err,
            Err(HeaderError::BadReservedArea {
                base: 0x1000,
                max_size: 0
            })
        );
    }

    #[test]
    fn unknown_or_missing_roles() {
        let bytes = header(OPTEE_ARCH_ARM32, &[(u64::MAX, 2, 0x100)]);
        assert_eq!(
            classify(&bytes).unwrap().resolve(PAGER_AREA, PAGED_AREA),
            Err(HeaderError::UnknownImageId(2))
        );

        let bytes = header(OPTEE_ARCH_ARM32, &[(u64::MAX, 1, 0x100)]);
        assert_eq!(
            classify(&bytes).unwrap().resolve(PAGER_AREA, PAGED_AREA),
            Err(HeaderError::MissingPager)
        );
    }
}
