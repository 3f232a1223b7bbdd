//! # Firmware Images
//!
//! Identities, placement records and entry-point descriptors for the images
//! the second-stage loader brings up.

use crate::memory::PhysRegion;
use bitfield_struct::bitfield;

/// Role of an image in the boot chain.
///
/// The discriminants follow the trusted-board-boot numbering and are the
/// values carried in the `id` property of firmware config blobs.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageId {
    /// Runtime firmware (secure monitor).
    Bl31 = 3,
    /// Trusted OS.
    Bl32 = 4,
    /// Normal-world loader.
    Bl33 = 5,
    /// Trusted OS pager, when BL32 is a composite image.
    Bl32Extra1 = 21,
    /// Trusted OS paged overlay, when BL32 is a composite image.
    Bl32Extra2 = 22,
    /// Hardware description handed to later stages.
    HwConfig = 23,
    /// Trusted OS configuration.
    TosFwConfig = 26,
    /// Firmware configuration consumed by this stage.
    FwConfig = 31,
}

impl ImageId {
    /// Every identity, in ascending numeric order.
    pub const ALL: [Self; 8] = [
        Self::Bl31,
        Self::Bl32,
        Self::Bl33,
        Self::Bl32Extra1,
        Self::Bl32Extra2,
        Self::HwConfig,
        Self::TosFwConfig,
        Self::FwConfig,
    ];

    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Short human-readable name, as used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bl31 => "BL31",
            Self::Bl32 => "BL32",
            Self::Bl33 => "BL33",
            Self::Bl32Extra1 => "BL32_EXTRA1",
            Self::Bl32Extra2 => "BL32_EXTRA2",
            Self::HwConfig => "HW_CONFIG",
            Self::TosFwConfig => "TOS_FW_CONFIG",
            Self::FwConfig => "FW_CONFIG",
        }
    }
}

impl core::fmt::Display for ImageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown image identifier {0}")]
pub struct UnknownImageId(pub u32);

impl TryFrom<u32> for ImageId {
    type Error = UnknownImageId;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|id| id.raw() == value)
            .ok_or(UnknownImageId(value))
    }
}

/// Image attribute bits.
///
/// - bit 0: reserved
/// - bit 1: skip loading (the image is not present in this boot)
/// - bit 2: platform setup (the platform wants a post-load callback)
/// - bits 3..31: reserved
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ImageAttributes {
    #[bits(1)]
    __reserved0: u8,
    pub skip_loading: bool,
    pub plat_setup: bool,
    #[bits(29)]
    __: u32,
}

/// Where an image lives.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    /// Physical load address.
    pub base: u64,
    /// Upper bound on the image size at `base`.
    pub max_size: u64,
    /// Bytes actually transferred; `<= max_size` once loaded.
    pub size: u64,
    pub attr: ImageAttributes,
}

impl ImageInfo {
    #[must_use]
    pub const fn new(base: u64, max_size: u64) -> Self {
        Self {
            base,
            max_size,
            size: 0,
            attr: ImageAttributes::new(),
        }
    }

    /// A placeholder for an image that is absent until resolved.
    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            base: 0,
            max_size: 0,
            size: 0,
            attr: ImageAttributes::new().with_skip_loading(true),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.attr.skip_loading()
    }

    /// The reserved area `{base, max_size}`.
    #[must_use]
    pub const fn region(&self) -> PhysRegion {
        PhysRegion::new(self.base, self.max_size)
    }
}

/// Instruction set the started image runs in.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ExecutionState {
    Aarch32,
    #[default]
    Aarch64,
}

/// Security state the started image runs in.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum SecurityState {
    #[default]
    Secure,
    NonSecure,
}

/// How control is handed to an image.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EntryPointInfo {
    /// Entry address.
    pub pc: u64,
    /// Return address for a secure-to-normal-world switch (`AArch32` `lr_svc`).
    pub lr_svc: u64,
    pub execution_state: ExecutionState,
    pub security: SecurityState,
    /// Argument registers `x0..x3` / `r0..r3` at entry.
    pub args: [u64; 4],
}

/// One image descriptor: identity, placement, entry point, successor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemParams {
    pub id: ImageId,
    pub image_info: ImageInfo,
    pub ep_info: EntryPointInfo,
    /// Image started after this one, if any.
    pub next_handoff: Option<ImageId>,
}

impl MemParams {
    #[must_use]
    pub const fn new(id: ImageId, image_info: ImageInfo) -> Self {
        Self {
            id,
            image_info,
            ep_info: EntryPointInfo {
                pc: 0,
                lr_svc: 0,
                execution_state: ExecutionState::Aarch64,
                security: SecurityState::Secure,
                args: [0; 4],
            },
            next_handoff: None,
        }
    }

    #[must_use]
    pub const fn with_entry(mut self, ep_info: EntryPointInfo) -> Self {
        self.ep_info = ep_info;
        self
    }

    #[must_use]
    pub const fn with_next_handoff(mut self, next: ImageId) -> Self {
        self.next_handoff = Some(next);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_loading_is_bit_one() {
        let attr = ImageAttributes::new().with_skip_loading(true);
        assert_eq!(attr.into_bits(), 0x2);

        let attr = ImageAttributes::from_bits(0x6);
        assert!(attr.skip_loading());
        assert!(attr.plat_setup());
    }

    #[test]
    fn image_id_numbering() {
        assert_eq!(ImageId::Bl32.raw(), 4);
        assert_eq!(ImageId::FwConfig.raw(), 31);
        assert_eq!(ImageId::try_from(26), Ok(ImageId::TosFwConfig));
        assert_eq!(ImageId::try_from(6), Err(UnknownImageId(6)));
    }

    #[test]
    fn skipped_placeholder() {
        let info = ImageInfo::skipped();
        assert!(info.is_skipped());
        assert_eq!((info.base, info.max_size), (0, 0));
        assert!(!ImageInfo::new(0x1000, 0x100).is_skipped());
    }
}
