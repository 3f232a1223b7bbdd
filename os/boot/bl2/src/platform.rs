//! # Platform Hooks
//!
//! The hardware-facing collaborators of BL2. The loader logic never touches a
//! register directly; the board port implements these traits, and tests fake
//! them.

use boot_fdt::{Fdt, FdtError};
use boot_info::memory::PhysRegion;

/// Read-only view of memory that has been loaded by the image transfer step.
///
/// Loader builds usually identity-map SYSRAM and DDR and hand out direct
/// slices.
pub trait LoadedMemory {
    /// Bytes `[base, base + len)`, or `None` if the range is not readable.
    fn read(&self, base: u64, len: usize) -> Option<&[u8]>;
}

/// Data cache maintenance by physical range.
pub trait CacheMaintenance {
    /// Invalidate the data cache over `[base, base + size)`.
    fn invalidate_dcache_range(&mut self, base: u64, size: u64);
}

/// What a mapped region holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemoryKind {
    /// Executable, read-only.
    Code,
    /// Read-only, never executable.
    RoData,
    /// Read-write, never executable.
    RwData,
    Device,
}

/// Attributes for [`MemoryMapper::map`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapAttributes {
    pub kind: MemoryKind,
    pub secure: bool,
}

impl MapAttributes {
    #[must_use]
    pub const fn secure(kind: MemoryKind) -> Self {
        Self { kind, secure: true }
    }
}

/// Mapping failure, carrying the driver status code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mapping failed with status {0}")]
pub struct MapError(pub i32);

/// Hardware hook failure, carrying the driver status code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hardware returned status {0}")]
pub struct HwError(pub i32);

/// Maps physical ranges into the loader's translation regime.
///
/// A call either maps the whole range or nothing.
pub trait MemoryMapper {
    /// # Errors
    /// The range could not be mapped.
    fn map(&mut self, region: PhysRegion, attributes: MapAttributes) -> Result<(), MapError>;
}

/// Medium the boot ROM loaded BL2 from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BootInterface {
    Sd,
    Emmc,
    NorQspi,
    SerialUart,
    SerialUsb,
    NandFmc,
    NandQspi,
}

impl BootInterface {
    /// Decode the boot-ROM interface selector.
    #[must_use]
    pub const fn from_raw(selector: u16) -> Option<Self> {
        Some(match selector {
            1 => Self::Sd,
            2 => Self::Emmc,
            3 => Self::NorQspi,
            4 => Self::SerialUart,
            5 => Self::SerialUsb,
            6 => Self::NandFmc,
            7 => Self::NandQspi,
            _ => return None,
        })
    }

    /// Block devices transfer whole blocks and may leave trailing lines dirty.
    #[must_use]
    pub const fn is_block_device(self) -> bool {
        matches!(self, Self::Sd | Self::Emmc)
    }

    /// Serial download interfaces stage images in the DDR download buffer.
    #[must_use]
    pub const fn is_serial(self) -> bool {
        matches!(self, Self::SerialUart | Self::SerialUsb)
    }
}

/// Image authentication outcome reported by the boot ROM.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    NotChecked,
    Failed,
    Succeeded,
}

/// The part of the boot-ROM context BL2 consumes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootContext {
    pub boot_interface: BootInterface,
    pub instance: u16,
    pub auth_status: AuthStatus,
}

/// Board-level bring-up steps, in the order BL2 calls them.
///
/// Implementations wrap the `SoC` drivers; each step reports failure as a
/// [`HwError`] and the setup sequence decides whether it is fatal.
pub trait Bl2Platform {
    /// Decode the boot-ROM context handed over in `arg0`.
    fn boot_context(&self, arg0: u64) -> Option<BootContext>;

    /// Open the device tree preloaded at `base`.
    ///
    /// # Errors
    /// The blob is not a valid device tree.
    fn open_device_tree(&mut self, base: u64) -> Result<Fdt<'_>, FdtError>;

    /// Probe the fuse controller.
    ///
    /// # Errors
    /// Driver status.
    fn bsec_probe(&mut self) -> Result<(), HwError>;

    /// # Errors
    /// Driver status.
    fn clock_init(&mut self) -> Result<(), HwError>;

    /// Bring up the UART console and register it with the console crate.
    ///
    /// # Errors
    /// No usable UART; output stays disabled.
    fn console_setup(&mut self) -> Result<(), HwError>;

    /// Board model string from the device tree, if any.
    fn board_model(&self) -> Option<&str>;

    /// # Errors
    /// Driver status.
    fn watchdog_init(&mut self) -> Result<(), HwError>;

    /// Firewall and `TrustZone` controller setup for BL2 itself.
    ///
    /// # Errors
    /// Driver status.
    fn arch_security_setup(&mut self) -> Result<(), HwError>;

    /// Raw reset-status register (`RCC_MP_RSTSCLRR`).
    fn reset_status(&self) -> u32;

    /// Initialize the DDR controller and return the usable DDR size.
    ///
    /// # Errors
    /// Controller or PHY failure.
    fn ddr_probe(&mut self) -> Result<u64, HwError>;

    /// Final firewall setup before leaving BL2.
    ///
    /// # Errors
    /// Driver status.
    fn security_setup(&mut self) -> Result<(), HwError>;
}
