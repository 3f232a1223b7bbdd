//! # Memory Layout

/// On-chip system RAM the boot ROM loads this stage into.
pub const SYSRAM_BASE: u64 = 0x2ffc_0000;

/// Size of the on-chip system RAM.
pub const SYSRAM_SIZE: u64 = 0x0004_0000;

/// Where the boot ROM leaves the device tree for this stage.
pub const DTB_BASE: u64 = SYSRAM_BASE;

/// Space reserved for the preloaded device tree.
pub const DTB_SIZE: u64 = 0x0000_7000;

/// Start of the loader's own code and data.
pub const BL_CODE_BASE: u64 = DTB_BASE + DTB_SIZE;

/// End (exclusive) of the loader's code and data.
pub const BL_CODE_END: u64 = FW_CONFIG_BASE;

/// The firmware config blob lives in the last page of SYSRAM.
pub const FW_CONFIG_BASE: u64 = SYSRAM_BASE + SYSRAM_SIZE - PAGE_SIZE;

/// Maximum size of the firmware config blob.
pub const FW_CONFIG_MAX_SIZE: u64 = 0x1000;

pub const PAGE_SIZE: u64 = 0x1000;

/// Physical base of external DDR.
pub const DDR_BASE: u64 = 0xc000_0000;

/// Largest DDR the platform can address; the real size is probed.
pub const DDR_MAX_SIZE: u64 = 0x4000_0000; // 1 GiB

/// Secure DDR carved out below the shared memory at the top of DDR.
pub const DDR_S_SIZE: u64 = 0x0100_0000; // 16 MiB

/// Non-secure/secure shared memory at the very top of DDR.
pub const DDR_SHMEM_SIZE: u64 = 0x0020_0000; // 2 MiB

/// Block size of the SD/eMMC transfer medium.
pub const MMC_BLOCK_SIZE: u64 = 512;

/// Worst-case bytes read from MMC past an image but not flushed by the load.
pub const MMC_OVERRUN: u64 = 2 * MMC_BLOCK_SIZE;

/// Buffer the UART/USB programmers download images into.
pub const DWL_BUFFER_BASE: u64 = DDR_BASE + 0x0800_0000;

pub const DWL_BUFFER_SIZE: u64 = 0x0800_0000;

const _: () = {
    assert!(SYSRAM_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(BL_CODE_BASE < BL_CODE_END);
    assert!(FW_CONFIG_BASE + FW_CONFIG_MAX_SIZE == SYSRAM_BASE + SYSRAM_SIZE);
    assert!(DDR_S_SIZE + DDR_SHMEM_SIZE < DDR_MAX_SIZE);
    assert!(DWL_BUFFER_BASE + DWL_BUFFER_SIZE <= DDR_BASE + DDR_MAX_SIZE);
};

/// A physical address range.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PhysRegion {
    pub base: u64,
    pub size: u64,
}

impl PhysRegion {
    #[must_use]
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// Exclusive end address, or `None` on overflow.
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.base.checked_add(self.size)
    }
}

/// Runtime view of the platform memory, once DDR has been probed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlatformLayout {
    pub ddr_base: u64,
    /// DDR size as reported by the memory controller / device tree.
    pub ddr_size: u64,
    pub ddr_secure_size: u64,
    pub ddr_shmem_size: u64,
    /// Fixed location of the firmware config blob.
    pub fw_config: PhysRegion,
    /// Bytes to invalidate past each loaded image when images come from a
    /// block device, or `None` when the transfer flushes everything it wrote.
    pub block_overrun: Option<u64>,
}

impl PlatformLayout {
    /// The platform defaults for a board with `ddr_size` bytes of DDR,
    /// booting from SD/eMMC.
    #[must_use]
    pub const fn with_ddr_size(ddr_size: u64) -> Self {
        Self {
            ddr_base: DDR_BASE,
            ddr_size,
            ddr_secure_size: DDR_S_SIZE,
            ddr_shmem_size: DDR_SHMEM_SIZE,
            fw_config: PhysRegion::new(FW_CONFIG_BASE, FW_CONFIG_MAX_SIZE),
            block_overrun: Some(MMC_OVERRUN),
        }
    }

    /// The secure partition right below the shared memory at the top of DDR.
    ///
    /// Returns `None` if the DDR is too small to hold both carve-outs.
    #[must_use]
    pub const fn secure_partition(&self) -> Option<PhysRegion> {
        let Some(reserved) = self.ddr_secure_size.checked_add(self.ddr_shmem_size) else {
            return None;
        };
        let Some(offset) = self.ddr_size.checked_sub(reserved) else {
            return None;
        };
        let Some(base) = self.ddr_base.checked_add(offset) else {
            return None;
        };
        Some(PhysRegion::new(base, self.ddr_secure_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_partition_sits_below_shmem() {
        let layout = PlatformLayout::with_ddr_size(0x2000_0000);
        let part = layout.secure_partition().unwrap();

        assert_eq!(part.base, 0xc000_0000 + 0x2000_0000 - 0x0100_0000 - 0x0020_0000);
        assert_eq!(part.size, DDR_S_SIZE);
        assert_eq!(part.end().unwrap() + DDR_SHMEM_SIZE, DDR_BASE + 0x2000_0000);
    }

    #[test]
    fn tiny_ddr_has_no_secure_partition() {
        let layout = PlatformLayout::with_ddr_size(DDR_S_SIZE);
        assert_eq!(layout.secure_partition(), None);
    }

    #[test]
    fn region_end_overflow() {
        assert_eq!(PhysRegion::new(u64::MAX, 1).end(), None);
        assert_eq!(PhysRegion::new(0x1000, 0x1000).end(), Some(0x2000));
    }
}
