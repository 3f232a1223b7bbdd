//! # BL2 Platform Setup
//!
//! The board bring-up sequence around image loading. Each stage returns a
//! [`SetupError`] naming what failed; the driver halts on it.

use crate::platform::{
    AuthStatus, Bl2Platform, BootContext, BootInterface, CacheMaintenance, HwError, MapAttributes,
    MapError, MemoryKind, MemoryMapper,
};
use crate::reset_reason::ResetReason;
use boot_fdt::FdtError;
use boot_info::memory::{
    BL_CODE_BASE, BL_CODE_END, DDR_BASE, DDR_MAX_SIZE, DTB_BASE, DTB_SIZE, DWL_BUFFER_BASE,
    DWL_BUFFER_SIZE, PhysRegion, PlatformLayout,
};
use log::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("no boot context at {0:#x}")]
    BootContext(u64),
    #[error("{region} mapping: {source}")]
    Map {
        region: &'static str,
        source: MapError,
    },
    #[error("device tree: {0}")]
    DeviceTree(#[from] FdtError),
    #[error("{stage}: {source}")]
    Hardware {
        stage: &'static str,
        source: HwError,
    },
    #[error("invalid DDR size {0:#x}")]
    DdrSize(u64),
}

fn hw(stage: &'static str) -> impl Fn(HwError) -> SetupError {
    move |source| SetupError::Hardware { stage, source }
}

/// Drives the BL2 stages over a board's [`Bl2Platform`] and [`MemoryMapper`].
pub struct Bl2Setup<P, M> {
    platform: P,
    mapper: M,
    boot_ctx_addr: u64,
    boot_context: Option<BootContext>,
}

impl<P, M> Bl2Setup<P, M>
where
    P: Bl2Platform,
    M: MemoryMapper,
{
    pub const fn new(platform: P, mapper: M) -> Self {
        Self {
            platform,
            mapper,
            boot_ctx_addr: 0,
            boot_context: None,
        }
    }

    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Remember where the boot ROM left its context.
    pub const fn early_platform_setup(&mut self, arg0: u64) {
        self.boot_ctx_addr = arg0;
    }

    /// Boot interface recorded by [`arch_setup`](Self::arch_setup).
    #[must_use]
    pub fn saved_boot_interface(&self) -> Option<BootInterface> {
        self.boot_context.map(|ctx| ctx.boot_interface)
    }

    /// Map BL2 itself, bring up the `SoC` basics and report the reset reason.
    ///
    /// A console failure only mutes output.
    ///
    /// # Errors
    /// Any other step failing.
    pub fn arch_setup(&mut self) -> Result<ResetReason, SetupError> {
        self.map(
            "BL2 code",
            PhysRegion::new(BL_CODE_BASE, BL_CODE_END - BL_CODE_BASE),
            MapAttributes::secure(MemoryKind::Code),
        )?;
        self.map(
            "device tree",
            PhysRegion::new(DTB_BASE, DTB_SIZE),
            MapAttributes::secure(MemoryKind::RoData),
        )?;

        self.platform.open_device_tree(DTB_BASE)?;

        self.platform.bsec_probe().map_err(hw("BSEC probe"))?;
        self.platform.clock_init().map_err(hw("clock init"))?;

        let ctx = self
            .platform
            .boot_context(self.boot_ctx_addr)
            .ok_or(SetupError::BootContext(self.boot_ctx_addr))?;
        self.boot_context = Some(ctx);
        debug!(
            "boot interface {:?} instance {}",
            ctx.boot_interface, ctx.instance
        );

        if self.platform.console_setup().is_ok() {
            if let Some(model) = self.platform.board_model() {
                info!("Model: {model}");
            }
            match ctx.auth_status {
                AuthStatus::NotChecked => {}
                AuthStatus::Failed => info!("Bootrom authentication failed"),
                AuthStatus::Succeeded => info!("Bootrom authentication succeeded"),
            }
        } else {
            boot_console::mute();
        }

        self.platform.watchdog_init().map_err(hw("watchdog init"))?;
        self.platform
            .arch_security_setup()
            .map_err(hw("security setup"))?;

        Ok(ResetReason::report(self.platform.reset_status()))
    }

    /// Probe and map DDR.
    ///
    /// # Errors
    /// DDR init failing, a size outside `1..=DDR_MAX_SIZE`, or the mapping
    /// failing.
    pub fn platform_setup(&mut self) -> Result<PlatformLayout, SetupError> {
        let ddr_size = self.platform.ddr_probe().map_err(hw("DDR init"))?;
        if ddr_size == 0 || ddr_size > DDR_MAX_SIZE {
            return Err(SetupError::DdrSize(ddr_size));
        }

        self.map(
            "DDR",
            PhysRegion::new(DDR_BASE, DDR_MAX_SIZE),
            MapAttributes::secure(MemoryKind::RwData),
        )?;

        let mut layout = PlatformLayout::with_ddr_size(ddr_size);
        if !self
            .saved_boot_interface()
            .is_some_and(BootInterface::is_block_device)
        {
            layout.block_overrun = None;
        }
        info!("DDR: {} MiB", ddr_size >> 20);
        Ok(layout)
    }

    /// Last step before BL2 hands over.
    ///
    /// # Errors
    /// The final security setup failing.
    pub fn prepare_exit<C>(
        &mut self,
        boot_interface: BootInterface,
        cache: &mut C,
    ) -> Result<(), SetupError>
    where
        C: CacheMaintenance + ?Sized,
    {
        if boot_interface.is_serial() {
            cache.invalidate_dcache_range(DWL_BUFFER_BASE, DWL_BUFFER_SIZE);
        }
        self.platform.security_setup().map_err(hw("security setup"))
    }

    fn map(
        &mut self,
        region_name: &'static str,
        region: PhysRegion,
        attributes: MapAttributes,
    ) -> Result<(), SetupError> {
        self.mapper
            .map(region, attributes)
            .map_err(|source| {
                warn!("{region_name}: cannot map {:#x}+{:#x}", region.base, region.size);
                SetupError::Map {
                    region: region_name,
                    source,
                }
            })
    }
}
