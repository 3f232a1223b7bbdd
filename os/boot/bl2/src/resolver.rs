//! # Image Resolver
//!
//! The post-load hook of BL2. The generic loader calls
//! [`ImageResolver::resolve`] after each image it brought in (or skipped);
//! the resolver patches the descriptor table so the following loads and the
//! final hand-off see the right placement.
//!
//! ```text
//! FW_CONFIG loaded ──► dtb registry ──► ConfigStore
//!                                          │
//!            ┌─────────────────────────────┘
//!            ▼
//!   BL32 / BL33 / HW_CONFIG / TOS_FW_CONFIG: base, max size, un-skip
//!   BL32_EXTRA1 ◄── BL32 placement      BL32_EXTRA2 ◄── secure DDR top
//!
//! BL32 loaded ──► composite header?
//!                   yes: pager/paged refined, entry = pager base
//!                   no:  entry = base, TOS_FW_CONFIG span folded in
//!
//! BL33 loaded ──► BL32 returns to BL33's entry point
//! ```

use crate::config_store::{ConfigError, ConfigStore};
use crate::desc_table::ImageDescTable;
use crate::optee::{self, HeaderError};
use crate::platform::{CacheMaintenance, LoadedMemory};
use boot_fdt::{Fdt, FdtError};
use boot_info::image::{ImageId, ImageInfo};
use boot_info::memory::PlatformLayout;
use log::{debug, info};

/// Images placed from the config store once the firmware config is in.
pub const CONFIG_IMAGES: [ImageId; 4] = [
    ImageId::Bl32,
    ImageId::Bl33,
    ImageId::HwConfig,
    ImageId::TosFwConfig,
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("image {0} cannot be placed from the firmware config")]
    InvalidImageIdentity(ImageId),
    #[error("firmware config: {0}")]
    Config(#[from] ConfigError),
    #[error("firmware config is not a device tree: {0}")]
    Fdt(#[from] FdtError),
    #[error("loaded image {id} at {base:#x} is not readable")]
    ImageUnreadable { id: ImageId, base: u64 },
    #[error("OPTEE header parse error: {0}")]
    Header(#[from] HeaderError),
    #[error("DDR too small for the secure partition")]
    SecureRegionUnavailable,
    #[error("placement of {0} overflows the address space")]
    AddressOverflow(ImageId),
}

/// Post-load placement logic over a platform memory layout.
#[derive(Debug, Copy, Clone)]
pub struct ImageResolver<'l> {
    layout: &'l PlatformLayout,
    config_images: &'l [ImageId],
}

impl<'l> ImageResolver<'l> {
    #[must_use]
    pub const fn new(layout: &'l PlatformLayout) -> Self {
        Self {
            layout,
            config_images: &CONFIG_IMAGES,
        }
    }

    /// Replace the list of images placed from the config store.
    ///
    /// Only [`CONFIG_IMAGES`] members are placeable; anything else, or a
    /// listed image without a descriptor, fails the firmware-config step with
    /// [`PlacementError::InvalidImageIdentity`].
    #[must_use]
    pub const fn with_config_images(mut self, ids: &'l [ImageId]) -> Self {
        self.config_images = ids;
        self
    }

    /// Run the post-load step for `id`.
    ///
    /// # Errors
    /// Every error is fatal to the boot.
    ///
    /// # Panics
    /// If `descs` lacks `id` itself, or the two extra images when BL32 is
    /// placed or inspected.
    pub fn resolve<M, C>(
        &self,
        id: ImageId,
        descs: &mut ImageDescTable,
        store: &mut ConfigStore,
        memory: &M,
        cache: &mut C,
    ) -> Result<(), PlacementError>
    where
        M: LoadedMemory + ?Sized,
        C: CacheMaintenance + ?Sized,
    {
        // the loader only reports images it has a descriptor for
        let _ = descs.params(id);

        match id {
            ImageId::FwConfig => self.apply_fw_config(descs, store, memory)?,
            ImageId::Bl32 => Self::bl32_loaded(descs, memory)?,
            ImageId::Bl33 => {
                let pc = descs.params(ImageId::Bl33).ep_info.pc;
                descs.params_mut(ImageId::Bl32).ep_info.lr_svc = pc;
            }
            _ => {}
        }

        self.invalidate_overrun(id, descs, cache)
    }

    fn apply_fw_config<M>(
        &self,
        descs: &mut ImageDescTable,
        store: &mut ConfigStore,
        memory: &M,
    ) -> Result<(), PlacementError>
    where
        M: LoadedMemory + ?Sized,
    {
        let fw = self.layout.fw_config;
        store.set_config_info(fw.base, fw.size, ImageId::FwConfig.raw())?;

        let loaded = descs.params(ImageId::FwConfig).image_info;
        let len = if loaded.size == 0 { fw.size } else { loaded.size };
        let blob = read_image(memory, ImageId::FwConfig, fw.base, len)?;
        let fdt = Fdt::new(blob)?;
        let entries = store.populate_dtb_registry(&fdt)?;
        debug!("FW_CONFIG: {entries} dtb registry entries");

        let has_tos_config = store.get(ImageId::TosFwConfig).is_some();

        for &image in self.config_images {
            if image == ImageId::TosFwConfig && !has_tos_config {
                continue;
            }

            let Some(params) = descs.get_mut(image) else {
                return Err(PlacementError::InvalidImageIdentity(image));
            };
            let Some(entry) = store.get(image).copied() else {
                debug!("{image} not configured, left skipped");
                continue;
            };

            params.image_info.base = entry.addr;
            params.image_info.max_size = entry.max_size;
            params.image_info.attr.set_skip_loading(false);

            match image {
                ImageId::Bl32 => {
                    params.ep_info.pc = entry.addr;

                    let pager = descs.params_mut(ImageId::Bl32Extra1);
                    pager.image_info.base = entry.addr;
                    pager.image_info.max_size = entry.max_size;

                    let secure = self
                        .layout
                        .secure_partition()
                        .ok_or(PlacementError::SecureRegionUnavailable)?;
                    let paged = descs.params_mut(ImageId::Bl32Extra2);
                    paged.image_info.base = secure.base;
                    paged.image_info.max_size = secure.size;
                }
                ImageId::Bl33 => params.ep_info.pc = entry.addr,
                ImageId::HwConfig | ImageId::TosFwConfig => {}
                other => return Err(PlacementError::InvalidImageIdentity(other)),
            }

            info!("{image}: {:#x}, max {:#x}", entry.addr, entry.max_size);
        }

        Ok(())
    }

    fn bl32_loaded<M>(descs: &mut ImageDescTable, memory: &M) -> Result<(), PlacementError>
    where
        M: LoadedMemory + ?Sized,
    {
        let info = descs.params(ImageId::Bl32).image_info;
        if info.is_skipped() {
            debug!("BL32 not configured, nothing to inspect");
            return Ok(());
        }
        let bytes = read_image(memory, ImageId::Bl32, info.base, info.size)?;

        if let Some(header) = optee::classify(bytes) {
            descs.params_mut(ImageId::Bl32).ep_info.pc = info.base;

            let pager_area = descs.params(ImageId::Bl32Extra1).image_info.region();
            let paged_area = descs.params(ImageId::Bl32Extra2).image_info.region();

            let composite = header.resolve(pager_area, paged_area)?;

            let pager = &mut descs.params_mut(ImageId::Bl32Extra1).image_info;
            refine(pager, composite.pager.base, composite.pager.size);
            let paged = &mut descs.params_mut(ImageId::Bl32Extra2).image_info;
            match composite.paged {
                Some(region) => refine(paged, region.base, region.size),
                None => paged.size = 0,
            }

            let ep = &mut descs.params_mut(ImageId::Bl32).ep_info;
            ep.pc = composite.entry_point;
            ep.execution_state = composite.execution_state;
            ep.args[0] = composite.args[0];
            ep.args[1] = composite.args[1];
            ep.args[2] = 0;

            info!(
                "BL32: OP-TEE pager at {:#x}, paged at {:#x}",
                composite.pager.base, composite.args[0]
            );
        } else {
            let tos_max = descs
                .get(ImageId::TosFwConfig)
                .map_or(0, |p| p.image_info.max_size);

            let bl32 = descs.params_mut(ImageId::Bl32);
            bl32.ep_info.pc = info.base;
            bl32.image_info.max_size = bl32
                .image_info
                .max_size
                .checked_add(tos_max)
                .ok_or(PlacementError::AddressOverflow(ImageId::Bl32))?;
            bl32.ep_info.args[0] = 0;

            info!("BL32: monolithic image at {:#x}", info.base);
        }

        Ok(())
    }

    /// Drop cache lines a block device may have filled past the image end.
    fn invalidate_overrun<C>(
        &self,
        id: ImageId,
        descs: &ImageDescTable,
        cache: &mut C,
    ) -> Result<(), PlacementError>
    where
        C: CacheMaintenance + ?Sized,
    {
        let Some(overrun) = self.layout.block_overrun else {
            return Ok(());
        };
        if id == ImageId::FwConfig {
            return Ok(());
        }

        let info = descs.params(id).image_info;
        if info.is_skipped() {
            return Ok(());
        }

        let end = info
            .base
            .checked_add(info.size)
            .ok_or(PlacementError::AddressOverflow(id))?;
        cache.invalidate_dcache_range(end, overrun);
        Ok(())
    }
}

/// Set the refined placement of a sub-image and mark it for loading.
fn refine(info: &mut ImageInfo, base: u64, size: u64) {
    info.base = base;
    info.size = size;
    info.attr.set_skip_loading(false);
}

fn read_image<M>(memory: &M, id: ImageId, base: u64, len: u64) -> Result<&[u8], PlacementError>
where
    M: LoadedMemory + ?Sized,
{
    usize::try_from(len)
        .ok()
        .and_then(|len| memory.read(base, len))
        .ok_or(PlacementError::ImageUnreadable { id, base })
}
