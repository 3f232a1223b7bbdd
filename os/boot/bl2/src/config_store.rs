//! # Dynamic Config Store
//!
//! Maps config-blob identities to the place they are loaded to, as declared by
//! the `fconf,dyn_cfg-dtb_registry` node of the firmware config:
//!
//! ```text
//! dtb-registry {
//!     compatible = "fconf,dyn_cfg-dtb_registry";
//!     tos_fw {
//!         load-address = <0x0 0xde000000>;
//!         max-size = <0x1e00000>;
//!         id = <4>;
//!     };
//!     ...
//! };
//! ```

use boot_fdt::{Fdt, FdtError, Node};
use boot_info::image::ImageId;
use log::debug;

/// Number of entries the store can hold.
pub const CONFIG_STORE_CAPACITY: usize = 8;

/// `compatible` of the registry node in the firmware config.
pub const DTB_REGISTRY_COMPATIBLE: &str = "fconf,dyn_cfg-dtb_registry";

/// Where one config blob (or image) lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Raw identity, as carried by the `id` property.
    pub id: u32,
    pub addr: u64,
    pub max_size: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("firmware config has no dyn_cfg DTB registry")]
    UnrecognizedTree,
    #[error("registry entry lacks a valid \"{property}\" property")]
    IncompleteEntry { property: &'static str },
    #[error("config store is full")]
    StoreFull,
}

/// Fixed-capacity table of [`ConfigEntry`] records.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    entries: [Option<ConfigEntry>; CONFIG_STORE_CAPACITY],
    len: usize,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; CONFIG_STORE_CAPACITY],
            len: 0,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record `{addr, max_size}` for `id`, replacing an earlier record for
    /// the same identity.
    ///
    /// # Errors
    /// [`ConfigError::StoreFull`] when `id` is new and all slots are taken.
    pub fn set_config_info(&mut self, addr: u64, max_size: u64, id: u32) -> Result<(), ConfigError> {
        let entry = ConfigEntry { id, addr, max_size };

        if let Some(slot) = self.entries[..self.len]
            .iter_mut()
            .flatten()
            .find(|e| e.id == id)
        {
            *slot = entry;
            return Ok(());
        }

        let slot = self.entries.get_mut(self.len).ok_or(ConfigError::StoreFull)?;
        *slot = Some(entry);
        self.len += 1;
        Ok(())
    }

    /// Entry for `id`; `None` means the image is not configured in this boot.
    #[must_use]
    pub fn get(&self, id: ImageId) -> Option<&ConfigEntry> {
        self.get_raw(id.raw())
    }

    #[must_use]
    pub fn get_raw(&self, id: u32) -> Option<&ConfigEntry> {
        self.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries[..self.len].iter().flatten()
    }

    /// Add every child of the DTB registry node in `fdt` to the store.
    ///
    /// Returns the number of entries read.
    ///
    /// # Errors
    /// [`ConfigError::UnrecognizedTree`] without a registry node,
    /// [`ConfigError::IncompleteEntry`] for a child missing one of its
    /// properties, [`ConfigError::StoreFull`] on overflow.
    pub fn populate_dtb_registry(&mut self, fdt: &Fdt<'_>) -> Result<usize, ConfigError> {
        let registry = fdt
            .find_compatible(DTB_REGISTRY_COMPATIBLE)
            .ok_or(ConfigError::UnrecognizedTree)?;

        let mut count = 0;
        for child in registry.children() {
            let (addr, max_size, id) = read_registry_entry(&child)?;
            debug!(
                "dyn_cfg {}: id {id} at {addr:#x}, max {max_size:#x}",
                child.name()
            );
            self.set_config_info(addr, max_size, id)?;
            count += 1;
        }
        Ok(count)
    }
}

fn missing(property: &'static str) -> impl Fn(FdtError) -> ConfigError {
    move |_| ConfigError::IncompleteEntry { property }
}

fn read_registry_entry(node: &Node<'_>) -> Result<(u64, u64, u32), ConfigError> {
    let addr = node
        .read_u64("load-address")
        .map_err(missing("load-address"))?;
    let max_size = node.read_u32("max-size").map_err(missing("max-size"))?;
    let id = node.read_u32("id").map_err(missing("id"))?;
    Ok((addr, u64::from(max_size), id))
}
