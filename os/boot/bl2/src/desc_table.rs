//! # Image Descriptor Table
//!
//! The loader's view of every image it may bring up, one slot per
//! [`ImageId`]. The resolver patches records in place; the generic loader
//! reads them to know where to put each image and whether to load it at all.

use boot_info::image::{
    EntryPointInfo, ExecutionState, ImageId, ImageInfo, MemParams, SecurityState,
};
use boot_info::memory::PlatformLayout;

/// One slot per image identity.
pub const IMAGE_DESC_CAPACITY: usize = ImageId::ALL.len();

const fn slot(id: ImageId) -> usize {
    match id {
        ImageId::Bl31 => 0,
        ImageId::Bl32 => 1,
        ImageId::Bl33 => 2,
        ImageId::Bl32Extra1 => 3,
        ImageId::Bl32Extra2 => 4,
        ImageId::HwConfig => 5,
        ImageId::TosFwConfig => 6,
        ImageId::FwConfig => 7,
    }
}

/// Owned table of image descriptors keyed by [`ImageId`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDescTable {
    slots: [Option<MemParams>; IMAGE_DESC_CAPACITY],
}

impl ImageDescTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None; IMAGE_DESC_CAPACITY],
        }
    }

    /// Store `params` in its slot, returning the record it replaced.
    pub fn insert(&mut self, params: MemParams) -> Option<MemParams> {
        self.slots[slot(params.id)].replace(params)
    }

    pub fn remove(&mut self, id: ImageId) -> Option<MemParams> {
        self.slots[slot(id)].take()
    }

    #[must_use]
    pub const fn contains(&self, id: ImageId) -> bool {
        self.slots[slot(id)].is_some()
    }

    #[must_use]
    pub const fn get(&self, id: ImageId) -> Option<&MemParams> {
        self.slots[slot(id)].as_ref()
    }

    pub fn get_mut(&mut self, id: ImageId) -> Option<&mut MemParams> {
        self.slots[slot(id)].as_mut()
    }

    /// Descriptor that must exist for the table to be well-formed.
    ///
    /// # Panics
    /// If the slot is empty; that is a table construction bug, not a runtime
    /// condition.
    #[track_caller]
    #[must_use]
    pub fn params(&self, id: ImageId) -> &MemParams {
        match self.get(id) {
            Some(p) => p,
            None => panic!("image descriptor {id} missing from table"),
        }
    }

    /// Mutable counterpart of [`params`](Self::params).
    ///
    /// # Panics
    /// If the slot is empty.
    #[track_caller]
    pub fn params_mut(&mut self, id: ImageId) -> &mut MemParams {
        match self.get_mut(id) {
            Some(p) => p,
            None => panic!("image descriptor {id} missing from table"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemParams> {
        self.slots.iter().flatten()
    }

    /// Images to load, in slot order.
    pub fn loadable(&self) -> impl Iterator<Item = &MemParams> {
        self.iter().filter(|p| !p.image_info.is_skipped())
    }

    /// Follow `next_handoff` links starting at `first`.
    ///
    /// Stops at a missing descriptor or after visiting every slot once.
    pub fn handoff_chain(&self, first: ImageId) -> impl Iterator<Item = ImageId> + '_ {
        let mut next = Some(first);
        let mut budget = IMAGE_DESC_CAPACITY;
        core::iter::from_fn(move || {
            let params = self.get(next?)?;
            budget = budget.checked_sub(1)?;
            next = params.next_handoff;
            Some(params.id)
        })
    }
}

const fn entry(security: SecurityState) -> EntryPointInfo {
    EntryPointInfo {
        pc: 0,
        lr_svc: 0,
        execution_state: ExecutionState::Aarch32,
        security,
        args: [0; 4],
    }
}

/// The standard BL2 image set.
///
/// The firmware config is loaded from its fixed location; every other image
/// starts out skipped with zero placement until the resolver finds it in the
/// config store. Hand-off order is BL31 → BL32 → BL33.
#[must_use]
pub fn default_bl2_descs(layout: &PlatformLayout) -> ImageDescTable {
    let mut table = ImageDescTable::new();

    table.insert(MemParams::new(
        ImageId::FwConfig,
        ImageInfo::new(layout.fw_config.base, layout.fw_config.size),
    ));

    table.insert(
        MemParams::new(ImageId::Bl31, ImageInfo::skipped())
            .with_entry(entry(SecurityState::Secure))
            .with_next_handoff(ImageId::Bl32),
    );
    table.insert(
        MemParams::new(ImageId::Bl32, ImageInfo::skipped())
            .with_entry(entry(SecurityState::Secure))
            .with_next_handoff(ImageId::Bl33),
    );
    table.insert(MemParams::new(ImageId::Bl32Extra1, ImageInfo::skipped()));
    table.insert(MemParams::new(ImageId::Bl32Extra2, ImageInfo::skipped()));
    table.insert(MemParams::new(ImageId::HwConfig, ImageInfo::skipped()));
    table.insert(MemParams::new(ImageId::TosFwConfig, ImageInfo::skipped()));
    table.insert(
        MemParams::new(ImageId::Bl33, ImageInfo::skipped())
            .with_entry(entry(SecurityState::NonSecure)),
    );

    table
}
