//! # Silicon Provider Runtime Service
//!
//! Silicon-provider SMC service of the secure monitor for the QEMU SBSA
//! reference platform. The normal-world firmware asks it for the facts QEMU
//! decided at launch: platform version, GIC and ITS placement, CPU topology.
//!
//! ## Lifecycle
//!
//! ```text
//! cold boot (MMU off)            runtime (any core)
//! ───────────────────            ──────────────────
//! init(preloaded DTB)            handle_smc(fid, x1..x4, flags)
//!   └─ PlatformDescriptor::discover   └─ CallGate::handle
//!        └─ published once ─────────────► read-only
//! ```
//!
//! [`init`] parses the device tree before the MMU setup makes it unreachable
//! and publishes the result through a [`SyncOnceCell`]; [`handle_smc`] is the
//! entry the SMC dispatcher calls for the `SiP` owner range. Code that owns its
//! descriptor can use [`CallGate`] directly instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod descriptor;
pub mod gate;
pub mod smccc;

pub use descriptor::{DescriptorError, PLATFORM_CORE_COUNT, PlatformDescriptor};
pub use gate::CallGate;
pub use smccc::{SmcFlags, SmcReturn, World};

use boot_sync::SyncOnceCell;
use log::error;

static PLATFORM: SyncOnceCell<PlatformDescriptor> = SyncOnceCell::new();

/// Discover the platform from `dtb` and publish it for [`handle_smc`].
///
/// # Errors
/// Discovery failing, or the descriptor already being published.
pub fn init(dtb: &[u8]) -> Result<(), DescriptorError> {
    let desc = PlatformDescriptor::discover(dtb)?;
    PLATFORM
        .set(desc)
        .map_err(|_| DescriptorError::AlreadyInitialized)
}

/// The published descriptor, once [`init`] succeeded.
#[must_use]
pub fn platform() -> Option<&'static PlatformDescriptor> {
    PLATFORM.get()
}

/// SMC handler for the `SiP` range.
#[must_use]
pub fn handle_smc(fid: u32, x1: u64, x2: u64, x3: u64, x4: u64, flags: SmcFlags) -> SmcReturn {
    let Some(platform) = PLATFORM.get() else {
        error!("SiP call {fid:#x} before platform discovery");
        return SmcReturn::one(smccc::SMC_UNK);
    };
    CallGate::new(platform).handle(fid, World::from_flags(flags), [x1, x2, x3, x4])
}
