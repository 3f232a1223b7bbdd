//! # Second-Stage Boot Loader Platform Logic
//!
//! The platform half of BL2: bring the `SoC` to a state where images can be
//! loaded, then decide after each image load where the next images go and how
//! control flows between them.
//!
//! ## Boot Process
//!
//! ```text
//! Boot ROM
//!     ↓ arg0 = boot context
//! ┌─────────────────────────────────────────────┐
//! │                    BL2                      │
//! ├─────────────────────────────────────────────┤
//! │  1. early_platform_setup (save boot ctx)    │
//! │  2. arch_setup                              │
//! │     • map code and preloaded device tree    │
//! │     • fuses, clocks, console, watchdog      │
//! │     • report reset reason                   │
//! │  3. platform_setup                          │
//! │     • probe and map DDR                     │
//! │  4. for each image in the descriptor table: │
//! │     • load (generic loader)                 │
//! │     • ImageResolver::resolve (post-load)    │
//! │  5. prepare_exit                            │
//! └─────────────────────────────────────────────┘
//!     ↓
//! BL32 (trusted OS) → BL33 (normal world)
//! ```
//!
//! ## Key Components
//!
//! * [`config_store::ConfigStore`]: config-blob identity → `{addr, max_size}`,
//!   filled from the firmware config's DTB registry.
//! * [`desc_table::ImageDescTable`]: the image descriptors, keyed by
//!   [`ImageId`](boot_info::image::ImageId).
//! * [`resolver::ImageResolver`]: the post-load hook that places images from
//!   the config store and propagates placement between them.
//! * [`optee`]: recognition and refinement of composite trusted OS images.
//! * [`setup::Bl2Setup`]: the platform setup sequence over the
//!   [`platform`] hardware hooks.
//! * [`reset_reason::ResetReason`]: decoding of the reset-status register.
//!
//! Everything that touches hardware goes through the traits in [`platform`],
//! so the logic runs unchanged on the host under test.
//!
//! ## Failure Handling
//!
//! Library functions return `Result`s; the stage driver decides what is fatal
//! and halts through [`OrHalt`] after logging which stage failed. Descriptor
//! records that must exist structurally (the BL32 pager and paged slots, for
//! instance) are looked up with panicking accessors instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod config_store;
pub mod desc_table;
pub mod optee;
pub mod platform;
pub mod reset_reason;
pub mod resolver;
pub mod setup;

use core::fmt::Display;
use log::error;

/// Turns a fatal boot-stage failure into a logged halt.
pub trait OrHalt<T> {
    /// Unwrap the value, or log `stage` with the error and panic.
    fn or_halt(self, stage: &'static str) -> T;
}

impl<T, E: Display> OrHalt<T> for Result<T, E> {
    #[track_caller]
    fn or_halt(self, stage: &'static str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                error!("{stage}: {e}");
                panic!("{stage} failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrHalt;

    #[test]
    fn ok_passes_through() {
        let r: Result<u32, &str> = Ok(3);
        assert_eq!(r.or_halt("probe"), 3);
    }

    #[test]
    #[should_panic(expected = "DDR probe failed: timeout")]
    fn err_halts_with_stage() {
        let r: Result<u32, &str> = Err("timeout");
        r.or_halt("DDR probe");
    }
}
