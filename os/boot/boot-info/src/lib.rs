//! # Boot Stage Configuration and Image Model
//!
//! This crate defines the data model shared between the second-stage loader
//! and the runtime services that follow it: which firmware images exist, how
//! each one is placed in physical memory, how control is handed from one image
//! to the next, and the compile-time memory layout of the platform.
//!
//! ## Overview
//!
//! A secure boot chain moves through a fixed cast of images:
//!
//! ```text
//!   BL2 (this stage)
//!    ├── FW_CONFIG      firmware config blob, fixed location in SYSRAM
//!    ├── HW_CONFIG      hardware description handed to the next stages
//!    ├── BL31           runtime firmware (secure monitor)
//!    ├── BL32           trusted OS, optionally split into
//!    │    ├── BL32_EXTRA1   pager
//!    │    └── BL32_EXTRA2   paged overlay
//!    ├── TOS_FW_CONFIG  trusted OS configuration
//!    └── BL33           normal-world loader
//! ```
//!
//! Every image is described by a [`MemParams`](image::MemParams) record: its
//! identity, the [`ImageInfo`](image::ImageInfo) placement (base, maximum and
//! actual size, attribute bits) and the [`EntryPointInfo`](image::EntryPointInfo)
//! used when the image is started.
//!
//! ## Memory Layout ([`memory`])
//!
//! ```text
//! Physical Memory Layout:
//!
//! SYSRAM_BASE      ┌─────────────────────────────────┐ 0x2ffc_0000
//!                  │   Preloaded device tree         │
//!                  ├─────────────────────────────────┤
//!                  │   BL2 code and data             │
//! FW_CONFIG_BASE   ├─────────────────────────────────┤ 0x2fff_f000
//!                  │   Firmware config blob          │
//!                  └─────────────────────────────────┘ 0x3000_0000
//!
//! DDR_BASE         ┌─────────────────────────────────┐ 0xc000_0000
//!                  │   Normal world, download buffer │
//!                  ├─────────────────────────────────┤ top - S - SHMEM
//!                  │   Secure DDR (paged overlay)    │
//!                  ├─────────────────────────────────┤ top - SHMEM
//!                  │   Shared memory                 │
//!                  └─────────────────────────────────┘ DDR_BASE + ddr_size
//! ```
//!
//! The DDR size is only known once the memory controller has been probed,
//! which is why the runtime view lives in [`PlatformLayout`](memory::PlatformLayout)
//! while the fixed parts are `const` items checked at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod image;
pub mod memory;
