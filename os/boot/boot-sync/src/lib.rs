//! # Boot synchronization primitives
//!
//! The boot path runs single-threaded for most of its life, but state that is
//! discovered once (the platform descriptor, the registered console) is later
//! read from trap handlers that may execute on any core. [`SyncOnceCell`] is
//! the one-time initialization barrier that orders the single write before
//! every subsequent read.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod sync_once_cell;

pub use sync_once_cell::SyncOnceCell;
