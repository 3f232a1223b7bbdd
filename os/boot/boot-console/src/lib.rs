//! # Boot Console and Logging
//!
//! Diagnostic output for the boot stages and runtime services. The platform
//! registers one [`Console`] (typically a UART driver) early during setup;
//! everything printed afterwards, through the `log` facade or the raw
//! [`console_trace!`] macro, ends up there.
//!
//! ```text
//! log::info!(..)            console_trace!(..)
//!     ↓                            ↓
//! ConsoleLogger (log::Log)         │
//!     ↓                            ↓
//!     └──────→ console_fmt::console_write(fmt::Arguments)
//!                     ↓
//!              ConsoleSink (fmt::Write)
//!                     ↓
//!           registered &'static dyn Console
//! ```
//!
//! Nothing here allocates. Output written before a console is registered, or
//! while the console is [muted](mute), is dropped silently; a boot stage whose
//! console bring-up failed keeps running, it just stops talking.
//!
//! ## Features
//!
//! * `enabled` (default): output is compiled in. Without it, [`console_trace!`]
//!   and the logger compile to no-ops.
//!
//! ## Usage
//! ```rust,no_run
//! use boot_console::{Console, ConsoleLogger};
//! use log::{LevelFilter, info};
//!
//! struct Uart;
//!
//! impl Console for Uart {
//!     fn putc(&self, byte: u8) {
//!         // write to the data register
//!         let _ = byte;
//!     }
//! }
//!
//! static UART: Uart = Uart;
//!
//! boot_console::register(&UART).expect("console registration");
//! ConsoleLogger::new(LevelFilter::Info).init().expect("logger initialization");
//! info!("BL2: console up");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod logger;

pub use logger::ConsoleLogger;

use boot_sync::SyncOnceCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// A byte-oriented output device.
pub trait Console: Sync {
    /// Emit one byte, blocking until the device accepts it.
    fn putc(&self, byte: u8);

    /// Wait until everything written so far has left the device.
    fn flush(&self) {}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("a console is already registered")]
    AlreadyRegistered,
}

static CONSOLE: SyncOnceCell<&'static dyn Console> = SyncOnceCell::new();
static MUTED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide console. Only the first registration wins.
///
/// # Errors
/// [`ConsoleError::AlreadyRegistered`] on any later call.
pub fn register(console: &'static dyn Console) -> Result<(), ConsoleError> {
    CONSOLE
        .set(console)
        .map_err(|_| ConsoleError::AlreadyRegistered)
}

/// The registered console, if any.
pub fn console() -> Option<&'static dyn Console> {
    CONSOLE.get().copied()
}

/// Drop all further output until [`unmute`] is called.
pub fn mute() {
    MUTED.store(true, Ordering::Release);
}

pub fn unmute() {
    MUTED.store(false, Ordering::Release);
}

#[must_use]
pub fn is_muted() -> bool {
    MUTED.load(Ordering::Acquire)
}

/// Flush the registered console, if there is one.
pub fn flush() {
    if let Some(c) = console() {
        c.flush();
    }
}

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod console_fmt {
    use crate::Console;
    use core::fmt::{self, Write};

    /// `fmt::Write` adapter over a [`Console`], translating `\n` to `\r\n`.
    pub struct ConsoleSink<'a> {
        console: &'a dyn Console,
    }

    impl<'a> ConsoleSink<'a> {
        pub const fn new(console: &'a dyn Console) -> Self {
            Self { console }
        }
    }

    impl Write for ConsoleSink<'_> {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                if b == b'\n' {
                    self.console.putc(b'\r');
                }
                self.console.putc(b);
            }
            Ok(())
        }

        #[inline]
        fn write_char(&mut self, c: char) -> fmt::Result {
            // UTF-8 encode without allocation.
            let mut buf = [0u8; 4];
            let s = c.encode_utf8(&mut buf);
            self.write_str(s)
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn console_write(args: fmt::Arguments) {
        if crate::is_muted() {
            return;
        }
        if let Some(console) = crate::console() {
            // Ignore errors; this is best-effort debug output.
            let _ = fmt::write(&mut ConsoleSink::new(console), args);
        }
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod console_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn console_write(_: fmt::Arguments) {
        // no-op when feature disabled
    }
}

/// Raw formatted output to the registered console, bypassing `log`.
#[macro_export]
macro_rules! console_trace {
    ($($arg:tt)*) => {{
        // No allocation: `format_args!` builds a lightweight `Arguments`.
        $crate::console_fmt::console_write(core::format_args!($($arg)*));
    }};
}

#[cfg(all(test, feature = "enabled"))]
mod tests {
    use super::console_fmt::ConsoleSink;
    use super::Console;
    use core::fmt::Write;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<u8>>);

    impl Console for Capture {
        fn putc(&self, byte: u8) {
            self.0.lock().unwrap().push(byte);
        }
    }

    #[test]
    fn sink_translates_newlines() {
        let cap = Capture::default();
        let mut sink = ConsoleSink::new(&cap);
        write!(sink, "a\nb").unwrap();
        assert_eq!(cap.0.lock().unwrap().as_slice(), b"a\r\nb");
    }

    #[test]
    fn sink_encodes_utf8() {
        let cap = Capture::default();
        let mut sink = ConsoleSink::new(&cap);
        sink.write_char('µ').unwrap();
        assert_eq!(cap.0.lock().unwrap().as_slice(), "µ".as_bytes());
    }
}
