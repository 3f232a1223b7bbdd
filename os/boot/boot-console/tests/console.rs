use boot_console::{Console, ConsoleError, ConsoleLogger, console_trace};
use log::LevelFilter;
use std::sync::Mutex;

struct Capture(Mutex<Vec<u8>>);

impl Capture {
    fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.lock().unwrap());
        String::from_utf8(bytes).unwrap()
    }
}

impl Console for Capture {
    fn putc(&self, byte: u8) {
        self.0.lock().unwrap().push(byte);
    }
}

static CAPTURE: Capture = Capture(Mutex::new(Vec::new()));
static OTHER: Capture = Capture(Mutex::new(Vec::new()));

// The console and logger are process-wide, so everything runs in one test.
#[test]
fn console_lifecycle() {
    // nothing registered yet: output is dropped
    console_trace!("lost\n");
    assert!(boot_console::console().is_none());

    boot_console::register(&CAPTURE).unwrap();
    assert_eq!(
        boot_console::register(&OTHER),
        Err(ConsoleError::AlreadyRegistered)
    );

    console_trace!("value={:#x}\n", 0x2a);
    assert_eq!(CAPTURE.take(), "value=0x2a\r\n");

    ConsoleLogger::new(LevelFilter::Info).init().unwrap();
    assert!(ConsoleLogger::new(LevelFilter::Trace).init().is_err());

    log::info!(target: "bl2", "Model: {}", "board");
    log::debug!(target: "bl2", "filtered");
    assert_eq!(CAPTURE.take(), "[INFO] bl2: Model: board\r\n");

    boot_console::mute();
    assert!(boot_console::is_muted());
    log::error!("silenced");
    console_trace!("silenced\n");
    assert_eq!(CAPTURE.take(), "");

    boot_console::unmute();
    log::warn!(target: "sip", "back");
    assert_eq!(CAPTURE.take(), "[WARN] sip: back\r\n");
    assert!(OTHER.take().is_empty());
}
