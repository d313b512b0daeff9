//! Kernel print utilities.
//!
//! [`print!`] and [`println!`] write straight to the console, serialized by a
//! spinlock so that lines from different threads never interleave. The
//! leveled macros ([`info!`], [`warning!`], [`debug!`]) go through the `log`
//! facade instead, so whichever logger the embedding program installs decides
//! what is shown.

use crate::spinlock::SpinLock;
use std::io::Write;

/// The console device. On a hosted build this is the standard error stream.
struct Console;

impl core::fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        std::io::stderr()
            .write_all(s.as_bytes())
            .map_err(|_| core::fmt::Error)
    }
}

static CONSOLE: SpinLock<Console> = SpinLock::new(Console);

#[doc(hidden)]
pub fn _print(fmt: core::fmt::Arguments<'_>) {
    use core::fmt::Write;

    let mut guard = CONSOLE.lock();
    let _ = guard.write_fmt(fmt);
    guard.unlock();
}

/// Prints out the message.
///
/// Use the format! syntax to write data to the console.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// Prints out the message with a newline.
///
/// Use the format! syntax to write data to the console.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Display an information message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => ($crate::__log::info!($($arg)+));
}

/// Display a warning message.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)+) => ($crate::__log::warn!($($arg)+));
}

/// Display a debug message.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => ($crate::__log::debug!($($arg)+));
}
