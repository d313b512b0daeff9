//! Abyss: the layer underneath the sleeping synchronization primitives.
//!
//! Everything here is non-blocking. The [`spinlock`] busy-waits, the
//! [`interrupt`] module tracks whether the executing thread currently sits in
//! an interrupts-off section, and [`kprint`] provides the console and log
//! macros shared by the whole kernel.

pub mod interrupt;
pub mod kprint;
pub mod spinlock;

#[doc(hidden)]
pub use log as __log;
