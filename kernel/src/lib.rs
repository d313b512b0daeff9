//! # synch: sleeping synchronization primitives for the kernel.
//!
//! A kernel must coordinate access to shared state among many threads of
//! execution. The only primitive the lowest layer provides is the
//! [`SpinLock`], which busy-waits and must therefore only protect short
//! critical sections. This crate turns that non-blocking primitive, together
//! with a sleep queue ([`WaitChannel`]), into primitives that put a waiting
//! thread to sleep:
//!
//! - [`Semaphore`]: a counting resource gate.
//! - [`Lock`]: a binary mutual-exclusion lock that knows its holder.
//! - [`ConditionVariable`]: wait/signal/broadcast on top of a [`Lock`].
//! - [`RwLock`]: a reader-writer lock with an explicit fairness policy between
//!   waiting readers and waiting writers.
//!
//! The hard part of every one of them is the same: closing the window between
//! "decide to block" and "actually asleep" so that a concurrent release can
//! never produce a missed wakeup. All of them do it the same way. The primitive
//! pins its wait-channel *before* dropping its own spinlock, and only then
//! sleeps; a releaser needs the channel unpinned to wake anyone, so it can not
//! slip in between. Every woken thread re-validates its condition under the
//! spinlock before proceeding, because being woken does not mean winning the
//! race for the resource.
//!
//! ## Crate layout
//!
//! - [`thread`]: thread identity, parking, and spawning.
//! - [`wchan`]: the wait-channel.
//! - [`sync`]: the primitives themselves.
//! - [`config`]: process-wide tunables and tracing switches.
//!
//! [`SpinLock`]: sync::SpinLock
//! [`WaitChannel`]: wchan::WaitChannel
//! [`Semaphore`]: sync::Semaphore
//! [`Lock`]: sync::Lock
//! [`ConditionVariable`]: sync::ConditionVariable
//! [`RwLock`]: sync::RwLock

pub mod config;
pub mod sync;
pub mod thread;
pub mod util;
pub mod wchan;

pub use abyss::{debug, info, print, println, warning};

/// Enum representing errors that can occur during a kernel operation.
///
/// Only resource exhaustion and lookups are reported through this type.
/// Contract violations (releasing a lock that is not held, destroying a
/// primitive that still has sleepers, sleeping while holding a spinlock, ...)
/// are programming errors and panic on the spot.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KernelError {
    /// Out of memory. (ENOMEM)
    NoMemory,
    /// No such entry. (ENOENT)
    NoSuchEntry,
    /// Device or resource busy. (EBUSY)
    Busy,
    /// Invalid argument. (EINVAL)
    InvalidArgument,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            KernelError::NoMemory => "out of memory",
            KernelError::NoSuchEntry => "no such entry",
            KernelError::Busy => "resource busy",
            KernelError::InvalidArgument => "invalid argument",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for KernelError {}
