//! Interrupt state of the executing thread.
//!
//! On bare metal, holding a spinlock means running with interrupts disabled
//! so that the holder can neither be preempted nor re-enter the lock from an
//! interrupt handler. A hosted build has no interrupt flag to toggle, so the
//! state is modelled per thread: every live [`InterruptGuard`] counts as one
//! level of "interrupts off", and the state is [`InterruptState::On`] again
//! only after the outermost guard is dropped.
//!
//! Sleeping is only legal with interrupts on. The thread layer checks
//! [`InterruptState::current`] right before suspending a thread, which turns
//! "went to sleep while holding a spinlock" into an immediate panic instead of
//! a silent deadlock.

use core::{cell::Cell, marker::PhantomData};

std::thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Represents the state of interrupts of the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl InterruptState {
    /// Reads the current interrupt state.
    ///
    /// # Returns
    /// - [`InterruptState::On`] if interrupts are enabled.
    /// - [`InterruptState::Off`] if at least one [`InterruptGuard`] is alive
    ///   on this thread.
    pub fn current() -> Self {
        if DEPTH.with(Cell::get) == 0 {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// An RAII implementation of an interrupt-disabled section.
///
/// When an `InterruptGuard` is created, interrupts are disabled. When it is
/// dropped, the interrupt state is restored to what it was before the guard was
/// created.
///
/// - [`InterruptGuard`] instances **must be dropped in reverse order of their
///   creation** to prevent unintended interrupt state changes.
/// - The guard is bound to the thread that created it and is neither [`Send`]
///   nor [`Sync`].
///
/// This structure is created using [`InterruptGuard::new`].
pub struct InterruptGuard {
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Creates a new `InterruptGuard`, disabling interrupts.
    ///
    /// # Example
    /// ```
    /// use abyss::interrupt::{InterruptGuard, InterruptState};
    ///
    /// let guard = InterruptGuard::new(); // Disables interrupts
    /// assert_eq!(InterruptState::current(), InterruptState::Off);
    /// drop(guard); // Restores the previous state
    /// assert_eq!(InterruptState::current(), InterruptState::On);
    /// ```
    pub fn new() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| {
            let prev = depth.get();
            assert!(prev > 0, "Mismatched InterruptGuard drop calls: {prev}");
            depth.set(prev - 1);
        });
    }
}
