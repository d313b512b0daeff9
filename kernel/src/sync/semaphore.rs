//! # Semaphore.
//!
//! A **semaphore** regulates concurrent access to a finite set of resources.
//! It maintains a count of available units; [`Semaphore::wait`] (the
//! classical *P*) takes one, sleeping while none is left, and
//! [`Semaphore::signal`] (the classical *V*) puts one back and wakes a single
//! sleeper.
//!
//! A semaphore initialized with zero units works as an event: one thread
//! waits until another one signals that something happened. This is how the
//! drivers in `synchprobs` learn that all their workers are finished.
//!
//! Wakeups are not FIFO. A thread woken by `signal` may lose the unit to a
//! thread that was not sleeping at all; it then simply goes back to sleep.
//!
//! #### Usage Example
//!
//! ```
//! use synch::sync::Semaphore;
//!
//! let sema = Semaphore::new("slots", 2).unwrap();
//! sema.wait();
//! sema.wait();
//! assert!(sema.try_wait().is_err());
//! sema.signal();
//! assert_eq!(sema.count(), 1);
//! ```

use crate::{
    KernelError,
    config::{TraceFlags, traced},
    debug,
    util::kstrdup,
    wchan::WaitChannel,
};
use abyss::{
    interrupt::InterruptState,
    spinlock::{SpinLock, WouldBlock},
};

/// Counting semaphore.
pub struct Semaphore {
    name: String,
    wchan: WaitChannel,
    count: SpinLock<usize>,
}

impl Semaphore {
    /// Creates a new semaphore called `name` with `initial` units available.
    ///
    /// # Errors
    /// [`KernelError::NoMemory`] if the semaphore can not be allocated.
    pub fn new(name: &str, initial: usize) -> Result<Self, KernelError> {
        Ok(Self {
            name: kstrdup(name)?,
            wchan: WaitChannel::new(name)?,
            count: SpinLock::new(initial),
        })
    }

    /// The diagnostic name of this semaphore.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes one unit, sleeping until one is available.
    ///
    /// # Panics
    /// If the caller holds a spinlock, as it might have to sleep.
    #[track_caller]
    pub fn wait(&self) {
        assert!(
            InterruptState::current() == InterruptState::On,
            "Semaphore `{}`: wait while holding a spinlock.",
            self.name
        );

        let mut count = self.count.lock();
        while *count == 0 {
            let pin = self.wchan.lock();
            count.unlock();
            pin.sleep();
            count = self.count.lock();
        }
        *count -= 1;
        let left = *count;
        count.unlock();

        if traced(TraceFlags::SEMAPHORE) {
            debug!("sem {}: P ({} left)", self.name, left);
        }
    }

    /// Takes one unit if one is available, without sleeping.
    ///
    /// # Errors
    /// [`WouldBlock`] if the count is zero.
    pub fn try_wait(&self) -> Result<(), WouldBlock> {
        let mut count = self.count.lock();
        let result = match *count {
            0 => Err(WouldBlock),
            _ => {
                *count -= 1;
                Ok(())
            }
        };
        count.unlock();
        result
    }

    /// Puts one unit back and wakes one sleeper, if any.
    pub fn signal(&self) {
        let mut count = self.count.lock();
        *count = count
            .checked_add(1)
            .unwrap_or_else(|| panic!("Semaphore `{}` count overflow.", self.name));
        let now = *count;
        self.wchan.wake_one();
        count.unlock();

        if traced(TraceFlags::SEMAPHORE) {
            debug!("sem {}: V ({} available)", self.name, now);
        }
    }

    /// A snapshot of the number of available units.
    pub fn count(&self) -> usize {
        let count = self.count.lock();
        let now = *count;
        count.unlock();
        now
    }
}

impl core::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore")
            .field("name", &self.name)
            .field("count", &self.count())
            .finish()
    }
}
