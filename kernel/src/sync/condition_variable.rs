//! # Condition Variable.
//!
//! A condition variable lets a thread sleep until another thread announces
//! that some predicate over shared state may have changed. It carries no state
//! of its own: the predicate lives in the caller's data, and that data is
//! guarded by a [`Lock`] which every waiter and every signaller must hold.
//!
//! [`ConditionVariable::wait`] releases the lock, sleeps, and re-acquires the
//! lock before returning. The channel is pinned *before* the lock is dropped,
//! so a signaller, which must first take the lock, can not slip its wakeup in
//! between. Being woken only means the predicate *may* hold, so waiting always
//! happens in a loop:
//!
//! ```
//! use synch::sync::{ConditionVariable, Lock, SpinLock};
//!
//! let lock = Lock::new("ready lock").unwrap();
//! let cv = ConditionVariable::new("ready cv").unwrap();
//! let ready = SpinLock::new(true);
//!
//! let is_ready = || {
//!     let guard = ready.lock();
//!     let now = *guard;
//!     guard.unlock();
//!     now
//! };
//!
//! lock.acquire();
//! cv.wait_while(&lock, || !is_ready());
//! assert!(lock.do_i_hold());
//! lock.release();
//! ```

use super::Lock;
use crate::{
    KernelError,
    config::{TraceFlags, traced},
    debug,
    util::kstrdup,
    wchan::WaitChannel,
};

/// A condition variable, used together with a [`Lock`].
pub struct ConditionVariable {
    name: String,
    wchan: WaitChannel,
}

impl ConditionVariable {
    /// Creates a condition variable called `name`.
    ///
    /// # Errors
    /// [`KernelError::NoMemory`] if it can not be allocated.
    pub fn new(name: &str) -> Result<Self, KernelError> {
        Ok(Self {
            name: kstrdup(name)?,
            wchan: WaitChannel::new(name)?,
        })
    }

    /// The diagnostic name of this condition variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Releases `lock`, sleeps until signalled, and re-acquires `lock`.
    ///
    /// # Panics
    /// If the caller does not hold `lock`.
    #[track_caller]
    pub fn wait(&self, lock: &Lock) {
        assert!(
            lock.do_i_hold(),
            "Condition variable `{}`: wait without holding lock `{}`.",
            self.name,
            lock.name()
        );
        if traced(TraceFlags::CONDVAR) {
            debug!("cv {}: wait (lock {})", self.name, lock.name());
        }

        let pin = self.wchan.lock();
        lock.release();
        pin.sleep();
        lock.acquire();
    }

    /// Waits on this condition variable until `condition` returns false.
    ///
    /// `condition` is evaluated with `lock` held, both before the first wait
    /// and after every wakeup.
    pub fn wait_while(&self, lock: &Lock, mut condition: impl FnMut() -> bool) {
        while condition() {
            self.wait(lock);
        }
    }

    /// Wakes one thread waiting on this condition variable.
    ///
    /// The caller should hold `lock`, the lock the waiters use.
    pub fn signal(&self, lock: &Lock) {
        let woken = self.wchan.wake_one();
        if traced(TraceFlags::CONDVAR) {
            debug!("cv {}: signal (lock {}, woken {})", self.name, lock.name(), woken);
        }
    }

    /// Wakes every thread waiting on this condition variable.
    ///
    /// The caller should hold `lock`, the lock the waiters use.
    pub fn broadcast(&self, lock: &Lock) {
        let woken = self.wchan.wake_all();
        if traced(TraceFlags::CONDVAR) {
            debug!("cv {}: broadcast (lock {}, woken {})", self.name, lock.name(), woken);
        }
    }
}

impl core::fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
