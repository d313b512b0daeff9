//! # Lock.
//!
//! A [`Lock`] is a sleeping mutual exclusion lock. At most one thread holds
//! it at a time; the others sleep on its wait-channel until it is released.
//! Unlike a [`SpinLock`], the lock remembers *who* holds it, which makes
//! [`Lock::do_i_hold`] possible and lets a [`ConditionVariable`] check that
//! its caller really owns the lock it passes in.
//!
//! The lock does not carry the data it protects. Callers pair it with the
//! state they guard, usually a [`SpinLock`] that is only ever touched while
//! the lock is held, and must call [`Lock::release`] on every path out of the
//! critical section.
//!
//! Releasing a lock the caller does not hold leaves the lock untouched and
//! logs a warning. Acquiring a lock the caller already holds is a
//! programming error: this lock is not recursive.
//!
//! ```
//! use synch::sync::Lock;
//!
//! let lock = Lock::new("example").unwrap();
//! lock.acquire();
//! assert!(lock.do_i_hold());
//! lock.release();
//! assert!(!lock.do_i_hold());
//! ```
//!
//! [`SpinLock`]: super::SpinLock
//! [`ConditionVariable`]: super::ConditionVariable

use crate::{
    KernelError,
    config::{TraceFlags, traced},
    debug,
    thread::Current,
    util::kstrdup,
    warning,
    wchan::WaitChannel,
};
use abyss::{
    interrupt::InterruptState,
    spinlock::{SpinLock, WouldBlock},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Free,
    /// `holder` is `None` when the lock was taken on the boot context.
    Held { holder: Option<u64> },
}

/// A sleeping mutual exclusion lock.
pub struct Lock {
    name: String,
    wchan: WaitChannel,
    state: SpinLock<LockState>,
}

impl Lock {
    /// Creates a free lock called `name`.
    ///
    /// # Errors
    /// [`KernelError::NoMemory`] if the lock can not be allocated.
    pub fn new(name: &str) -> Result<Self, KernelError> {
        Ok(Self {
            name: kstrdup(name)?,
            wchan: WaitChannel::new(name)?,
            state: SpinLock::new(LockState::Free),
        })
    }

    /// The diagnostic name of this lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the lock, sleeping until it is free.
    ///
    /// # Panics
    /// If the caller already holds the lock, or holds a spinlock.
    #[track_caller]
    pub fn acquire(&self) {
        assert!(
            InterruptState::current() == InterruptState::On,
            "Lock `{}`: acquire while holding a spinlock.",
            self.name
        );
        let me = Current::try_get_tid();

        let mut state = self.state.lock();
        loop {
            match *state {
                LockState::Free => break,
                LockState::Held { holder } if me.is_some() && holder == me => {
                    state.unlock();
                    panic!("Lock `{}`: recursive acquire by {:?}.", self.name, me);
                }
                LockState::Held { .. } => {
                    let pin = self.wchan.lock();
                    state.unlock();
                    pin.sleep();
                    state = self.state.lock();
                }
            }
        }
        *state = LockState::Held { holder: me };
        state.unlock();

        if traced(TraceFlags::LOCK) {
            debug!("lock {}: acquired by {:?}", self.name, me);
        }
    }

    /// Acquires the lock if it is free, without sleeping.
    ///
    /// # Errors
    /// [`WouldBlock`] if anybody, the caller included, holds the lock.
    pub fn try_acquire(&self) -> Result<(), WouldBlock> {
        let me = Current::try_get_tid();
        let mut state = self.state.lock();
        let result = match *state {
            LockState::Free => {
                *state = LockState::Held { holder: me };
                Ok(())
            }
            LockState::Held { .. } => Err(WouldBlock),
        };
        state.unlock();
        result
    }

    /// Releases the lock and wakes one sleeper.
    ///
    /// A release by a thread that does not hold the lock is ignored.
    pub fn release(&self) {
        let me = Current::try_get_tid();
        let mut state = self.state.lock();
        match *state {
            LockState::Held { holder } if me.is_none() || holder == me => {
                *state = LockState::Free;
                self.wchan.wake_one();
                state.unlock();
                if traced(TraceFlags::LOCK) {
                    debug!("lock {}: released by {:?}", self.name, me);
                }
            }
            now => {
                state.unlock();
                warning!(
                    "lock {}: release by non-holder {:?} ignored ({:?})",
                    self.name,
                    me,
                    now
                );
            }
        }
    }

    /// Reports whether the calling thread holds the lock.
    ///
    /// Always true on the boot context, where no thread identity exists.
    pub fn do_i_hold(&self) -> bool {
        let Some(me) = Current::try_get_tid() else {
            return true;
        };
        let state = self.state.lock();
        let held = *state == LockState::Held { holder: Some(me) };
        state.unlock();
        held
    }

    /// Reports whether anybody holds the lock.
    pub fn is_held(&self) -> bool {
        let state = self.state.lock();
        let held = *state != LockState::Free;
        state.unlock();
        held
    }

    /// The thread that holds the lock, if it is held by a thread.
    pub fn holder(&self) -> Option<u64> {
        let state = self.state.lock();
        let holder = match *state {
            LockState::Held { holder } => holder,
            LockState::Free => None,
        };
        state.unlock();
        holder
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let state = *self.state.get_mut();
        assert!(
            state == LockState::Free,
            "Lock `{}` destroyed while held ({:?}).",
            self.name,
            state
        );
    }
}

impl core::fmt::Debug for Lock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lock")
            .field("name", &self.name)
            .field("holder", &self.holder())
            .finish()
    }
}
