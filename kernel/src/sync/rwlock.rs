//! # Reader-writer lock.
//!
//! An [`RwLock`] admits either a group of readers or a single writer. Readers
//! share the lock with each other up to an *admission cap*; once that many
//! readers are active, further readers sleep until one of them leaves.
//!
//! ## States
//!
//! ```text
//!   Reading <----- acquire_read ----- Free ----- acquire_write -----> Writing
//!      |                               ^ ^                               |
//!      +----- last reader leaves ------+ +------ last writer leaves -----+
//! ```
//!
//! A drained lock may also go straight from one mode to the other when the
//! opposite population is waiting; see *Fairness* below.
//!
//! - `Free`: nobody holds the lock.
//! - `Reading`: up to `cap` readers hold the lock.
//! - `Writing`: one writer holds the lock, or the lock has been handed to a
//!   writer that was woken but has not run yet (active count zero).
//!
//! ## Fairness
//!
//! Who goes next is decided when the holder list drains, and the rule is
//! deliberately asymmetric:
//!
//! - When the last **reader** leaves, a waiting **writer** goes first. A
//!   steady stream of readers therefore can not starve a writer forever: the
//!   writer gets the lock as soon as the current batch of readers drains.
//! - When a **writer** leaves, **all** waiting readers go first, and only
//!   then the next writer. A burst of readers clears quickly once a write is
//!   done.
//!
//! If nobody waits, the lock becomes `Free`.
//!
//! Handing the lock to a population only wakes it; every woken thread still
//! re-validates the state under the spinlock and goes back to sleep if it
//! lost the race.
//!
//! ```
//! use synch::sync::{RwLock, RwMode};
//!
//! let rwlock = RwLock::new("table").unwrap();
//! rwlock.acquire_read();
//! assert_eq!(rwlock.mode(), RwMode::Reading);
//! assert_eq!(rwlock.active_count(), 1);
//! rwlock.release_read();
//!
//! rwlock.acquire_write();
//! assert_eq!(rwlock.mode(), RwMode::Writing);
//! rwlock.release_write();
//! assert_eq!(rwlock.mode(), RwMode::Free);
//! ```

use super::HolderList;
use crate::{
    KernelError,
    config::{self, TraceFlags, traced},
    debug,
    thread::Current,
    util::{kstrcat, kstrdup},
    wchan::WaitChannel,
};
use abyss::{
    interrupt::InterruptState,
    spinlock::{SpinLock, SpinLockGuard},
};

/// Who may currently hold an [`RwLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    /// Nobody holds the lock.
    Free,
    /// Readers hold the lock.
    Reading,
    /// A writer holds, or is about to hold, the lock.
    Writing,
}

#[derive(Debug)]
struct RwState {
    mode: RwMode,
    active: usize,
    holders: HolderList,
}

impl RwState {
    fn admit(&mut self, tid: u64) {
        self.holders.insert(tid);
        self.active += 1;
    }

    fn check(&self) {
        debug_assert_eq!(self.active, self.holders.len());
        debug_assert!(self.mode != RwMode::Writing || self.active <= 1);
        debug_assert!(self.mode != RwMode::Free || self.active == 0);
    }
}

/// A reader-writer lock with writer priority on read release and reader
/// priority on write release.
pub struct RwLock {
    name: String,
    state: SpinLock<RwState>,
    read_waitq: WaitChannel,
    write_waitq: WaitChannel,
    admission_cap: usize,
}

impl RwLock {
    /// Creates a free reader-writer lock called `name`, using the reader
    /// admission cap of the installed [configuration](crate::config).
    ///
    /// # Errors
    /// [`KernelError::NoMemory`] if the lock can not be allocated.
    pub fn new(name: &str) -> Result<Self, KernelError> {
        Self::with_admission_cap(name, config::current().reader_admission_cap)
    }

    /// Creates a free reader-writer lock that admits at most `cap` readers
    /// at once.
    ///
    /// # Errors
    /// [`KernelError::InvalidArgument`] if `cap` is zero, and
    /// [`KernelError::NoMemory`] if the lock can not be allocated.
    pub fn with_admission_cap(name: &str, cap: usize) -> Result<Self, KernelError> {
        if cap == 0 {
            return Err(KernelError::InvalidArgument);
        }
        Ok(Self {
            name: kstrdup(name)?,
            state: SpinLock::new(RwState {
                mode: RwMode::Free,
                active: 0,
                holders: HolderList::new(),
            }),
            read_waitq: WaitChannel::new(&kstrcat(name, ":read")?)?,
            write_waitq: WaitChannel::new(&kstrcat(name, ":write")?)?,
            admission_cap: cap,
        })
    }

    /// The diagnostic name of this lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of readers admitted concurrently.
    pub fn admission_cap(&self) -> usize {
        self.admission_cap
    }

    /// A snapshot of the current mode.
    pub fn mode(&self) -> RwMode {
        let state = self.state.lock();
        let mode = state.mode;
        state.unlock();
        mode
    }

    /// A snapshot of the number of current holders.
    pub fn active_count(&self) -> usize {
        let state = self.state.lock();
        let active = state.active;
        state.unlock();
        active
    }

    /// Locks the state, ready to admit the current thread.
    #[track_caller]
    fn lock_for(&self, tid: u64) -> SpinLockGuard<'_, RwState> {
        assert!(
            InterruptState::current() == InterruptState::On,
            "RwLock `{}`: acquire while holding a spinlock.",
            self.name
        );
        let state = self.state.lock();
        if state.holders.contains(tid) {
            state.unlock();
            panic!("RwLock `{}`: recursive acquire by {tid}.", self.name);
        }
        state
    }

    /// Acquires the lock for reading, sleeping while a writer holds it or
    /// the admission cap is reached.
    ///
    /// # Panics
    /// If the caller already holds the lock, or holds a spinlock.
    #[track_caller]
    pub fn acquire_read(&self) {
        let me = Current::get_tid();
        let mut state = self.lock_for(me);
        loop {
            match state.mode {
                RwMode::Free => {
                    state.mode = RwMode::Reading;
                    break;
                }
                RwMode::Reading if state.active < self.admission_cap => break,
                RwMode::Reading | RwMode::Writing => {
                    let pin = self.read_waitq.lock();
                    state.unlock();
                    pin.sleep();
                    state = self.state.lock();
                }
            }
        }
        state.admit(me);
        state.check();
        let active = state.active;
        state.unlock();

        if traced(TraceFlags::RWLOCK) {
            debug!("rwlock {}: reader {} in ({} active)", self.name, me, active);
        }
    }

    /// Acquires the lock for writing, sleeping while anybody else holds it.
    ///
    /// # Panics
    /// If the caller already holds the lock, or holds a spinlock.
    #[track_caller]
    pub fn acquire_write(&self) {
        let me = Current::get_tid();
        let mut state = self.lock_for(me);
        loop {
            match state.mode {
                RwMode::Free => {
                    state.mode = RwMode::Writing;
                    break;
                }
                // Handed over by the last holder; whichever writer gets here
                // first takes it.
                RwMode::Writing if state.active == 0 => break,
                RwMode::Reading | RwMode::Writing => {
                    let pin = self.write_waitq.lock();
                    state.unlock();
                    pin.sleep();
                    state = self.state.lock();
                }
            }
        }
        state.admit(me);
        state.check();
        state.unlock();

        if traced(TraceFlags::RWLOCK) {
            debug!("rwlock {}: writer {} in", self.name, me);
        }
    }

    /// Removes the caller from the holders.
    fn leave<'a>(
        &self,
        mut state: SpinLockGuard<'a, RwState>,
        me: u64,
        expected: RwMode,
    ) -> SpinLockGuard<'a, RwState> {
        if state.mode != expected || !state.holders.remove(me) {
            let mode = state.mode;
            state.unlock();
            panic!(
                "RwLock `{}`: thread {me} released {expected:?} access it does not hold ({mode:?}).",
                self.name
            );
        }
        state.active -= 1;
        state
    }

    /// Hands the lock to the next writer, or all waiting readers.
    fn hand_to_writer(&self, state: &mut RwState) -> &'static str {
        if !self.write_waitq.is_empty() {
            state.mode = RwMode::Writing;
            self.write_waitq.wake_one();
            "writer"
        } else if !self.read_waitq.is_empty() {
            state.mode = RwMode::Reading;
            self.read_waitq.wake_all();
            "readers"
        } else {
            state.mode = RwMode::Free;
            "nobody"
        }
    }

    /// Hands the lock to all waiting readers, or the next writer.
    fn hand_to_readers(&self, state: &mut RwState) -> &'static str {
        if !self.read_waitq.is_empty() {
            state.mode = RwMode::Reading;
            self.read_waitq.wake_all();
            "readers"
        } else if !self.write_waitq.is_empty() {
            state.mode = RwMode::Writing;
            self.write_waitq.wake_one();
            "writer"
        } else {
            state.mode = RwMode::Free;
            "nobody"
        }
    }

    /// Releases read access.
    ///
    /// When the last reader leaves, a waiting writer is preferred over
    /// waiting readers.
    ///
    /// # Panics
    /// If the caller does not hold the lock for reading.
    pub fn release_read(&self) {
        let me = Current::get_tid();
        let mut state = self.leave(self.state.lock(), me, RwMode::Reading);
        let next = if state.holders.is_empty() {
            self.hand_to_writer(&mut state)
        } else if state.active < self.admission_cap
            && self.write_waitq.is_empty()
            && self.read_waitq.wake_one()
        {
            // A reader held back by the cap fits in again.
            "reader"
        } else {
            "nobody"
        };
        state.check();
        state.unlock();

        if traced(TraceFlags::RWLOCK) {
            debug!("rwlock {}: reader {} out, next {}", self.name, me, next);
        }
    }

    /// Releases write access.
    ///
    /// Waiting readers are preferred over waiting writers.
    ///
    /// # Panics
    /// If the caller does not hold the lock for writing.
    pub fn release_write(&self) {
        let me = Current::get_tid();
        let mut state = self.leave(self.state.lock(), me, RwMode::Writing);
        let next = self.hand_to_readers(&mut state);
        state.check();
        state.unlock();

        if traced(TraceFlags::RWLOCK) {
            debug!("rwlock {}: writer {} out, next {}", self.name, me, next);
        }
    }
}

impl Drop for RwLock {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let state = self.state.get_mut();
        assert!(
            state.mode == RwMode::Free && state.holders.is_empty(),
            "RwLock `{}` destroyed while in use ({:?}, {} holders).",
            self.name,
            state.mode,
            state.holders.len()
        );
    }
}

impl core::fmt::Debug for RwLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        let (mode, active) = (state.mode, state.active);
        let holders = state.holders.iter().collect::<Vec<_>>();
        state.unlock();
        f.debug_struct("RwLock")
            .field("name", &self.name)
            .field("mode", &mode)
            .field("active", &active)
            .field("holders", &holders)
            .field("admission_cap", &self.admission_cap)
            .finish()
    }
}
