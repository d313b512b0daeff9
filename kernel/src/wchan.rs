//! Wait channels.
//!
//! A wait channel is a named queue of sleeping threads. It is the only place
//! where a thread of this layer goes to sleep, and it offers the one operation
//! every sleeping primitive is built around: *pin the queue, then atomically
//! go to sleep*.
//!
//! ```text
//! let pin = wchan.lock();   // 1. pin the queue against concurrent wakeups
//! state.unlock();           // 2. drop the primitive's own spinlock
//! pin.sleep();              // 3. enqueue self, unpin, and suspend
//! ```
//!
//! A releaser must pin the queue to wake anyone, so it can not run between
//! steps 1 and 3: either it ran before step 1 (and the sleeper saw the
//! released state under the primitive's spinlock), or it runs after step 3
//! (and finds the sleeper in the queue). There is no window in which the
//! wakeup can be lost.
//!
//! Wakeups are not FIFO-guaranteed to win the resource; woken threads must
//! re-check their condition.

use crate::{
    KernelError,
    thread::{Current, ParkHandle},
    util::kstrdup,
};
use abyss::spinlock::{SpinLock, SpinLockGuard};
use std::collections::VecDeque;

/// A named, lockable sleep queue.
pub struct WaitChannel {
    name: String,
    waiters: SpinLock<VecDeque<ParkHandle>>,
}

impl WaitChannel {
    /// Creates an empty wait channel called `name`.
    ///
    /// # Errors
    /// [`KernelError::NoMemory`] if the name can not be allocated.
    pub fn new(name: &str) -> Result<Self, KernelError> {
        Ok(Self {
            name: kstrdup(name)?,
            waiters: SpinLock::new(VecDeque::new()),
        })
    }

    /// The diagnostic name of this channel.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pins the channel: no thread can be woken from it until the returned
    /// guard is consumed by [`WaitChannelGuard::sleep`] or
    /// [`WaitChannelGuard::unlock`].
    #[track_caller]
    pub fn lock(&self) -> WaitChannelGuard<'_> {
        WaitChannelGuard {
            waiters: self.waiters.lock(),
        }
    }

    /// Wakes one sleeping thread, if there is any.
    ///
    /// Returns whether a thread was woken.
    pub fn wake_one(&self) -> bool {
        let mut waiters = self.waiters.lock();
        let waiter = waiters.pop_front();
        waiters.unlock();
        match waiter {
            Some(waiter) => {
                waiter.unpark();
                true
            }
            None => false,
        }
    }

    /// Wakes every sleeping thread.
    ///
    /// Returns the number of threads woken.
    pub fn wake_all(&self) -> usize {
        let mut waiters = self.waiters.lock();
        let woken = core::mem::take(&mut *waiters);
        waiters.unlock();
        let count = woken.len();
        woken.into_iter().for_each(ParkHandle::unpark);
        count
    }

    /// Reports whether nobody sleeps on this channel.
    ///
    /// The answer is only a snapshot; callers that act on it must re-validate
    /// under their own lock.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of threads sleeping on this channel.
    pub fn len(&self) -> usize {
        let waiters = self.waiters.lock();
        let len = waiters.len();
        waiters.unlock();
        len
    }
}

impl Drop for WaitChannel {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let sleepers = self.waiters.get_mut().len();
        assert!(
            sleepers == 0,
            "Wait channel `{}` destroyed with {} sleeping thread(s).",
            self.name,
            sleepers
        );
    }
}

impl core::fmt::Debug for WaitChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitChannel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A pinned [`WaitChannel`].
///
/// Like a [`SpinLockGuard`], the pin must be consumed explicitly, either by
/// going to sleep or by [`unlock`]ing it.
///
/// [`unlock`]: WaitChannelGuard::unlock
pub struct WaitChannelGuard<'a> {
    waiters: SpinLockGuard<'a, VecDeque<ParkHandle>>,
}

impl WaitChannelGuard<'_> {
    /// Enqueues the current thread, unpins the channel, and sleeps until
    /// woken by [`WaitChannel::wake_one`] or [`WaitChannel::wake_all`].
    ///
    /// # Panics
    /// If the caller still holds any other spinlock.
    pub fn sleep(self) {
        let Self { mut waiters } = self;
        Current::park_with(move |handle| {
            waiters.push_back(handle);
            waiters.unlock();
        });
    }

    /// Unpins the channel without sleeping.
    pub fn unlock(self) {
        self.waiters.unlock();
    }
}
