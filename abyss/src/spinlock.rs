//! SMP-supported spinlock.
//!
//! On a uniprocessor, a spinlock only has to keep the holder from being
//! preempted. With multiple processors that is not enough: threads on other
//! cores run concurrently, so a processor must 1) poll a variable that tells
//! whether the lock is taken, 2) set it when it takes the lock, and 3) clear
//! it on `unlock`. Steps 1 and 2 must happen ATOMICALLY, with a
//! read-modify-write instruction.
//!
//! A spinlock never sleeps. It is the building block that protects the small
//! state of every sleeping primitive in the kernel, and it must only be held
//! across short, non-blocking critical sections. While a guard is alive the
//! holder runs in an interrupts-off section (see [`InterruptGuard`]), which is
//! what makes "sleep while holding a spinlock" detectable.
//!
//! [`InterruptGuard`]: crate::interrupt::InterruptGuard

use crate::interrupt::InterruptGuard;
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};
use crossbeam_utils::{Backoff, CachePadded};

/// The lock could not be acquired at this time because the operation would
/// otherwise block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldBlock;

/// A mutual exclusion primitive useful for protecting shared data
///
/// This spinlock will busy-wait for the lock to become available. The spinlock
/// can be created via a [`new`] constructor. Each spinlock has a type parameter
/// which represents the data that it is protecting. The data can only be
/// accessed through the guards returned from [`lock`] and [`try_lock`], which
/// guarantees that the data is only ever accessed when the spinlock is locked.
///
/// [`new`]: Self::new
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
///
/// # Examples
///
/// ```
/// use abyss::spinlock::SpinLock;
/// use std::sync::Arc;
///
/// const N: usize = 10;
///
/// let data = Arc::new(SpinLock::new(0));
/// let handles = (0..N)
///     .map(|_| {
///         let data = Arc::clone(&data);
///         std::thread::spawn(move || {
///             let mut guard = data.lock();
///             *guard += 1;
///             // the lock must be "explicitly" unlocked before `guard` goes out of scope.
///             guard.unlock();
///         })
///     })
///     .collect::<Vec<_>>();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// let guard = data.lock();
/// assert_eq!(*guard, N);
/// guard.unlock();
/// ```
pub struct SpinLock<T: ?Sized> {
    locked: CachePadded<AtomicBool>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new spinlock in an unlocked state ready for use.
    ///
    /// # Examples
    ///
    /// ```
    /// use abyss::spinlock::SpinLock;
    ///
    /// let spinlock = SpinLock::new(0);
    /// ```
    #[inline]
    pub const fn new(t: T) -> SpinLock<T> {
        SpinLock {
            locked: CachePadded::new(AtomicBool::new(false)),
            data: UnsafeCell::new(t),
        }
    }

    /// Consumes this spinlock, returning the underlying data.
    ///
    /// # Examples
    ///
    /// ```
    /// use abyss::spinlock::SpinLock;
    ///
    /// let spinlock = SpinLock::new(0);
    /// assert_eq!(spinlock.into_inner(), 0);
    /// ```
    pub fn into_inner(self) -> T {
        let this = core::mem::ManuallyDrop::new(self);
        assert!(
            !this.locked.load(Ordering::SeqCst),
            "SpinLock consumed while it is held."
        );
        // SAFETY: `this` is never used again, and `ManuallyDrop` keeps the
        // destructor from touching `data` a second time.
        unsafe { core::ptr::read(&this.data) }.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquires a spinlock, busy-waiting until it is able to do so.
    ///
    /// Upon returning, the thread is the only thread with the lock held. A
    /// guard is returned to allow scoped access of the lock. When the guard
    /// goes out of scope without [`SpinLockGuard::unlock`], panic occurs.
    ///
    /// The exact behavior on locking a spinlock in the thread which already
    /// holds the lock is left unspecified. However, this function will not
    /// return on the second call.
    #[track_caller]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let backoff = Backoff::new();
        let guard = loop {
            let guard = InterruptGuard::new();
            if !self.locked.swap(true, Ordering::Acquire) {
                break guard;
            }
            drop(guard);

            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        };

        SpinLockGuard {
            caller: core::panic::Location::caller(),
            lock: self,
            guard: Some(guard),
            _not_send: PhantomData,
        }
    }

    /// Attempts to acquire this lock.
    ///
    /// If the lock could not be acquired at this time, then [`Err`] is
    /// returned. Otherwise, a guard is returned.
    ///
    /// This function does not block.
    ///
    /// # Errors
    ///
    /// If the spinlock could not be acquired because it is already locked, then
    /// this call will return the [`WouldBlock`] error.
    ///
    /// # Examples
    ///
    /// ```
    /// use abyss::spinlock::{SpinLock, WouldBlock};
    ///
    /// let spinlock = SpinLock::new(0);
    /// let guard = spinlock.lock();
    /// assert_eq!(spinlock.try_lock().err(), Some(WouldBlock));
    /// guard.unlock();
    /// spinlock.try_lock().unwrap().unlock();
    /// ```
    #[track_caller]
    pub fn try_lock(&self) -> Result<SpinLockGuard<'_, T>, WouldBlock> {
        let guard = InterruptGuard::new();
        if !self.locked.swap(true, Ordering::Acquire) {
            Ok(SpinLockGuard {
                caller: core::panic::Location::caller(),
                lock: self,
                guard: Some(guard),
                _not_send: PhantomData,
            })
        } else {
            Err(WouldBlock)
        }
    }

    /// Reports whether someone currently holds this lock.
    ///
    /// The answer may be stale by the time the caller looks at it. Only use it
    /// for diagnostics and assertions.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// The exclusive borrow statically guarantees no guard is alive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for SpinLock<T> {
    /// Creates a `SpinLock<T>`, with the `Default` value for T.
    fn default() -> SpinLock<T> {
        SpinLock::new(Default::default())
    }
}

impl<T: ?Sized> Drop for SpinLock<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(
                !*self.locked.get_mut(),
                "SpinLock destroyed while it is held."
            );
        }
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

/// An implementation of a "scoped lock" of a spinlock. When this structure
/// is dropped (falls out of scope) without unlock, panic occurs.
///
/// The lock must be explicitly unlocked by [`unlock`] method.
///
/// The data protected by the spinlock can be accessed through this guard.
///
/// This structure is created by the [`lock`] and [`try_lock`] methods on
/// [`SpinLock`].
///
/// [`lock`]: SpinLock::lock
/// [`try_lock`]: SpinLock::try_lock
/// [`unlock`]: Self::unlock
pub struct SpinLockGuard<'a, T: ?Sized + 'a> {
    caller: &'static core::panic::Location<'static>,
    lock: &'a SpinLock<T>,
    guard: Option<InterruptGuard>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for SpinLockGuard<'_, T> {}

impl<T: ?Sized> SpinLockGuard<'_, T> {
    /// Releases the underlying [`SpinLock`].
    ///
    /// As the guard does **not** automatically release the lock on drop,
    /// the caller must explicitly invoke [`unlock`] to mark the lock
    /// as available again.
    ///
    /// # Example
    /// ```
    /// use abyss::spinlock::SpinLock;
    ///
    /// let lock = SpinLock::new(123);
    /// let guard = lock.lock();
    ///
    /// // Work with the locked data...
    ///
    /// // Explicitly release the lock.
    /// guard.unlock();
    /// ```
    ///
    /// [`unlock`]: SpinLockGuard::unlock
    pub fn unlock(mut self) {
        self.lock.locked.store(false, Ordering::Release);
        self.guard.take();
        core::mem::forget(self);
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // A panic is already unwinding through the critical section; release
        // the lock so the panic is reported instead of turning into an abort.
        if std::thread::panicking() {
            self.lock.locked.store(false, Ordering::Release);
            self.guard.take();
            return;
        }
        panic!(
            "`.unlock()` must be explicitly called before dropping SpinLockGuard.
The lock is held at {:?}.",
            self.caller
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptState;
    use std::sync::Arc;

    #[test]
    fn guard_disables_interrupts() {
        let lock = SpinLock::new(());
        let guard = lock.lock();
        assert_eq!(InterruptState::current(), InterruptState::Off);
        assert!(lock.is_locked());
        guard.unlock();
        assert_eq!(InterruptState::current(), InterruptState::On);
        assert!(!lock.is_locked());
    }

    #[test]
    fn contended_increment() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 1000;

        let counter = Arc::new(SpinLock::new(0usize));
        let workers = (0..THREADS)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let mut guard = counter.lock();
                        *guard += 1;
                        guard.unlock();
                    }
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().unwrap();
        }
        let counter = Arc::into_inner(counter).unwrap();
        assert_eq!(counter.into_inner(), THREADS * ROUNDS);
    }

    #[test]
    #[should_panic(expected = "must be explicitly called")]
    fn implicit_drop_panics() {
        let lock = SpinLock::new(0);
        let _guard = lock.lock();
    }

    #[test]
    #[should_panic(expected = "destroyed while it is held")]
    fn destroy_while_held() {
        let lock = SpinLock::new(0);
        core::mem::forget(lock.lock());
        drop(lock);
    }
}
