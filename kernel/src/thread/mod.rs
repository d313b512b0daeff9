//! Thread abstraction.
//!
//! The synchronization layer needs exactly three things from the thread
//! subsystem: an identity for the running thread ([`Current::get_tid`]), a way
//! to suspend it until somebody else resumes it ([`Current::park_with`] and
//! [`ParkHandle`]), and a way to start new threads ([`ThreadBuilder`]).
//!
//! Threads run on the host's native threads. Parking is built on the native
//! park/unpark pair, which already guarantees that an unpark issued before the
//! target actually suspends is not lost. On top of that every thread carries a
//! notification flag, so a spurious return from the native park is filtered
//! out and a parked thread only ever resumes through its [`ParkHandle`].
//!
//! Threads started with [`ThreadBuilder`] are recorded in a global table so
//! their state can be inspected with [`get_state_by_tid`] until they are
//! joined. Such a thread ends with exit code 0 when its function returns,
//! with the code passed to [`Current::exit`], or with -1 when it panics. Any other host thread is adopted lazily the first time it touches
//! this module, and gets a tid the same way.

use crate::KernelError;
use abyss::{interrupt::InterruptState, spinlock::SpinLock};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU64, Ordering},
    },
};

static TID: AtomicU64 = AtomicU64::new(1);
static THREADS: SpinLock<BTreeMap<u64, Arc<Thread>>> = SpinLock::new(BTreeMap::new());

std::thread_local! {
    static CURRENT: RefCell<Option<Arc<Thread>>> = const { RefCell::new(None) };
    static ON_BOOT: Cell<bool> = const { Cell::new(false) };
}

/// Possible states of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ThreadState {
    /// Thread is ready to run but has not been scheduled yet.
    Runnable,
    /// Thread is running.
    Running,
    /// Thread is parked.
    Parked,
    /// Thread has exited.
    Exited,
}

/// A thread of execution.
pub struct Thread {
    /// Thread id.
    pub tid: u64,
    /// Thread name.
    pub name: String,
    state: AtomicU8,
    notified: AtomicBool,
    exit_code: AtomicI32,
    native: OnceLock<std::thread::Thread>,
}

impl Thread {
    fn new(name: String) -> Self {
        Self {
            tid: TID.fetch_add(1, Ordering::SeqCst),
            name,
            state: AtomicU8::new(ThreadState::Runnable.into()),
            notified: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
            native: OnceLock::new(),
        }
    }

    /// Reads the state of this thread.
    pub fn state(&self) -> ThreadState {
        let raw = self.state.load(Ordering::SeqCst);
        ThreadState::try_from(raw).unwrap_or_else(|_| panic!("Corrupted thread state {raw:#x}"))
    }

    fn set_state(&self, state: ThreadState) {
        self.state.store(state.into(), Ordering::SeqCst);
    }

    /// Binds this record to the native thread that executes it and makes it
    /// the current thread there.
    fn attach(self: &Arc<Self>) {
        let _ = self.native.set(std::thread::current());
        self.set_state(ThreadState::Running);
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));
    }
}

/// Returns the record of the running thread, adopting the native thread on
/// first use.
fn current_thread() -> Arc<Thread> {
    if let Some(th) = CURRENT.with(|current| current.borrow().clone()) {
        return th;
    }
    let native = std::thread::current();
    let th = Arc::new(Thread::new(native.name().unwrap_or("<unnamed>").to_owned()));
    th.attach();
    th
}

/// Run a function `f` with current thread as an argument.
#[inline]
pub fn with_current<R>(f: impl FnOnce(&Thread) -> R) -> R {
    f(&current_thread())
}

/// Looks up the state of the thread `tid`.
///
/// # Errors
/// [`KernelError::NoSuchEntry`] if `tid` was not started by [`ThreadBuilder`]
/// or has already been joined.
pub fn get_state_by_tid(tid: u64) -> Result<ThreadState, KernelError> {
    let threads = THREADS.lock();
    let state = threads.get(&tid).map(|th| th.state());
    threads.unlock();
    state.ok_or(KernelError::NoSuchEntry)
}

/// Runs `f` on the boot context.
///
/// Early in boot no thread is scheduled yet and thread identity is
/// unavailable: [`Current::try_get_tid`] returns `None` while `f` runs.
pub fn run_on_boot_context<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);
    impl Drop for Restore {
        fn drop(&mut self) {
            ON_BOOT.with(|boot| boot.set(self.0));
        }
    }

    let _restore = Restore(ON_BOOT.with(|boot| boot.replace(true)));
    f()
}

/// A handle that represent the parked thread.
pub struct ParkHandle {
    th: Arc<Thread>,
}

impl ParkHandle {
    /// The id of the parked thread.
    pub fn tid(&self) -> u64 {
        self.th.tid
    }

    /// Consume the handle and unpark the underlying thread.
    pub fn unpark(self) {
        self.th.set_state(ThreadState::Runnable);
        self.th.notified.store(true, Ordering::Release);
        if let Some(native) = self.th.native.get() {
            native.unpark();
        }
    }
}

impl core::fmt::Debug for ParkHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParkHandle")
            .field("tid", &self.th.tid)
            .field("name", &self.th.name)
            .finish()
    }
}

/// The opaque structure indicating the running thread on the current cpu.
pub struct Current {
    _p: (),
}

impl Current {
    /// Run a function `f` with [`ParkHandle`] for current thread, and then park
    /// the current thread.
    ///
    /// `f` runs while the thread is already marked parked. It must publish
    /// the handle somewhere a waker can find it and release every spinlock it
    /// holds. If the handle is unparked before this thread actually suspends,
    /// `park_with` returns right away.
    ///
    /// # Panics
    /// If the thread still holds a spinlock once `f` returns.
    pub fn park_with(f: impl FnOnce(ParkHandle)) {
        let th = current_thread();
        th.notified.store(false, Ordering::SeqCst);
        th.set_state(ThreadState::Parked);
        f(ParkHandle { th: th.clone() });
        assert!(
            InterruptState::current() == InterruptState::On,
            "Try to park a thread while holding a lock."
        );
        while !th.notified.swap(false, Ordering::Acquire) {
            std::thread::park();
        }
        th.set_state(ThreadState::Running);
    }

    /// Exit the current thread with `exit_code`.
    ///
    /// Only threads started by [`ThreadBuilder`] can exit; their
    /// [`JoinHandle::join`] returns `exit_code`. Called elsewhere, the exit
    /// unwinds the host thread like a panic would.
    ///
    /// # Panics
    /// If the thread still holds a spinlock.
    pub fn exit(exit_code: i32) -> ! {
        assert!(
            InterruptState::current() == InterruptState::On,
            "Try to exit a thread while holding a lock."
        );
        std::panic::resume_unwind(Box::new(ExitCode(exit_code)))
    }

    /// Get the current thread's id.
    ///
    /// # Panics
    /// On the boot context, where no thread identity exists.
    pub fn get_tid() -> u64 {
        Self::try_get_tid().unwrap_or_else(|| panic!("No thread identity on the boot context."))
    }

    /// Get the current thread's id, or `None` on the boot context.
    pub fn try_get_tid() -> Option<u64> {
        if ON_BOOT.with(Cell::get) {
            None
        } else {
            Some(with_current(|th| th.tid))
        }
    }
}

/// Unwinding payload of [`Current::exit`].
struct ExitCode(i32);

/// A handle to join a spawned thread.
pub struct JoinHandle {
    /// Thread id of the thread.
    pub tid: u64,
    inner: std::thread::JoinHandle<()>,
    th: Arc<Thread>,
}

impl JoinHandle {
    /// Wait until the thread exits and return its exit code.
    ///
    /// The code is 0 if the thread function returned, the argument of
    /// [`Current::exit`] if the thread exited, and -1 if it panicked.
    pub fn join(self) -> i32 {
        let Self { tid, inner, th } = self;
        let finished = inner.join().is_ok();
        let mut threads = THREADS.lock();
        threads.remove(&tid);
        threads.unlock();
        if finished {
            th.exit_code.load(Ordering::SeqCst)
        } else {
            -1
        }
    }
}

/// A struct to build a new thread.
pub struct ThreadBuilder {
    th: Thread,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new<I>(name: I) -> Self
    where
        String: From<I>,
    {
        Self {
            th: Thread::new(String::from(name)),
        }
    }

    /// Spawn the thread.
    ///
    /// # Panics
    /// If the host refuses to create another thread.
    pub fn spawn<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> JoinHandle {
        let th = Arc::new(self.th);
        let tid = th.tid;
        let mut threads = THREADS.lock();
        threads.insert(tid, th.clone());
        threads.unlock();

        let record = th.clone();
        let inner = std::thread::Builder::new()
            .name(th.name.clone())
            .spawn(move || {
                record.attach();
                let exit_code = match std::panic::catch_unwind(AssertUnwindSafe(thread_fn)) {
                    Ok(()) => 0,
                    Err(payload) => payload.downcast::<ExitCode>().map_or(-1, |code| code.0),
                };
                record.exit_code.store(exit_code, Ordering::SeqCst);
                record.set_state(ThreadState::Exited);
            })
            .unwrap_or_else(|e| panic!("Failed to spawn thread `{}`: {e}", th.name));

        JoinHandle { tid, inner, th }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn tids_are_unique() {
        let mine = Current::get_tid();
        assert_eq!(mine, Current::get_tid());
        let handles = (0..4)
            .map(|_| ThreadBuilder::new("tid").spawn(|| {}))
            .collect::<Vec<_>>();
        let mut tids = handles.iter().map(|h| h.tid).collect::<Vec<_>>();
        tids.push(mine);
        tids.sort();
        tids.dedup();
        assert_eq!(tids.len(), 5);
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
    }

    #[test]
    fn spawned_thread_sees_its_tid() {
        let seen = Arc::new(AtomicU64::new(0));
        let handle = {
            let seen = seen.clone();
            ThreadBuilder::new("whoami").spawn(move || {
                seen.store(Current::get_tid(), Ordering::SeqCst);
            })
        };
        let tid = handle.tid;
        assert_eq!(handle.join(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), tid);
        assert_eq!(get_state_by_tid(tid), Err(KernelError::NoSuchEntry));
    }

    #[test]
    fn boot_context_has_no_identity() {
        assert!(Current::try_get_tid().is_some());
        run_on_boot_context(|| {
            assert_eq!(Current::try_get_tid(), None);
        });
        assert!(Current::try_get_tid().is_some());
    }

    #[test]
    fn unpark_before_suspend_is_not_lost() {
        Current::park_with(|handle| handle.unpark());
    }

    #[test]
    fn park_and_unpark() {
        let slot = Arc::new(SpinLock::new(None::<ParkHandle>));
        let woken = Arc::new(AtomicUsize::new(0));
        let sleeper = {
            let (slot, woken) = (slot.clone(), woken.clone());
            ThreadBuilder::new("sleeper").spawn(move || {
                Current::park_with(|handle| {
                    let mut slot_guard = slot.lock();
                    *slot_guard = Some(handle);
                    slot_guard.unlock();
                });
                woken.fetch_add(1, Ordering::SeqCst);
            })
        };

        let handle = loop {
            let mut guard = slot.lock();
            let handle = guard.take();
            guard.unlock();
            if let Some(handle) = handle {
                break handle;
            }
            std::thread::yield_now();
        };
        assert_eq!(handle.tid(), sleeper.tid);
        assert_eq!(get_state_by_tid(sleeper.tid), Ok(ThreadState::Parked));
        assert_eq!(woken.load(Ordering::SeqCst), 0);
        handle.unpark();
        assert_eq!(sleeper.join(), 0);
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exit_codes() {
        let exits = ThreadBuilder::new("exits").spawn(|| {
            Current::exit(3);
        });
        let panics = ThreadBuilder::new("panics").spawn(|| panic!("thread body failed"));
        let returns = ThreadBuilder::new("returns").spawn(|| {});

        for handle in [&exits, &panics, &returns] {
            while get_state_by_tid(handle.tid) != Ok(ThreadState::Exited) {
                std::thread::yield_now();
            }
        }
        assert_eq!(exits.join(), 3);
        assert_eq!(panics.join(), -1);
        assert_eq!(returns.join(), 0);
    }

    #[test]
    fn exit_while_holding_spinlock() {
        let handle = ThreadBuilder::new("exits locked").spawn(|| {
            let lock = SpinLock::new(());
            let _guard = lock.lock();
            Current::exit(5);
        });
        assert_eq!(handle.join(), -1);
    }

    #[test]
    #[should_panic(expected = "Try to park a thread while holding a lock.")]
    fn park_while_holding_spinlock() {
        let lock = SpinLock::new(());
        let guard = lock.lock();
        Current::park_with(|handle| handle.unpark());
        guard.unlock();
    }
}
