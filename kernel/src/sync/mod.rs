//! # Synchronization Primitives.
//!
//! The only primitive the lowest layer offers is the [`SpinLock`]. It provides
//! correct mutual exclusion by repeatedly checking for lock availability, but
//! it wastes CPU cycles under contention and must never be held across a
//! sleep. The primitives of this module put a waiting thread to sleep on a
//! [`WaitChannel`] instead:
//!
//! - [`Semaphore`]: a counting gate over a number of resource units.
//! - [`Lock`]: a binary mutual exclusion lock that knows its holder.
//! - [`ConditionVariable`]: lets a thread holding a [`Lock`] sleep until
//!   another thread announces that a predicate may have changed.
//! - [`RwLock`]: admits either a bounded number of readers or a single
//!   writer, with an explicit fairness policy between the two populations.
//!
//! | Primitive             | Blocks Thread? | Fair?                  | Typical Use Case                             |
//! |-----------------------|----------------|------------------------|----------------------------------------------|
//! | [`SpinLock`]          | No (busy wait) | No                     | Protecting a primitive's own few words       |
//! | [`Semaphore`]         | Yes            | No                     | Limiting access to a bounded resource        |
//! | [`Lock`]              | Yes            | No                     | Exclusive access to shared data              |
//! | [`ConditionVariable`] | Yes            | No                     | Waiting for a condition to become true       |
//! | [`RwLock`]            | Yes            | Between readers/writers | Read-mostly data with occasional updates    |
//!
//! Every primitive protects its internal state with its own [`SpinLock`] and
//! never takes another primitive's spinlock while holding its own. Blocking
//! always follows the same three steps: pin the wait-channel, drop the
//! spinlock, sleep. After waking, the condition is re-checked in a loop.
//!
//! Destroying (dropping) a primitive that is still held, or that still has
//! sleepers, is a programming error and panics.
//!
//! [`WaitChannel`]: crate::wchan::WaitChannel

pub mod condition_variable;
pub mod holder_list;
pub mod lock;
pub mod rwlock;
pub mod semaphore;

pub use abyss::spinlock::{SpinLock, SpinLockGuard, WouldBlock};
pub use condition_variable::*;
pub use holder_list::*;
pub use lock::*;
pub use rwlock::*;
pub use semaphore::*;
