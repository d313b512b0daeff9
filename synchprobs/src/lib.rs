//! # Synchronization problems.
//!
//! Two classic puzzles solved with the primitives of [`synch::sync`]. Neither
//! adds a synchronization mechanism of its own; they show how a [`Lock`] and a
//! [`ConditionVariable`] compose into a solution, and they double as stress
//! tests of those primitives.
//!
//! - [`whalemating`]: a male, a female, and a matchmaker must all be present
//!   before a mating can happen.
//! - [`stoplight`]: cars cross a four-way intersection without ever sharing a
//!   quadrant, and without deadlocking.
//!
//! Each puzzle is a context object that owns its lock and condition variable.
//! A `run_*` driver creates the context, spawns one thread per participant,
//! and waits for all of them on a [`Semaphore`] that every participant
//! signals once it is done.
//!
//! [`Lock`]: synch::sync::Lock
//! [`ConditionVariable`]: synch::sync::ConditionVariable
//! [`Semaphore`]: synch::sync::Semaphore

pub mod stoplight;
pub mod whalemating;

pub use stoplight::run_stoplight;
pub use whalemating::run_whalemating;
