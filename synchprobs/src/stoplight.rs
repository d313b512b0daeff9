//! # Stoplight.
//!
//! A four-way intersection is split into four quadrants. Directions and
//! quadrants share their numbering:
//!
//! ```text
//!   | 0 |
//! --     --
//!    0 1
//! 3       1
//!    3 2
//! --     --
//!   | 2 |
//! ```
//!
//! A car approaching from direction `d` enters quadrant `d` first. Going
//! straight it then crosses `(d + 3) % 4`; turning left it crosses
//! `(d + 3) % 4` and `(d + 2) % 4`; turning right it only uses `d`.
//!
//! No two cars may be in the same quadrant at once. A car reserves its whole
//! route before it enters, under the intersection's [`Lock`], and waits on
//! the [`ConditionVariable`] until every quadrant of the route is free. As no
//! car ever holds part of a route while waiting for the rest, cars can not
//! deadlock one another. Each quadrant is released as soon as the car moves
//! on, and every release is broadcast.

use std::sync::Arc;
use synch::{
    KernelError, info,
    sync::{ConditionVariable, Lock, Semaphore, SpinLock},
    thread::{Current, ThreadBuilder},
};

/// The number of quadrants, and of directions.
pub const QUADRANTS: usize = 4;

/// Which way a car leaves the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Leave opposite the entry.
    Straight,
    /// Leave to the left of the entry.
    Left,
    /// Leave to the right of the entry.
    Right,
}

impl Route {
    /// The quadrants a car entering from `direction` passes, in order.
    pub fn quadrants(self, direction: usize) -> Vec<usize> {
        let steps = match self {
            Route::Right => 1,
            Route::Straight => 2,
            Route::Left => 3,
        };
        (0..steps)
            .map(|step| (direction + QUADRANTS - step) % QUADRANTS)
            .collect()
    }
}

/// Something that happened in the intersection, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `car` moved into `quadrant`, leaving the one it was in, if any.
    Enter {
        /// Thread id of the car.
        car: u64,
        /// The quadrant entered.
        quadrant: usize,
    },
    /// `car` left the intersection.
    Leave {
        /// Thread id of the car.
        car: u64,
    },
}

struct Quadrants {
    occupied: [bool; QUADRANTS],
    events: Vec<Event>,
}

/// The shared state of one intersection.
pub struct Intersection {
    quad_lock: Lock,
    quad_cv: ConditionVariable,
    quadrants: SpinLock<Quadrants>,
}

impl Intersection {
    /// Opens an empty intersection.
    ///
    /// # Errors
    /// [`KernelError::NoMemory`] if the primitives can not be allocated.
    pub fn new() -> Result<Self, KernelError> {
        Ok(Self {
            quad_lock: Lock::new("quadrant lock")?,
            quad_cv: ConditionVariable::new("quadrant cv")?,
            quadrants: SpinLock::new(Quadrants {
                occupied: [false; QUADRANTS],
                events: Vec::new(),
            }),
        })
    }

    /// Runs `f` on the quadrants. The caller holds `quad_lock`.
    fn with_quadrants<R>(&self, f: impl FnOnce(&mut Quadrants) -> R) -> R {
        let mut quadrants = self.quadrants.lock();
        let r = f(&mut quadrants);
        quadrants.unlock();
        r
    }

    /// Drives the calling thread's car through the intersection.
    fn cross(&self, direction: usize, route: Route) {
        assert!(direction < QUADRANTS, "No such direction: {direction}");
        let car = Current::get_tid();
        let path = route.quadrants(direction);

        self.quad_lock.acquire();
        self.quad_cv.wait_while(&self.quad_lock, || {
            self.with_quadrants(|q| path.iter().any(|&quadrant| q.occupied[quadrant]))
        });
        self.with_quadrants(|q| path.iter().for_each(|&quadrant| q.occupied[quadrant] = true));
        self.quad_lock.release();

        let mut previous = None;
        for &quadrant in path.iter() {
            self.quad_lock.acquire();
            self.with_quadrants(|q| {
                if let Some(previous) = previous {
                    q.occupied[previous] = false;
                }
                q.events.push(Event::Enter { car, quadrant });
            });
            if previous.is_some() {
                self.quad_cv.broadcast(&self.quad_lock);
            }
            self.quad_lock.release();
            info!("car {car} ({route:?} from {direction}) in quadrant {quadrant}");
            previous = Some(quadrant);
        }

        self.quad_lock.acquire();
        self.with_quadrants(|q| {
            if let Some(previous) = previous {
                q.occupied[previous] = false;
            }
            q.events.push(Event::Leave { car });
        });
        self.quad_cv.broadcast(&self.quad_lock);
        self.quad_lock.release();
        info!("car {car} left the intersection");
    }

    /// Crosses straight from `direction`.
    ///
    /// # Panics
    /// If `direction` is not below [`QUADRANTS`].
    pub fn go_straight(&self, direction: usize) {
        self.cross(direction, Route::Straight)
    }

    /// Turns left from `direction`.
    ///
    /// # Panics
    /// If `direction` is not below [`QUADRANTS`].
    pub fn turn_left(&self, direction: usize) {
        self.cross(direction, Route::Left)
    }

    /// Turns right from `direction`.
    ///
    /// # Panics
    /// If `direction` is not below [`QUADRANTS`].
    pub fn turn_right(&self, direction: usize) {
        self.cross(direction, Route::Right)
    }

    /// Takes the events recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.quad_lock.acquire();
        let events = self.with_quadrants(|q| core::mem::take(&mut q.events));
        self.quad_lock.release();
        events
    }
}

/// Sends one car per `(route, direction)` through a fresh intersection, each
/// on its own thread, and returns the recorded events once all have left.
///
/// # Errors
/// [`KernelError::NoMemory`] if the primitives can not be allocated.
pub fn run_stoplight(cars: &[(Route, usize)]) -> Result<Vec<Event>, KernelError> {
    let intersection = Arc::new(Intersection::new()?);
    let menu = Arc::new(Semaphore::new("stoplight driver", 0)?);

    let handles = cars
        .iter()
        .enumerate()
        .map(|(i, &(route, direction))| {
            let (intersection, menu) = (intersection.clone(), menu.clone());
            ThreadBuilder::new(format!("car {i}")).spawn(move || {
                match route {
                    Route::Straight => intersection.go_straight(direction),
                    Route::Left => intersection.turn_left(direction),
                    Route::Right => intersection.turn_right(direction),
                }
                menu.signal();
            })
        })
        .collect::<Vec<_>>();

    for _ in 0..handles.len() {
        menu.wait();
    }
    for handle in handles {
        assert_eq!(handle.join(), 0, "A car crashed in the intersection.");
    }
    Ok(intersection.events())
}
