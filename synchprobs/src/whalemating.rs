//! # Whale mating.
//!
//! A mating needs three whales: a male, a female, and a matchmaker. Males and
//! females announce themselves and leave; a matchmaker waits until at least
//! one male and one female are queued, pairs the oldest of each, and records
//! the [`Match`].
//!
//! The queues live under one [`Lock`]. Matchmakers sleep on one
//! [`ConditionVariable`], and a newcomer signals it whenever it completes a
//! pair.

use std::{collections::VecDeque, sync::Arc};
use synch::{
    KernelError,
    sync::{ConditionVariable, Lock, Semaphore, SpinLock},
    thread::ThreadBuilder,
};

/// One completed mating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Index of the male.
    pub male: usize,
    /// Index of the female.
    pub female: usize,
    /// Index of the matchmaker.
    pub maker: usize,
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Male,
    Female,
    Matchmaker,
}

#[derive(Default)]
struct Population {
    males: VecDeque<usize>,
    females: VecDeque<usize>,
    matches: Vec<Match>,
}

/// The shared state of one whale-mating round.
pub struct Whalemating {
    nmating: usize,
    pop_lock: Lock,
    maker_cv: ConditionVariable,
    population: SpinLock<Population>,
}

impl Whalemating {
    /// Sets up a round in which `nmating` whales of each kind take part.
    ///
    /// # Errors
    /// [`KernelError::NoMemory`] if the primitives can not be allocated.
    pub fn new(nmating: usize) -> Result<Self, KernelError> {
        Ok(Self {
            nmating,
            pop_lock: Lock::new("population")?,
            maker_cv: ConditionVariable::new("maker cv")?,
            population: SpinLock::new(Population::default()),
        })
    }

    /// The number of whales of each kind.
    pub fn nmating(&self) -> usize {
        self.nmating
    }

    fn check(&self, role: Role, which: usize) {
        assert!(
            which < self.nmating,
            "No such whale: {role:?} {which} of {}",
            self.nmating
        );
    }

    /// Runs `f` on the population. The caller holds `pop_lock`.
    fn with_population<R>(&self, f: impl FnOnce(&mut Population) -> R) -> R {
        let mut population = self.population.lock();
        let r = f(&mut population);
        population.unlock();
        r
    }

    /// Male `which` shows up.
    ///
    /// # Panics
    /// If `which` is not below [`Whalemating::nmating`].
    pub fn male(&self, which: usize) {
        self.check(Role::Male, which);
        self.pop_lock.acquire();
        let pair = self.with_population(|p| {
            p.males.push_back(which);
            !p.females.is_empty()
        });
        if pair {
            self.maker_cv.signal(&self.pop_lock);
        }
        self.pop_lock.release();
    }

    /// Female `which` shows up.
    ///
    /// # Panics
    /// If `which` is not below [`Whalemating::nmating`].
    pub fn female(&self, which: usize) {
        self.check(Role::Female, which);
        self.pop_lock.acquire();
        let pair = self.with_population(|p| {
            p.females.push_back(which);
            !p.males.is_empty()
        });
        if pair {
            self.maker_cv.signal(&self.pop_lock);
        }
        self.pop_lock.release();
    }

    /// Matchmaker `which` waits for a male and a female and pairs them.
    ///
    /// # Panics
    /// If `which` is not below [`Whalemating::nmating`].
    pub fn matchmaker(&self, which: usize) {
        self.check(Role::Matchmaker, which);
        self.pop_lock.acquire();
        self.maker_cv.wait_while(&self.pop_lock, || {
            self.with_population(|p| p.males.is_empty() || p.females.is_empty())
        });
        let matched = self.with_population(|p| {
            let (Some(male), Some(female)) = (p.males.pop_front(), p.females.pop_front()) else {
                unreachable!("woke up without a pair");
            };
            let matched = Match {
                male,
                female,
                maker: which,
            };
            p.matches.push(matched);
            matched
        });
        self.pop_lock.release();

        synch::println!(
            "Male {}, Female {}, and Maker {}",
            matched.male, matched.female, matched.maker
        );
    }

    /// Takes the matings recorded so far.
    pub fn matches(&self) -> Vec<Match> {
        self.pop_lock.acquire();
        let matches = self.with_population(|p| core::mem::take(&mut p.matches));
        self.pop_lock.release();
        matches
    }
}

/// Runs a full round: `nmating` males, females, and matchmakers, each on its
/// own thread. Returns once every whale is done.
///
/// # Errors
/// [`KernelError::NoMemory`] if the primitives can not be allocated.
pub fn run_whalemating(nmating: usize) -> Result<Vec<Match>, KernelError> {
    let round = Arc::new(Whalemating::new(nmating)?);
    let menu = Arc::new(Semaphore::new("whalemating driver", 0)?);

    let mut whales = Vec::with_capacity(round.nmating() * 3);
    for which in 0..round.nmating() {
        for role in [Role::Male, Role::Female, Role::Matchmaker] {
            let (round, menu) = (round.clone(), menu.clone());
            whales.push(
                ThreadBuilder::new(format!("{role:?} whale {which}")).spawn(move || {
                    match role {
                        Role::Male => round.male(which),
                        Role::Female => round.female(which),
                        Role::Matchmaker => round.matchmaker(which),
                    }
                    menu.signal();
                }),
            );
        }
    }

    for _ in 0..whales.len() {
        menu.wait();
    }
    for whale in whales {
        assert_eq!(whale.join(), 0, "A whale died during the round.");
    }
    Ok(round.matches())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matchmaker_waits_for_both() {
        let round = Arc::new(Whalemating::new(1).unwrap());
        round.male(0);
        let maker = {
            let round = round.clone();
            ThreadBuilder::new("maker").spawn(move || round.matchmaker(0))
        };
        while synch::thread::get_state_by_tid(maker.tid)
            != Ok(synch::thread::ThreadState::Parked)
        {
            std::thread::yield_now();
        }
        assert!(round.matches().is_empty());

        round.female(0);
        assert_eq!(maker.join(), 0);
        assert_eq!(
            round.matches(),
            [Match {
                male: 0,
                female: 0,
                maker: 0
            }]
        );
    }

    #[test]
    #[should_panic(expected = "No such whale: Female 2 of 2")]
    fn whale_out_of_range() {
        let round = Whalemating::new(2).unwrap();
        round.male(1);
        round.female(2);
    }
}
