//! Random reviewer selection.
//!
//! The random source is injected at construction. Production code uses
//! [`ReviewerSelector::from_entropy`]; tests use [`ReviewerSelector::seeded`]
//! to get reproducible picks.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::model::{User, UserId};

/// Something that can be picked as a reviewer.
pub trait Candidate {
    fn candidate_id(&self) -> &UserId;
}

impl Candidate for User {
    fn candidate_id(&self) -> &UserId {
        &self.id
    }
}

impl Candidate for UserId {
    fn candidate_id(&self) -> &UserId {
        self
    }
}

/// Picks a uniformly random subset of a candidate pool.
///
/// Selection never fails: asking for more reviewers than the pool holds
/// returns the whole (shuffled) pool, and an empty pool yields an empty
/// result. Callers decide whether that is an error.
pub struct ReviewerSelector<R = StdRng> {
    rng: Mutex<R>,
}

impl ReviewerSelector<StdRng> {
    /// Selector backed by an OS-seeded generator.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Selector whose picks are fully determined by `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ReviewerSelector<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Select up to `count` distinct candidates from `pool`.
    ///
    /// Duplicates (by id) are dropped first, keeping the first occurrence.
    /// The remaining pool is shuffled in full with a Fisher-Yates pass and
    /// the first `min(count, pool.len())` entries are returned.
    pub fn select<C: Candidate>(&self, pool: Vec<C>, count: usize) -> Vec<C> {
        let mut seen = HashSet::new();
        let mut pool: Vec<C> = pool
            .into_iter()
            .filter(|c| seen.insert(c.candidate_id().clone()))
            .collect();

        if pool.is_empty() {
            return pool;
        }

        {
            // A panic mid-shuffle leaves the generator in a valid state.
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            pool.shuffle(&mut *rng);
        }

        pool.truncate(count);
        pool
    }
}
