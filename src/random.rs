//! Thread shared random number source.
//!
//! Every task draws from the same generator so a seeded run is reproducible as long as the draws
//! happen in the same order (they don't across concurrent ball workers, they do for the spawner alone).
//!
//! ```
//! use bouncing_balls::random::RandomSource;
//!
//! let a = RandomSource::seeded(42);
//! let b = RandomSource::seeded(42);
//! let x = a.next_f64();
//! assert!((0. ..1.).contains(&x));
//! assert_eq!(x, b.next_f64());
//! ```

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{Arc, Mutex};

use crate::IgnoreMutexErr;

#[derive(Clone, Debug)]
pub struct RandomSource {
    rng: Arc<Mutex<StdRng>>,
}

impl RandomSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// uniform in [0, 1)
    pub fn next_f64(&self) -> f64 {
        self.rng.lock().unwrap_ignore_poison().gen::<f64>()
    }

    /// uniform in [min, max)
    pub fn uniform(&self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }
}
