use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    manager::SimHandle,
    random::RandomSource,
    shutdown::{ShutdownSignal, Wakeup},
};

/// Randomized spawn instants: each spawn happens a uniform random delay in `[min, max)` after the
/// previous one.
#[derive(Debug, Clone)]
pub struct SpawnSchedule {
    rng: RandomSource,
    min: Duration,
    max: Duration,
    last_spawn: Instant,
}

impl SpawnSchedule {
    pub fn new(rng: RandomSource, min: Duration, max: Duration, start: Instant) -> Self {
        Self {
            rng,
            min,
            max,
            last_spawn: start,
        }
    }

    pub fn last_spawn(&self) -> Instant {
        self.last_spawn
    }

    /// Draws the instant of the next spawn, relative to the last recorded one.
    pub fn plan_next(&self) -> Instant {
        let delay = self.rng.uniform(self.min.as_secs_f64(), self.max.as_secs_f64());
        self.last_spawn + Duration::from_secs_f64(delay)
    }

    pub fn record_spawn(&mut self, at: Instant) {
        self.last_spawn = at;
    }
}

/// Spawns a ball at every planned instant until shutdown. The wait is interrupted by shutdown, in
/// which case nothing more gets spawned.
pub(crate) async fn spawner_loop(
    handle: SimHandle,
    mut schedule: SpawnSchedule,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let at = schedule.plan_next();
        debug!(
            "next ball in {}ms",
            at.saturating_duration_since(Instant::now()).as_millis()
        );
        if shutdown.sleep_until(at).await == Wakeup::Shutdown {
            break;
        }
        if handle.spawn_ball().is_none() {
            break;
        }
        schedule.record_spawn(at);
    }
    info!("spawner stopped");
}
