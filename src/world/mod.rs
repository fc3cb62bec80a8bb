mod ball;
mod obstacle;

// EXPORTS
pub use ball::{Ball, BallId, VELOCITY_SCALE};
pub use obstacle::Obstacle;

use std::collections::{BTreeMap, HashMap};
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

use crate::{config::SimulationConfig, random::RandomSource};

/// Everything guarded by the simulation lock.
#[derive(Debug)]
pub struct SimState {
    pub balls: BTreeMap<BallId, Ball>,
    pub obstacle: Obstacle,
    /// one update task per live ball
    workers: HashMap<BallId, JoinHandle<()>>,
    /// tasks of pruned balls, kept until they are seen finished or joined at shutdown
    retiring: Vec<JoinHandle<()>>,
    next_id: BallId,
}

impl SimState {
    pub fn new(obstacle: Obstacle) -> Self {
        Self {
            balls: BTreeMap::new(),
            obstacle,
            workers: HashMap::new(),
            retiring: Vec::new(),
            next_id: 0,
        }
    }

    pub fn allocate_id(&mut self) -> BallId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert_ball(&mut self, ball: Ball, worker: JoinHandle<()>) {
        let id = ball.get_id();
        self.balls.insert(id, ball);
        if let Some(previous) = self.workers.insert(id, worker) {
            // ids are never reused, keep the old task joinable anyway
            self.retiring.push(previous);
        }
    }

    /// Runs one tick of ball `id`. Returns false once the ball is gone or inactive, its task
    /// should then stop.
    pub fn update_ball(&mut self, id: BallId, now: Instant, config: &SimulationConfig) -> bool {
        let Some(ball) = self.balls.get_mut(&id) else {
            return false;
        };
        if !ball.is_active() {
            return false;
        }
        ball.update_step(&mut self.obstacle, now, config);
        ball.is_active()
    }

    /// The global tick: moves the obstacle (and what is stuck to it) then drops finished balls.
    pub fn global_step(&mut self, rng: &RandomSource, now: Instant) -> Vec<BallId> {
        self.obstacle.update_step(&mut self.balls, rng, now);
        self.prune_inactive()
    }

    /// Removes every inactive ball from the live set. Returns the removed ids.
    pub fn prune_inactive(&mut self) -> Vec<BallId> {
        let removed: Vec<BallId> = self
            .balls
            .iter()
            .filter(|(_, ball)| !ball.is_active())
            .map(|(id, _)| *id)
            .collect();
        for id in &removed {
            self.balls.remove(id);
            self.obstacle.detach(*id);
            if let Some(worker) = self.workers.remove(id) {
                self.retiring.push(worker);
            }
            debug!("ball {} removed from the simulation", id);
        }
        self.retiring.retain(|worker| !worker.is_finished());
        removed
    }

    /// Hands over every task handle, leaving none behind.
    pub fn take_workers(&mut self) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<JoinHandle<()>> = self.workers.drain().map(|(_, h)| h).collect();
        handles.append(&mut self.retiring);
        handles
    }

    /// Number of tasks not joined yet, running or not.
    pub fn worker_count(&self) -> usize {
        self.workers.len() + self.retiring.len()
    }

    pub fn active_balls(&self) -> impl Iterator<Item = &Ball> {
        self.balls.values().filter(|ball| ball.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Point2, Vec2};

    fn state() -> (SimState, SimulationConfig, RandomSource) {
        let config = SimulationConfig::default();
        let rng = RandomSource::seeded(21);
        (SimState::new(Obstacle::new(&rng, &config)), config, rng)
    }

    #[tokio::test]
    async fn test_prune_removes_only_inactive_balls() {
        let (mut state, config, rng) = state();
        let now = Instant::now();
        let worn_out = state.allocate_id();
        let fresh = state.allocate_id();
        let mut ball = Ball::new(
            worn_out,
            Point2::new(0.5, 0.5),
            Vec2::new(0.1, 0.),
            0.1,
            [0.; 3],
            now,
        );
        // deactivates on its next step
        ball.set_bounces(config.bounce_limit);
        state.insert_ball(ball, tokio::spawn(async {}));
        state.insert_ball(Ball::spawn(fresh, &config, &rng, now), tokio::spawn(async {}));
        assert_eq!(state.worker_count(), 2);

        assert!(!state.update_ball(worn_out, now, &config));
        let removed = state.global_step(&rng, now);

        assert_eq!(removed, vec![worn_out]);
        assert_eq!(state.balls.len(), 1);
        assert!(state.balls.contains_key(&fresh));
        // the removed ball's task is kept until seen finished or joined
        assert!(state.worker_count() >= 1);
        let handles = state.take_workers();
        assert!(!handles.is_empty());
        for handle in handles {
            handle.await.expect("noop task");
        }
        assert_eq!(state.worker_count(), 0);
    }

    #[test]
    fn test_update_of_unknown_ball_stops_its_task() {
        let (mut state, config, _) = state();
        assert!(!state.update_ball(42, Instant::now(), &config));
    }

    #[test]
    fn test_ids_are_unique() {
        let (mut state, _, _) = state();
        let a = state.allocate_id();
        let b = state.allocate_id();
        assert_ne!(a, b);
    }
}
