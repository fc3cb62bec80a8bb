//! Owner of the simulation: the shared state, the ball tasks, the spawner and the shutdown
//! protocol.
//!
//! # Examples
//!
//! A host drives [`SimulationManager::render_tick`] at its frame rate and stops everything with
//! [`SimulationManager::request_shutdown`]:
//! ```
//! use bouncing_balls::{config::SimulationConfig, manager::SimulationManager};
//! use tokio::time::sleep;
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SimulationManager::new(SimulationConfig::default());
//!     manager.start();
//!     manager.spawn_ball();
//!
//!     for _ in 0..10 {
//!         let frame = manager.render_tick();
//!         assert!(frame.obstacle().is_some());
//!         sleep(manager.config().tick()).await;
//!     }
//!
//!     manager.request_shutdown().await;
//!     assert_eq!(manager.worker_count(), 0);
//! }
//! ```

use std::sync::{Arc, Mutex};

use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    config::SimulationConfig,
    random::RandomSource,
    shutdown::{self, ShutdownSignal, ShutdownTrigger, Wakeup},
    spawner::{spawner_loop, SpawnSchedule},
    viewer::ViewerFrame,
    world::{Ball, BallId, Obstacle, SimState},
    IgnoreMutexErr,
};

/// What every task of the simulation needs, cloned into each of them.
#[derive(Clone)]
pub(crate) struct SimHandle {
    state: Arc<Mutex<SimState>>,
    config: Arc<SimulationConfig>,
    rng: RandomSource,
    shutdown: ShutdownSignal,
}

impl SimHandle {
    /// Creates a ball and starts its task, both under the simulation lock so the ball never
    /// exists without its task. Returns None once shutdown was requested.
    /// Must be called from within a tokio runtime.
    pub fn spawn_ball(&self) -> Option<BallId> {
        let mut state = self.state.lock().unwrap_ignore_poison();
        if self.shutdown.is_triggered() {
            return None;
        }
        let id = state.allocate_id();
        let ball = Ball::spawn(id, &self.config, &self.rng, Instant::now());
        let worker = tokio::spawn(ball_worker(self.clone(), id));
        info!(
            "spawned ball {} at {:?} with velocity {:?}",
            id,
            ball.get_pos(),
            ball.get_vel()
        );
        state.insert_ball(ball, worker);
        Some(id)
    }
}

/// A ball's own update loop: one step per tick until the ball is done or shutdown is requested.
async fn ball_worker(handle: SimHandle, id: BallId) {
    let mut shutdown = handle.shutdown.clone();
    let tick = handle.config.tick();
    loop {
        if shutdown.sleep(tick).await == Wakeup::Shutdown {
            trace!("ball {} task stopping on shutdown", id);
            break;
        }
        let running = handle
            .state
            .lock()
            .unwrap_ignore_poison()
            .update_ball(id, Instant::now(), &handle.config);
        if !running {
            debug!("ball {} task finished", id);
            break;
        }
    }
}

pub struct SimulationManager {
    handle: SimHandle,
    trigger: ShutdownTrigger,
    spawner: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationManager {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => RandomSource::seeded(seed),
            None => RandomSource::from_entropy(),
        };
        let obstacle = Obstacle::new(&rng, &config);
        let (trigger, shutdown) = shutdown::channel();
        Self {
            handle: SimHandle {
                state: Arc::new(Mutex::new(SimState::new(obstacle))),
                config: Arc::new(config),
                rng,
                shutdown,
            },
            trigger,
            spawner: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.handle.config
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.trigger.subscribe()
    }

    /// Starts the spawner. Does nothing if it already runs or shutdown was requested.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut spawner = self.spawner.lock().unwrap_ignore_poison();
        if spawner.is_some() || self.trigger.is_triggered() {
            return;
        }
        let schedule = SpawnSchedule::new(
            self.handle.rng.clone(),
            self.handle.config.spawn_delay_min(),
            self.handle.config.spawn_delay_max(),
            Instant::now(),
        );
        *spawner = Some(tokio::spawn(spawner_loop(
            self.handle.clone(),
            schedule,
            self.trigger.subscribe(),
        )));
        info!("simulation started");
    }

    /// Creates a ball and starts its task. Returns None once shutdown was requested.
    /// Must be called from within a tokio runtime.
    pub fn spawn_ball(&self) -> Option<BallId> {
        self.handle.spawn_ball()
    }

    /// The host's per frame call: advances the obstacle, removes finished balls and returns what
    /// should be drawn.
    pub fn render_tick(&self) -> ViewerFrame {
        let mut state = self.handle.state.lock().unwrap_ignore_poison();
        let removed = state.global_step(&self.handle.rng, Instant::now());
        if !removed.is_empty() {
            debug!("pruned balls {:?}, {} left", removed, state.balls.len());
        }
        ViewerFrame::from_state(&state)
    }

    /// Raises the shutdown flag, which wakes every task, then waits for all of them to finish.
    /// When this returns no task of the simulation is alive. Calling it again is a no-op.
    pub async fn request_shutdown(&self) {
        if self.trigger.trigger() {
            info!("shutdown requested");
        }

        let spawner = self.spawner.lock().unwrap_ignore_poison().take();
        if let Some(spawner) = spawner {
            if let Err(e) = spawner.await {
                warn!("spawner task failed: {}", e);
            }
        }

        // the spawner is gone and spawn_ball refuses to run anymore, no new task can show up
        let workers = self.handle.state.lock().unwrap_ignore_poison().take_workers();
        let count = workers.len();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("ball task failed: {}", e);
            }
        }
        info!("simulation stopped, joined {} ball tasks", count);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.trigger.is_triggered()
    }

    pub fn live_ball_count(&self) -> usize {
        self.handle.state.lock().unwrap_ignore_poison().balls.len()
    }

    /// Tasks started and not joined yet, the spawner included.
    pub fn worker_count(&self) -> usize {
        let spawner = usize::from(self.spawner.lock().unwrap_ignore_poison().is_some());
        spawner + self.handle.state.lock().unwrap_ignore_poison().worker_count()
    }

    /// Runs `f` with the simulation lock held.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.handle.state.lock().unwrap_ignore_poison())
    }
}

impl Drop for SimulationManager {
    fn drop(&mut self) {
        // tasks still alive see the flag and wind down on their own
        self.trigger.trigger();
    }
}
