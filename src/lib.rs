#![deny(clippy::unwrap_used)]
pub mod config;
pub mod manager;
pub mod math;
pub mod random;
pub mod shutdown;
pub mod spawner;
pub mod viewer;
pub mod world;

use std::sync::LockResult;

use tracing::warn;

pub use config::SimulationConfig;
pub use manager::SimulationManager;

pub trait IgnoreMutexErr<T> {
    fn unwrap_ignore_poison(self) -> T;
}

impl<T> IgnoreMutexErr<T> for LockResult<T> {
    fn unwrap_ignore_poison(self) -> T {
        match self {
            Ok(r) => r,
            Err(poisoned) => {
                // a task panicked mid tick, the state is still usable arithmetic wise
                let guard = poisoned.into_inner();
                warn!("simulation lock was poisoned, recovering from mutex poisoning");
                guard
            }
        }
    }
}

/// Installs the `tracing` subscriber used by the binaries, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
