use bouncing_balls::{init_logging, SimulationConfig, SimulationManager};
use std::time::Duration;
use tokio::{select, time::Instant};
use tracing::info;

const DEFAULT_RUN_TIME: Duration = Duration::from_secs(30);
const REPORT_PERIOD: Duration = Duration::from_secs(1);

/// Runs the simulation without a viewer for the given number of seconds (first argument),
/// logging the live balls once per second.
#[tokio::main]
async fn main() {
    init_logging();

    let run_time = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RUN_TIME);

    let manager = SimulationManager::new(SimulationConfig::default());
    manager.start();
    manager.spawn_ball();

    let end = Instant::now() + run_time;
    let mut interval = tokio::time::interval(manager.config().tick());
    let mut last_report = Instant::now();
    loop {
        select! {
            _ = interval.tick() => {
                let frame = manager.render_tick();
                if last_report.elapsed() >= REPORT_PERIOD {
                    info!(
                        "{} balls on screen, {} tasks running",
                        frame.balls().count(),
                        manager.worker_count()
                    );
                    last_report = Instant::now();
                }
                if Instant::now() >= end {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let shutdown_start = Instant::now();
    manager.request_shutdown().await;
    info!("stopped in {}ms", shutdown_start.elapsed().as_millis());
}
