use bouncing_balls::{init_logging, viewer::Viewer, SimulationConfig, SimulationManager};
use tokio::{select, time::MissedTickBehavior};
use tracing::{error, info, warn};

/// Host loop: ticks the simulation, streams the frames to the viewer clients and stops everything
/// on ctrl-c. Takes an optional json config file as first argument.
#[tokio::main]
async fn main() {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => match SimulationConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("couldn't load config from {}: {:?}", path, e);
                std::process::exit(1);
            }
        },
        None => SimulationConfig::default(),
    };

    let manager = SimulationManager::new(config);
    let viewer = Viewer::new();
    let viewer_task = match viewer
        .serve(manager.config().viewer_addr, manager.shutdown_signal())
        .await
    {
        Ok((addr, handle)) => {
            info!("connect a viewer to ws://{}", addr);
            Some(handle)
        }
        Err(e) => {
            warn!("running without a viewer: {:?}", e);
            None
        }
    };

    manager.start();
    manager.spawn_ball();

    let mut interval = tokio::time::interval(manager.config().tick());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        select! {
            _ = interval.tick() => viewer.publish(manager.render_tick()),
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("couldn't listen for ctrl-c: {}", e);
                }
                break;
            }
        }
    }

    manager.request_shutdown().await;
    if let Some(viewer_task) = viewer_task {
        if let Err(e) = viewer_task.await {
            warn!("viewer task failed: {}", e);
        }
    }
    info!("bye");
}
