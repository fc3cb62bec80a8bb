//! Viewer abstraction.
//!
//! The simulation doesn't draw anything itself. Each render tick produces a [`ViewerFrame`]
//! listing what should be on screen, and a [`Viewer`] streams the latest frame as json to every
//! connected websocket client, which does the actual drawing.
//!
//! # Examples
//!
//! ```
//! use bouncing_balls::{
//!     config::SimulationConfig,
//!     manager::SimulationManager,
//!     viewer::ViewerObject,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SimulationManager::new(SimulationConfig::default());
//!     manager.spawn_ball();
//!
//!     let frame = manager.render_tick();
//!     assert_eq!(frame.balls().count(), 1);
//!     assert!(matches!(frame.obstacle(), Some(ViewerObject::Obstacle { .. })));
//!
//!     manager.request_shutdown().await;
//! }
//! ```

use futures_util::{stream::FusedStream, SinkExt};
use serde::{Deserialize, Serialize};
use std::{
    io,
    net::{SocketAddr, SocketAddrV4},
    sync::{Arc, Mutex},
};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::Notify,
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    math::Point2,
    shutdown::ShutdownSignal,
    world::{Ball, BallId, Obstacle, SimState},
    IgnoreMutexErr,
};

/// A shape that can be drawn on the viewer clients
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ViewerObject {
    Ball {
        id: BallId,
        pos: Point2,
        radius: f64,
        color: [f32; 3],
    },
    Obstacle {
        /// bottom left corner
        pos: Point2,
        width: f64,
        height: f64,
        color: [f32; 3],
        attached: usize,
    },
}

impl From<&Ball> for ViewerObject {
    fn from(ball: &Ball) -> Self {
        ViewerObject::Ball {
            id: ball.get_id(),
            pos: ball.get_pos(),
            radius: ball.get_radius(),
            color: ball.get_color(),
        }
    }
}

impl From<&Obstacle> for ViewerObject {
    fn from(obstacle: &Obstacle) -> Self {
        ViewerObject::Obstacle {
            pos: obstacle.get_pos(),
            width: obstacle.get_width(),
            height: obstacle.get_height(),
            color: obstacle.get_color(),
            attached: obstacle.attached_count(),
        }
    }
}

/// A frame sent to each viewer client. It contains all the objects to be drawn during the frame.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ViewerFrame {
    objects: Vec<ViewerObject>,
}

impl ViewerFrame {
    /// The active balls then the obstacle. Inactive balls are never drawn.
    pub fn from_state(state: &SimState) -> Self {
        let mut objects: Vec<ViewerObject> = state.active_balls().map(ViewerObject::from).collect();
        objects.push(ViewerObject::from(&state.obstacle));
        Self { objects }
    }

    pub fn objects(&self) -> &[ViewerObject] {
        &self.objects
    }

    pub fn balls(&self) -> impl Iterator<Item = &ViewerObject> {
        self.objects
            .iter()
            .filter(|o| matches!(o, ViewerObject::Ball { .. }))
    }

    pub fn obstacle(&self) -> Option<&ViewerObject> {
        self.objects
            .iter()
            .find(|o| matches!(o, ViewerObject::Obstacle { .. }))
    }
}

#[derive(Debug)]
pub enum ViewerError {
    BindError(io::Error),
}

/// Holds the latest frame and wakes the client connections when a new one is published.
#[derive(Clone, Default)]
pub struct Viewer {
    latest: Arc<Mutex<ViewerFrame>>,
    new_frame: Arc<Notify>,
}

impl Viewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: ViewerFrame) {
        *self.latest.lock().unwrap_ignore_poison() = frame;
        self.new_frame.notify_waiters();
    }

    fn latest_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&*self.latest.lock().unwrap_ignore_poison())
    }

    /// Starts accepting viewer clients on `addr`. Returns the bound address and the handle of the
    /// server task, which ends (after its client connections) once `shutdown` is raised.
    pub async fn serve(
        &self,
        addr: SocketAddrV4,
        mut shutdown: ShutdownSignal,
    ) -> Result<(SocketAddr, JoinHandle<()>), ViewerError> {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(ViewerError::BindError)?;
        let local_addr = listener.local_addr().map_err(ViewerError::BindError)?;
        info!("viewer listening on: {}", local_addr);

        let viewer = self.clone();
        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            connections.spawn(accept_connection(viewer.clone(), stream, shutdown.clone()));
                        }
                        Err(e) => warn!("couldn't accept a viewer client: {}", e),
                    },
                    _ = shutdown.triggered() => break,
                }
            }
            while connections.join_next().await.is_some() {}
            info!("viewer stopped");
        });
        Ok((local_addr, handle))
    }
}

async fn accept_connection(viewer: Viewer, stream: TcpStream, mut shutdown: ShutdownSignal) {
    let addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("viewer client without a peer address: {}", e);
            return;
        }
    };

    let mut ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("websocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    info!("new viewer connection: {}", addr);

    while !ws_stream.is_terminated() {
        select! {
            _ = viewer.new_frame.notified() => {}
            _ = shutdown.triggered() => break,
        }
        let json_encoded_frame = match viewer.latest_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("couldn't serialize `ViewerFrame`: {}", e);
                continue;
            }
        };
        if let Err(e) = ws_stream
            .send(tokio_tungstenite::tungstenite::Message::text(
                json_encoded_frame,
            ))
            .await
        {
            debug!("viewer {} went away: {}", addr, e);
            break;
        }
    }
    let _ = ws_stream.close(None).await;
    info!("viewer connection closed: {}", addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SimulationConfig, random::RandomSource, shutdown};
    use futures_util::StreamExt;
    use std::net::Ipv4Addr;
    use tokio::time::{sleep, timeout, Duration, Instant};

    fn sample_frame() -> ViewerFrame {
        let rng = RandomSource::seeded(5);
        let config = SimulationConfig::default();
        let mut state = SimState::new(Obstacle::new(&rng, &config));
        let now = Instant::now();
        for _ in 0..2 {
            let id = state.allocate_id();
            state.balls.insert(id, Ball::spawn(id, &config, &rng, now));
        }
        ViewerFrame::from_state(&state)
    }

    #[test]
    fn test_frame_lists_balls_then_obstacle() {
        let frame = sample_frame();
        assert_eq!(frame.objects().len(), 3);
        assert_eq!(frame.balls().count(), 2);
        assert!(matches!(
            frame.objects().last(),
            Some(ViewerObject::Obstacle { attached: 0, .. })
        ));
    }

    #[test]
    fn test_objects_are_tagged_by_type() {
        let frame = sample_frame();
        let json = serde_json::to_value(&frame).expect("frame serializes");
        let objects = json["objects"].as_array().expect("objects array");
        assert_eq!(objects[0]["type"], "Ball");
        assert_eq!(objects[2]["type"], "Obstacle");
        assert_eq!(objects[0]["radius"], 0.1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clients_receive_published_frames() {
        let (trigger, signal) = shutdown::channel();
        let viewer = Viewer::new();
        let (addr, server) = viewer
            .serve(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), signal)
            .await
            .expect("bind on an ephemeral port");

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .expect("connect to the viewer");
        let (_write, mut read) = ws.split();

        let frame = sample_frame();
        let publisher = {
            let viewer = viewer.clone();
            let frame = frame.clone();
            tokio::spawn(async move {
                loop {
                    viewer.publish(frame.clone());
                    sleep(Duration::from_millis(10)).await;
                }
            })
        };

        let message = timeout(Duration::from_secs(5), read.next())
            .await
            .expect("a frame within 5s")
            .expect("stream still open")
            .expect("valid websocket message");
        publisher.abort();
        let received: ViewerFrame =
            serde_json::from_str(message.to_text().expect("text message")).expect("json frame");
        assert_eq!(received, frame);

        trigger.trigger();
        timeout(Duration::from_secs(5), server)
            .await
            .expect("viewer stops on shutdown")
            .expect("viewer task shouldn't panic");
    }
}
