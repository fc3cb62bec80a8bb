use std::{collections::BTreeMap, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    config::SimulationConfig,
    math::{Point2, Rect, Vec2},
    random::RandomSource,
};

use super::{Ball, BallId};

const WIDTH: f64 = 0.4;
const HEIGHT: f64 = 0.8;
const START_ORIGIN: Point2 = Point2 {
    x: -0.55,
    y: 0.75 - HEIGHT,
};
/// pushes the obstacle back inside the field after a direction change so it doesn't stick to the bound
const BOUND_CORRECTION: f64 = 0.05;
/// speed of the balls when they leave the obstacle
const EJECT_SPEED: f64 = 0.03;
/// max angle (radians) added to or removed from the outward direction of an ejected ball
const EJECT_JITTER: f64 = 0.15;
const COLOR: [f32; 3] = [0.5, 0.5, 0.5];

/// The gray zone: a rectangle sliding up and down which catches balls and throws them back out
/// once `capacity` of them are stuck to it.
#[derive(Debug, Clone)]
pub struct Obstacle {
    /// bottom left corner
    origin: Point2,
    width: f64,
    height: f64,
    speed: f64,
    /// +1. going up, -1. going down
    direction: f64,
    speed_min: f64,
    speed_max: f64,
    capacity: usize,
    cooldown: Duration,
    /// attached balls and their position relative to `origin` when they got caught
    attached: Vec<(BallId, Vec2)>,
}

impl Obstacle {
    pub fn new(rng: &RandomSource, config: &SimulationConfig) -> Self {
        Self {
            origin: START_ORIGIN,
            width: WIDTH,
            height: HEIGHT,
            speed: rng.uniform(config.obstacle_speed_min, config.obstacle_speed_max),
            direction: 1.,
            speed_min: config.obstacle_speed_min,
            speed_max: config.obstacle_speed_max,
            capacity: config.attach_capacity,
            cooldown: config.cooldown(),
            attached: Vec::with_capacity(config.attach_capacity),
        }
    }

    pub fn get_pos(&self) -> Point2 {
        self.origin
    }

    pub fn get_width(&self) -> f64 {
        self.width
    }

    pub fn get_height(&self) -> f64 {
        self.height
    }

    pub fn get_speed(&self) -> f64 {
        self.speed
    }

    pub fn get_color(&self) -> [f32; 3] {
        COLOR
    }

    pub fn get_rect(&self) -> Rect {
        Rect::new(self.origin, self.origin + Vec2::new(self.width, self.height))
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    pub fn is_attached(&self, id: BallId) -> bool {
        self.attached.iter().any(|(attached_id, _)| *attached_id == id)
    }

    pub fn attached_offset(&self, id: BallId) -> Option<Vec2> {
        self.attached
            .iter()
            .find(|(attached_id, _)| *attached_id == id)
            .map(|(_, offset)| *offset)
    }

    /// Returns the ball's position relative to the obstacle's origin if the ball's bounding box
    /// overlaps the obstacle.
    pub fn check_collision(&self, ball: &Ball) -> Option<Vec2> {
        self.get_rect()
            .overlaps(&ball.bounding_box())
            .then(|| ball.get_pos() - self.origin)
    }

    /// Sticks `ball` to the obstacle at `offset`. The caller holds the simulation lock and has
    /// checked the ball's cooldown. Returns false if the ball is already attached or the obstacle
    /// is full.
    pub fn attach(&mut self, ball: &mut Ball, offset: Vec2) -> bool {
        if self.attached.len() >= self.capacity || self.is_attached(ball.get_id()) {
            return false;
        }
        self.attached.push((ball.get_id(), offset));
        ball.attach();
        debug!(
            "ball {} attached to the obstacle ({}/{})",
            ball.get_id(),
            self.attached.len(),
            self.capacity
        );
        true
    }

    /// Forgets a ball, used when the ball leaves the simulation.
    pub fn detach(&mut self, id: BallId) {
        self.attached.retain(|(attached_id, _)| *attached_id != id);
    }

    /// Moves the obstacle one tick, carries the attached balls along and ejects them all once the
    /// obstacle is full.
    pub fn update_step(
        &mut self,
        balls: &mut BTreeMap<BallId, Ball>,
        rng: &RandomSource,
        now: Instant,
    ) {
        self.origin.y += self.speed * self.direction;
        if self.origin.y + self.height > 1. || self.origin.y < -1. {
            self.direction = -self.direction;
            self.origin.y += BOUND_CORRECTION * self.direction;
            self.speed = rng.uniform(self.speed_min, self.speed_max);
        }

        let origin = self.origin;
        self.attached.retain(|(id, offset)| match balls.get_mut(id) {
            Some(ball) => {
                ball.set_pos(origin + *offset);
                true
            }
            None => false,
        });

        if self.attached.len() >= self.capacity {
            self.eject_all(balls, rng, now);
        }
    }

    fn eject_all(
        &mut self,
        balls: &mut BTreeMap<BallId, Ball>,
        rng: &RandomSource,
        now: Instant,
    ) {
        let center = self.get_rect().center();
        let cooldown_end = now + self.cooldown;
        let ejected = std::mem::take(&mut self.attached);
        for (id, _) in &ejected {
            if let Some(ball) = balls.get_mut(id) {
                let jitter = (rng.next_f64() - 0.5) * 2. * EJECT_JITTER;
                let angle = (ball.get_pos() - center).angle() + jitter;
                ball.eject(Vec2::from_angle(angle, EJECT_SPEED), cooldown_end);
            }
        }
        info!("obstacle ejected {} balls", ejected.len());
    }

    #[cfg(test)]
    pub(crate) fn set_origin(&mut self, origin: Point2) {
        self.origin = origin;
    }
}
