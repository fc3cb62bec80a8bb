use crate::{
    config::SimulationConfig,
    math::{Point2, Rect, Vec2},
    random::RandomSource,
};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::Obstacle;

pub type BallId = u64;

/// fraction of the velocity applied to the position on each tick
pub const VELOCITY_SCALE: f64 = 0.25;

/// half size of the simulated square, walls are at -BOUND and +BOUND on both axes
const BOUND: f64 = 1.;

#[derive(Clone, Debug)]
pub struct Ball {
    id: BallId,
    radius: f64,
    pos: Point2,
    vel: Vec2,
    color: [f32; 3],
    bounces: u32,
    active: bool,
    attached: bool,
    /// the ball can't attach to the obstacle before this instant
    cooldown_end: Instant,
}

impl Ball {
    pub fn new(
        id: BallId,
        pos: Point2,
        vel: Vec2,
        radius: f64,
        color: [f32; 3],
        now: Instant,
    ) -> Self {
        Self {
            id,
            radius,
            pos,
            vel,
            color,
            bounces: 0,
            active: true,
            attached: false,
            cooldown_end: now,
        }
    }

    /// A new ball resting on the bottom wall, launched upward with a random velocity and color.
    pub fn spawn(id: BallId, config: &SimulationConfig, rng: &RandomSource, now: Instant) -> Self {
        let radius = config.ball_radius;
        let vel = Vec2::new(rng.next_f64() * 0.04 - 0.02, rng.next_f64() * 0.04 + 0.02);
        let color = [
            rng.next_f64() as f32,
            rng.next_f64() as f32,
            rng.next_f64() as f32,
        ];
        Self::new(id, Point2::new(0., -BOUND + radius), vel, radius, color, now)
    }

    pub fn get_id(&self) -> BallId {
        self.id
    }

    pub fn get_pos(&self) -> Point2 {
        self.pos
    }

    pub fn get_vel(&self) -> Vec2 {
        self.vel
    }

    pub fn get_radius(&self) -> f64 {
        self.radius
    }

    pub fn get_color(&self) -> [f32; 3] {
        self.color
    }

    pub fn get_bounces(&self) -> u32 {
        self.bounces
    }

    pub fn get_cooldown_end(&self) -> Instant {
        self.cooldown_end
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn bounding_box(&self) -> Rect {
        Rect::around(self.pos, self.radius)
    }

    pub(super) fn set_pos(&mut self, pos: Point2) {
        self.pos = pos;
    }

    pub(super) fn attach(&mut self) {
        self.vel = Vec2::zero();
        self.attached = true;
    }

    pub(super) fn eject(&mut self, vel: Vec2, cooldown_end: Instant) {
        self.vel = vel;
        self.attached = false;
        self.cooldown_end = cooldown_end;
    }

    /// Advances the ball by one tick. Must be called with the simulation lock held.
    ///
    /// A ball that reached its bounce limit still gets caught by the obstacle on that tick, it
    /// goes inactive on its next free tick.
    pub fn update_step(
        &mut self,
        obstacle: &mut Obstacle,
        now: Instant,
        config: &SimulationConfig,
    ) {
        if self.attached {
            // the obstacle drives our position
            return;
        }
        if self.bounces >= config.bounce_limit {
            self.deactivate();
            return;
        }

        self.pos = self.pos + self.vel * VELOCITY_SCALE;
        self.reflect_on_walls();
        // a corner hit on the last allowed bounce still counts up to the limit only
        self.bounces = self.bounces.min(config.bounce_limit);

        if now < self.cooldown_end {
            return;
        }
        if let Some(offset) = obstacle.check_collision(self) {
            obstacle.attach(self, offset);
        }
    }

    /// Flips each velocity component whose leading edge went past a wall, one bounce per axis.
    fn reflect_on_walls(&mut self) {
        let r = self.radius;
        let leaving_right = self.pos.x + r > BOUND && self.vel.x > 0.;
        let leaving_left = self.pos.x - r < -BOUND && self.vel.x < 0.;
        if leaving_right || leaving_left {
            self.vel.x = -self.vel.x;
            self.bounces += 1;
            trace!("ball {} bounced on a vertical wall ({})", self.id, self.bounces);
        }
        let leaving_top = self.pos.y + r > BOUND && self.vel.y > 0.;
        let leaving_bottom = self.pos.y - r < -BOUND && self.vel.y < 0.;
        if leaving_top || leaving_bottom {
            self.vel.y = -self.vel.y;
            self.bounces += 1;
            trace!("ball {} bounced on a horizontal wall ({})", self.id, self.bounces);
        }
    }

    #[cfg(test)]
    pub(crate) fn set_bounces(&mut self, bounces: u32) {
        self.bounces = bounces;
    }

    fn deactivate(&mut self) {
        if self.active {
            debug!("ball {} reached its bounce limit", self.id);
        }
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SimulationConfig {
        SimulationConfig::default()
    }

    /// an obstacle far from the ball positions used below
    fn out_of_the_way_obstacle() -> Obstacle {
        let mut obstacle = Obstacle::new(&RandomSource::seeded(0), &config());
        obstacle.set_origin(Point2::new(-0.55, -0.95));
        obstacle
    }

    #[test]
    fn test_right_wall_reflection_counts_one_bounce() {
        let now = Instant::now();
        let mut obstacle = out_of_the_way_obstacle();
        let mut ball = Ball::new(1, Point2::new(0.95, 0.5), Vec2::new(0.1, 0.), 0.1, [0.; 3], now);

        ball.update_step(&mut obstacle, now, &config());

        assert!(ball.get_vel().x < 0.);
        assert_eq!(ball.get_bounces(), 1);
        assert!(ball.is_active());
    }

    #[test]
    fn test_corner_reflection_counts_two_bounces() {
        let now = Instant::now();
        let mut obstacle = out_of_the_way_obstacle();
        let mut ball = Ball::new(1, Point2::new(0.95, 0.95), Vec2::new(0.1, 0.1), 0.1, [0.; 3], now);

        ball.update_step(&mut obstacle, now, &config());

        assert!(ball.get_vel().x < 0.);
        assert!(ball.get_vel().y < 0.);
        assert_eq!(ball.get_bounces(), 2);
    }

    #[test]
    fn test_no_double_count_while_still_past_the_wall() {
        let now = Instant::now();
        let mut obstacle = out_of_the_way_obstacle();
        let mut ball = Ball::new(1, Point2::new(0.95, 0.5), Vec2::new(0.1, 0.), 0.1, [0.; 3], now);

        ball.update_step(&mut obstacle, now, &config());
        // still overlapping the wall but moving away from it
        ball.update_step(&mut obstacle, now, &config());

        assert_eq!(ball.get_bounces(), 1);
    }

    #[test]
    fn test_bounces_never_exceed_limit_while_active() {
        let config = config();
        let now = Instant::now();
        let mut obstacle = out_of_the_way_obstacle();
        // cooling down for the whole test so it never sticks to the obstacle
        let mut ball = Ball::new(
            1,
            Point2::new(0.5, 0.5),
            Vec2::new(0.37, 0.29),
            0.1,
            [0.; 3],
            now + Duration::from_secs(3600),
        );

        let mut ticks_at_limit = 0;
        for _ in 0..10_000 {
            ball.update_step(&mut obstacle, now, &config);
            if !ball.is_active() {
                break;
            }
            assert!(ball.get_bounces() <= config.bounce_limit);
            if ball.get_bounces() == config.bounce_limit {
                ticks_at_limit += 1;
            }
        }
        assert!(!ball.is_active());
        assert_eq!(ball.get_bounces(), config.bounce_limit);
        assert_eq!(ticks_at_limit, 1);
    }

    #[test]
    fn test_corner_hit_on_last_bounce_stops_at_the_limit() {
        let config = config();
        let now = Instant::now();
        let mut obstacle = out_of_the_way_obstacle();
        let mut ball = Ball::new(1, Point2::new(0.95, 0.95), Vec2::new(0.1, 0.1), 0.1, [0.; 3], now);
        ball.set_bounces(config.bounce_limit - 1);

        ball.update_step(&mut obstacle, now, &config);
        assert_eq!(ball.get_bounces(), config.bounce_limit);
        assert!(ball.is_active());

        ball.update_step(&mut obstacle, now, &config);
        assert!(!ball.is_active());
        assert_eq!(ball.get_bounces(), config.bounce_limit);
    }

    #[test]
    fn test_last_bounce_into_the_obstacle_gets_caught() {
        let config = config();
        let now = Instant::now();
        let mut obstacle = Obstacle::new(&RandomSource::seeded(0), &config);
        obstacle.set_origin(Point2::new(0.6, 0.));
        let mut ball = Ball::new(1, Point2::new(0.95, 0.4), Vec2::new(0.1, 0.), 0.1, [0.; 3], now);
        ball.set_bounces(config.bounce_limit - 1);

        ball.update_step(&mut obstacle, now, &config);

        assert_eq!(ball.get_bounces(), config.bounce_limit);
        assert!(ball.is_active());
        assert!(ball.is_attached());
        assert!(obstacle.is_attached(1));

        // stuck to the obstacle it stays alive
        ball.update_step(&mut obstacle, now, &config);
        assert!(ball.is_active());
    }

    #[test]
    fn test_attached_ball_does_not_move() {
        let now = Instant::now();
        let mut obstacle = Obstacle::new(&RandomSource::seeded(0), &config());
        obstacle.set_origin(Point2::new(-0.2, -0.4));
        let mut ball = Ball::new(1, Point2::new(-0.28, 0.), Vec2::new(0.05, 0.), 0.1, [0.; 3], now);

        ball.update_step(&mut obstacle, now, &config());
        assert!(ball.is_attached());
        assert_eq!(ball.get_vel(), Vec2::zero());

        let pos = ball.get_pos();
        for _ in 0..10 {
            ball.update_step(&mut obstacle, now, &config());
        }
        assert_eq!(ball.get_pos(), pos);
        assert!(ball.is_active());
    }

    #[test]
    fn test_cooldown_prevents_attachment() {
        let now = Instant::now();
        let mut obstacle = Obstacle::new(&RandomSource::seeded(0), &config());
        obstacle.set_origin(Point2::new(-0.2, -0.4));
        let mut ball = Ball::new(1, Point2::new(-0.28, 0.), Vec2::new(0.05, 0.), 0.1, [0.; 3], now);
        ball.eject(Vec2::new(0.05, 0.), now + Duration::from_millis(400));

        ball.update_step(&mut obstacle, now + Duration::from_millis(399), &config());
        assert!(!ball.is_attached());
        assert_eq!(obstacle.attached_count(), 0);

        ball.update_step(&mut obstacle, now + Duration::from_millis(400), &config());
        assert!(ball.is_attached());
    }

    #[test]
    fn test_spawned_ball_rests_on_the_floor_and_goes_up() {
        let ball = Ball::spawn(9, &config(), &RandomSource::seeded(1), Instant::now());
        assert_eq!(ball.get_id(), 9);
        assert_eq!(ball.get_pos().x, 0.);
        assert!((ball.get_pos().y - -0.9).abs() < 1e-12);
        assert!(ball.get_vel().y >= 0.02 && ball.get_vel().y < 0.06);
        assert!(ball.get_vel().x >= -0.02 && ball.get_vel().x < 0.02);
        assert!(ball.get_color().iter().all(|c| (0. ..1.).contains(c)));
        assert!(ball.is_active() && !ball.is_attached());
    }
}
