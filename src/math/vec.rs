use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

#[derive(Deserialize, Serialize, PartialEq, Clone, Copy, Debug, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// vector of length `norm` pointing at `angle` radians (counter clockwise from +x)
    pub fn from_angle(angle: f64, norm: f64) -> Self {
        Self::new(angle.cos() * norm, angle.sin() * norm)
    }

    pub fn norm(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2)).sqrt()
    }

    /// angle in radians, in ]-pi, pi]
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_from_angle() {
        let v = Vec2::from_angle(FRAC_PI_2, 2.);
        assert!(v.x.abs() < 1e-12);
        assert!((v.y - 2.).abs() < 1e-12);
        assert!((v.norm() - 2.).abs() < 1e-12);
        assert!((v.angle() - FRAC_PI_2).abs() < 1e-12);
    }
}
