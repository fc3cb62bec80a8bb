use super::point::Point2;
use serde::{Deserialize, Serialize};

/// Axis aligned rectangle, `min` is the bottom left corner and `max` the top right one.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    min: Point2,
    max: Point2,
}

impl Rect {
    pub fn new(p1: Point2, p2: Point2) -> Self {
        let min_x = p1.x.min(p2.x);
        let max_x = p1.x.max(p2.x);
        let min_y = p1.y.min(p2.y);
        let max_y = p1.y.max(p2.y);

        Self {
            min: Point2::new(min_x, min_y),
            max: Point2::new(max_x, max_y),
        }
    }

    /// bounding box of a circle
    pub fn around(center: Point2, radius: f64) -> Self {
        Self::new(
            Point2::new(center.x - radius, center.y - radius),
            Point2::new(center.x + radius, center.y + radius),
        )
    }

    pub fn min(&self) -> Point2 {
        self.min
    }

    pub fn max(&self) -> Point2 {
        self.max
    }

    pub fn center(&self) -> Point2 {
        Point2::new(
            (self.min.x + self.max.x) / 2.,
            (self.min.y + self.max.y) / 2.,
        )
    }

    /// true if the two rectangles share some area, touching edges don't count
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}
