//! Planar geometry used by bridges and coordinate-transform externals.
//!
//! Angles are in degrees, measured counter-clockwise from the +x axis.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    /// Unit vector pointing along `degrees`.
    pub fn from_angle(degrees: f32) -> Self {
        let rad = degrees.to_radians();
        Vec2::new(rad.cos(), rad.sin())
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    /// Direction of this vector in degrees, normalized to `[0, 360)`.
    pub fn angle(self) -> f32 {
        normalize_angle(self.y.atan2(self.x).to_degrees())
    }

    pub fn scale(self, factor: f32) -> Self {
        Vec2::new(self.x * factor, self.y * factor)
    }

    fn rotate(self, degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Vec2::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Position and heading of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    /// Heading in degrees, `[0, 360)`.
    pub heading: f32,
}

impl Transform {
    pub const fn new(position: Vec2, heading: f32) -> Self {
        Transform { position, heading }
    }

    /// World-space point expressed in this entity's local frame
    /// (+x forward, +y left).
    pub fn to_local(&self, world: Vec2) -> Vec2 {
        (world - self.position).rotate(-self.heading)
    }

    /// Local-frame point expressed in world space.
    pub fn to_world(&self, local: Vec2) -> Vec2 {
        local.rotate(self.heading) + self.position
    }

    /// World-space bearing from this entity to `target`.
    pub fn bearing_to(&self, target: Vec2) -> f32 {
        (target - self.position).angle()
    }
}

/// Wraps an angle into `[0, 360)`.
pub fn normalize_angle(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in `(-180, 180]`.
pub fn angle_difference(from: f32, to: f32) -> f32 {
    let diff = normalize_angle(to - from);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Rotates `current` toward `target` by at most `max_delta` degrees.
pub fn move_towards_angle(current: f32, target: f32, max_delta: f32) -> f32 {
    let diff = angle_difference(current, target);
    if diff.abs() <= max_delta {
        normalize_angle(target)
    } else {
        normalize_angle(current + max_delta.copysign(diff))
    }
}
