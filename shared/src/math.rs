use serde::{Deserialize, Serialize};

/// Represents a vector in 2D world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector2 {
    /// Value along the x-axis.
    pub x: f32,
    /// Value along the y-axis.
    /// Positive direction is down, matching screen coordinates.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    /// Unit vector pointing along `angle` (radians), scaled to `length`.
    pub fn from_angle(angle: f32, length: f32) -> Self {
        Vector2 {
            x: angle.cos() * length,
            y: angle.sin() * length,
        }
    }

    /// Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    /// Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Returns the vector scaled down to `max` if it is longer.
    pub fn clamp_length(&self, max: f32) -> Vector2 {
        let mag = self.magnitude();
        if mag > max && mag > 0.0 {
            self.scale(max / mag)
        } else {
            *self
        }
    }

    pub fn distance_to(&self, other: &Vector2) -> f32 {
        distance(self, other)
    }
}

pub fn distance(a: &Vector2, b: &Vector2) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

pub fn angle_between(from: &Vector2, to: &Vector2) -> f32 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// Clamps a position into the `[0, size]` square.
pub fn clamp_to_world(position: Vector2, size: f32) -> Vector2 {
    Vector2 {
        x: position.x.clamp(0.0, size),
        y: position.y.clamp(0.0, size),
    }
}

pub fn in_world(position: &Vector2, size: f32) -> bool {
    (0.0..=size).contains(&position.x) && (0.0..=size).contains(&position.y)
}
