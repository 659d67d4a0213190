//! State & projection (component A).
//!
//! Second-order constant-acceleration kinematics over a 9-element state.
//! `Vec3` is kept as a plain value type rather than `nalgebra::Vector3`
//! because the wire envelope and config surface address its components
//! by name (`position.x`, ...); `nalgebra` is still reached for in the
//! motion models and the augmented covariance math downstream.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn clamp_componentwise(self, min: Vec3, max: Vec3) -> Vec3 {
        Vec3::new(
            self.x.clamp(min.x, max.x),
            self.y.clamp(min.y, max.y),
            self.z.clamp(min.z, max.z),
        )
    }

    /// Scales the vector down to `max_magnitude` if it exceeds it; leaves it
    /// unchanged (including the zero vector) otherwise.
    pub fn clamp_magnitude(self, max_magnitude: f64) -> Vec3 {
        let mag = self.magnitude();
        if mag > max_magnitude && mag > 0.0 {
            self.scale(max_magnitude / mag)
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Plane {
    Xy,
    Xz,
    Yz,
}

impl Plane {
    pub fn as_str(self) -> &'static str {
        match self {
            Plane::Xy => "XY",
            Plane::Xz => "XZ",
            Plane::Yz => "YZ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection2D {
    pub x: f64,
    pub y: f64,
    pub plane: Plane,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct State9 {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub time: f64,
}

/// Second-order constant-acceleration integration over `dt`.
///
/// `position += velocity * dt + 0.5 * acceleration * dt^2`,
/// `velocity += acceleration * dt`, `time += dt`.
pub fn integrate(state: State9, dt: f64) -> State9 {
    let position = state
        .position
        .add(state.velocity.scale(dt))
        .add(state.acceleration.scale(0.5 * dt * dt));
    let velocity = state.velocity.add(state.acceleration.scale(dt));
    State9 {
        position,
        velocity,
        acceleration: state.acceleration,
        time: state.time + dt,
    }
}

pub fn project_xy(state: State9) -> Projection2D {
    Projection2D {
        x: state.position.x,
        y: state.position.y,
        plane: Plane::Xy,
    }
}

pub fn project_xz(state: State9) -> Projection2D {
    Projection2D {
        x: state.position.x,
        y: state.position.z,
        plane: Plane::Xz,
    }
}

pub fn project_yz(state: State9) -> Projection2D {
    Projection2D {
        x: state.position.y,
        y: state.position.z,
        plane: Plane::Yz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_integration_scenario() {
        let s = State9 {
            position: Vec3::new(0.0, 0.0, 0.0),
            velocity: Vec3::new(10.0, -5.0, 2.0),
            acceleration: Vec3::new(1.0, 0.0, -1.0),
            time: 0.0,
        };
        let next = integrate(s, 2.0);
        assert_eq!(next.position, Vec3::new(22.0, -10.0, 2.0));
        assert_eq!(next.velocity, Vec3::new(12.0, -5.0, 0.0));
        assert_eq!(next.time, 2.0);

        let proj = project_xy(next);
        assert_eq!(proj.x, 22.0);
        assert_eq!(proj.y, -10.0);
        assert_eq!(proj.plane.as_str(), "XY");
    }

    #[test]
    fn integrate_preserves_acceleration() {
        let s = State9 {
            acceleration: Vec3::new(1.0, 2.0, 3.0),
            ..Default::default()
        };
        let next = integrate(s, 1.0);
        assert_eq!(next.acceleration, s.acceleration);
    }

    #[test]
    fn clamp_magnitude_leaves_slow_vectors_alone() {
        let v = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(v.clamp_magnitude(10.0), v);
    }

    #[test]
    fn clamp_magnitude_scales_down_fast_vectors() {
        let v = Vec3::new(10.0, 0.0, 0.0);
        let clamped = v.clamp_magnitude(5.0);
        assert!((clamped.magnitude() - 5.0).abs() < 1e-9);
    }
}
