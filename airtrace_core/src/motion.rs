//! Motion models (component B).
//!
//! Four maneuver models step a `State9` under bounds, consuming from a
//! caller-supplied seeded RNG. Draw order matters: every model that samples
//! noise does so through the same helper so the sequence of draws is
//! reproducible from a given seed, per the determinism contract.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::state::{integrate, State9, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionModelType {
    ConstantVelocity,
    ConstantAcceleration,
    CoordinatedTurn,
    RandomManeuver,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionBounds {
    pub min_position: Vec3,
    pub max_position: Vec3,
    pub max_speed: f64,
    pub max_accel: f64,
    pub max_turn_rate_deg: f64,
}

impl MotionBounds {
    /// `min_pos <= max_pos` componentwise; speed/accel bounds positive;
    /// turn rate within a full circle.
    pub fn is_valid(&self) -> bool {
        self.min_position.x <= self.max_position.x
            && self.min_position.y <= self.max_position.y
            && self.min_position.z <= self.max_position.z
            && self.max_speed > 0.0
            && self.max_accel > 0.0
            && (0.0..=360.0).contains(&self.max_turn_rate_deg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManeuverParams {
    pub random_accel_std: f64,
    pub maneuver_probability: f64,
}

fn clamp_state(mut state: State9, bounds: &MotionBounds) -> State9 {
    state.velocity = state.velocity.clamp_magnitude(bounds.max_speed);
    state.acceleration = state.acceleration.clamp_magnitude(bounds.max_accel);
    state.position = state
        .position
        .clamp_componentwise(bounds.min_position, bounds.max_position);
    state
}

/// Rotates the horizontal (x/y) velocity heading by `turn_rate_deg` per
/// second, leaving its magnitude and the vertical component untouched.
fn apply_turn(mut state: State9, turn_rate_deg: f64, dt: f64) -> State9 {
    let turn_rate_rad = turn_rate_deg * std::f64::consts::PI / 180.0;
    let speed_xy = (state.velocity.x * state.velocity.x + state.velocity.y * state.velocity.y).sqrt();
    let heading = state.velocity.y.atan2(state.velocity.x) + turn_rate_rad * dt;
    state.velocity.x = speed_xy * heading.cos();
    state.velocity.y = speed_xy * heading.sin();
    state
}

/// Advances `state` by `dt` under `model`, applying bounds and (for
/// `RandomManeuver`) sampling acceleration noise from `rng`.
pub fn step_motion_model(
    state: State9,
    model: MotionModelType,
    dt: f64,
    bounds: &MotionBounds,
    params: &ManeuverParams,
    rng: &mut impl Rng,
) -> State9 {
    let mut working = state;
    match model {
        MotionModelType::ConstantVelocity => {
            working.acceleration = Vec3::ZERO;
        }
        MotionModelType::ConstantAcceleration => {}
        MotionModelType::CoordinatedTurn => {
            working = apply_turn(working, bounds.max_turn_rate_deg, dt);
            working.acceleration = Vec3::ZERO;
        }
        MotionModelType::RandomManeuver => {
            if rng.gen_bool(params.maneuver_probability.clamp(0.0, 1.0)) {
                let normal = Normal::new(0.0, params.random_accel_std.max(0.0))
                    .expect("random_accel_std must be finite and non-negative");
                working.acceleration = Vec3::new(
                    normal.sample(rng),
                    normal.sample(rng),
                    normal.sample(rng),
                );
            }
        }
    }

    let integrated = integrate(working, dt);
    clamp_state(integrated, bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn bounds() -> MotionBounds {
        MotionBounds {
            min_position: Vec3::new(-1000.0, -1000.0, -1000.0),
            max_position: Vec3::new(1000.0, 1000.0, 1000.0),
            max_speed: 50.0,
            max_accel: 10.0,
            max_turn_rate_deg: 90.0,
        }
    }

    fn params() -> ManeuverParams {
        ManeuverParams {
            random_accel_std: 3.0,
            maneuver_probability: 0.35,
        }
    }

    #[test]
    fn constant_velocity_zeroes_acceleration() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let s = State9 {
            velocity: Vec3::new(5.0, 0.0, 0.0),
            acceleration: Vec3::new(2.0, 0.0, 0.0),
            ..Default::default()
        };
        let next = step_motion_model(s, MotionModelType::ConstantVelocity, 1.0, &bounds(), &params(), &mut rng);
        assert_eq!(next.acceleration, Vec3::ZERO);
    }

    #[test]
    fn coordinated_turn_rotates_heading_and_zeroes_accel() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let s = State9 {
            velocity: Vec3::new(10.0, 0.0, 0.0),
            ..Default::default()
        };
        let next = step_motion_model(s, MotionModelType::CoordinatedTurn, 1.0, &bounds(), &params(), &mut rng);
        assert_eq!(next.acceleration, Vec3::ZERO);
        assert!(next.velocity.y.abs() > 0.0, "turn should introduce lateral velocity");
        assert!((next.velocity.magnitude() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn bounds_clamp_speed_and_position() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let s = State9 {
            position: Vec3::new(999.0, 0.0, 0.0),
            velocity: Vec3::new(1000.0, 0.0, 0.0),
            ..Default::default()
        };
        let next = step_motion_model(s, MotionModelType::ConstantAcceleration, 1.0, &bounds(), &params(), &mut rng);
        assert!(next.velocity.magnitude() <= bounds().max_speed + 1e-9);
        assert!(next.position.x <= bounds().max_position.x);
    }

    #[test]
    fn random_maneuver_is_deterministic_given_seed() {
        let bounds = bounds();
        let params = params();
        let s = State9 {
            velocity: Vec3::new(1.0, 1.0, 0.0),
            ..Default::default()
        };
        let mut rng_a = ChaCha8Rng::seed_from_u64(42);
        let mut rng_b = ChaCha8Rng::seed_from_u64(42);
        let next_a = step_motion_model(s, MotionModelType::RandomManeuver, 0.1, &bounds, &params, &mut rng_a);
        let next_b = step_motion_model(s, MotionModelType::RandomManeuver, 0.1, &bounds, &params, &mut rng_b);
        assert_eq!(next_a, next_b);
    }
}
