//! Sensor model (component C).
//!
//! Rate-gated sampling with dropout, false positives, and health
//! bookkeeping. The source's `SensorBase` inheritance hierarchy is
//! replaced by a tagged `SensorKind` variant carrying each concrete
//! sensor's private state (bias, drift); rate-gating, dropout, and health
//! bookkeeping are a single shared helper (`Sensor::sample`) invoked
//! regardless of kind, per the variants-over-inheritance design.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::state::{State9, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Operational,
    Simulation,
    Test,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub position: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub range: Option<f64>,
    pub bearing: Option<f64>,
    pub valid: bool,
    pub provenance: Option<Provenance>,
}

impl Measurement {
    fn invalid() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub available: bool,
    pub healthy: bool,
    pub missed_updates: u32,
    pub last_error: String,
    pub time_since_last_valid: f64,
    pub confidence: f64,
    pub has_measurement: bool,
    pub last_measurement: Option<Measurement>,
    pub last_measurement_time: f64,
}

impl SensorStatus {
    pub fn new() -> Self {
        Self {
            available: true,
            healthy: true,
            confidence: 1.0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub rate_hz: f64,
    pub noise_std: f64,
    pub dropout_probability: f64,
    pub false_positive_probability: f64,
    pub max_range: f64,
}

impl SensorConfig {
    pub fn is_valid(&self) -> bool {
        self.rate_hz > 0.0
            && (0.0..=1.0).contains(&self.dropout_probability)
            && (0.0..=1.0).contains(&self.false_positive_probability)
            && self.max_range >= 0.0
    }
}

/// Per-kind state a concrete sensor carries between samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorKind {
    Gps { bias: Vec3 },
    Thermal,
    DeadReckoning { drift: Vec3 },
    Imu { bias: Vec3 },
    Radar,
}

impl SensorKind {
    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::Gps { .. } => "gps",
            SensorKind::Thermal => "thermal",
            SensorKind::DeadReckoning { .. } => "dead_reckoning",
            SensorKind::Imu { .. } => "imu",
            SensorKind::Radar => "radar",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    pub kind: SensorKind,
    pub config: SensorConfig,
    pub status: SensorStatus,
    time_accumulator: f64,
}

impl Sensor {
    pub fn new(name: impl Into<String>, kind: SensorKind, config: SensorConfig) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
            status: SensorStatus::new(),
            time_accumulator: 0.0,
        }
    }

    fn record_failure(&mut self, reason: &str) {
        self.status.missed_updates += 1;
        self.status.healthy = false;
        reason.clone_into(&mut self.status.last_error);
        self.status.has_measurement = false;
        self.status.confidence = 0.0;
    }

    fn record_success(&mut self, measurement: Measurement, elapsed: f64) {
        self.status.missed_updates = 0;
        self.status.healthy = true;
        self.status.last_error.clear();
        self.status.has_measurement = true;
        self.status.last_measurement = Some(measurement);
        self.status.last_measurement_time += elapsed;
        self.status.time_since_last_valid = 0.0;
        self.status.confidence = 1.0;
    }

    /// Rate-gates, then applies dropout/false-positive bookkeeping, and
    /// finally delegates to the kind-specific generator. Shared by every
    /// `SensorKind` so health accounting cannot drift between variants.
    pub fn sample(&mut self, state: State9, dt: f64, rng: &mut impl Rng) -> Measurement {
        self.time_accumulator += dt;
        let period = if self.config.rate_hz > 0.0 {
            1.0 / self.config.rate_hz
        } else {
            dt
        };
        if self.time_accumulator < period {
            self.status.time_since_last_valid += dt;
            return Measurement::invalid();
        }
        let elapsed = self.time_accumulator;
        self.time_accumulator = 0.0;

        if !self.status.available || rng.gen_bool(self.config.dropout_probability.clamp(0.0, 1.0)) {
            self.record_failure("dropout");
            self.status.time_since_last_valid += elapsed;
            return Measurement::invalid();
        }

        let measurement = self.generate_measurement(state, rng);
        if !measurement.valid {
            let reason = "invalid_measurement".to_string();
            self.record_failure(&reason);
            self.status.time_since_last_valid += elapsed;
        } else {
            self.record_success(measurement, elapsed);
        }
        measurement
    }

    fn false_positive(&self, rng: &mut impl Rng) -> bool {
        rng.gen_bool(self.config.false_positive_probability.clamp(0.0, 1.0))
    }

    fn generate_measurement(&mut self, state: State9, rng: &mut impl Rng) -> Measurement {
        let noise = Normal::new(0.0, self.config.noise_std.max(0.0))
            .expect("noise_std must be finite and non-negative");
        let mut sample_vec3 = |base: Vec3| -> Vec3 {
            Vec3::new(
                base.x + noise.sample(rng),
                base.y + noise.sample(rng),
                base.z + noise.sample(rng),
            )
        };

        match self.kind {
            SensorKind::Gps { mut bias } => {
                bias = bias.add(Vec3::new(0.001, 0.001, 0.0));
                let false_positive = self.false_positive(rng);
                self.kind = SensorKind::Gps { bias };
                let position = if false_positive {
                    sample_vec3(state.position).add(Vec3::new(500.0, 500.0, 0.0))
                } else {
                    sample_vec3(state.position.add(bias))
                };
                Measurement {
                    position: Some(position),
                    valid: true,
                    provenance: Some(Provenance::Simulation),
                    ..Default::default()
                }
            }
            SensorKind::Thermal => {
                if state.position.magnitude() > self.config.max_range {
                    return Measurement::default();
                }
                if self.false_positive(rng) {
                    return Measurement {
                        position: Some(sample_vec3(state.position).add(Vec3::new(0.0, 0.0, 250.0))),
                        valid: true,
                        provenance: Some(Provenance::Simulation),
                        ..Default::default()
                    };
                }
                Measurement {
                    position: Some(sample_vec3(state.position)),
                    valid: true,
                    provenance: Some(Provenance::Simulation),
                    ..Default::default()
                }
            }
            SensorKind::DeadReckoning { mut drift } => {
                drift = drift.add(Vec3::new(0.01, 0.01, 0.01));
                self.kind = SensorKind::DeadReckoning { drift };
                Measurement {
                    position: Some(state.position.add(drift)),
                    valid: true,
                    provenance: Some(Provenance::Simulation),
                    ..Default::default()
                }
            }
            SensorKind::Imu { mut bias } => {
                bias = bias.add(Vec3::new(0.0, 0.0, 0.0005));
                self.kind = SensorKind::Imu { bias };
                Measurement {
                    velocity: Some(sample_vec3(state.velocity.add(bias))),
                    valid: true,
                    provenance: Some(Provenance::Simulation),
                    ..Default::default()
                }
            }
            SensorKind::Radar => {
                let range = state.position.magnitude();
                if range > self.config.max_range {
                    return Measurement::default();
                }
                let bearing = state.position.y.atan2(state.position.x);
                Measurement {
                    range: Some(range + noise.sample(rng)),
                    bearing: Some(bearing + noise.sample(rng) * 0.01),
                    valid: true,
                    provenance: Some(Provenance::Simulation),
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config() -> SensorConfig {
        SensorConfig {
            rate_hz: 10.0,
            noise_std: 0.5,
            dropout_probability: 0.0,
            false_positive_probability: 0.0,
            max_range: 1000.0,
        }
    }

    #[test]
    fn rate_gating_withholds_measurements_between_periods() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut sensor = Sensor::new("gps", SensorKind::Gps { bias: Vec3::ZERO }, config());
        let state = State9::default();
        let m = sensor.sample(state, 0.01, &mut rng);
        assert!(!m.valid, "period is 0.1s, a 0.01s tick should not yet produce a measurement");
    }

    #[test]
    fn healthy_sample_resets_missed_updates() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut sensor = Sensor::new("gps", SensorKind::Gps { bias: Vec3::ZERO }, config());
        let state = State9::default();
        let m = sensor.sample(state, 0.1, &mut rng);
        assert!(m.valid);
        assert_eq!(sensor.status.missed_updates, 0);
        assert!(sensor.status.healthy);
        assert!(sensor.status.has_measurement);
    }

    #[test]
    fn dropout_marks_unhealthy_with_reason() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut cfg = config();
        cfg.dropout_probability = 1.0;
        let mut sensor = Sensor::new("gps", SensorKind::Gps { bias: Vec3::ZERO }, cfg);
        let state = State9::default();
        let m = sensor.sample(state, 0.1, &mut rng);
        assert!(!m.valid);
        assert!(!sensor.status.healthy);
        assert_eq!(sensor.status.last_error, "dropout");
        assert_eq!(sensor.status.missed_updates, 1);
    }

    #[test]
    fn thermal_out_of_range_is_invalid() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut cfg = config();
        cfg.max_range = 10.0;
        let mut sensor = Sensor::new("thermal", SensorKind::Thermal, cfg);
        let state = State9 {
            position: Vec3::new(100.0, 0.0, 0.0),
            ..Default::default()
        };
        let m = sensor.sample(state, 0.1, &mut rng);
        assert!(!m.valid);
    }

    #[test]
    fn radar_reports_range_and_bearing() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut sensor = Sensor::new("radar", SensorKind::Radar, config());
        let state = State9 {
            position: Vec3::new(30.0, 40.0, 0.0),
            ..Default::default()
        };
        let m = sensor.sample(state, 0.1, &mut rng);
        assert!(m.valid);
        assert!(m.range.is_some());
        assert!(m.bearing.is_some());
    }
}
