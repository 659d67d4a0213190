//! Mode ladder state machine (component D, §4.1).
//!
//! Scans a configured ladder of candidate tracking modes each tick and
//! selects the first eligible entry, applying dwell hysteresis to resist
//! upgrade thrash and lockout/disagreement bookkeeping per sensor.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ModeDenial;
use crate::sensors::{Provenance, Sensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingMode {
    Gps,
    GpsIns,
    Vio,
    Lio,
    RadarInertial,
    Thermal,
    Radar,
    Vision,
    Lidar,
    MagBaro,
    Magnetometer,
    Baro,
    Celestial,
    DeadReckoning,
    Inertial,
    Hold,
}

impl TrackingMode {
    pub fn name(self) -> &'static str {
        match self {
            TrackingMode::Gps => "gps",
            TrackingMode::GpsIns => "gps_ins",
            TrackingMode::Vio => "vio",
            TrackingMode::Lio => "lio",
            TrackingMode::RadarInertial => "radar_inertial",
            TrackingMode::Thermal => "thermal",
            TrackingMode::Radar => "radar",
            TrackingMode::Vision => "vision",
            TrackingMode::Lidar => "lidar",
            TrackingMode::MagBaro => "mag_baro",
            TrackingMode::Magnetometer => "magnetometer",
            TrackingMode::Baro => "baro",
            TrackingMode::Celestial => "celestial",
            TrackingMode::DeadReckoning => "dead_reckoning",
            TrackingMode::Inertial => "imu",
            TrackingMode::Hold => "hold",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "gps" => TrackingMode::Gps,
            "gps_ins" => TrackingMode::GpsIns,
            "vio" => TrackingMode::Vio,
            "lio" => TrackingMode::Lio,
            "radar_inertial" => TrackingMode::RadarInertial,
            "thermal" => TrackingMode::Thermal,
            "radar" => TrackingMode::Radar,
            "vision" => TrackingMode::Vision,
            "lidar" => TrackingMode::Lidar,
            "mag_baro" => TrackingMode::MagBaro,
            "magnetometer" => TrackingMode::Magnetometer,
            "baro" => TrackingMode::Baro,
            "celestial" => TrackingMode::Celestial,
            "dead_reckoning" => TrackingMode::DeadReckoning,
            "imu" => TrackingMode::Inertial,
            "hold" => TrackingMode::Hold,
            _ => return None,
        })
    }

    /// The required sensor this mode depends on, or `None` for modes (like
    /// `Hold`) that draw on no sensor. Single-required-sensor modes cover
    /// every mode this core actually arbitrates between; fused multi-sensor
    /// modes are a `PathCalculator`-layer concern out of scope here.
    fn required_sensor(self) -> Option<&'static str> {
        match self {
            TrackingMode::Gps | TrackingMode::GpsIns => Some("gps"),
            TrackingMode::Thermal => Some("thermal"),
            TrackingMode::Radar | TrackingMode::RadarInertial => Some("radar"),
            TrackingMode::DeadReckoning => Some("dead_reckoning"),
            TrackingMode::Inertial => Some("imu"),
            TrackingMode::Vio
            | TrackingMode::Lio
            | TrackingMode::Vision
            | TrackingMode::Lidar
            | TrackingMode::MagBaro
            | TrackingMode::Magnetometer
            | TrackingMode::Baro
            | TrackingMode::Celestial => None,
            TrackingMode::Hold => None,
        }
    }

    fn is_celestial(self) -> bool {
        matches!(self, TrackingMode::Celestial)
    }
}

/// Canonical default ladder order, populated when the config loader finds
/// `mode.ladder_order` empty.
pub fn default_ladder_order() -> Vec<TrackingMode> {
    use TrackingMode::*;
    vec![
        GpsIns, Gps, Vio, Lio, RadarInertial, Vision, Lidar, Radar, Thermal, MagBaro,
        Magnetometer, Baro, Celestial, DeadReckoning, Inertial, Hold,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub required: bool,
    pub verified: bool,
    pub allowed_modes: HashSet<String>,
}

impl Default for Authorization {
    fn default() -> Self {
        Self {
            required: false,
            verified: false,
            allowed_modes: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnknownProvenanceAction {
    Deny,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeLadderConfig {
    pub ladder_order: Vec<TrackingMode>,
    pub permitted_sensors: HashSet<String>,
    pub min_healthy_count: u32,
    pub min_dwell_steps: u32,
    pub max_data_age_seconds: f64,
    pub min_confidence: f64,
    pub max_stale_count: u32,
    pub max_low_confidence_count: u32,
    pub lockout_steps: u32,
    pub max_disagreement_count: u32,
    pub disagreement_threshold: f64,
    pub max_residual_age_seconds: f64,
    pub authorization: Authorization,
    pub allowed_provenances: HashSet<Provenance>,
    pub provenance_allow_mixed: bool,
    pub provenance_unknown_action: UnknownProvenanceAction,
    pub celestial_allowed: bool,
    pub celestial_dataset_available: bool,
}

impl Default for ModeLadderConfig {
    fn default() -> Self {
        Self {
            ladder_order: default_ladder_order(),
            permitted_sensors: HashSet::new(),
            min_healthy_count: 1,
            min_dwell_steps: 0,
            max_data_age_seconds: 1.0,
            min_confidence: 0.0,
            max_stale_count: u32::MAX,
            max_low_confidence_count: u32::MAX,
            lockout_steps: 0,
            max_disagreement_count: u32::MAX,
            disagreement_threshold: f64::INFINITY,
            max_residual_age_seconds: f64::INFINITY,
            authorization: Authorization::default(),
            allowed_provenances: HashSet::new(),
            provenance_allow_mixed: true,
            provenance_unknown_action: UnknownProvenanceAction::Deny,
            celestial_allowed: false,
            celestial_dataset_available: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeDecision {
    pub mode: TrackingMode,
    pub reason: String,
    pub downgrade_reason: String,
    pub contributors: Vec<String>,
    pub confidence: f64,
    pub disqualified_sources: Vec<(String, String, String)>,
    pub lockouts: Vec<(String, u32, String)>,
}

impl Default for TrackingMode {
    fn default() -> Self {
        TrackingMode::Hold
    }
}

#[derive(Debug, Clone, Default)]
struct SensorBookkeeping {
    healthy_count: u32,
    stale_count: u32,
    low_conf_count: u32,
    lockout_remaining: u32,
    disagreement_count: u32,
}

/// Private per-sensor bookkeeping plus the current mode, carried across
/// ticks. Owned exclusively by the ladder; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct ModeLadder {
    config: ModeLadderConfig,
    bookkeeping: HashMap<String, SensorBookkeeping>,
    current_mode: TrackingMode,
    dwell_counter: u32,
}

impl ModeLadder {
    pub fn new(config: ModeLadderConfig) -> Self {
        Self {
            config,
            bookkeeping: HashMap::new(),
            current_mode: TrackingMode::Hold,
            dwell_counter: 0,
        }
    }

    fn ladder_position(&self, mode: TrackingMode) -> Option<usize> {
        self.config.ladder_order.iter().position(|m| *m == mode)
    }

    fn update_bookkeeping(&mut self, sensors: &[Sensor]) {
        for sensor in sensors {
            let entry = self.bookkeeping.entry(sensor.name.clone()).or_default();
            let fresh = sensor.status.healthy
                && sensor.status.time_since_last_valid <= self.config.max_data_age_seconds
                && sensor.status.confidence >= self.config.min_confidence;
            entry.healthy_count = if fresh { entry.healthy_count + 1 } else { 0 };

            entry.stale_count = if sensor.status.time_since_last_valid > self.config.max_data_age_seconds {
                entry.stale_count + 1
            } else {
                0
            };

            entry.low_conf_count = if sensor.status.confidence < self.config.min_confidence {
                entry.low_conf_count + 1
            } else {
                0
            };

            if entry.lockout_remaining > 0 {
                entry.lockout_remaining -= 1;
            } else if entry.stale_count >= self.config.max_stale_count
                || entry.low_conf_count >= self.config.max_low_confidence_count
            {
                entry.lockout_remaining = self.config.lockout_steps;
            }
        }

        // Pairwise residual against every other sensor reporting a fresh position
        // this tick; a sensor with no position or no fresh peer is left unchanged.
        for sensor in sensors {
            let Some(position) = sensor.status.last_measurement.and_then(|m| m.position) else {
                continue;
            };
            let max_residual = sensors
                .iter()
                .filter(|other| other.name != sensor.name)
                .filter(|other| other.status.time_since_last_valid <= self.config.max_residual_age_seconds)
                .filter_map(|other| other.status.last_measurement.and_then(|m| m.position))
                .map(|other_position| position.sub(other_position).magnitude())
                .fold(None::<f64>, |max_so_far, residual| {
                    Some(max_so_far.map_or(residual, |current| current.max(residual)))
                });

            let Some(max_residual) = max_residual else {
                continue;
            };
            let entry = self.bookkeeping.entry(sensor.name.clone()).or_default();
            if max_residual > self.config.disagreement_threshold
                && sensor.status.time_since_last_valid <= self.config.max_residual_age_seconds
            {
                entry.disagreement_count += 1;
            } else {
                entry.disagreement_count = 0;
            }
        }
    }

    fn sensor_provenance_ok(&self, sensor: &Sensor) -> bool {
        let provenance = sensor
            .status
            .last_measurement
            .and_then(|m| m.provenance)
            .unwrap_or(Provenance::Unknown);
        match provenance {
            Provenance::Unknown => matches!(self.config.provenance_unknown_action, UnknownProvenanceAction::Hold)
                || self.config.allowed_provenances.contains(&Provenance::Unknown),
            other => self.config.allowed_provenances.is_empty() || self.config.allowed_provenances.contains(&other),
        }
    }

    fn sensor_eligible(&self, sensor: &Sensor) -> Result<(), ModeDenial> {
        if !self.config.permitted_sensors.is_empty() && !self.config.permitted_sensors.contains(&sensor.name) {
            return Err(ModeDenial::NoSensors);
        }
        let bookkeeping = self.bookkeeping.get(&sensor.name).cloned().unwrap_or_default();
        if bookkeeping.lockout_remaining > 0 {
            return Err(ModeDenial::Lockout);
        }
        if bookkeeping.healthy_count < self.config.min_healthy_count {
            return Err(ModeDenial::NoSensors);
        }
        if !self.sensor_provenance_ok(sensor) {
            return Err(ModeDenial::ProvenanceDenied);
        }
        Ok(())
    }

    fn mode_eligible(&self, mode: TrackingMode, sensors: &[Sensor]) -> Result<Vec<String>, ModeDenial> {
        if mode == TrackingMode::Hold {
            return Ok(Vec::new());
        }
        if mode.is_celestial() && !(self.config.celestial_allowed && self.config.celestial_dataset_available) {
            return Err(ModeDenial::ProvenanceDenied);
        }
        if self.config.authorization.required {
            if !self.config.authorization.verified
                || !self.config.authorization.allowed_modes.contains(mode.name())
            {
                return Err(ModeDenial::AuthDenied);
            }
        }
        let Some(required_name) = mode.required_sensor() else {
            return Err(ModeDenial::NoSensors);
        };
        let Some(sensor) = sensors.iter().find(|s| s.name == required_name) else {
            return Err(ModeDenial::NoSensors);
        };
        self.sensor_eligible(sensor)?;

        let mut contributors = vec![sensor.name.clone()];
        let provenances: HashSet<Provenance> = contributors
            .iter()
            .filter_map(|name| sensors.iter().find(|s| &s.name == name))
            .filter_map(|s| s.status.last_measurement.and_then(|m| m.provenance))
            .collect();
        if provenances.len() > 1 && !self.config.provenance_allow_mixed {
            return Err(ModeDenial::ProvenanceDenied);
        }

        let bookkeeping = self.bookkeeping.get(&sensor.name).cloned().unwrap_or_default();
        if bookkeeping.disagreement_count > self.config.max_disagreement_count {
            return Err(ModeDenial::Disagreement);
        }

        contributors.sort();
        Ok(contributors)
    }

    /// Scans the configured ladder and returns the decision for this tick.
    /// Never fails: every branch resolves to a concrete `ModeDecision`.
    pub fn decide(&mut self, sensors: &[Sensor]) -> ModeDecision {
        self.update_bookkeeping(sensors);

        let mut disqualified = Vec::new();
        let mut first_eligible: Option<(TrackingMode, Vec<String>)> = None;
        let mut auth_blocked_all = true;
        let mut any_provenance_pass = false;

        for &mode in &self.config.ladder_order {
            match self.mode_eligible(mode, sensors) {
                Ok(contributors) => {
                    if mode != TrackingMode::Hold {
                        auth_blocked_all = false;
                        any_provenance_pass = true;
                    }
                    if first_eligible.is_none() {
                        first_eligible = Some((mode, contributors));
                    }
                }
                Err(reason) => {
                    if !matches!(reason, ModeDenial::AuthDenied) {
                        auth_blocked_all = false;
                    }
                    if !matches!(reason, ModeDenial::ProvenanceDenied) {
                        any_provenance_pass = true;
                    }
                    disqualified.push((mode.name().to_string(), mode.required_sensor().unwrap_or("").to_string(), reason.to_string()));
                }
            }
        }
        // Hold is always eligible and terminal-safe.
        let (selected_mode, contributors, base_reason) = match first_eligible {
            Some((mode, contributors)) if mode != TrackingMode::Hold => (mode, contributors, String::new()),
            _ => {
                let reason = if !any_provenance_pass {
                    "provenance_denied"
                } else if auth_blocked_all {
                    "auth_denied"
                } else {
                    "no_sensors"
                };
                (TrackingMode::Hold, Vec::new(), reason.to_string())
            }
        };

        let lockouts: Vec<(String, u32, String)> = self
            .bookkeeping
            .iter()
            .filter(|(_, bk)| bk.lockout_remaining > 0)
            .map(|(name, bk)| (name.clone(), bk.lockout_remaining, "lockout".to_string()))
            .collect();

        let confidence = contributors
            .iter()
            .filter_map(|name| sensors.iter().find(|s| &s.name == name))
            .map(|s| s.status.confidence)
            .fold(1.0_f64, f64::min);
        let confidence = if contributors.is_empty() { 0.0 } else { confidence };

        let reason = self.apply_selection_policy(selected_mode, &base_reason, sensors);

        ModeDecision {
            mode: selected_mode,
            downgrade_reason: if reason.starts_with("downgrade_") { reason.clone() } else { String::new() },
            reason,
            contributors,
            confidence,
            disqualified_sources: disqualified,
            lockouts,
        }
    }

    fn apply_selection_policy(&mut self, candidate: TrackingMode, hold_reason: &str, sensors: &[Sensor]) -> String {
        if candidate == self.current_mode {
            self.dwell_counter = self.dwell_counter.saturating_add(1);
            return if candidate == TrackingMode::Hold {
                hold_reason.to_string()
            } else {
                format!("maintain_{}", candidate.name())
            };
        }

        // Initial state is Hold; the first eligible ladder position is always
        // entered without dwell, same as returning to Hold and re-acquiring later.
        let entering_from_hold = self.current_mode == TrackingMode::Hold;
        let current_still_eligible =
            !entering_from_hold && self.mode_eligible(self.current_mode, sensors).is_ok();

        if entering_from_hold {
            self.current_mode = candidate;
            self.dwell_counter = 0;
            return if candidate == TrackingMode::Hold {
                hold_reason.to_string()
            } else {
                format!("enter_{}", candidate.name())
            };
        }

        if !current_still_eligible {
            self.current_mode = candidate;
            self.dwell_counter = 0;
            return if candidate == TrackingMode::Hold {
                hold_reason.to_string()
            } else {
                format!("switch_unhealthy_{}", candidate.name())
            };
        }

        let current_pos = self.ladder_position(self.current_mode);
        let candidate_pos = self.ladder_position(candidate);
        let is_upgrade = match (current_pos, candidate_pos) {
            (Some(cur), Some(cand)) => cand < cur,
            _ => candidate != TrackingMode::Hold,
        };

        if is_upgrade {
            if self.dwell_counter < self.config.min_dwell_steps {
                self.dwell_counter = self.dwell_counter.saturating_add(1);
                return format!("dwell_{}", self.current_mode.name());
            }
            self.current_mode = candidate;
            self.dwell_counter = 0;
            return format!("switch_{}", candidate.name());
        }

        // Downgrade (candidate is later in the order, or Hold).
        self.current_mode = candidate;
        self.dwell_counter = 0;
        if candidate == TrackingMode::Hold {
            hold_reason.to_string()
        } else {
            format!("downgrade_{}", candidate.name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Measurement, SensorConfig, SensorKind};
    use crate::state::{State9, Vec3};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sensor_with_position(name: &str, kind: SensorKind, position: Vec3) -> Sensor {
        let mut sensor = Sensor::new(name, kind, sensor_config());
        sensor.status.healthy = true;
        sensor.status.confidence = 1.0;
        sensor.status.time_since_last_valid = 0.0;
        sensor.status.has_measurement = true;
        sensor.status.last_measurement = Some(Measurement {
            position: Some(position),
            velocity: None,
            range: None,
            bearing: None,
            valid: true,
            provenance: Some(Provenance::Operational),
        });
        sensor
    }

    fn sensor_config() -> SensorConfig {
        SensorConfig {
            rate_hz: 10.0,
            noise_std: 0.0,
            dropout_probability: 0.0,
            false_positive_probability: 0.0,
            max_range: 10_000.0,
        }
    }

    fn sample_healthy(sensor: &mut Sensor, rng: &mut ChaCha8Rng) {
        sensor.sample(State9::default(), 0.1, rng);
    }

    fn sample_unhealthy(sensor: &mut Sensor) {
        sensor.status.healthy = false;
        sensor.status.time_since_last_valid = 999.0;
    }

    #[test]
    fn mode_upgrade_with_dwell_scenario() {
        let mut config = ModeLadderConfig::default();
        config.ladder_order = vec![TrackingMode::Gps, TrackingMode::Thermal, TrackingMode::Hold];
        config.min_healthy_count = 2;
        config.min_dwell_steps = 2;
        config.max_data_age_seconds = 5.0;

        let mut ladder = ModeLadder::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut gps = Sensor::new("gps", SensorKind::Gps { bias: Vec3::ZERO }, sensor_config());
        let mut thermal = Sensor::new("thermal", SensorKind::Thermal, sensor_config());

        // t1: gps healthy(1), thermal unhealthy -> Hold
        sample_healthy(&mut gps, &mut rng);
        sample_unhealthy(&mut thermal);
        let d1 = ladder.decide(&[gps.clone(), thermal.clone()]);
        assert_eq!(d1.mode, TrackingMode::Hold);

        // t2: both healthy -> Gps, enter_gps (gps healthy_count=2, thermal healthy_count=1: thermal not yet eligible)
        sample_healthy(&mut gps, &mut rng);
        sample_healthy(&mut thermal, &mut rng);
        let d2 = ladder.decide(&[gps.clone(), thermal.clone()]);
        assert_eq!(d2.mode, TrackingMode::Gps);
        assert_eq!(d2.reason, "enter_gps");

        // t3: gps unhealthy, thermal healthy_count=2 -> Thermal, switch_unhealthy_thermal
        sample_unhealthy(&mut gps);
        sample_healthy(&mut thermal, &mut rng);
        let d3 = ladder.decide(&[gps.clone(), thermal.clone()]);
        assert_eq!(d3.mode, TrackingMode::Thermal);
        assert_eq!(d3.reason, "switch_unhealthy_thermal");
    }

    #[test]
    fn hold_is_always_eligible_with_no_sensors() {
        let ladder_cfg = ModeLadderConfig {
            ladder_order: vec![TrackingMode::Gps, TrackingMode::Hold],
            ..Default::default()
        };
        let mut ladder = ModeLadder::new(ladder_cfg);
        let decision = ladder.decide(&[]);
        assert_eq!(decision.mode, TrackingMode::Hold);
        assert_eq!(decision.reason, "no_sensors");
    }

    #[test]
    fn disqualification_does_not_fold_into_provenance_denied() {
        let mut config = ModeLadderConfig::default();
        config.ladder_order = vec![TrackingMode::Gps, TrackingMode::Hold];
        config.permitted_sensors = ["thermal".to_string()].into_iter().collect();
        config.min_healthy_count = 1;
        let mut ladder = ModeLadder::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut gps = Sensor::new("gps", SensorKind::Gps { bias: Vec3::ZERO }, sensor_config());
        sample_healthy(&mut gps, &mut rng);

        let decision = ladder.decide(&[gps]);
        assert_eq!(decision.mode, TrackingMode::Hold);
        assert_eq!(decision.reason, "no_sensors");
        assert_eq!(
            decision.disqualified_sources,
            vec![("gps".to_string(), "gps".to_string(), "no_sensors".to_string())]
        );

        // Same remap applies when the sensor is permitted but hasn't accrued
        // enough consecutive healthy ticks yet.
        let mut config = ModeLadderConfig::default();
        config.ladder_order = vec![TrackingMode::Gps, TrackingMode::Hold];
        config.min_healthy_count = 3;
        let mut ladder = ModeLadder::new(config);
        let mut gps = Sensor::new("gps", SensorKind::Gps { bias: Vec3::ZERO }, sensor_config());
        sample_healthy(&mut gps, &mut rng);

        let decision = ladder.decide(&[gps]);
        assert_eq!(
            decision.disqualified_sources,
            vec![("gps".to_string(), "gps".to_string(), "no_sensors".to_string())]
        );
    }

    #[test]
    fn disagreement_denies_then_clears_on_agreement() {
        let mut config = ModeLadderConfig::default();
        config.ladder_order = vec![TrackingMode::Gps, TrackingMode::Hold];
        config.min_healthy_count = 1;
        config.disagreement_threshold = 1.0;
        config.max_residual_age_seconds = 5.0;
        config.max_disagreement_count = 0;
        let mut ladder = ModeLadder::new(config);

        let gps = sensor_with_position("gps", SensorKind::Gps { bias: Vec3::ZERO }, Vec3::new(0.0, 0.0, 0.0));
        let thermal = sensor_with_position("thermal", SensorKind::Thermal, Vec3::new(10.0, 10.0, 10.0));
        let decision = ladder.decide(&[gps, thermal]);
        assert_eq!(decision.mode, TrackingMode::Hold);
        assert_eq!(
            decision.disqualified_sources,
            vec![("gps".to_string(), "gps".to_string(), "disagreement".to_string())]
        );

        let gps = sensor_with_position("gps", SensorKind::Gps { bias: Vec3::ZERO }, Vec3::new(0.0, 0.0, 0.0));
        let thermal = sensor_with_position("thermal", SensorKind::Thermal, Vec3::new(0.0, 0.0, 0.0));
        let decision = ladder.decide(&[gps, thermal]);
        assert_eq!(decision.mode, TrackingMode::Gps);
    }

    #[test]
    fn decision_confidence_is_bounded() {
        let mut config = ModeLadderConfig::default();
        config.ladder_order = vec![TrackingMode::Gps, TrackingMode::Hold];
        config.min_healthy_count = 1;
        let mut ladder = ModeLadder::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut gps = Sensor::new("gps", SensorKind::Gps { bias: Vec3::ZERO }, sensor_config());
        sample_healthy(&mut gps, &mut rng);
        let decision = ladder.decide(&[gps]);
        assert!((0.0..=1.0).contains(&decision.confidence));
    }
}
