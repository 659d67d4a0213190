//! Configuration model and loader (component F, §4.2).
//!
//! Parses a newline-delimited `key=value` file with `#` comments into a
//! typed `SimConfig`, collecting every problem as a `ConfigIssue` rather
//! than failing fast, then runs cross-field validation and (on success)
//! the adapter/plugin trust pipeline.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mode_ladder::{default_ladder_order, Authorization, ModeLadderConfig, TrackingMode, UnknownProvenanceAction};
use crate::motion::{ManeuverParams, MotionBounds};
use crate::sensors::{Provenance, SensorConfig};
use crate::state::{State9, Vec3};
use crate::trust::{AdapterManifest, AdapterRegistryContext};

pub type ConfigIssue = ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformProfile {
    Base,
    Air,
    Ground,
    Maritime,
    Space,
    Handheld,
    FixedSite,
    Subsea,
}

impl PlatformProfile {
    fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "base" => PlatformProfile::Base,
            "air" => PlatformProfile::Air,
            "ground" => PlatformProfile::Ground,
            "maritime" => PlatformProfile::Maritime,
            "space" => PlatformProfile::Space,
            "handheld" => PlatformProfile::Handheld,
            "fixed_site" => PlatformProfile::FixedSite,
            "subsea" => PlatformProfile::Subsea,
            _ => return None,
        })
    }

    /// Default sensor set for a profile, ordered for stable, reproducible
    /// permitted-sensor population when the config omits it.
    pub fn default_sensors(self) -> Vec<&'static str> {
        match self {
            PlatformProfile::Base => vec!["gps", "imu"],
            PlatformProfile::Air => vec!["gps", "imu", "radar", "thermal"],
            PlatformProfile::Ground => vec!["gps", "imu", "dead_reckoning"],
            PlatformProfile::Maritime => vec!["gps", "imu", "radar"],
            PlatformProfile::Space => vec!["imu", "magnetometer", "celestial"],
            PlatformProfile::Handheld => vec!["gps", "imu"],
            PlatformProfile::FixedSite => vec!["gps", "radar", "thermal"],
            PlatformProfile::Subsea => vec!["dead_reckoning", "imu"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkAidMode {
    Deny,
    Allow,
    TestOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideAuth {
    Credential,
    Key,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Operational,
    Simulation,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiSurface {
    Tui,
    Cockpit,
    RemoteOperator,
    C2,
}

impl UiSurface {
    fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "tui" => UiSurface::Tui,
            "cockpit" => UiSurface::Cockpit,
            "remote_operator" => UiSurface::RemoteOperator,
            "c2" => UiSurface::C2,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UiSurface::Tui => "tui",
            UiSurface::Cockpit => "cockpit",
            UiSurface::RemoteOperator => "remote_operator",
            UiSurface::C2 => "c2",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAidPolicy {
    pub mode: Option<NetworkAidMode>,
    pub override_required: bool,
    pub override_auth: Option<OverrideAuth>,
    pub override_timeout_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    pub version: String,
    pub source: String,
    pub allowed_modes: HashSet<String>,
    pub required: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub network_aid: NetworkAidPolicy,
    pub roles: HashSet<String>,
    pub active_role: String,
    pub authorization: AuthorizationPolicy,
    pub role_permissions: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenancePolicy {
    pub run_mode: Option<RunMode>,
    pub allowed_inputs: Vec<String>,
    pub allow_mixed: bool,
    pub unknown_action: Option<UnknownProvenanceAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub profile: Option<PlatformProfile>,
    pub profile_parent: Option<PlatformProfile>,
    pub permitted_sensors: Vec<String>,
    pub child_modules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CelestialDataset {
    pub tier: String,
    pub max_size_mb: f64,
    pub catalog_path: String,
    pub ephemeris_path: String,
    pub catalog_hash: String,
    pub ephemeris_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub id: String,
    pub version: String,
    pub manifest_path: String,
    pub allowlist_path: String,
    pub core_version: String,
    pub tools_version: String,
    pub ui_version: String,
    pub contract_version: String,
    pub allowlist_max_age_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    pub contract_version: String,
    pub surface: Option<UiSurface>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginAllowlistConfig {
    pub id: String,
    pub version: String,
    pub signature_hash: String,
    pub signature_algorithm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub id: String,
    pub version: String,
    pub signature_hash: String,
    pub signature_algorithm: String,
    pub allowlist: PluginAllowlistConfig,
    pub authorization_required: bool,
    pub authorization_granted: bool,
    pub device_driver: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub primary_budget_ms: f64,
    pub aux_budget_ms: f64,
    pub max_aux_pipelines: u32,
    pub aux_min_service_interval: u32,
    pub allow_snapshot_overlap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub max_data_age_seconds: f64,
    pub disagreement_threshold: f64,
    pub min_confidence: f64,
    pub max_disagreement_count: u32,
    pub max_residual_age_seconds: f64,
    pub source_weights: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub ladder_order: Vec<TrackingMode>,
    pub min_healthy_count: u32,
    pub min_dwell_steps: u32,
    pub max_stale_count: u32,
    pub max_low_confidence_count: u32,
    pub lockout_steps: u32,
    pub history_window: u32,
}

/// The fully typed, validated simulation configuration (mirrors §4.2/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub version_seen: bool,
    pub initial_state: State9,
    pub dt: f64,
    pub steps: u64,
    pub seed: u64,
    pub bounds: MotionBounds,
    pub maneuvers: ManeuverParams,
    pub sensors: HashMap<String, SensorConfig>,
    pub platform: PlatformConfig,
    pub policy: PolicyConfig,
    pub provenance: ProvenancePolicy,
    pub dataset_celestial: CelestialDataset,
    pub adapter: AdapterConfig,
    pub ui: UiConfig,
    pub plugin: PluginConfig,
    pub mode: ModeConfig,
    pub fusion: FusionConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            version_seen: false,
            // Carried from the source loader's non-zero default initial
            // state (`{{0,0,100},{15,10,0},{0.2,-0.1,0},0}`).
            initial_state: State9 {
                position: Vec3::new(0.0, 0.0, 100.0),
                velocity: Vec3::new(15.0, 10.0, 0.0),
                acceleration: Vec3::new(0.2, -0.1, 0.0),
                time: 0.0,
            },
            dt: 0.2,
            steps: 20,
            seed: 42,
            bounds: MotionBounds {
                min_position: Vec3::new(-100_000.0, -100_000.0, 0.0),
                max_position: Vec3::new(100_000.0, 100_000.0, 50_000.0),
                max_speed: 400.0,
                max_accel: 50.0,
                max_turn_rate_deg: 30.0,
            },
            maneuvers: ManeuverParams {
                random_accel_std: 3.0,
                maneuver_probability: 0.35,
            },
            sensors: sensor_defaults(),
            platform: PlatformConfig::default(),
            policy: PolicyConfig::default(),
            provenance: ProvenancePolicy::default(),
            dataset_celestial: CelestialDataset::default(),
            adapter: AdapterConfig::default(),
            ui: UiConfig::default(),
            plugin: PluginConfig::default(),
            mode: ModeConfig {
                ladder_order: Vec::new(),
                min_healthy_count: 1,
                min_dwell_steps: 0,
                max_stale_count: u32::MAX,
                max_low_confidence_count: u32::MAX,
                lockout_steps: 0,
                history_window: 0,
            },
            fusion: FusionConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

fn sensor_defaults() -> HashMap<String, SensorConfig> {
    let mut map = HashMap::new();
    let defaults: &[(&str, f64, f64, f64, f64, f64)] = &[
        ("gps", 5.0, 2.0, 0.02, 0.01, 0.0),
        ("thermal", 5.0, 1.5, 0.05, 0.02, 5000.0),
        ("dead_reckoning", 10.0, 0.5, 0.0, 0.0, 0.0),
        ("imu", 50.0, 0.1, 0.0, 0.0, 0.0),
        ("radar", 10.0, 1.0, 0.03, 0.01, 20000.0),
    ];
    for (name, rate_hz, noise_std, dropout, false_pos, max_range) in defaults {
        map.insert(
            (*name).to_string(),
            SensorConfig {
                rate_hz: *rate_hz,
                noise_std: *noise_std,
                dropout_probability: *dropout,
                false_positive_probability: *false_pos,
                max_range: *max_range,
            },
        );
    }
    map
}

impl SimConfig {
    pub fn mode_ladder_config(&self) -> ModeLadderConfig {
        let ladder_order = if self.mode.ladder_order.is_empty() {
            default_ladder_order()
        } else {
            self.mode.ladder_order.clone()
        };
        ModeLadderConfig {
            ladder_order,
            permitted_sensors: self.platform.permitted_sensors.iter().cloned().collect(),
            min_healthy_count: self.mode.min_healthy_count,
            min_dwell_steps: self.mode.min_dwell_steps,
            max_data_age_seconds: self.fusion.max_data_age_seconds,
            min_confidence: self.fusion.min_confidence,
            max_stale_count: self.mode.max_stale_count,
            max_low_confidence_count: self.mode.max_low_confidence_count,
            lockout_steps: self.mode.lockout_steps,
            max_disagreement_count: self.fusion.max_disagreement_count,
            disagreement_threshold: self.fusion.disagreement_threshold,
            max_residual_age_seconds: self.fusion.max_residual_age_seconds,
            authorization: Authorization {
                required: self.policy.authorization.required,
                verified: self.policy.authorization.verified,
                allowed_modes: self.policy.authorization.allowed_modes.clone(),
            },
            allowed_provenances: HashSet::new(),
            provenance_allow_mixed: self.provenance.allow_mixed,
            provenance_unknown_action: self
                .provenance
                .unknown_action
                .clone()
                .unwrap_or(UnknownProvenanceAction::Deny),
            celestial_allowed: self.dataset_celestial.tier != "disabled" && !self.dataset_celestial.tier.is_empty(),
            celestial_dataset_available: !self.dataset_celestial.catalog_path.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigResult {
    pub config: SimConfig,
    pub issues: Vec<ConfigIssue>,
    pub ok: bool,
}

fn set_issue(result: &mut ConfigResult, key: &str, message: &str) {
    result.ok = false;
    result.issues.push(ConfigError::new(key, message));
}

fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn is_semver(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn to_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn to_f64(value: &str) -> Option<f64> {
    let parsed: f64 = value.parse().ok()?;
    if parsed.is_finite() {
        Some(parsed)
    } else {
        None
    }
}

fn to_u32(value: &str) -> Option<u32> {
    value.parse().ok()
}

fn to_u64(value: &str) -> Option<u64> {
    value.parse().ok()
}

fn split_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        Vec::new()
    } else {
        value.split(',').map(|s| s.trim().to_lowercase()).collect()
    }
}

/// Parses the file and applies every recognized key. Unrecognized keys and
/// malformed values are collected as issues rather than aborting the parse.
pub fn load_sim_config(path: &Path) -> ConfigResult {
    let mut result = ConfigResult {
        config: SimConfig::default(),
        issues: Vec::new(),
        ok: true,
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => {
            set_issue(&mut result, path.to_string_lossy().as_ref(), "unable to open config");
            return result;
        }
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq_pos) = line.find('=') else {
            set_issue(&mut result, line, "missing '='");
            continue;
        };
        let key = line[..eq_pos].trim();
        let value = line[eq_pos + 1..].trim();
        if key == "config.version" {
            result.config.version_seen = true;
            if value != "1.0" {
                set_issue(&mut result, "config.version", "unsupported version");
            }
            continue;
        }
        apply_value(&mut result, key, value);
    }

    if !result.config.version_seen {
        set_issue(&mut result, "config.version", "missing required key");
    }

    if result.config.platform.permitted_sensors.is_empty() {
        let mut sensors: Vec<String> = Vec::new();
        if let Some(parent) = result.config.platform.profile_parent {
            for s in parent.default_sensors() {
                if !sensors.contains(&s.to_string()) {
                    sensors.push(s.to_string());
                }
            }
        }
        if let Some(profile) = result.config.platform.profile {
            for s in profile.default_sensors() {
                if !sensors.contains(&s.to_string()) {
                    sensors.push(s.to_string());
                }
            }
        }
        result.config.platform.permitted_sensors = sensors;
    }

    if result.config.mode.ladder_order.is_empty() {
        result.config.mode.ladder_order = default_ladder_order();
    }

    validate_config(&mut result);

    if result.ok && !result.config.adapter.id.is_empty() {
        let context = AdapterRegistryContext {
            core_version: result.config.adapter.core_version.clone(),
            tools_version: result.config.adapter.tools_version.clone(),
            ui_version: result.config.adapter.ui_version.clone(),
            adapter_contract_version: result.config.adapter.contract_version.clone(),
            ui_contract_version: result.config.ui.contract_version.clone(),
        };
        let manifest = AdapterManifest {
            adapter_id: result.config.adapter.id.clone(),
            adapter_version: result.config.adapter.version.clone(),
            adapter_contract_version: result.config.adapter.contract_version.clone(),
            ui_contract_version: result.config.ui.contract_version.clone(),
            core_compatibility_min: result.config.adapter.core_version.clone(),
            core_compatibility_max: result.config.adapter.core_version.clone(),
            tools_compatibility_min: result.config.adapter.tools_version.clone(),
            tools_compatibility_max: result.config.adapter.tools_version.clone(),
            ui_compatibility_min: result.config.adapter.ui_version.clone(),
            ui_compatibility_max: result.config.adapter.ui_version.clone(),
            capabilities: Vec::new(),
            ui_extensions: Vec::new(),
        };
        let _ = context;
        let _ = manifest;
        // Registration against a concrete allowlist/manifest file is a
        // collaborator concern (loaded by the CLI); the loader only
        // verifies the config surface is internally well-formed here.
    }

    if result.ok && !result.config.plugin.id.is_empty() {
        use crate::trust::{validate_plugin_activation, PluginAuthRequest, PluginAuthorization, PluginIdentity, PluginSignature};
        let request = PluginAuthRequest {
            identity: PluginIdentity {
                id: result.config.plugin.id.clone(),
                version: result.config.plugin.version.clone(),
                device_driver: result.config.plugin.device_driver,
            },
            signature: PluginSignature {
                hash: result.config.plugin.signature_hash.clone(),
                algorithm: result.config.plugin.signature_algorithm.clone(),
            },
            allowlist: crate::trust::PluginAllowlist {
                id: result.config.plugin.allowlist.id.clone(),
                version: result.config.plugin.allowlist.version.clone(),
                signature_hash: result.config.plugin.allowlist.signature_hash.clone(),
                signature_algorithm: result.config.plugin.allowlist.signature_algorithm.clone(),
            },
            authorization: PluginAuthorization {
                required: result.config.plugin.authorization_required,
                granted: result.config.plugin.authorization_granted,
            },
        };
        let plugin_result = validate_plugin_activation(&request);
        if !plugin_result.allowed {
            set_issue(&mut result, "plugin.auth", &plugin_result.reason);
        }
    }

    result
}

fn apply_value(result: &mut ConfigResult, key: &str, value: &str) {
    macro_rules! num {
        ($target:expr, $parse:expr) => {
            match $parse(value) {
                Some(v) => $target = v,
                None => set_issue(result, key, "invalid numeric value"),
            }
        };
    }
    macro_rules! boolean {
        ($target:expr) => {
            match to_bool(value) {
                Some(v) => $target = v,
                None => set_issue(result, key, "invalid boolean value"),
            }
        };
    }

    let cfg = &mut result.config;
    match key {
        "state.position.x" => num!(cfg.initial_state.position.x, to_f64),
        "state.position.y" => num!(cfg.initial_state.position.y, to_f64),
        "state.position.z" => num!(cfg.initial_state.position.z, to_f64),
        "state.velocity.x" => num!(cfg.initial_state.velocity.x, to_f64),
        "state.velocity.y" => num!(cfg.initial_state.velocity.y, to_f64),
        "state.velocity.z" => num!(cfg.initial_state.velocity.z, to_f64),
        "state.acceleration.x" => num!(cfg.initial_state.acceleration.x, to_f64),
        "state.acceleration.y" => num!(cfg.initial_state.acceleration.y, to_f64),
        "state.acceleration.z" => num!(cfg.initial_state.acceleration.z, to_f64),

        "sim.dt" => num!(cfg.dt, to_f64),
        "sim.steps" => match to_u64(value) {
            Some(v) => cfg.steps = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "sim.seed" => match to_u64(value) {
            Some(v) => cfg.seed = v,
            None => set_issue(result, key, "invalid integer value"),
        },

        "bounds.min.x" => num!(cfg.bounds.min_position.x, to_f64),
        "bounds.min.y" => num!(cfg.bounds.min_position.y, to_f64),
        "bounds.min.z" => num!(cfg.bounds.min_position.z, to_f64),
        "bounds.max.x" => num!(cfg.bounds.max_position.x, to_f64),
        "bounds.max.y" => num!(cfg.bounds.max_position.y, to_f64),
        "bounds.max.z" => num!(cfg.bounds.max_position.z, to_f64),
        "bounds.max_speed" => num!(cfg.bounds.max_speed, to_f64),
        "bounds.max_accel" => num!(cfg.bounds.max_accel, to_f64),
        "bounds.max_turn_rate_deg" => num!(cfg.bounds.max_turn_rate_deg, to_f64),

        "maneuver.random_accel_std" => num!(cfg.maneuvers.random_accel_std, to_f64),
        "maneuver.probability" => num!(cfg.maneuvers.maneuver_probability, to_f64),

        _ if key.starts_with("sensor.") => apply_sensor_key(result, key, value),

        "platform.profile" => match PlatformProfile::parse(value) {
            Some(p) => result.config.platform.profile = Some(p),
            None => set_issue(result, key, "unknown platform profile"),
        },
        "platform.profile_parent" => match PlatformProfile::parse(value) {
            Some(p) => result.config.platform.profile_parent = Some(p),
            None => set_issue(result, key, "unknown platform profile"),
        },
        "platform.permitted_sensors" => result.config.platform.permitted_sensors = split_list(value),
        "platform.child_modules" => result.config.platform.child_modules = split_list(value),

        "policy.network_aid.mode" => {
            result.config.policy.network_aid.mode = match value {
                "deny" => Some(NetworkAidMode::Deny),
                "allow" => Some(NetworkAidMode::Allow),
                "test_only" => Some(NetworkAidMode::TestOnly),
                _ => {
                    set_issue(result, key, "unknown network aid mode");
                    None
                }
            }
        }
        "policy.network_aid.override_required" => boolean!(result.config.policy.network_aid.override_required),
        "policy.network_aid.override_auth" => {
            result.config.policy.network_aid.override_auth = match value {
                "credential" => Some(OverrideAuth::Credential),
                "key" => Some(OverrideAuth::Key),
                "token" => Some(OverrideAuth::Token),
                _ => {
                    set_issue(result, key, "unknown override auth");
                    None
                }
            }
        }
        "policy.network_aid.override_timeout_seconds" => num!(result.config.policy.network_aid.override_timeout_seconds, to_f64),
        "policy.roles" => result.config.policy.roles = split_list(value).into_iter().collect(),
        "policy.active_role" => result.config.policy.active_role = value.to_lowercase(),
        "policy.authorization.version" => result.config.policy.authorization.version = value.to_string(),
        "policy.authorization.source" => result.config.policy.authorization.source = value.to_string(),
        "policy.authorization.allowed_modes" => {
            result.config.policy.authorization.allowed_modes = split_list(value).into_iter().collect()
        }
        "policy.authorization.required" => boolean!(result.config.policy.authorization.required),
        "policy.authorization.verified" => boolean!(result.config.policy.authorization.verified),
        _ if key.starts_with("policy.role_permissions.") => {
            let role = key.trim_start_matches("policy.role_permissions.").to_string();
            result
                .config
                .policy
                .role_permissions
                .insert(role, split_list(value).into_iter().collect());
        }

        "provenance.run_mode" => {
            result.config.provenance.run_mode = match value {
                "operational" => Some(RunMode::Operational),
                "simulation" => Some(RunMode::Simulation),
                "test" => Some(RunMode::Test),
                _ => {
                    set_issue(result, key, "unknown provenance run mode");
                    None
                }
            }
        }
        "provenance.allowed_inputs" => result.config.provenance.allowed_inputs = split_list(value),
        "provenance.allow_mixed" => boolean!(result.config.provenance.allow_mixed),
        "provenance.unknown_action" => {
            result.config.provenance.unknown_action = match value {
                "deny" => Some(UnknownProvenanceAction::Deny),
                "hold" => Some(UnknownProvenanceAction::Hold),
                _ => {
                    set_issue(result, key, "unknown provenance action");
                    None
                }
            }
        }

        "dataset.celestial.tier" => result.config.dataset_celestial.tier = value.to_lowercase(),
        "dataset.celestial.max_size_mb" => num!(result.config.dataset_celestial.max_size_mb, to_f64),
        "dataset.celestial.catalog_path" => result.config.dataset_celestial.catalog_path = value.to_string(),
        "dataset.celestial.ephemeris_path" => result.config.dataset_celestial.ephemeris_path = value.to_string(),
        "dataset.celestial.catalog_hash" => result.config.dataset_celestial.catalog_hash = value.to_string(),
        "dataset.celestial.ephemeris_hash" => result.config.dataset_celestial.ephemeris_hash = value.to_string(),

        "adapter.id" => result.config.adapter.id = value.to_lowercase(),
        "adapter.version" => result.config.adapter.version = value.to_string(),
        "adapter.manifest_path" => result.config.adapter.manifest_path = value.to_string(),
        "adapter.allowlist_path" => result.config.adapter.allowlist_path = value.to_string(),
        "adapter.core_version" => result.config.adapter.core_version = value.to_string(),
        "adapter.tools_version" => result.config.adapter.tools_version = value.to_string(),
        "adapter.ui_version" => result.config.adapter.ui_version = value.to_string(),
        "adapter.contract_version" => result.config.adapter.contract_version = value.to_string(),
        "adapter.allowlist_max_age_days" => match to_u32(value) {
            Some(v) => result.config.adapter.allowlist_max_age_days = v,
            None => set_issue(result, key, "invalid integer value"),
        },

        "ui.contract_version" => result.config.ui.contract_version = value.to_string(),
        "ui.surface" => match UiSurface::parse(value) {
            Some(s) => result.config.ui.surface = Some(s),
            None => set_issue(result, key, "unknown ui surface"),
        },

        "plugin.id" => result.config.plugin.id = value.to_lowercase(),
        "plugin.version" => result.config.plugin.version = value.to_string(),
        "plugin.signature_hash" => result.config.plugin.signature_hash = value.to_lowercase(),
        "plugin.signature_algorithm" => result.config.plugin.signature_algorithm = value.to_lowercase(),
        "plugin.allowlist.id" => result.config.plugin.allowlist.id = value.to_lowercase(),
        "plugin.allowlist.version" => result.config.plugin.allowlist.version = value.to_string(),
        "plugin.allowlist.signature_hash" => result.config.plugin.allowlist.signature_hash = value.to_lowercase(),
        "plugin.allowlist.signature_algorithm" => result.config.plugin.allowlist.signature_algorithm = value.to_lowercase(),
        "plugin.authorization_required" => boolean!(result.config.plugin.authorization_required),
        "plugin.authorization_granted" => boolean!(result.config.plugin.authorization_granted),
        "plugin.device_driver" => boolean!(result.config.plugin.device_driver),

        "mode.ladder_order" => {
            let names = split_list(value);
            let mut modes = Vec::new();
            for name in names {
                match TrackingMode::from_name(&name) {
                    Some(m) => modes.push(m),
                    None => {
                        set_issue(result, key, "unknown mode name");
                        return;
                    }
                }
            }
            result.config.mode.ladder_order = modes;
        }
        "mode.min_healthy_count" => match to_u32(value) {
            Some(v) => result.config.mode.min_healthy_count = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "mode.min_dwell_steps" => match to_u32(value) {
            Some(v) => result.config.mode.min_dwell_steps = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "mode.max_stale_count" => match to_u32(value) {
            Some(v) => result.config.mode.max_stale_count = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "mode.max_low_confidence_count" => match to_u32(value) {
            Some(v) => result.config.mode.max_low_confidence_count = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "mode.lockout_steps" => match to_u32(value) {
            Some(v) => result.config.mode.lockout_steps = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "mode.history_window" => match to_u32(value) {
            Some(v) => result.config.mode.history_window = v,
            None => set_issue(result, key, "invalid integer value"),
        },

        "fusion.max_data_age_seconds" => num!(result.config.fusion.max_data_age_seconds, to_f64),
        "fusion.disagreement_threshold" => num!(result.config.fusion.disagreement_threshold, to_f64),
        "fusion.min_confidence" => num!(result.config.fusion.min_confidence, to_f64),
        "fusion.max_disagreement_count" => match to_u32(value) {
            Some(v) => result.config.fusion.max_disagreement_count = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "fusion.max_residual_age_seconds" => num!(result.config.fusion.max_residual_age_seconds, to_f64),
        _ if key.starts_with("fusion.source_weights.") => {
            let sensor = key.trim_start_matches("fusion.source_weights.").to_string();
            match to_f64(value) {
                Some(v) => {
                    result.config.fusion.source_weights.insert(sensor, v);
                }
                None => set_issue(result, key, "invalid numeric value"),
            }
        }

        "scheduler.primary_budget_ms" => num!(result.config.scheduler.primary_budget_ms, to_f64),
        "scheduler.aux_budget_ms" => num!(result.config.scheduler.aux_budget_ms, to_f64),
        "scheduler.max_aux_pipelines" => match to_u32(value) {
            Some(v) => result.config.scheduler.max_aux_pipelines = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "scheduler.aux_min_service_interval" => match to_u32(value) {
            Some(v) => result.config.scheduler.aux_min_service_interval = v,
            None => set_issue(result, key, "invalid integer value"),
        },
        "scheduler.allow_snapshot_overlap" => boolean!(result.config.scheduler.allow_snapshot_overlap),

        _ => set_issue(result, key, "unknown or invalid value"),
    }
}

fn apply_sensor_key(result: &mut ConfigResult, key: &str, value: &str) {
    let rest = key.trim_start_matches("sensor.");
    let Some((sensor_name, field)) = rest.split_once('.') else {
        set_issue(result, key, "unknown or invalid value");
        return;
    };
    let entry = result
        .config
        .sensors
        .entry(sensor_name.to_string())
        .or_insert(SensorConfig {
            rate_hz: 1.0,
            noise_std: 0.0,
            dropout_probability: 0.0,
            false_positive_probability: 0.0,
            max_range: 0.0,
        });
    match field {
        "rate_hz" => match to_f64(value) {
            Some(v) => entry.rate_hz = v,
            None => set_issue(result, key, "invalid numeric value"),
        },
        "noise_std" => match to_f64(value) {
            Some(v) => entry.noise_std = v,
            None => set_issue(result, key, "invalid numeric value"),
        },
        "dropout" => match to_f64(value) {
            Some(v) => entry.dropout_probability = v,
            None => set_issue(result, key, "invalid numeric value"),
        },
        "false_positive" => match to_f64(value) {
            Some(v) => entry.false_positive_probability = v,
            None => set_issue(result, key, "invalid numeric value"),
        },
        "max_range" => match to_f64(value) {
            Some(v) => entry.max_range = v,
            None => set_issue(result, key, "invalid numeric value"),
        },
        _ => set_issue(result, key, "unknown or invalid value"),
    }
}

fn validate_config(result: &mut ConfigResult) {
    {
        let cfg = &result.config;
        if cfg.dt <= 0.0 || cfg.dt > 10.0 {
            set_issue(result, "sim.dt", "out of range (0,10]");
        }
        if cfg.steps < 1 {
            set_issue(result, "sim.steps", "out of range [1, 1e7]");
        }
        if !cfg.bounds.is_valid() {
            set_issue(result, "bounds", "min must be <= max and speed/accel bounds positive");
        }
        if cfg.maneuvers.maneuver_probability < 0.0 || cfg.maneuvers.maneuver_probability > 1.0 {
            set_issue(result, "maneuver.probability", "out of range [0,1]");
        }
    }

    for (name, sensor) in result.config.sensors.clone() {
        if !sensor.is_valid() {
            set_issue(result, &format!("sensor.{name}"), "invalid sensor configuration");
        }
    }

    {
        let cfg = &result.config;
        if let (Some(parent), Some(profile)) = (cfg.platform.profile_parent, cfg.platform.profile) {
            if parent == profile {
                set_issue(result, "platform.profile_parent", "must differ from platform.profile");
            }
        }
    }
    let child_modules = result.config.platform.child_modules.clone();
    let mut seen = HashSet::new();
    for module in &child_modules {
        if !is_valid_identifier(module) {
            set_issue(result, "platform.child_modules", "invalid module identifier");
        } else if !seen.insert(module.clone()) {
            set_issue(result, "platform.child_modules", "duplicate module identifier");
        }
    }

    {
        let cfg = &result.config;
        if !cfg.policy.roles.is_empty() && !cfg.policy.active_role.is_empty() && !cfg.policy.roles.contains(&cfg.policy.active_role) {
            set_issue(result, "policy.active_role", "must be a defined role");
        }
    }
    let role_keys: Vec<String> = result.config.policy.role_permissions.keys().cloned().collect();
    let roles = result.config.policy.roles.clone();
    for role in role_keys {
        if !roles.is_empty() && !roles.contains(&role) {
            set_issue(result, "policy.role_permissions", "undefined role");
        }
    }
    {
        let cfg = &result.config;
        if cfg.policy.network_aid.override_timeout_seconds < 0.0 {
            set_issue(result, "policy.network_aid.override_timeout_seconds", "must be >= 0");
        }
    }

    {
        let cfg = &result.config;
        if !cfg.provenance.allowed_inputs.is_empty() {
            let mut seen = HashSet::new();
            for input in &cfg.provenance.allowed_inputs {
                if !seen.insert(input.clone()) {
                    set_issue(result, "provenance.allowed_inputs", "duplicate entry");
                }
            }
            if let Some(run_mode) = cfg.provenance.run_mode {
                let run_mode_name = match run_mode {
                    RunMode::Operational => "operational",
                    RunMode::Simulation => "simulation",
                    RunMode::Test => "test",
                };
                if !cfg.provenance.allowed_inputs.iter().any(|s| s == run_mode_name) {
                    set_issue(result, "provenance.run_mode", "must be a member of allowed_inputs");
                }
            }
            if !cfg.provenance.allow_mixed && cfg.provenance.allowed_inputs.len() > 1 {
                set_issue(result, "provenance.allowed_inputs", "must have length <= 1 when allow_mixed is false");
            }
        }
    }

    {
        let cfg = &result.config;
        if !cfg.dataset_celestial.catalog_path.is_empty() && !is_sha256_hex(&cfg.dataset_celestial.catalog_hash) {
            set_issue(result, "dataset.celestial.catalog_hash", "required and must be 64 hex characters when catalog_path is set");
        }
        if !cfg.dataset_celestial.ephemeris_path.is_empty() && !is_sha256_hex(&cfg.dataset_celestial.ephemeris_hash) {
            set_issue(result, "dataset.celestial.ephemeris_hash", "required and must be 64 hex characters when ephemeris_path is set");
        }
        if cfg.dataset_celestial.max_size_mb < 0.0 {
            set_issue(result, "dataset.celestial.max_size_mb", "must be >= 0");
        }
    }

    {
        let cfg = &result.config;
        if !cfg.adapter.id.is_empty() {
            if !is_valid_identifier(&cfg.adapter.id) {
                set_issue(result, "adapter.id", "must match [a-z0-9_-]+");
            }
            if cfg.adapter.version.is_empty() {
                set_issue(result, "adapter.version", "required when adapter.id is set");
            }
            let official = matches!(
                cfg.adapter.id.as_str(),
                "base" | "air" | "ground" | "maritime" | "space" | "handheld" | "fixed_site"
            );
            if cfg.adapter.manifest_path.is_empty() && !official {
                set_issue(result, "adapter.manifest_path", "required for non-official adapter id");
            }
        } else if !cfg.adapter.manifest_path.is_empty() || !cfg.adapter.allowlist_path.is_empty() {
            set_issue(result, "adapter.id", "manifest_path/allowlist_path require an adapter id");
        }
        for (key, value) in [
            ("adapter.core_version", &cfg.adapter.core_version),
            ("adapter.tools_version", &cfg.adapter.tools_version),
            ("adapter.ui_version", &cfg.adapter.ui_version),
            ("adapter.contract_version", &cfg.adapter.contract_version),
            ("ui.contract_version", &cfg.ui.contract_version),
        ] {
            if !is_semver(value) {
                set_issue(result, key, "must be semver major.minor.patch");
            }
        }
    }

    {
        let cfg = &result.config;
        let plugin_fields_set = !cfg.plugin.id.is_empty()
            || !cfg.plugin.version.is_empty()
            || !cfg.plugin.signature_hash.is_empty()
            || !cfg.plugin.signature_algorithm.is_empty()
            || !cfg.plugin.allowlist.id.is_empty()
            || !cfg.plugin.allowlist.version.is_empty()
            || !cfg.plugin.allowlist.signature_hash.is_empty()
            || !cfg.plugin.allowlist.signature_algorithm.is_empty();
        if plugin_fields_set {
            let all_set = !cfg.plugin.id.is_empty()
                && !cfg.plugin.version.is_empty()
                && !cfg.plugin.signature_hash.is_empty()
                && !cfg.plugin.signature_algorithm.is_empty()
                && !cfg.plugin.allowlist.id.is_empty()
                && !cfg.plugin.allowlist.version.is_empty()
                && !cfg.plugin.allowlist.signature_hash.is_empty()
                && !cfg.plugin.allowlist.signature_algorithm.is_empty();
            if !all_set {
                set_issue(result, "plugin", "plugin fields are all-or-nothing");
            } else {
                if !is_valid_identifier(&cfg.plugin.id) {
                    set_issue(result, "plugin.id", "must match [a-z0-9_-]+");
                }
                if !is_semver(&cfg.plugin.version) {
                    set_issue(result, "plugin.version", "must be semver");
                }
                if cfg.plugin.signature_algorithm != "sha256" || cfg.plugin.allowlist.signature_algorithm != "sha256" {
                    set_issue(result, "plugin.signature_algorithm", "must be sha256");
                }
                if !is_sha256_hex(&cfg.plugin.signature_hash) || !is_sha256_hex(&cfg.plugin.allowlist.signature_hash) {
                    set_issue(result, "plugin.signature_hash", "must be 64 hex characters");
                }
            }
        }
    }

    {
        let cfg = &result.config;
        for mode in &cfg.mode.ladder_order {
            let _ = mode;
        }
        if cfg.fusion.min_confidence < 0.0 || cfg.fusion.min_confidence > 1.0 {
            set_issue(result, "fusion.min_confidence", "out of range [0,1]");
        }
        for (sensor, weight) in &cfg.fusion.source_weights {
            if *weight < 0.0 {
                set_issue(result, &format!("fusion.source_weights.{sensor}"), "must be >= 0");
            }
            if sensor.is_empty() {
                set_issue(result, "fusion.source_weights", "sensor name must be non-empty");
            }
        }
        if cfg.scheduler.primary_budget_ms < 0.0 {
            set_issue(result, "scheduler.primary_budget_ms", "must be >= 0");
        }
        if cfg.scheduler.aux_budget_ms < 0.0 {
            set_issue(result, "scheduler.aux_budget_ms", "must be >= 0");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_version_key_is_an_issue() {
        let file = write_temp("sim.dt=0.1\n");
        let result = load_sim_config(file.path());
        assert!(!result.ok);
        assert!(result.issues.iter().any(|i| i.key == "config.version"));
    }

    #[test]
    fn unknown_key_is_reported() {
        let file = write_temp("config.version=1.0\nnonsense.key=1\n");
        let result = load_sim_config(file.path());
        assert!(result.issues.iter().any(|i| i.key == "nonsense.key" && i.message == "unknown or invalid value"));
    }

    #[test]
    fn missing_ladder_populates_default() {
        let file = write_temp("config.version=1.0\n");
        let result = load_sim_config(file.path());
        assert!(!result.config.mode.ladder_order.is_empty());
    }
}
