//! AirTrace Core - Deterministic Multi-Modal Tracking and Federation Protocol
//!
//! This library solves: given a heterogeneous set of navigation/tracking
//! sensors with variable health, confidence, data freshness, and provenance,
//! select a single active tracking mode per tick under strict policy
//! constraints, expose the decision as a versioned envelope, and fan it out
//! to federated peers across endpoints with per-route sequencing and
//! key-scoped attestation.
//!
//! Control flow per tick: motion steps state, sensors sample it, the mode
//! ladder decides, the result is packaged into an `ExternalIoEnvelope`,
//! serialized by the codec, and published by the federation bridge.

pub mod audit;
pub mod config;
pub mod envelope;
pub mod error;
pub mod federation;
pub mod hash;
pub mod mode_ladder;
pub mod motion;
pub mod scheduler;
pub mod sensors;
pub mod state;
pub mod trust;

pub use audit::{AuditLog, AuditSink, AuditWriteStatus, MemoryAuditSink, NullAuditSink};
pub use config::{ConfigResult, ConfigIssue, PlatformProfile, SimConfig};
pub use envelope::{ExternalIoEnvelope, IoEnvelopeFormat};
pub use error::{BridgeError, CodecError, ConfigError, ModeDenial, TrustError};
pub use federation::{FederationBridge, FederationBridgeConfig, FederationEventFrame};
pub use mode_ladder::{ModeDecision, ModeLadder, ModeLadderConfig, TrackingMode};
pub use motion::{ManeuverParams, MotionBounds, MotionModelType, step_motion_model};
pub use sensors::{Measurement, Provenance, Sensor, SensorConfig, SensorKind, SensorStatus};
pub use state::{Projection2D, State9, Vec3};
pub use trust::{AdapterManifest, AdapterRegistryResult, PluginAuthRequest, PluginAuthResult};
