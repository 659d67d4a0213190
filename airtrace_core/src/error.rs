//! Error kinds surfaced by the core. Nothing here is thrown across a tick;
//! each is returned from the component that detects it and collected or
//! embedded in its result type per the component's contract.

use thiserror::Error;

/// A single configuration problem, keyed to the offending config key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key}: {message}")]
pub struct ConfigError {
    pub key: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Envelope parse/serialize failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Closed-set reasons for adapter/plugin trust failures (component I/J).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error("adapter_schema_invalid")]
    AdapterSchemaInvalid,
    #[error("adapter_not_allowlisted")]
    AdapterNotAllowlisted,
    #[error("adapter_ui_extension_invalid")]
    AdapterUiExtensionInvalid,
    #[error("adapter_surface_not_allowed")]
    AdapterSurfaceNotAllowed,
    #[error("adapter_contract_mismatch")]
    AdapterContractMismatch,
    #[error("adapter_version_incompatible")]
    AdapterVersionIncompatible,
    #[error("adapter_capability_invalid")]
    AdapterCapabilityInvalid,
    #[error("plugin_id_invalid")]
    PluginIdInvalid,
    #[error("plugin_version_invalid")]
    PluginVersionInvalid,
    #[error("plugin_not_authorized")]
    PluginNotAuthorized,
    #[error("plugin_not_allowlisted")]
    PluginNotAllowlisted,
    #[error("plugin_signature_invalid")]
    PluginSignatureInvalid,
}

impl TrustError {
    /// The closed-set reason string carried in status/denial fields.
    pub fn reason(self) -> &'static str {
        match self {
            TrustError::AdapterSchemaInvalid => "adapter_schema_invalid",
            TrustError::AdapterNotAllowlisted => "adapter_not_allowlisted",
            TrustError::AdapterUiExtensionInvalid => "adapter_ui_extension_invalid",
            TrustError::AdapterSurfaceNotAllowed => "adapter_surface_not_allowed",
            TrustError::AdapterContractMismatch => "adapter_contract_mismatch",
            TrustError::AdapterVersionIncompatible => "adapter_version_incompatible",
            TrustError::AdapterCapabilityInvalid => "adapter_capability_invalid",
            TrustError::PluginIdInvalid => "plugin_id_invalid",
            TrustError::PluginVersionInvalid => "plugin_version_invalid",
            TrustError::PluginNotAuthorized => "plugin_not_authorized",
            TrustError::PluginNotAllowlisted => "plugin_not_allowlisted",
            TrustError::PluginSignatureInvalid => "plugin_signature_invalid",
        }
    }
}

/// Closed-set reasons for federation bridge rejections (component H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("metadata_missing")]
    MetadataMissing,
    #[error("non_deterministic")]
    NonDeterministic,
    #[error("source_not_allowed")]
    SourceNotAllowed,
    #[error("source_timestamp_missing")]
    SourceTimestampMissing,
    #[error("source_timestamp_regressed")]
    SourceTimestampRegressed,
    #[error("timestamp_overflow")]
    TimestampOverflow,
    #[error("latency_budget_exceeded")]
    LatencyBudgetExceeded,
    #[error("future_skew_exceeded")]
    FutureSkewExceeded,
    #[error("key_window_invalid")]
    KeyWindowInvalid,
    #[error("key_expired")]
    KeyExpired,
    #[error("untrusted_key")]
    UntrustedKey,
    #[error("attestation_missing")]
    AttestationMissing,
    #[error("unsupported_format")]
    UnsupportedFormat,
    #[error("tick_step_invalid")]
    TickStepInvalid,
}

impl BridgeError {
    pub fn reason(self) -> &'static str {
        match self {
            BridgeError::MetadataMissing => "metadata_missing",
            BridgeError::NonDeterministic => "non_deterministic",
            BridgeError::SourceNotAllowed => "source_not_allowed",
            BridgeError::SourceTimestampMissing => "source_timestamp_missing",
            BridgeError::SourceTimestampRegressed => "source_timestamp_regressed",
            BridgeError::TimestampOverflow => "timestamp_overflow",
            BridgeError::LatencyBudgetExceeded => "latency_budget_exceeded",
            BridgeError::FutureSkewExceeded => "future_skew_exceeded",
            BridgeError::KeyWindowInvalid => "key_window_invalid",
            BridgeError::KeyExpired => "key_expired",
            BridgeError::UntrustedKey => "untrusted_key",
            BridgeError::AttestationMissing => "attestation_missing",
            BridgeError::UnsupportedFormat => "unsupported_format",
            BridgeError::TickStepInvalid => "tick_step_invalid",
        }
    }
}

/// Embedded (never thrown) reason a mode ladder fell back to `Hold` or
/// rejected a candidate sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModeDenial {
    #[error("no_sensors")]
    NoSensors,
    #[error("provenance_denied")]
    ProvenanceDenied,
    #[error("auth_denied")]
    AuthDenied,
    #[error("lockout")]
    Lockout,
    #[error("disagreement")]
    Disagreement,
}
