//! Federation bridge (component H).
//!
//! Wraps a serialized envelope in a `FederationEventFrame`, assigning a
//! monotonic logical tick and an event timestamp derived from it, and
//! enforces the publish-time invariants: deterministic-envelope
//! requirement, source-id allowlisting, source-timestamp presence and
//! monotonicity, latency budget, future-skew, federate key-window trust,
//! and (for fanout) atomic-on-failure delivery to every configured
//! endpoint, each gated by its own trusted-key intersection and
//! attestation requirement.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::envelope::{serialize_external_io_envelope, ExternalIoEnvelope};
use crate::error::BridgeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub endpoint_id: String,
    pub output_format_name: String,
    pub enabled: bool,
    pub require_attestation: bool,
    pub trusted_key_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationBridgeConfig {
    pub federate_id: String,
    pub route_domain: String,
    pub output_format_name: String,
    pub start_logical_tick: u64,
    pub tick_step: u64,
    pub tick_duration_ms: u64,
    pub start_timestamp_ms: u64,
    pub max_latency_budget_ms: f64,
    pub max_future_skew_ms: f64,
    pub require_deterministic: bool,
    pub require_source_timestamp: bool,
    pub require_monotonic_source_timestamp: bool,
    pub allowed_source_ids: Vec<String>,
    pub federate_key_id: String,
    pub federate_key_epoch: u64,
    pub federate_key_valid_from_timestamp_ms: u64,
    pub federate_key_valid_until_timestamp_ms: u64,
    pub require_federate_attestation: bool,
    pub federate_attestation_tag: String,
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for FederationBridgeConfig {
    fn default() -> Self {
        Self {
            federate_id: "airtrace".to_string(),
            route_domain: "default".to_string(),
            output_format_name: "json".to_string(),
            start_logical_tick: 0,
            tick_step: 1,
            tick_duration_ms: 100,
            start_timestamp_ms: 0,
            max_latency_budget_ms: f64::INFINITY,
            max_future_skew_ms: f64::INFINITY,
            require_deterministic: true,
            require_source_timestamp: true,
            require_monotonic_source_timestamp: true,
            allowed_source_ids: Vec::new(),
            federate_key_id: String::new(),
            federate_key_epoch: 0,
            federate_key_valid_from_timestamp_ms: 0,
            federate_key_valid_until_timestamp_ms: u64::MAX,
            require_federate_attestation: false,
            federate_attestation_tag: String::new(),
            endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederationEventFrame {
    pub schema_version: String,
    pub interface_id: String,
    pub endpoint_id: String,
    pub federate_id: String,
    pub federate_key_id: String,
    pub federate_key_epoch: u64,
    pub federate_key_valid_until_timestamp_ms: u64,
    pub federate_attestation_tag: String,
    pub route_key: String,
    pub route_sequence: u64,
    pub logical_tick: u64,
    pub event_timestamp_ms: u64,
    pub source_timestamp_ms: u64,
    pub source_latency_ms: f64,
    pub latency_budget_ms: f64,
    pub source_id: String,
    pub payload_format: String,
    pub seed: u64,
    pub deterministic: bool,
    pub payload: String,
}

#[derive(Debug, Clone, Default)]
pub struct FederationBridgeResult {
    pub ok: bool,
    pub frame: FederationEventFrame,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct FederationFanoutResult {
    pub ok: bool,
    pub frames: HashMap<String, FederationEventFrame>,
    pub error: String,
}

/// Renders a frame as JSON. Field order follows declaration order, which
/// matches the canonical key order other federation consumers expect.
pub fn serialize_federation_event_frame_json(frame: &FederationEventFrame) -> String {
    serde_json::to_string(frame).expect("FederationEventFrame always serializes")
}

fn will_overflow_mul(a: u64, b: u64) -> bool {
    a != 0 && b != 0 && a > u64::MAX / b
}

fn will_overflow_add(a: u64, b: u64) -> bool {
    a > u64::MAX - b
}

fn route_key(domain: &str, platform_profile: &str, source_id: &str) -> String {
    format!("{domain}/{platform_profile}/{source_id}")
}

struct FrameInputs {
    source_id: String,
    key: String,
    source_timestamp_ms: u64,
    source_latency_ms: f64,
}

/// Per-route sequencing and timestamp state, plus the shared logical
/// tick counter, carried across successive `publish`/`publish_fanout`
/// calls. Sequencing is keyed on `(route_key, endpoint_id)` so fanout
/// endpoints each get their own monotonic counter.
#[derive(Debug, Clone)]
pub struct FederationBridge {
    config: FederationBridgeConfig,
    next_logical_tick: u64,
    route_sequence_by_key: HashMap<(String, String), u64>,
    last_source_timestamp_by_key: HashMap<String, u64>,
}

impl FederationBridge {
    pub fn new(config: FederationBridgeConfig) -> Self {
        let next_logical_tick = config.start_logical_tick;
        Self {
            config,
            next_logical_tick,
            route_sequence_by_key: HashMap::new(),
            last_source_timestamp_by_key: HashMap::new(),
        }
    }

    fn validate_config(&self) -> Result<(), BridgeError> {
        if self.config.tick_step == 0 || self.config.tick_duration_ms == 0 {
            return Err(BridgeError::TickStepInvalid);
        }
        if self.config.max_latency_budget_ms < 0.0 {
            return Err(BridgeError::LatencyBudgetExceeded);
        }
        if self.config.federate_key_valid_from_timestamp_ms > self.config.federate_key_valid_until_timestamp_ms {
            return Err(BridgeError::KeyWindowInvalid);
        }
        Ok(())
    }

    fn event_timestamp(&self) -> Result<u64, BridgeError> {
        if will_overflow_mul(self.next_logical_tick, self.config.tick_duration_ms) {
            return Err(BridgeError::TimestampOverflow);
        }
        let offset_ms = self.next_logical_tick * self.config.tick_duration_ms;
        if will_overflow_add(self.config.start_timestamp_ms, offset_ms) {
            return Err(BridgeError::TimestampOverflow);
        }
        Ok(self.config.start_timestamp_ms + offset_ms)
    }

    /// Steps 1-8 of the publish pipeline: envelope presence, determinism,
    /// source allowlisting, source-timestamp gating, latency budget,
    /// future skew, and federate key-window trust. Shared by `publish`
    /// and `publish_fanout`, which repeat this once per call.
    fn validate_envelope(&self, envelope: &ExternalIoEnvelope, event_timestamp_ms: u64) -> Result<FrameInputs, BridgeError> {
        if envelope.metadata.schema_version.is_empty() || envelope.metadata.interface_id.is_empty() {
            return Err(BridgeError::MetadataMissing);
        }
        if envelope.mode.active_mode.is_empty() {
            return Err(BridgeError::MetadataMissing);
        }
        if self.config.require_deterministic && !envelope.metadata.deterministic {
            return Err(BridgeError::NonDeterministic);
        }

        let source_id = if envelope.front_view.source_id.is_empty() {
            envelope.mode.active_mode.clone()
        } else {
            envelope.front_view.source_id.clone()
        };
        if !self.config.allowed_source_ids.is_empty() && !self.config.allowed_source_ids.contains(&source_id) {
            return Err(BridgeError::SourceNotAllowed);
        }

        let key = route_key(&self.config.route_domain, &envelope.metadata.platform_profile, &source_id);

        let source_timestamp_ms = envelope.front_view.timestamp_ms;
        if self.config.require_source_timestamp && source_timestamp_ms == 0 {
            return Err(BridgeError::SourceTimestampMissing);
        }
        if self.config.require_monotonic_source_timestamp {
            if let Some(&last) = self.last_source_timestamp_by_key.get(&key) {
                if source_timestamp_ms < last {
                    return Err(BridgeError::SourceTimestampRegressed);
                }
            }
        }

        let source_latency_ms;
        if event_timestamp_ms >= source_timestamp_ms {
            source_latency_ms = (event_timestamp_ms - source_timestamp_ms) as f64;
        } else {
            source_latency_ms = 0.0;
            let skew_ms = (source_timestamp_ms - event_timestamp_ms) as f64;
            if skew_ms > self.config.max_future_skew_ms {
                return Err(BridgeError::FutureSkewExceeded);
            }
        }
        if source_latency_ms > self.config.max_latency_budget_ms {
            return Err(BridgeError::LatencyBudgetExceeded);
        }

        if event_timestamp_ms < self.config.federate_key_valid_from_timestamp_ms
            || event_timestamp_ms > self.config.federate_key_valid_until_timestamp_ms
        {
            return Err(BridgeError::KeyExpired);
        }

        Ok(FrameInputs { source_id, key, source_timestamp_ms, source_latency_ms })
    }

    fn build_frame(
        &mut self,
        envelope: &ExternalIoEnvelope,
        inputs: &FrameInputs,
        endpoint_id: &str,
        output_format_name: &str,
        event_timestamp_ms: u64,
    ) -> Result<FederationEventFrame, BridgeError> {
        let serialized = serialize_external_io_envelope(output_format_name, envelope)
            .map_err(|_| BridgeError::UnsupportedFormat)?;

        let sequence_key = (inputs.key.clone(), endpoint_id.to_string());
        let sequence = *self.route_sequence_by_key.get(&sequence_key).unwrap_or(&0);

        Ok(FederationEventFrame {
            schema_version: "1.0.0".to_string(),
            interface_id: "airtrace.federation_event".to_string(),
            endpoint_id: endpoint_id.to_string(),
            federate_id: self.config.federate_id.clone(),
            federate_key_id: self.config.federate_key_id.clone(),
            federate_key_epoch: self.config.federate_key_epoch,
            federate_key_valid_until_timestamp_ms: self.config.federate_key_valid_until_timestamp_ms,
            federate_attestation_tag: self.config.federate_attestation_tag.clone(),
            route_key: inputs.key.clone(),
            route_sequence: sequence,
            logical_tick: self.next_logical_tick,
            event_timestamp_ms,
            source_timestamp_ms: inputs.source_timestamp_ms,
            source_latency_ms: inputs.source_latency_ms,
            latency_budget_ms: self.config.max_latency_budget_ms,
            source_id: inputs.source_id.clone(),
            payload_format: output_format_name.to_string(),
            seed: envelope.metadata.seed,
            deterministic: envelope.metadata.deterministic,
            payload: serialized,
        })
    }

    fn commit(&mut self, key: &str, source_timestamp_ms: u64, sequence_keys: &[(String, String)]) -> Result<(), BridgeError> {
        if will_overflow_add(self.next_logical_tick, self.config.tick_step) {
            return Err(BridgeError::TimestampOverflow);
        }
        self.last_source_timestamp_by_key.insert(key.to_string(), source_timestamp_ms);
        for sequence_key in sequence_keys {
            let counter = self.route_sequence_by_key.entry(sequence_key.clone()).or_insert(0);
            *counter += 1;
        }
        self.next_logical_tick += self.config.tick_step;
        Ok(())
    }

    /// Publishes a single frame to the bridge's default output format
    /// and endpoint. On failure, no bookkeeping (logical tick, route
    /// sequence, source timestamp) is advanced.
    pub fn publish(&mut self, envelope: &ExternalIoEnvelope) -> FederationBridgeResult {
        let err = |e: BridgeError| FederationBridgeResult { ok: false, frame: FederationEventFrame::default(), error: e.reason().to_string() };

        if let Err(e) = self.validate_config() {
            return err(e);
        }
        let event_timestamp_ms = match self.event_timestamp() {
            Ok(ts) => ts,
            Err(e) => return err(e),
        };
        let inputs = match self.validate_envelope(envelope, event_timestamp_ms) {
            Ok(inputs) => inputs,
            Err(e) => return err(e),
        };

        let output_format_name = self.config.output_format_name.clone();
        let frame = match self.build_frame(envelope, &inputs, "endpoint_default", &output_format_name, event_timestamp_ms) {
            Ok(frame) => frame,
            Err(e) => return err(e),
        };

        let sequence_key = (inputs.key.clone(), "endpoint_default".to_string());
        if let Err(e) = self.commit(&inputs.key, inputs.source_timestamp_ms, &[sequence_key]) {
            return err(e);
        }
        FederationBridgeResult { ok: true, frame, error: String::new() }
    }

    /// Publishes to every enabled endpoint in configured order. Each
    /// endpoint's `trusted_key_ids` must contain the bridge's
    /// `federate_key_id` (an empty list trusts nothing); attestation is
    /// required when either the bridge or the endpoint demands it.
    /// Atomic on failure: if any endpoint rejects, nothing is committed
    /// and no frame is returned for any endpoint.
    pub fn publish_fanout(&mut self, envelope: &ExternalIoEnvelope) -> FederationFanoutResult {
        let err = |e: BridgeError| FederationFanoutResult { ok: false, frames: HashMap::new(), error: e.reason().to_string() };

        if let Err(e) = self.validate_config() {
            return err(e);
        }
        let event_timestamp_ms = match self.event_timestamp() {
            Ok(ts) => ts,
            Err(e) => return err(e),
        };
        let inputs = match self.validate_envelope(envelope, event_timestamp_ms) {
            Ok(inputs) => inputs,
            Err(e) => return err(e),
        };

        let endpoints: Vec<EndpointConfig> = self.config.endpoints.iter().filter(|e| e.enabled).cloned().collect();
        if endpoints.is_empty() {
            return FederationFanoutResult { ok: false, frames: HashMap::new(), error: "no enabled endpoints".to_string() };
        }

        let mut frames = HashMap::new();
        let mut sequence_keys = Vec::new();
        for endpoint in &endpoints {
            if !endpoint.trusted_key_ids.iter().any(|id| *id == self.config.federate_key_id) {
                return err(BridgeError::UntrustedKey);
            }
            let attestation_required = self.config.require_federate_attestation || endpoint.require_attestation;
            if attestation_required && self.config.federate_attestation_tag.is_empty() {
                return err(BridgeError::AttestationMissing);
            }

            match self.build_frame(envelope, &inputs, &endpoint.endpoint_id, &endpoint.output_format_name, event_timestamp_ms) {
                Ok(frame) => {
                    sequence_keys.push((inputs.key.clone(), endpoint.endpoint_id.clone()));
                    frames.insert(endpoint.endpoint_id.clone(), frame);
                }
                Err(e) => return err(e),
            }
        }

        if let Err(e) = self.commit(&inputs.key, inputs.source_timestamp_ms, &sequence_keys) {
            return err(e);
        }
        FederationFanoutResult { ok: true, frames, error: String::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ExternalIoFrontViewRecord, ExternalIoMetadata, ExternalIoModeRecord};

    fn sample_envelope() -> ExternalIoEnvelope {
        let mut envelope = ExternalIoEnvelope::default();
        envelope.metadata = ExternalIoMetadata {
            schema_version: "1.0.0".to_string(),
            interface_id: "airtrace.external_io".to_string(),
            platform_profile: "air".to_string(),
            adapter_id: String::new(),
            adapter_version: String::new(),
            ui_surface: String::new(),
            seed: 42,
            deterministic: true,
        };
        envelope.mode = ExternalIoModeRecord {
            active_mode: "gps".to_string(),
            ..Default::default()
        };
        envelope.front_view = ExternalIoFrontViewRecord {
            source_id: "platform-a".to_string(),
            timestamp_ms: 1_000,
            ..Default::default()
        };
        envelope
    }

    #[test]
    fn publish_assigns_logical_tick_and_advances() {
        let config = FederationBridgeConfig { tick_step: 1, ..FederationBridgeConfig::default() };
        let mut bridge = FederationBridge::new(config);
        let r1 = bridge.publish(&sample_envelope());
        assert!(r1.ok, "{}", r1.error);
        assert_eq!(r1.frame.logical_tick, 0);
        assert_eq!(r1.frame.route_sequence, 0);

        let mut env2 = sample_envelope();
        env2.front_view.timestamp_ms = 2_000;
        let r2 = bridge.publish(&env2);
        assert!(r2.ok);
        assert_eq!(r2.frame.logical_tick, 1);
        assert_eq!(r2.frame.route_sequence, 1);
    }

    #[test]
    fn non_deterministic_envelope_is_rejected() {
        let mut bridge = FederationBridge::new(FederationBridgeConfig::default());
        let mut envelope = sample_envelope();
        envelope.metadata.deterministic = false;
        let result = bridge.publish(&envelope);
        assert!(!result.ok);
        assert_eq!(result.error, "non_deterministic");
    }

    #[test]
    fn regressed_source_timestamp_is_rejected() {
        let mut bridge = FederationBridge::new(FederationBridgeConfig::default());
        assert!(bridge.publish(&sample_envelope()).ok);

        let mut regressed = sample_envelope();
        regressed.front_view.timestamp_ms = 500;
        let result = bridge.publish(&regressed);
        assert!(!result.ok);
        assert_eq!(result.error, "source_timestamp_regressed");
    }

    #[test]
    fn latency_budget_is_enforced() {
        let config = FederationBridgeConfig {
            max_latency_budget_ms: 10.0,
            start_timestamp_ms: 50_000,
            ..FederationBridgeConfig::default()
        };
        let mut bridge = FederationBridge::new(config);
        let result = bridge.publish(&sample_envelope());
        assert!(!result.ok);
        assert_eq!(result.error, "latency_budget_exceeded");
    }

    #[test]
    fn source_not_allowed_is_rejected_and_state_is_untouched() {
        let config = FederationBridgeConfig {
            allowed_source_ids: vec!["other".to_string()],
            ..FederationBridgeConfig::default()
        };
        let mut bridge = FederationBridge::new(config);
        let result = bridge.publish(&sample_envelope());
        assert!(!result.ok);
        assert_eq!(result.error, "source_not_allowed");
        assert_eq!(bridge.next_logical_tick, 0);
    }

    #[test]
    fn event_timestamp_outside_key_validity_window_is_rejected() {
        let config = FederationBridgeConfig {
            start_timestamp_ms: 10_000,
            federate_key_valid_until_timestamp_ms: 5_000,
            ..FederationBridgeConfig::default()
        };
        let mut bridge = FederationBridge::new(config);
        let result = bridge.publish(&sample_envelope());
        assert!(!result.ok);
        assert_eq!(result.error, "key_expired");
    }

    #[test]
    fn fanout_rejects_endpoint_without_matching_trusted_key() {
        let config = FederationBridgeConfig {
            federate_key_id: "key-1".to_string(),
            endpoints: vec![EndpointConfig {
                endpoint_id: "ops".to_string(),
                output_format_name: "json".to_string(),
                enabled: true,
                require_attestation: false,
                trusted_key_ids: vec!["key-2".to_string()],
            }],
            ..FederationBridgeConfig::default()
        };
        let mut bridge = FederationBridge::new(config);
        let result = bridge.publish_fanout(&sample_envelope());
        assert!(!result.ok);
        assert_eq!(result.error, "untrusted_key");
    }

    #[test]
    fn fanout_requires_attestation_tag_when_endpoint_demands_it() {
        let config = FederationBridgeConfig {
            federate_key_id: "key-1".to_string(),
            endpoints: vec![EndpointConfig {
                endpoint_id: "ops".to_string(),
                output_format_name: "json".to_string(),
                enabled: true,
                require_attestation: true,
                trusted_key_ids: vec!["key-1".to_string()],
            }],
            ..FederationBridgeConfig::default()
        };
        let mut bridge = FederationBridge::new(config);
        let result = bridge.publish_fanout(&sample_envelope());
        assert!(!result.ok);
        assert_eq!(result.error, "attestation_missing");
    }

    #[test]
    fn fanout_succeeds_to_every_enabled_endpoint_with_independent_sequencing() {
        let config = FederationBridgeConfig {
            federate_id: "airtrace-hub".to_string(),
            federate_key_id: "key-1".to_string(),
            federate_attestation_tag: "tag-1".to_string(),
            endpoints: vec![
                EndpointConfig {
                    endpoint_id: "ops".to_string(),
                    output_format_name: "json".to_string(),
                    enabled: true,
                    require_attestation: true,
                    trusted_key_ids: vec!["key-1".to_string()],
                },
                EndpointConfig {
                    endpoint_id: "archive".to_string(),
                    output_format_name: "kv".to_string(),
                    enabled: true,
                    require_attestation: false,
                    trusted_key_ids: vec!["key-1".to_string()],
                },
                EndpointConfig {
                    endpoint_id: "disabled".to_string(),
                    output_format_name: "json".to_string(),
                    enabled: false,
                    require_attestation: false,
                    trusted_key_ids: vec!["key-1".to_string()],
                },
            ],
            ..FederationBridgeConfig::default()
        };
        let mut bridge = FederationBridge::new(config);
        let result = bridge.publish_fanout(&sample_envelope());
        assert!(result.ok, "{}", result.error);
        assert_eq!(result.frames.len(), 2);
        assert!(result.frames.contains_key("ops"));
        assert!(result.frames.contains_key("archive"));
        assert_eq!(result.frames["ops"].payload_format, "json");
        assert_eq!(result.frames["archive"].payload_format, "kv");
        assert_eq!(result.frames["ops"].route_sequence, 0);
    }
}
