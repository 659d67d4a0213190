//! External IO envelope codec (component G).
//!
//! `ExternalIoEnvelope` is flattened to a sorted flat key-value map and
//! rendered in one of two wire formats (`ie_json_v1`/`json`,
//! `ie_kv_v1`/`kv`/`keyvalue`), or parsed back the other way. `BTreeMap`
//! gives the sorted iteration the C++ original got from `std::map` for
//! free, which is what makes the serialized key order deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoEnvelopeFormat {
    Json,
    KeyValue,
}

pub struct IoEnvelopeCodecDescriptor {
    pub canonical_name: &'static str,
    pub aliases: &'static [&'static str],
}

const CODECS: &[(IoEnvelopeFormat, &str, &[&str])] = &[
    (IoEnvelopeFormat::Json, "ie_json_v1", &["json"]),
    (IoEnvelopeFormat::KeyValue, "ie_kv_v1", &["kv", "keyvalue"]),
];

pub fn parse_io_envelope_format(text: &str) -> Option<IoEnvelopeFormat> {
    let normalized = text.trim().to_lowercase();
    for (format, canonical, aliases) in CODECS {
        if normalized == *canonical || aliases.contains(&normalized.as_str()) {
            return Some(*format);
        }
    }
    None
}

pub fn list_io_envelope_codecs() -> Vec<IoEnvelopeCodecDescriptor> {
    CODECS
        .iter()
        .map(|(_, canonical, aliases)| IoEnvelopeCodecDescriptor { canonical_name: canonical, aliases })
        .collect()
}

pub fn is_supported_io_envelope_format(text: &str) -> bool {
    parse_io_envelope_format(text).is_some()
}

pub fn io_envelope_format_name(format: IoEnvelopeFormat) -> &'static str {
    CODECS.iter().find(|(f, ..)| *f == format).map(|(_, name, _)| *name).unwrap_or("unknown")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIoMetadata {
    pub schema_version: String,
    pub interface_id: String,
    pub platform_profile: String,
    pub adapter_id: String,
    pub adapter_version: String,
    pub ui_surface: String,
    pub seed: u64,
    pub deterministic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIoSensorRecord {
    pub sensor_id: String,
    pub available: bool,
    pub healthy: bool,
    pub has_measurement: bool,
    pub freshness_seconds: f64,
    pub confidence: f64,
    pub last_error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIoModeRecord {
    pub active_mode: String,
    pub confidence: f64,
    pub decision_reason: String,
    pub denial_reason: String,
    pub ladder_status: String,
    pub contributors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIoFrontViewRecord {
    pub active_mode: String,
    pub view_state: String,
    pub frame_id: String,
    pub source_id: String,
    pub sensor_type: String,
    pub sequence: u32,
    pub timestamp_ms: u64,
    pub frame_age_ms: f64,
    pub acquisition_latency_ms: f64,
    pub processing_latency_ms: f64,
    pub render_latency_ms: f64,
    pub latency_ms: f64,
    pub dropped_frames: i32,
    pub drop_reason: String,
    pub spoof_active: bool,
    pub confidence: f64,
    pub provenance: String,
    pub auth_status: String,
    pub stream_id: String,
    pub stream_index: u32,
    pub stream_count: u32,
    pub max_concurrent_views: u32,
    pub stabilization_mode: String,
    pub stabilization_active: bool,
    pub stabilization_error_deg: f64,
    pub gimbal_yaw_deg: f64,
    pub gimbal_pitch_deg: f64,
    pub gimbal_yaw_rate_deg_per_sec: f64,
    pub gimbal_pitch_rate_deg_per_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIoFrontViewStreamRecord {
    pub stream_id: String,
    pub active_mode: String,
    pub frame_id: String,
    pub sensor_type: String,
    pub sequence: u32,
    pub timestamp_ms: u64,
    pub frame_age_ms: f64,
    pub latency_ms: f64,
    pub confidence: f64,
    pub stabilization_mode: String,
    pub stabilization_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIoEnvelope {
    pub metadata: ExternalIoMetadata,
    pub sensors: Vec<ExternalIoSensorRecord>,
    pub mode: ExternalIoModeRecord,
    pub front_view: ExternalIoFrontViewRecord,
    pub front_view_streams: Vec<ExternalIoFrontViewStreamRecord>,
    pub disqualified_sources: String,
    pub lockout_status: String,
    pub auth_status: String,
    pub provenance_status: String,
    pub logging_status: String,
    pub adapter_status: String,
    pub adapter_reason: String,
    pub adapter_fields: String,
}

fn format_double_exact(value: f64) -> String {
    // Rust's `f64` Display already emits the shortest decimal that
    // round-trips exactly, which is what `max_digits10` precision was
    // approximating in the source.
    format!("{value}")
}

fn parse_double_strict(value: &str) -> Option<f64> {
    let parsed: f64 = value.parse().ok()?;
    parsed.is_finite().then_some(parsed)
}

fn parse_bool_strict(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_unsigned_strict(value: &str) -> Option<u32> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn parse_u64_strict(value: &str) -> Option<u64> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn parse_int_strict(value: &str) -> Option<i32> {
    if value.is_empty() {
        return None;
    }
    value.parse().ok()
}

fn flatten_envelope(envelope: &ExternalIoEnvelope) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    flat.insert("schema_version".to_string(), envelope.metadata.schema_version.clone());
    flat.insert("interface_id".to_string(), envelope.metadata.interface_id.clone());
    flat.insert("metadata.platform_profile".to_string(), envelope.metadata.platform_profile.clone());
    flat.insert("metadata.adapter_id".to_string(), envelope.metadata.adapter_id.clone());
    flat.insert("metadata.adapter_version".to_string(), envelope.metadata.adapter_version.clone());
    flat.insert("metadata.ui_surface".to_string(), envelope.metadata.ui_surface.clone());
    flat.insert("metadata.seed".to_string(), envelope.metadata.seed.to_string());
    flat.insert("metadata.deterministic".to_string(), envelope.metadata.deterministic.to_string());

    flat.insert("mode.active".to_string(), envelope.mode.active_mode.clone());
    flat.insert("mode.confidence".to_string(), format_double_exact(envelope.mode.confidence));
    flat.insert("mode.decision_reason".to_string(), envelope.mode.decision_reason.clone());
    flat.insert("mode.denial_reason".to_string(), envelope.mode.denial_reason.clone());
    flat.insert("mode.ladder_status".to_string(), envelope.mode.ladder_status.clone());
    flat.insert("mode.contributors".to_string(), envelope.mode.contributors.join(","));

    flat.insert("sensor.count".to_string(), envelope.sensors.len().to_string());
    for (idx, sensor) in envelope.sensors.iter().enumerate() {
        let prefix = format!("sensor.{idx}.");
        flat.insert(format!("{prefix}id"), sensor.sensor_id.clone());
        flat.insert(format!("{prefix}available"), sensor.available.to_string());
        flat.insert(format!("{prefix}healthy"), sensor.healthy.to_string());
        flat.insert(format!("{prefix}has_measurement"), sensor.has_measurement.to_string());
        flat.insert(format!("{prefix}freshness_seconds"), format_double_exact(sensor.freshness_seconds));
        flat.insert(format!("{prefix}confidence"), format_double_exact(sensor.confidence));
        flat.insert(format!("{prefix}last_error"), sensor.last_error.clone());
    }

    let fv = &envelope.front_view;
    flat.insert("front_view.active_mode".to_string(), fv.active_mode.clone());
    flat.insert("front_view.view_state".to_string(), fv.view_state.clone());
    flat.insert("front_view.frame_id".to_string(), fv.frame_id.clone());
    flat.insert("front_view.source_id".to_string(), fv.source_id.clone());
    flat.insert("front_view.sensor_type".to_string(), fv.sensor_type.clone());
    flat.insert("front_view.sequence".to_string(), fv.sequence.to_string());
    flat.insert("front_view.timestamp_ms".to_string(), fv.timestamp_ms.to_string());
    flat.insert("front_view.frame_age_ms".to_string(), format_double_exact(fv.frame_age_ms));
    flat.insert("front_view.acquisition_latency_ms".to_string(), format_double_exact(fv.acquisition_latency_ms));
    flat.insert("front_view.processing_latency_ms".to_string(), format_double_exact(fv.processing_latency_ms));
    flat.insert("front_view.render_latency_ms".to_string(), format_double_exact(fv.render_latency_ms));
    flat.insert("front_view.latency_ms".to_string(), format_double_exact(fv.latency_ms));
    flat.insert("front_view.dropped_frames".to_string(), fv.dropped_frames.to_string());
    flat.insert("front_view.drop_reason".to_string(), fv.drop_reason.clone());
    flat.insert("front_view.spoof_active".to_string(), fv.spoof_active.to_string());
    flat.insert("front_view.confidence".to_string(), format_double_exact(fv.confidence));
    flat.insert("front_view.provenance".to_string(), fv.provenance.clone());
    flat.insert("front_view.auth_status".to_string(), fv.auth_status.clone());
    flat.insert("front_view.stream_id".to_string(), fv.stream_id.clone());
    flat.insert("front_view.stream_index".to_string(), fv.stream_index.to_string());
    flat.insert("front_view.stream_count".to_string(), fv.stream_count.to_string());
    flat.insert("front_view.max_concurrent_views".to_string(), fv.max_concurrent_views.to_string());
    flat.insert("front_view.stabilization_mode".to_string(), fv.stabilization_mode.clone());
    flat.insert("front_view.stabilization_active".to_string(), fv.stabilization_active.to_string());
    flat.insert("front_view.stabilization_error_deg".to_string(), format_double_exact(fv.stabilization_error_deg));
    flat.insert("front_view.gimbal_yaw_deg".to_string(), format_double_exact(fv.gimbal_yaw_deg));
    flat.insert("front_view.gimbal_pitch_deg".to_string(), format_double_exact(fv.gimbal_pitch_deg));
    flat.insert("front_view.gimbal_yaw_rate_deg_s".to_string(), format_double_exact(fv.gimbal_yaw_rate_deg_per_sec));
    flat.insert("front_view.gimbal_pitch_rate_deg_s".to_string(), format_double_exact(fv.gimbal_pitch_rate_deg_per_sec));

    flat.insert("front_view_stream.count".to_string(), envelope.front_view_streams.len().to_string());
    for (idx, stream) in envelope.front_view_streams.iter().enumerate() {
        let prefix = format!("front_view_stream.{idx}.");
        flat.insert(format!("{prefix}stream_id"), stream.stream_id.clone());
        flat.insert(format!("{prefix}active_mode"), stream.active_mode.clone());
        flat.insert(format!("{prefix}frame_id"), stream.frame_id.clone());
        flat.insert(format!("{prefix}sensor_type"), stream.sensor_type.clone());
        flat.insert(format!("{prefix}sequence"), stream.sequence.to_string());
        flat.insert(format!("{prefix}timestamp_ms"), stream.timestamp_ms.to_string());
        flat.insert(format!("{prefix}frame_age_ms"), format_double_exact(stream.frame_age_ms));
        flat.insert(format!("{prefix}latency_ms"), format_double_exact(stream.latency_ms));
        flat.insert(format!("{prefix}confidence"), format_double_exact(stream.confidence));
        flat.insert(format!("{prefix}stabilization_mode"), stream.stabilization_mode.clone());
        flat.insert(format!("{prefix}stabilization_active"), stream.stabilization_active.to_string());
    }

    flat.insert("status.disqualified_sources".to_string(), envelope.disqualified_sources.clone());
    flat.insert("status.lockout_status".to_string(), envelope.lockout_status.clone());
    flat.insert("status.auth_status".to_string(), envelope.auth_status.clone());
    flat.insert("status.provenance_status".to_string(), envelope.provenance_status.clone());
    flat.insert("status.logging_status".to_string(), envelope.logging_status.clone());
    flat.insert("status.adapter_status".to_string(), envelope.adapter_status.clone());
    flat.insert("status.adapter_reason".to_string(), envelope.adapter_reason.clone());
    flat.insert("status.adapter_fields".to_string(), envelope.adapter_fields.clone());

    flat
}

fn get<'a>(flat: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, CodecError> {
    flat.get(key).map(String::as_str).ok_or_else(|| CodecError::new(format!("missing key: {key}")))
}

fn get_opt(flat: &BTreeMap<String, String>, key: &str) -> String {
    flat.get(key).cloned().unwrap_or_default()
}

fn inflate_envelope(flat: &BTreeMap<String, String>) -> Result<ExternalIoEnvelope, CodecError> {
    let mut envelope = ExternalIoEnvelope::default();

    envelope.metadata.schema_version = get(flat, "schema_version")?.to_string();
    envelope.metadata.interface_id = get(flat, "interface_id")?.to_string();
    envelope.metadata.platform_profile = get(flat, "metadata.platform_profile")?.to_string();
    envelope.metadata.adapter_id = get(flat, "metadata.adapter_id")?.to_string();
    envelope.metadata.adapter_version = get(flat, "metadata.adapter_version")?.to_string();
    envelope.metadata.ui_surface = get(flat, "metadata.ui_surface")?.to_string();
    envelope.metadata.seed = parse_unsigned_strict(get(flat, "metadata.seed")?)
        .ok_or_else(|| CodecError::new("invalid metadata.seed"))? as u64;
    envelope.metadata.deterministic = parse_bool_strict(get(flat, "metadata.deterministic")?)
        .ok_or_else(|| CodecError::new("invalid metadata.deterministic"))?;

    envelope.mode.active_mode = get(flat, "mode.active")?.to_string();
    envelope.mode.confidence = parse_double_strict(get(flat, "mode.confidence")?)
        .ok_or_else(|| CodecError::new("invalid mode.confidence"))?;
    envelope.mode.decision_reason = get_opt(flat, "mode.decision_reason");
    envelope.mode.denial_reason = get_opt(flat, "mode.denial_reason");
    envelope.mode.ladder_status = get_opt(flat, "mode.ladder_status");
    let contributors = get_opt(flat, "mode.contributors");
    if !contributors.is_empty() {
        envelope.mode.contributors = contributors.split(',').map(str::to_string).collect();
    }

    let sensor_count = parse_unsigned_strict(get(flat, "sensor.count")?)
        .ok_or_else(|| CodecError::new("invalid sensor.count"))?;
    let mut seen_ids = std::collections::HashSet::new();
    for idx in 0..sensor_count {
        let prefix = format!("sensor.{idx}.");
        let sensor_id = get(flat, &format!("{prefix}id"))?.to_string();
        if !seen_ids.insert(sensor_id.clone()) {
            return Err(CodecError::new(format!("duplicate sensor id: {sensor_id}")));
        }
        let sensor = ExternalIoSensorRecord {
            sensor_id,
            available: parse_bool_strict(get(flat, &format!("{prefix}available"))?)
                .ok_or_else(|| CodecError::new(format!("invalid sensor value at index {idx}")))?,
            healthy: parse_bool_strict(get(flat, &format!("{prefix}healthy"))?)
                .ok_or_else(|| CodecError::new(format!("invalid sensor value at index {idx}")))?,
            has_measurement: parse_bool_strict(get(flat, &format!("{prefix}has_measurement"))?)
                .ok_or_else(|| CodecError::new(format!("invalid sensor value at index {idx}")))?,
            freshness_seconds: parse_double_strict(get(flat, &format!("{prefix}freshness_seconds"))?)
                .ok_or_else(|| CodecError::new(format!("invalid sensor value at index {idx}")))?,
            confidence: parse_double_strict(get(flat, &format!("{prefix}confidence"))?)
                .ok_or_else(|| CodecError::new(format!("invalid sensor value at index {idx}")))?,
            last_error: get_opt(flat, &format!("{prefix}last_error")),
        };
        envelope.sensors.push(sensor);
    }

    let fv = &mut envelope.front_view;
    fv.active_mode = get_opt(flat, "front_view.active_mode");
    fv.view_state = get_opt(flat, "front_view.view_state");
    fv.frame_id = get_opt(flat, "front_view.frame_id");
    fv.source_id = get_opt(flat, "front_view.source_id");
    fv.sensor_type = get_opt(flat, "front_view.sensor_type");
    let invalid_fv = || CodecError::new("invalid front_view values");
    fv.sequence = parse_unsigned_strict(get(flat, "front_view.sequence")?).ok_or_else(invalid_fv)?;
    fv.timestamp_ms = parse_u64_strict(get(flat, "front_view.timestamp_ms")?).ok_or_else(invalid_fv)?;
    fv.frame_age_ms = parse_double_strict(get(flat, "front_view.frame_age_ms")?).ok_or_else(invalid_fv)?;
    fv.acquisition_latency_ms = parse_double_strict(get(flat, "front_view.acquisition_latency_ms")?).ok_or_else(invalid_fv)?;
    fv.processing_latency_ms = parse_double_strict(get(flat, "front_view.processing_latency_ms")?).ok_or_else(invalid_fv)?;
    fv.render_latency_ms = parse_double_strict(get(flat, "front_view.render_latency_ms")?).ok_or_else(invalid_fv)?;
    fv.latency_ms = parse_double_strict(get(flat, "front_view.latency_ms")?).ok_or_else(invalid_fv)?;
    fv.dropped_frames = parse_int_strict(get(flat, "front_view.dropped_frames")?).ok_or_else(invalid_fv)?;
    fv.spoof_active = parse_bool_strict(get(flat, "front_view.spoof_active")?).ok_or_else(invalid_fv)?;
    fv.confidence = parse_double_strict(get(flat, "front_view.confidence")?).ok_or_else(invalid_fv)?;
    fv.stream_index = parse_unsigned_strict(get(flat, "front_view.stream_index")?).ok_or_else(invalid_fv)?;
    fv.stream_count = parse_unsigned_strict(get(flat, "front_view.stream_count")?).ok_or_else(invalid_fv)?;
    fv.max_concurrent_views = parse_unsigned_strict(get(flat, "front_view.max_concurrent_views")?).ok_or_else(invalid_fv)?;
    fv.stabilization_active = parse_bool_strict(get(flat, "front_view.stabilization_active")?).ok_or_else(invalid_fv)?;
    fv.stabilization_error_deg = parse_double_strict(get(flat, "front_view.stabilization_error_deg")?).ok_or_else(invalid_fv)?;
    fv.gimbal_yaw_deg = parse_double_strict(get(flat, "front_view.gimbal_yaw_deg")?).ok_or_else(invalid_fv)?;
    fv.gimbal_pitch_deg = parse_double_strict(get(flat, "front_view.gimbal_pitch_deg")?).ok_or_else(invalid_fv)?;
    fv.gimbal_yaw_rate_deg_per_sec = parse_double_strict(get(flat, "front_view.gimbal_yaw_rate_deg_s")?).ok_or_else(invalid_fv)?;
    fv.gimbal_pitch_rate_deg_per_sec = parse_double_strict(get(flat, "front_view.gimbal_pitch_rate_deg_s")?).ok_or_else(invalid_fv)?;
    fv.drop_reason = get_opt(flat, "front_view.drop_reason");
    fv.provenance = get_opt(flat, "front_view.provenance");
    fv.auth_status = get_opt(flat, "front_view.auth_status");
    fv.stream_id = get_opt(flat, "front_view.stream_id");
    fv.stabilization_mode = get_opt(flat, "front_view.stabilization_mode");

    let stream_count = parse_unsigned_strict(get(flat, "front_view_stream.count")?)
        .ok_or_else(|| CodecError::new("invalid front_view_stream.count"))?;
    for idx in 0..stream_count {
        let prefix = format!("front_view_stream.{idx}.");
        let invalid_stream = || CodecError::new(format!("invalid front_view_stream values at index {idx}"));
        let stream = ExternalIoFrontViewStreamRecord {
            stream_id: get(flat, &format!("{prefix}stream_id"))?.to_string(),
            active_mode: get(flat, &format!("{prefix}active_mode"))?.to_string(),
            frame_id: get(flat, &format!("{prefix}frame_id"))?.to_string(),
            sensor_type: get(flat, &format!("{prefix}sensor_type"))?.to_string(),
            sequence: parse_unsigned_strict(get(flat, &format!("{prefix}sequence"))?).ok_or_else(invalid_stream)?,
            timestamp_ms: parse_u64_strict(get(flat, &format!("{prefix}timestamp_ms"))?).ok_or_else(invalid_stream)?,
            frame_age_ms: parse_double_strict(get(flat, &format!("{prefix}frame_age_ms"))?).ok_or_else(invalid_stream)?,
            latency_ms: parse_double_strict(get(flat, &format!("{prefix}latency_ms"))?).ok_or_else(invalid_stream)?,
            confidence: parse_double_strict(get(flat, &format!("{prefix}confidence"))?).ok_or_else(invalid_stream)?,
            stabilization_mode: get(flat, &format!("{prefix}stabilization_mode"))?.to_string(),
            stabilization_active: parse_bool_strict(get(flat, &format!("{prefix}stabilization_active"))?).ok_or_else(invalid_stream)?,
        };
        envelope.front_view_streams.push(stream);
    }

    envelope.disqualified_sources = get_opt(flat, "status.disqualified_sources");
    envelope.lockout_status = get_opt(flat, "status.lockout_status");
    envelope.auth_status = get_opt(flat, "status.auth_status");
    envelope.provenance_status = get_opt(flat, "status.provenance_status");
    envelope.logging_status = get_opt(flat, "status.logging_status");
    envelope.adapter_status = get_opt(flat, "status.adapter_status");
    envelope.adapter_reason = get_opt(flat, "status.adapter_reason");
    envelope.adapter_fields = get_opt(flat, "status.adapter_fields");

    if envelope.mode.active_mode.is_empty() {
        return Err(CodecError::new("mode.active is required"));
    }
    if envelope.front_view.stream_count > 0 && envelope.front_view.stream_index >= envelope.front_view.stream_count {
        return Err(CodecError::new("front_view.stream_index must be less than stream_count"));
    }
    if !envelope.front_view_streams.is_empty()
        && envelope.front_view.stream_count > 0
        && envelope.front_view.stream_count as usize != envelope.front_view_streams.len()
    {
        return Err(CodecError::new("front_view.stream_count must match stream records"));
    }

    Ok(envelope)
}

fn kv_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn kv_unescape(value: &str) -> Result<String, ()> {
    let mut out = String::with_capacity(value.len());
    let mut escape = false;
    for ch in value.chars() {
        if !escape {
            if ch == '\\' {
                escape = true;
            } else {
                out.push(ch);
            }
            continue;
        }
        match ch {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            _ => return Err(()),
        }
        escape = false;
    }
    if escape {
        Err(())
    } else {
        Ok(out)
    }
}

fn json_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// A strict flat-JSON-object parser: rejects nesting, arrays, and nulls
/// with the exact messages below, since those are all a flat key-value
/// map cannot represent.
fn parse_flat_json(payload: &str) -> Result<BTreeMap<String, String>, CodecError> {
    let bytes: Vec<char> = payload.chars().collect();
    let mut pos = 0usize;
    let err = |msg: &str| CodecError::new(msg.to_string());

    let skip_ws = |bytes: &[char], pos: &mut usize| {
        while *pos < bytes.len() && bytes[*pos].is_whitespace() {
            *pos += 1;
        }
    };

    skip_ws(&bytes, &mut pos);
    if bytes.get(pos) != Some(&'{') {
        return Err(err("json must start with '{'"));
    }
    pos += 1;
    skip_ws(&bytes, &mut pos);

    let mut out = BTreeMap::new();
    if bytes.get(pos) == Some(&'}') {
        pos += 1;
        return Ok(out);
    }

    fn parse_string(bytes: &[char], pos: &mut usize) -> Option<String> {
        if bytes.get(*pos) != Some(&'"') {
            return None;
        }
        *pos += 1;
        let mut value = String::new();
        while *pos < bytes.len() {
            let ch = bytes[*pos];
            *pos += 1;
            if ch == '"' {
                return Some(value);
            }
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            let esc = *bytes.get(*pos)?;
            *pos += 1;
            match esc {
                '"' => value.push('"'),
                '\\' => value.push('\\'),
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                't' => value.push('\t'),
                _ => return None,
            }
        }
        None
    }

    fn parse_number(bytes: &[char], pos: &mut usize) -> Option<String> {
        let start = *pos;
        if bytes.get(*pos) == Some(&'-') {
            *pos += 1;
        }
        match bytes.get(*pos) {
            Some('0') => *pos += 1,
            Some(c) if c.is_ascii_digit() => {
                while bytes.get(*pos).is_some_and(|c| c.is_ascii_digit()) {
                    *pos += 1;
                }
            }
            _ => return None,
        }
        if bytes.get(*pos) == Some(&'.') {
            *pos += 1;
            if !bytes.get(*pos).is_some_and(|c| c.is_ascii_digit()) {
                return None;
            }
            while bytes.get(*pos).is_some_and(|c| c.is_ascii_digit()) {
                *pos += 1;
            }
        }
        if matches!(bytes.get(*pos), Some('e') | Some('E')) {
            *pos += 1;
            if matches!(bytes.get(*pos), Some('+') | Some('-')) {
                *pos += 1;
            }
            if !bytes.get(*pos).is_some_and(|c| c.is_ascii_digit()) {
                return None;
            }
            while bytes.get(*pos).is_some_and(|c| c.is_ascii_digit()) {
                *pos += 1;
            }
        }
        Some(bytes[start..*pos].iter().collect())
    }

    fn match_literal(bytes: &[char], pos: &mut usize, literal: &str) -> bool {
        let chars: Vec<char> = literal.chars().collect();
        if bytes.len() < *pos + chars.len() || bytes[*pos..*pos + chars.len()] != chars[..] {
            return false;
        }
        *pos += chars.len();
        true
    }

    fn parse_value(bytes: &[char], pos: &mut usize) -> Result<String, CodecError> {
        match bytes.get(*pos) {
            None => Err(CodecError::new("json unexpected end")),
            Some('"') => parse_string(bytes, pos).ok_or_else(|| CodecError::new("json invalid string value")),
            Some(c) if *c == '-' || c.is_ascii_digit() => {
                parse_number(bytes, pos).ok_or_else(|| CodecError::new("json invalid numeric value"))
            }
            Some('t') => {
                if match_literal(bytes, pos, "true") {
                    Ok("true".to_string())
                } else {
                    Err(CodecError::new("json invalid literal"))
                }
            }
            Some('f') => {
                if match_literal(bytes, pos, "false") {
                    Ok("false".to_string())
                } else {
                    Err(CodecError::new("json invalid literal"))
                }
            }
            Some('n') => Err(CodecError::new("json null values are not supported")),
            Some('{') | Some('[') => Err(CodecError::new("json nested values are not supported")),
            Some(_) => Err(CodecError::new("json invalid value")),
        }
    }

    loop {
        skip_ws(&bytes, &mut pos);
        let key = parse_string(&bytes, &mut pos).ok_or_else(|| err("json invalid key"))?;
        skip_ws(&bytes, &mut pos);
        if bytes.get(pos) != Some(&':') {
            return Err(err("json missing ':'"));
        }
        pos += 1;
        skip_ws(&bytes, &mut pos);

        let value = parse_value(&bytes, &mut pos)?;
        if out.contains_key(&key) {
            return Err(CodecError::new(format!("json duplicate key: {key}")));
        }
        out.insert(key, value);

        skip_ws(&bytes, &mut pos);
        match bytes.get(pos) {
            None => return Err(err("json unexpected end")),
            Some('}') => {
                pos += 1;
                skip_ws(&bytes, &mut pos);
                if pos != bytes.len() {
                    return Err(err("json trailing content"));
                }
                return Ok(out);
            }
            Some(',') => pos += 1,
            Some(_) => return Err(err("json missing ','")),
        }
    }
}

fn parse_kv(payload: &str) -> Result<BTreeMap<String, String>, CodecError> {
    let mut out = BTreeMap::new();
    for (idx, raw_line) in payload.lines().enumerate() {
        let line_number = idx + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq) = line.find('=') else {
            return Err(CodecError::new(format!("kv missing '=' at line {line_number}")));
        };
        let value = kv_unescape(&line[eq + 1..])
            .map_err(|_| CodecError::new(format!("kv invalid escape at line {line_number}")))?;
        let key = line[..eq].to_string();
        if out.contains_key(&key) {
            return Err(CodecError::new(format!("kv duplicate key: {key}")));
        }
        out.insert(key, value);
    }
    Ok(out)
}

pub fn parse_external_io_envelope_with_format(format: IoEnvelopeFormat, payload: &str) -> Result<ExternalIoEnvelope, CodecError> {
    let flat = match format {
        IoEnvelopeFormat::KeyValue => parse_kv(payload)?,
        IoEnvelopeFormat::Json => parse_flat_json(payload)?,
    };
    inflate_envelope(&flat)
}

pub fn parse_external_io_envelope(format_name: &str, payload: &str) -> Result<ExternalIoEnvelope, CodecError> {
    let format = parse_io_envelope_format(format_name)
        .ok_or_else(|| CodecError::new(format!("unsupported format: {format_name}")))?;
    parse_external_io_envelope_with_format(format, payload)
}

pub fn serialize_external_io_envelope_with_format(format: IoEnvelopeFormat, envelope: &ExternalIoEnvelope) -> String {
    let flat = flatten_envelope(envelope);
    match format {
        IoEnvelopeFormat::KeyValue => {
            let mut out = String::new();
            for (key, value) in &flat {
                out.push_str(key);
                out.push('=');
                out.push_str(&kv_escape(value));
                out.push('\n');
            }
            out
        }
        IoEnvelopeFormat::Json => {
            let mut out = String::from("{");
            for (idx, (key, value)) in flat.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(&json_escape(key));
                out.push_str("\":\"");
                out.push_str(&json_escape(value));
                out.push('"');
            }
            out.push('}');
            out
        }
    }
}

pub fn serialize_external_io_envelope(format_name: &str, envelope: &ExternalIoEnvelope) -> Result<String, CodecError> {
    let format = parse_io_envelope_format(format_name)
        .ok_or_else(|| CodecError::new(format!("unsupported format: {format_name}")))?;
    Ok(serialize_external_io_envelope_with_format(format, envelope))
}

pub fn convert_external_io_envelope(payload: &str, input_format_name: &str, output_format_name: &str) -> Result<String, CodecError> {
    let envelope = parse_external_io_envelope(input_format_name, payload)?;
    serialize_external_io_envelope(output_format_name, &envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExternalIoEnvelope {
        let mut envelope = ExternalIoEnvelope::default();
        envelope.metadata.schema_version = "1.0.0".to_string();
        envelope.metadata.interface_id = "airtrace.external_io".to_string();
        envelope.metadata.platform_profile = "air".to_string();
        envelope.metadata.seed = 42;
        envelope.metadata.deterministic = true;
        envelope.mode.active_mode = "gps".to_string();
        envelope.mode.confidence = 0.9;
        envelope.sensors.push(ExternalIoSensorRecord {
            sensor_id: "gps".to_string(),
            available: true,
            healthy: true,
            has_measurement: true,
            freshness_seconds: 0.1,
            confidence: 0.9,
            last_error: String::new(),
        });
        envelope
    }

    #[test]
    fn round_trips_through_kv_format() {
        let envelope = sample();
        let payload = serialize_external_io_envelope_with_format(IoEnvelopeFormat::KeyValue, &envelope);
        let parsed = parse_external_io_envelope_with_format(IoEnvelopeFormat::KeyValue, &payload).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn round_trips_through_json_format() {
        let envelope = sample();
        let payload = serialize_external_io_envelope_with_format(IoEnvelopeFormat::Json, &envelope);
        let parsed = parse_external_io_envelope_with_format(IoEnvelopeFormat::Json, &payload).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn rejects_nested_json_values() {
        let payload = r#"{"schema_version":{"nested":"1"}}"#;
        let err = parse_flat_json(payload).unwrap_err();
        assert_eq!(err.0, "json nested values are not supported");
    }

    #[test]
    fn rejects_null_json_values() {
        let payload = r#"{"schema_version":null}"#;
        let err = parse_flat_json(payload).unwrap_err();
        assert_eq!(err.0, "json null values are not supported");
    }

    #[test]
    fn rejects_duplicate_kv_keys() {
        let payload = "schema_version=1.0.0\nschema_version=2.0.0\n";
        let err = parse_kv(payload).unwrap_err();
        assert_eq!(err.0, "kv duplicate key: schema_version");
    }

    #[test]
    fn converts_between_formats() {
        let envelope = sample();
        let kv = serialize_external_io_envelope_with_format(IoEnvelopeFormat::KeyValue, &envelope);
        let json = convert_external_io_envelope(&kv, "kv", "json").unwrap();
        let parsed = parse_external_io_envelope("json", &json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn missing_active_mode_is_rejected() {
        let mut flat = flatten_envelope(&sample());
        flat.insert("mode.active".to_string(), String::new());
        let err = inflate_envelope(&flat).unwrap_err();
        assert_eq!(err.0, "mode.active is required");
    }
}
