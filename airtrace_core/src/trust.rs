//! Adapter and plugin trust boundaries (components I/J).
//!
//! Two independent sequential validators: `validate_adapter_registration`
//! checks a third-party adapter manifest against an allowlist entry and
//! the host's version/contract context before it may attach to a UI
//! surface; `validate_plugin_activation` checks a plugin's signed
//! identity against its allowlist entry before it may run. Both return
//! the first failing check's reason rather than accumulating every
//! problem, since trust decisions are gates, not reports.

use serde::{Deserialize, Serialize};

use crate::error::TrustError;
use crate::hash::hash_equals;

fn is_valid_id(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
}

fn is_valid_surface(value: &str) -> bool {
    matches!(value, "tui" | "cockpit" | "remote_operator" | "c2")
}

fn parse_semver(value: &str) -> Option<(i64, i64, i64)> {
    let mut parts = value.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

fn version_in_range(value: &str, min_value: &str, max_value: &str) -> bool {
    let (Some(v), Some(min), Some(max)) = (parse_semver(value), parse_semver(min_value), parse_semver(max_value)) else {
        return false;
    };
    v >= min && v <= max
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterCapability {
    pub id: String,
    pub description: String,
    pub units: String,
    pub range_min: f64,
    pub range_max: f64,
    pub error_behavior: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterUiExtension {
    pub field_id: String,
    pub field_type: String,
    pub units: String,
    pub range_min: f64,
    pub range_max: f64,
    pub error_behavior: String,
    pub surfaces: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterManifest {
    pub adapter_id: String,
    pub adapter_version: String,
    pub adapter_contract_version: String,
    pub ui_contract_version: String,
    pub core_compatibility_min: String,
    pub core_compatibility_max: String,
    pub tools_compatibility_min: String,
    pub tools_compatibility_max: String,
    pub ui_compatibility_min: String,
    pub ui_compatibility_max: String,
    pub capabilities: Vec<AdapterCapability>,
    pub ui_extensions: Vec<AdapterUiExtension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterAllowlistEntry {
    pub adapter_id: String,
    pub adapter_version: String,
    pub signature_hash: String,
    pub signature_algorithm: String,
    pub approved_by: String,
    pub approval_date: String,
    pub allowed_surfaces: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterRegistryContext {
    pub core_version: String,
    pub tools_version: String,
    pub ui_version: String,
    pub adapter_contract_version: String,
    pub ui_contract_version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterRegistryResult {
    pub ok: bool,
    pub reason: String,
}

fn validate_capabilities(capabilities: &[AdapterCapability]) -> bool {
    capabilities.iter().all(|cap| {
        !cap.id.is_empty()
            && !cap.description.is_empty()
            && !cap.error_behavior.is_empty()
            && is_valid_id(&cap.id)
            && cap.range_min <= cap.range_max
    })
}

fn validate_ui_extensions(extensions: &[AdapterUiExtension]) -> bool {
    extensions.iter().all(|ext| {
        !ext.field_id.is_empty()
            && !ext.field_type.is_empty()
            && !ext.error_behavior.is_empty()
            && ext.range_min <= ext.range_max
            && !ext.surfaces.is_empty()
            && ext.surfaces.iter().all(|s| is_valid_surface(s))
    })
}

/// Checks `manifest` against `allowlist` and `context` for attachment to
/// `requested_surface`. Checks run in order and the first failure wins,
/// so `reason` is always the earliest applicable problem.
pub fn validate_adapter_registration(
    manifest: &AdapterManifest,
    allowlist: &AdapterAllowlistEntry,
    context: &AdapterRegistryContext,
    requested_surface: &str,
) -> AdapterRegistryResult {
    let fail = |reason: TrustError| AdapterRegistryResult { ok: false, reason: reason.reason().to_string() };

    if manifest.adapter_id.is_empty()
        || manifest.adapter_version.is_empty()
        || manifest.adapter_contract_version.is_empty()
        || manifest.ui_contract_version.is_empty()
        || manifest.core_compatibility_min.is_empty()
        || manifest.core_compatibility_max.is_empty()
        || manifest.tools_compatibility_min.is_empty()
        || manifest.tools_compatibility_max.is_empty()
        || manifest.ui_compatibility_min.is_empty()
        || manifest.ui_compatibility_max.is_empty()
    {
        return fail(TrustError::AdapterSchemaInvalid);
    }
    if !is_valid_id(&manifest.adapter_id) || !is_valid_id(&allowlist.adapter_id) {
        return fail(TrustError::AdapterSchemaInvalid);
    }
    if allowlist.adapter_id.is_empty() || allowlist.adapter_version.is_empty() {
        return fail(TrustError::AdapterNotAllowlisted);
    }
    if allowlist.adapter_id != manifest.adapter_id || allowlist.adapter_version != manifest.adapter_version {
        return fail(TrustError::AdapterNotAllowlisted);
    }
    if !is_valid_surface(requested_surface) {
        return fail(TrustError::AdapterUiExtensionInvalid);
    }
    if !allowlist.allowed_surfaces.is_empty() && !allowlist.allowed_surfaces.iter().any(|s| s == requested_surface) {
        return fail(TrustError::AdapterSurfaceNotAllowed);
    }
    if manifest.adapter_contract_version != context.adapter_contract_version
        || manifest.ui_contract_version != context.ui_contract_version
    {
        return fail(TrustError::AdapterContractMismatch);
    }
    if !version_in_range(&context.core_version, &manifest.core_compatibility_min, &manifest.core_compatibility_max)
        || !version_in_range(&context.tools_version, &manifest.tools_compatibility_min, &manifest.tools_compatibility_max)
        || !version_in_range(&context.ui_version, &manifest.ui_compatibility_min, &manifest.ui_compatibility_max)
    {
        return fail(TrustError::AdapterVersionIncompatible);
    }
    if !validate_capabilities(&manifest.capabilities) {
        return fail(TrustError::AdapterCapabilityInvalid);
    }
    if !validate_ui_extensions(&manifest.ui_extensions) {
        return fail(TrustError::AdapterUiExtensionInvalid);
    }

    AdapterRegistryResult { ok: true, reason: "ok".to_string() }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginIdentity {
    pub id: String,
    pub version: String,
    pub device_driver: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSignature {
    pub hash: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginAllowlist {
    pub id: String,
    pub version: String,
    pub signature_hash: String,
    pub signature_algorithm: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginAuthorization {
    pub required: bool,
    pub granted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginAuthRequest {
    pub identity: PluginIdentity,
    pub signature: PluginSignature,
    pub allowlist: PluginAllowlist,
    pub authorization: PluginAuthorization,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginAuthResult {
    pub allowed: bool,
    pub reason: String,
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|ch| ch.is_ascii_hexdigit())
}

pub fn validate_plugin_activation(request: &PluginAuthRequest) -> PluginAuthResult {
    let fail = |reason: TrustError| PluginAuthResult { allowed: false, reason: reason.reason().to_string() };

    if !is_valid_id(&request.identity.id) {
        return fail(TrustError::PluginIdInvalid);
    }
    if parse_semver(&request.identity.version).is_none() {
        return fail(TrustError::PluginVersionInvalid);
    }
    if !request.authorization.required || !request.authorization.granted {
        return fail(TrustError::PluginNotAuthorized);
    }
    if !is_valid_id(&request.allowlist.id) || parse_semver(&request.allowlist.version).is_none() {
        return fail(TrustError::PluginNotAllowlisted);
    }
    if request.allowlist.id != request.identity.id || request.allowlist.version != request.identity.version {
        return fail(TrustError::PluginNotAllowlisted);
    }

    let plugin_algorithm = request.signature.algorithm.to_lowercase();
    let allowlist_algorithm = request.allowlist.signature_algorithm.to_lowercase();
    if plugin_algorithm != "sha256" || allowlist_algorithm != "sha256" {
        return fail(TrustError::PluginSignatureInvalid);
    }
    if !is_sha256_hex(&request.signature.hash) || !is_sha256_hex(&request.allowlist.signature_hash) {
        return fail(TrustError::PluginSignatureInvalid);
    }
    if !hash_equals(&request.signature.hash, &request.allowlist.signature_hash) {
        return fail(TrustError::PluginSignatureInvalid);
    }

    PluginAuthResult { allowed: true, reason: "ok".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> AdapterManifest {
        AdapterManifest {
            adapter_id: "thermal-cam".to_string(),
            adapter_version: "1.2.0".to_string(),
            adapter_contract_version: "1.0.0".to_string(),
            ui_contract_version: "1.0.0".to_string(),
            core_compatibility_min: "1.0.0".to_string(),
            core_compatibility_max: "2.0.0".to_string(),
            tools_compatibility_min: "1.0.0".to_string(),
            tools_compatibility_max: "2.0.0".to_string(),
            ui_compatibility_min: "1.0.0".to_string(),
            ui_compatibility_max: "2.0.0".to_string(),
            capabilities: Vec::new(),
            ui_extensions: Vec::new(),
        }
    }

    fn allowlist() -> AdapterAllowlistEntry {
        AdapterAllowlistEntry {
            adapter_id: "thermal-cam".to_string(),
            adapter_version: "1.2.0".to_string(),
            signature_hash: String::new(),
            signature_algorithm: String::new(),
            approved_by: "ops".to_string(),
            approval_date: "2026-01-01".to_string(),
            allowed_surfaces: vec!["cockpit".to_string()],
        }
    }

    fn context() -> AdapterRegistryContext {
        AdapterRegistryContext {
            core_version: "1.5.0".to_string(),
            tools_version: "1.5.0".to_string(),
            ui_version: "1.5.0".to_string(),
            adapter_contract_version: "1.0.0".to_string(),
            ui_contract_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn valid_registration_is_ok() {
        let result = validate_adapter_registration(&manifest(), &allowlist(), &context(), "cockpit");
        assert!(result.ok, "{}", result.reason);
    }

    #[test]
    fn surface_not_in_allowlist_is_rejected() {
        let result = validate_adapter_registration(&manifest(), &allowlist(), &context(), "tui");
        assert_eq!(result.reason, "adapter_surface_not_allowed");
    }

    #[test]
    fn version_outside_range_is_rejected() {
        let mut ctx = context();
        ctx.core_version = "3.0.0".to_string();
        let result = validate_adapter_registration(&manifest(), &allowlist(), &ctx, "cockpit");
        assert_eq!(result.reason, "adapter_version_incompatible");
    }

    #[test]
    fn mismatched_allowlist_id_is_rejected() {
        let mut list = allowlist();
        list.adapter_id = "other".to_string();
        let result = validate_adapter_registration(&manifest(), &list, &context(), "cockpit");
        assert_eq!(result.reason, "adapter_not_allowlisted");
    }

    fn plugin_request() -> PluginAuthRequest {
        let hash = "a".repeat(64);
        PluginAuthRequest {
            identity: PluginIdentity { id: "range-finder".to_string(), version: "1.0.0".to_string(), device_driver: false },
            signature: PluginSignature { hash: hash.clone(), algorithm: "sha256".to_string() },
            allowlist: PluginAllowlist {
                id: "range-finder".to_string(),
                version: "1.0.0".to_string(),
                signature_hash: hash,
                signature_algorithm: "sha256".to_string(),
            },
            authorization: PluginAuthorization { required: true, granted: true },
        }
    }

    #[test]
    fn valid_plugin_activation_is_allowed() {
        let result = validate_plugin_activation(&plugin_request());
        assert!(result.allowed, "{}", result.reason);
    }

    #[test]
    fn unauthorized_plugin_is_rejected() {
        let mut request = plugin_request();
        request.authorization.granted = false;
        let result = validate_plugin_activation(&request);
        assert_eq!(result.reason, "plugin_not_authorized");
    }

    #[test]
    fn mismatched_signature_hash_is_rejected() {
        let mut request = plugin_request();
        request.allowlist.signature_hash = "b".repeat(64);
        let result = validate_plugin_activation(&request);
        assert_eq!(result.reason, "plugin_signature_invalid");
    }
}
