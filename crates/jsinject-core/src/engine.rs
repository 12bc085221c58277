use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use js_risk::{classify, RiskTier, RiskVerdict};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn, Level};

use crate::action::Action;
use crate::document::{DocumentHandle, LoadError, SerializeError, SerializeProfile};
use crate::security_log::{level_for_tier, SecurityDomain, SecurityEvent};
use crate::summary::output_file_name;
use crate::vectors::{find_vector, registry, InjectionVector, VectorError};

/// Method used when the caller neither asks for all vectors nor names any.
pub const DEFAULT_METHOD: &str = "Standard Injection";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionOptions {
    pub use_all_methods: bool,
    pub selected_methods: Option<Vec<String>>,
    pub validate_before_injection: bool,
    pub optimize_for_compatibility: bool,
    /// Highest classifier tier accepted before injection is refused.
    pub max_risk_tier: Option<RiskTier>,
}

impl Default for InjectionOptions {
    fn default() -> Self {
        Self {
            use_all_methods: true,
            selected_methods: None,
            validate_before_injection: true,
            optimize_for_compatibility: true,
            max_risk_tier: None,
        }
    }
}

impl InjectionOptions {
    pub fn serialize_profile(&self) -> SerializeProfile {
        if self.optimize_for_compatibility {
            SerializeProfile::compatibility()
        } else {
            SerializeProfile::minimal()
        }
    }

    /// Vectors to run, always in registry order.
    pub fn vectors(&self) -> Vec<&'static dyn InjectionVector> {
        if self.use_all_methods {
            return registry().to_vec();
        }
        let default_selection = [DEFAULT_METHOD.to_string()];
        let selectors: &[String] = match &self.selected_methods {
            Some(methods) => methods,
            None => &default_selection,
        };
        for selector in selectors {
            if find_vector(selector).is_none() {
                debug!(method = %selector, "Skipping unknown injection method");
            }
        }
        registry()
            .iter()
            .copied()
            .filter(|vector| selectors.iter().any(|selector| vector.matches(selector)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Load,
    Serialize,
}

#[derive(Debug, Clone)]
pub enum InjectError {
    Validation(Vec<String>),
    RiskExceeded { tier: RiskTier, limit: RiskTier },
    Load(LoadError),
    Serialize(SerializeError),
}

impl InjectError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InjectError::Validation(_) | InjectError::RiskExceeded { .. } => {
                FailureKind::Validation
            }
            InjectError::Load(_) => FailureKind::Load,
            InjectError::Serialize(_) => FailureKind::Serialize,
        }
    }
}

impl fmt::Display for InjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectError::Validation(warnings) => {
                write!(f, "JavaScript validation failed: {}", warnings.join(", "))
            }
            InjectError::RiskExceeded { tier, limit } => write!(
                f,
                "JavaScript validation failed: payload risk tier {tier} exceeds allowed {limit}"
            ),
            InjectError::Load(err) => write!(f, "{err}"),
            InjectError::Serialize(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for InjectError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorFailure {
    pub vector: String,
    pub error: String,
}

/// Outcome of one document. Produced once and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub file_id: String,
    pub output_name: String,
    pub success: bool,
    pub applied_vectors: Vec<String>,
    pub vector_failures: Vec<VectorFailure>,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub validation: RiskVerdict,
    #[serde(skip)]
    pub output: Option<Vec<u8>>,
}

impl ProcessingResult {
    fn failed(file_id: &str, validation: RiskVerdict, err: &InjectError) -> Self {
        Self {
            file_id: file_id.to_string(),
            output_name: output_file_name(file_id),
            success: false,
            applied_vectors: Vec::new(),
            vector_failures: Vec::new(),
            error: Some(err.to_string()),
            failure_kind: Some(err.kind()),
            validation,
            output: None,
        }
    }
}

/// Validates `payload`, embeds it into `bytes` through the selected vectors
/// and serializes the result. Never panics and never returns early with an
/// error: every failure is reported in the returned [`ProcessingResult`].
pub fn process_document(
    file_id: &str,
    bytes: &[u8],
    payload: &str,
    options: &InjectionOptions,
) -> ProcessingResult {
    let span = tracing::info_span!("inject", file = file_id, bytes_len = bytes.len());
    let _guard = span.enter();

    let validation = classify(payload);
    report_verdict(file_id, &validation);
    if let Err(err) = gate(&validation, options) {
        SecurityEvent {
            level: Level::WARN,
            domain: SecurityDomain::Injection,
            tier: validation.tier,
            kind: "payload_rejected",
            file: Some(file_id),
            vector: None,
            message: &err.to_string(),
        }
        .emit();
        return ProcessingResult::failed(file_id, validation, &err);
    }

    let mut handle = match load(bytes) {
        Ok(handle) => handle,
        Err(err) => {
            let err = InjectError::Load(err);
            SecurityEvent {
                level: Level::WARN,
                domain: SecurityDomain::PdfStructure,
                tier: validation.tier,
                kind: "load_failed",
                file: Some(file_id),
                vector: None,
                message: &err.to_string(),
            }
            .emit();
            return ProcessingResult::failed(file_id, validation, &err);
        }
    };

    let action = handle.embed_action(&Action::javascript(payload));
    let mut applied = Vec::new();
    let mut failures = Vec::new();
    for vector in options.vectors() {
        match apply_isolated(vector, &mut handle, action) {
            Ok(()) => {
                debug!(vector = vector.id(), "Injection vector applied");
                applied.push(vector.name().to_string());
            }
            Err(err) => {
                warn!(vector = vector.id(), error = %err, "Injection vector failed");
                failures.push(VectorFailure {
                    vector: vector.name().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
    if applied.is_empty() {
        handle.remove_object(action.id());
        debug!("No vector applied; dropped unused action object");
    }

    let serialized = handle.serialize(&options.serialize_profile());
    finish(file_id, validation, applied, failures, serialized)
}

fn finish(
    file_id: &str,
    validation: RiskVerdict,
    applied: Vec<String>,
    failures: Vec<VectorFailure>,
    serialized: Result<Vec<u8>, SerializeError>,
) -> ProcessingResult {
    match serialized {
        Ok(output) => {
            info!(
                applied = applied.len(),
                failed = failures.len(),
                output_len = output.len(),
                "Injection complete"
            );
            ProcessingResult {
                file_id: file_id.to_string(),
                output_name: output_file_name(file_id),
                success: true,
                applied_vectors: applied,
                vector_failures: failures,
                error: None,
                failure_kind: None,
                validation,
                output: Some(output),
            }
        }
        Err(err) => {
            let err = InjectError::Serialize(err);
            error!(error = %err, "Serialization failed");
            let mut result = ProcessingResult::failed(file_id, validation, &err);
            result.vector_failures = failures;
            result
        }
    }
}

fn gate(validation: &RiskVerdict, options: &InjectionOptions) -> Result<(), InjectError> {
    if options.validate_before_injection && !validation.valid {
        return Err(InjectError::Validation(validation.warnings.clone()));
    }
    if let Some(limit) = options.max_risk_tier {
        if validation.tier > limit {
            return Err(InjectError::RiskExceeded { tier: validation.tier, limit });
        }
    }
    Ok(())
}

fn report_verdict(file_id: &str, validation: &RiskVerdict) {
    if validation.tier < RiskTier::High {
        debug!(tier = %validation.tier, warnings = validation.warnings.len(), "Payload classified");
        return;
    }
    let message = validation.warnings.first().map(String::as_str).unwrap_or("payload flagged");
    SecurityEvent {
        level: level_for_tier(validation.tier),
        domain: SecurityDomain::Javascript,
        tier: validation.tier,
        kind: "risky_payload",
        file: Some(file_id),
        vector: None,
        message,
    }
    .emit();
}

fn load(bytes: &[u8]) -> Result<DocumentHandle, LoadError> {
    match catch_unwind(|| DocumentHandle::load(bytes)) {
        Ok(result) => result,
        Err(_) => {
            error!(bytes_len = bytes.len(), "PDF parser panicked");
            Err(LoadError("parser panicked on malformed input".into()))
        }
    }
}

fn apply_isolated(
    vector: &dyn InjectionVector,
    handle: &mut DocumentHandle,
    action: crate::action::ActionRef,
) -> Result<(), VectorError> {
    match catch_unwind(AssertUnwindSafe(|| vector.apply(handle, action))) {
        Ok(result) => result,
        Err(_) => {
            error!(vector = vector.id(), "Injection vector panicked");
            Err(VectorError::Panicked)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_enable_every_vector() {
        let options = InjectionOptions::default();
        assert_eq!(options.vectors().len(), registry().len());
        assert_eq!(options.serialize_profile(), SerializeProfile::compatibility());
    }

    #[test]
    fn unset_selection_falls_back_to_standard_injection() {
        let options = InjectionOptions { use_all_methods: false, ..InjectionOptions::default() };
        let names: Vec<&str> = options.vectors().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec![DEFAULT_METHOD]);
    }

    #[test]
    fn selection_keeps_registry_order_and_skips_unknown_names() {
        let options = InjectionOptions {
            use_all_methods: false,
            selected_methods: Some(vec![
                "Form Actions".into(),
                "Teleport".into(),
                "open_action".into(),
            ]),
            ..InjectionOptions::default()
        };
        let ids: Vec<&str> = options.vectors().iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec!["open_action", "form_field_additional_actions"]);
    }

    #[test]
    fn validation_error_lists_warnings() {
        let err = InjectError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "JavaScript validation failed: a, b");
        assert_eq!(err.kind(), FailureKind::Validation);
    }

    #[test]
    fn risk_gate_applies_even_without_validation() {
        let verdict = classify("eval('1')");
        let options = InjectionOptions {
            validate_before_injection: false,
            max_risk_tier: Some(RiskTier::Medium),
            ..InjectionOptions::default()
        };
        let err = gate(&verdict, &options).expect_err("critical payload should be gated");
        assert!(matches!(
            err,
            InjectError::RiskExceeded { tier: RiskTier::Critical, limit: RiskTier::Medium }
        ));
    }

    #[test]
    fn serialized_result_omits_document_bytes() {
        let result = process_document("junk.pdf", b"%PDF", "   ", &InjectionOptions::default());
        let json = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(json["failure_kind"], "validation");
        assert_eq!(json["validation"]["tier"], "low");
        assert!(json.get("output").is_none());
    }

    #[test]
    fn serialize_failure_keeps_vector_failures_and_drops_output() {
        let failures = vec![VectorFailure {
            vector: "Form Actions".into(),
            error: VectorError::NoFormFields.to_string(),
        }];
        let result = finish(
            "doc.pdf",
            classify("app.alert('hi');"),
            vec!["OpenAction Injection".into()],
            failures.clone(),
            Err(SerializeError("disk full".into())),
        );
        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::Serialize));
        assert_eq!(result.error.as_deref(), Some("failed to serialize PDF: disk full"));
        assert!(result.output.is_none());
        assert!(result.applied_vectors.is_empty(), "nothing was written");
        assert_eq!(result.vector_failures, failures);
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        let result = process_document(
            "junk.pdf",
            b"not a pdf",
            "app.alert('hi');",
            &InjectionOptions::default(),
        );
        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::Load));
        assert!(result.output.is_none());
        assert_eq!(result.output_name, "js_injected_junk.pdf");
    }
}
