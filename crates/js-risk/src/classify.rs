use std::sync::OnceLock;

use regex::Regex;

use crate::syntax::check_syntax;
use crate::types::{RiskTier, RiskVerdict};

pub const CRITICAL_MARKERS: &[&str] =
    &["eval(", "Function(", "setTimeout(", "setInterval(", "importScripts("];

pub const HIGH_MARKERS: &[&str] =
    &["document.write(", "innerHTML", "outerHTML", "insertAdjacentHTML", "execCommand"];

pub const NETWORK_MARKERS: &[&str] =
    &["fetch(", "XMLHttpRequest", "ajax", "WebSocket", "EventSource"];

pub const SYSTEM_ACCESS_MARKERS: &[&str] = &[
    "fs.",
    "require(",
    "import(",
    "process.",
    "Buffer",
    "__dirname",
    "__filename",
    "global.",
    "window.location",
];

/// Acrobat JavaScript API entry points. Their presence is a compatibility
/// signal, not a risk signal.
pub const NATIVE_API_MARKERS: &[&str] = &[
    "app.alert",
    "this.print",
    "this.getField",
    "this.saveAs",
    "util.printf",
    "console.println",
    "app.response",
    "app.getNthPlugInName",
    "app.getPath",
];

pub const NATIVE_API_PRESENT: &str =
    "✓ Uses Adobe Acrobat JavaScript API - good for PDF compatibility";
pub const NATIVE_API_ABSENT: &str =
    "Consider using Adobe Acrobat JavaScript API for better PDF compatibility";
pub const SYNTAX_VALID: &str = "✓ JavaScript syntax appears valid";
pub const SYNTAX_REMEDIATION: &str = "Fix JavaScript syntax errors before injection";
pub const EMPTY_PAYLOAD_WARNING: &str = "JavaScript code cannot be empty";
pub const EMPTY_PAYLOAD_SUGGESTION: &str = "Add some JavaScript code to inject";

const MAX_LISTED_URLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlFamily {
    Web,
    FileTransfer,
    Socket,
    SecureSocket,
}

impl UrlFamily {
    pub const ALL: [UrlFamily; 4] =
        [UrlFamily::Web, UrlFamily::FileTransfer, UrlFamily::Socket, UrlFamily::SecureSocket];

    pub fn label(self) -> &'static str {
        match self {
            UrlFamily::Web => "HTTP/HTTPS",
            UrlFamily::FileTransfer => "FTP",
            UrlFamily::Socket => "WebSocket",
            UrlFamily::SecureSocket => "Secure WebSocket",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            UrlFamily::Web => r#"https?://[^\s'"]+"#,
            UrlFamily::FileTransfer => r#"ftp://[^\s'"]+"#,
            UrlFamily::Socket => r#"ws://[^\s'"]+"#,
            UrlFamily::SecureSocket => r#"wss://[^\s'"]+"#,
        }
    }
}

fn url_patterns() -> &'static [(UrlFamily, Regex)] {
    static PATTERNS: OnceLock<Vec<(UrlFamily, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        UrlFamily::ALL
            .iter()
            .filter_map(|family| Regex::new(family.pattern()).ok().map(|re| (*family, re)))
            .collect()
    })
}

/// Classifies a payload by ordered, tiered substring scanning.
///
/// The tier scan stops escalating once a stronger tier is set: high markers are
/// skipped after a critical hit and network markers are skipped after any
/// critical or high hit. URL, system-access, API and syntax checks always run.
pub fn classify(payload: &str) -> RiskVerdict {
    if payload.trim().is_empty() {
        return RiskVerdict {
            valid: false,
            tier: RiskTier::Low,
            warnings: vec![EMPTY_PAYLOAD_WARNING.into()],
            suggestions: vec![EMPTY_PAYLOAD_SUGGESTION.into()],
        };
    }

    let mut verdict = RiskVerdict { valid: true, ..RiskVerdict::default() };

    for marker in matching(payload, CRITICAL_MARKERS) {
        verdict.warnings.push(format!("CRITICAL: Dangerous function detected: {marker}"));
        verdict
            .suggestions
            .push(format!("Consider avoiding {marker} as it can execute arbitrary code"));
        verdict.tier = RiskTier::Critical;
    }

    if verdict.tier != RiskTier::Critical {
        for marker in matching(payload, HIGH_MARKERS) {
            verdict.warnings.push(format!("HIGH RISK: DOM manipulation detected: {marker}"));
            verdict.suggestions.push(format!("{marker} can be dangerous in certain contexts"));
            verdict.tier = RiskTier::High;
        }
    }

    if verdict.tier == RiskTier::Low {
        for marker in matching(payload, NETWORK_MARKERS) {
            verdict.warnings.push(format!("MEDIUM RISK: Network activity detected: {marker}"));
            verdict.suggestions.push(format!("{marker} will make network requests"));
            verdict.tier = RiskTier::Medium;
        }
    }

    for (family, re) in url_patterns() {
        let urls: Vec<&str> = re.find_iter(payload).map(|m| m.as_str()).collect();
        if urls.is_empty() {
            continue;
        }
        let label = family.label();
        verdict.warnings.push(format!("Network endpoint detected: {label} URLs found"));
        verdict.suggestions.push(format!(
            "Found {} {label} URL(s): {}",
            urls.len(),
            urls.iter().take(MAX_LISTED_URLS).copied().collect::<Vec<_>>().join(", ")
        ));
        verdict.escalate_to(RiskTier::Medium);
    }

    for marker in matching(payload, SYSTEM_ACCESS_MARKERS) {
        verdict.warnings.push(format!("System access detected: {marker}"));
        verdict
            .suggestions
            .push(format!("{marker} may not work in PDF context or could be dangerous"));
        verdict.escalate_to(RiskTier::Medium);
    }

    if uses_native_api(payload) {
        verdict.suggestions.push(NATIVE_API_PRESENT.into());
    } else {
        verdict.suggestions.push(NATIVE_API_ABSENT.into());
    }

    match check_syntax(payload) {
        Ok(()) => verdict.suggestions.push(SYNTAX_VALID.into()),
        Err(err) => {
            verdict.warnings.push(format!("Syntax error detected: {err}"));
            verdict.suggestions.push(SYNTAX_REMEDIATION.into());
        }
    }

    verdict
}

pub fn uses_native_api(payload: &str) -> bool {
    NATIVE_API_MARKERS.iter().any(|marker| payload.contains(marker))
}

fn matching<'a>(
    payload: &'a str,
    markers: &'static [&'static str],
) -> impl Iterator<Item = &'static str> + 'a {
    markers.iter().copied().filter(move |marker| payload.contains(marker))
}
