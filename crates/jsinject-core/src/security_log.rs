use js_risk::RiskTier;
use std::fmt;
use tracing::Level;

#[derive(Debug, Clone, Copy)]
pub enum SecurityDomain {
    Javascript,
    PdfStructure,
    Injection,
    Configuration,
}

impl SecurityDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityDomain::Javascript => "payload.javascript",
            SecurityDomain::PdfStructure => "pdf.structure",
            SecurityDomain::Injection => "pdf.injection",
            SecurityDomain::Configuration => "config",
        }
    }
}

impl fmt::Display for SecurityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured security event, emitted as a `tracing` event with
/// `security = true` so subscribers can route it separately.
#[derive(Debug, Clone, Copy)]
pub struct SecurityEvent<'a> {
    pub level: Level,
    pub domain: SecurityDomain,
    pub tier: RiskTier,
    pub kind: &'a str,
    pub file: Option<&'a str>,
    pub vector: Option<&'a str>,
    pub message: &'a str,
}

impl<'a> SecurityEvent<'a> {
    pub fn emit(self) {
        match self.level {
            Level::ERROR => tracing::event!(
                Level::ERROR,
                security = true,
                domain = %self.domain,
                tier = %self.tier,
                kind = self.kind,
                file = self.file,
                vector = self.vector,
                "{message}",
                message = self.message
            ),
            Level::WARN => tracing::event!(
                Level::WARN,
                security = true,
                domain = %self.domain,
                tier = %self.tier,
                kind = self.kind,
                file = self.file,
                vector = self.vector,
                "{message}",
                message = self.message
            ),
            Level::INFO => tracing::event!(
                Level::INFO,
                security = true,
                domain = %self.domain,
                tier = %self.tier,
                kind = self.kind,
                file = self.file,
                vector = self.vector,
                "{message}",
                message = self.message
            ),
            _ => tracing::event!(
                Level::DEBUG,
                security = true,
                domain = %self.domain,
                tier = %self.tier,
                kind = self.kind,
                file = self.file,
                vector = self.vector,
                "{message}",
                message = self.message
            ),
        }
    }
}

/// Level at which a classified payload is reported.
pub fn level_for_tier(tier: RiskTier) -> Level {
    match tier {
        RiskTier::Critical => Level::ERROR,
        RiskTier::High => Level::WARN,
        RiskTier::Medium => Level::INFO,
        RiskTier::Low => Level::DEBUG,
    }
}
