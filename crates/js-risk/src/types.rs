use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal risk tier assigned to a payload. Ordering follows severity.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash, Ord, PartialOrd,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskTier::Low => "Low Risk",
            RiskTier::Medium => "Medium Risk",
            RiskTier::High => "High Risk",
            RiskTier::Critical => "Critical Risk",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            "critical" => Ok(RiskTier::Critical),
            other => Err(format!("unknown risk tier: {other}")),
        }
    }
}

/// Outcome of classifying a payload.
///
/// `warnings` and `suggestions` are ordered by scan stage, so two verdicts for
/// the same payload compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RiskVerdict {
    pub valid: bool,
    pub tier: RiskTier,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl RiskVerdict {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub(crate) fn escalate_to(&mut self, tier: RiskTier) {
        if tier > self.tier {
            self.tier = tier;
        }
    }
}
