use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use js_risk::RiskTier;
use serde::Deserialize;
use tracing::{info, warn, Level};

use crate::engine::InjectionOptions;
use crate::security_log::{SecurityDomain, SecurityEvent};
use crate::vectors::find_vector;

const MAX_CONFIG_BYTES: u64 = 1024 * 1024;
/// Upper bound on documents accepted in one batch.
pub const MAX_BATCH_FILES: usize = 500_000;
const MAX_BATCH_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub profiles: Option<HashMap<String, Profile>>,
    pub inject: Option<InjectConfig>,
    pub batch: Option<BatchConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Profile {
    pub inject: Option<InjectConfig>,
    pub batch: Option<BatchConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InjectConfig {
    pub use_all_methods: Option<bool>,
    #[serde(alias = "selected_methods")]
    pub methods: Option<Vec<String>>,
    #[serde(alias = "validate_before_injection")]
    pub validate: Option<bool>,
    #[serde(alias = "optimize_for_compatibility")]
    pub compat: Option<bool>,
    pub max_risk: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    pub timeout_ms: Option<u64>,
    pub max_files: Option<usize>,
}

/// Batch-wide limits resolved from config and command-line flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub timeout: Option<Duration>,
    pub max_files: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self { timeout: None, max_files: MAX_BATCH_FILES }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Ok(meta) = fs::metadata(path) {
            if meta.len() > MAX_CONFIG_BYTES {
                return Err(anyhow::anyhow!(
                    "config {} exceeds {} bytes",
                    path.display(),
                    MAX_CONFIG_BYTES
                ));
            }
        }
        let data = fs::read_to_string(path)?;
        Self::parse(&data, path.extension().and_then(|s| s.to_str()))
    }

    pub fn parse(data: &str, extension: Option<&str>) -> anyhow::Result<Self> {
        let cfg = match extension {
            Some("toml") => toml::from_str::<Config>(data)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str::<Config>(data)?,
            _ => toml::from_str::<Config>(data).or_else(|_| serde_yaml::from_str::<Config>(data))?,
        };
        Ok(cfg)
    }

    /// Applies the base tables, then the named profile on top.
    pub fn apply(
        &self,
        opts: &mut InjectionOptions,
        limits: &mut BatchLimits,
        profile: Option<&str>,
    ) {
        if let Some(inject) = &self.inject {
            apply_inject(inject, opts);
        }
        if let Some(batch) = &self.batch {
            apply_batch(batch, limits);
        }
        let Some(name) = profile else {
            return;
        };
        match self.profiles.as_ref().and_then(|profiles| profiles.get(name)) {
            Some(profile_cfg) => {
                if let Some(inject) = &profile_cfg.inject {
                    apply_inject(inject, opts);
                }
                if let Some(batch) = &profile_cfg.batch {
                    apply_batch(batch, limits);
                }
            }
            None => warn!(profile = name, "Unknown config profile"),
        }
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|logging| logging.level.as_deref())
    }
}

fn reject(kind: &str, message: &str) {
    SecurityEvent {
        level: Level::WARN,
        domain: SecurityDomain::Configuration,
        tier: RiskTier::Low,
        kind,
        file: None,
        vector: None,
        message,
    }
    .emit();
}

fn apply_inject(inject: &InjectConfig, opts: &mut InjectionOptions) {
    if let Some(v) = inject.use_all_methods {
        opts.use_all_methods = v;
    }
    if let Some(methods) = &inject.methods {
        let (known, unknown): (Vec<&String>, Vec<&String>) =
            methods.iter().partition(|method| find_vector(method).is_some());
        for method in &unknown {
            warn!(method = %method, "Unknown injection method in config");
        }
        if known.is_empty() {
            reject("invalid_methods", "No known injection methods in config");
        } else {
            info!(count = known.len(), "Config override methods");
            opts.selected_methods = Some(known.into_iter().cloned().collect());
            opts.use_all_methods = inject.use_all_methods.unwrap_or(false);
        }
    }
    if let Some(v) = inject.validate {
        if !v {
            warn!("Payload validation disabled by config");
        }
        opts.validate_before_injection = v;
    }
    if let Some(v) = inject.compat {
        opts.optimize_for_compatibility = v;
    }
    if let Some(v) = &inject.max_risk {
        match v.parse::<RiskTier>() {
            Ok(tier) => {
                info!(tier = %tier, "Config override max_risk");
                opts.max_risk_tier = Some(tier);
            }
            Err(_) => {
                reject("invalid_max_risk", "Invalid max_risk in config");
                warn!(value = %v, "Invalid max_risk in config");
            }
        }
    }
}

fn apply_batch(batch: &BatchConfig, limits: &mut BatchLimits) {
    if let Some(v) = batch.timeout_ms {
        if v == 0 || v > MAX_BATCH_TIMEOUT_MS {
            reject("invalid_timeout_ms", "Invalid batch timeout_ms in config");
            warn!(value = v, limit = MAX_BATCH_TIMEOUT_MS, "Invalid batch timeout_ms in config");
        } else {
            info!(value = v, "Config override timeout_ms");
            limits.timeout = Some(Duration::from_millis(v));
        }
    }
    if let Some(v) = batch.max_files {
        if v == 0 || v > MAX_BATCH_FILES {
            reject("invalid_max_files", "Invalid batch max_files in config");
            warn!(value = v, limit = MAX_BATCH_FILES, "Invalid batch max_files in config");
        } else {
            info!(value = v, "Config override max_files");
            limits.max_files = v;
        }
    }
}
