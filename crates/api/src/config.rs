//! Mirror configuration, read from `KVIEW_*` environment variables.

use kview_core::{ParseKindError, ResourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    Kind {
        var: &'static str,
        #[source]
        source: ParseKindError,
    },
    #[error("{var}: expected {expected}, got `{value}`")]
    Value { var: &'static str, expected: &'static str, value: String },
    #[error("no resource kinds selected")]
    NoKinds,
    #[error("gating kind {0} is not tracked")]
    GateNotTracked(ResourceKind),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// Kinds to synchronize.
    pub kinds: Vec<ResourceKind>,
    /// Kinds that gate readiness; `None` means every tracked kind.
    pub gate: Option<Vec<ResourceKind>>,
    /// Restrict namespaced kinds to one namespace.
    pub namespace: Option<String>,
    /// Lock shards per collection store.
    pub shards: usize,
    pub strip_managed_fields: bool,
    /// How long one-shot CLI queries wait for readiness.
    pub wait_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            kinds: ResourceKind::ALL.to_vec(),
            gate: None,
            namespace: None,
            shards: 16,
            strip_managed_fields: true,
            wait_secs: 30,
        }
    }
}

fn kinds(var: &'static str, raw: &str) -> Result<Vec<ResourceKind>, ConfigError> {
    ResourceKind::parse_list(raw).map_err(|source| ConfigError::Kind { var, source })
}

fn number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Value { var, expected: "a non-negative integer", value: raw.to_string() })
}

fn flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Value { var, expected: "a boolean", value: raw.to_string() }),
    }
}

impl MirrorConfig {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Build from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(v) = get("KVIEW_KINDS") { cfg.kinds = kinds("KVIEW_KINDS", &v)?; }
        if let Some(v) = get("KVIEW_GATE_KINDS") { cfg.gate = Some(kinds("KVIEW_GATE_KINDS", &v)?); }
        if let Some(v) = get("KVIEW_NAMESPACE").filter(|v| !v.trim().is_empty()) { cfg.namespace = Some(v.trim().to_string()); }
        if let Some(v) = get("KVIEW_SHARDS") { cfg.shards = number("KVIEW_SHARDS", &v)?; }
        if let Some(v) = get("KVIEW_STRIP_MANAGED_FIELDS") { cfg.strip_managed_fields = flag("KVIEW_STRIP_MANAGED_FIELDS", &v)?; }
        if let Some(v) = get("KVIEW_WAIT_SECS") { cfg.wait_secs = number("KVIEW_WAIT_SECS", &v)?; }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kinds.is_empty() { return Err(ConfigError::NoKinds); }
        if let Some(gate) = &self.gate {
            if let Some(k) = gate.iter().find(|k| !self.kinds.contains(k)) {
                return Err(ConfigError::GateNotTracked(*k));
            }
        }
        Ok(())
    }

    pub fn gating_kinds(&self) -> Vec<ResourceKind> {
        self.gate.clone().unwrap_or_else(|| self.kinds.clone())
    }
}
