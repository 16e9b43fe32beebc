//! Sandbox configuration and validation.
//!
//! Configuration is plain serde data with per-field defaults, so a TOML file
//! only needs to name the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to do when several folders carry the configured root name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguousRootPolicy {
    /// Refuse to pick one and report every candidate.
    #[default]
    Error,
    /// Take the first folder in store order.
    First,
}

/// Configuration for the sandbox core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Name of the folder that bounds the sandbox.
    #[serde(default = "default_root_name")]
    pub root_name: String,

    /// Maximum parent links followed when checking ancestry.
    #[serde(default = "default_hop_budget")]
    pub hop_budget: usize,

    /// Listing depth used when the caller gives none.
    #[serde(default = "default_list_depth")]
    pub default_list_depth: usize,

    /// Children fetched per folder in one listing call.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Remote calls in flight at once within one BFS level.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Root selection when the name is ambiguous.
    #[serde(default)]
    pub ambiguous_root: AmbiguousRootPolicy,
}

fn default_root_name() -> String {
    "mcp-sandbox".to_string()
}

fn default_hop_budget() -> usize {
    30
}

fn default_list_depth() -> usize {
    4
}

fn default_page_size() -> usize {
    1000
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            root_name: default_root_name(),
            hop_budget: default_hop_budget(),
            default_list_depth: default_list_depth(),
            page_size: default_page_size(),
            max_concurrency: default_max_concurrency(),
            ambiguous_root: AmbiguousRootPolicy::default(),
        }
    }
}

impl ScopeConfig {
    /// Creates a configuration with the given root folder name.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            ..Default::default()
        }
    }

    /// Sets the ancestry hop budget.
    pub fn with_hop_budget(mut self, hops: usize) -> Self {
        self.hop_budget = hops;
        self
    }

    /// Sets the per-level concurrency.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Sets the ambiguous root policy.
    pub fn with_ambiguous_root(mut self, policy: AmbiguousRootPolicy) -> Self {
        self.ambiguous_root = policy;
        self
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: ScopeConfig =
            toml::from_str(toml).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validated()
    }

    /// Validates this configuration, logging warnings and failing on errors.
    pub fn validated(self) -> Result<Self> {
        for warning in self.validate().into_result()? {
            tracing::warn!(warning = %warning, "scope config");
        }
        Ok(self)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let toml = std::fs::read_to_string(path)?;
        Self::from_toml_str(&toml)
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Fatal issues.
    pub errors: Vec<String>,
    /// Non-fatal issues.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

impl Validate for ScopeConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        // Root name must not be empty
        if self.root_name.trim().is_empty() {
            result.add_error("root_name cannot be empty");
        }
        if self.root_name.contains('\'') {
            result.add_warning("root_name contains a quote; some stores escape it differently");
        }

        // A zero budget denies everything but the root itself
        if self.hop_budget == 0 {
            result.add_error("hop_budget must be at least 1");
        } else if self.hop_budget > 100 {
            result.add_warning("hop_budget over 100 makes denials expensive");
        }

        if self.page_size == 0 {
            result.add_error("page_size must be at least 1");
        }

        // Warn if listings would always come back empty
        if self.default_list_depth == 0 {
            result.add_warning("default_list_depth = 0 lists nothing");
        }

        // Concurrency must be at least 1
        if self.max_concurrency == 0 {
            result.add_error("max_concurrency must be at least 1");
        } else if self.max_concurrency > 32 {
            result.add_warning("max_concurrency over 32 is likely to hit store rate limits");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_config_has_sensible_defaults() {
        let config = ScopeConfig::default();

        assert_eq!(config.root_name, "mcp-sandbox");
        assert_eq!(config.hop_budget, 30);
        assert_eq!(config.default_list_depth, 4);
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.ambiguous_root, AmbiguousRootPolicy::Error);
        assert!(config.validate().is_valid());
    }

    #[test]
    fn scope_config_deserializes_partial_toml() {
        let toml = r#"
            root_name = "agent-workspace"
            max_concurrency = 1
            ambiguous_root = "first"
        "#;

        let config = ScopeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.root_name, "agent-workspace");
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.ambiguous_root, AmbiguousRootPolicy::First);
        assert_eq!(config.hop_budget, 30);
    }

    #[test]
    fn empty_root_name_fails() {
        let config = ScopeConfig::new("  ");
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("root_name")));
    }

    #[test]
    fn zero_limits_fail() {
        let config = ScopeConfig {
            hop_budget: 0,
            page_size: 0,
            max_concurrency: 0,
            ..Default::default()
        };
        let result = config.validate();
        assert_eq!(result.errors.len(), 3);
        assert!(matches!(result.into_result(), Err(Error::Config(_))));
    }

    #[test]
    fn large_limits_warn() {
        let config = ScopeConfig::default()
            .with_hop_budget(500)
            .with_max_concurrency(64);
        let result = config.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let result = ScopeConfig::from_toml_str("hop_budget = \"lots\"");
        assert!(matches!(result, Err(Error::Config(_))));

        let result = ScopeConfig::from_toml_str("hop_budget = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scope.toml");
        std::fs::write(&path, "root_name = \"from-file\"\n").unwrap();

        let config = ScopeConfig::load(&path).unwrap();
        assert_eq!(config.root_name, "from-file");
    }

    #[test]
    fn policy_serializes_to_lowercase() {
        assert_eq!(
            serde_json::to_string(&AmbiguousRootPolicy::First).unwrap(),
            "\"first\""
        );
        assert_eq!(
            serde_json::to_string(&AmbiguousRootPolicy::Error).unwrap(),
            "\"error\""
        );
    }
}
