//! Environment configuration.

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use medledger_procedures::{DEFAULT_MAX_DURATION_MINUTES, LedgerPolicy};

pub const MAX_DURATION_VAR: &str = "MEDLEDGER_MAX_DURATION_MINUTES";
pub const PROCEDURE_TYPES_VAR: &str = "MEDLEDGER_PROCEDURE_TYPES";
pub const JOURNAL_PATH_VAR: &str = "MEDLEDGER_JOURNAL_PATH";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of a ledger deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub max_duration_minutes: u32,
    /// Comma-separated catalog; unset means any non-empty label is accepted.
    pub procedure_types: Option<BTreeSet<String>>,
    pub journal_path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_duration_minutes: DEFAULT_MAX_DURATION_MINUTES,
            procedure_types: None,
            journal_path: None,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_DURATION_VAR) {
            let minutes: u32 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: MAX_DURATION_VAR,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            if minutes == 0 {
                return Err(ConfigError::Invalid {
                    key: MAX_DURATION_VAR,
                    value: raw,
                    reason: "must be positive".to_string(),
                });
            }
            config.max_duration_minutes = minutes;
        }

        if let Some(raw) = lookup(PROCEDURE_TYPES_VAR) {
            let types: BTreeSet<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if types.is_empty() {
                return Err(ConfigError::Invalid {
                    key: PROCEDURE_TYPES_VAR,
                    value: raw,
                    reason: "catalog is empty".to_string(),
                });
            }
            config.procedure_types = Some(types);
        }

        config.journal_path = lookup(JOURNAL_PATH_VAR)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn policy(&self) -> LedgerPolicy {
        let policy = LedgerPolicy::default().with_max_duration(self.max_duration_minutes);
        match &self.procedure_types {
            Some(types) => policy.with_procedure_types(types.iter().cloned()),
            None => policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.policy(), LedgerPolicy::default());
    }

    #[test]
    fn parses_all_keys() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (MAX_DURATION_VAR, "90"),
            (PROCEDURE_TYPES_VAR, "stent, biopsie,,drainage"),
            (JOURNAL_PATH_VAR, "/var/lib/medledger/ledger.jsonl"),
        ]))
        .unwrap();

        assert_eq!(config.max_duration_minutes, 90);
        assert_eq!(config.procedure_types.as_ref().map(BTreeSet::len), Some(3));
        assert_eq!(
            config.journal_path,
            Some(PathBuf::from("/var/lib/medledger/ledger.jsonl"))
        );
        assert_eq!(config.policy().max_duration_minutes, 90);
    }

    #[test]
    fn rejects_bad_duration() {
        for raw in ["0", "-5", "a day"] {
            let err = LedgerConfig::from_lookup(lookup(&[(MAX_DURATION_VAR, raw)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: MAX_DURATION_VAR, .. }));
        }
    }
}
