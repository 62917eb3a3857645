//! Engine configuration
//!
//! One `EngineOptions` per engine instance. Callers typically persist this
//! as JSON alongside their own settings; every field has a conservative
//! default so `Engine::default()` behaves sensibly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Collect report steps and write the report artifact. Turning this off
    /// changes nothing about control flow; only the audit trail is dropped.
    #[serde(default = "default_reporting_enabled")]
    pub reporting_enabled: bool,
    /// Directory report artifacts are written to.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Hold an advisory exclusive lock on a sidecar of the target for the
    /// duration of the read-modify-write. Off by default; single-writer
    /// callers do not need it.
    #[serde(default)]
    pub lock_target: bool,
}

fn default_reporting_enabled() -> bool {
    true
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            reporting_enabled: true,
            report_dir: default_report_dir(),
            lock_target: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = EngineOptions::default();
        assert!(options.reporting_enabled);
        assert_eq!(options.report_dir, PathBuf::from("."));
        assert!(!options.lock_target);
    }

    #[test]
    fn test_options_deserialize_with_missing_fields() {
        let options: EngineOptions = serde_json::from_str("{}").unwrap();
        assert!(options.reporting_enabled);
        assert!(!options.lock_target);
    }
}
