//! Error types for the harness
//!
//! Every failure a case can produce is classified into a [`FailureKind`] so
//! the runner can tell a genuine application defect apart from a flaky
//! environment or a broken precondition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Assertion failed: {context}: expected {expected:?}, got {actual:?}")]
    Assertion {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Fixture failed for group {group}: {reason}")]
    Fixture { group: String, reason: String },

    #[error("Dependency graph error: {0}")]
    Graph(String),

    #[error("Data set error: {0}")]
    DataSet(String),

    #[error("WebDriver binary not found: {0}")]
    DriverNotFound(String),

    #[error("WebDriver failed to start: {0}")]
    DriverStartup(String),

    #[error("WebDriver health check failed after {0} attempts")]
    DriverHealthCheck(usize),

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Datastore error: {0}")]
    Datastore(#[from] uiprobe_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The application did something other than what the case expected.
    Assertion,
    /// The browser, driver or page never reached the state needed to judge.
    Environment,
    /// Group setup or teardown could not establish its preconditions.
    Fixture,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Assertion => "assertion",
            FailureKind::Environment => "environment",
            FailureKind::Fixture => "fixture",
        };
        f.write_str(s)
    }
}

impl HarnessError {
    pub fn assertion(
        context: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        HarnessError::Assertion {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn fixture(group: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        HarnessError::Fixture {
            group: group.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::Assertion { .. }
            | HarnessError::MissingField(_)
            | HarnessError::InvalidField { .. } => FailureKind::Assertion,
            HarnessError::Fixture { .. } | HarnessError::Graph(_) | HarnessError::DataSet(_) => {
                FailureKind::Fixture
            }
            _ => FailureKind::Environment,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            HarnessError::assertion("title", "a", "b").kind(),
            FailureKind::Assertion
        );
        assert_eq!(
            HarnessError::Timeout {
                what: "page ready".into(),
                timeout_ms: 10
            }
            .kind(),
            FailureKind::Environment
        );
        assert_eq!(
            HarnessError::StaleElement("3:7".into()).kind(),
            FailureKind::Environment
        );
        assert_eq!(
            HarnessError::fixture("hosts", "insert failed").kind(),
            FailureKind::Fixture
        );
        assert_eq!(
            HarnessError::MissingField("name".into()).kind(),
            FailureKind::Assertion
        );
    }

    #[test]
    fn test_assertion_message() {
        let err = HarnessError::assertion("message title", "Host group added", "Cannot add host group");
        let msg = err.to_string();
        assert!(msg.contains("message title"));
        assert!(msg.contains("Cannot add host group"));
    }
}
