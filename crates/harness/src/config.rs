//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uiprobe_common::LockoutPolicy;

use crate::error::HarnessResult;

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the frontend under test
    pub base_url: String,

    /// Path to the application datastore (None = in-memory, simulator only)
    pub db_path: Option<PathBuf>,

    /// Directory for result JSON and failure screenshots
    pub output_dir: PathBuf,

    /// Default sign-in identity
    pub credentials: Credentials,

    /// Polling waits
    pub wait: WaitConfig,

    /// Login block policy of the application
    pub lockout: LockoutPolicy,

    /// WebDriver settings for live runs
    pub webdriver: WebDriverConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/zabbix/".to_string(),
            db_path: None,
            output_dir: PathBuf::from("test-results"),
            credentials: Credentials::default(),
            wait: WaitConfig::default(),
            lockout: LockoutPolicy::default(),
            webdriver: WebDriverConfig::default(),
        }
    }
}

/// A username/password pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("Admin", "zabbix")
    }
}

/// Bounds for every polling wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Upper bound for a single wait
    pub timeout_ms: u64,

    /// Delay between two polls
    pub poll_interval_ms: u64,
}

impl WaitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chrome",
            BrowserKind::Firefox => "firefox",
        }
    }
}

/// WebDriver-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// Path to chromedriver/geckodriver
    pub binary_path: PathBuf,

    /// Browser to request from the driver
    pub browser: BrowserKind,

    /// Run the browser without a window
    pub headless: bool,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Timeout for driver startup
    pub startup_timeout_secs: u64,

    /// Browser window size
    pub window_width: u32,
    pub window_height: u32,
}

impl WebDriverConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("chromedriver"),
            browser: BrowserKind::default(),
            headless: true,
            port: None,
            startup_timeout_secs: 30,
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory for failure screenshots
    pub fn screenshot_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.wait.timeout(), Duration::from_secs(10));
        assert_eq!(config.lockout.attempts, 5);
        assert_eq!(config.credentials.username, "Admin");
    }

    #[test]
    fn test_partial_toml() {
        let config: HarnessConfig = toml::from_str(
            r#"
base_url = "http://zabbix.test/"

[wait]
timeout_ms = 2500

[lockout]
attempts = 3
block_secs = 60
"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://zabbix.test/");
        assert_eq!(config.wait.timeout_ms, 2500);
        assert_eq!(config.wait.poll_interval_ms, 100);
        assert_eq!(config.lockout.block(), Duration::from_secs(60));
        assert_eq!(config.webdriver.browser, BrowserKind::Chromium);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("uiprobe.toml");

        let mut config = HarnessConfig::default();
        config.webdriver.browser = BrowserKind::Firefox;
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.webdriver.browser, BrowserKind::Firefox);
        assert_eq!(loaded.wait, config.wait);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("test-results"));
    }
}
