//! WebDriver process management - spawning and health checking the driver

use std::net::TcpListener;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::WebDriverConfig;
use crate::error::{HarnessError, HarnessResult};

/// Grace period between SIGTERM and a hard kill
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Handle to a running chromedriver/geckodriver process
pub struct DriverProcess {
    child: Child,
    url: String,
    port: u16,
}

impl DriverProcess {
    /// Spawn the driver binary and wait until it reports ready
    pub async fn spawn(config: &WebDriverConfig) -> HarnessResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };

        info!("Spawning {} on port {}", config.binary_path.display(), port);

        let child = Command::new(&config.binary_path)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    HarnessError::DriverNotFound(config.binary_path.display().to_string())
                }
                _ => HarnessError::DriverStartup(format!(
                    "Failed to spawn {}: {}",
                    config.binary_path.display(),
                    e
                )),
            })?;

        let mut handle = DriverProcess::attach(child, port);
        if let Err(e) = handle.wait_for_ready(config.startup_timeout()).await {
            handle.stop().await;
            return Err(e);
        }

        info!("WebDriver is ready at {}", handle.url);
        Ok(handle)
    }

    fn attach(mut child: Child, port: u16) -> Self {
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }
        Self {
            child,
            url: format!("http://127.0.0.1:{}", port),
            port,
        }
    }

    /// Poll `/status` until the driver accepts sessions
    async fn wait_for_ready(&mut self, startup_timeout: Duration) -> HarnessResult<()> {
        let status_url = format!("{}/status", self.url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = tokio::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < startup_timeout {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(HarnessError::DriverStartup(format!(
                    "driver exited during startup with {}",
                    status
                )));
            }

            match client.get(&status_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: serde_json::Value = resp.json().await.unwrap_or_default();
                    if body["value"]["ready"].as_bool().unwrap_or(true) {
                        return Ok(());
                    }
                }
                Ok(resp) => warn!("Status check returned {}", resp.status()),
                // Refused connections are normal until the driver binds its port
                Err(e) if e.is_connect() => {
                    if attempts == 1 {
                        info!("Waiting for WebDriver to start...");
                    }
                }
                Err(e) => warn!("Status check error: {}", e),
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(HarnessError::DriverHealthCheck(attempts))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Ask the driver to exit, killing it after a short grace period
    pub async fn stop(&mut self) {
        info!("Stopping WebDriver (pid: {:?})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(id) = self.child.id() {
                if kill(Pid::from_raw(id as i32), Signal::SIGTERM).is_ok()
                    && timeout(STOP_GRACE, self.child.wait()).await.is_ok()
                {
                    return;
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            debug!("WebDriver already gone: {}", e);
        }
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        // Does not wait; the runtime reaps the child
        let _ = self.child.start_kill();
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "webdriver", "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!("WebDriver stderr closed: {}", e);
                break;
            }
        }
    }
}

/// Find a free port to use
fn find_free_port() -> HarnessResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let config = WebDriverConfig {
            binary_path: PathBuf::from("/nonexistent/uiprobe-test-driver"),
            ..WebDriverConfig::default()
        };
        match DriverProcess::spawn(&config).await {
            Err(HarnessError::DriverNotFound(path)) => assert!(path.contains("uiprobe-test-driver")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawned a nonexistent binary"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_chatty_stderr_does_not_block_driver() {
        // Far more than a pipe buffer holds
        let child = Command::new("sh")
            .args(["-c", "i=0; while [ $i -lt 4000 ]; do echo 'chromedriver log line padding padding' >&2; i=$((i+1)); done"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut driver = DriverProcess::attach(child, 9515);

        let status = timeout(Duration::from_secs(20), driver.child.wait())
            .await
            .expect("driver blocked on a full stderr pipe")
            .unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_terminates_driver() {
        let child = Command::new("sleep")
            .arg("30")
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut driver = DriverProcess::attach(child, 9515);
        assert_eq!(driver.url(), "http://127.0.0.1:9515");

        timeout(Duration::from_secs(5), driver.stop()).await.unwrap();
        assert!(driver.child.try_wait().unwrap().is_some());
    }
}
