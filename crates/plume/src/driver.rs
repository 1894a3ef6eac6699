//! chromedriver process management for the default local setup.

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Standard chromedriver port.
pub const DEFAULT_DRIVER_PORT: u16 = 9515;

/// Common paths where chromedriver might be installed.
const CHROMEDRIVER_PATHS: &[&str] = &[
    "/usr/bin/chromedriver",
    "/usr/local/bin/chromedriver",
    "/opt/homebrew/bin/chromedriver",
    "/snap/bin/chromium.chromedriver",
];

pub fn default_driver_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

/// Find the chromedriver binary on the system.
pub fn find_chromedriver_binary() -> Option<String> {
    // First check PATH
    if let Ok(output) = Command::new("which").arg("chromedriver").output()
        && output.status.success()
        && let Ok(path) = String::from_utf8(output.stdout)
    {
        let path = path.trim();
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    // Check common paths
    for path in CHROMEDRIVER_PATHS {
        if std::path::Path::new(path).exists() {
            return Some(path.to_string());
        }
    }

    None
}

/// Handle to a running chromedriver process.
pub struct DriverProcess {
    child: Child,
    port: u16,
}

impl DriverProcess {
    /// WebDriver URL for this instance.
    pub fn webdriver_url(&self) -> String {
        default_driver_url(self.port)
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        info!("Shutting down chromedriver process...");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Launch chromedriver and wait until it answers its status endpoint.
pub async fn launch_chromedriver(port: u16) -> Result<DriverProcess, String> {
    let path = find_chromedriver_binary().ok_or_else(|| {
        "chromedriver not found. Install it or pass --webdriver-url for an external server."
            .to_string()
    })?;

    info!("Launching chromedriver from: {}", path);
    let child = Command::new(&path)
        .arg(format!("--port={}", port))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to launch chromedriver: {}", e))?;

    info!("chromedriver launched with PID: {}", child.id());

    let status_url = format!("{}/status", default_driver_url(port));
    let client = reqwest::Client::new();

    for attempt in 1..=30 {
        sleep(Duration::from_millis(200)).await;

        match client.get(&status_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("chromedriver ready after {} attempts", attempt);
                return Ok(DriverProcess { child, port });
            }
            Ok(_) => {
                warn!("chromedriver responded but not ready yet (attempt {})", attempt);
            }
            Err(_) => {
                if attempt % 5 == 0 {
                    info!("Waiting for chromedriver... (attempt {})", attempt);
                }
            }
        }
    }

    let mut child = child;
    let _ = child.kill();
    let _ = child.wait();
    Err("chromedriver did not become ready within timeout".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        assert_eq!(default_driver_url(9515), "http://127.0.0.1:9515");
    }

    #[test]
    fn test_find_binary() {
        // Just verifies the lookup doesn't panic; availability depends on
        // the system.
        let _ = find_chromedriver_binary();
    }
}
