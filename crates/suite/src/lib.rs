//! uiprobe suite
//!
//! The acceptance groups run against the administration frontend, and the
//! wiring that points them at either a live frontend driven over WebDriver
//! or the in-process simulated one.

pub mod groups;

use tracing::info;
use uiprobe_common::Database;
use uiprobe_harness::{
    DriverProcess, HarnessConfig, HarnessError, HarnessResult, SuiteRunner, WebDriverLauncher,
};
use uiprobe_sim::{SimApp, SimLauncher, SimOptions};

pub use groups::all_groups;

/// Datastore named by the configuration, or a fresh in-memory one.
pub fn open_datastore(config: &HarnessConfig) -> HarnessResult<Database> {
    Ok(match &config.db_path {
        Some(path) => Database::open(path)?,
        None => Database::open_memory()?,
    })
}

/// Runner for every group against the simulated frontend.
pub fn offline_runner(
    config: HarnessConfig,
    db: Database,
    options: SimOptions,
) -> HarnessResult<SuiteRunner> {
    let app = SimApp::new(db.clone(), config.lockout)?;
    let config = HarnessConfig {
        base_url: options.base_url.clone(),
        ..config
    };
    info!("Using simulated frontend at {}", config.base_url);
    Ok(SuiteRunner::new(config, SimLauncher::new(app, options), db).groups(all_groups()))
}

/// Runner for every group against a live frontend. The returned driver
/// process must outlive the run.
pub async fn live_runner(config: HarnessConfig) -> HarnessResult<(SuiteRunner, DriverProcess)> {
    let Some(path) = config.db_path.clone() else {
        return Err(HarnessError::Config(
            "live runs need db_path to reach the frontend's datastore".to_string(),
        ));
    };
    let db = Database::open(&path)?;
    let driver = DriverProcess::spawn(&config.webdriver).await?;
    let launcher = WebDriverLauncher::new(driver.url(), config.webdriver.clone());
    info!("Using live frontend at {}", config.base_url);
    Ok((SuiteRunner::new(config, launcher, db).groups(all_groups()), driver))
}
