//! uiprobe
//!
//! Runs the acceptance groups against the simulated frontend, or against a
//! live one through WebDriver with `--live`.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uiprobe_harness::{BrowserKind, HarnessConfig, RunStatus, SuiteResult, SuiteRunner};
use uiprobe_sim::SimOptions;
use uiprobe_suite::{live_runner, offline_runner, open_datastore};

#[derive(Parser)]
#[command(name = "uiprobe")]
#[command(about = "Data-driven acceptance tests for the administration frontend")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "uiprobe.toml", env = "UIPROBE_CONFIG")]
    config: PathBuf,

    /// Run only this group
    #[arg(short, long)]
    group: Option<String>,

    /// Run only this case (and the cases it depends on)
    #[arg(long)]
    case: Option<String>,

    /// Results directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Drive a live frontend through WebDriver
    #[arg(long)]
    live: bool,

    /// Browser for live runs
    #[arg(long, value_parser = parse_browser)]
    browser: Option<BrowserKind>,

    /// List groups and cases without running them
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn parse_browser(s: &str) -> Result<BrowserKind, String> {
    match s.to_lowercase().as_str() {
        "chrome" | "chromium" => Ok(BrowserKind::Chromium),
        "firefox" => Ok(BrowserKind::Firefox),
        other => Err(format!("unknown browser: {}", other)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Ok(true) when every run passed
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = HarnessConfig::load(&cli.config)?;
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    if let Some(browser) = cli.browser {
        config.webdriver.browser = browser;
    }

    // The driver process lives until the run is over
    let (runner, mut driver) = if cli.live {
        let (runner, driver) = live_runner(config).await?;
        (runner, Some(driver))
    } else {
        let db = open_datastore(&config)?;
        (offline_runner(config, db, SimOptions::default())?, None)
    };
    let runner = runner.filter_group(cli.group).filter_case(cli.case);

    let outcome = if cli.list {
        list(&runner).map(|_| true)
    } else {
        execute(&runner).await
    };
    if let Some(driver) = driver.as_mut() {
        driver.stop().await;
    }
    outcome
}

async fn execute(runner: &SuiteRunner) -> anyhow::Result<bool> {
    info!("uiprobe v{}", env!("CARGO_PKG_VERSION"));
    let results = runner.run().await?;
    report(&results);
    runner.write_results(&results)?;
    Ok(results.success())
}

fn list(runner: &SuiteRunner) -> anyhow::Result<()> {
    for (group, runs) in runner.list()? {
        println!("{}", group);
        for run in runs {
            println!("  {}", run);
        }
    }
    Ok(())
}

fn report(results: &SuiteResult) {
    for group in &results.groups {
        if let Some(e) = &group.setup_error {
            println!("{}: setup failed: {}", group.name, e);
        }
        for run in &group.runs {
            match &run.status {
                RunStatus::Passed => println!("  PASS  {} / {}", group.name, run.name),
                RunStatus::Failed { kind, message } => {
                    println!("  FAIL  {} / {} [{}]: {}", group.name, run.name, kind, message)
                }
                RunStatus::Skipped { reason } => {
                    println!("  SKIP  {} / {} ({})", group.name, run.name, reason)
                }
            }
        }
        if let Some(e) = &group.restore_error {
            println!("{}: restore failed: {}", group.name, e);
        }
    }
    println!(
        "{} runs: {} passed, {} failed, {} skipped in {} ms",
        results.total, results.passed, results.failed, results.skipped, results.duration_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("chrome", BrowserKind::Chromium)]
    #[test_case("Chromium", BrowserKind::Chromium)]
    #[test_case("firefox", BrowserKind::Firefox)]
    fn test_parse_browser(arg: &str, expected: BrowserKind) {
        assert_eq!(parse_browser(arg).unwrap(), expected);
    }

    #[test]
    fn test_parse_browser_rejects_unknown() {
        assert!(parse_browser("webkit").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["uiprobe", "--group", "hosts"]);
        assert_eq!(cli.config, PathBuf::from("uiprobe.toml"));
        assert_eq!(cli.group.as_deref(), Some("hosts"));
        assert!(!cli.live && !cli.list);
    }
}
