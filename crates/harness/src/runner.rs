//! Suite runner
//!
//! Drives groups one after another: back up tables, run the fixture, open a
//! browser, run cases in dependency order, then tear down and restore.
//! Teardown and restore happen on every path out of a group.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uiprobe_common::Database;

use crate::case::{CaseContext, CaseRunner};
use crate::config::HarnessConfig;
use crate::driver::Launcher;
use crate::error::{FailureKind, HarnessError, HarnessResult};
use crate::fixture::{BackupGuard, FixtureState};
use crate::group::Group;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed { kind: FailureKind, message: String },
    Skipped { reason: String },
}

/// Result of one run of one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub group: String,
    pub case: String,
    /// Run label; the scenario name for data-driven cases
    pub name: String,
    pub index: usize,
    #[serde(flatten)]
    pub status: RunStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            RunStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, RunStatus::Skipped { .. })
    }
}

/// Result of one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    pub name: String,
    pub runs: Vec<RunResult>,
    /// Backup, fixture or browser launch failure; no case ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_error: Option<String>,
    pub duration_ms: u64,
}

impl GroupResult {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            runs: Vec::new(),
            setup_error: None,
            teardown_error: None,
            restore_error: None,
            duration_ms: 0,
        }
    }

    pub fn case_runs<'a>(&'a self, case: &'a str) -> impl Iterator<Item = &'a RunResult> + 'a {
        self.runs.iter().filter(move |r| r.case == case)
    }

    /// Every run of the case passed (and there was at least one)
    pub fn case_passed(&self, case: &str) -> bool {
        let mut runs = self.case_runs(case).peekable();
        runs.peek().is_some() && runs.all(|r| r.passed())
    }

    fn skip_all(&mut self, cases: &[&dyn CaseRunner], reason: &str) {
        for case in cases {
            for (index, name) in case.runs().into_iter().enumerate() {
                self.runs.push(RunResult {
                    group: self.name.clone(),
                    case: case.name().to_string(),
                    name,
                    index,
                    status: RunStatus::Skipped {
                        reason: reason.to_string(),
                    },
                    duration_ms: 0,
                    screenshot: None,
                });
            }
        }
    }
}

/// Result of running all groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub groups: Vec<GroupResult>,
}

impl SuiteResult {
    fn from_groups(groups: Vec<GroupResult>, duration_ms: u64) -> Self {
        let runs = groups.iter().flat_map(|g| g.runs.iter());
        let (mut passed, mut failed, mut skipped) = (0, 0, 0);
        for run in runs {
            match run.status {
                RunStatus::Passed => passed += 1,
                RunStatus::Failed { .. } => failed += 1,
                RunStatus::Skipped { .. } => skipped += 1,
            }
        }
        Self {
            total: passed + failed + skipped,
            passed,
            failed,
            skipped,
            duration_ms,
            groups,
        }
    }

    /// No failed run and no group-level error
    pub fn success(&self) -> bool {
        self.failed == 0
            && self.groups.iter().all(|g| {
                g.setup_error.is_none() && g.teardown_error.is_none() && g.restore_error.is_none()
            })
    }

    pub fn group(&self, name: &str) -> Option<&GroupResult> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Main suite runner
pub struct SuiteRunner {
    config: Arc<HarnessConfig>,
    launcher: Box<dyn Launcher>,
    db: Database,
    groups: Vec<Group>,
    group_filter: Option<String>,
    case_filter: Option<String>,
}

impl SuiteRunner {
    pub fn new(config: HarnessConfig, launcher: impl Launcher + 'static, db: Database) -> Self {
        Self {
            config: Arc::new(config),
            launcher: Box::new(launcher),
            db,
            groups: Vec::new(),
            group_filter: None,
            case_filter: None,
        }
    }

    pub fn group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn groups(mut self, groups: impl IntoIterator<Item = Group>) -> Self {
        self.groups.extend(groups);
        self
    }

    /// Run only the named group
    pub fn filter_group(mut self, name: Option<String>) -> Self {
        self.group_filter = name;
        self
    }

    /// Run only the named case, plus whatever it depends on
    pub fn filter_case(mut self, name: Option<String>) -> Self {
        self.case_filter = name;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Check every group's dependency declarations before anything runs.
    pub fn validate(&self) -> HarnessResult<()> {
        let mut names = HashSet::new();
        for group in &self.groups {
            if !names.insert(group.name()) {
                return Err(HarnessError::Graph(format!(
                    "group {} declared twice",
                    group.name()
                )));
            }
            group.plan()?;
        }
        if let Some(name) = &self.group_filter {
            if !names.contains(name.as_str()) {
                return Err(HarnessError::Config(format!("no group named {}", name)));
            }
        }
        Ok(())
    }

    /// Group name and run labels of everything the filters select
    pub fn list(&self) -> HarnessResult<Vec<(String, Vec<String>)>> {
        self.validate()?;
        let mut listing = Vec::new();
        for group in self.selected_groups() {
            let labels = self
                .selected_cases(group)?
                .iter()
                .flat_map(|c| c.runs())
                .collect();
            listing.push((group.name().to_string(), labels));
        }
        Ok(listing)
    }

    fn selected_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(move |g| {
            self.group_filter
                .as_deref()
                .map(|name| g.name() == name)
                .unwrap_or(true)
        })
    }

    fn selected_cases<'g>(&self, group: &'g Group) -> HarnessResult<Vec<&'g dyn CaseRunner>> {
        let wanted = self
            .case_filter
            .as_deref()
            .map(|case| group.graph().closure(case));
        Ok(group
            .plan()?
            .iter()
            .filter(|name| wanted.as_ref().map(|w| w.contains(*name)).unwrap_or(true))
            .filter_map(|name| group.get(name))
            .collect())
    }

    /// Run every selected group
    pub async fn run(&self) -> HarnessResult<SuiteResult> {
        self.validate()?;
        let start = Instant::now();
        let mut groups = Vec::new();

        for group in self.selected_groups() {
            let cases = self.selected_cases(group)?;
            if cases.is_empty() {
                continue;
            }
            groups.push(self.run_group(group, &cases).await);
        }

        let result = SuiteResult::from_groups(groups, start.elapsed().as_millis() as u64);
        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            result.passed, result.failed, result.skipped, result.duration_ms
        );
        Ok(result)
    }

    async fn run_group(&self, group: &Group, cases: &[&dyn CaseRunner]) -> GroupResult {
        let start = Instant::now();
        let mut result = GroupResult::new(group.name());

        if let Some(reason) = group.skip_reason() {
            info!("Skipping group {}: {}", group.name(), reason);
            result.skip_all(cases, reason);
            return result;
        }
        info!("Group {}: {} case(s)", group.name(), cases.len());

        let backup = match BackupGuard::capture(&self.db, group.backup_tables()) {
            Ok(backup) => backup,
            Err(e) => {
                let e = HarnessError::fixture(group.name(), e);
                error!("✗ {}", e);
                result.setup_error = Some(e.to_string());
                result.skip_all(cases, "table backup failed");
                return result;
            }
        };

        let state = match group.fixture_ref().before_group(&self.db).await {
            Ok(state) => state,
            Err(e) => {
                let e = HarnessError::fixture(group.name(), e);
                error!("✗ {}", e);
                result.setup_error = Some(e.to_string());
                result.skip_all(cases, "group fixture failed");
                self.restore(backup, &mut result);
                return result;
            }
        };

        match self.launcher.launch().await {
            Ok(browser) => {
                let mut ctx = CaseContext {
                    session: Session::new(browser, &self.config),
                    db: self.db.clone(),
                    fixture: Arc::new(state),
                    config: self.config.clone(),
                };
                self.run_cases(group, cases, &mut ctx, &mut result).await;

                let CaseContext {
                    session, fixture, ..
                } = ctx;
                if let Err(e) = session.close().await {
                    warn!("Failed to close browser: {}", e);
                }
                self.teardown(group, &fixture, &mut result).await;
            }
            Err(e) => {
                error!("✗ browser launch for {} failed: {}", group.name(), e);
                result.setup_error = Some(e.to_string());
                result.skip_all(cases, "browser launch failed");
                self.teardown(group, &state, &mut result).await;
            }
        }

        self.restore(backup, &mut result);
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    async fn run_cases(
        &self,
        group: &Group,
        cases: &[&dyn CaseRunner],
        ctx: &mut CaseContext,
        result: &mut GroupResult,
    ) {
        let mut passed: HashMap<&str, bool> = HashMap::new();

        for case in cases {
            let name = case.name();
            let unmet: Vec<&str> = group
                .graph()
                .dependencies(name)
                .into_iter()
                .filter(|dep| !passed.get(dep).copied().unwrap_or(false))
                .collect();

            if !unmet.is_empty() {
                let reason = format!("prerequisite {} did not pass", unmet.join(", "));
                info!("- {} skipped: {}", name, reason);
                result.skip_all(&[*case], &reason);
                passed.insert(name, false);
                continue;
            }

            let mut all_passed = true;
            for (index, label) in case.runs().into_iter().enumerate() {
                let run_start = Instant::now();
                let outcome = case.run(ctx, index).await;
                let duration_ms = run_start.elapsed().as_millis() as u64;

                let (status, screenshot) = match outcome {
                    Ok(()) => {
                        info!("✓ {} ({} ms)", label, duration_ms);
                        (RunStatus::Passed, None)
                    }
                    Err(e) => {
                        all_passed = false;
                        error!("✗ {} - [{}] {}", label, e.kind(), e);
                        let shot = self
                            .capture_failure(&mut ctx.session, group.name(), &label)
                            .await;
                        (
                            RunStatus::Failed {
                                kind: e.kind(),
                                message: e.to_string(),
                            },
                            shot,
                        )
                    }
                };

                result.runs.push(RunResult {
                    group: group.name().to_string(),
                    case: name.to_string(),
                    name: label,
                    index,
                    status,
                    duration_ms,
                    screenshot,
                });
            }
            passed.insert(name, all_passed);
        }
    }

    async fn teardown(&self, group: &Group, state: &FixtureState, result: &mut GroupResult) {
        if let Err(e) = group.fixture_ref().after_group(&self.db, state).await {
            warn!("Teardown for {} failed: {}", group.name(), e);
            result.teardown_error = Some(e.to_string());
        }
    }

    fn restore(&self, backup: BackupGuard, result: &mut GroupResult) {
        if let Err(e) = backup.restore() {
            error!("✗ restoring tables for {} failed: {}", result.name, e);
            result.restore_error = Some(e.to_string());
        }
    }

    /// Best-effort screenshot of a failed run
    async fn capture_failure(&self, session: &mut Session, group: &str, label: &str) -> Option<PathBuf> {
        let bytes = match session.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("No screenshot for {}: {}", label, e);
                return None;
            }
        };
        let dir = self.config.screenshot_dir();
        let path = dir.join(format!("{}.png", file_stem(&format!("{}-{}", group, label))));
        let written = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, bytes));
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to write screenshot {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write suite results to JSON file
    pub fn write_results(&self, results: &SuiteResult) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

fn file_stem(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(case: &str, status: RunStatus) -> RunResult {
        RunResult {
            group: "g".into(),
            case: case.into(),
            name: case.into(),
            index: 0,
            status,
            duration_ms: 1,
            screenshot: None,
        }
    }

    #[test]
    fn test_tally_and_success() {
        let mut group = GroupResult::new("g");
        group.runs.push(run("a", RunStatus::Passed));
        group.runs.push(run(
            "b",
            RunStatus::Failed {
                kind: FailureKind::Assertion,
                message: "boom".into(),
            },
        ));
        group.runs.push(run("c", RunStatus::Skipped { reason: "b".into() }));

        let suite = SuiteResult::from_groups(vec![group], 3);
        assert_eq!((suite.total, suite.passed, suite.failed, suite.skipped), (3, 1, 1, 1));
        assert!(!suite.success());
        let g = suite.group("g").unwrap();
        assert!(g.case_passed("a"));
        assert!(!g.case_passed("b"));
        assert!(!g.case_passed("missing"));
    }

    #[test]
    fn test_restore_error_fails_suite() {
        let mut group = GroupResult::new("g");
        group.runs.push(run("a", RunStatus::Passed));
        group.restore_error = Some("digest mismatch".into());
        assert!(!SuiteResult::from_groups(vec![group], 1).success());
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(run(
            "b",
            RunStatus::Failed {
                kind: FailureKind::Environment,
                message: "timeout".into(),
            },
        ))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "environment");
        assert!(json.get("screenshot").is_none());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("host groups-Create #0 new"), "host-groups-create--0-new");
    }
}
