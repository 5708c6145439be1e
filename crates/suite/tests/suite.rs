//! Acceptance groups and runner behaviour against the simulated frontend

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uiprobe_common::{Database, Row};
use uiprobe_harness::session::DASHBOARD_ROUTE;
use uiprobe_harness::{
    assert_expectation, Case, CaseContext, Credentials, DataSet, Expectation, FailureKind,
    FieldMap, Fixture, FixtureState, Group, HarnessConfig, HarnessError, HarnessResult, Launcher,
    RowOp, RunStatus, Scenario, ScenarioCase, Session, SuiteRunner,
};
use uiprobe_sim::{SimApp, SimLauncher, SimOptions};
use uiprobe_suite::groups::{host_groups, hosts, housekeeping, proxies};
use uiprobe_suite::offline_runner;

fn config(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        base_url: SimOptions::default().base_url,
        output_dir: dir.to_path_buf(),
        ..HarnessConfig::default()
    }
}

fn runner(dir: &Path, db: &Database, options: SimOptions, group: Group) -> SuiteRunner {
    let config = config(dir);
    let app = SimApp::new(db.clone(), config.lockout).unwrap();
    SuiteRunner::new(config, SimLauncher::new(app, options), db.clone()).group(group)
}

async fn signed_in(db: &Database, config: &HarnessConfig) -> Session {
    let app = SimApp::new(db.clone(), config.lockout).unwrap();
    let browser = SimLauncher::new(app, SimOptions::default())
        .launch()
        .await
        .unwrap();
    let mut session = Session::new(browser, config);
    assert!(session
        .login(&Credentials::default())
        .await
        .unwrap()
        .is_authenticated());
    session
}

fn name_row(name: &str) -> Row {
    let mut row = Row::new();
    row.insert("name".to_string(), json!(name));
    row
}

fn failures(result: &uiprobe_harness::SuiteResult) -> Vec<String> {
    result
        .groups
        .iter()
        .flat_map(|g| g.runs.iter())
        .filter(|r| !r.passed())
        .map(|r| format!("{} / {}: {:?}", r.group, r.name, r.status))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_every_group_passes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let runner = offline_runner(config(dir.path()), db.clone(), SimOptions::default()).unwrap();
    let hosts_before = db.digest_table("hosts").unwrap();
    let config_before = db.digest_table("config").unwrap();

    let result = runner.run().await.unwrap();

    assert!(result.success(), "{:#?}", failures(&result));
    assert_eq!(result.skipped, 0);
    assert_eq!(result.groups.len(), 6);

    // Every group's tables are back to their seeded state
    assert_eq!(db.count_where("hstgrp", "name", &json!("Test Group")).unwrap(), 0);
    assert_eq!(db.digest_table("hosts").unwrap(), hosts_before);
    assert_eq!(db.digest_table("config").unwrap(), config_before);

    let written = runner.write_results(&result).unwrap();
    assert!(written.exists());
}

#[tokio::test(start_paused = true)]
async fn test_proxy_group_restores_proxies() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let runner = runner(dir.path(), &db, SimOptions::default(), proxies::group());
    let before = db.digest_table("proxy").unwrap();

    let result = runner.run().await.unwrap();

    assert!(result.success(), "{:#?}", failures(&result));
    let group = result.group("proxies").unwrap();
    assert_eq!(group.case_runs("create").count(), 10);
    assert!(group.case_passed("update"));
    assert_eq!(
        db.count_where("proxy", "name", &json!(proxies::UPDATED_PROXY)).unwrap(),
        0
    );
    assert_eq!(db.digest_table("proxy").unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn test_case_filter_pulls_in_prerequisites() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let runner = offline_runner(config(dir.path()), db, SimOptions::default())
        .unwrap()
        .filter_group(Some("host groups".to_string()))
        .filter_case(Some("duplicate".to_string()));

    let result = runner.run().await.unwrap();

    assert!(result.success(), "{:#?}", failures(&result));
    let group = result.group("host groups").unwrap();
    assert!(group.case_passed("create"));
    assert!(group.case_passed("duplicate"));
    assert_eq!(group.case_runs("create").count(), 5);
    assert_eq!(
        group.case_runs("create").nth(3).map(|r| r.name.as_str()),
        Some("create #3 new group")
    );
}

#[tokio::test(start_paused = true)]
async fn test_lockout_releases_after_block() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let runner = offline_runner(config(dir.path()), db.clone(), SimOptions::default())
        .unwrap()
        .filter_group(Some("authentication".to_string()))
        .filter_case(Some("lockout".to_string()));

    let result = runner.run().await.unwrap();

    assert!(result.success(), "{:#?}", failures(&result));
    assert_eq!(result.total, 1);
    // Accounts created by the fixture are gone again
    assert_eq!(
        db.count_where("users", "username", &json!("lockout-user")).unwrap(),
        0
    );
}

struct AlwaysFails;

#[async_trait]
impl Case for AlwaysFails {
    fn name(&self) -> &str {
        "fails"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.db.insert("hstgrp", &name_row("Left behind"))?;
        Err(HarnessError::assertion("always", "pass", "fail"))
    }
}

struct Opens {
    name: &'static str,
    route: &'static str,
}

#[async_trait]
impl Case for Opens {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(self.route).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_dependent_skipped_and_tables_restored() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let group = Group::new("dependencies")
        .backup(&["hstgrp"])
        .case(AlwaysFails)
        .case(Opens {
            name: "dependent",
            route: DASHBOARD_ROUTE,
        })
        .case(Opens {
            name: "independent",
            route: DASHBOARD_ROUTE,
        })
        .depends("dependent", "fails");

    let result = runner(dir.path(), &db, SimOptions::default(), group)
        .run()
        .await
        .unwrap();

    let group = result.group("dependencies").unwrap();
    let fails = group.case_runs("fails").next().unwrap();
    assert_eq!(fails.failure_kind(), Some(FailureKind::Assertion));
    assert!(group.case_runs("dependent").next().unwrap().is_skipped());
    assert!(group.case_passed("independent"));
    assert_eq!((result.passed, result.failed, result.skipped), (1, 1, 1));
    assert!(!result.success());
    assert_eq!(db.count_where("hstgrp", "name", &json!("Left behind")).unwrap(), 0);
}

struct BrokenSeed;

#[async_trait]
impl Fixture for BrokenSeed {
    async fn before_group(&self, db: &Database) -> HarnessResult<FixtureState> {
        db.insert("hstgrp", &name_row("Half seeded"))?;
        Err(HarnessError::Config("seed data unavailable".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_fixture_failure_skips_group() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let group = Group::new("broken")
        .backup(&["hstgrp"])
        .fixture(BrokenSeed)
        .case(Opens {
            name: "never runs",
            route: DASHBOARD_ROUTE,
        });

    let result = runner(dir.path(), &db, SimOptions::default(), group)
        .run()
        .await
        .unwrap();

    let group = result.group("broken").unwrap();
    let setup = group.setup_error.as_deref().unwrap();
    assert!(setup.contains("seed data unavailable"), "{}", setup);
    assert!(group.runs.iter().all(|r| r.is_skipped()));
    assert!(!result.success());
    assert_eq!(db.count_where("hstgrp", "name", &json!("Half seeded")).unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_page_that_never_loads_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let options = SimOptions {
        never_ready: vec!["zabbix.php?action=housekeeping".to_string()],
        ..SimOptions::default()
    };
    let group = Group::new("readiness")
        .case(Opens {
            name: "stuck",
            route: housekeeping::ROUTE,
        })
        .case(Opens {
            name: "sibling",
            route: host_groups::NEW_ROUTE,
        });

    let result = runner(dir.path(), &db, options, group).run().await.unwrap();

    let group = result.group("readiness").unwrap();
    let stuck = group.case_runs("stuck").next().unwrap();
    assert_eq!(stuck.failure_kind(), Some(FailureKind::Environment));
    match &stuck.status {
        RunStatus::Failed { message, .. } => assert!(message.contains("Timeout"), "{}", message),
        other => panic!("unexpected status {:?}", other),
    }
    assert!(group.case_passed("sibling"));
}

struct Counted(Arc<AtomicUsize>);

#[async_trait]
impl ScenarioCase for Counted {
    type Input = u32;

    fn name(&self) -> &str {
        "counted"
    }

    fn data(&self) -> HarnessResult<DataSet<u32>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(DataSet::new()
            .scenario("one", 1, Expectation::good("unused"))
            .scenario("two", 2, Expectation::good("unused")))
    }

    async fn run(&self, _ctx: &mut CaseContext, scenario: &Scenario<u32>) -> HarnessResult<()> {
        if scenario.input == 0 {
            return Err(HarnessError::assertion("input", "non-zero", 0));
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_provider_evaluated_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("providers").scenarios(Counted(calls.clone()));

    let result = runner(dir.path(), &db, SimOptions::default(), group)
        .run()
        .await
        .unwrap();

    assert_eq!(result.passed, 2);
    // At least one enumeration plus one call per run
    assert!(calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_missing_required_field_fails_before_submit() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let config = config(dir.path());
    let mut session = signed_in(&db, &config).await;
    session.open(host_groups::NEW_ROUTE).await.unwrap();
    let before = db.digest_table("hstgrp").unwrap();

    let mut form = host_groups::form();
    let err = form
        .fill(&mut session, &FieldMap::new().text("id:name", "Unlabelled"))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::MissingField(ref f) if f == "Group name"), "{}", err);
    assert_eq!(err.kind(), FailureKind::Assertion);
    assert_eq!(db.digest_table("hstgrp").unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn test_sub_table_fill_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let config = config(dir.path());
    let mut session = signed_in(&db, &config).await;

    let mut host = Row::new();
    host.insert("host".to_string(), json!("Idempotent host"));
    let hostid = db.insert("hosts", &host).unwrap();
    let mut link = Row::new();
    link.insert("hostid".to_string(), json!(hostid));
    link.insert("groupid".to_string(), json!(2));
    db.insert("hosts_groups", &link).unwrap();
    for (tag, value) in [("first", "1"), ("second", "2"), ("third", "3")] {
        let mut row = Row::new();
        row.insert("hostid".to_string(), json!(hostid));
        row.insert("tag".to_string(), json!(tag));
        row.insert("value".to_string(), json!(value));
        db.insert("host_tag", &row).unwrap();
    }

    session.open(&hosts::edit_route(hostid)).await.unwrap();
    let fields = FieldMap::new().text("Host name", "Idempotent host").table(
        hosts::TAGS,
        vec![
            RowOp::update(0, [("tag", "first"), ("value", "one")]),
            RowOp::remove(1),
            RowOp::update(1, [("value", "three")]),
            RowOp::add([("tag", "fourth"), ("value", "4")]),
        ],
    );
    let shape = FieldMap::new().table(hosts::TAGS, Vec::new());

    let mut form = hosts::form();
    form.fill(&mut session, &fields).await.unwrap();
    let once = form.read(&mut session, &shape).await.unwrap();
    form.fill(&mut session, &fields).await.unwrap();
    let twice = form.read(&mut session, &shape).await.unwrap();

    assert_eq!(once, twice);
    let expected = FieldMap::new().table(
        hosts::TAGS,
        vec![
            RowOp::add([("tag", "first"), ("value", "one")]),
            RowOp::add([("tag", "third"), ("value", "three")]),
            RowOp::add([("tag", "fourth"), ("value", "4")]),
        ],
    );
    assert!(expected.diff(&twice).is_empty(), "{:?}", expected.diff(&twice));

    form.submit(&mut session, "Update").await.unwrap();
    assert_expectation(&mut session, &Expectation::good("Host updated"))
        .await
        .unwrap();
    assert_eq!(db.count_where("host_tag", "hostid", &json!(hostid)).unwrap(), 3);
}

#[test]
fn test_housekeeping_scenarios_parse() {
    let data = housekeeping::HousekeepingForm::default().data().unwrap();
    assert_eq!(data.len(), 8);
    let first = data.get(0).unwrap();
    assert_eq!(first.name, "empty audit period");
    assert!(!first.expect.is_good());
    assert!(first
        .expect
        .details()
        .iter()
        .any(|d| d == "Incorrect value for field \"hk_audit\": a time unit is expected."));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_scenarios_fail_the_group() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let group = Group::new("housekeeping")
        .backup(&["config"])
        .scenarios(housekeeping::HousekeepingForm::with_scenarios(
            "- name: [unterminated\n  input: {",
        ));

    let result = runner(dir.path(), &db, SimOptions::default(), group)
        .run()
        .await
        .unwrap();

    assert!(!result.success());
    assert_eq!(result.total, 1);
    assert_eq!(result.failed, 1);
    let run = &result.groups[0].runs[0];
    assert_eq!(run.name, "form #0 data");
    match &run.status {
        RunStatus::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::Fixture);
            assert!(message.contains("form provider"), "{}", message);
        }
        other => panic!("unexpected status: {:?}", other),
    }
}
