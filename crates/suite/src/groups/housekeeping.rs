//! Housekeeping settings form

use async_trait::async_trait;
use serde_json::json;
use uiprobe_harness::{
    assert_db_row, assert_db_unchanged, assert_expectation, assert_field_values, Case,
    CaseContext, DataSet, Expectation, FieldMap, Form, Group, HarnessResult, Locator, Scenario,
    ScenarioCase, StateProbe,
};

use super::{row, submit_expecting};

pub const ROUTE: &str = "zabbix.php?action=housekeeping.edit";

const SCENARIOS: &str = include_str!("../../data/housekeeping.yaml");
const UPDATED: &str = "Configuration updated";

pub fn form() -> Form {
    Form::new(Locator::id("housekeeping-form"))
}

fn probe() -> StateProbe {
    StateProbe::tables(&["config"])
}

pub fn group() -> Group {
    Group::new("housekeeping")
        .backup(&["config"])
        .case(SimpleUpdate)
        .scenarios(HousekeepingForm::default())
        .case(ResetDefaults)
}

/// Submitting the form untouched changes nothing
pub struct SimpleUpdate;

#[async_trait]
impl Case for SimpleUpdate {
    fn name(&self) -> &str {
        "simple update"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(ROUTE).await?;

        let before = probe().capture(&ctx.db)?;
        form().submit(&mut ctx.session, "Update").await?;
        assert_expectation(&mut ctx.session, &Expectation::good(UPDATED)).await?;
        assert_db_unchanged(&before, &probe().capture(&ctx.db)?)
    }
}

/// Data-driven period validation, scenarios from `data/housekeeping.yaml`
pub struct HousekeepingForm {
    scenarios: &'static str,
}

impl HousekeepingForm {
    /// Validate against another YAML scenario list
    pub fn with_scenarios(scenarios: &'static str) -> Self {
        Self { scenarios }
    }
}

impl Default for HousekeepingForm {
    fn default() -> Self {
        Self::with_scenarios(SCENARIOS)
    }
}

#[async_trait]
impl ScenarioCase for HousekeepingForm {
    type Input = FieldMap;

    fn name(&self) -> &str {
        "form"
    }

    fn data(&self) -> HarnessResult<DataSet<FieldMap>> {
        DataSet::from_yaml(self.scenarios)
    }

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<FieldMap>) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(ROUTE).await?;

        let mut form = form();
        form.fill(&mut ctx.session, &scenario.input).await?;
        submit_expecting(ctx, &form, "Update", &scenario.expect, &probe()).await?;

        if scenario.expect.is_good() {
            assert_field_values(&mut ctx.session, ROUTE, &form, &scenario.input.expected_readback())
                .await?;
        }
        Ok(())
    }
}

/// "Reset defaults" puts every period back to its shipped value
pub struct ResetDefaults;

#[async_trait]
impl Case for ResetDefaults {
    fn name(&self) -> &str {
        "reset defaults"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(ROUTE).await?;

        let mut form = form();
        form.fill(
            &mut ctx.session,
            &FieldMap::new()
                .checkbox("id:hk_audit_mode", true)
                .text("Data storage period", "400d")
                .checkbox("id:hk_trends_mode", false),
        )
        .await?;
        form.submit(&mut ctx.session, "Update").await?;
        assert_expectation(&mut ctx.session, &Expectation::good(UPDATED)).await?;
        assert_db_row(
            &ctx.db,
            "SELECT hk_audit, hk_trends_mode FROM config WHERE configid = 1",
            &[],
            &row([("hk_audit", json!("400d")), ("hk_trends_mode", json!(0))]),
        )?;

        form.submit(&mut ctx.session, "Reset defaults").await?;
        assert_expectation(&mut ctx.session, &Expectation::good(UPDATED)).await?;
        assert_db_row(
            &ctx.db,
            "SELECT hk_audit_mode, hk_audit, hk_trends_mode, hk_trends, hk_history \
             FROM config WHERE configid = 1",
            &[],
            &row([
                ("hk_audit_mode", json!(1)),
                ("hk_audit", json!("31d")),
                ("hk_trends_mode", json!(1)),
                ("hk_trends", json!("365d")),
                ("hk_history", json!("31d")),
            ]),
        )
    }
}
