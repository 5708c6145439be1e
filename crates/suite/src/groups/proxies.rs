//! Proxy form in active and passive mode

use async_trait::async_trait;
use serde_json::json;
use uiprobe_common::Database;
use uiprobe_harness::{
    assert_expectation, assert_field_values, assert_row_count, Case, CaseContext, DataSet,
    Expectation, FieldMap, Fixture, FixtureState, Form, Group, HarnessResult, Locator, Scenario,
    ScenarioCase, StateProbe,
};

use super::{lookup_id, row, submit_expecting};

pub const NEW_ROUTE: &str = "zabbix.php?action=proxy.edit";
pub const UPDATE_PROXY: &str = "Active proxy for update";

const NAME: &str = "Proxy name";
const MODE: &str = "Proxy mode";
const CANNOT_ADD: &str = "Cannot add proxy";

pub fn edit_route(proxyid: i64) -> String {
    format!("zabbix.php?action=proxy.edit&proxyid={}", proxyid)
}

pub fn form() -> Form {
    Form::new(Locator::id("proxy-form")).require([NAME])
}

pub fn group() -> Group {
    Group::new("proxies")
        .backup(&["proxy", "auditlog"])
        .fixture(Proxies)
        .scenarios(CreateProxy)
        .case(UpdateProxy)
}

/// The proxy the update case edits
pub struct Proxies;

#[async_trait]
impl Fixture for Proxies {
    async fn before_group(&self, db: &Database) -> HarnessResult<FixtureState> {
        let id = db.insert(
            "proxy",
            &row([
                ("name", json!(UPDATE_PROXY)),
                ("operating_mode", json!(0)),
                ("description", json!("Description for update")),
            ]),
        )?;
        Ok(FixtureState::new().with("update_proxy", id))
    }
}

/// Create proxies from the empty form
pub struct CreateProxy;

#[async_trait]
impl ScenarioCase for CreateProxy {
    type Input = FieldMap;

    fn name(&self) -> &str {
        "create"
    }

    fn data(&self) -> HarnessResult<DataSet<FieldMap>> {
        let passive = |name: &str, address: &str, port: &str| {
            FieldMap::new()
                .text(NAME, name)
                .select(MODE, "Passive")
                .text("Address", address)
                .text("Port", port)
        };
        Ok(DataSet::new()
            .scenario(
                "empty name",
                FieldMap::new().text(NAME, ""),
                Expectation::bad(CANNOT_ADD, ["Incorrect value for field \"name\": cannot be empty."]),
            )
            .scenario(
                "symbols in name",
                FieldMap::new().text(NAME, "@#$%^&*()_+"),
                Expectation::bad(CANNOT_ADD, ["Invalid parameter \"/1/name\": invalid host name."]),
            )
            .scenario(
                "macro as name",
                FieldMap::new().text(NAME, "{$USERMACRO}"),
                Expectation::bad(CANNOT_ADD, ["Invalid parameter \"/1/name\": invalid host name."]),
            )
            .scenario(
                "existing name",
                FieldMap::new().text(NAME, UPDATE_PROXY),
                Expectation::bad(CANNOT_ADD, [format!("Proxy \"{}\" already exists.", UPDATE_PROXY)]),
            )
            .scenario(
                "passive without address",
                passive("Passive proxy", "", "10051"),
                Expectation::bad(
                    CANNOT_ADD,
                    ["Incorrect value for field \"Interface: Address\": cannot be empty."],
                ),
            )
            .scenario(
                "passive without port",
                passive("Passive proxy", "127.0.0.1", ""),
                Expectation::bad(
                    CANNOT_ADD,
                    ["Incorrect value for field \"Interface: Port\": cannot be empty."],
                ),
            )
            .scenario(
                "passive port out of range",
                passive("Passive proxy", "127.0.0.1", "65536"),
                Expectation::bad(
                    CANNOT_ADD,
                    ["Invalid parameter \"/1/port\": value must be one of 0-65535."],
                ),
            )
            .scenario(
                "passive port not a number",
                passive("Passive proxy", "127.0.0.1", "port"),
                Expectation::bad(CANNOT_ADD, ["Invalid parameter \"/1/port\": an integer is expected."]),
            )
            .scenario(
                "active",
                FieldMap::new()
                    .text(NAME, "Active proxy 1")
                    .select(MODE, "Active")
                    .text("Description", "Created through the form"),
                Expectation::good("Proxy added"),
            )
            .scenario(
                "passive",
                passive("Passive proxy 1", "proxy.example.com", "10055"),
                Expectation::good("Proxy added"),
            ))
    }

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<FieldMap>) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(NEW_ROUTE).await?;

        let mut form = form();
        form.fill(&mut ctx.session, &scenario.input).await?;
        submit_expecting(
            ctx,
            &form,
            "Add",
            &scenario.expect,
            &StateProbe::tables(&["proxy", "auditlog"]),
        )
        .await?;

        if scenario.expect.is_good() {
            let name = scenario.input.text_value(NAME).unwrap_or_default();
            let id = lookup_id(&ctx.db, "proxy", "proxyid", "name", name)?;
            assert_field_values(
                &mut ctx.session,
                &edit_route(id),
                &form,
                &scenario.input.expected_readback(),
            )
            .await?;
        }
        Ok(())
    }
}

/// Switch the provisioned proxy to passive mode under a new name
pub struct UpdateProxy;

pub const UPDATED_PROXY: &str = "Passive proxy after update";

#[async_trait]
impl Case for UpdateProxy {
    fn name(&self) -> &str {
        "update"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        let id = ctx.fixture.require_id("update_proxy")?;
        ctx.session.open(&edit_route(id)).await?;

        let changes = FieldMap::new()
            .text(NAME, UPDATED_PROXY)
            .select(MODE, "Passive")
            .text("Address", "192.168.3.99")
            .text("Port", "10060")
            .text("Description", "");
        let mut form = form();
        form.fill(&mut ctx.session, &changes).await?;
        form.submit(&mut ctx.session, "Update").await?;
        assert_expectation(&mut ctx.session, &Expectation::good("Proxy updated")).await?;

        assert_row_count(&ctx.db, "proxy", "name", UPDATE_PROXY, 0)?;
        assert_row_count(&ctx.db, "proxy", "name", UPDATED_PROXY, 1)?;
        assert_field_values(&mut ctx.session, &edit_route(id), &form, &changes.expected_readback()).await
    }
}
