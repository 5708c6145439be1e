//! Host form: groups, tag and macro sub-tables, cloning

use async_trait::async_trait;
use serde_json::json;
use uiprobe_common::Database;
use uiprobe_harness::{
    assert_expectation, assert_field_values, assert_row_count, Case, CaseContext, DataSet,
    Expectation, FieldMap, Fixture, FixtureState, Form, Group, HarnessResult, Locator, RowOp,
    Scenario, ScenarioCase, Selector, StateProbe,
};
use uiprobe_sim::HOST_TABLES;

use super::{lookup_id, row, submit_expecting};

pub const NEW_ROUTE: &str = "zabbix.php?action=host.edit";
pub const TAGS: &str = "id:tags-table";
pub const MACROS: &str = "id:macros-table";

const HOST_NAME: &str = "Host name";
const HOST_GROUPS: &str = "Host groups";
const CLONE_NAME: &str = "Cloned host";
const CANNOT_ADD: &str = "Cannot add host";
const CANNOT_UPDATE: &str = "Cannot update host";

pub fn edit_route(hostid: i64) -> String {
    format!("zabbix.php?action=host.edit&hostid={}", hostid)
}

pub fn form() -> Form {
    Form::new(Locator::id("host-form")).require([HOST_NAME])
}

pub fn group() -> Group {
    Group::new("hosts")
        .backup(HOST_TABLES)
        .backup(&["auditlog"])
        .fixture(Hosts)
        .scenarios(CreateHost)
        .scenarios(UpdateHostTags)
        .scenarios(UpdateHostMacros)
        .case(CloneHost)
}

/// Hosts whose sub-tables the update and clone cases edit
pub struct Hosts;

struct HostRows<'a> {
    name: &'a str,
    groups: &'a [i64],
    description: &'a str,
    tags: &'a [(&'a str, &'a str)],
    macros: &'a [(&'a str, &'a str, &'a str)],
}

fn create_host(db: &Database, host: HostRows<'_>) -> HarnessResult<i64> {
    let hostid = db.insert(
        "hosts",
        &row([("host", json!(host.name)), ("description", json!(host.description))]),
    )?;
    for groupid in host.groups {
        db.insert("hosts_groups", &row([("hostid", json!(hostid)), ("groupid", json!(groupid))]))?;
    }
    for (tag, value) in host.tags {
        db.insert(
            "host_tag",
            &row([("hostid", json!(hostid)), ("tag", json!(tag)), ("value", json!(value))]),
        )?;
    }
    for (name, value, description) in host.macros {
        db.insert(
            "hostmacro",
            &row([
                ("hostid", json!(hostid)),
                ("macro", json!(name)),
                ("value", json!(value)),
                ("description", json!(description)),
            ]),
        )?;
    }
    Ok(hostid)
}

#[async_trait]
impl Fixture for Hosts {
    async fn before_group(&self, db: &Database) -> HarnessResult<FixtureState> {
        let tags = create_host(
            db,
            HostRows {
                name: "Host for tags",
                groups: &[2],
                description: "",
                tags: &[("action", "simple"), ("tag", "TAG")],
                macros: &[],
            },
        )?;
        let macros = create_host(
            db,
            HostRows {
                name: "Host for macros",
                groups: &[2],
                description: "",
                tags: &[],
                macros: &[("{$MACRO1}", "value 1", ""), ("{$MACRO2}", "value 2", "description 2")],
            },
        )?;
        let clone = create_host(
            db,
            HostRows {
                name: "Host for clone",
                groups: &[2, 4],
                description: "Source of the clone case",
                tags: &[("service", "web"), ("owner", "")],
                macros: &[("{$CLONE.ME}", "42", "answer")],
            },
        )?;
        Ok(FixtureState::new()
            .with("tags_host", tags)
            .with("macros_host", macros)
            .with("clone_source", clone))
    }
}

/// Create hosts from the empty form
pub struct CreateHost;

#[async_trait]
impl ScenarioCase for CreateHost {
    type Input = FieldMap;

    fn name(&self) -> &str {
        "create"
    }

    fn data(&self) -> HarnessResult<DataSet<FieldMap>> {
        Ok(DataSet::new()
            .scenario(
                "no groups",
                FieldMap::new().text(HOST_NAME, "New host"),
                Expectation::bad(CANNOT_ADD, ["Field \"groups\" is mandatory."]),
            )
            .scenario(
                "empty name",
                FieldMap::new()
                    .text(HOST_NAME, "")
                    .multi_select(HOST_GROUPS, ["Linux servers"]),
                Expectation::bad(CANNOT_ADD, ["Incorrect value for field \"host\": cannot be empty."]),
            )
            .scenario(
                "existing name",
                FieldMap::new()
                    .text(HOST_NAME, "Zabbix server")
                    .multi_select(HOST_GROUPS, ["Linux servers"]),
                Expectation::bad(
                    CANNOT_ADD,
                    ["Host with the same name \"Zabbix server\" already exists."],
                ),
            )
            .scenario(
                "with tags and macros",
                FieldMap::new()
                    .text(HOST_NAME, "Acceptance host")
                    .multi_select(HOST_GROUPS, ["Linux servers", "Zabbix servers"])
                    .text("Description", "Created with tags and macros")
                    .table(
                        TAGS,
                        vec![
                            RowOp::add([("tag", "env"), ("value", "prod")]),
                            RowOp::add([("tag", "team"), ("value", "")]),
                        ],
                    )
                    .table(
                        MACROS,
                        vec![RowOp::add([
                            ("macro", "{$PORT}"),
                            ("value", "8080"),
                            ("description", "listen port"),
                        ])],
                    ),
                Expectation::good("Host added"),
            ))
    }

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<FieldMap>) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(NEW_ROUTE).await?;

        let mut form = form();
        form.fill(&mut ctx.session, &scenario.input).await?;
        submit_expecting(ctx, &form, "Add", &scenario.expect, &StateProbe::tables(HOST_TABLES)).await?;

        if scenario.expect.is_good() {
            let name = scenario.input.text_value(HOST_NAME).unwrap_or_default();
            let hostid = lookup_id(&ctx.db, "hosts", "hostid", "host", name)?;
            assert_field_values(
                &mut ctx.session,
                &edit_route(hostid),
                &form,
                &scenario.input.expected_readback(),
            )
            .await?;
        }
        Ok(())
    }
}

async fn update_sub_table(
    ctx: &mut CaseContext,
    hostid: i64,
    scenario: &Scenario<FieldMap>,
) -> HarnessResult<()> {
    ctx.login_default().await?;
    ctx.session.open(&edit_route(hostid)).await?;

    let mut form = form();
    let input = scenario
        .input
        .clone()
        .text(HOST_NAME, ctx.session.value(&Locator::id("host")).await?);
    form.fill(&mut ctx.session, &input).await?;
    submit_expecting(ctx, &form, "Update", &scenario.expect, &StateProbe::tables(HOST_TABLES)).await?;

    if scenario.expect.is_good() {
        assert_field_values(
            &mut ctx.session,
            &edit_route(hostid),
            &form,
            &scenario.input.expected_readback(),
        )
        .await?;
    }
    Ok(())
}

/// Update, add and remove tag rows by their display position
pub struct UpdateHostTags;

#[async_trait]
impl ScenarioCase for UpdateHostTags {
    type Input = FieldMap;

    fn name(&self) -> &str {
        "update tags"
    }

    fn data(&self) -> HarnessResult<DataSet<FieldMap>> {
        Ok(DataSet::new()
            .scenario(
                "empty tag name",
                FieldMap::new().table(TAGS, vec![RowOp::update(0, [("tag", "")])]),
                Expectation::bad(CANNOT_UPDATE, ["Invalid parameter \"/1/tags/1/tag\": cannot be empty."]),
            )
            .scenario(
                "duplicate tag",
                FieldMap::new().table(TAGS, vec![RowOp::add([("tag", "action"), ("value", "simple")])]),
                Expectation::bad(
                    CANNOT_UPDATE,
                    ["Invalid parameter \"/1/tags/3\": value (tag, value)=(action, simple) already exists."],
                ),
            )
            .scenario(
                "update remove add",
                FieldMap::new().table(
                    TAGS,
                    vec![
                        RowOp::update(0, [("tag", "action"), ("value", "update")]),
                        RowOp::remove(1),
                        RowOp::add([("tag", "new tag"), ("value", "new value")]),
                    ],
                ),
                Expectation::good("Host updated"),
            ))
    }

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<FieldMap>) -> HarnessResult<()> {
        let hostid = ctx.fixture.require_id("tags_host")?;
        update_sub_table(ctx, hostid, scenario).await?;
        if scenario.expect.is_good() {
            assert_row_count(&ctx.db, "host_tag", "hostid", hostid, 2)?;
        }
        Ok(())
    }
}

/// Update, add and remove macro rows by their display position
pub struct UpdateHostMacros;

#[async_trait]
impl ScenarioCase for UpdateHostMacros {
    type Input = FieldMap;

    fn name(&self) -> &str {
        "update macros"
    }

    fn data(&self) -> HarnessResult<DataSet<FieldMap>> {
        Ok(DataSet::new()
            .scenario(
                "invalid macro name",
                FieldMap::new().table(MACROS, vec![RowOp::update(0, [("macro", "{$lowercase}")])]),
                Expectation::bad(
                    CANNOT_UPDATE,
                    ["Invalid parameter \"/1/macros/1/macro\": incorrect syntax near \"{$lowercase}\"."],
                ),
            )
            .scenario(
                "duplicate macro",
                FieldMap::new().table(MACROS, vec![RowOp::add([("macro", "{$MACRO1}"), ("value", "other")])]),
                Expectation::bad(
                    CANNOT_UPDATE,
                    ["Invalid parameter \"/1/macros/3\": value (macro)=({$MACRO1}) already exists."],
                ),
            )
            .scenario(
                "update remove add",
                FieldMap::new().table(
                    MACROS,
                    vec![
                        RowOp::update(
                            0,
                            [
                                ("macro", "{$MACRO1}"),
                                ("value", "new value 1"),
                                ("description", "new description"),
                            ],
                        ),
                        RowOp::remove(1),
                        RowOp::add([
                            ("macro", "{$NEW_MACRO}"),
                            ("value", "new"),
                            ("description", "added by the update"),
                        ]),
                    ],
                ),
                Expectation::good("Host updated"),
            ))
    }

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<FieldMap>) -> HarnessResult<()> {
        let hostid = ctx.fixture.require_id("macros_host")?;
        update_sub_table(ctx, hostid, scenario).await?;
        if scenario.expect.is_good() {
            assert_row_count(&ctx.db, "hostmacro", "hostid", hostid, 2)?;
        }
        Ok(())
    }
}

/// A clone carries the source's groups, description, tags and macros
pub struct CloneHost;

#[async_trait]
impl Case for CloneHost {
    fn name(&self) -> &str {
        "clone"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        let source = ctx.fixture.require_id("clone_source")?;
        ctx.login_default().await?;
        ctx.session.open(&edit_route(source)).await?;

        let shape = FieldMap::new()
            .multi_select(HOST_GROUPS, Vec::<String>::new())
            .text("Description", "")
            .table(TAGS, Vec::new())
            .table(MACROS, Vec::new());
        let mut form = form();
        let original = form.read(&mut ctx.session, &shape).await?;

        ctx.session
            .click(&form.locator().clone().within(Selector::button("Clone")))
            .await?;
        form.fill(&mut ctx.session, &FieldMap::new().text(HOST_NAME, CLONE_NAME))
            .await?;
        form.submit(&mut ctx.session, "Add").await?;
        assert_expectation(&mut ctx.session, &Expectation::good("Host added")).await?;

        assert_row_count(&ctx.db, "hosts", "host", CLONE_NAME, 1)?;
        let clone = lookup_id(&ctx.db, "hosts", "hostid", "host", CLONE_NAME)?;
        assert_field_values(&mut ctx.session, &edit_route(clone), &form, &original).await
    }
}
