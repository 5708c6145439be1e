//! Host group form

use async_trait::async_trait;
use uiprobe_harness::{
    assert_field_values, assert_row_count, Case, CaseContext, DataSet, Expectation, FieldMap,
    Form, Group, HarnessResult, Locator, Scenario, ScenarioCase, StateProbe,
};

use super::{lookup_id, submit_expecting};

pub const NEW_ROUTE: &str = "zabbix.php?action=hostgroup.edit";
pub const GROUP_NAME: &str = "Test Group";

const NAME: &str = "Group name";
const CANNOT_ADD: &str = "Cannot add host group";

pub fn edit_route(groupid: i64) -> String {
    format!("zabbix.php?action=hostgroup.edit&groupid={}", groupid)
}

pub fn form() -> Form {
    Form::new(Locator::id("hostgroup-form")).require([NAME])
}

pub fn group() -> Group {
    Group::new("host groups")
        .backup(&["hstgrp", "auditlog"])
        .scenarios(CreateHostGroup)
        .case(DuplicateHostGroup)
        .depends("duplicate", "create")
}

/// Create host groups from the form
pub struct CreateHostGroup;

#[async_trait]
impl ScenarioCase for CreateHostGroup {
    type Input = FieldMap;

    fn name(&self) -> &str {
        "create"
    }

    fn data(&self) -> HarnessResult<DataSet<FieldMap>> {
        Ok(DataSet::new()
            .scenario(
                "empty name",
                FieldMap::new().text(NAME, ""),
                Expectation::bad(CANNOT_ADD, ["Incorrect value for field \"name\": cannot be empty."]),
            )
            .scenario(
                "only spaces",
                FieldMap::new().text(NAME, "   "),
                Expectation::bad(CANNOT_ADD, ["Incorrect value for field \"name\": cannot be empty."]),
            )
            .scenario(
                "seeded name",
                FieldMap::new().text(NAME, "Zabbix servers"),
                Expectation::bad(CANNOT_ADD, ["Host group \"Zabbix servers\" already exists."]),
            )
            .scenario(
                "new group",
                FieldMap::new().text(NAME, GROUP_NAME),
                Expectation::good("Host group added"),
            )
            .scenario(
                "utf-8 name",
                FieldMap::new().text(NAME, "Группа узлов ☺"),
                Expectation::good("Host group added"),
            ))
    }

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<FieldMap>) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(NEW_ROUTE).await?;

        let mut form = form();
        form.fill(&mut ctx.session, &scenario.input).await?;
        submit_expecting(ctx, &form, "Add", &scenario.expect, &StateProbe::tables(&["hstgrp"])).await?;

        if scenario.expect.is_good() {
            let name = scenario.input.text_value(NAME).unwrap_or_default();
            assert_row_count(&ctx.db, "hstgrp", "name", name, 1)?;
            let groupid = lookup_id(&ctx.db, "hstgrp", "groupid", "name", name)?;
            assert_field_values(
                &mut ctx.session,
                &edit_route(groupid),
                &form,
                &scenario.input.expected_readback(),
            )
            .await?;
        }
        Ok(())
    }
}

/// Adding a group under a name already taken is refused
pub struct DuplicateHostGroup;

#[async_trait]
impl Case for DuplicateHostGroup {
    fn name(&self) -> &str {
        "duplicate"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.open(NEW_ROUTE).await?;

        let mut form = form();
        form.fill(&mut ctx.session, &FieldMap::new().text(NAME, GROUP_NAME))
            .await?;
        submit_expecting(
            ctx,
            &form,
            "Add",
            &Expectation::bad(CANNOT_ADD, [format!("Host group \"{}\" already exists.", GROUP_NAME)]),
            &StateProbe::tables(&["hstgrp"]),
        )
        .await?;
        assert_row_count(&ctx.db, "hstgrp", "name", GROUP_NAME, 1)
    }
}
