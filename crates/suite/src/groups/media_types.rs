//! Media types and their audit trail

use async_trait::async_trait;
use uiprobe_harness::{
    assert_expectation, assert_field_values, assert_row_count, read_table, Case, CaseContext,
    DataSet, Expectation, FieldMap, Form, Group, HarnessError, HarnessResult, Locator, Scenario,
    ScenarioCase, StateProbe,
};

use super::{lookup_id, submit_expecting};

pub const NEW_ROUTE: &str = "zabbix.php?action=mediatype.edit";
pub const AUDIT_ROUTE: &str = "zabbix.php?action=auditlog.list";

pub const CREATED: &str = "AAA";
pub const RENAMED: &str = "AAA_update";

const CANNOT_ADD: &str = "Cannot add media type";

pub fn edit_route(mediatypeid: i64) -> String {
    format!("zabbix.php?action=mediatype.edit&mediatypeid={}", mediatypeid)
}

pub fn form() -> Form {
    Form::new(Locator::id("media-type-form")).require(["Name"])
}

pub fn group() -> Group {
    Group::new("media types")
        .backup(&["media_type", "auditlog"])
        .scenarios(CreateMediaType)
        .case(UpdateMediaType)
        .case(MediaTypeAudit)
        .depends("update", "create")
        .depends("audit", "update")
}

pub struct CreateMediaType;

#[async_trait]
impl ScenarioCase for CreateMediaType {
    type Input = FieldMap;

    fn name(&self) -> &str {
        "create"
    }

    fn data(&self) -> HarnessResult<DataSet<FieldMap>> {
        Ok(DataSet::new()
            .scenario(
                "empty name",
                FieldMap::new().text("Name", "").select("Type", "SMS"),
                Expectation::bad(CANNOT_ADD, ["Incorrect value for field \"name\": cannot be empty."]),
            )
            .scenario(
                "seeded name",
                FieldMap::new().text("Name", "Email"),
                Expectation::bad(CANNOT_ADD, ["Media type \"Email\" already exists."]),
            )
            .scenario(
                "email",
                FieldMap::new()
                    .text("Name", CREATED)
                    .select("Type", "Email")
                    .text("Description", "Created through the form")
                    .checkbox("Enabled", true),
                Expectation::good("Media type added"),
            )
            .scenario(
                "disabled webhook",
                FieldMap::new()
                    .text("Name", "Webhook for tests")
                    .select("Type", "Webhook")
                    .checkbox("Enabled", false),
                Expectation::good("Media type added"),
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
            &StateProbe::tables(&["media_type", "auditlog"]),
        )
        .await?;

        if scenario.expect.is_good() {
            let name = scenario.input.text_value("Name").unwrap_or_default();
            let id = lookup_id(&ctx.db, "media_type", "mediatypeid", "name", name)?;
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

/// Rename the media type the create case added
pub struct UpdateMediaType;

#[async_trait]
impl Case for UpdateMediaType {
    fn name(&self) -> &str {
        "update"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        let id = lookup_id(&ctx.db, "media_type", "mediatypeid", "name", CREATED)?;
        ctx.session.open(&edit_route(id)).await?;

        let mut form = form();
        form.fill(&mut ctx.session, &FieldMap::new().text("Name", RENAMED))
            .await?;
        form.submit(&mut ctx.session, "Update").await?;
        assert_expectation(&mut ctx.session, &Expectation::good("Media type updated")).await?;

        assert_row_count(&ctx.db, "media_type", "name", CREATED, 0)?;
        assert_row_count(&ctx.db, "media_type", "name", RENAMED, 1)
    }
}

/// The rename shows up in the audit log filtered to that media type
pub struct MediaTypeAudit;

#[async_trait]
impl Case for MediaTypeAudit {
    fn name(&self) -> &str {
        "audit"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        let id = lookup_id(&ctx.db, "media_type", "mediatypeid", "name", RENAMED)?;
        ctx.session.open(AUDIT_ROUTE).await?;

        let mut filter = Form::new(Locator::id("filter-form"));
        filter
            .fill(
                &mut ctx.session,
                &FieldMap::new()
                    .select("Resource", "Media type")
                    .text("Resource ID", id.to_string()),
            )
            .await?;
        filter.submit(&mut ctx.session, "Apply").await?;

        let rows = read_table(&mut ctx.session, &Locator::id("auditlog-list")).await?;
        if let Some(other) = rows
            .iter()
            .find(|r| r.get("Resource").map(String::as_str) != Some("Media type"))
        {
            return Err(HarnessError::assertion("audit filter", "only Media type rows", format!("{:?}", other)));
        }

        let expected = format!("mediatype.name: {} => {}", CREATED, RENAMED);
        let update = rows
            .iter()
            .find(|r| r.get("Action").map(String::as_str) == Some("Update"))
            .ok_or_else(|| {
                HarnessError::assertion(
                    format!("audit entries for media type {}", id),
                    "an Update entry",
                    format!("{} entries", rows.len()),
                )
            })?;
        if update.get("ID").map(String::as_str) != Some(id.to_string().as_str()) {
            return Err(HarnessError::assertion("audit resource id", id, format!("{:?}", update.get("ID"))));
        }
        let details = update.get("Details").cloned().unwrap_or_default();
        if !details.lines().any(|line| line.trim() == expected) {
            return Err(HarnessError::assertion("audit details", expected, details));
        }
        Ok(())
    }
}
