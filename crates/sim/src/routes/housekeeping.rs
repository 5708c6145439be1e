//! Housekeeping settings form

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use uiprobe_common::Result;

use crate::app::{Page, Request, SimApp, User};
use crate::dom::El;
use crate::schema::{HousekeepingField, HOUSEKEEPING};
use crate::widgets::{checkbox, field, label, submit, text_input};

const EDIT_ROUTE: &str = "zabbix.php?action=housekeeping.edit";
const MIN_PERIOD: u64 = 86_400;
const MAX_PERIOD: u64 = 788_400_000;

static TIME_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([smhdw]?)$").expect("time unit pattern"));

/// Seconds in a period like `400d`, or the reason it is rejected
pub fn parse_period(value: &str) -> std::result::Result<u64, &'static str> {
    let caps = TIME_UNIT
        .captures(value.trim())
        .ok_or("a time unit is expected")?;
    let amount: u64 = caps[1].parse().map_err(|_| "a number is too large")?;
    let unit = match &caps[2] {
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => 1,
    };
    let seconds = amount.checked_mul(unit).ok_or("a number is too large")?;
    if !(MIN_PERIOD..=MAX_PERIOD).contains(&seconds) {
        return Err("value must be one of 86400-788400000");
    }
    Ok(seconds)
}

struct Setting {
    field: &'static HousekeepingField,
    enabled: bool,
    period: String,
}

fn load(app: &SimApp) -> Result<Vec<Setting>> {
    let row = app
        .db()
        .query_one("SELECT * FROM config WHERE configid = 1", &[])?
        .unwrap_or_default();
    Ok(HOUSEKEEPING
        .iter()
        .map(|field| Setting {
            field,
            enabled: row.get(field.mode).and_then(Value::as_i64).unwrap_or(1) == 1,
            period: row
                .get(field.period)
                .and_then(Value::as_str)
                .unwrap_or(field.default_period)
                .to_string(),
        })
        .collect())
}

fn form(settings: &[Setting]) -> Page {
    let mut list = El::new("ul");
    for setting in settings {
        list = list
            .child(field(
                label(setting.field.mode, setting.field.mode_label),
                checkbox(setting.field.mode, setting.field.mode, "1", setting.enabled),
            ))
            .child(field(
                label(setting.field.period, setting.field.period_label),
                text_input(setting.field.period, setting.field.period, &setting.period),
            ));
    }
    let form = El::new("form")
        .id("housekeeping-form")
        .attr("action", "zabbix.php?action=housekeeping.update")
        .attr("method", "post")
        .child(list)
        .child(submit("Update", "update"))
        .child(submit("Reset defaults", "reset"));
    Page::new("Housekeeping").content(form).at(EDIT_ROUTE)
}

pub(crate) fn edit(app: &SimApp) -> Result<Page> {
    Ok(form(&load(app)?))
}

pub(crate) fn update(app: &SimApp, req: &Request<'_>, user: &User) -> Result<Page> {
    if req.value("reset").is_some() {
        for field in HOUSEKEEPING {
            store(app, field, true, field.default_period)?;
        }
        tracing::debug!("{} reset housekeeping defaults", user.username);
        return Ok(form(&load(app)?).good("Configuration updated"));
    }

    let stored = load(app)?;
    let mut submitted = Vec::with_capacity(stored.len());
    let mut errors = Vec::new();
    for current in &stored {
        let enabled = req.value(current.field.mode).is_some();
        // A disabled period keeps its stored value
        let period = if enabled {
            req.value(current.field.period).unwrap_or_default().trim().to_string()
        } else {
            current.period.clone()
        };
        if enabled {
            if let Err(reason) = parse_period(&period) {
                errors.push(format!(
                    "Incorrect value for field \"{}\": {}.",
                    current.field.period, reason
                ));
            }
        }
        submitted.push(Setting {
            field: current.field,
            enabled,
            period,
        });
    }

    if !errors.is_empty() {
        return Ok(form(&submitted).bad("Cannot update configuration", &errors));
    }
    for setting in &submitted {
        store(app, setting.field, setting.enabled, &setting.period)?;
    }
    tracing::debug!("{} updated housekeeping", user.username);
    Ok(form(&load(app)?).good("Configuration updated"))
}

fn store(app: &SimApp, field: &HousekeepingField, enabled: bool, period: &str) -> Result<()> {
    // Column names come from the static field table
    let sql = format!(
        "UPDATE config SET {} = ?1, {} = ?2 WHERE configid = 1",
        field.mode, field.period
    );
    app.db()
        .execute(&sql, &[json!(i64::from(enabled)), json!(period)])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1d", Ok(86_400) ; "one day")]
    #[test_case("86400", Ok(86_400) ; "plain seconds")]
    #[test_case("400d", Ok(34_560_000) ; "days")]
    #[test_case("2w", Ok(1_209_600) ; "weeks")]
    #[test_case(" 1440m ", Ok(86_400) ; "minutes with padding")]
    #[test_case("99999999999999999999", Err("a number is too large") ; "overflowing amount")]
    #[test_case("", Err("a time unit is expected") ; "empty")]
    #[test_case("1y", Err("a time unit is expected") ; "unknown unit")]
    #[test_case("23h", Err("value must be one of 86400-788400000") ; "below range")]
    #[test_case("9126d", Err("value must be one of 86400-788400000") ; "above range")]
    fn test_parse_period(input: &str, expected: std::result::Result<u64, &'static str>) {
        assert_eq!(parse_period(input), expected);
    }

    #[test]
    fn test_time_unit_pattern_compiles() {
        assert!(TIME_UNIT.is_match("365d"));
        assert!(!TIME_UNIT.is_match("d365"));
    }
}
