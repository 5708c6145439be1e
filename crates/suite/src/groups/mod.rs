//! Acceptance groups
//!
//! One module per frontend area. Each exposes `group()` plus its case types
//! so integration tests can reuse them.

pub mod authentication;
pub mod host_groups;
pub mod hosts;
pub mod housekeeping;
pub mod media_types;
pub mod proxies;

use serde_json::{json, Value};
use uiprobe_common::{Database, Row};
use uiprobe_harness::{
    assert_db_unchanged, assert_expectation, CaseContext, Expectation, Form, Group, HarnessError,
    HarnessResult, StateProbe,
};

/// Every group, in the order the runner executes them
pub fn all_groups() -> Vec<Group> {
    vec![
        host_groups::group(),
        housekeeping::group(),
        media_types::group(),
        proxies::group(),
        authentication::group(),
        hosts::group(),
    ]
}

/// Submit `form` and check the banner `expect` describes. A rejected
/// submission must leave every probed table as it was.
pub async fn submit_expecting(
    ctx: &mut CaseContext,
    form: &Form,
    button: &str,
    expect: &Expectation,
    probe: &StateProbe,
) -> HarnessResult<()> {
    let before = probe.capture(&ctx.db)?;
    form.submit(&mut ctx.session, button).await?;
    assert_expectation(&mut ctx.session, expect).await?;
    if !expect.is_good() {
        assert_db_unchanged(&before, &probe.capture(&ctx.db)?)?;
    }
    Ok(())
}

/// Id column of the single row of `table` where `column = value`.
pub fn lookup_id(db: &Database, table: &str, id: &str, column: &str, value: &str) -> HarnessResult<i64> {
    let sql = format!("SELECT {} FROM {} WHERE {} = ?1", id, table, column);
    db.query_scalar(&sql, &[json!(value)])?
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HarnessError::assertion(format!("{} row named {:?}", table, value), "one row", "none"))
}

pub(crate) fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_plan() {
        let groups = all_groups();
        let names: Vec<&str> = groups.iter().map(|g| g.name()).collect();
        assert_eq!(
            names,
            ["host groups", "housekeeping", "media types", "proxies", "authentication", "hosts"]
        );
        for group in &groups {
            assert!(group.plan().is_ok(), "{}", group.name());
        }

        let media = &groups[2];
        assert_eq!(media.plan().unwrap(), ["create", "update", "audit"]);
    }

    #[test]
    fn test_lookup_id() {
        let db = Database::open_memory().unwrap();
        db.execute_batch("CREATE TABLE t (tid INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let id = db.insert("t", &row([("name", json!("x"))])).unwrap();

        assert_eq!(lookup_id(&db, "t", "tid", "name", "x").unwrap(), id);
        let err = lookup_id(&db, "t", "tid", "name", "y").unwrap_err();
        assert_eq!(err.kind(), uiprobe_harness::FailureKind::Assertion);
    }
}
