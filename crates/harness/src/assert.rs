//! Outcome assertions
//!
//! Message banners, datastore content digests and form read-back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use uiprobe_common::{ContentHash, Database, Row};

use crate::dataset::Expectation;
use crate::error::{HarnessError, HarnessResult};
use crate::form::{FieldMap, Form};
use crate::selector::{Locator, Selector};
use crate::session::Session;
use crate::wait::Deadline;

const MESSAGE_TITLE: &str = ".msg-title";
const MESSAGE_DETAILS: &str = ".msg-details li";

/// Which message banner a submission should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Good,
    Bad,
}

impl Outcome {
    fn banner(&self) -> Locator {
        match self {
            Outcome::Good => Locator::css(".msg-good"),
            Outcome::Bad => Locator::css(".msg-bad"),
        }
    }

    fn opposite(&self) -> Outcome {
        match self {
            Outcome::Good => Outcome::Bad,
            Outcome::Bad => Outcome::Good,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Good => f.write_str("GOOD"),
            Outcome::Bad => f.write_str("BAD"),
        }
    }
}

/// Wait for a visible banner of the given kind and check it.
///
/// Banners left hidden in the page do not count. The title must match exactly. Each expected detail must be a substring
/// of some detail line. Seeing the opposite banner fails at once.
pub async fn assert_message<S: AsRef<str>>(
    session: &mut Session,
    outcome: Outcome,
    title: &str,
    details: &[S],
) -> HarnessResult<()> {
    let banner = outcome.banner();
    let deadline = Deadline::new(session.wait_config());
    loop {
        if session.visible(&banner).await?.is_some() {
            break;
        }
        let other = outcome.opposite().banner();
        if session.visible(&other).await?.is_some() {
            let shown = session
                .text(&other.within(Selector::css(MESSAGE_TITLE)))
                .await
                .unwrap_or_default();
            return Err(HarnessError::assertion(
                "message type",
                format!("{} {:?}", outcome, title),
                format!("{} {:?}", outcome.opposite(), shown),
            ));
        }
        if deadline.expired() {
            return Err(HarnessError::assertion(
                "message banner",
                format!("{} {:?}", outcome, title),
                "no message shown",
            ));
        }
        deadline.tick(|| format!("{} message", outcome)).await?;
    }

    let shown = session
        .text(&banner.clone().within(Selector::css(MESSAGE_TITLE)))
        .await?;
    if shown != title {
        return Err(HarnessError::assertion("message title", title, shown));
    }

    if details.is_empty() {
        return Ok(());
    }
    let lines = message_details(session, &banner).await?;
    for detail in details {
        let detail = detail.as_ref();
        if !lines.iter().any(|line| line.contains(detail)) {
            return Err(HarnessError::assertion(
                "message details",
                detail,
                lines.join(" | "),
            ));
        }
    }
    debug!("{} message {:?} confirmed", outcome, title);
    Ok(())
}

async fn message_details(session: &mut Session, banner: &Locator) -> HarnessResult<Vec<String>> {
    let items = session
        .find_all(&banner.clone().within(Selector::css(MESSAGE_DETAILS)))
        .await?;
    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        lines.push(session.browser().text(item).await?.trim().to_string());
    }
    Ok(lines)
}

/// Check the banner an [`Expectation`] describes.
pub async fn assert_expectation(session: &mut Session, expect: &Expectation) -> HarnessResult<()> {
    assert_message(session, expect.outcome(), expect.title(), expect.details()).await
}

/// Set of tables and queries whose content is digested before and after a
/// submission.
#[derive(Debug, Clone, Default)]
pub struct StateProbe {
    probes: Vec<(String, Probe)>,
}

#[derive(Debug, Clone)]
enum Probe {
    Table(String),
    Query(String),
}

impl StateProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables<S: AsRef<str>>(tables: &[S]) -> Self {
        tables
            .iter()
            .fold(Self::new(), |probe, t| probe.table(t.as_ref()))
    }

    pub fn table(mut self, table: &str) -> Self {
        self.probes
            .push((table.to_string(), Probe::Table(table.to_string())));
        self
    }

    /// Digest the result of an ordered query under `label`.
    pub fn query(mut self, label: &str, sql: &str) -> Self {
        self.probes
            .push((label.to_string(), Probe::Query(sql.to_string())));
        self
    }

    pub fn capture(&self, db: &Database) -> HarnessResult<DbState> {
        let mut digests = BTreeMap::new();
        for (label, probe) in &self.probes {
            let digest = match probe {
                Probe::Table(table) => db.digest_table(table)?,
                Probe::Query(sql) => db.digest_query(sql, &[])?,
            };
            digests.insert(label.clone(), digest);
        }
        Ok(DbState { digests })
    }
}

/// Digests captured by a [`StateProbe`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbState {
    digests: BTreeMap<String, ContentHash>,
}

impl DbState {
    pub fn get(&self, label: &str) -> Option<&ContentHash> {
        self.digests.get(label)
    }
}

/// Every probed table or query hashes the same as before.
pub fn assert_db_unchanged(before: &DbState, after: &DbState) -> HarnessResult<()> {
    let changed: Vec<&str> = before
        .digests
        .iter()
        .filter(|(label, digest)| after.digests.get(*label) != Some(digest))
        .map(|(label, _)| label.as_str())
        .collect();
    if changed.is_empty() {
        return Ok(());
    }
    Err(HarnessError::assertion(
        "datastore unchanged",
        "identical content hashes",
        format!("changed: {}", changed.join(", ")),
    ))
}

/// Exactly `expected` rows of `table` have `column = value`.
pub fn assert_row_count(
    db: &Database,
    table: &str,
    column: &str,
    value: impl Into<Value>,
    expected: i64,
) -> HarnessResult<()> {
    let value = value.into();
    let count = db.count_where(table, column, &value)?;
    if count != expected {
        return Err(HarnessError::assertion(
            format!("rows in {} where {} = {}", table, column, value),
            expected,
            count,
        ));
    }
    Ok(())
}

/// The single row returned by `sql` carries every column of `expected`
/// with the given value.
pub fn assert_db_row(db: &Database, sql: &str, params: &[Value], expected: &Row) -> HarnessResult<()> {
    let row = db
        .query_one(sql, params)?
        .ok_or_else(|| HarnessError::assertion(sql, "one row", "no rows"))?;
    for (column, value) in expected {
        let found = row.get(column).unwrap_or(&Value::Null);
        if !same_value(value, found) {
            return Err(HarnessError::assertion(
                format!("column {}", column),
                value,
                found,
            ));
        }
    }
    Ok(())
}

/// Numbers stored as text compare equal to their JSON number.
fn same_value(expected: &Value, found: &Value) -> bool {
    match (expected, found) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => expected == found,
    }
}

/// Re-open an entity's edit view and compare its fields to `expected`.
pub async fn assert_field_values(
    session: &mut Session,
    route: &str,
    form: &Form,
    expected: &FieldMap,
) -> HarnessResult<()> {
    session.open(route).await?;
    let actual = form.read(session, expected).await?;
    let diffs = expected.diff(&actual);
    if diffs.is_empty() {
        return Ok(());
    }
    Err(HarnessError::assertion(
        format!("field values on {}", route),
        "read-back equal to input",
        diffs.join("; "),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db() -> Database {
        let db = Database::open_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE hstgrp (groupid INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO hstgrp VALUES (1, 'Linux servers'), (2, 'Test Group');",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_unchanged_detects_change() {
        let db = db();
        let probe = StateProbe::tables(&["hstgrp"]).query("names", "SELECT name FROM hstgrp ORDER BY name");
        let before = probe.capture(&db).unwrap();
        assert!(assert_db_unchanged(&before, &probe.capture(&db).unwrap()).is_ok());

        db.execute("UPDATE hstgrp SET name = ? WHERE groupid = 2", &[json!("Renamed")])
            .unwrap();
        let err = assert_db_unchanged(&before, &probe.capture(&db).unwrap()).unwrap_err();
        assert!(err.to_string().contains("hstgrp, names"));
    }

    #[test]
    fn test_row_count() {
        let db = db();
        assert!(assert_row_count(&db, "hstgrp", "name", "Test Group", 1).is_ok());
        assert!(assert_row_count(&db, "hstgrp", "name", "Nope", 1).is_err());
    }

    #[test]
    fn test_db_row_subset() {
        let db = db();
        let expected: Row = [("name".to_string(), json!("Test Group"))].into_iter().collect();
        assert!(assert_db_row(&db, "SELECT * FROM hstgrp WHERE groupid = ?", &[json!(2)], &expected).is_ok());

        let wrong: Row = [("groupid".to_string(), json!("3"))].into_iter().collect();
        assert!(assert_db_row(&db, "SELECT * FROM hstgrp WHERE groupid = ?", &[json!(2)], &wrong).is_err());
    }

    #[test]
    fn test_outcome_serde() {
        assert_eq!(serde_json::to_string(&Outcome::Bad).unwrap(), "\"BAD\"");
        assert_eq!(Outcome::Good.opposite(), Outcome::Bad);
    }
}
