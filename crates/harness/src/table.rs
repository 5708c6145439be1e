//! Reading list tables

use std::collections::BTreeMap;

use crate::error::HarnessResult;
use crate::selector::{Locator, Selector};
use crate::session::Session;

/// Rows of a list table keyed by header text.
///
/// Placeholder rows (`tr.nothing-to-show`) are skipped.
pub async fn read_table(
    session: &mut Session,
    table: &Locator,
) -> HarnessResult<Vec<BTreeMap<String, String>>> {
    let element = session.find(table).await?;
    let browser = session.browser();

    let mut headers = Vec::new();
    for th in browser
        .find_within(&element, &Selector::css("thead th"))
        .await?
    {
        headers.push(browser.text(&th).await?.trim().to_string());
    }

    let mut rows = Vec::new();
    for tr in browser
        .find_within(&element, &Selector::css("tbody tr"))
        .await?
    {
        let class = browser.attribute(&tr, "class").await?.unwrap_or_default();
        if class.split_whitespace().any(|c| c == "nothing-to-show") {
            continue;
        }
        let mut row = BTreeMap::new();
        let cells = browser.find_within(&tr, &Selector::css("td")).await?;
        for (header, td) in headers.iter().zip(&cells) {
            row.insert(header.clone(), browser.text(td).await?.trim().to_string());
        }
        rows.push(row);
    }
    Ok(rows)
}
