//! Audit log with resource filter

use serde_json::{json, Value};
use uiprobe_common::Result;

use crate::app::{action, format_clock, int, resource, text, Page, Request, SimApp};
use crate::dom::El;
use crate::widgets::{cell, field, label, list_table, select, submit, text_input};

const HEADERS: &[&str] = &[
    "Time",
    "User",
    "IP",
    "Resource",
    "ID",
    "Action",
    "Recordset ID",
    "Details",
];

pub(crate) fn list(app: &SimApp, req: &Request<'_>) -> Result<Page> {
    let resourcetype = req
        .value("filter_resourcetype")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v >= 0);
    let resourceid = req
        .value("filter_resourceid")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let mut sql = String::from(
        "SELECT clock, username, ip, resourcetype, resourceid, action, recordsetid, details \
         FROM auditlog WHERE 1 = 1",
    );
    let mut params: Vec<Value> = Vec::new();
    if let Some(kind) = resourcetype {
        params.push(json!(kind));
        sql.push_str(&format!(" AND resourcetype = ?{}", params.len()));
    }
    if let Some(id) = &resourceid {
        params.push(json!(id.parse::<i64>().unwrap_or(-1)));
        sql.push_str(&format!(" AND resourceid = ?{}", params.len()));
    }
    sql.push_str(" ORDER BY clock DESC, rowid DESC");

    let rows = app
        .db()
        .query_rows(&sql, &params)?
        .iter()
        .map(|r| {
            let (date, time) = format_clock(int(r, "clock"));
            let details = text(r, "details");
            vec![
                cell(format!("{} {}", date, time)),
                cell(text(r, "username")),
                cell(text(r, "ip")),
                cell(resource::name(int(r, "resourcetype"))),
                cell(text(r, "resourceid")),
                cell(action::name(int(r, "action"))),
                cell(text(r, "recordsetid")),
                El::new("div")
                    .class("audit-details")
                    .children(details.lines().map(|line| El::new("div").text(line))),
            ]
        })
        .collect();

    let mut options = vec![("-1".to_string(), "All".to_string())];
    options.extend(
        resource::ALL
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string())),
    );
    let selected = [resourcetype.unwrap_or(-1).to_string()];
    let filter = El::new("form")
        .id("filter-form")
        .attr("action", "zabbix.php?action=auditlog.list")
        .attr("method", "get")
        .child(
            El::new("ul")
                .child(field(
                    label("filter_resourcetype", "Resource"),
                    select("filter_resourcetype", "filter_resourcetype", &options, &selected, false),
                ))
                .child(field(
                    label("filter_resourceid", "Resource ID"),
                    text_input(
                        "filter_resourceid",
                        "filter_resourceid",
                        resourceid.as_deref().unwrap_or(""),
                    ),
                )),
        )
        .child(submit("Apply", "filter_set"));

    let mut route = String::from("zabbix.php?action=auditlog.list");
    if let Some(kind) = resourcetype {
        route.push_str(&format!("&filter_resourcetype={}", kind));
    }
    if let Some(id) = &resourceid {
        route.push_str(&format!("&filter_resourceid={}", id));
    }

    Ok(Page::new("Audit log")
        .content(filter)
        .content(list_table("auditlog-list", HEADERS, rows))
        .at(route))
}
