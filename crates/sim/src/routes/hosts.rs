//! Host list and edit form with tag and macro sub-tables

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use uiprobe_common::Result;

use super::cannot_be_empty;
use crate::app::{action, int, resource, text, AuditEntry, Page, Request, SimApp, User};
use crate::dom::El;
use crate::schema::row;
use crate::widgets::{
    cell, field, hidden_input, label, link, link_button, list_table, select, sub_table, submit,
    text_input, textarea,
};

const LIST_ROUTE: &str = "zabbix.php?action=host.list";
const TAG_COLUMNS: &[&str] = &["tag", "value"];
const MACRO_COLUMNS: &[&str] = &["macro", "value", "description"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Host {
    name: String,
    groups: Vec<i64>,
    description: String,
    tags: Vec<Vec<String>>,
    macros: Vec<Vec<String>>,
}

fn load(app: &SimApp, hostid: i64) -> Result<Option<Host>> {
    let db = app.db();
    let Some(host) = db.query_one(
        "SELECT host, description FROM hosts WHERE hostid = ?1",
        &[json!(hostid)],
    )?
    else {
        return Ok(None);
    };
    let groups = db
        .query_rows(
            "SELECT groupid FROM hosts_groups WHERE hostid = ?1 ORDER BY groupid",
            &[json!(hostid)],
        )?
        .iter()
        .map(|r| int(r, "groupid"))
        .collect();
    let tags = db
        .query_rows(
            "SELECT tag, value FROM host_tag WHERE hostid = ?1 ORDER BY hosttagid",
            &[json!(hostid)],
        )?
        .iter()
        .map(|r| vec![text(r, "tag"), text(r, "value")])
        .collect();
    let macros = db
        .query_rows(
            "SELECT macro, value, description FROM hostmacro WHERE hostid = ?1 ORDER BY hostmacroid",
            &[json!(hostid)],
        )?
        .iter()
        .map(|r| vec![text(r, "macro"), text(r, "value"), text(r, "description")])
        .collect();
    Ok(Some(Host {
        name: text(&host, "host"),
        groups,
        description: text(&host, "description"),
        tags,
        macros,
    }))
}

pub(crate) fn list(app: &SimApp, banner: Option<El>) -> Result<Page> {
    let rows = app.db().query_rows(
        "SELECT h.hostid, h.host, COALESCE(GROUP_CONCAT(g.name, ', '), '') AS groups \
         FROM hosts h \
         LEFT JOIN hosts_groups hg ON hg.hostid = h.hostid \
         LEFT JOIN hstgrp g ON g.groupid = hg.groupid \
         GROUP BY h.hostid, h.host ORDER BY h.host",
        &[],
    )?;
    let rows = rows
        .iter()
        .map(|r| {
            vec![
                link(
                    &text(r, "host"),
                    &format!("zabbix.php?action=host.edit&hostid={}", int(r, "hostid")),
                ),
                cell(text(r, "groups")),
            ]
        })
        .collect();
    Ok(Page::new("Hosts")
        .banner(banner)
        .content(link_button("Create host", "zabbix.php?action=host.edit"))
        .content(list_table("host-list", &["Name", "Groups"], rows))
        .at(LIST_ROUTE))
}

pub(crate) fn edit(app: &SimApp, req: &Request<'_>) -> Result<Page> {
    let Some(hostid) = req.id_param("hostid") else {
        return form(app, None, &Host::default());
    };
    let Some(host) = load(app, hostid)? else {
        return Ok(Page::new("Hosts")
            .bad::<&str>("No permissions to referred object or it does not exist!", &[]));
    };
    if req.param("clone") == Some("1") {
        // A clone is a new host prefilled from the original
        return form(app, None, &host).map(|page| {
            page.at(format!("zabbix.php?action=host.edit&hostid={}&clone=1", hostid))
        });
    }
    form(app, Some(hostid), &host)
}

fn form(app: &SimApp, hostid: Option<i64>, host: &Host) -> Result<Page> {
    let groups: Vec<(String, String)> = app
        .db()
        .query_rows("SELECT groupid, name FROM hstgrp ORDER BY name", &[])?
        .iter()
        .map(|r| (int(r, "groupid").to_string(), text(r, "name")))
        .collect();
    let selected: Vec<String> = host.groups.iter().map(i64::to_string).collect();

    let (route, button, name) = match hostid {
        Some(id) => (
            format!("zabbix.php?action=host.update&hostid={}", id),
            "Update",
            "update",
        ),
        None => ("zabbix.php?action=host.create".to_string(), "Add", "add"),
    };

    let mut form = El::new("form")
        .id("host-form")
        .attr("action", route)
        .attr("method", "post")
        .child(
            El::new("ul")
                .child(field(label("host", "Host name"), text_input("host", "host", &host.name)))
                .child(field(
                    label("groups", "Host groups"),
                    select("groups", "groups[]", &groups, &selected, true),
                ))
                .child(field(
                    label("description", "Description"),
                    textarea("description", "description", &host.description),
                ))
                .child(field(
                    label("tags-table", "Tags"),
                    sub_table("tags-table", "tags", TAG_COLUMNS, &host.tags),
                ))
                .child(field(
                    label("macros-table", "Macros"),
                    sub_table("macros-table", "macros", MACRO_COLUMNS, &host.macros),
                )),
        );
    if let Some(id) = hostid {
        form = form.child(hidden_input("hostid", &id.to_string()));
    }
    form = form.child(submit(button, name));
    if let Some(id) = hostid {
        form = form.child(link_button(
            "Clone",
            &format!("zabbix.php?action=host.edit&hostid={}&clone=1", id),
        ));
    }
    Ok(Page::new("Host").content(form))
}

/// Non-blank rows of a submitted sub-table, columns in `columns` order
fn submitted_rows(req: &Request<'_>, prefix: &str, columns: &[&str]) -> Vec<Vec<String>> {
    req.rows(prefix)
        .into_iter()
        .map(|r: BTreeMap<String, String>| {
            columns
                .iter()
                .map(|c| r.get(*c).map(|v| v.trim().to_string()).unwrap_or_default())
                .collect::<Vec<String>>()
        })
        .filter(|r| r.iter().any(|v| !v.is_empty()))
        .collect()
}

static MACRO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\$[A-Z0-9_.]+(:.*)?\}$").expect("user macro pattern"));

fn macro_syntax_ok(name: &str) -> bool {
    MACRO.is_match(name)
}

fn validate(app: &SimApp, hostid: Option<i64>, host: &Host) -> Result<Vec<String>> {
    let mut errors = Vec::new();
    if host.groups.is_empty() {
        errors.push("Field \"groups\" is mandatory.".to_string());
    }
    if host.name.is_empty() {
        errors.push(cannot_be_empty("host"));
    }
    if !errors.is_empty() {
        return Ok(errors);
    }

    let duplicate = app.db().query_scalar(
        "SELECT COUNT(*) FROM hosts WHERE host = ?1 AND hostid != ?2",
        &[json!(host.name), json!(hostid.unwrap_or(0))],
    )?;
    if duplicate.and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
        errors.push(format!("Host with the same name \"{}\" already exists.", host.name));
        return Ok(errors);
    }

    for (i, tag) in host.tags.iter().enumerate() {
        let n = i + 1;
        if tag[0].is_empty() {
            errors.push(format!("Invalid parameter \"/1/tags/{}/tag\": cannot be empty.", n));
        } else if host.tags[..i].contains(tag) {
            errors.push(format!(
                "Invalid parameter \"/1/tags/{}\": value (tag, value)=({}, {}) already exists.",
                n, tag[0], tag[1]
            ));
        }
    }
    for (i, m) in host.macros.iter().enumerate() {
        let n = i + 1;
        if !macro_syntax_ok(&m[0]) {
            errors.push(format!(
                "Invalid parameter \"/1/macros/{}/macro\": incorrect syntax near \"{}\".",
                n, m[0]
            ));
        } else if host.macros[..i].iter().any(|other| other[0] == m[0]) {
            errors.push(format!(
                "Invalid parameter \"/1/macros/{}\": value (macro)=({}) already exists.",
                n, m[0]
            ));
        }
    }
    Ok(errors)
}

pub(crate) fn save(app: &SimApp, req: &Request<'_>, user: &User) -> Result<Page> {
    let hostid = req.id_param("hostid");
    let host = Host {
        name: req.value("host").unwrap_or_default().trim().to_string(),
        groups: req
            .values("groups[]")
            .iter()
            .filter_map(|g| g.parse().ok())
            .collect(),
        description: req.value("description").unwrap_or_default().to_string(),
        tags: submitted_rows(req, "tags", TAG_COLUMNS),
        macros: submitted_rows(req, "macros", MACRO_COLUMNS),
    };
    let (verb, failure) = match hostid {
        Some(_) => ("updated", "Cannot update host"),
        None => ("added", "Cannot add host"),
    };

    let errors = validate(app, hostid, &host)?;
    if !errors.is_empty() {
        return form(app, hostid, &host).map(|page| page.bad(failure, &errors));
    }

    let db = app.db();
    let (id, audit_action) = match hostid {
        Some(id) => {
            db.execute(
                "UPDATE hosts SET host = ?1, description = ?2 WHERE hostid = ?3",
                &[json!(host.name), json!(host.description), json!(id)],
            )?;
            for table in ["hosts_groups", "host_tag", "hostmacro"] {
                db.execute(&format!("DELETE FROM {} WHERE hostid = ?1", table), &[json!(id)])?;
            }
            (id, action::UPDATE)
        }
        None => {
            let id = db.insert(
                "hosts",
                &row([("host", json!(host.name)), ("description", json!(host.description))]),
            )?;
            (id, action::ADD)
        }
    };
    for groupid in &host.groups {
        db.insert("hosts_groups", &row([("hostid", json!(id)), ("groupid", json!(groupid))]))?;
    }
    for tag in &host.tags {
        db.insert(
            "host_tag",
            &row([("hostid", json!(id)), ("tag", json!(tag[0])), ("value", json!(tag[1]))]),
        )?;
    }
    for m in &host.macros {
        db.insert(
            "hostmacro",
            &row([
                ("hostid", json!(id)),
                ("macro", json!(m[0])),
                ("value", json!(m[1])),
                ("description", json!(m[2])),
            ]),
        )?;
    }
    app.audit(AuditEntry {
        userid: user.userid,
        username: &user.username,
        action: audit_action,
        resourcetype: resource::HOST,
        resourceid: id,
        resourcename: &host.name,
        details: Vec::new(),
    })?;

    let title = format!("Host {}", verb);
    list(app, None).map(|page| page.good(&title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uiprobe_common::{Database, LockoutPolicy};

    fn app() -> SimApp {
        SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap()
    }

    fn host(name: &str) -> Host {
        Host {
            name: name.to_string(),
            groups: vec![2],
            ..Host::default()
        }
    }

    #[test]
    fn test_macro_syntax() {
        assert!(macro_syntax_ok("{$A}"));
        assert!(macro_syntax_ok("{$SNMP_COMMUNITY:\"ctx\"}"));
        assert!(!macro_syntax_ok("{$lower}"));
        assert!(!macro_syntax_ok("A"));
        assert!(MACRO.is_match("{$MACRO.WITH_DOT}"));
    }

    #[test]
    fn test_mandatory_fields() {
        let errors = validate(&app(), None, &Host::default()).unwrap();
        assert_eq!(
            errors,
            vec![
                "Field \"groups\" is mandatory.".to_string(),
                "Incorrect value for field \"host\": cannot be empty.".to_string(),
            ]
        );
    }

    #[test]
    fn test_duplicate_name() {
        let errors = validate(&app(), None, &host("Zabbix server")).unwrap();
        assert_eq!(errors, vec!["Host with the same name \"Zabbix server\" already exists."]);
        // Renaming a host to its own name is fine
        assert!(validate(&app(), Some(10084), &host("Zabbix server")).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_tag_and_macro() {
        let mut h = host("web-01");
        h.tags = vec![vec!["env".into(), "prod".into()], vec!["env".into(), "prod".into()]];
        h.macros = vec![
            vec!["{$A}".into(), "1".into(), String::new()],
            vec!["{$A}".into(), "2".into(), String::new()],
        ];
        let errors = validate(&app(), None, &h).unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("/1/tags/2"));
        assert!(errors[1].contains("/1/macros/2"));
    }
}
