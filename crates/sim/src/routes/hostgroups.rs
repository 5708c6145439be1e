//! Host group list and edit form

use serde_json::json;
use uiprobe_common::Result;

use super::cannot_be_empty;
use crate::app::{action, int, resource, text, AuditEntry, Page, Request, SimApp, User};
use crate::dom::El;
use crate::widgets::{cell, field, hidden_input, label, link, link_button, list_table, submit, text_input};

const LIST_ROUTE: &str = "zabbix.php?action=hostgroup.list";

pub(crate) fn list(app: &SimApp, banner: Option<El>) -> Result<Page> {
    let rows = app.db().query_rows(
        "SELECT g.groupid, g.name, COUNT(hg.hostid) AS hosts FROM hstgrp g \
         LEFT JOIN hosts_groups hg ON hg.groupid = g.groupid \
         GROUP BY g.groupid, g.name ORDER BY g.name",
        &[],
    )?;
    let rows = rows
        .iter()
        .map(|r| {
            vec![
                link(
                    &text(r, "name"),
                    &format!("zabbix.php?action=hostgroup.edit&groupid={}", int(r, "groupid")),
                ),
                cell(text(r, "hosts")),
            ]
        })
        .collect();
    Ok(Page::new("Host groups")
        .banner(banner)
        .content(link_button("Create host group", "zabbix.php?action=hostgroup.edit"))
        .content(list_table("hostgroup-list", &["Name", "Hosts"], rows))
        .at(LIST_ROUTE))
}

pub(crate) fn edit(app: &SimApp, req: &Request<'_>) -> Result<Page> {
    let Some(groupid) = req.id_param("groupid") else {
        return Ok(form(None, ""));
    };
    let name = app
        .db()
        .query_scalar("SELECT name FROM hstgrp WHERE groupid = ?1", &[json!(groupid)])?;
    match name.as_ref().and_then(|v| v.as_str()) {
        Some(name) => Ok(form(Some(groupid), name)),
        None => Ok(Page::new("Host groups").bad::<&str>("No permissions to referred object or it does not exist!", &[])),
    }
}

fn form(groupid: Option<i64>, name: &str) -> Page {
    let (route, button) = match groupid {
        Some(id) => (format!("zabbix.php?action=hostgroup.update&groupid={}", id), "Update"),
        None => ("zabbix.php?action=hostgroup.create".to_string(), "Add"),
    };
    let mut form = El::new("form")
        .id("hostgroup-form")
        .attr("action", route)
        .attr("method", "post")
        .child(El::new("ul").child(field(label("name", "Group name"), text_input("name", "name", name))));
    if let Some(id) = groupid {
        form = form.child(hidden_input("groupid", &id.to_string()));
    }
    Page::new("Host group").content(form.child(submit(button, if groupid.is_some() { "update" } else { "add" })))
}

pub(crate) fn save(app: &SimApp, req: &Request<'_>, user: &User) -> Result<Page> {
    let groupid = req.id_param("groupid");
    let name = req.value("name").unwrap_or_default().trim().to_string();
    let (verb, failure) = match groupid {
        Some(_) => ("updated", "Cannot update host group"),
        None => ("added", "Cannot add host group"),
    };

    if name.is_empty() {
        return Ok(form(groupid, &name).bad(failure, &[cannot_be_empty("name")]));
    }
    let duplicate = app.db().query_scalar(
        "SELECT COUNT(*) FROM hstgrp WHERE name = ?1 AND groupid != ?2",
        &[json!(name), json!(groupid.unwrap_or(0))],
    )?;
    if duplicate.and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
        return Ok(form(groupid, &name).bad(failure, &[format!("Host group \"{}\" already exists.", name)]));
    }

    let (id, audit_action, details) = match groupid {
        Some(id) => {
            let old = app
                .db()
                .query_one("SELECT name FROM hstgrp WHERE groupid = ?1", &[json!(id)])?
                .map(|r| text(&r, "name"))
                .unwrap_or_default();
            app.db().execute(
                "UPDATE hstgrp SET name = ?1 WHERE groupid = ?2",
                &[json!(name), json!(id)],
            )?;
            let details = if old != name {
                vec![format!("hostgroup.name: {} => {}", old, name)]
            } else {
                Vec::new()
            };
            (id, action::UPDATE, details)
        }
        None => {
            let id = app.db().insert("hstgrp", &crate::schema::row([("name", json!(name))]))?;
            (id, action::ADD, vec![format!("hostgroup.name: {}", name)])
        }
    };
    app.audit(AuditEntry {
        userid: user.userid,
        username: &user.username,
        action: audit_action,
        resourcetype: resource::HOST_GROUP,
        resourceid: id,
        resourcename: &name,
        details,
    })?;

    let title = format!("Host group {}", verb);
    list(app, None).map(|page| page.good(&title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FormData;
    use crate::dom::Document;
    use uiprobe_common::{Database, LockoutPolicy};

    fn admin() -> User {
        User {
            userid: 1,
            username: "Admin".into(),
        }
    }

    fn titles(doc: &Document) -> Vec<String> {
        doc.descendants(Document::ROOT)
            .into_iter()
            .filter(|n| doc.node(*n).map(|n| n.has_class("msg-title")).unwrap_or(false))
            .map(|n| doc.text_content(n))
            .collect()
    }

    fn create(app: &SimApp, name: &str) -> Page {
        let form: FormData = vec![("name".into(), name.into())];
        let req = Request {
            path: "zabbix.php",
            params: Default::default(),
            form: &form,
            session: None,
            post: true,
        };
        save(app, &req, &admin()).unwrap()
    }

    #[test]
    fn test_create_and_duplicate() {
        let app = SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap();
        let page = create(&app, "Test Group");
        assert_eq!(page.route.as_deref(), Some(LIST_ROUTE));

        let page = create(&app, "Test Group");
        let doc = Document::from_elements(page.banner.into_iter());
        assert_eq!(titles(&doc), vec!["Cannot add host group"]);
        assert!(doc.text_content(Document::ROOT).contains("Host group \"Test Group\" already exists."));
        assert_eq!(app.db().count_where("hstgrp", "name", &json!("Test Group")).unwrap(), 1);
    }
}
