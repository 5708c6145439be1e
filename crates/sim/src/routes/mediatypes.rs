//! Media type list and edit form

use serde_json::json;
use uiprobe_common::Result;

use super::cannot_be_empty;
use crate::app::{action, int, resource, text, AuditEntry, Page, Request, SimApp, User};
use crate::dom::El;
use crate::widgets::{
    cell, checkbox, field, hidden_input, label, link, link_button, list_table, select, submit,
    text_input, textarea,
};

const LIST_ROUTE: &str = "zabbix.php?action=mediatype.list";

const TYPES: &[(i64, &str)] = &[(0, "Email"), (1, "SMS"), (2, "Script"), (4, "Webhook")];

fn type_name(kind: i64) -> &'static str {
    TYPES
        .iter()
        .find(|(id, _)| *id == kind)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MediaType {
    name: String,
    kind: i64,
    description: String,
    enabled: bool,
}

impl MediaType {
    /// Audit lines for the fields that differ from `old`; every field when
    /// there is no previous version.
    fn changes(&self, old: Option<&MediaType>) -> Vec<String> {
        let fields = |m: &MediaType| {
            [
                ("name", m.name.clone()),
                ("type", m.kind.to_string()),
                ("description", m.description.clone()),
                ("status", if m.enabled { "0" } else { "1" }.to_string()),
            ]
        };
        let new = fields(self);
        match old {
            None => new
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| format!("mediatype.{}: {}", k, v))
                .collect(),
            Some(old) => fields(old)
                .iter()
                .zip(&new)
                .filter(|((_, a), (_, b))| a != b)
                .map(|((k, a), (_, b))| format!("mediatype.{}: {} => {}", k, a, b))
                .collect(),
        }
    }
}

fn load(app: &SimApp, id: i64) -> Result<Option<MediaType>> {
    Ok(app
        .db()
        .query_one(
            "SELECT name, type, description, status FROM media_type WHERE mediatypeid = ?1",
            &[json!(id)],
        )?
        .map(|r| MediaType {
            name: text(&r, "name"),
            kind: int(&r, "type"),
            description: text(&r, "description"),
            enabled: int(&r, "status") == 0,
        }))
}

pub(crate) fn list(app: &SimApp, banner: Option<El>) -> Result<Page> {
    let rows = app.db().query_rows(
        "SELECT mediatypeid, name, type, status FROM media_type ORDER BY name",
        &[],
    )?;
    let rows = rows
        .iter()
        .map(|r| {
            vec![
                link(
                    &text(r, "name"),
                    &format!("zabbix.php?action=mediatype.edit&mediatypeid={}", int(r, "mediatypeid")),
                ),
                cell(type_name(int(r, "type"))),
                cell(if int(r, "status") == 0 { "Enabled" } else { "Disabled" }),
            ]
        })
        .collect();
    Ok(Page::new("Media types")
        .banner(banner)
        .content(link_button("Create media type", "zabbix.php?action=mediatype.edit"))
        .content(list_table("mediatype-list", &["Name", "Type", "Status"], rows))
        .at(LIST_ROUTE))
}

pub(crate) fn edit(app: &SimApp, req: &Request<'_>) -> Result<Page> {
    let Some(id) = req.id_param("mediatypeid") else {
        return Ok(form(
            None,
            &MediaType {
                name: String::new(),
                kind: 0,
                description: String::new(),
                enabled: true,
            },
        ));
    };
    match load(app, id)? {
        Some(media) => Ok(form(Some(id), &media)),
        None => Ok(Page::new("Media types")
            .bad::<&str>("No permissions to referred object or it does not exist!", &[])),
    }
}

fn form(id: Option<i64>, media: &MediaType) -> Page {
    let (route, button, name) = match id {
        Some(id) => (
            format!("zabbix.php?action=mediatype.update&mediatypeid={}", id),
            "Update",
            "update",
        ),
        None => ("zabbix.php?action=mediatype.create".to_string(), "Add", "add"),
    };
    let options: Vec<(String, String)> = TYPES
        .iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect();
    let mut form = El::new("form")
        .id("media-type-form")
        .attr("action", route)
        .attr("method", "post")
        .child(
            El::new("ul")
                .child(field(label("name", "Name"), text_input("name", "name", &media.name)))
                .child(field(
                    label("type", "Type"),
                    select("type", "type", &options, &[media.kind.to_string()], false),
                ))
                .child(field(
                    label("description", "Description"),
                    textarea("description", "description", &media.description),
                ))
                .child(field(
                    label("status", "Enabled"),
                    checkbox("status", "status", "0", media.enabled),
                )),
        );
    if let Some(id) = id {
        form = form.child(hidden_input("mediatypeid", &id.to_string()));
    }
    Page::new("Media types").content(form.child(submit(button, name)))
}

pub(crate) fn save(app: &SimApp, req: &Request<'_>, user: &User) -> Result<Page> {
    let id = req.id_param("mediatypeid");
    let submitted = MediaType {
        name: req.value("name").unwrap_or_default().trim().to_string(),
        kind: req.id_param("type").unwrap_or(0),
        description: req.value("description").unwrap_or_default().to_string(),
        enabled: req.value("status").is_some(),
    };
    let (verb, failure) = match id {
        Some(_) => ("updated", "Cannot update media type"),
        None => ("added", "Cannot add media type"),
    };

    if submitted.name.is_empty() {
        return Ok(form(id, &submitted).bad(failure, &[cannot_be_empty("name")]));
    }
    let duplicate = app.db().query_scalar(
        "SELECT COUNT(*) FROM media_type WHERE name = ?1 AND mediatypeid != ?2",
        &[json!(submitted.name), json!(id.unwrap_or(0))],
    )?;
    if duplicate.and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
        return Ok(form(id, &submitted).bad(
            failure,
            &[format!("Media type \"{}\" already exists.", submitted.name)],
        ));
    }

    let status = if submitted.enabled { 0 } else { 1 };
    let (id, audit_action, details) = match id {
        Some(id) => {
            let old = load(app, id)?;
            app.db().execute(
                "UPDATE media_type SET name = ?1, type = ?2, description = ?3, status = ?4 \
                 WHERE mediatypeid = ?5",
                &[
                    json!(submitted.name),
                    json!(submitted.kind),
                    json!(submitted.description),
                    json!(status),
                    json!(id),
                ],
            )?;
            (id, action::UPDATE, submitted.changes(old.as_ref()))
        }
        None => {
            let id = app.db().insert(
                "media_type",
                &crate::schema::row([
                    ("name", json!(submitted.name)),
                    ("type", json!(submitted.kind)),
                    ("description", json!(submitted.description)),
                    ("status", json!(status)),
                ]),
            )?;
            (id, action::ADD, submitted.changes(None))
        }
    };
    app.audit(AuditEntry {
        userid: user.userid,
        username: &user.username,
        action: audit_action,
        resourcetype: resource::MEDIA_TYPE,
        resourceid: id,
        resourcename: &submitted.name,
        details,
    })?;

    let title = format!("Media type {}", verb);
    list(app, None).map(|page| page.good(&title))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(name: &str) -> MediaType {
        MediaType {
            name: name.to_string(),
            kind: 0,
            description: String::new(),
            enabled: true,
        }
    }

    #[test]
    fn test_changes_on_rename() {
        let old = media("AAA");
        let new = media("AAA_update");
        assert_eq!(new.changes(Some(&old)), vec!["mediatype.name: AAA => AAA_update"]);
    }

    #[test]
    fn test_changes_on_add() {
        let lines = media("AAA").changes(None);
        assert_eq!(lines[0], "mediatype.name: AAA");
        assert!(lines.iter().all(|l| !l.starts_with("mediatype.description")));
    }
}
