//! Proxy list and edit form

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use uiprobe_common::Result;

use super::cannot_be_empty;
use crate::app::{action, int, resource, text, AuditEntry, Page, Request, SimApp, User};
use crate::dom::El;
use crate::schema::row;
use crate::widgets::{
    cell, field, hidden_input, label, link, link_button, list_table, select, submit, text_input,
    textarea,
};

const LIST_ROUTE: &str = "zabbix.php?action=proxy.list";

const ACTIVE: i64 = 0;
const PASSIVE: i64 = 1;
const MODES: &[(i64, &str)] = &[(ACTIVE, "Active"), (PASSIVE, "Passive")];

static HOST_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Za-z_. \-]+$").expect("host name pattern"));
static IP_OR_DNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Za-z][0-9A-Za-z.\-:]*$").expect("address pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
struct Proxy {
    name: String,
    mode: i64,
    address: String,
    port: String,
    description: String,
}

impl Default for Proxy {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: ACTIVE,
            address: "127.0.0.1".to_string(),
            port: "10051".to_string(),
            description: String::new(),
        }
    }
}

impl Proxy {
    /// Message for the first rule the proxy breaks
    fn validate(&self) -> Option<String> {
        if self.name.is_empty() {
            return Some(cannot_be_empty("name"));
        }
        if !HOST_NAME.is_match(&self.name) {
            return Some("Invalid parameter \"/1/name\": invalid host name.".to_string());
        }
        if self.mode != PASSIVE {
            return None;
        }
        if self.address.is_empty() {
            return Some(cannot_be_empty("Interface: Address"));
        }
        if self.port.is_empty() {
            return Some(cannot_be_empty("Interface: Port"));
        }
        if !IP_OR_DNS.is_match(&self.address) {
            return Some("Invalid parameter \"/1/address\": an IP or DNS is expected.".to_string());
        }
        match self.port.parse::<u64>() {
            Err(_) => Some("Invalid parameter \"/1/port\": an integer is expected.".to_string()),
            Ok(port) if port > 65_535 => {
                Some("Invalid parameter \"/1/port\": value must be one of 0-65535.".to_string())
            }
            Ok(_) => None,
        }
    }
}

fn load(app: &SimApp, id: i64) -> Result<Option<Proxy>> {
    Ok(app
        .db()
        .query_one(
            "SELECT name, operating_mode, address, port, description FROM proxy WHERE proxyid = ?1",
            &[json!(id)],
        )?
        .map(|r| Proxy {
            name: text(&r, "name"),
            mode: int(&r, "operating_mode"),
            address: text(&r, "address"),
            port: text(&r, "port"),
            description: text(&r, "description"),
        }))
}

pub(crate) fn list(app: &SimApp, banner: Option<El>) -> Result<Page> {
    let rows = app.db().query_rows(
        "SELECT proxyid, name, operating_mode, address, port FROM proxy ORDER BY name",
        &[],
    )?;
    let rows = rows
        .iter()
        .map(|r| {
            let passive = int(r, "operating_mode") == PASSIVE;
            vec![
                link(
                    &text(r, "name"),
                    &format!("zabbix.php?action=proxy.edit&proxyid={}", int(r, "proxyid")),
                ),
                cell(if passive { "Passive" } else { "Active" }),
                cell(if passive {
                    format!("{}:{}", text(r, "address"), text(r, "port"))
                } else {
                    String::new()
                }),
            ]
        })
        .collect();
    Ok(Page::new("Proxies")
        .banner(banner)
        .content(link_button("Create proxy", "zabbix.php?action=proxy.edit"))
        .content(list_table("proxy-list", &["Name", "Mode", "Address"], rows))
        .at(LIST_ROUTE))
}

pub(crate) fn edit(app: &SimApp, req: &Request<'_>) -> Result<Page> {
    let Some(id) = req.id_param("proxyid") else {
        return Ok(form(None, &Proxy::default()));
    };
    match load(app, id)? {
        Some(proxy) => Ok(form(Some(id), &proxy)),
        None => Ok(Page::new("Proxies")
            .bad::<&str>("No permissions to referred object or it does not exist!", &[])),
    }
}

fn form(id: Option<i64>, proxy: &Proxy) -> Page {
    let (route, button, name) = match id {
        Some(id) => (
            format!("zabbix.php?action=proxy.update&proxyid={}", id),
            "Update",
            "update",
        ),
        None => ("zabbix.php?action=proxy.create".to_string(), "Add", "add"),
    };
    let modes: Vec<(String, String)> = MODES
        .iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect();
    let mut form = El::new("form")
        .id("proxy-form")
        .attr("action", route)
        .attr("method", "post")
        .child(
            El::new("ul")
                .child(field(label("name", "Proxy name"), text_input("name", "name", &proxy.name)))
                .child(field(
                    label("operating_mode", "Proxy mode"),
                    select("operating_mode", "operating_mode", &modes, &[proxy.mode.to_string()], false),
                ))
                .child(field(label("address", "Address"), text_input("address", "address", &proxy.address)))
                .child(field(label("port", "Port"), text_input("port", "port", &proxy.port)))
                .child(field(
                    label("description", "Description"),
                    textarea("description", "description", &proxy.description),
                )),
        );
    if let Some(id) = id {
        form = form.child(hidden_input("proxyid", &id.to_string()));
    }
    form = form.child(submit(button, name));
    if let Some(id) = id {
        form = form.child(link_button(
            "Delete",
            &format!("zabbix.php?action=proxy.delete&proxyid={}", id),
        ));
    }
    Page::new("Proxies").content(form)
}

pub(crate) fn save(app: &SimApp, req: &Request<'_>, user: &User) -> Result<Page> {
    let id = req.id_param("proxyid");
    let submitted = Proxy {
        name: req.value("name").unwrap_or_default().trim().to_string(),
        mode: req.id_param("operating_mode").unwrap_or(ACTIVE),
        address: req.value("address").unwrap_or_default().trim().to_string(),
        port: req.value("port").unwrap_or_default().trim().to_string(),
        description: req.value("description").unwrap_or_default().to_string(),
    };
    let (verb, failure) = match id {
        Some(_) => ("updated", "Cannot update proxy"),
        None => ("added", "Cannot add proxy"),
    };

    if let Some(error) = submitted.validate() {
        return Ok(form(id, &submitted).bad(failure, &[error]));
    }
    let duplicate = app.db().query_scalar(
        "SELECT COUNT(*) FROM proxy WHERE name = ?1 AND proxyid != ?2",
        &[json!(submitted.name), json!(id.unwrap_or(0))],
    )?;
    if duplicate.and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
        return Ok(form(id, &submitted).bad(
            failure,
            &[format!("Proxy \"{}\" already exists.", submitted.name)],
        ));
    }

    let values = row([
        ("name", json!(submitted.name)),
        ("operating_mode", json!(submitted.mode)),
        ("address", json!(submitted.address)),
        ("port", json!(submitted.port)),
        ("description", json!(submitted.description)),
    ]);
    let (id, audit_action) = match id {
        Some(id) => {
            app.db().execute(
                "UPDATE proxy SET name = ?1, operating_mode = ?2, address = ?3, port = ?4, \
                 description = ?5 WHERE proxyid = ?6",
                &[
                    json!(submitted.name),
                    json!(submitted.mode),
                    json!(submitted.address),
                    json!(submitted.port),
                    json!(submitted.description),
                    json!(id),
                ],
            )?;
            (id, action::UPDATE)
        }
        None => (app.db().insert("proxy", &values)?, action::ADD),
    };
    app.audit(AuditEntry {
        userid: user.userid,
        username: &user.username,
        action: audit_action,
        resourcetype: resource::PROXY,
        resourceid: id,
        resourcename: &submitted.name,
        details: Vec::new(),
    })?;

    list(app, None).map(|page| page.good(&format!("Proxy {}", verb)))
}

pub(crate) fn delete(app: &SimApp, req: &Request<'_>, user: &User) -> Result<Page> {
    let Some(id) = req.id_param("proxyid") else {
        return list(app, None);
    };
    let Some(proxy) = load(app, id)? else {
        return list(app, None).map(|page| {
            page.bad(
                "Cannot delete proxy",
                &["No permissions to referred object or it does not exist!"],
            )
        });
    };
    app.db()
        .execute("DELETE FROM proxy WHERE proxyid = ?1", &[json!(id)])?;
    app.audit(AuditEntry {
        userid: user.userid,
        username: &user.username,
        action: action::DELETE,
        resourcetype: resource::PROXY,
        resourceid: id,
        resourcename: &proxy.name,
        details: Vec::new(),
    })?;
    list(app, None).map(|page| page.good("Proxy deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FormData;
    use test_case::test_case;
    use uiprobe_common::{Database, LockoutPolicy};

    fn admin() -> User {
        User {
            userid: 1,
            username: "Admin".into(),
        }
    }

    type Handler = fn(&SimApp, &Request<'_>, &User) -> Result<Page>;

    fn post(app: &SimApp, form: FormData, handler: Handler) -> Page {
        let req = Request {
            path: "zabbix.php",
            params: Default::default(),
            form: &form,
            session: None,
            post: true,
        };
        handler(app, &req, &admin()).unwrap()
    }

    fn passive(address: &str, port: &str) -> Proxy {
        Proxy {
            name: "Passive proxy".to_string(),
            mode: PASSIVE,
            address: address.to_string(),
            port: port.to_string(),
            ..Proxy::default()
        }
    }

    #[test_case("", "Incorrect value for field \"name\": cannot be empty." ; "empty name")]
    #[test_case("@#$%^&*()_+", "Invalid parameter \"/1/name\": invalid host name." ; "symbols")]
    #[test_case("{$USERMACRO}", "Invalid parameter \"/1/name\": invalid host name." ; "user macro")]
    fn test_invalid_name(name: &str, message: &str) {
        let proxy = Proxy {
            name: name.to_string(),
            ..Proxy::default()
        };
        assert_eq!(proxy.validate().as_deref(), Some(message));
    }

    #[test]
    fn test_active_proxy_ignores_interface() {
        let proxy = Proxy {
            name: "Active proxy".to_string(),
            address: String::new(),
            port: "not a port".to_string(),
            ..Proxy::default()
        };
        assert_eq!(proxy.validate(), None);
    }

    #[test_case("", "10051", "Incorrect value for field \"Interface: Address\": cannot be empty." ; "empty address")]
    #[test_case("127.0.0.1", "", "Incorrect value for field \"Interface: Port\": cannot be empty." ; "empty port")]
    #[test_case("a b", "10051", "Invalid parameter \"/1/address\": an IP or DNS is expected." ; "space in address")]
    #[test_case("127.0.0.1", "65536", "Invalid parameter \"/1/port\": value must be one of 0-65535." ; "port too high")]
    #[test_case("127.0.0.1", "-1", "Invalid parameter \"/1/port\": an integer is expected." ; "negative port")]
    fn test_invalid_interface(address: &str, port: &str, message: &str) {
        assert_eq!(passive(address, port).validate().as_deref(), Some(message));
    }

    #[test]
    fn test_valid_passive_proxy() {
        assert_eq!(passive("proxy.example.com", "10051").validate(), None);
    }

    #[test]
    fn test_save_and_delete_are_audited() {
        let app = SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap();
        let page = post(
            &app,
            vec![
                ("name".into(), "Passive proxy".into()),
                ("operating_mode".into(), "1".into()),
                ("address".into(), "10.0.0.1".into()),
                ("port".into(), "10051".into()),
            ],
            save,
        );
        assert_eq!(page.route.as_deref(), Some(LIST_ROUTE));
        let id = app
            .db()
            .query_scalar("SELECT proxyid FROM proxy WHERE name = ?1", &[json!("Passive proxy")])
            .unwrap()
            .and_then(|v| v.as_i64())
            .unwrap();

        let page = post(&app, vec![("name".into(), "Passive proxy".into())], save);
        assert_ne!(page.route.as_deref(), Some(LIST_ROUTE));

        post(&app, vec![("proxyid".into(), id.to_string())], delete);
        assert_eq!(app.db().count_where("proxy", "name", &json!("Passive proxy")).unwrap(), 0);
        let actions: Vec<i64> = app
            .db()
            .query_rows(
                "SELECT action FROM auditlog WHERE resourcetype = ?1 ORDER BY clock, rowid",
                &[json!(resource::PROXY)],
            )
            .unwrap()
            .iter()
            .map(|r| int(r, "action"))
            .collect();
        assert_eq!(actions, vec![action::ADD, action::DELETE]);
    }
}
