//! Request handling core of the simulated frontend
//!
//! Every request renders a whole new [`Document`]. Handlers return a
//! [`Page`]; the app wraps it in the common layout.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uiprobe_common::{Database, LockoutPolicy, Result};

use crate::dom::{Document, El};
use crate::routes;
use crate::schema;
use crate::widgets::{banner, BannerKind};

/// Wall clock the simulated frontend starts at
const BASE_CLOCK: i64 = 1_700_000_000;

pub const CLIENT_IP: &str = "127.0.0.1";

/// Submitted form fields in document order
pub type FormData = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieChange {
    Keep,
    Set(String),
    Clear,
}

pub struct Response {
    /// Route the browser ends up on
    pub route: String,
    pub doc: Document,
    pub cookie: CookieChange,
}

pub(crate) struct Request<'a> {
    pub path: &'a str,
    pub params: BTreeMap<String, String>,
    pub form: &'a FormData,
    pub session: Option<&'a str>,
    pub post: bool,
}

impl Request<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Form field, falling back to the query string
    pub fn value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .or_else(|| self.param(name))
    }

    /// Every submitted value for a repeated field such as `groups[]`
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.form
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn id_param(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(|v| v.parse().ok())
    }

    /// Sub-table rows submitted as `prefix[index][column]`, in index order
    pub fn rows(&self, prefix: &str) -> Vec<BTreeMap<String, String>> {
        let mut rows: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
        for (key, value) in self.form {
            let Some(rest) = key.strip_prefix(prefix).and_then(|r| r.strip_prefix('[')) else {
                continue;
            };
            let Some((index, rest)) = rest.split_once("][") else {
                continue;
            };
            let (Ok(index), Some(column)) = (index.parse::<usize>(), rest.strip_suffix(']')) else {
                continue;
            };
            rows.entry(index)
                .or_default()
                .insert(column.to_string(), value.clone());
        }
        rows.into_values().collect()
    }
}

/// Signed-in account
#[derive(Debug, Clone)]
pub(crate) struct User {
    pub userid: i64,
    pub username: String,
}

/// What a handler renders
pub(crate) struct Page {
    pub title: String,
    pub banner: Option<El>,
    pub content: Vec<El>,
    pub cookie: CookieChange,
    pub route: Option<String>,
    pub user: Option<String>,
}

impl Page {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            banner: None,
            content: Vec::new(),
            cookie: CookieChange::Keep,
            route: None,
            user: None,
        }
    }

    pub fn content(mut self, el: El) -> Self {
        self.content.push(el);
        self
    }

    pub fn banner(mut self, el: Option<El>) -> Self {
        self.banner = el;
        self
    }

    pub fn good(self, title: &str) -> Self {
        self.banner(Some(banner::<&str>(BannerKind::Good, title, &[])))
    }

    pub fn bad<S: AsRef<str>>(self, title: &str, details: &[S]) -> Self {
        self.banner(Some(banner(BannerKind::Bad, title, details)))
    }

    pub fn cookie(mut self, cookie: CookieChange) -> Self {
        self.cookie = cookie;
        self
    }

    /// Render as if the browser had been redirected to `route`
    pub fn at(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    fn render(self) -> Document {
        let mut header = El::new("header").class("header");
        if let Some(user) = &self.user {
            header = header.child(El::new("span").id("user-name").text(user.as_str()));
        }
        let mut main = El::new("main").child(El::new("h1").id("page-title-general").text(self.title.as_str()));
        if let Some(banner) = self.banner {
            main = main.child(banner);
        }
        main = main.children(self.content);
        Document::from_elements([El::new("body").child(header).child(main)])
    }
}

/// Audit record actions
pub(crate) mod action {
    pub const ADD: i64 = 0;
    pub const UPDATE: i64 = 1;
    pub const DELETE: i64 = 2;
    pub const LOGOUT: i64 = 4;
    pub const LOGIN: i64 = 8;
    pub const FAILED_LOGIN: i64 = 9;

    pub fn name(action: i64) -> &'static str {
        match action {
            ADD => "Add",
            UPDATE => "Update",
            DELETE => "Delete",
            LOGOUT => "Logout",
            LOGIN => "Login",
            FAILED_LOGIN => "Failed login",
            _ => "Unknown",
        }
    }
}

/// Audit record resource types
pub(crate) mod resource {
    pub const USER: i64 = 0;
    pub const MEDIA_TYPE: i64 = 3;
    pub const HOST: i64 = 4;
    pub const HOST_GROUP: i64 = 14;
    pub const PROXY: i64 = 26;

    pub const ALL: &[(i64, &str)] = &[
        (HOST, "Host"),
        (HOST_GROUP, "Host group"),
        (MEDIA_TYPE, "Media type"),
        (PROXY, "Proxy"),
        (USER, "User"),
    ];

    pub fn name(resource: i64) -> &'static str {
        ALL.iter()
            .find(|(id, _)| *id == resource)
            .map(|(_, name)| *name)
            .unwrap_or("Unknown")
    }
}

pub(crate) struct AuditEntry<'a> {
    pub userid: i64,
    pub username: &'a str,
    pub action: i64,
    pub resourcetype: i64,
    pub resourceid: i64,
    pub resourcename: &'a str,
    pub details: Vec<String>,
}

struct AppState {
    db: Database,
    policy: LockoutPolicy,
    epoch: Instant,
}

/// The simulated frontend. Cheap to clone; clones share one datastore.
#[derive(Clone)]
pub struct SimApp {
    state: Arc<AppState>,
}

impl SimApp {
    /// Install the schema (seeding an empty datastore) and start serving.
    pub fn new(db: Database, policy: LockoutPolicy) -> Result<Self> {
        schema::install(&db)?;
        Ok(Self {
            state: Arc::new(AppState {
                db,
                policy,
                epoch: Instant::now(),
            }),
        })
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.state.policy
    }

    /// Current clock in seconds. Follows tokio time, so paused tests can
    /// advance it.
    pub fn now(&self) -> i64 {
        BASE_CLOCK + self.state.epoch.elapsed().as_secs() as i64
    }

    pub fn get(&self, route: &str, session: Option<&str>) -> Response {
        self.handle(route, &FormData::new(), session, false)
    }

    pub fn post(&self, route: &str, form: &FormData, session: Option<&str>) -> Response {
        self.handle(route, form, session, true)
    }

    fn handle(&self, route: &str, form: &FormData, session: Option<&str>, post: bool) -> Response {
        let (path, query) = route.split_once('?').unwrap_or((route, ""));
        let request = Request {
            path,
            params: parse_query(query),
            form,
            session,
            post,
        };
        debug!("{} {}", if post { "POST" } else { "GET" }, route);

        let page = self.dispatch(&request).unwrap_or_else(|e| {
            warn!("Request {} failed: {}", route, e);
            Page::new("Error").bad("Database error", &[e.to_string()])
        });
        let route = page.route.clone().unwrap_or_else(|| route.to_string());
        let cookie = page.cookie.clone();
        Response {
            route,
            doc: page.render(),
            cookie,
        }
    }

    fn dispatch(&self, req: &Request<'_>) -> Result<Page> {
        match req.path {
            "" | "index.php" => routes::auth::index(self, req),
            "zabbix.php" => {
                let Some(user) = self.session_user(req.session)? else {
                    return Ok(routes::auth::login_form(None).at("index.php"));
                };
                let page = match req.param("action").unwrap_or("dashboard.view") {
                    "dashboard.view" => routes::auth::dashboard(None),
                    "hostgroup.list" => routes::hostgroups::list(self, None)?,
                    "hostgroup.edit" => routes::hostgroups::edit(self, req)?,
                    "hostgroup.create" | "hostgroup.update" => routes::hostgroups::save(self, req, &user)?,
                    "housekeeping.edit" => routes::housekeeping::edit(self)?,
                    "housekeeping.update" => routes::housekeeping::update(self, req, &user)?,
                    "mediatype.list" => routes::mediatypes::list(self, None)?,
                    "mediatype.edit" => routes::mediatypes::edit(self, req)?,
                    "mediatype.create" | "mediatype.update" => routes::mediatypes::save(self, req, &user)?,
                    "proxy.list" => routes::proxies::list(self, None)?,
                    "proxy.edit" => routes::proxies::edit(self, req)?,
                    "proxy.create" | "proxy.update" => routes::proxies::save(self, req, &user)?,
                    "proxy.delete" => routes::proxies::delete(self, req, &user)?,
                    "host.list" => routes::hosts::list(self, None)?,
                    "host.edit" => routes::hosts::edit(self, req)?,
                    "host.create" | "host.update" => routes::hosts::save(self, req, &user)?,
                    "auditlog.list" => routes::audit::list(self, req)?,
                    _ => not_found(),
                };
                Ok(Page {
                    user: Some(user.username),
                    ..page
                })
            }
            _ => Ok(not_found()),
        }
    }

    pub(crate) fn session_user(&self, session: Option<&str>) -> Result<Option<User>> {
        let Some(session) = session else {
            return Ok(None);
        };
        let row = self.db().query_one(
            "SELECT u.userid, u.username FROM sessions s JOIN users u ON u.userid = s.userid \
             WHERE s.sessionid = ?1 AND s.status = 0",
            &[json!(session)],
        )?;
        Ok(row.map(|r| User {
            userid: r.get("userid").and_then(Value::as_i64).unwrap_or_default(),
            username: text(&r, "username"),
        }))
    }

    pub(crate) fn audit(&self, entry: AuditEntry<'_>) -> Result<()> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let row = schema::row([
            ("auditid", json!(id)),
            ("userid", json!(entry.userid)),
            ("username", json!(entry.username)),
            ("clock", json!(self.now())),
            ("ip", json!(CLIENT_IP)),
            ("action", json!(entry.action)),
            ("resourcetype", json!(entry.resourcetype)),
            ("resourceid", json!(entry.resourceid)),
            ("resourcename", json!(entry.resourcename)),
            ("recordsetid", json!(uuid::Uuid::new_v4().simple().to_string())),
            ("details", json!(entry.details.join("\n"))),
        ]);
        self.db().insert("auditlog", &row)?;
        Ok(())
    }
}

pub(crate) fn not_found() -> Page {
    Page::new("Page not found").content(El::new("p").class("error").text("Page not found"))
}

/// String column of a row; numbers are rendered, NULL is empty
pub(crate) fn text(row: &uiprobe_common::Row, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub(crate) fn int(row: &uiprobe_common::Row, column: &str) -> i64 {
    row.get(column).and_then(Value::as_i64).unwrap_or_default()
}

pub(crate) fn format_clock(clock: i64) -> (String, String) {
    match DateTime::<Utc>::from_timestamp(clock, 0) {
        Some(t) => (t.format("%Y-%m-%d").to_string(), t.format("%H:%M").to_string()),
        None => (clock.to_string(), String::new()),
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let params = parse_query("action=auditlog.list&filter_resourceid=12&name=Test%20Group&x");
        assert_eq!(params["action"], "auditlog.list");
        assert_eq!(params["filter_resourceid"], "12");
        assert_eq!(params["name"], "Test Group");
        assert_eq!(params["x"], "");
    }

    #[test]
    fn test_request_rows() {
        let form: FormData = vec![
            ("tags[1][tag]".into(), "b".into()),
            ("tags[0][tag]".into(), "a".into()),
            ("tags[0][value]".into(), "1".into()),
            ("macros[0][macro]".into(), "{$X}".into()),
        ];
        let req = Request {
            path: "zabbix.php",
            params: BTreeMap::new(),
            form: &form,
            session: None,
            post: true,
        };
        let rows = req.rows("tags");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["tag"], "a");
        assert_eq!(rows[0]["value"], "1");
        assert_eq!(rows[1]["tag"], "b");
    }

    #[test]
    fn test_unknown_route() {
        let app = SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap();
        let response = app.get("nowhere.php", None);
        let title = response.doc.find_by_id("page-title-general").unwrap();
        assert_eq!(response.doc.text_content(title), "Page not found");
    }

    #[test]
    fn test_unauthenticated_action_shows_login() {
        let app = SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap();
        let response = app.get("zabbix.php?action=hostgroup.list", None);
        assert_eq!(response.route, "index.php");
        assert!(response.doc.find_by_id("enter").is_some());
    }
}
