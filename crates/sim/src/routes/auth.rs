//! Sign-in, sign-out and the dashboard

use serde_json::json;
use tracing::{debug, info};
use uiprobe_common::Result;

use super::DASHBOARD_ROUTE;
use crate::app::{action, format_clock, int, resource, text, AuditEntry, CookieChange, Page, Request, SimApp, CLIENT_IP};
use crate::dom::El;
use crate::schema::password_hash;
use crate::widgets::{banner, field, label, password_input, text_input, BannerKind};

pub const LOGIN_ERROR: &str = "Incorrect user name or password or account is temporarily blocked.";

pub(crate) fn index(app: &SimApp, req: &Request<'_>) -> Result<Page> {
    if req.post {
        return sign_in(app, req);
    }
    if req.param("reconnect") == Some("1") {
        if let Some(sessionid) = req.session {
            sign_out(app, sessionid)?;
        }
        return Ok(login_form(None).cookie(CookieChange::Clear).at("index.php"));
    }
    match app.session_user(req.session)? {
        Some(user) => Ok(Page {
            user: Some(user.username),
            ..dashboard(None).at(DASHBOARD_ROUTE)
        }),
        None => Ok(login_form(None)),
    }
}

pub(crate) fn login_form(error: Option<&str>) -> Page {
    let mut form = El::new("form")
        .id("login-form")
        .attr("action", "index.php")
        .attr("method", "post")
        .child(
            El::new("ul")
                .child(field(label("name", "Username"), text_input("name", "name", "")))
                .child(field(label("password", "Password"), password_input("password", "password"))),
        );
    if let Some(error) = error {
        form = form.child(El::new("div").class("red").text(error));
    }
    form = form.child(
        El::new("button")
            .id("enter")
            .attr("type", "submit")
            .name("enter")
            .attr("value", "Sign in")
            .text("Sign in"),
    );
    Page::new("Sign in").content(form)
}

pub(crate) fn dashboard(notice: Option<El>) -> Page {
    Page::new("Global view")
        .banner(notice)
        .content(El::new("div").class("dashboard-grid").text("Dashboard"))
}

fn sign_in(app: &SimApp, req: &Request<'_>) -> Result<Page> {
    let username = req.value("name").unwrap_or_default();
    let password = req.value("password").unwrap_or_default();
    let now = app.now();
    let policy = app.policy();

    let Some(user) = app.db().query_one(
        "SELECT userid, username, passwd, attempt_failed, attempt_clock, attempt_ip \
         FROM users WHERE username = ?1",
        &[json!(username)],
    )?
    else {
        debug!("Sign-in for unknown user {}", username);
        return Ok(login_form(Some(LOGIN_ERROR)));
    };

    let userid = int(&user, "userid");
    let failed = int(&user, "attempt_failed");
    let last_failure = int(&user, "attempt_clock");

    if failed >= i64::from(policy.attempts) && now - last_failure < policy.block_secs as i64 {
        debug!("Sign-in for {} refused while blocked", username);
        return Ok(login_form(Some(LOGIN_ERROR)));
    }

    if password_hash(password) != text(&user, "passwd") {
        app.db().execute(
            "UPDATE users SET attempt_failed = attempt_failed + 1, attempt_clock = ?1, attempt_ip = ?2 \
             WHERE userid = ?3",
            &[json!(now), json!(CLIENT_IP), json!(userid)],
        )?;
        app.audit(AuditEntry {
            userid,
            username,
            action: action::FAILED_LOGIN,
            resourcetype: resource::USER,
            resourceid: userid,
            resourcename: username,
            details: Vec::new(),
        })?;
        debug!("Sign-in for {} failed ({} failures)", username, failed + 1);
        return Ok(login_form(Some(LOGIN_ERROR)));
    }

    let notice = (failed > 0).then(|| {
        banner::<&str>(
            BannerKind::Warning,
            &failed_attempts_notice(failed, &text(&user, "attempt_ip"), last_failure),
            &[],
        )
    });

    app.db().execute(
        "UPDATE users SET attempt_failed = 0 WHERE userid = ?1",
        &[json!(userid)],
    )?;
    let sessionid = crate::schema::add_session(app.db(), userid, now)?;
    app.audit(AuditEntry {
        userid,
        username,
        action: action::LOGIN,
        resourcetype: resource::USER,
        resourceid: userid,
        resourcename: username,
        details: Vec::new(),
    })?;
    info!("{} signed in", username);

    Ok(Page {
        user: Some(username.to_string()),
        ..dashboard(notice)
            .cookie(CookieChange::Set(sessionid))
            .at(DASHBOARD_ROUTE)
    })
}

fn sign_out(app: &SimApp, sessionid: &str) -> Result<()> {
    if let Some(user) = app.session_user(Some(sessionid))? {
        app.db().execute(
            "UPDATE sessions SET status = 1 WHERE sessionid = ?1",
            &[json!(sessionid)],
        )?;
        app.audit(AuditEntry {
            userid: user.userid,
            username: &user.username,
            action: action::LOGOUT,
            resourcetype: resource::USER,
            resourceid: user.userid,
            resourcename: &user.username,
            details: Vec::new(),
        })?;
    }
    Ok(())
}

/// Warning shown after a successful sign-in that follows failed attempts
pub fn failed_attempts_notice(count: i64, ip: &str, clock: i64) -> String {
    let (date, time) = format_clock(clock);
    format!(
        "{} failed login {} logged. Last failed attempt was from {} on {} at {}.",
        count,
        if count == 1 { "attempt" } else { "attempts" },
        ip,
        date,
        time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FormData;
    use crate::dom::Document;
    use uiprobe_common::{Database, LockoutPolicy};

    fn login(app: &SimApp, password: &str) -> crate::app::Response {
        let form: FormData = vec![
            ("name".into(), "Admin".into()),
            ("password".into(), password.into()),
            ("enter".into(), "Sign in".into()),
        ];
        app.post("index.php", &form, None)
    }

    fn has_class(doc: &Document, class: &str) -> bool {
        doc.descendants(Document::ROOT)
            .into_iter()
            .any(|n| doc.node(n).map(|n| n.has_class(class)).unwrap_or(false))
    }

    #[test]
    fn test_notice_wording() {
        assert!(failed_attempts_notice(1, "127.0.0.1", 1_700_000_000)
            .starts_with("1 failed login attempt logged. Last failed attempt was from 127.0.0.1 on 2023-11-14"));
        assert!(failed_attempts_notice(5, "127.0.0.1", 1_700_000_000).starts_with("5 failed login attempts logged."));
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let app = SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap();
        let response = login(&app, "zabbix");
        let CookieChange::Set(sessionid) = response.cookie else {
            panic!("no session cookie");
        };
        assert_eq!(response.route, DASHBOARD_ROUTE);
        assert!(!has_class(&response.doc, "msg-warning"));

        let response = app.get("index.php?reconnect=1", Some(&sessionid));
        assert_eq!(response.cookie, CookieChange::Clear);
        assert!(app.session_user(Some(&sessionid)).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_after_repeated_failures() {
        let app = SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap();
        for _ in 0..5 {
            assert!(has_class(&login(&app, "wrong").doc, "red"));
        }
        // Blocked: the right password is refused and not counted
        let refused = login(&app, "zabbix");
        assert_eq!(refused.cookie, CookieChange::Keep);
        let failed = app
            .db()
            .query_scalar("SELECT attempt_failed FROM users WHERE username = 'Admin'", &[])
            .unwrap();
        assert_eq!(failed, Some(json!(5)));

        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        let response = login(&app, "zabbix");
        assert!(matches!(response.cookie, CookieChange::Set(_)));
        let title = response
            .doc
            .descendants(Document::ROOT)
            .into_iter()
            .find(|n| response.doc.node(*n).map(|n| n.has_class("msg-title")).unwrap_or(false))
            .unwrap();
        assert!(response.doc.text_content(title).starts_with("5 failed login attempts logged."));
    }
}
