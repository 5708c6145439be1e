//! Datastore schema and seed data of the simulated frontend

use serde_json::json;
use sha2::{Digest, Sha256};
use uiprobe_common::{Database, Result, Row};

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    userid INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    passwd TEXT NOT NULL,
    attempt_failed INTEGER NOT NULL DEFAULT 0,
    attempt_ip TEXT NOT NULL DEFAULT '',
    attempt_clock INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sessions (
    sessionid TEXT PRIMARY KEY,
    userid INTEGER NOT NULL,
    lastaccess INTEGER NOT NULL DEFAULT 0,
    status INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS hstgrp (
    groupid INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config (
    configid INTEGER PRIMARY KEY,
    hk_events_mode INTEGER NOT NULL,
    hk_events_trigger TEXT NOT NULL,
    hk_audit_mode INTEGER NOT NULL,
    hk_audit TEXT NOT NULL,
    hk_sessions_mode INTEGER NOT NULL,
    hk_sessions TEXT NOT NULL,
    hk_history_mode INTEGER NOT NULL,
    hk_history TEXT NOT NULL,
    hk_trends_mode INTEGER NOT NULL,
    hk_trends TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS media_type (
    mediatypeid INTEGER PRIMARY KEY,
    type INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS proxy (
    proxyid INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    operating_mode INTEGER NOT NULL DEFAULT 0,
    address TEXT NOT NULL DEFAULT '127.0.0.1',
    port TEXT NOT NULL DEFAULT '10051',
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS auditlog (
    auditid TEXT PRIMARY KEY,
    userid INTEGER NOT NULL,
    username TEXT NOT NULL,
    clock INTEGER NOT NULL,
    ip TEXT NOT NULL,
    action INTEGER NOT NULL,
    resourcetype INTEGER NOT NULL,
    resourceid INTEGER NOT NULL,
    resourcename TEXT NOT NULL,
    recordsetid TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS hosts (
    hostid INTEGER PRIMARY KEY,
    host TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS hosts_groups (
    hostgroupid INTEGER PRIMARY KEY,
    hostid INTEGER NOT NULL,
    groupid INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS host_tag (
    hosttagid INTEGER PRIMARY KEY,
    hostid INTEGER NOT NULL,
    tag TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS hostmacro (
    hostmacroid INTEGER PRIMARY KEY,
    hostid INTEGER NOT NULL,
    macro TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT ''
);
"#;

/// Tables a group that edits hosts should back up
pub const HOST_TABLES: &[&str] = &["hosts", "hosts_groups", "host_tag", "hostmacro"];

/// A housekeeping switch and the storage period it enables
#[derive(Debug, Clone, Copy)]
pub struct HousekeepingField {
    pub mode: &'static str,
    pub period: &'static str,
    pub mode_label: &'static str,
    pub period_label: &'static str,
    pub default_period: &'static str,
}

pub const HOUSEKEEPING: &[HousekeepingField] = &[
    HousekeepingField {
        mode: "hk_events_mode",
        period: "hk_events_trigger",
        mode_label: "Enable events housekeeping",
        period_label: "Trigger data storage period",
        default_period: "365d",
    },
    HousekeepingField {
        mode: "hk_audit_mode",
        period: "hk_audit",
        mode_label: "Enable audit housekeeping",
        period_label: "Data storage period",
        default_period: "31d",
    },
    HousekeepingField {
        mode: "hk_sessions_mode",
        period: "hk_sessions",
        mode_label: "Enable session housekeeping",
        period_label: "Session storage period",
        default_period: "365d",
    },
    HousekeepingField {
        mode: "hk_history_mode",
        period: "hk_history",
        mode_label: "Enable history housekeeping",
        period_label: "History storage period",
        default_period: "31d",
    },
    HousekeepingField {
        mode: "hk_trends_mode",
        period: "hk_trends",
        mode_label: "Enable trends housekeeping",
        period_label: "Trends storage period",
        default_period: "365d",
    },
];

pub const ADMIN_USER: &str = "Admin";
pub const ADMIN_PASSWORD: &str = "zabbix";

/// Stored form of a password
pub fn password_hash(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Create the tables and, on an empty datastore, the seed rows.
pub fn install(db: &Database) -> Result<()> {
    db.execute_batch(SCHEMA)?;

    let seeded = db
        .query_scalar("SELECT COUNT(*) FROM users", &[])?
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
        > 0;
    if seeded {
        return Ok(());
    }

    add_user(db, ADMIN_USER, ADMIN_PASSWORD)?;

    for (groupid, name) in [(2, "Linux servers"), (4, "Zabbix servers"), (5, "Discovered hosts")] {
        db.insert("hstgrp", &row([("groupid", json!(groupid)), ("name", json!(name))]))?;
    }

    let mut config = row([("configid", json!(1))]);
    for field in HOUSEKEEPING {
        config.insert(field.mode.to_string(), json!(1));
        config.insert(field.period.to_string(), json!(field.default_period));
    }
    db.insert("config", &config)?;

    for (id, kind, name) in [(1, 0, "Email"), (3, 1, "SMS")] {
        db.insert(
            "media_type",
            &row([
                ("mediatypeid", json!(id)),
                ("type", json!(kind)),
                ("name", json!(name)),
            ]),
        )?;
    }

    let server = db.insert(
        "hosts",
        &row([("hostid", json!(10084)), ("host", json!("Zabbix server"))]),
    )?;
    db.insert(
        "hosts_groups",
        &row([("hostid", json!(server)), ("groupid", json!(4))]),
    )?;

    Ok(())
}

/// Add a user account, returning its id
pub fn add_user(db: &Database, username: &str, password: &str) -> Result<i64> {
    db.insert(
        "users",
        &row([
            ("username", json!(username)),
            ("passwd", json!(password_hash(password))),
        ]),
    )
}

/// Open a session for a user and return its id, usable as the session
/// cookie value.
pub fn add_session(db: &Database, userid: i64, clock: i64) -> Result<String> {
    let sessionid = uuid::Uuid::new_v4().simple().to_string();
    db.insert(
        "sessions",
        &row([
            ("sessionid", json!(sessionid)),
            ("userid", json!(userid)),
            ("lastaccess", json!(clock)),
        ]),
    )?;
    Ok(sessionid)
}

pub(crate) fn row<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Row {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_repeatable() {
        let db = Database::open_memory().unwrap();
        install(&db).unwrap();
        install(&db).unwrap();
        assert_eq!(db.count_where("users", "username", &json!("Admin")).unwrap(), 1);
        assert_eq!(db.count_where("hstgrp", "name", &json!("Linux servers")).unwrap(), 1);
        let audit = db
            .query_scalar("SELECT hk_audit FROM config WHERE configid = 1", &[])
            .unwrap();
        assert_eq!(audit, Some(json!("31d")));
    }

    #[test]
    fn test_password_hash() {
        assert_eq!(password_hash("zabbix").len(), 64);
        assert_ne!(password_hash("zabbix"), password_hash("Zabbix"));
    }
}
