//! Page handlers, one module per area of the frontend

pub(crate) mod audit;
pub(crate) mod auth;
pub(crate) mod hostgroups;
pub(crate) mod hosts;
pub(crate) mod housekeeping;
pub(crate) mod mediatypes;
pub(crate) mod proxies;

pub const DASHBOARD_ROUTE: &str = "zabbix.php?action=dashboard.view";

/// Validation message for an empty mandatory field
pub(crate) fn cannot_be_empty(field: &str) -> String {
    format!("Incorrect value for field \"{}\": cannot be empty.", field)
}
