//! uiprobe simulated frontend
//!
//! An in-process stand-in for the administration frontend the harness
//! drives: sign-in with login blocking, host groups, housekeeping, media
//! types, proxies, hosts with tag and macro sub-tables, and the audit log. Pages
//! render to a small DOM which [`SimBrowser`] exposes through the harness
//! [`Browser`](uiprobe_harness::Browser) trait, backed by the same SQLite
//! datastore the assertions read.

pub mod app;
pub mod browser;
pub mod css;
pub mod dom;
mod routes;
pub mod schema;
pub mod widgets;

pub use app::{CookieChange, FormData, Response, SimApp};
pub use browser::{SimBrowser, SimLauncher, SimOptions};
pub use routes::auth::{failed_attempts_notice, LOGIN_ERROR};
pub use routes::housekeeping::parse_period;
pub use schema::{add_session, add_user, install, HOST_TABLES};
