//! Authenticated browser session
//!
//! A [`Session`] owns one browser for the lifetime of a test group and
//! tracks which identity it is signed in as. Sign-in outcomes feed a
//! per-account [`LockoutTracker`] so cases can predict and wait out the
//! application's login block.

use std::collections::HashMap;
use tracing::{debug, info};
use uiprobe_common::LockoutPolicy;

use crate::config::{Credentials, HarnessConfig, WaitConfig};
use crate::driver::{Browser, Cookie};
use crate::error::HarnessResult;
use crate::lockout::{LockState, LockoutTracker};
use crate::page::WaitState;
use crate::selector::Locator;

pub const LOGIN_ROUTE: &str = "index.php";
pub const LOGOUT_ROUTE: &str = "index.php?reconnect=1";
pub const DASHBOARD_ROUTE: &str = "zabbix.php?action=dashboard.view";
pub const SESSION_COOKIE: &str = "zbx_session";

const USERNAME_FIELD: &str = "name";
const PASSWORD_FIELD: &str = "password";
const SIGN_IN_BUTTON: &str = "enter";
const LOGIN_ERROR: &str = ".red";
const LOGIN_NOTICE: &str = ".msg-warning .msg-title";

/// Result of one sign-in attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Signed in; `notice` carries the failed-attempt warning if one was shown
    Authenticated { notice: Option<String> },
    /// Still on the sign-in page
    Rejected { message: String },
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated { .. })
    }
}

pub struct Session {
    pub(crate) browser: Box<dyn Browser>,
    pub(crate) base_url: String,
    pub(crate) wait: WaitConfig,
    policy: LockoutPolicy,
    identity: Option<String>,
    trackers: HashMap<String, LockoutTracker>,
}

impl Session {
    pub fn new(browser: Box<dyn Browser>, config: &HarnessConfig) -> Self {
        Self {
            browser,
            base_url: config.base_url.clone(),
            wait: config.wait,
            policy: config.lockout,
            identity: None,
            trackers: HashMap::new(),
        }
    }

    /// Username the session is currently signed in as
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn wait_config(&self) -> &WaitConfig {
        &self.wait
    }

    pub fn browser(&mut self) -> &mut dyn Browser {
        self.browser.as_mut()
    }

    /// Absolute URL for a route relative to the frontend root
    pub fn url(&self, route: &str) -> String {
        if route.starts_with("http://") || route.starts_with("https://") {
            return route.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }

    /// Sign in through the login form.
    ///
    /// Any current identity is signed out first. A rejection is a normal
    /// outcome, not an error.
    pub async fn login(&mut self, credentials: &Credentials) -> HarnessResult<LoginOutcome> {
        self.open(LOGOUT_ROUTE).await?;
        self.identity = None;

        let user_field = Locator::id(USERNAME_FIELD);
        self.wait_for(&user_field, WaitState::Visible).await?;
        self.fill_text(&user_field, &credentials.username).await?;
        self.fill_text(&Locator::id(PASSWORD_FIELD), &credentials.password)
            .await?;
        self.click(&Locator::id(SIGN_IN_BUTTON)).await?;
        self.wait_until_ready().await?;

        if self.exists(&Locator::id(SIGN_IN_BUTTON)).await? {
            let message = if self.exists(&Locator::css(LOGIN_ERROR)).await? {
                self.text(&Locator::css(LOGIN_ERROR)).await?
            } else {
                String::new()
            };
            self.tracker_mut(&credentials.username).record_failure();
            debug!("Sign-in rejected for {}: {}", credentials.username, message);
            return Ok(LoginOutcome::Rejected { message });
        }

        let notice = if self.exists(&Locator::css(LOGIN_NOTICE)).await? {
            Some(self.text(&Locator::css(LOGIN_NOTICE)).await?)
        } else {
            None
        };
        self.tracker_mut(&credentials.username).record_success();
        self.identity = Some(credentials.username.clone());
        info!("Signed in as {}", credentials.username);
        Ok(LoginOutcome::Authenticated { notice })
    }

    /// Sign in by presenting a pre-issued session token instead of the form.
    pub async fn login_with_token(&mut self, username: &str, token: &str) -> HarnessResult<LoginOutcome> {
        self.open(LOGIN_ROUTE).await?;
        self.browser.delete_cookies().await?;
        self.browser
            .add_cookie(&Cookie::new(SESSION_COOKIE, token))
            .await?;
        self.open(DASHBOARD_ROUTE).await?;

        if self.exists(&Locator::id(SIGN_IN_BUTTON)).await? {
            self.identity = None;
            return Ok(LoginOutcome::Rejected {
                message: format!("session token for {} was not accepted", username),
            });
        }
        self.identity = Some(username.to_string());
        info!("Signed in as {} with session token", username);
        Ok(LoginOutcome::Authenticated { notice: None })
    }

    pub async fn logout(&mut self) -> HarnessResult<()> {
        self.open(LOGOUT_ROUTE).await?;
        self.wait_for(&Locator::id(SIGN_IN_BUTTON), WaitState::Visible)
            .await?;
        if let Some(user) = self.identity.take() {
            info!("Signed out {}", user);
        }
        Ok(())
    }

    /// Replace the current identity with another one.
    pub async fn switch_user(&mut self, credentials: &Credentials) -> HarnessResult<LoginOutcome> {
        if self.identity.is_some() {
            self.logout().await?;
        }
        self.login(credentials).await
    }

    /// Predicted block state of an account, from the attempts made through
    /// this session.
    pub fn lock_state(&self, username: &str) -> LockState {
        self.trackers
            .get(username)
            .map(|t| t.state())
            .unwrap_or(LockState::Unlocked)
    }

    pub fn failed_attempts(&self, username: &str) -> u32 {
        self.trackers.get(username).map(|t| t.failures()).unwrap_or(0)
    }

    /// Sleep until the block on `username` has expired.
    ///
    /// This is a literal wait; the application only unblocks with time.
    pub async fn wait_out_lockout(&mut self, username: &str) -> HarnessResult<()> {
        if let LockState::Locked { remaining } = self.lock_state(username) {
            let total = remaining + self.wait.poll_interval();
            info!("Waiting {:?} for {} to be unblocked", total, username);
            tokio::time::sleep(total).await;
        }
        Ok(())
    }

    pub async fn screenshot(&mut self) -> HarnessResult<Vec<u8>> {
        self.browser.screenshot().await
    }

    /// End the browser session.
    pub async fn close(mut self) -> HarnessResult<()> {
        self.browser.quit().await
    }

    fn tracker_mut(&mut self, username: &str) -> &mut LockoutTracker {
        let policy = self.policy;
        self.trackers
            .entry(username.to_string())
            .or_insert_with(|| LockoutTracker::new(policy))
    }
}
