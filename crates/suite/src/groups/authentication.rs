//! Sign-in, login blocking, session tokens and sign-out

use async_trait::async_trait;
use serde_json::json;
use uiprobe_common::Database;
use uiprobe_harness::session::DASHBOARD_ROUTE;
use uiprobe_harness::{
    assert_db_row, Case, CaseContext, Credentials, DataSet, Expectation, Fixture, FixtureState,
    Group, HarnessError, HarnessResult, Locator, LoginOutcome, Scenario, ScenarioCase,
};
use uiprobe_sim::{add_session, add_user};

use super::row;

pub const LOGIN_ERROR: &str = "Incorrect user name or password or account is temporarily blocked.";

pub const LOGIN_USER: &str = "login-user";
pub const LOCKOUT_USER: &str = "lockout-user";
pub const TOKEN_USER: &str = "token-user";
pub const USER_PASSWORD: &str = "probe-Password1";

const DASHBOARD_TITLE: &str = "Global view";

pub fn group() -> Group {
    Group::new("authentication")
        .backup(&["users", "sessions", "auditlog"])
        .fixture(Accounts)
        .scenarios(LoginScenarios)
        .case(LoginLockout)
        .case(TokenLogin)
        .case(Logout)
        .depends("logout", "login")
}

/// Accounts the cases sign in as, plus an open session for the token user
pub struct Accounts;

#[async_trait]
impl Fixture for Accounts {
    async fn before_group(&self, db: &Database) -> HarnessResult<FixtureState> {
        add_user(db, LOGIN_USER, USER_PASSWORD)?;
        let lockout = add_user(db, LOCKOUT_USER, USER_PASSWORD)?;
        let token_user = add_user(db, TOKEN_USER, USER_PASSWORD)?;
        let token = add_session(db, token_user, 0)?;
        Ok(FixtureState::new()
            .with("lockout_userid", lockout)
            .with("token", token))
    }
}

fn mismatch(context: &str, expected: impl std::fmt::Display, outcome: &LoginOutcome) -> HarnessError {
    HarnessError::assertion(context, expected, format!("{:?}", outcome))
}

/// Sign-in attempts that succeed or are refused
pub struct LoginScenarios;

#[async_trait]
impl ScenarioCase for LoginScenarios {
    type Input = Credentials;

    fn name(&self) -> &str {
        "login"
    }

    fn data(&self) -> HarnessResult<DataSet<Credentials>> {
        Ok(DataSet::new()
            .scenario(
                "administrator",
                Credentials::default(),
                Expectation::good(DASHBOARD_TITLE),
            )
            .scenario(
                "unknown user",
                Credentials::new("no-such-user", USER_PASSWORD),
                Expectation::bad(LOGIN_ERROR, Vec::<String>::new()),
            )
            .scenario(
                "empty credentials",
                Credentials::new("", ""),
                Expectation::bad(LOGIN_ERROR, Vec::<String>::new()),
            )
            .scenario(
                "password is case sensitive",
                Credentials::new(LOGIN_USER, USER_PASSWORD.to_uppercase()),
                Expectation::bad(LOGIN_ERROR, Vec::<String>::new()),
            )
            .scenario(
                "provisioned user",
                Credentials::new(LOGIN_USER, USER_PASSWORD),
                Expectation::good(DASHBOARD_TITLE),
            ))
    }

    async fn run(&self, ctx: &mut CaseContext, scenario: &Scenario<Credentials>) -> HarnessResult<()> {
        let outcome = ctx.session.login(&scenario.input).await?;
        match (&scenario.expect, &outcome) {
            (Expectation::Good { title, .. }, LoginOutcome::Authenticated { .. }) => {
                let shown = ctx.session.text(&Locator::id("page-title-general")).await?;
                if &shown != title {
                    return Err(HarnessError::assertion("page after sign-in", title, shown));
                }
                let user = ctx.session.text(&Locator::id("user-name")).await?;
                if user != scenario.input.username {
                    return Err(HarnessError::assertion("signed-in user", &scenario.input.username, user));
                }
                Ok(())
            }
            (Expectation::Bad { title, .. }, LoginOutcome::Rejected { message }) => {
                if message != title {
                    return Err(HarnessError::assertion("sign-in error", title, message));
                }
                Ok(())
            }
            (expect, outcome) => Err(mismatch("sign-in outcome", expect.outcome(), outcome)),
        }
    }
}

/// Repeated failures block the account until the block duration has passed
pub struct LoginLockout;

#[async_trait]
impl Case for LoginLockout {
    fn name(&self) -> &str {
        "lockout"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        let attempts = ctx.config.lockout.attempts;
        let wrong = Credentials::new(LOCKOUT_USER, "not the password");
        let right = Credentials::new(LOCKOUT_USER, USER_PASSWORD);
        let failures_sql = "SELECT attempt_failed FROM users WHERE username = ?1";

        for attempt in 1..=attempts {
            match ctx.session.login(&wrong).await? {
                LoginOutcome::Rejected { message } if message == LOGIN_ERROR => {}
                other => return Err(mismatch(&format!("failed attempt {}", attempt), LOGIN_ERROR, &other)),
            }
        }
        if !ctx.session.lock_state(LOCKOUT_USER).is_locked() {
            return Err(HarnessError::assertion(
                "lock state",
                "locked",
                format!("{:?}", ctx.session.lock_state(LOCKOUT_USER)),
            ));
        }

        // The right password is refused while blocked and is not counted
        let refused = ctx.session.login(&right).await?;
        if refused.is_authenticated() {
            return Err(mismatch("sign-in while blocked", "rejected", &refused));
        }
        assert_db_row(
            &ctx.db,
            failures_sql,
            &[json!(LOCKOUT_USER)],
            &row([("attempt_failed", json!(attempts))]),
        )?;

        ctx.session.wait_out_lockout(LOCKOUT_USER).await?;

        let notice = format!("{} failed login attempts logged.", attempts);
        match ctx.session.login(&right).await? {
            LoginOutcome::Authenticated { notice: Some(shown) } if shown.starts_with(&notice) => {}
            other => return Err(mismatch("sign-in after the block", &notice, &other)),
        }
        assert_db_row(
            &ctx.db,
            failures_sql,
            &[json!(LOCKOUT_USER)],
            &row([("attempt_failed", json!(0))]),
        )
    }
}

/// Sign in with a pre-issued session, then switch to the administrator
pub struct TokenLogin;

#[async_trait]
impl Case for TokenLogin {
    fn name(&self) -> &str {
        "token login"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        let token = ctx.fixture.require("token")?.to_string();
        let outcome = ctx.session.login_with_token(TOKEN_USER, &token).await?;
        if !outcome.is_authenticated() {
            return Err(mismatch("token sign-in", "authenticated", &outcome));
        }
        let user = ctx.session.text(&Locator::id("user-name")).await?;
        if user != TOKEN_USER {
            return Err(HarnessError::assertion("user after token sign-in", TOKEN_USER, user));
        }

        let admin = ctx.config.credentials.clone();
        let outcome = ctx.session.switch_user(&admin).await?;
        if !outcome.is_authenticated() {
            return Err(mismatch("switch user", "authenticated", &outcome));
        }
        let user = ctx.session.text(&Locator::id("user-name")).await?;
        if user != admin.username || ctx.session.identity() != Some(admin.username.as_str()) {
            return Err(HarnessError::assertion("user after switch", &admin.username, user));
        }

        // Switching signed the token session out
        assert_db_row(
            &ctx.db,
            "SELECT status FROM sessions WHERE sessionid = ?1",
            &[json!(token)],
            &row([("status", json!(1))]),
        )
    }
}

/// After signing out, protected pages show the sign-in form again
pub struct Logout;

#[async_trait]
impl Case for Logout {
    fn name(&self) -> &str {
        "logout"
    }

    async fn run(&self, ctx: &mut CaseContext) -> HarnessResult<()> {
        ctx.login_default().await?;
        ctx.session.logout().await?;
        if ctx.session.identity().is_some() {
            return Err(HarnessError::assertion("identity after sign-out", "none", "still signed in"));
        }
        ctx.session.open(DASHBOARD_ROUTE).await?;
        if !ctx.session.exists(&Locator::id("enter")).await? {
            return Err(HarnessError::assertion(
                format!("{} after sign-out", DASHBOARD_ROUTE),
                "sign-in form",
                ctx.session.current_route().await?,
            ));
        }
        Ok(())
    }
}
