//! uiprobe harness
//!
//! Data-driven UI acceptance testing for web administration frontends:
//! - Sign-in sessions with a model of the application's login block
//! - Page navigation with bounded readiness waits and lazy element lookup
//! - Form filling (text, checkbox, select, multi-select, sub-table rows)
//! - GOOD/BAD banner, datastore-digest and read-back assertions
//! - Group fixtures with table backup/restore and case dependencies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SuiteRunner                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  for each Group:                                            │
//! │    BackupGuard::capture(tables)                             │
//! │    Fixture::before_group(db) -> FixtureState                │
//! │    Launcher::launch() -> Box<dyn Browser> -> Session        │
//! │    for case in DependencyGraph::execution_order():          │
//! │      skip if a prerequisite did not pass                    │
//! │      CaseRunner::run(ctx, index) per scenario               │
//! │    Fixture::after_group, Session::close, restore            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Browser: WebDriverBrowser (live) | simulated frontend      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assert;
pub mod case;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod form;
pub mod graph;
pub mod group;
pub mod lockout;
pub mod page;
pub mod process;
pub mod runner;
pub mod selector;
pub mod session;
pub mod table;
pub mod wait;
pub mod webdriver;

pub use assert::{
    assert_db_row, assert_db_unchanged, assert_expectation, assert_field_values, assert_message,
    assert_row_count, DbState, Outcome, StateProbe,
};
pub use case::{Case, CaseContext, CaseRunner, ScenarioCase};
pub use config::{BrowserKind, Credentials, HarnessConfig, WaitConfig, WebDriverConfig};
pub use dataset::{DataSet, Expectation, Scenario};
pub use driver::{Browser, Cookie, ElementRef, Launcher};
pub use error::{FailureKind, HarnessError, HarnessResult};
pub use fixture::{BackupGuard, Fixture, FixtureState, NoFixture};
pub use form::{FieldKey, FieldMap, FieldValue, Form, RowAction, RowOp, RowValues};
pub use graph::DependencyGraph;
pub use group::Group;
pub use lockout::{LockState, LockoutTracker};
pub use page::WaitState;
pub use process::DriverProcess;
pub use runner::{GroupResult, RunResult, RunStatus, SuiteResult, SuiteRunner};
pub use selector::{Locator, Selector};
pub use session::{LoginOutcome, Session};
pub use table::read_table;
pub use webdriver::{WebDriverBrowser, WebDriverLauncher};
