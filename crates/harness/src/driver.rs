//! Browser abstraction
//!
//! [`Browser`] is the seam between the harness and whatever renders the
//! pages: a W3C WebDriver session for live runs, or the in-process
//! simulated frontend used by the harness's own tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::HarnessResult;
use crate::selector::Selector;

/// Opaque handle to an element of the page it was found on.
///
/// A handle goes stale once the page is re-rendered; using it afterwards
/// yields [`HarnessError::StaleElement`](crate::HarnessError::StaleElement).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
pub trait Browser: Send {
    async fn navigate(&mut self, url: &str) -> HarnessResult<()>;

    async fn current_url(&mut self) -> HarnessResult<String>;

    /// `document.readyState` of the current page.
    async fn ready_state(&mut self) -> HarnessResult<String>;

    async fn find_elements(&mut self, selector: &Selector) -> HarnessResult<Vec<ElementRef>>;

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        selector: &Selector,
    ) -> HarnessResult<Vec<ElementRef>>;

    /// Rendered text; empty for hidden elements.
    async fn text(&mut self, element: &ElementRef) -> HarnessResult<String>;

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> HarnessResult<Option<String>>;

    /// Current `value` property of an input, textarea or select.
    async fn value(&mut self, element: &ElementRef) -> HarnessResult<String>;

    async fn is_displayed(&mut self, element: &ElementRef) -> HarnessResult<bool>;

    /// Checked state of a checkbox, selected state of an option.
    async fn is_selected(&mut self, element: &ElementRef) -> HarnessResult<bool>;

    async fn click(&mut self, element: &ElementRef) -> HarnessResult<()>;

    async fn clear(&mut self, element: &ElementRef) -> HarnessResult<()>;

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> HarnessResult<()>;

    async fn add_cookie(&mut self, cookie: &Cookie) -> HarnessResult<()>;

    async fn delete_cookies(&mut self) -> HarnessResult<()>;

    /// PNG screenshot of the viewport.
    async fn screenshot(&mut self) -> HarnessResult<Vec<u8>>;

    async fn quit(&mut self) -> HarnessResult<()>;
}

/// Opens a fresh browser for each group.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> HarnessResult<Box<dyn Browser>>;
}
