//! Page navigation, readiness waits and element resolution

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::ElementRef;
use crate::error::{HarnessError, HarnessResult};
use crate::selector::Locator;
use crate::session::Session;
use crate::wait::Deadline;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl Session {
    /// Navigate to a route and wait until the page is ready.
    pub async fn open(&mut self, route: &str) -> HarnessResult<()> {
        let url = self.url(route);
        debug!("Opening {}", url);
        self.browser.navigate(&url).await?;
        self.wait_until_ready().await
    }

    /// Poll `document.readyState` until it reports `complete`.
    pub async fn wait_until_ready(&mut self) -> HarnessResult<()> {
        let deadline = Deadline::new(&self.wait);
        loop {
            if self.browser.ready_state().await? == "complete" {
                return Ok(());
            }
            let url = self.browser.current_url().await.unwrap_or_default();
            deadline.tick(|| format!("page ready: {}", url)).await?;
        }
    }

    /// Route of the current page relative to the frontend root
    pub async fn current_route(&mut self) -> HarnessResult<String> {
        let url = self.browser.current_url().await?;
        let base = self.base_url.trim_end_matches('/');
        Ok(url
            .strip_prefix(base)
            .map(|r| r.trim_start_matches('/').to_string())
            .unwrap_or(url))
    }

    async fn ensure_ready(&mut self) -> HarnessResult<()> {
        if self.browser.ready_state().await? != "complete" {
            self.wait_until_ready().await?;
        }
        Ok(())
    }

    /// Resolve every element matched by the locator right now.
    pub async fn find_all(&mut self, locator: &Locator) -> HarnessResult<Vec<ElementRef>> {
        self.ensure_ready().await?;
        self.resolve_all(locator).await
    }

    async fn resolve_all(&mut self, locator: &Locator) -> HarnessResult<Vec<ElementRef>> {
        let mut chain = locator.chain().iter();
        let Some(first) = chain.next() else {
            return Ok(Vec::new());
        };
        let mut found = self.browser.find_elements(first).await?;
        for selector in chain {
            let mut next = Vec::new();
            for parent in &found {
                for element in self.browser.find_within(parent, selector).await? {
                    if !next.contains(&element) {
                        next.push(element);
                    }
                }
            }
            found = next;
        }
        match locator.index() {
            Some(n) => Ok(found.into_iter().nth(n).into_iter().collect()),
            None => Ok(found),
        }
    }

    /// Whether the locator matches anything right now. Does not wait.
    pub async fn exists(&mut self, locator: &Locator) -> HarnessResult<bool> {
        Ok(!self.find_all(locator).await?.is_empty())
    }

    /// First displayed match right now. Does not wait.
    pub async fn visible(&mut self, locator: &Locator) -> HarnessResult<Option<ElementRef>> {
        let found = self.find_all(locator).await?;
        self.first_displayed(&found).await
    }

    async fn first_displayed(&mut self, found: &[ElementRef]) -> HarnessResult<Option<ElementRef>> {
        for element in found {
            match self.browser.is_displayed(element).await {
                Ok(true) => return Ok(Some(element.clone())),
                Ok(false) | Err(HarnessError::StaleElement(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Resolve the first match, polling until it appears.
    pub async fn find(&mut self, locator: &Locator) -> HarnessResult<ElementRef> {
        self.ensure_ready().await?;
        let deadline = Deadline::new(&self.wait);
        loop {
            if let Some(element) = self.resolve_all(locator).await?.into_iter().next() {
                return Ok(element);
            }
            if deadline.expired() {
                return Err(HarnessError::ElementNotFound(locator.to_string()));
            }
            deadline.tick(|| locator.to_string()).await?;
        }
    }

    /// Wait until the locator reaches `state`. Returns the element for the
    /// `Visible` and `Attached` states.
    pub async fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
    ) -> HarnessResult<Option<ElementRef>> {
        self.ensure_ready().await?;
        let deadline = Deadline::new(&self.wait);
        loop {
            let found = self.resolve_all(locator).await?;
            let visible = self.first_displayed(&found).await?;
            let reached = match state {
                WaitState::Visible => visible.clone(),
                WaitState::Attached => found.first().cloned(),
                WaitState::Hidden if visible.is_none() => return Ok(None),
                WaitState::Detached if found.is_empty() => return Ok(None),
                _ => None,
            };
            if reached.is_some() {
                return Ok(reached);
            }
            deadline
                .tick(|| format!("{} to be {:?}", locator, state))
                .await?;
        }
    }

    /// Click the element, resolving the locator again if the first handle
    /// went stale between lookup and click.
    pub async fn click(&mut self, locator: &Locator) -> HarnessResult<()> {
        let element = self.find(locator).await?;
        match self.browser.click(&element).await {
            Err(HarnessError::StaleElement(_)) => {
                let element = self.find(locator).await?;
                self.browser.click(&element).await
            }
            other => other,
        }
    }

    pub async fn text(&mut self, locator: &Locator) -> HarnessResult<String> {
        let element = self.find(locator).await?;
        Ok(self.browser.text(&element).await?.trim().to_string())
    }

    pub async fn value(&mut self, locator: &Locator) -> HarnessResult<String> {
        let element = self.find(locator).await?;
        self.browser.value(&element).await
    }

    /// Replace an input's content.
    pub async fn fill_text(&mut self, locator: &Locator, text: &str) -> HarnessResult<()> {
        let element = self.find(locator).await?;
        self.browser.clear(&element).await?;
        if !text.is_empty() {
            self.browser.send_keys(&element, text).await?;
        }
        Ok(())
    }
}
