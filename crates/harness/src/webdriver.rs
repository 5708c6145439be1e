//! Live browser sessions over WebDriver
//!
//! One [`WebDriverBrowser`] is one `thirtyfour` session against chromedriver
//! or geckodriver. Elements found through it are remembered by their
//! WebDriver element id, which is what [`ElementRef`] carries.

use async_trait::async_trait;
use std::collections::HashMap;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::{Capabilities, ChromiumLikeCapabilities};
use tracing::{debug, info};

use crate::config::{BrowserKind, WebDriverConfig};
use crate::driver::{Browser, Cookie, ElementRef, Launcher};
use crate::error::{HarnessError, HarnessResult};
use crate::selector::Selector;

pub struct WebDriverBrowser {
    driver: Option<WebDriver>,
    elements: HashMap<String, WebElement>,
}

impl WebDriverBrowser {
    /// Start a new browser session on a running driver
    pub async fn connect(driver_url: &str, config: &WebDriverConfig) -> HarnessResult<Self> {
        let driver = WebDriver::new(driver_url, capabilities(config)?).await?;
        driver
            .set_window_rect(0, 0, config.window_width as _, config.window_height as _)
            .await?;

        info!("Started {} session on {}", config.browser.as_str(), driver_url);
        Ok(Self {
            driver: Some(driver),
            elements: HashMap::new(),
        })
    }

    fn driver(&self) -> HarnessResult<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| HarnessError::WebDriver("session already closed".to_string()))
    }

    fn element(&self, element: &ElementRef) -> HarnessResult<&WebElement> {
        self.elements
            .get(&element.0)
            .ok_or_else(|| HarnessError::StaleElement(element.0.clone()))
    }

    fn remember(&mut self, found: Vec<WebElement>) -> Vec<ElementRef> {
        found
            .into_iter()
            .map(|element| {
                let id = element.element_id().to_string();
                self.elements.insert(id.clone(), element);
                ElementRef(id)
            })
            .collect()
    }

    async fn find(
        &mut self,
        parent: Option<&ElementRef>,
        selector: &Selector,
    ) -> HarnessResult<Vec<ElementRef>> {
        let (_, query) = selector.to_w3c();
        let by = match selector {
            Selector::Id(id) => By::Id(id),
            Selector::Name(name) => By::Name(name),
            Selector::Class(class) => By::ClassName(class),
            Selector::Css(_) => By::Css(&query),
            Selector::XPath(_) | Selector::ButtonText(_) => By::XPath(&query),
            Selector::LinkText(text) => By::LinkText(text),
        };
        debug!("find {}", selector);
        let found = match parent {
            Some(parent) => self.element(parent)?.find_all(by).await?,
            None => self.driver()?.find_all(by).await?,
        };
        Ok(self.remember(found))
    }
}

fn capabilities(config: &WebDriverConfig) -> HarnessResult<Capabilities> {
    Ok(match config.browser {
        BrowserKind::Chromium => {
            let mut caps = DesiredCapabilities::chrome();
            caps.add_arg("--no-sandbox")?;
            if config.headless {
                caps.add_arg("--headless=new")?;
            }
            caps.into()
        }
        BrowserKind::Firefox => {
            let mut caps = DesiredCapabilities::firefox();
            if config.headless {
                caps.set_headless()?;
            }
            caps.into()
        }
    })
}

impl From<WebDriverError> for HarnessError {
    fn from(e: WebDriverError) -> Self {
        match e {
            WebDriverError::NoSuchElement(..) => HarnessError::ElementNotFound(e.to_string()),
            WebDriverError::StaleElementReference(..) => HarnessError::StaleElement(e.to_string()),
            other => HarnessError::WebDriver(other.to_string()),
        }
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn navigate(&mut self, url: &str) -> HarnessResult<()> {
        self.elements.clear();
        self.driver()?.goto(url).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> HarnessResult<String> {
        Ok(self.driver()?.current_url().await?.to_string())
    }

    async fn ready_state(&mut self) -> HarnessResult<String> {
        let ret = self
            .driver()?
            .execute("return document.readyState;", Vec::new())
            .await?;
        Ok(ret.json().as_str().unwrap_or_default().to_string())
    }

    async fn find_elements(&mut self, selector: &Selector) -> HarnessResult<Vec<ElementRef>> {
        self.find(None, selector).await
    }

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        selector: &Selector,
    ) -> HarnessResult<Vec<ElementRef>> {
        self.find(Some(parent), selector).await
    }

    async fn text(&mut self, element: &ElementRef) -> HarnessResult<String> {
        Ok(self.element(element)?.text().await?)
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> HarnessResult<Option<String>> {
        Ok(self.element(element)?.attr(name).await?)
    }

    async fn value(&mut self, element: &ElementRef) -> HarnessResult<String> {
        Ok(self.element(element)?.prop("value").await?.unwrap_or_default())
    }

    async fn is_displayed(&mut self, element: &ElementRef) -> HarnessResult<bool> {
        Ok(self.element(element)?.is_displayed().await?)
    }

    async fn is_selected(&mut self, element: &ElementRef) -> HarnessResult<bool> {
        Ok(self.element(element)?.is_selected().await?)
    }

    async fn click(&mut self, element: &ElementRef) -> HarnessResult<()> {
        Ok(self.element(element)?.click().await?)
    }

    async fn clear(&mut self, element: &ElementRef) -> HarnessResult<()> {
        Ok(self.element(element)?.clear().await?)
    }

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> HarnessResult<()> {
        Ok(self.element(element)?.send_keys(text).await?)
    }

    async fn add_cookie(&mut self, cookie: &Cookie) -> HarnessResult<()> {
        let cookie = thirtyfour::Cookie::new(cookie.name.clone(), cookie.value.clone());
        Ok(self.driver()?.add_cookie(cookie).await?)
    }

    async fn delete_cookies(&mut self) -> HarnessResult<()> {
        Ok(self.driver()?.delete_all_cookies().await?)
    }

    async fn screenshot(&mut self) -> HarnessResult<Vec<u8>> {
        Ok(self.driver()?.screenshot_as_png().await?)
    }

    async fn quit(&mut self) -> HarnessResult<()> {
        self.elements.clear();
        match self.driver.take() {
            Some(driver) => Ok(driver.quit().await?),
            None => Ok(()),
        }
    }
}

/// Opens a new WebDriver session per group on a shared driver process
pub struct WebDriverLauncher {
    driver_url: String,
    config: WebDriverConfig,
}

impl WebDriverLauncher {
    pub fn new(driver_url: impl Into<String>, config: WebDriverConfig) -> Self {
        Self {
            driver_url: driver_url.into(),
            config,
        }
    }
}

#[async_trait]
impl Launcher for WebDriverLauncher {
    async fn launch(&self) -> HarnessResult<Box<dyn Browser>> {
        let browser = WebDriverBrowser::connect(&self.driver_url, &self.config).await?;
        Ok(Box::new(browser))
    }
}
