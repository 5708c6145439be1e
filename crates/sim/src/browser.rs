//! In-process [`Browser`] over the simulated frontend
//!
//! Element handles are `generation:node`. Every page load bumps the
//! generation, so handles from an earlier render come back as
//! [`HarnessError::StaleElement`].

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uiprobe_harness::{Browser, Cookie, ElementRef, HarnessError, HarnessResult, Launcher, Selector};

use crate::app::{CookieChange, FormData, Response, SimApp};
use crate::css::CssQuery;
use crate::dom::{Document, Node};
use crate::widgets::table_row;

/// 1x1 transparent PNG
const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

const SESSION_COOKIE: &str = "zbx_session";

/// Behaviour knobs of the simulated browser
#[derive(Debug, Clone)]
pub struct SimOptions {
    pub base_url: String,
    /// How many readiness polls report `loading` after each page load
    pub loading_polls: u32,
    /// Route prefixes whose pages never finish loading
    pub never_ready: Vec<String>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            base_url: "http://zabbix.sim/".to_string(),
            loading_polls: 1,
            never_ready: Vec::new(),
        }
    }
}

struct LoadedPage {
    route: String,
    doc: Document,
    never_ready: bool,
}

enum Matcher {
    Id(String),
    Name(String),
    Class(String),
    /// Nodes the CSS query matched on the current page
    Css(BTreeSet<usize>),
    Button(String),
    Link(String),
}

impl Matcher {
    fn compile(selector: &Selector, doc: &Document) -> HarnessResult<Self> {
        Ok(match selector {
            Selector::Id(v) => Matcher::Id(v.clone()),
            Selector::Name(v) => Matcher::Name(v.clone()),
            Selector::Class(v) => Matcher::Class(v.clone()),
            Selector::Css(v) => Matcher::Css(
                CssQuery::parse(v)
                    .map_err(|e| HarnessError::WebDriver(format!("invalid selector: {}", e)))?
                    .select(doc),
            ),
            Selector::ButtonText(v) => Matcher::Button(v.clone()),
            Selector::LinkText(v) => Matcher::Link(v.clone()),
            Selector::XPath(v) => {
                return Err(HarnessError::WebDriver(format!(
                    "invalid selector: xpath {:?} is not supported",
                    v
                )))
            }
        })
    }

    fn matches(&self, doc: &Document, id: usize) -> bool {
        let Some(node) = doc.node(id) else {
            return false;
        };
        match self {
            Matcher::Id(v) => node.attr("id") == Some(v.as_str()),
            Matcher::Name(v) => node.attr("name") == Some(v.as_str()),
            Matcher::Class(v) => node.has_class(v),
            Matcher::Css(hits) => hits.contains(&id),
            Matcher::Button(text) => node.is("button") && doc.text_content(id) == *text,
            Matcher::Link(text) => node.is("a") && doc.text_content(id) == *text,
        }
    }
}

pub struct SimBrowser {
    app: SimApp,
    options: SimOptions,
    page: Option<LoadedPage>,
    generation: u64,
    loading_left: u32,
    cookies: BTreeMap<String, String>,
}

impl SimBrowser {
    pub fn new(app: SimApp, options: SimOptions) -> Self {
        Self {
            app,
            options,
            page: None,
            generation: 0,
            loading_left: 0,
            cookies: BTreeMap::new(),
        }
    }

    fn route_of<'a>(&self, url: &'a str) -> &'a str {
        let base = self.options.base_url.trim_end_matches('/');
        url.strip_prefix(base)
            .unwrap_or(url)
            .trim_start_matches('/')
    }

    fn session(&self) -> Option<String> {
        self.cookies.get(SESSION_COOKIE).cloned()
    }

    fn load(&mut self, response: Response) {
        match response.cookie {
            CookieChange::Keep => {}
            CookieChange::Set(value) => {
                self.cookies.insert(SESSION_COOKIE.to_string(), value);
            }
            CookieChange::Clear => {
                self.cookies.remove(SESSION_COOKIE);
            }
        }
        let never_ready = self
            .options
            .never_ready
            .iter()
            .any(|prefix| response.route.starts_with(prefix.as_str()));
        self.generation += 1;
        self.loading_left = self.options.loading_polls;
        debug!("Loaded {} (generation {})", response.route, self.generation);
        self.page = Some(LoadedPage {
            route: response.route,
            doc: response.doc,
            never_ready,
        });
    }

    /// Load a hand-built document as if `route` had rendered it
    #[cfg(test)]
    pub(crate) fn show(&mut self, route: &str, doc: Document) {
        self.load(Response {
            route: route.to_string(),
            doc,
            cookie: CookieChange::Keep,
        });
    }

    fn page(&self) -> HarnessResult<&LoadedPage> {
        self.page
            .as_ref()
            .ok_or_else(|| HarnessError::WebDriver("no page loaded".to_string()))
    }

    /// Node id behind a handle, if the handle is still live
    fn resolve(&self, element: &ElementRef) -> HarnessResult<usize> {
        let stale = || HarnessError::StaleElement(element.to_string());
        let (generation, node) = element.0.split_once(':').ok_or_else(stale)?;
        let generation: u64 = generation.parse().map_err(|_| stale())?;
        let node: usize = node.parse().map_err(|_| stale())?;
        let page = self.page.as_ref().ok_or_else(stale)?;
        if generation != self.generation || !page.doc.is_attached(node) {
            return Err(stale());
        }
        Ok(node)
    }

    fn node(&self, element: &ElementRef) -> HarnessResult<(&Document, usize)> {
        let id = self.resolve(element)?;
        Ok((&self.page()?.doc, id))
    }

    fn handle(&self, node: usize) -> ElementRef {
        ElementRef(format!("{}:{}", self.generation, node))
    }

    fn search(&self, root: usize, selector: &Selector) -> HarnessResult<Vec<ElementRef>> {
        let Some(page) = &self.page else {
            return Ok(Vec::new());
        };
        let matcher = Matcher::compile(selector, &page.doc)?;
        Ok(page
            .doc
            .descendants(root)
            .into_iter()
            .filter(|n| matcher.matches(&page.doc, *n))
            .map(|n| self.handle(n))
            .collect())
    }

    fn doc_mut(&mut self) -> HarnessResult<&mut Document> {
        self.page
            .as_mut()
            .map(|p| &mut p.doc)
            .ok_or_else(|| HarnessError::WebDriver("no page loaded".to_string()))
    }

    fn submit(&mut self, form: usize, button: usize) -> HarnessResult<()> {
        let page = self.page()?;
        let doc = &page.doc;
        let mut data = FormData::new();
        for id in doc.descendants(form) {
            let Some(node) = doc.node(id) else { continue };
            let Some(name) = node.attr("name") else { continue };
            if node.is("input") {
                match node.input_type().as_str() {
                    "checkbox" | "radio" => {
                        if node.checked {
                            data.push((name.to_string(), node.attr("value").unwrap_or("on").to_string()));
                        }
                    }
                    "submit" | "button" => {}
                    _ => data.push((name.to_string(), node.value.clone())),
                }
            } else if node.is("textarea") {
                data.push((name.to_string(), node.value.clone()));
            } else if node.is("select") {
                for option in doc.descendants(id) {
                    if let Some(o) = doc.node(option).filter(|o| o.is("option") && o.checked) {
                        data.push((name.to_string(), option_value(o)));
                    }
                }
            }
        }
        if let Some(node) = doc.node(button) {
            if let Some(name) = node.attr("name") {
                data.push((name.to_string(), node.attr("value").unwrap_or_default().to_string()));
            }
        }
        let action = doc
            .node(form)
            .and_then(|f| f.attr("action"))
            .map(str::to_string)
            .unwrap_or_else(|| page.route.clone());

        let session = self.session();
        let response = self.app.post(&action, &data, session.as_deref());
        self.load(response);
        Ok(())
    }

    fn open_route(&mut self, route: &str) {
        let session = self.session();
        let response = self.app.get(route, session.as_deref());
        self.load(response);
    }

    fn add_table_row(&mut self, table: usize) -> HarnessResult<()> {
        let doc = self.doc_mut()?;
        let Some(node) = doc.node(table) else {
            return Ok(());
        };
        let prefix = node.attr("data-prefix").unwrap_or_default().to_string();
        let columns: Vec<String> = node
            .attr("data-columns")
            .unwrap_or_default()
            .split(',')
            .map(str::to_string)
            .collect();
        let next: usize = node
            .attr("data-next")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let Some(body) = doc
            .descendants(table)
            .into_iter()
            .find(|n| doc.node(*n).map(|n| n.is("tbody")).unwrap_or(false))
        else {
            return Ok(());
        };
        let blanks: Vec<String> = vec![String::new(); columns.len()];
        doc.mount(body, table_row(&prefix, next, &columns, &blanks));
        if let Some(node) = doc.node_mut(table) {
            node.attrs.insert("data-next".to_string(), (next + 1).to_string());
        }
        Ok(())
    }

    fn toggle_option(&mut self, option: usize) -> HarnessResult<()> {
        let doc = self.doc_mut()?;
        let Some(select) = doc.closest(option, "select") else {
            return Ok(());
        };
        let multiple = doc
            .node(select)
            .map(|s| s.attr("multiple").is_some())
            .unwrap_or(false);
        if multiple {
            if let Some(node) = doc.node_mut(option) {
                node.checked = !node.checked;
            }
            return Ok(());
        }
        for other in doc.descendants(select) {
            if let Some(node) = doc.node_mut(other) {
                node.checked = other == option;
            }
        }
        Ok(())
    }
}

fn option_value(option: &Node) -> String {
    option
        .attr("value")
        .map(str::to_string)
        .unwrap_or_else(|| option.text.trim().to_string())
}

#[async_trait]
impl Browser for SimBrowser {
    async fn navigate(&mut self, url: &str) -> HarnessResult<()> {
        let route = self.route_of(url).to_string();
        self.open_route(&route);
        Ok(())
    }

    async fn current_url(&mut self) -> HarnessResult<String> {
        let route = self.page.as_ref().map(|p| p.route.as_str()).unwrap_or("");
        Ok(format!("{}/{}", self.options.base_url.trim_end_matches('/'), route))
    }

    async fn ready_state(&mut self) -> HarnessResult<String> {
        let Some(page) = &self.page else {
            return Ok("complete".to_string());
        };
        if page.never_ready {
            return Ok("loading".to_string());
        }
        if self.loading_left > 0 {
            self.loading_left -= 1;
            return Ok("loading".to_string());
        }
        Ok("complete".to_string())
    }

    async fn find_elements(&mut self, selector: &Selector) -> HarnessResult<Vec<ElementRef>> {
        self.search(Document::ROOT, selector)
    }

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        selector: &Selector,
    ) -> HarnessResult<Vec<ElementRef>> {
        let root = self.resolve(parent)?;
        self.search(root, selector)
    }

    async fn text(&mut self, element: &ElementRef) -> HarnessResult<String> {
        let (doc, id) = self.node(element)?;
        if !doc.is_displayed(id) {
            return Ok(String::new());
        }
        Ok(doc.text_content(id))
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> HarnessResult<Option<String>> {
        let (doc, id) = self.node(element)?;
        Ok(doc.node(id).and_then(|n| n.attr(name)).map(str::to_string))
    }

    async fn value(&mut self, element: &ElementRef) -> HarnessResult<String> {
        let (doc, id) = self.node(element)?;
        let Some(node) = doc.node(id) else {
            return Ok(String::new());
        };
        if node.is("select") {
            return Ok(doc
                .descendants(id)
                .into_iter()
                .filter_map(|o| doc.node(o))
                .find(|o| o.is("option") && o.checked)
                .map(option_value)
                .unwrap_or_default());
        }
        if node.is("input") && node.input_type() == "checkbox" {
            return Ok(node.attr("value").unwrap_or("on").to_string());
        }
        if node.is("option") {
            return Ok(option_value(node));
        }
        Ok(node.value.clone())
    }

    async fn is_displayed(&mut self, element: &ElementRef) -> HarnessResult<bool> {
        let (doc, id) = self.node(element)?;
        Ok(doc.is_displayed(id))
    }

    async fn is_selected(&mut self, element: &ElementRef) -> HarnessResult<bool> {
        let (doc, id) = self.node(element)?;
        Ok(doc.node(id).map(|n| n.checked).unwrap_or(false))
    }

    async fn click(&mut self, element: &ElementRef) -> HarnessResult<()> {
        let (doc, id) = self.node(element)?;
        if !doc.is_displayed(id) {
            return Err(HarnessError::WebDriver(format!(
                "element not interactable: {}",
                element
            )));
        }
        let Some(node) = doc.node(id) else {
            return Ok(());
        };

        if node.is("input") && node.input_type() == "checkbox" {
            if let Some(node) = self.doc_mut()?.node_mut(id) {
                node.checked = !node.checked;
            }
            return Ok(());
        }
        if node.is("option") {
            return self.toggle_option(id);
        }
        if node.is("a") {
            if let Some(href) = node.attr("href").map(str::to_string) {
                self.open_route(&href);
            }
            return Ok(());
        }
        if !node.is("button") {
            return Ok(());
        }

        if node.has_class("element-table-add") {
            return match doc.closest(id, "table") {
                Some(table) => self.add_table_row(table),
                None => Ok(()),
            };
        }
        if node.has_class("element-table-remove") {
            if let Some(row) = doc.closest(id, "tr") {
                self.doc_mut()?.remove(row);
            }
            return Ok(());
        }
        if let Some(href) = node.attr("data-href").map(str::to_string) {
            self.open_route(&href);
            return Ok(());
        }
        if node.input_type() == "submit" {
            if let Some(form) = doc.closest(id, "form") {
                return self.submit(form, id);
            }
        }
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> HarnessResult<()> {
        let id = self.resolve(element)?;
        if let Some(node) = self.doc_mut()?.node_mut(id) {
            node.value.clear();
        }
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> HarnessResult<()> {
        let id = self.resolve(element)?;
        if let Some(node) = self.doc_mut()?.node_mut(id) {
            node.value.push_str(text);
        }
        Ok(())
    }

    async fn add_cookie(&mut self, cookie: &Cookie) -> HarnessResult<()> {
        self.cookies.insert(cookie.name.clone(), cookie.value.clone());
        Ok(())
    }

    async fn delete_cookies(&mut self) -> HarnessResult<()> {
        self.cookies.clear();
        Ok(())
    }

    async fn screenshot(&mut self) -> HarnessResult<Vec<u8>> {
        Ok(BLANK_PNG.to_vec())
    }

    async fn quit(&mut self) -> HarnessResult<()> {
        self.page = None;
        self.cookies.clear();
        Ok(())
    }
}

/// Hands out a fresh [`SimBrowser`] per group, all sharing one app.
#[derive(Clone)]
pub struct SimLauncher {
    app: SimApp,
    options: SimOptions,
}

impl SimLauncher {
    pub fn new(app: SimApp, options: SimOptions) -> Self {
        Self { app, options }
    }

    pub fn app(&self) -> &SimApp {
        &self.app
    }
}

#[async_trait]
impl Launcher for SimLauncher {
    async fn launch(&self) -> HarnessResult<Box<dyn Browser>> {
        Ok(Box::new(SimBrowser::new(self.app.clone(), self.options.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::El;
    use uiprobe_common::{Database, LockoutPolicy};
    use uiprobe_harness::{assert_message, HarnessConfig, Outcome, Session, WaitConfig};

    fn browser() -> SimBrowser {
        let app = SimApp::new(Database::open_memory().unwrap(), LockoutPolicy::default()).unwrap();
        SimBrowser::new(app, SimOptions::default())
    }

    async fn first(b: &mut SimBrowser, css: &str) -> ElementRef {
        b.find_elements(&Selector::css(css)).await.unwrap().remove(0)
    }

    async fn sign_in(b: &mut SimBrowser) {
        b.navigate("http://zabbix.sim/index.php").await.unwrap();
        let name = first(b, "#name").await;
        b.send_keys(&name, "Admin").await.unwrap();
        let password = first(b, "#password").await;
        b.send_keys(&password, "zabbix").await.unwrap();
        let enter = first(b, "#enter").await;
        b.click(&enter).await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_in_sets_cookie() {
        let mut b = browser();
        sign_in(&mut b).await;
        assert!(b.cookies.contains_key(SESSION_COOKIE));
        assert_eq!(
            b.current_url().await.unwrap(),
            "http://zabbix.sim/zabbix.php?action=dashboard.view"
        );
    }

    #[tokio::test]
    async fn test_ready_state_polls() {
        let mut b = browser();
        b.navigate("http://zabbix.sim/index.php").await.unwrap();
        assert_eq!(b.ready_state().await.unwrap(), "loading");
        assert_eq!(b.ready_state().await.unwrap(), "complete");
    }

    #[tokio::test]
    async fn test_handles_go_stale_on_reload() {
        let mut b = browser();
        b.navigate("http://zabbix.sim/index.php").await.unwrap();
        let name = first(&mut b, "#name").await;
        b.navigate("http://zabbix.sim/index.php").await.unwrap();
        assert!(matches!(b.value(&name).await, Err(HarnessError::StaleElement(_))));
    }

    #[tokio::test]
    async fn test_table_rows_add_and_remove() {
        let mut b = browser();
        sign_in(&mut b).await;
        b.navigate("http://zabbix.sim/zabbix.php?action=host.edit").await.unwrap();
        let table = first(&mut b, "#tags-table").await;
        let rows = Selector::css("tr.form_row");
        assert!(b.find_within(&table, &rows).await.unwrap().is_empty());

        let add = b
            .find_within(&table, &Selector::css("button.element-table-add"))
            .await
            .unwrap()
            .remove(0);
        b.click(&add).await.unwrap();
        b.click(&add).await.unwrap();
        let found = b.find_within(&table, &rows).await.unwrap();
        assert_eq!(found.len(), 2);
        let inputs = b.find_within(&found[1], &Selector::css("input")).await.unwrap();
        assert_eq!(b.attribute(&inputs[0], "name").await.unwrap().as_deref(), Some("tags[1][tag]"));

        let remove = b
            .find_within(&found[0], &Selector::css("button.element-table-remove"))
            .await
            .unwrap()
            .remove(0);
        b.click(&remove).await.unwrap();
        assert_eq!(b.find_within(&table, &rows).await.unwrap().len(), 1);
        assert!(matches!(b.text(&found[0]).await, Err(HarnessError::StaleElement(_))));
    }

    #[tokio::test]
    async fn test_single_select_moves_selection() {
        let mut b = browser();
        sign_in(&mut b).await;
        b.navigate("http://zabbix.sim/zabbix.php?action=mediatype.edit").await.unwrap();
        let select = first(&mut b, "#type").await;
        assert_eq!(b.value(&select).await.unwrap(), "0");
        let options = b.find_within(&select, &Selector::css("option")).await.unwrap();
        b.click(&options[1]).await.unwrap();
        assert_eq!(b.value(&select).await.unwrap(), "1");
        assert!(!b.is_selected(&options[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_xpath_is_rejected() {
        let mut b = browser();
        b.navigate("http://zabbix.sim/index.php").await.unwrap();
        let result = b.find_elements(&Selector::XPath("//div".into())).await;
        assert!(matches!(result, Err(HarnessError::WebDriver(_))));
    }

    fn banner_page(hidden: bool) -> Document {
        Document::from_elements([El::new("body").child(
            El::new("output")
                .class("msg-good")
                .hidden(hidden)
                .child(El::new("span").class("msg-title").text("Host added")),
        )])
    }

    fn quick_session(b: SimBrowser) -> Session {
        let config = HarnessConfig {
            wait: WaitConfig {
                timeout_ms: 300,
                poll_interval_ms: 10,
            },
            ..HarnessConfig::default()
        };
        Session::new(Box::new(b), &config)
    }

    #[tokio::test]
    async fn test_hidden_banner_is_not_a_message() {
        let mut b = browser();
        b.show("zabbix.php?action=host.list", banner_page(true));
        let mut session = quick_session(b);
        let err = assert_message(&mut session, Outcome::Good, "Host added", &[] as &[&str])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no message shown"));
    }

    #[tokio::test]
    async fn test_visible_banner_is_a_message() {
        let mut b = browser();
        b.show("zabbix.php?action=host.list", banner_page(false));
        let mut session = quick_session(b);
        assert_message(&mut session, Outcome::Good, "Host added", &[] as &[&str])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_css_is_rejected() {
        let mut b = browser();
        b.navigate("http://zabbix.sim/index.php").await.unwrap();
        match b.find_elements(&Selector::css("input[name=")).await {
            Err(e @ HarnessError::WebDriver(_)) => {
                assert!(e.to_string().contains("invalid selector"));
                assert_eq!(e.kind(), uiprobe_harness::FailureKind::Environment);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_css_combinators_on_page() {
        let mut b = browser();
        b.navigate("http://zabbix.sim/index.php").await.unwrap();
        let direct = b.find_elements(&Selector::css("body > header")).await.unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(b.find_elements(&Selector::css("#login-form input")).await.unwrap().len(), 2);
        assert!(b.find_elements(&Selector::css("#login-form > input")).await.unwrap().is_empty());
        assert_eq!(b.find_elements(&Selector::css("#login-form > button")).await.unwrap().len(), 1);
    }
}
