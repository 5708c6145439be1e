//! Element selectors and lazy locator chains
//!
//! A [`Locator`] never caches what it found: every access resolves the chain
//! again against the current page, so re-rendered pages never hand out a
//! stale element.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One way of matching elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Selector {
    Id(String),
    Name(String),
    Class(String),
    Css(String),
    XPath(String),
    /// A `<button>` whose normalized text equals the value
    ButtonText(String),
    /// An `<a>` whose text equals the value
    LinkText(String),
}

impl Selector {
    pub fn id(value: impl Into<String>) -> Self {
        Selector::Id(value.into())
    }

    pub fn name(value: impl Into<String>) -> Self {
        Selector::Name(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Selector::Css(value.into())
    }

    pub fn button(text: impl Into<String>) -> Self {
        Selector::ButtonText(text.into())
    }

    pub fn link(text: impl Into<String>) -> Self {
        Selector::LinkText(text.into())
    }

    /// Translate to a W3C WebDriver `(using, value)` pair.
    pub fn to_w3c(&self) -> (&'static str, String) {
        match self {
            Selector::Id(id) => ("css selector", format!("[id=\"{}\"]", css_escape(id))),
            Selector::Name(name) => ("css selector", format!("[name=\"{}\"]", css_escape(name))),
            Selector::Class(class) => ("css selector", format!(".{}", class)),
            Selector::Css(css) => ("css selector", css.clone()),
            Selector::XPath(xpath) => ("xpath", xpath.clone()),
            Selector::ButtonText(text) => (
                "xpath",
                format!(".//button[normalize-space(.)={}]", xpath_literal(text)),
            ),
            Selector::LinkText(text) => ("link text", text.clone()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Id(v) => write!(f, "id:{}", v),
            Selector::Name(v) => write!(f, "name:{}", v),
            Selector::Class(v) => write!(f, "class:{}", v),
            Selector::Css(v) => write!(f, "css:{}", v),
            Selector::XPath(v) => write!(f, "xpath:{}", v),
            Selector::ButtonText(v) => write!(f, "button:{}", v),
            Selector::LinkText(v) => write!(f, "link:{}", v),
        }
    }
}

/// Parses `prefix:value`; a string without a known prefix is CSS.
impl FromStr for Selector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.split_once(':') {
            Some(("id", v)) => Selector::Id(v.to_string()),
            Some(("name", v)) => Selector::Name(v.to_string()),
            Some(("class", v)) => Selector::Class(v.to_string()),
            Some(("css", v)) => Selector::Css(v.to_string()),
            Some(("xpath", v)) => Selector::XPath(v.to_string()),
            Some(("button", v)) => Selector::ButtonText(v.to_string()),
            Some(("link", v)) => Selector::LinkText(v.to_string()),
            _ => Selector::Css(s.to_string()),
        };
        Ok(parsed)
    }
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// A chain of selectors, each searched within the matches of the previous
/// one, optionally narrowed to the n-th match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    chain: Vec<Selector>,
    nth: Option<usize>,
}

impl Locator {
    pub fn new(selector: Selector) -> Self {
        Self {
            chain: vec![selector],
            nth: None,
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Selector::id(value))
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(Selector::css(value))
    }

    /// Narrow to descendants of the current matches.
    pub fn within(mut self, selector: Selector) -> Self {
        self.chain.push(selector);
        self.nth = None;
        self
    }

    /// Pick the n-th (0-based) match of the full chain.
    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    pub fn chain(&self) -> &[Selector] {
        &self.chain
    }

    pub fn index(&self) -> Option<usize> {
        self.nth
    }
}

impl From<Selector> for Locator {
    fn from(selector: Selector) -> Self {
        Locator::new(selector)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        let selector = match s.parse::<Selector>() {
            Ok(sel) => sel,
            Err(never) => match never {},
        };
        Locator::new(selector)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.chain.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(" >> "))?;
        if let Some(n) = self.nth {
            write!(f, " [{}]", n)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("id:hk_audit", Selector::Id("hk_audit".into()) ; "id prefix")]
    #[test_case("name:groups[]", Selector::Name("groups[]".into()) ; "name prefix")]
    #[test_case("button:Add", Selector::ButtonText("Add".into()) ; "button prefix")]
    #[test_case("xpath://div[@id='x']", Selector::XPath("//div[@id='x']".into()) ; "xpath keeps colons")]
    #[test_case("form .msg-good", Selector::Css("form .msg-good".into()) ; "plain css")]
    fn test_parse(input: &str, expected: Selector) {
        assert_eq!(input.parse::<Selector>().unwrap(), expected);
    }

    #[test]
    fn test_w3c_button_text() {
        let (using, value) = Selector::button("Reset defaults").to_w3c();
        assert_eq!(using, "xpath");
        assert_eq!(value, ".//button[normalize-space(.)='Reset defaults']");
    }

    #[test]
    fn test_xpath_literal_quotes() {
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal("a'b\"c"),
            "concat('a', \"'\", 'b\"c')"
        );
    }

    #[test]
    fn test_locator_display() {
        let loc = Locator::id("tags-table")
            .within(Selector::css("tr.form_row"))
            .nth(2);
        assert_eq!(loc.to_string(), "id:tags-table >> css:tr.form_row [2]");
        assert_eq!(loc.chain().len(), 2);
    }
}
