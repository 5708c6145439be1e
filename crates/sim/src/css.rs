//! CSS selector matching through `scraper`
//!
//! The page is serialized to HTML with every element tagged by its node id,
//! parsed with [`Html`], and the selector is run there. Hits map back to
//! node ids through the tag.

use scraper::{Html, Selector};
use std::collections::BTreeSet;

use crate::dom::Document;

const NODE_ATTR: &str = "data-sim-node";

const VOID: &[&str] = &["area", "br", "col", "hr", "img", "input", "link", "meta", "wbr"];

/// A parsed CSS selector list
#[derive(Debug, Clone)]
pub struct CssQuery(Selector);

impl CssQuery {
    pub fn parse(input: &str) -> Result<Self, String> {
        Selector::parse(input)
            .map(Self)
            .map_err(|e| format!("{:?}: {:?}", input, e))
    }

    /// Ids of every attached node the selector matches
    pub fn select(&self, doc: &Document) -> BTreeSet<usize> {
        let html = Html::parse_document(&render(doc));
        html.select(&self.0)
            .filter_map(|el| el.value().attr(NODE_ATTR))
            .filter_map(|id| id.parse().ok())
            .collect()
    }
}

/// Serialize the attached part of the document
pub fn render(doc: &Document) -> String {
    let mut out = String::from("<!DOCTYPE html>");
    render_node(doc, Document::ROOT, &mut out);
    out
}

fn render_node(doc: &Document, id: usize, out: &mut String) {
    let Some(node) = doc.node(id) else {
        return;
    };
    if node.detached {
        return;
    }
    let tag = node.tag.to_ascii_lowercase();
    out.push('<');
    out.push_str(&tag);
    out.push_str(&format!(" {}=\"{}\"", NODE_ATTR, id));
    for (name, value) in &node.attrs {
        out.push_str(&format!(" {}=\"{}\"", name, escape(value, true)));
    }
    out.push('>');
    if VOID.contains(&tag.as_str()) {
        return;
    }
    out.push_str(&escape(&node.text, false));
    for child in &node.children {
        render_node(doc, *child, out);
    }
    out.push_str(&format!("</{}>", tag));
}

fn escape(value: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::El;
    use test_case::test_case;

    fn doc() -> Document {
        Document::from_elements([El::new("form").id("host-form").children([
            El::new("table").id("tags-table").child(
                El::new("tbody").child(
                    El::new("tr").class("form_row").children([
                        El::new("td").child(El::new("input").attr("type", "text").name("tags[0][tag]")),
                        El::new("td").child(El::new("textarea").name("tags[0][value]").text("a < b")),
                        El::new("td").child(
                            El::new("button")
                                .attr("type", "button")
                                .class("element-table-remove btn-link"),
                        ),
                    ]),
                ),
            ),
            El::new("output")
                .class("msg-bad")
                .child(El::new("span").class("msg-title").text("Cannot \"add\" & <retry>")),
        ])])
    }

    fn count(selector: &str) -> usize {
        CssQuery::parse(selector).unwrap().select(&doc()).len()
    }

    #[test_case("tr.form_row", 1 ; "tag and class")]
    #[test_case("input, textarea", 2 ; "comma list")]
    #[test_case("#tags-table button.element-table-remove", 1 ; "descendant")]
    #[test_case("button.btn-link.element-table-remove", 1 ; "two classes")]
    #[test_case("[name='tags[0][tag]']", 1 ; "quoted attribute with brackets")]
    #[test_case("input[type=text]", 1 ; "attribute value")]
    #[test_case(".msg-bad .msg-title", 1 ; "banner title")]
    #[test_case(".msg-good .msg-title", 0 ; "no match")]
    #[test_case("form > output", 1 ; "child combinator")]
    #[test_case("tr > td:first-child input", 1 ; "structural pseudo class")]
    #[test_case("td ~ td", 2 ; "sibling combinator")]
    fn test_matching(selector: &str, expected: usize) {
        assert_eq!(count(selector), expected);
    }

    #[test]
    fn test_hits_map_to_node_ids() {
        let d = doc();
        let form = d.find_by_id("host-form").unwrap();
        let hits = CssQuery::parse("#host-form").unwrap().select(&d);
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![form]);
    }

    #[test]
    fn test_detached_nodes_do_not_match() {
        let mut d = doc();
        let table = d.find_by_id("tags-table").unwrap();
        d.remove(table);
        assert!(CssQuery::parse("input").unwrap().select(&d).is_empty());
    }

    #[test_case("" ; "empty")]
    #[test_case("input[" ; "unclosed attribute")]
    #[test_case("li:no-such-pseudo" ; "unknown pseudo class")]
    #[test_case("div >" ; "dangling combinator")]
    fn test_rejects_invalid(selector: &str) {
        let err = CssQuery::parse(selector).unwrap_err();
        assert!(err.starts_with(&format!("{:?}", selector)));
    }

    #[test]
    fn test_render_escapes_text_and_attributes() {
        let html = render(&doc());
        assert!(html.contains("a &lt; b"));
        assert!(html.contains("Cannot \"add\" &amp; &lt;retry&gt;"));
        assert!(!html.contains("</input>"));
    }
}
