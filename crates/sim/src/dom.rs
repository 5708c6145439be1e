//! Minimal document tree
//!
//! Nodes live in an arena and are never reused; removing a node only
//! detaches its subtree, so stale element ids can still be recognized.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    /// `value` property of inputs and textareas
    pub value: String,
    /// Checked checkbox or selected option
    pub checked: bool,
    pub hidden: bool,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub detached: bool,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|x| x == class))
            .unwrap_or(false)
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// `type` attribute, lower-cased; buttons default to `submit`
    pub fn input_type(&self) -> String {
        match self.attr("type") {
            Some(t) => t.to_ascii_lowercase(),
            None if self.is("button") => "submit".to_string(),
            None => "text".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                tag: "html".to_string(),
                ..Node::default()
            }],
        }
    }

    /// Build a document whose root holds the given elements
    pub fn from_elements(elements: impl IntoIterator<Item = El>) -> Self {
        let mut doc = Self::new();
        for el in elements {
            doc.mount(Self::ROOT, el);
        }
        doc
    }

    /// Append an element tree under `parent`, returning the new node id.
    pub fn mount(&mut self, parent: usize, el: El) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            tag: el.tag,
            attrs: el.attrs,
            text: el.text,
            value: el.value,
            checked: el.checked,
            hidden: el.hidden,
            parent: Some(parent),
            children: Vec::new(),
            detached: false,
        });
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(id);
        }
        for child in el.children {
            self.mount(id, child);
        }
        id
    }

    pub fn node(&self, id: usize) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: usize) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn parent(&self, id: usize) -> Option<usize> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn is_attached(&self, id: usize) -> bool {
        self.nodes.get(id).map(|n| !n.detached).unwrap_or(false)
    }

    /// Attached descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = match self.nodes.get(id) {
            Some(n) => n.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if node.detached {
                continue;
            }
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// `id` itself or its nearest ancestor with the given tag
    pub fn closest(&self, id: usize, tag: &str) -> Option<usize> {
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.nodes.get(n)?;
            if node.is(tag) {
                return Some(n);
            }
            current = node.parent;
        }
        None
    }

    pub fn is_displayed(&self, id: usize) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            match self.nodes.get(n) {
                Some(node) if !node.hidden && !node.detached => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Rendered text of a subtree: non-empty pieces joined by newlines,
    /// hidden subtrees left out.
    pub fn text_content(&self, id: usize) -> String {
        let mut pieces = Vec::new();
        self.collect_text(id, &mut pieces);
        pieces.join("\n")
    }

    fn collect_text(&self, id: usize, pieces: &mut Vec<String>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if node.hidden || node.detached {
            return;
        }
        let own = node.text.trim();
        if !own.is_empty() {
            pieces.push(own.to_string());
        }
        for child in &node.children {
            self.collect_text(*child, pieces);
        }
    }

    /// Detach a subtree from the document.
    pub fn remove(&mut self, id: usize) {
        if id == Self::ROOT {
            return;
        }
        if let Some(parent) = self.parent(id) {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(n) {
                node.detached = true;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    pub fn find_by_id(&self, element_id: &str) -> Option<usize> {
        self.descendants(Self::ROOT)
            .into_iter()
            .find(|n| self.nodes[*n].attr("id") == Some(element_id))
    }
}

/// Declarative element builder
#[derive(Debug, Clone, Default)]
pub struct El {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: String,
    checked: bool,
    hidden: bool,
    children: Vec<El>,
}

impl El {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.attr("name", name)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn child(mut self, child: El) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = El>) -> Self {
        self.children.extend(children);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::from_elements([El::new("div").id("outer").children([
            El::new("span").text("first"),
            El::new("p").id("inner").text("second").child(El::new("b").text("bold")),
            El::new("span").text("hidden").hidden(true),
        ])])
    }

    #[test]
    fn test_text_content_skips_hidden() {
        let doc = sample();
        let outer = doc.find_by_id("outer").unwrap();
        assert_eq!(doc.text_content(outer), "first\nsecond\nbold");
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let mut doc = sample();
        let inner = doc.find_by_id("inner").unwrap();
        let bold = doc.descendants(inner)[0];
        doc.remove(inner);
        assert!(!doc.is_attached(inner));
        assert!(!doc.is_attached(bold));
        assert!(doc.find_by_id("inner").is_none());
    }

    #[test]
    fn test_closest_and_display() {
        let doc = sample();
        let inner = doc.find_by_id("inner").unwrap();
        let bold = doc.descendants(inner)[0];
        assert_eq!(doc.closest(bold, "div"), doc.find_by_id("outer"));
        assert!(doc.is_displayed(bold));
        let hidden = *doc.descendants(doc.find_by_id("outer").unwrap()).last().unwrap();
        assert!(!doc.is_displayed(hidden));
    }
}
