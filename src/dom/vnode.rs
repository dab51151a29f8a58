//! Virtual nodes and selectors.
//!
//! Nodes are built with hyperscript-style helpers. The selector string sets
//! tag, classes and id in one go:
//!
//! ```
//! use spark_restart::dom::{button, div, span};
//!
//! let view = div(".app", vec![
//!     button(".add", "+"),
//!     span(".count", 3.to_string()),
//! ]);
//! assert_eq!(view.to_string(), r#"<div class="app"><button class="add">+</button><span class="count">3</span></div>"#);
//! ```

use std::fmt;

// =============================================================================
// Selector
// =============================================================================

/// A compound selector: optional tag, classes, optional id (`button.add#plus`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    pub tag: Option<String>,
    pub classes: Vec<String>,
    pub id: Option<String>,
}

impl Selector {
    pub fn parse(selector: &str) -> Self {
        let mut parsed = Selector::default();
        let mut current = String::new();
        let mut kind = ' ';

        for ch in selector.trim().chars().chain(std::iter::once('\0')) {
            if ch == '.' || ch == '#' || ch == '\0' {
                if !current.is_empty() {
                    let part = std::mem::take(&mut current);
                    match kind {
                        '.' => parsed.classes.push(part),
                        '#' => parsed.id = Some(part),
                        _ => parsed.tag = Some(part),
                    }
                }
                kind = ch;
            } else {
                current.push(ch);
            }
        }
        parsed
    }

    pub fn matches(&self, node: &VNode) -> bool {
        self.tag.as_ref().is_none_or(|tag| *tag == node.tag)
            && self.id.as_ref().is_none_or(|id| node.id.as_ref() == Some(id))
            && self.classes.iter().all(|class| node.classes.contains(class))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            f.write_str(tag)?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        Ok(())
    }
}

/// True if `scope` matches `path` (root first) as a chain of ancestors
/// ending at or above the last node.
pub(crate) fn scope_matches(scope: &[Selector], path: &[&VNode]) -> bool {
    let mut remaining = scope.iter().peekable();
    for node in path {
        match remaining.peek() {
            Some(selector) if selector.matches(node) => {
                remaining.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    remaining.peek().is_none()
}

// =============================================================================
// VNode
// =============================================================================

/// Element in a virtual tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VNode {
    pub tag: String,
    pub classes: Vec<String>,
    pub id: Option<String>,
    pub text: Option<String>,
    pub children: Vec<VNode>,
}

impl VNode {
    /// Own text followed by the text of every descendant.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Every node matching `selector`, in document order (self included).
    pub fn find_all(&self, selector: &Selector) -> Vec<&VNode> {
        let mut found = Vec::new();
        self.walk(&mut |node| {
            if selector.matches(node) {
                found.push(node);
            }
        });
        found
    }

    /// Root-to-node path to the first node matching `selector`.
    pub fn path_to(&self, selector: &Selector) -> Option<Vec<&VNode>> {
        if selector.matches(self) {
            return Some(vec![self]);
        }
        self.children.iter().find_map(|child| {
            let mut path = child.path_to(selector)?;
            path.insert(0, self);
            Some(path)
        })
    }

    /// Nodes whose root path satisfies `scope`, the last selector matching
    /// the node itself. An empty scope selects the root.
    pub fn select_all(&self, scope: &[Selector]) -> Vec<&VNode> {
        let Some(last) = scope.last() else {
            return vec![self];
        };
        let mut found = Vec::new();
        let mut path = Vec::new();
        self.select_into(scope, last, &mut path, &mut found);
        found
    }

    fn select_into<'a>(
        &'a self,
        scope: &[Selector],
        last: &Selector,
        path: &mut Vec<&'a VNode>,
        found: &mut Vec<&'a VNode>,
    ) {
        path.push(self);
        if last.matches(self) && scope_matches(scope, path) {
            found.push(self);
        }
        for child in &self.children {
            child.select_into(scope, last, path, found);
        }
        path.pop();
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a VNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

impl fmt::Display for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        if !self.classes.is_empty() {
            write!(f, " class=\"{}\"", self.classes.join(" "))?;
        }
        if let Some(id) = &self.id {
            write!(f, " id=\"{id}\"")?;
        }
        f.write_str(">")?;
        if let Some(text) = &self.text {
            f.write_str(text)?;
        }
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.tag)
    }
}

// =============================================================================
// Builders
// =============================================================================

/// What can go inside an element: text or children.
pub trait Content {
    fn apply(self, node: &mut VNode);
}

impl Content for &str {
    fn apply(self, node: &mut VNode) {
        node.text = Some(self.to_string());
    }
}

impl Content for String {
    fn apply(self, node: &mut VNode) {
        node.text = Some(self);
    }
}

impl Content for Vec<VNode> {
    fn apply(self, node: &mut VNode) {
        node.children = self;
    }
}

impl Content for () {
    fn apply(self, _node: &mut VNode) {}
}

/// Build a node from a selector (`"button.add"`, `".count"`). Tag defaults to `div`.
pub fn h(selector: &str, content: impl Content) -> VNode {
    let Selector { tag, classes, id } = Selector::parse(selector);
    let mut node = VNode {
        tag: tag.unwrap_or_else(|| "div".to_string()),
        classes,
        id,
        ..VNode::default()
    };
    content.apply(&mut node);
    node
}

fn tagged(tag: &str, selector: &str, content: impl Content) -> VNode {
    h(&format!("{tag}{}", selector.trim()), content)
}

pub fn div(selector: &str, content: impl Content) -> VNode {
    tagged("div", selector, content)
}

pub fn button(selector: &str, content: impl Content) -> VNode {
    tagged("button", selector, content)
}

pub fn span(selector: &str, content: impl Content) -> VNode {
    tagged("span", selector, content)
}
