// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Document Model
//!
//! A thin element API over an `html5ever` / `markup5ever_rcdom` tree: parse
//! a document, query elements with predicates, move nodes between
//! containers, edit attributes and serialise back to HTML.
//!
//! Handles are reference counted (`Rc`) and belong to one thread. Cloning an
//! [`Element`] clones the handle, not the node.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{
    parse_document, Attribute, LocalName, Namespace, ParseOpts, QualName,
};
use markup5ever_rcdom::{
    Handle, Node, NodeData, RcDom, SerializableHandle,
};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A parsed HTML document.
pub struct HtmlDocument {
    dom: RcDom,
}

impl fmt::Debug for HtmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlDocument")
            .field("root", &self.root_element().map(|e| e.tag()))
            .finish()
    }
}

impl HtmlDocument {
    /// Parses a full HTML document. Parsing never fails; malformed markup is
    /// recovered the way browsers recover it.
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default())
            .one(html);
        Self { dom }
    }

    /// The `<html>` element.
    pub fn root_element(&self) -> Option<Element> {
        self.dom
            .document
            .children
            .borrow()
            .iter()
            .find_map(|child| Element::from_handle(child.clone()))
    }

    /// The first element matching `predicate`, in document order.
    pub fn find<F>(&self, predicate: F) -> Option<Element>
    where
        F: Fn(&Element) -> bool,
    {
        let root = self.root_element()?;
        if predicate(&root) {
            return Some(root);
        }
        root.find(predicate)
    }

    /// The first element with the given tag name.
    pub fn find_tag(&self, tag: &str) -> Option<Element> {
        self.find(|element| element.is(tag))
    }

    /// The element with the given `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<Element> {
        self.find(|element| element.attr("id").as_deref() == Some(id))
    }

    /// Serialises the whole document.
    pub fn to_html(&self) -> String {
        let handle: SerializableHandle =
            self.dom.document.clone().into();
        render(&handle, TraversalScope::ChildrenOnly(None))
    }
}

/// An element node.
#[derive(Clone)]
pub struct Element {
    handle: Handle,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag())
            .field("class", &self.attr("class"))
            .finish()
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.handle, &other.handle)
    }
}

impl Eq for Element {}

impl Element {
    /// Creates a detached element.
    pub fn new(tag: &str) -> Self {
        let name = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(tag),
        );
        let handle = Node::new(NodeData::Element {
            name,
            attrs: RefCell::new(Vec::new()),
            template_contents: RefCell::new(None),
            mathml_annotation_xml_integration_point: false,
        });
        Self { handle }
    }

    fn from_handle(handle: Handle) -> Option<Self> {
        if matches!(handle.data, NodeData::Element { .. }) {
            Some(Self { handle })
        } else {
            None
        }
    }

    fn attrs(&self) -> Option<&RefCell<Vec<Attribute>>> {
        match &self.handle.data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    /// The lower-case tag name.
    pub fn tag(&self) -> String {
        match &self.handle.data {
            NodeData::Element { name, .. } => name.local.to_string(),
            _ => String::new(),
        }
    }

    /// Whether the element has the given tag name.
    pub fn is(&self, tag: &str) -> bool {
        match &self.handle.data {
            NodeData::Element { name, .. } => &*name.local == tag,
            _ => false,
        }
    }

    /// The value of an attribute.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs()?
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| attr.value.to_string())
    }

    /// Whether the attribute is present.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs().is_some_and(|attrs| {
            attrs.borrow().iter().any(|attr| &*attr.name.local == name)
        })
    }

    /// Sets an attribute, replacing any existing value.
    pub fn set_attr(&self, name: &str, value: &str) {
        let Some(attrs) = self.attrs() else {
            return;
        };
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|attr| &*attr.name.local == name) {
            Some(attr) => attr.value = StrTendril::from(value),
            None => attrs.push(Attribute {
                name: QualName::new(
                    None,
                    Namespace::from(""),
                    LocalName::from(name),
                ),
                value: StrTendril::from(value),
            }),
        }
    }

    /// The class list.
    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|class| {
                class.split_whitespace().map(str::to_string).collect()
            })
            .unwrap_or_default()
    }

    /// Whether the class list contains `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().iter().any(|c| c == class)
    }

    /// Adds a class if not already present.
    pub fn add_class(&self, class: &str) {
        let mut classes = self.classes();
        if classes.iter().any(|c| c == class) {
            return;
        }
        classes.push(class.to_string());
        self.set_attr("class", &classes.join(" "));
    }

    /// The parent element, if attached to one.
    pub fn parent(&self) -> Option<Element> {
        parent_of(&self.handle).and_then(Element::from_handle)
    }

    /// Element children, in order.
    pub fn children(&self) -> Vec<Element> {
        self.handle
            .children
            .borrow()
            .iter()
            .filter_map(|child| Element::from_handle(child.clone()))
            .collect()
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<Element> {
        let mut out = Vec::new();
        collect_descendants(&self.handle, &mut out);
        out
    }

    /// The first descendant matching `predicate`.
    pub fn find<F>(&self, predicate: F) -> Option<Element>
    where
        F: Fn(&Element) -> bool,
    {
        self.descendants().into_iter().find(|e| predicate(e))
    }

    /// All descendants matching `predicate`.
    pub fn find_all<F>(&self, predicate: F) -> Vec<Element>
    where
        F: Fn(&Element) -> bool,
    {
        let descendants = self.descendants().into_iter();
        descendants.filter(|e| predicate(e)).collect()
    }

    /// The first descendant with the given tag name.
    pub fn find_tag(&self, tag: &str) -> Option<Element> {
        self.find(|element| element.is(tag))
    }

    /// The first descendant carrying `class`.
    pub fn find_class(&self, class: &str) -> Option<Element> {
        self.find(|element| element.has_class(class))
    }

    /// Appends `child`, detaching it from its current parent first.
    pub fn append(&self, child: &Element) {
        insert_child(&self.handle, child.handle.clone(), None);
    }

    /// Inserts `child` as the first child.
    pub fn prepend(&self, child: &Element) {
        insert_child(&self.handle, child.handle.clone(), Some(0));
    }

    /// Puts `replacement` where `self` is and detaches `self`.
    pub fn replace_with(&self, replacement: &Element) {
        let Some(parent) = parent_of(&self.handle) else {
            return;
        };
        detach(&replacement.handle);
        let index = parent
            .children
            .borrow()
            .iter()
            .position(|child| Rc::ptr_eq(child, &self.handle));
        if let Some(index) = index {
            replacement
                .handle
                .parent
                .set(Some(Rc::downgrade(&parent)));
            parent.children.borrow_mut()[index] =
                replacement.handle.clone();
            self.handle.parent.set(None);
        }
    }

    /// Moves every child node (text included) to the end of `target`.
    pub fn move_children_to(&self, target: &Element) {
        let children: Vec<Handle> =
            self.handle.children.borrow_mut().drain(..).collect();
        for child in children {
            child.parent.set(None);
            insert_child(&target.handle, child, None);
        }
    }

    /// Removes every child node.
    pub fn clear(&self) {
        let children: Vec<Handle> =
            self.handle.children.borrow_mut().drain(..).collect();
        for child in children {
            child.parent.set(None);
        }
    }

    /// Appends a text node.
    pub fn append_text(&self, text: &str) {
        let node = Node::new(NodeData::Text {
            contents: RefCell::new(StrTendril::from(text)),
        });
        insert_child(&self.handle, node, None);
    }

    /// The concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.handle, &mut out);
        out
    }

    /// Serialises the element's children.
    pub fn inner_html(&self) -> String {
        let handle: SerializableHandle = self.handle.clone().into();
        render(&handle, TraversalScope::ChildrenOnly(None))
    }

    /// Serialises the element itself.
    pub fn outer_html(&self) -> String {
        let handle: SerializableHandle = self.handle.clone().into();
        render(&handle, TraversalScope::IncludeNode)
    }

    /// Position of `self` relative to `other` in a preorder walk from `root`.
    /// `Some(true)` when `self` comes first.
    pub fn precedes(
        &self,
        other: &Element,
        root: &Element,
    ) -> Option<bool> {
        let order = root.descendants();
        let mine = order.iter().position(|e| e == self)?;
        let theirs = order.iter().position(|e| e == other)?;
        Some(mine < theirs)
    }
}

fn render(
    handle: &SerializableHandle,
    traversal_scope: TraversalScope,
) -> String {
    let mut bytes = Vec::new();
    let opts = SerializeOpts {
        traversal_scope,
        ..Default::default()
    };
    if let Err(e) = serialize(&mut bytes, handle, opts) {
        log::warn!("HTML serialisation failed: {}", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn parent_of(handle: &Handle) -> Option<Handle> {
    let weak = handle.parent.take();
    let parent = weak.as_ref().and_then(Weak::upgrade);
    handle.parent.set(weak);
    parent
}

fn detach(handle: &Handle) {
    if let Some(parent) = parent_of(handle) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, handle));
    }
    handle.parent.set(None);
}

fn insert_child(parent: &Handle, child: Handle, index: Option<usize>) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    match index {
        Some(index) if index <= children.len() => {
            children.insert(index, child)
        }
        _ => children.push(child),
    }
}

fn collect_descendants(handle: &Handle, out: &mut Vec<Element>) {
    for child in handle.children.borrow().iter() {
        if let Some(element) = Element::from_handle(child.clone()) {
            out.push(element);
        }
        collect_descendants(child, out);
    }
}

fn collect_text(handle: &Handle, out: &mut String) {
    for child in handle.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => {
                out.push_str(&contents.borrow())
            }
            _ => collect_text(child, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>t</title></head>
<body><main><div id="first">
<h1>Title</h1><p class="lead intro">Hi</p>
</div></main></body></html>"#;

    #[test]
    fn test_parse_and_query() {
        let doc = HtmlDocument::parse(PAGE);
        let main = doc.find_tag("main").unwrap();
        let h1 = main.find_tag("h1").unwrap();
        assert_eq!(h1.text(), "Title");
        assert!(doc.element_by_id("first").is_some());
        assert!(main.find_class("intro").is_some());
        let root = doc.root_element().map(|e| e.tag());
        assert_eq!(root.as_deref(), Some("html"));
    }

    #[test]
    fn test_attributes_and_classes() {
        let div = Element::new("div");
        div.set_attr("data-path", "/en/fragments/404");
        div.add_class("section");
        div.add_class("section");
        div.add_class("error");
        assert_eq!(
            div.attr("data-path").as_deref(),
            Some("/en/fragments/404")
        );
        assert_eq!(div.attr("class").as_deref(), Some("section error"));
        assert!(div.has_attr("data-path"));
        assert!(!div.has_attr("id"));
    }

    #[test]
    fn test_append_moves_between_parents() {
        let a = Element::new("div");
        let b = Element::new("div");
        let child = Element::new("span");
        a.append(&child);
        b.append(&child);
        assert!(a.children().is_empty());
        assert_eq!(b.children(), vec![child.clone()]);
        assert_eq!(child.parent(), Some(b));
    }

    #[test]
    fn test_prepend_and_replace() {
        let main = Element::new("main");
        let second = Element::new("p");
        main.append(&second);
        let first = Element::new("h2");
        main.prepend(&first);
        assert_eq!(
            main.children(),
            vec![first.clone(), second.clone()]
        );

        let replacement = Element::new("h5");
        first.replace_with(&replacement);
        assert_eq!(main.children(), vec![replacement, second]);
        assert!(first.parent().is_none());
    }

    #[test]
    fn test_move_children_keeps_text() {
        let source = Element::new("div");
        source.append_text("hello ");
        source.append(&Element::new("b"));
        let target = Element::new("section");
        source.move_children_to(&target);
        assert_eq!(source.inner_html(), "");
        assert_eq!(target.inner_html(), "hello <b></b>");
    }

    #[test]
    fn test_precedes_in_document_order() {
        let doc = HtmlDocument::parse(PAGE);
        let main = doc.find_tag("main").unwrap();
        let h1 = main.find_tag("h1").unwrap();
        let p = main.find_tag("p").unwrap();
        assert_eq!(h1.precedes(&p, &main), Some(true));
        assert_eq!(p.precedes(&h1, &main), Some(false));
        assert_eq!(h1.precedes(&Element::new("img"), &main), None);
    }

    #[test]
    fn test_outer_html() {
        let div = Element::new("div");
        div.add_class("hero");
        div.append_text("x");
        assert_eq!(div.outer_html(), r#"<div class="hero">x</div>"#);
    }
}
