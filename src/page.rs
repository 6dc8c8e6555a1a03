// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # HTML Page Model
//!
//! [`HtmlPage`] implements [`PageModel`] over a parsed HTML document. The
//! things a browser would know about the page but a document does not
//! (viewport width, whether the resource was missing) are set explicitly.

use std::cell::RefCell;

use crate::core::traits::PageModel;
use crate::dom::{Element, HtmlDocument};
use crate::locale::Locale;
use crate::location::PageLocation;

/// Viewport width assumed when none is given.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// A page assembled from an HTML document.
#[derive(Debug)]
pub struct HtmlPage {
    document: HtmlDocument,
    location: PageLocation,
    viewport_width: u32,
    missing_resource: bool,
    scrolled_to: RefCell<Option<Element>>,
}

impl HtmlPage {
    /// Parses `html` as the page served at `location`.
    pub fn parse(html: &str, location: PageLocation) -> Self {
        Self {
            document: HtmlDocument::parse(html),
            location,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            missing_resource: false,
            scrolled_to: RefCell::new(None),
        }
    }

    /// Sets the viewport width.
    pub fn with_viewport_width(mut self, width: u32) -> Self {
        self.viewport_width = width;
        self
    }

    /// Marks the requested resource as missing.
    pub fn with_missing_resource(mut self, missing: bool) -> Self {
        self.missing_resource = missing;
        self
    }

    /// The element last scrolled into view.
    pub fn scrolled_to(&self) -> Option<Element> {
        self.scrolled_to.borrow().clone()
    }

    /// Serialises the page.
    pub fn to_html(&self) -> String {
        self.document.to_html()
    }

    fn body(&self) -> Option<Element> {
        self.document.find_tag("body")
    }
}

impl PageModel for HtmlPage {
    fn location(&self) -> &PageLocation {
        &self.location
    }

    fn declared_language(&self) -> Option<String> {
        self.document
            .root_element()
            .and_then(|html| html.attr("lang"))
            .filter(|lang| !lang.trim().is_empty())
    }

    fn set_language(&self, locale: &Locale) {
        if let Some(html) = self.document.root_element() {
            html.set_attr("lang", &locale.language);
            html.set_attr("dir", locale.direction.as_str());
        }
    }

    fn meta(&self, name: &str) -> Option<String> {
        self.document
            .find(|element| {
                element.is("meta")
                    && element.attr("name").as_deref() == Some(name)
            })
            .and_then(|meta| meta.attr("content"))
    }

    fn main(&self) -> Option<Element> {
        self.document.find_tag("main")
    }

    fn header(&self) -> Option<Element> {
        self.document.find_tag("header")
    }

    fn footer(&self) -> Option<Element> {
        self.document.find_tag("footer")
    }

    fn append_to_head(&self, node: &Element) {
        match self.document.find_tag("head") {
            Some(head) => head.append(node),
            None => log::warn!(
                "Document has no head; dropping <{}>",
                node.tag()
            ),
        }
    }

    fn add_body_class(&self, class: &str) {
        if let Some(body) = self.body() {
            body.add_class(class);
        }
    }

    fn element_by_id(&self, id: &str) -> Option<Element> {
        self.document.element_by_id(id)
    }

    fn scroll_into_view(&self, element: &Element) {
        log::debug!("Scrolling to {:?}", element);
        *self.scrolled_to.borrow_mut() = Some(element.clone());
    }

    fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    fn is_missing_resource(&self) -> bool {
        self.missing_resource
    }
}
