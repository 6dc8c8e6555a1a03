// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Core Traits Module
//!
//! The capabilities the core depends on but does not implement itself.
//!
//! ## Key Traits
//!
//! - [`Fetcher`]: network access returning a status and a text body
//! - [`SessionStore`]: session-scoped key-value persistence
//! - [`PageModel`]: the document being assembled
//! - [`Decorator`]: synchronous block and section decoration
//! - [`Loader`]: asynchronous section, header, footer and stylesheet loading
//! - [`DeferredModule`]: the behaviour module loaded in the delayed phase
//!
//! `Fetcher`, `SessionStore` and `DeferredModule` are `Send + Sync` because
//! the config store and the delayed task may move across threads. The
//! DOM-bound traits work on [`Element`] handles and stay on one thread.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::future::{BoxFuture, LocalBoxFuture};

use crate::core::error::Result;
use crate::dom::Element;
use crate::locale::Locale;
use crate::location::PageLocation;

/// A response from a [`Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl FetchResponse {
    /// Creates a response.
    pub fn new<S: Into<String>>(status: u16, body: S) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network access.
pub trait Fetcher: Send + Sync {
    /// Fetches an absolute URL. Errors mean no response was received at all;
    /// a non-success status is still `Ok`.
    fn fetch(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<FetchResponse>>;
}

/// Session-scoped key-value persistence.
pub trait SessionStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// The document being assembled by the bootstrapper.
pub trait PageModel {
    /// Where the page lives.
    fn location(&self) -> &PageLocation;

    /// The document's declared language, if any.
    fn declared_language(&self) -> Option<String>;

    /// Sets the document language and text direction.
    fn set_language(&self, locale: &Locale);

    /// The content of a `<meta name="...">` element.
    fn meta(&self, name: &str) -> Option<String>;

    /// The main content root.
    fn main(&self) -> Option<Element>;

    /// The header element.
    fn header(&self) -> Option<Element>;

    /// The footer element.
    fn footer(&self) -> Option<Element>;

    /// Appends a node to the document head.
    fn append_to_head(&self, node: &Element);

    /// Adds a class to the body.
    fn add_body_class(&self, class: &str);

    /// Makes the page visible.
    fn mark_visible(&self) {
        self.add_body_class("appear");
    }

    /// The element with the given id.
    fn element_by_id(&self, id: &str) -> Option<Element>;

    /// Scrolls an element into view.
    fn scroll_into_view(&self, element: &Element);

    /// The viewport width in CSS pixels.
    fn viewport_width(&self) -> u32;

    /// Whether the requested resource was not found and the error page
    /// should be shown instead.
    fn is_missing_resource(&self) -> bool;
}

/// Synchronous decoration primitives supplied by the block runtime.
pub trait Decorator {
    /// Builds a composite block named `name` from existing elements.
    fn build_block(
        &self,
        name: &str,
        elements: Vec<Element>,
    ) -> Result<Element>;

    /// Decorates links that should render as buttons.
    fn decorate_buttons(&self, container: &Element);

    /// Decorates icon placeholders.
    fn decorate_icons(&self, container: &Element);

    /// Turns top-level content into sections.
    fn decorate_sections(&self, container: &Element);

    /// Prepares blocks inside sections for loading.
    fn decorate_blocks(&self, container: &Element);

    /// Applies template and theme classes to the page.
    fn decorate_template_and_theme(&self, page: &dyn PageModel);
}

/// Asynchronous loading primitives supplied by the block runtime.
pub trait Loader {
    /// Loads one section and waits for its blocks.
    fn load_section<'a>(
        &'a self,
        section: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>>;

    /// Loads every section of a container.
    fn load_sections<'a>(
        &'a self,
        container: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>>;

    /// Waits until the first image of a section has loaded.
    fn wait_for_first_image<'a>(
        &'a self,
        section: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>>;

    /// Loads the header into the given element.
    fn load_header<'a>(
        &'a self,
        header: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>>;

    /// Loads the footer into the given element.
    fn load_footer<'a>(
        &'a self,
        footer: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>>;

    /// Loads a stylesheet.
    fn load_css<'a>(
        &'a self,
        href: &'a str,
    ) -> LocalBoxFuture<'a, Result<()>>;

    /// Fetches placeholder texts under a locale prefix such as `/en`; the
    /// site root when `None`.
    fn fetch_placeholders<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<HashMap<String, String>>>;
}

/// The behaviour module loaded by the delayed phase.
pub trait DeferredModule: Send + Sync {
    /// Loads and runs the module.
    fn load(&self) -> BoxFuture<'static, Result<()>>;
}

/// The decoration and loading primitives, shared between the bootstrapper
/// and the fragment loader.
#[derive(Clone)]
pub struct Collaborators {
    /// Decoration primitives.
    pub decorator: Rc<dyn Decorator>,
    /// Loading primitives.
    pub loader: Rc<dyn Loader>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Bundles a decorator and a loader.
    pub fn new(
        decorator: Rc<dyn Decorator>,
        loader: Rc<dyn Loader>,
    ) -> Self {
        Self { decorator, loader }
    }

    /// Uses one runtime for both roles.
    pub fn from_runtime<R>(runtime: Rc<R>) -> Self
    where
        R: Decorator + Loader + 'static,
    {
        Self {
            decorator: runtime.clone(),
            loader: runtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_response_success_range() {
        assert!(FetchResponse::new(200, "").is_success());
        assert!(FetchResponse::new(204, "").is_success());
        assert!(!FetchResponse::new(304, "").is_success());
        assert!(!FetchResponse::new(404, "").is_success());
        assert!(!FetchResponse::new(500, "").is_success());
    }
}
