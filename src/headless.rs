// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Headless Block Runtime
//!
//! A [`Decorator`] and [`Loader`] for targets without a browser. Decoration
//! rewrites the document the way the site's block runtime does (sections,
//! default-content wrappers, blocks, buttons, icons). Loading marks sections
//! and blocks loaded, records stylesheets, and fetches placeholder sheets
//! when a [`Fetcher`] is configured.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{FutureExt, LocalBoxFuture};
use reqwest::Url;
use serde::Deserialize;

use crate::core::error::{PageFlowError, Result};
use crate::core::traits::{Decorator, Fetcher, Loader, PageModel};
use crate::dom::Element;

const SECTION_STATUS: &str = "data-section-status";
const BLOCK_STATUS: &str = "data-block-status";

/// Turns a free-form name into a CSS class name: lower case, runs of other
/// characters collapsed to `-`, no leading or trailing `-`.
pub fn to_class_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Turns a free-form name into a camel-case key.
pub fn to_camel_case(name: &str) -> String {
    let class_name = to_class_name(name);
    let mut out = String::with_capacity(class_name.len());
    let mut upper = false;
    for c in class_name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct PlaceholderSheet {
    #[serde(default)]
    data: Vec<PlaceholderRow>,
}

#[derive(Debug, Deserialize)]
struct PlaceholderRow {
    #[serde(rename = "Key", default)]
    key: String,
    #[serde(rename = "Text", default)]
    text: String,
}

struct PlaceholderSource {
    fetcher: Arc<dyn Fetcher>,
    origin: Url,
}

/// Decoration and loading without a browser.
#[derive(Default)]
pub struct HeadlessRuntime {
    code_base_path: String,
    placeholder_source: Option<PlaceholderSource>,
    placeholders: RefCell<HashMap<String, HashMap<String, String>>>,
    stylesheets: RefCell<Vec<String>>,
}

impl std::fmt::Debug for HeadlessRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessRuntime")
            .field("code_base_path", &self.code_base_path)
            .field("stylesheets", &self.stylesheets.borrow())
            .finish_non_exhaustive()
    }
}

impl HeadlessRuntime {
    /// Creates a runtime without a placeholder source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path prefix of icons and other code assets.
    pub fn with_code_base_path<S: Into<String>>(
        mut self,
        path: S,
    ) -> Self {
        self.code_base_path = path.into();
        self
    }

    /// Fetches placeholder sheets from `origin`.
    pub fn with_placeholder_source(
        mut self,
        fetcher: Arc<dyn Fetcher>,
        origin: Url,
    ) -> Self {
        self.placeholder_source =
            Some(PlaceholderSource { fetcher, origin });
        self
    }

    /// Stylesheets loaded so far, in load order.
    pub fn stylesheets(&self) -> Vec<String> {
        self.stylesheets.borrow().clone()
    }

    fn is_block(element: &Element) -> bool {
        element.is("div") && !element.classes().is_empty()
    }

    fn mark_loaded(section: &Element) {
        for block in section.find_all(|e| e.has_attr(BLOCK_STATUS)) {
            block.set_attr(BLOCK_STATUS, "loaded");
        }
        section.set_attr(SECTION_STATUS, "loaded");
    }

    async fn fetch_placeholder_sheet(
        &self,
        prefix: &str,
    ) -> Result<HashMap<String, String>> {
        let Some(source) = &self.placeholder_source else {
            return Ok(HashMap::new());
        };
        let path = format!("{}/placeholders.json", prefix);
        let url = source.origin.join(&path).map_err(|e| {
            PageFlowError::collaborator_error(
                "fetch_placeholders",
                e.to_string(),
            )
        })?;
        let response = source.fetcher.fetch(url.as_str()).await?;
        if !response.is_success() {
            log::warn!(
                "No placeholders at {} ({})",
                url,
                response.status
            );
            return Ok(HashMap::new());
        }
        let sheet: PlaceholderSheet =
            serde_json::from_str(&response.body).map_err(|e| {
                PageFlowError::collaborator_error(
                    "fetch_placeholders",
                    e.to_string(),
                )
            })?;
        Ok(sheet
            .data
            .into_iter()
            .filter(|row| !row.key.is_empty())
            .map(|row| (to_camel_case(&row.key), row.text))
            .collect())
    }
}

impl Decorator for HeadlessRuntime {
    fn build_block(
        &self,
        name: &str,
        elements: Vec<Element>,
    ) -> Result<Element> {
        let class_name = to_class_name(name);
        if class_name.is_empty() {
            return Err(PageFlowError::collaborator_error(
                "build_block",
                "block name is empty",
            ));
        }
        if elements.is_empty() {
            return Err(PageFlowError::collaborator_error(
                "build_block",
                format!("block `{}` has no content", class_name),
            ));
        }

        let block = Element::new("div");
        block.add_class(&class_name);
        let row = Element::new("div");
        let cell = Element::new("div");
        for element in &elements {
            cell.append(element);
        }
        row.append(&cell);
        block.append(&row);
        Ok(block)
    }

    fn decorate_buttons(&self, container: &Element) {
        let links =
            container.find_all(|e| e.is("a") && e.has_attr("href"));
        for link in links {
            let href = link.attr("href").unwrap_or_default();
            if link.text().trim() == href
                || link.find_tag("img").is_some()
            {
                continue;
            }
            let Some(parent) = link.parent() else {
                continue;
            };
            let label = link.text();
            let only_child = |element: &Element| {
                element.children().len() == 1
                    && element.text().trim() == label.trim()
            };

            if parent.is("p") && only_child(&parent) {
                link.add_class("button");
                parent.add_class("button-container");
                continue;
            }
            let style = if parent.is("strong") {
                "primary"
            } else if parent.is("em") {
                "secondary"
            } else {
                continue;
            };
            let Some(grandparent) = parent.parent() else {
                continue;
            };
            if grandparent.is("p")
                && only_child(&parent)
                && only_child(&grandparent)
            {
                link.add_class("button");
                link.add_class(style);
                grandparent.add_class("button-container");
            }
        }
    }

    fn decorate_icons(&self, container: &Element) {
        let icons =
            container.find_all(|e| e.is("span") && e.has_class("icon"));
        for span in icons {
            let classes = span.classes();
            let Some(name) = classes
                .iter()
                .find_map(|class| class.strip_prefix("icon-"))
                .map(str::to_string)
            else {
                continue;
            };
            if !span.children().is_empty() {
                continue;
            }
            let img = Element::new("img");
            img.set_attr("data-icon-name", &name);
            let src =
                format!("{}/icons/{}.svg", self.code_base_path, name);
            img.set_attr("src", &src);
            img.set_attr("alt", "");
            img.set_attr("loading", "lazy");
            span.append(&img);
        }
    }

    fn decorate_sections(&self, container: &Element) {
        for section in container.children() {
            if !section.is("div") {
                continue;
            }
            let mut wrapper: Option<Element> = None;
            for child in section.children() {
                if Self::is_block(&child) {
                    wrapper = None;
                    section.append(&child);
                    continue;
                }
                let target = wrapper.get_or_insert_with(|| {
                    let created = Element::new("div");
                    created.add_class("default-content-wrapper");
                    section.append(&created);
                    created
                });
                target.append(&child);
            }
            section.add_class("section");
            section.set_attr(SECTION_STATUS, "initialized");
        }
    }

    fn decorate_blocks(&self, container: &Element) {
        let sections = container.find_all(|e| e.has_class("section"));
        for section in sections {
            for block in section.children() {
                if !Self::is_block(&block)
                    || block.has_class("default-content-wrapper")
                    || block.has_attr(BLOCK_STATUS)
                {
                    continue;
                }
                let classes = block.classes();
                let Some(name) = classes.into_iter().next() else {
                    continue;
                };
                block.add_class("block");
                block.set_attr("data-block-name", &name);
                block.set_attr(BLOCK_STATUS, "initialized");

                let wrapper = Element::new("div");
                wrapper.add_class(&format!("{}-wrapper", name));
                block.replace_with(&wrapper);
                wrapper.append(&block);
                section.add_class(&format!("{}-container", name));
            }
        }
    }

    fn decorate_template_and_theme(&self, page: &dyn PageModel) {
        for name in ["template", "theme"] {
            let Some(value) = page.meta(name) else {
                continue;
            };
            for class in value.split(',').map(to_class_name) {
                if !class.is_empty() {
                    page.add_body_class(&class);
                }
            }
        }
    }
}

impl Loader for HeadlessRuntime {
    fn load_section<'a>(
        &'a self,
        section: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            Self::mark_loaded(section);
            Ok(())
        }
        .boxed_local()
    }

    fn load_sections<'a>(
        &'a self,
        container: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            let sections =
                container.find_all(|e| e.has_class("section"));
            for section in sections {
                self.load_section(&section).await?;
            }
            Ok(())
        }
        .boxed_local()
    }

    fn wait_for_first_image<'a>(
        &'a self,
        section: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            if let Some(img) = section.find_tag("img") {
                if img.attr("loading").as_deref() == Some("lazy") {
                    img.set_attr("loading", "eager");
                }
            }
            Ok(())
        }
        .boxed_local()
    }

    fn load_header<'a>(
        &'a self,
        header: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            header.set_attr(BLOCK_STATUS, "loaded");
            Ok(())
        }
        .boxed_local()
    }

    fn load_footer<'a>(
        &'a self,
        footer: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            footer.set_attr(BLOCK_STATUS, "loaded");
            Ok(())
        }
        .boxed_local()
    }

    fn load_css<'a>(
        &'a self,
        href: &'a str,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            let mut stylesheets = self.stylesheets.borrow_mut();
            if !stylesheets.iter().any(|loaded| loaded == href) {
                stylesheets.push(href.to_string());
            }
            Ok(())
        }
        .boxed_local()
    }

    fn fetch_placeholders<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<HashMap<String, String>>> {
        async move {
            let prefix = prefix.unwrap_or_default();
            let cache_key =
                if prefix.is_empty() { "default" } else { prefix };
            let cached =
                self.placeholders.borrow().get(cache_key).cloned();
            if let Some(cached) = cached {
                return Ok(cached);
            }
            let placeholders =
                self.fetch_placeholder_sheet(prefix).await?;
            _ = self
                .placeholders
                .borrow_mut()
                .insert(cache_key.to_string(), placeholders.clone());
            Ok(placeholders)
        }
        .boxed_local()
    }
}
