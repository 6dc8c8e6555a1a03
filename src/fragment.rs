// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Fragment Loader
//!
//! Fetches an authored HTML partial, lifts the content of its `main`
//! element into a detached container, points fragment-relative media at the
//! fragment's own location, then decorates and loads the container like
//! page content.
//!
//! The error-page flow loads `/{lang}/fragments/{code}` and specialises it
//! before appending it to the page.

use std::sync::Arc;

use reqwest::Url;

use crate::core::config::Settings;
use crate::core::error::{PageFlowError, Result};
use crate::core::traits::{Collaborators, Fetcher, PageModel};
use crate::decorate::decorate_main;
use crate::dom::{Element, HtmlDocument};
use crate::location::PageLocation;

/// Class marking the section that carries the error message.
pub const ERROR_CONTENT_CLASS: &str = "errorPageContent";

/// Body class of an error page.
pub const ERROR_PAGE_CLASS: &str = "error-page";

/// Loads fragments relative to a page's origin.
#[derive(Clone)]
pub struct FragmentLoader {
    settings: Arc<Settings>,
    fetcher: Arc<dyn Fetcher>,
    collaborators: Collaborators,
    location: PageLocation,
}

impl std::fmt::Debug for FragmentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentLoader")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl FragmentLoader {
    /// Creates a loader for the page at `location`.
    pub fn new(
        settings: Arc<Settings>,
        fetcher: Arc<dyn Fetcher>,
        collaborators: Collaborators,
        location: PageLocation,
    ) -> Self {
        Self {
            settings,
            fetcher,
            collaborators,
            location,
        }
    }

    /// The absolute URL of a site-rooted fragment path.
    pub fn fragment_url(&self, path: &str) -> Result<Url> {
        if !is_site_rooted(path) {
            return Err(PageFlowError::fragment_unavailable(
                path,
                "not a site-rooted path",
            ));
        }
        self.location.origin()?.join(path).map_err(|e| {
            PageFlowError::fragment_unavailable(path, e.to_string())
        })
    }

    /// Loads a fragment, reporting why it is unavailable.
    pub async fn try_load_fragment(
        &self,
        path: Option<&str>,
    ) -> Result<Element> {
        let path = path.ok_or_else(|| {
            PageFlowError::fragment_unavailable("", "no path given")
        })?;
        let url = self.fragment_url(path)?;

        let response =
            self.fetcher.fetch(url.as_str()).await.map_err(|e| {
                PageFlowError::fragment_unavailable(path, e.to_string())
            })?;
        if !response.is_success() {
            return Err(PageFlowError::fragment_unavailable(
                path,
                format!("HTTP status {}", response.status),
            ));
        }

        let document = HtmlDocument::parse(&response.body);
        let main = document.find(is_main).ok_or_else(|| {
            PageFlowError::fragment_unavailable(path, "no main element")
        })?;
        let container = Element::new("div");
        main.move_children_to(&container);

        rewrite_media(&container, &url, &self.settings.media_prefix);
        let decorator = &self.collaborators.decorator;
        decorate_main(&container, decorator.as_ref());
        for section in container.children() {
            if section.has_class("section") {
                section.set_attr("data-path", path);
            }
        }
        let loader = &self.collaborators.loader;
        if let Err(e) = loader.load_sections(&container).await {
            log::warn!(
                "Loading fragment sections for {} failed: {}",
                path,
                e
            );
        }
        Ok(container)
    }

    /// Loads a fragment, or `None` when the path is absent, not site-rooted,
    /// or not served.
    pub async fn load_fragment(
        &self,
        path: Option<&str>,
    ) -> Option<Element> {
        match self.try_load_fragment(path).await {
            Ok(container) => Some(container),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }

    /// Shows the error page for `code`: loads and specialises the error
    /// fragment, appends it to main and marks the page. A 404 also tells
    /// crawlers not to index the page.
    pub async fn load_error_page(
        &self,
        page: &dyn PageModel,
        code: u16,
    ) -> Option<Element> {
        let language = page
            .declared_language()
            .unwrap_or_else(|| self.settings.default_language.clone());
        let path = format!("/{}/fragments/{}", language, code);
        let fragment = self.load_fragment(Some(&path)).await;
        if let Some(fragment) = &fragment {
            specialise_error_fragment(fragment);
        }

        if code == 404 {
            let robots = Element::new("meta");
            robots.set_attr("name", "robots");
            robots.set_attr("content", "noindex");
            page.append_to_head(&robots);
        }
        page.add_body_class(ERROR_PAGE_CLASS);

        match (page.main(), &fragment) {
            (Some(main), Some(fragment)) => main.append(fragment),
            (None, _) => log::warn!("Error page has no main element"),
            (_, None) => {
                log::warn!("Error fragment {} unavailable", path)
            }
        }
        fragment
    }
}

fn is_main(element: &Element) -> bool {
    element.is("main")
        || element.attr("role").as_deref() == Some("main")
}

fn is_site_rooted(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//")
}

/// Tags the error-content section and demotes the first default-content
/// wrapper to an `h5` carrying the same content.
pub fn specialise_error_fragment(fragment: &Element) {
    let content = fragment.find(|e| {
        e.has_class("section")
            && e.has_attr("data-path")
            && !e.has_class("recommendations-container")
            && e.find_class("default-content-wrapper").is_some()
    });
    if let Some(section) = content {
        section.add_class(ERROR_CONTENT_CLASS);
    }

    let title = fragment.find_class("default-content-wrapper");
    if let Some(title) = title {
        let heading = Element::new("h5");
        heading.add_class("default-content-wrapper");
        title.move_children_to(&heading);
        title.replace_with(&heading);
    }
}

/// Rewrites `img[src]` and `source[srcset]` values that start with
/// `prefix` to absolute URLs resolved against `base`.
pub fn rewrite_media(container: &Element, base: &Url, prefix: &str) {
    for img in container.find_all(|e| e.is("img")) {
        let Some(src) = img.attr("src") else {
            continue;
        };
        if !src.starts_with(prefix) {
            continue;
        }
        if let Ok(absolute) = base.join(&src) {
            img.set_attr("src", absolute.as_str());
        }
    }

    for source in container.find_all(|e| e.is("source")) {
        let Some(srcset) = source.attr("srcset") else {
            continue;
        };
        let rewritten: Vec<String> = srcset
            .split(',')
            .map(|candidate| {
                rewrite_candidate(candidate.trim(), base, prefix)
            })
            .collect();
        source.set_attr("srcset", &rewritten.join(", "));
    }
}

fn rewrite_candidate(
    candidate: &str,
    base: &Url,
    prefix: &str,
) -> String {
    let split = candidate.split_once(char::is_whitespace);
    let (url, descriptor) = match split {
        Some((url, descriptor)) => (url, Some(descriptor.trim())),
        None => (candidate, None),
    };
    if !url.starts_with(prefix) {
        return candidate.to_string();
    }
    let Ok(absolute) = base.join(url) else {
        return candidate.to_string();
    };
    match descriptor {
        Some(descriptor) => format!("{} {}", absolute, descriptor),
        None => absolute.to_string(),
    }
}
