// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Page location handling.
//!
//! A page rendered inside an `about:srcdoc` iframe (the authoring preview)
//! has no useful URL of its own. Its effective location is taken from the
//! parent frame: the parent's origin plus the parent's `path` query
//! parameter.

use reqwest::Url;

use crate::core::error::{PageFlowError, Result};

const SRCDOC: &str = "about:srcdoc";

/// The URL of the page being assembled, plus the parent frame URL when the
/// page is embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    href: String,
    parent_href: Option<String>,
}

impl PageLocation {
    /// Creates a location for a top-level page.
    pub fn new<S: Into<String>>(href: S) -> Self {
        Self {
            href: href.into(),
            parent_href: None,
        }
    }

    /// Sets the parent frame URL, used when `href` is `about:srcdoc`.
    pub fn with_parent<S: Into<String>>(
        mut self,
        parent_href: S,
    ) -> Self {
        self.parent_href = Some(parent_href.into());
        self
    }

    fn is_srcdoc(&self) -> bool {
        self.href == SRCDOC
    }

    fn parent_url(&self) -> Option<Url> {
        self.parent_href
            .as_deref()
            .and_then(|href| Url::parse(href).ok())
    }

    /// The href the page stands for.
    pub fn effective_href(&self) -> String {
        if !self.is_srcdoc() {
            return self.href.clone();
        }
        match self.parent_url() {
            Some(parent) => {
                let path = parent
                    .query_pairs()
                    .find(|(key, _)| key == "path")
                    .map(|(_, value)| value.into_owned())
                    .unwrap_or_default();
                let origin = parent.origin().ascii_serialization();
                format!("{}{}", origin, path)
            }
            None => self.href.clone(),
        }
    }

    /// The effective URL, parsed.
    pub fn url(&self) -> Result<Url> {
        let href = self.effective_href();
        Url::parse(&href).map_err(|e| {
            PageFlowError::internal_error(format!(
                "Invalid page URL `{}`: {}",
                href, e
            ))
        })
    }

    /// The origin (`scheme://host[:port]/`) resources are resolved against.
    pub fn origin(&self) -> Result<Url> {
        let base = if self.is_srcdoc() {
            self.parent_url().ok_or_else(|| {
                PageFlowError::internal_error(
                    "Embedded page without a parent location",
                )
            })?
        } else {
            self.url()?
        };
        base.join("/").map_err(|e| {
            PageFlowError::internal_error(format!(
                "Invalid origin: {}",
                e
            ))
        })
    }

    /// The fragment identifier without `#`, if any.
    pub fn hash(&self) -> Option<String> {
        self.url()
            .ok()
            .and_then(|url| url.fragment().map(str::to_string))
            .filter(|fragment| !fragment.is_empty())
    }

    /// The host name of the effective URL.
    pub fn hostname(&self) -> Option<String> {
        self.url()
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}
