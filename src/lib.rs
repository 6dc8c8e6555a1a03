// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # PageFlow Library
//!
//! PageFlow resolves the runtime configuration of a block-driven content site
//! and assembles its pages in three staged phases. It includes environment and
//! locale resolution, a single-flight configuration store with session
//! persistence, a fragment loader, and a page bootstrapper that depends on
//! its decoration and loading collaborators only through traits.
//!
//! For more information, visit the [PageFlow documentation](https://docs.rs/pageflow).

#![doc = include_str!("../README.md")]
#![doc(html_root_url = "https://docs.rs/pageflow")]
#![crate_name = "pageflow"]
#![crate_type = "lib"]

/// Module containing core utilities, such as settings, errors and traits.
pub mod core {
    /// Handles the runtime settings of PageFlow.
    pub mod config;
    /// Contains error types and handling for PageFlow.
    pub mod error;
    /// Capabilities supplied by the host: network, session, page, blocks.
    pub mod traits;
}

/// Staged page assembly.
pub mod bootstrap;

/// Per-environment configuration store.
pub mod config_store;

/// Main-content decoration and synthetic blocks.
pub mod decorate;

/// HTML document model.
pub mod dom;

/// Deployment environment detection.
pub mod environment;

/// HTTP fetcher.
pub mod fetch;

/// Fragment loading and the error page.
pub mod fragment;

/// Block runtime for targets without a browser.
pub mod headless;

/// Locale resolution and date formatting.
pub mod locale;

/// Page location handling.
pub mod location;

/// Page model over an HTML document.
pub mod page;

/// Session-scoped persistence.
pub mod session;

/// Single-flight resolution.
pub mod single_flight;

#[cfg(test)]
mod test_utils;

pub use crate::bootstrap::{
    DelayedTask, PageBootstrapper, Phase, RemoteModule,
};
pub use crate::config_store::{ConfigEntry, ConfigSet, ConfigStore};
pub use crate::core::config::{Settings, SettingsBuilder};
pub use crate::core::error::{PageFlowError, Result};
pub use crate::core::traits::{
    Collaborators, Decorator, DeferredModule, FetchResponse, Fetcher,
    Loader, PageModel, SessionStore,
};
pub use crate::environment::Environment;
pub use crate::fetch::HttpFetcher;
pub use crate::fragment::FragmentLoader;
pub use crate::headless::HeadlessRuntime;
pub use crate::locale::{Direction, Locale};
pub use crate::location::PageLocation;
pub use crate::page::HtmlPage;
pub use crate::session::{FileSessionStore, MemorySessionStore};

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::sync::Arc;

    use crate::test_utils::{ControlledModule, MockFetcher};

    #[tokio::test(start_paused = true)]
    async fn test_page_assembly_end_to_end() -> Result<()> {
        let href = "https://www.example.com/en/home";
        let settings = Arc::new(SettingsBuilder::new().build()?);
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(
                    "https://www.example.com/configs.json",
                    200,
                    r#"{"data":[{"key":"currency","value":"KWD"}]}"#,
                )
                .with_response(
                    "https://www.example.com/en/configs.json",
                    200,
                    r#"{"data":[{"key":"store","value":"kw-en"}]}"#,
                ),
        );
        let session = Arc::new(MemorySessionStore::new());

        let store = ConfigStore::new(
            Arc::clone(&settings),
            fetcher.clone(),
            session.clone(),
            PageLocation::new(href),
        );
        assert_eq!(store.environment(), Environment::Prod);
        let value = store.get_config_value("store").await;
        assert_eq!(value.as_deref(), Some("kw-en"));

        let page = HtmlPage::parse(
            "<html><head></head><body><header></header>\
             <main><div><h1>Hi</h1><picture><img></picture></div>\
             </main>\
             <footer></footer></body></html>",
            PageLocation::new(href),
        );
        let module = Arc::new(ControlledModule::new(Arc::default()));
        let bootstrapper = PageBootstrapper::new(
            settings,
            page,
            Collaborators::from_runtime(Rc::new(
                HeadlessRuntime::new(),
            )),
            fetcher,
            session,
            module.clone(),
        );

        let task = bootstrapper.run().await?;
        task.join().await;
        assert!(module.was_loaded());
        assert!(bootstrapper.page().to_html().contains("hero-wrapper"));
        Ok(())
    }
}
