// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, LocalBoxFuture};
use parking_lot::Mutex;

use crate::core::error::{PageFlowError, Result};
use crate::core::traits::{
    DeferredModule, Decorator, FetchResponse, Fetcher, Loader,
    PageModel,
};
use crate::dom::Element;
use crate::headless::HeadlessRuntime;

/// Shared, thread-safe event log.
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

/// A fetcher answering from a route table. Unrouted URLs answer 404.
#[derive(Default)]
pub(crate) struct MockFetcher {
    routes: HashMap<String, Option<FetchResponse>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_response(
        mut self,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        _ = self
            .routes
            .insert(url.into(), Some(FetchResponse::new(status, body)));
        self
    }

    /// Makes `url` fail as if the connection was refused.
    pub(crate) fn with_failure(
        mut self,
        url: impl Into<String>,
    ) -> Self {
        _ = self.routes.insert(url.into(), None);
        self
    }

    /// Delays every response.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<FetchResponse>> {
        self.calls.lock().push(url.to_string());
        let route = self.routes.get(url).cloned();
        let delay = self.delay;
        let url = url.to_string();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match route {
                Some(Some(response)) => Ok(response),
                Some(None) => Err(PageFlowError::network_error(
                    url,
                    "connection refused",
                )),
                None => Ok(FetchResponse::new(404, "")),
            }
        }
        .boxed()
    }
}

/// A decorator whose every block construction fails.
pub(crate) struct FailingDecorator;

impl Decorator for FailingDecorator {
    fn build_block(
        &self,
        name: &str,
        _elements: Vec<Element>,
    ) -> Result<Element> {
        Err(PageFlowError::collaborator_error(
            "build_block",
            format!("{name} refused"),
        ))
    }

    fn decorate_buttons(&self, _container: &Element) {}

    fn decorate_icons(&self, _container: &Element) {}

    fn decorate_sections(&self, _container: &Element) {}

    fn decorate_blocks(&self, _container: &Element) {}

    fn decorate_template_and_theme(&self, _page: &dyn PageModel) {}
}

/// Delegates to a [`HeadlessRuntime`] and records every call. Operations
/// registered with [`RecordingRuntime::fail`] return an error instead.
pub(crate) struct RecordingRuntime {
    inner: HeadlessRuntime,
    events: EventLog,
    failing: Mutex<HashSet<String>>,
}

impl RecordingRuntime {
    pub(crate) fn new() -> Self {
        Self {
            inner: HeadlessRuntime::new(),
            events: Arc::default(),
            failing: Mutex::default(),
        }
    }

    pub(crate) fn events(&self) -> EventLog {
        Arc::clone(&self.events)
    }

    pub(crate) fn recorded(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn fail(&self, event: &str) {
        _ = self.failing.lock().insert(event.to_string());
    }

    /// Records `event` and reports whether it should fail.
    fn record(&self, event: String) -> Result<()> {
        let failing = self.failing.lock().contains(&event);
        self.events.lock().push(event.clone());
        if failing {
            Err(PageFlowError::collaborator_error(
                event,
                "injected failure",
            ))
        } else {
            Ok(())
        }
    }

    fn recorded_load<'a>(
        &'a self,
        event: String,
        load: LocalBoxFuture<'a, Result<()>>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        let outcome = self.record(event);
        async move {
            outcome?;
            load.await
        }
        .boxed_local()
    }
}

impl Decorator for RecordingRuntime {
    fn build_block(
        &self,
        name: &str,
        elements: Vec<Element>,
    ) -> Result<Element> {
        self.record(format!("build_block:{name}"))?;
        self.inner.build_block(name, elements)
    }

    fn decorate_buttons(&self, container: &Element) {
        let _ = self.record("decorate_buttons".to_string());
        self.inner.decorate_buttons(container);
    }

    fn decorate_icons(&self, container: &Element) {
        let _ = self.record("decorate_icons".to_string());
        self.inner.decorate_icons(container);
    }

    fn decorate_sections(&self, container: &Element) {
        let _ = self.record("decorate_sections".to_string());
        self.inner.decorate_sections(container);
    }

    fn decorate_blocks(&self, container: &Element) {
        let _ = self.record("decorate_blocks".to_string());
        self.inner.decorate_blocks(container);
    }

    fn decorate_template_and_theme(&self, page: &dyn PageModel) {
        let _ = self.record("decorate_template_and_theme".to_string());
        self.inner.decorate_template_and_theme(page);
    }
}

impl Loader for RecordingRuntime {
    fn load_section<'a>(
        &'a self,
        section: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        self.recorded_load(
            "load_section".to_string(),
            self.inner.load_section(section),
        )
    }

    fn load_sections<'a>(
        &'a self,
        container: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        self.recorded_load(
            "load_sections".to_string(),
            self.inner.load_sections(container),
        )
    }

    fn wait_for_first_image<'a>(
        &'a self,
        section: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        self.recorded_load(
            "wait_for_first_image".to_string(),
            self.inner.wait_for_first_image(section),
        )
    }

    fn load_header<'a>(
        &'a self,
        header: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        self.recorded_load(
            "load_header".to_string(),
            self.inner.load_header(header),
        )
    }

    fn load_footer<'a>(
        &'a self,
        footer: &'a Element,
    ) -> LocalBoxFuture<'a, Result<()>> {
        self.recorded_load(
            "load_footer".to_string(),
            self.inner.load_footer(footer),
        )
    }

    fn load_css<'a>(
        &'a self,
        href: &'a str,
    ) -> LocalBoxFuture<'a, Result<()>> {
        self.recorded_load(
            format!("load_css:{href}"),
            self.inner.load_css(href),
        )
    }

    fn fetch_placeholders<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<HashMap<String, String>>> {
        let outcome = self.record(format!(
            "fetch_placeholders:{}",
            prefix.unwrap_or("/")
        ));
        async move {
            outcome?;
            self.inner.fetch_placeholders(prefix).await
        }
        .boxed_local()
    }
}

/// A deferred module that records its load and can be told to fail.
pub(crate) struct ControlledModule {
    events: EventLog,
    loaded: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
}

impl ControlledModule {
    pub(crate) fn new(events: EventLog) -> Self {
        Self {
            events,
            loaded: Arc::default(),
            fail: Arc::default(),
        }
    }

    pub(crate) fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn was_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}

impl DeferredModule for ControlledModule {
    fn load(&self) -> BoxFuture<'static, Result<()>> {
        let events = Arc::clone(&self.events);
        let loaded = Arc::clone(&self.loaded);
        let fail = self.fail.swap(false, Ordering::SeqCst);
        async move {
            events.lock().push("delayed".to_string());
            loaded.store(true, Ordering::SeqCst);
            if fail {
                Err(PageFlowError::collaborator_error(
                    "load_delayed",
                    "module threw",
                ))
            } else {
                Ok(())
            }
        }
        .boxed()
    }
}
