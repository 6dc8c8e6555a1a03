// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Page Bootstrapper
//!
//! Assembles a page in three strictly ordered phases:
//!
//! - **Eager**: language, template and theme, main-content decoration (or
//!   the error page), visibility, and the first section up to its first
//!   image. Fonts start loading on wide viewports or when an earlier page of
//!   the session already loaded them.
//! - **Lazy**: remaining sections, scrolling to the URL fragment, header,
//!   footer, the non-critical stylesheet and fonts.
//! - **Delayed**: a task that loads the deferred behaviour module
//!   [`DELAYED_PHASE_DELAY`] after the phase starts. The caller gets a
//!   [`DelayedTask`] handle and never waits on it.
//!
//! Collaborator failures inside a phase are logged and do not stop the
//! bootstrap. [`PageBootstrapper::run`] returns
//! [`PageFlowError::PhaseOrder`] when the phases were already run, and
//! [`PageFlowError::InternalError`] when no Tokio runtime is available to
//! schedule the delayed phase on. In the latter case the tracker stays at
//! [`Phase::Lazy`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{
    join4, BoxFuture, FutureExt, LocalBoxFuture, Shared,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::config::Settings;
use crate::core::error::{PageFlowError, Result};
use crate::core::traits::{
    Collaborators, DeferredModule, Fetcher, Loader, PageModel,
    SessionStore,
};
use crate::decorate::decorate_main;
use crate::dom::Element;
use crate::fragment::FragmentLoader;
use crate::locale::{resolve_locale, Locale};
use crate::location::PageLocation;
use crate::session::FONTS_LOADED_KEY;

/// Delay between the start of the delayed phase and the deferred module load.
pub const DELAYED_PHASE_DELAY: Duration = Duration::from_millis(3000);

/// A bootstrap phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Everything needed for the first meaningful paint.
    Eager,
    /// Everything else that should not wait.
    Lazy,
    /// Work scheduled well after the page is usable.
    Delayed,
}

impl Phase {
    /// The lower-case phase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Eager => "eager",
            Phase::Lazy => "lazy",
            Phase::Delayed => "delayed",
        }
    }

    fn successor(current: Option<Phase>) -> Option<Phase> {
        match current {
            None => Some(Phase::Eager),
            Some(Phase::Eager) => Some(Phase::Lazy),
            Some(Phase::Lazy) => Some(Phase::Delayed),
            Some(Phase::Delayed) => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforces Eager → Lazy → Delayed, each entered once.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    current: Cell<Option<Phase>>,
}

impl PhaseTracker {
    /// Creates a tracker before the first phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase entered last.
    pub fn current(&self) -> Option<Phase> {
        self.current.get()
    }

    /// Enters `phase` if it is the next one.
    pub fn enter(&self, phase: Phase) -> Result<()> {
        let current = self.current.get();
        if Phase::successor(current) != Some(phase) {
            return Err(PageFlowError::PhaseOrder {
                from: current
                    .map_or("start", Phase::as_str)
                    .to_string(),
                to: phase,
            });
        }
        self.current.set(Some(phase));
        log::debug!("Entering {} phase", phase);
        Ok(())
    }
}

/// Handle to the scheduled deferred module load.
#[derive(Debug)]
pub struct DelayedTask {
    handle: JoinHandle<()>,
}

impl DelayedTask {
    /// Whether the load has run.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the load if it has not run yet.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the load. Its outcome has already been logged.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                log::error!("Delayed phase task failed: {}", e);
            }
        }
    }
}

/// The deferred behaviour module, fetched from the site.
#[derive(Clone)]
pub struct RemoteModule {
    fetcher: Arc<dyn Fetcher>,
    url: String,
}

impl fmt::Debug for RemoteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteModule").field("url", &self.url).finish()
    }
}

impl RemoteModule {
    /// A module served at `url`.
    pub fn new<S: Into<String>>(
        fetcher: Arc<dyn Fetcher>,
        url: S,
    ) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }

    /// The module configured in `settings`, resolved against the page origin.
    pub fn from_settings(
        fetcher: Arc<dyn Fetcher>,
        settings: &Settings,
        location: &PageLocation,
    ) -> Result<Self> {
        let href = settings.delayed_module_href();
        let url = location.origin()?.join(&href).map_err(|e| {
            PageFlowError::config_error(
                format!(
                    "Invalid delayed module path `{}`: {}",
                    href, e
                ),
                None,
            )
        })?;
        Ok(Self::new(fetcher, url))
    }

    /// Where the module is fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DeferredModule for RemoteModule {
    fn load(&self) -> BoxFuture<'static, Result<()>> {
        let fetcher = Arc::clone(&self.fetcher);
        let url = self.url.clone();
        async move {
            let response = fetcher.fetch(&url).await?;
            if !response.is_success() {
                return Err(PageFlowError::collaborator_error(
                    "load_delayed",
                    format!(
                        "{} returned HTTP status {}",
                        url, response.status
                    ),
                ));
            }
            log::debug!(
                "Loaded {} ({} bytes)",
                url,
                response.body.len()
            );
            Ok(())
        }
        .boxed()
    }
}

/// Asks the loader for the placeholders of the page's language, `/{lang}`
/// in lower case, or the site root when the page declares none. Failures
/// yield an empty map.
pub async fn fetch_placeholders_for_locale(
    loader: &dyn Loader,
    page: &dyn PageModel,
) -> HashMap<String, String> {
    let prefix = page
        .declared_language()
        .map(|language| format!("/{}", language.to_lowercase()));
    loader
        .fetch_placeholders(prefix.as_deref())
        .await
        .unwrap_or_else(|e| {
            log::warn!("Failed to fetch placeholders: {}", e);
            HashMap::new()
        })
}

type FontLoad = Shared<LocalBoxFuture<'static, ()>>;

/// Runs the page lifecycle over a page model and its collaborators.
pub struct PageBootstrapper<P: PageModel> {
    settings: Arc<Settings>,
    page: P,
    collaborators: Collaborators,
    fragments: FragmentLoader,
    session: Arc<dyn SessionStore>,
    deferred: Arc<dyn DeferredModule>,
    phases: PhaseTracker,
    fonts: RefCell<Option<FontLoad>>,
}

impl<P: PageModel> fmt::Debug for PageBootstrapper<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBootstrapper")
            .field("location", self.page.location())
            .field("phase", &self.phases.current())
            .finish_non_exhaustive()
    }
}

impl<P: PageModel> PageBootstrapper<P> {
    /// Creates a bootstrapper. Fragments are fetched through `fetcher`
    /// relative to the page's origin.
    pub fn new(
        settings: Arc<Settings>,
        page: P,
        collaborators: Collaborators,
        fetcher: Arc<dyn Fetcher>,
        session: Arc<dyn SessionStore>,
        deferred: Arc<dyn DeferredModule>,
    ) -> Self {
        let fragments = FragmentLoader::new(
            Arc::clone(&settings),
            fetcher,
            collaborators.clone(),
            page.location().clone(),
        );
        Self {
            settings,
            page,
            collaborators,
            fragments,
            session,
            deferred,
            phases: PhaseTracker::new(),
            fonts: RefCell::new(None),
        }
    }

    /// The page being assembled.
    pub fn page(&self) -> &P {
        &self.page
    }

    /// The phase entered last.
    pub fn phase(&self) -> Option<Phase> {
        self.phases.current()
    }

    /// The fragment loader bound to this page.
    pub fn fragments(&self) -> &FragmentLoader {
        &self.fragments
    }

    /// The locale of the page.
    pub fn locale(&self) -> Locale {
        let declared = self.page.declared_language();
        resolve_locale(
            &self.page.location().effective_href(),
            declared.as_deref(),
            &self.settings.rtl_languages,
            &self.settings.default_language,
        )
    }

    /// Runs the eager and lazy phases, then schedules the delayed phase.
    pub async fn run(&self) -> Result<DelayedTask> {
        self.load_eager().await?;
        self.load_lazy().await?;
        self.load_delayed()
    }

    /// The placeholders of the page's language.
    pub async fn fetch_placeholders_for_locale(
        &self,
    ) -> HashMap<String, String> {
        let loader = self.collaborators.loader.as_ref();
        fetch_placeholders_for_locale(loader, &self.page).await
    }

    async fn load_eager(&self) -> Result<()> {
        self.phases.enter(Phase::Eager)?;
        let locale = self.locale();
        self.page.set_language(&locale);
        self.collaborators
            .decorator
            .decorate_template_and_theme(&self.page);

        match self.page.main() {
            Some(main) => {
                if self.page.is_missing_resource() {
                    main.clear();
                    let _ = self
                        .fragments
                        .load_error_page(&self.page, 404)
                        .await;
                } else {
                    let decorator = &self.collaborators.decorator;
                    decorate_main(&main, decorator.as_ref());
                }
                self.page.mark_visible();

                if let Some(section) = main.find_class("section") {
                    self.load_first_section(&section).await;
                }
            }
            None => {
                log::warn!("Page has no main element");
                self.page.mark_visible();
            }
        }

        let min_width = self.settings.desktop_min_width;
        let wide = self.page.viewport_width() >= min_width;
        if wide || self.session.get(FONTS_LOADED_KEY).is_some() {
            let _ = self.load_fonts();
        }
        Ok(())
    }

    async fn load_first_section(&self, section: &Element) {
        let loader = &self.collaborators.loader;
        if let Err(e) = loader.load_section(section).await {
            log::warn!("Loading the first section failed: {}", e);
        }
        if let Err(e) = loader.wait_for_first_image(section).await {
            log::warn!("Waiting for the first image failed: {}", e);
        }
    }

    async fn load_lazy(&self) -> Result<()> {
        self.phases.enter(Phase::Lazy)?;
        let loader = &self.collaborators.loader;

        if let Some(main) = self.page.main() {
            if let Err(e) = loader.load_sections(&main).await {
                log::warn!("Loading sections failed: {}", e);
            }
        }

        if let Some(hash) = self.page.location().hash() {
            if let Some(target) = self.page.element_by_id(&hash) {
                self.page.scroll_into_view(&target);
            }
        }

        let header = self.page.header();
        let footer = self.page.footer();
        let lazy_styles = self.settings.lazy_styles_href();
        let (header_loaded, footer_loaded, styles_loaded, ()) = join4(
            async {
                match &header {
                    Some(header) => loader.load_header(header).await,
                    None => Ok(()),
                }
            },
            async {
                match &footer {
                    Some(footer) => loader.load_footer(footer).await,
                    None => Ok(()),
                }
            },
            loader.load_css(&lazy_styles),
            self.load_fonts(),
        )
        .await;

        for (what, outcome) in [
            ("header", header_loaded),
            ("footer", footer_loaded),
            ("lazy styles", styles_loaded),
        ] {
            if let Err(e) = outcome {
                log::warn!("Loading {} failed: {}", what, e);
            }
        }
        Ok(())
    }

    fn load_delayed(&self) -> Result<DelayedTask> {
        let runtime = Handle::try_current().map_err(|e| {
            PageFlowError::internal_error(format!(
                "Cannot schedule the delayed phase: {}",
                e
            ))
        })?;
        self.phases.enter(Phase::Delayed)?;
        let deadline = Instant::now() + DELAYED_PHASE_DELAY;
        let module = Arc::clone(&self.deferred);
        let handle = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            match module.load().await {
                Ok(()) => log::debug!("Delayed phase complete"),
                Err(e) => log::error!("Delayed phase failed: {}", e),
            }
        });
        Ok(DelayedTask { handle })
    }

    /// Starts the font stylesheet once and returns the shared load. The first
    /// call polls it once so the request is issued without waiting.
    fn load_fonts(&self) -> FontLoad {
        if let Some(load) = self.fonts.borrow().as_ref() {
            return load.clone();
        }

        let loader = Rc::clone(&self.collaborators.loader);
        let session = Arc::clone(&self.session);
        let href = self.settings.fonts_href();
        let remember = !self
            .page
            .location()
            .hostname()
            .is_some_and(|host| host.contains("localhost"));
        let load = async move {
            match loader.load_css(&href).await {
                Ok(()) if remember => {
                    let marked = session.set(FONTS_LOADED_KEY, "true");
                    if let Err(e) = marked {
                        log::warn!(
                            "Failed to remember loaded fonts: {}",
                            e
                        );
                    }
                }
                Ok(()) => {}
                Err(e) => log::warn!("Loading fonts failed: {}", e),
            }
        }
        .boxed_local()
        .shared();

        *self.fonts.borrow_mut() = Some(load.clone());
        let _ = load.clone().now_or_never();
        load
    }
}
