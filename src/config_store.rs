// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Configuration Store
//!
//! Fetches, merges and caches the global and locale configuration of the
//! active environment.
//!
//! 1. The environment and locale are resolved from the page location.
//! 2. One resolution per environment is registered in a [`SingleFlight`];
//!    every caller awaits the same shared future.
//! 3. A resolution reads the session blobs `config` and `config:{locale}`.
//!    Missing blobs are fetched concurrently and persisted raw, before
//!    parsing.
//! 4. The locale set is merged into the global set: existing keys keep their
//!    position with the locale value, new keys are appended in locale order.
//!
//! Fetch and parse failures are logged and the store falls back to whatever
//! blob the session already holds, or to an empty set. Callers never see an
//! error; a missing key reads as `None`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::core::config::Settings;
use crate::core::error::{PageFlowError, Result};
use crate::core::traits::{Fetcher, SessionStore};
use crate::environment::{resolve_environment, Environment};
use crate::locale::{resolve_locale, Locale};
use crate::location::PageLocation;
use crate::session::{config_key, ENVIRONMENT_KEY};
use crate::single_flight::SingleFlight;

/// One configuration key and its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// The key.
    pub key: String,
    /// The value.
    #[serde(default)]
    pub value: String,
}

impl ConfigEntry {
    /// Creates an entry.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ordered configuration set, as served by a config resource
/// (`{ "data": [ { "key": ..., "value": ... } ] }`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSet {
    /// Entries in resource order.
    #[serde(default)]
    pub data: Vec<ConfigEntry>,
}

impl ConfigSet {
    /// Creates a set from entries.
    pub fn new(data: Vec<ConfigEntry>) -> Self {
        Self { data }
    }

    /// Parses a config resource body.
    pub fn from_json(blob: &str) -> serde_json::Result<Self> {
        serde_json::from_str(blob)
    }

    /// The value of the first entry with `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    /// Merges an overlay into this set in place.
    pub fn merge(&mut self, overlay: ConfigSet) {
        for entry in overlay.data {
            let existing =
                self.data.iter_mut().find(|held| held.key == entry.key);
            match existing {
                Some(existing) => existing.value = entry.value,
                None => self.data.push(entry),
            }
        }
    }

    /// The entries as a key-value map.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.data
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Everything one resolution needs, cloned into the shared future.
#[derive(Clone)]
struct StoreContext {
    settings: Arc<Settings>,
    fetcher: Arc<dyn Fetcher>,
    session: Arc<dyn SessionStore>,
    location: PageLocation,
    declared_language: Option<String>,
}

impl StoreContext {
    fn environment(&self) -> Environment {
        let session_override = self.session.get(ENVIRONMENT_KEY);
        resolve_environment(
            &self.location.effective_href(),
            &self.settings.environment_rules,
            session_override.as_deref(),
        )
    }

    fn locale(&self) -> Locale {
        resolve_locale(
            &self.location.effective_href(),
            self.declared_language.as_deref(),
            &self.settings.rtl_languages,
            &self.settings.default_language,
        )
    }

    fn config_url(
        &self,
        env: Environment,
        locale: Option<&str>,
    ) -> Result<Url> {
        let base = match &self.settings.config_origin {
            Some(origin) => Url::parse(origin).map_err(|e| {
                PageFlowError::config_error(
                    format!(
                        "Invalid config origin `{}`: {}",
                        origin, e
                    ),
                    None,
                )
            })?,
            None => self.location.origin()?,
        };

        let file_name = if env.has_dedicated_config_file() {
            format!("configs-{}.json", env)
        } else {
            self.settings.config_file_name.clone()
        };
        let path = match locale {
            Some(locale) => format!("{}/{}", locale, file_name),
            None => file_name,
        };

        base.join(&path).map_err(|e| {
            PageFlowError::internal_error(format!(
                "Invalid config path `{}`: {}",
                path, e
            ))
        })
    }

    async fn fetch_blob(
        &self,
        env: Environment,
        locale: Option<&str>,
    ) -> Result<String> {
        let url = self.config_url(env, locale)?;
        let response =
            self.fetcher.fetch(url.as_str()).await.map_err(|e| {
                PageFlowError::config_fetch_error(
                    url.as_str(),
                    e.to_string(),
                )
            })?;
        if !response.is_success() {
            return Err(PageFlowError::config_fetch_error(
                url.as_str(),
                format!("HTTP status {}", response.status),
            ));
        }
        Ok(response.body)
    }

    /// The stored blob, or a freshly fetched and persisted one.
    async fn obtain_blob(
        &self,
        env: Environment,
        locale: Option<&str>,
    ) -> Option<String> {
        let key = config_key(locale);
        if let Some(blob) = self.session.get(&key) {
            log::debug!("Using stored config blob `{}`", key);
            return Some(blob);
        }

        match self.fetch_blob(env, locale).await {
            Ok(blob) => {
                if let Err(e) = self.session.set(&key, &blob) {
                    log::warn!(
                        "Failed to persist config blob `{}`: {}",
                        key,
                        e
                    );
                }
                Some(blob)
            }
            Err(e) => {
                log::error!("No config loaded for `{}`: {}", key, e);
                self.session.get(&key)
            }
        }
    }

    fn parse_blob(key: &str, blob: Option<String>) -> ConfigSet {
        let Some(blob) = blob else {
            return ConfigSet::default();
        };
        ConfigSet::from_json(&blob).unwrap_or_else(|source| {
            let err = PageFlowError::ConfigParse {
                key: key.to_string(),
                source,
            };
            log::error!("{}", err);
            ConfigSet::default()
        })
    }

    async fn resolve(self, env: Environment) -> Arc<ConfigSet> {
        let language = self.locale().language;
        let (global, local) = join(
            self.obtain_blob(env, None),
            self.obtain_blob(env, Some(&language)),
        )
        .await;

        let locale_key = config_key(Some(&language));
        let mut set = Self::parse_blob(&config_key(None), global);
        set.merge(Self::parse_blob(&locale_key, local));
        log::debug!(
            "Resolved {} config entries for {} ({})",
            set.len(),
            env,
            language
        );
        Arc::new(set)
    }
}

/// Resolves configuration values for the current page.
pub struct ConfigStore {
    context: StoreContext,
    flights: SingleFlight<Environment, Arc<ConfigSet>>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("location", &self.context.location)
            .field("flights", &self.flights)
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Creates a store for a page location.
    pub fn new(
        settings: Arc<Settings>,
        fetcher: Arc<dyn Fetcher>,
        session: Arc<dyn SessionStore>,
        location: PageLocation,
    ) -> Self {
        Self {
            context: StoreContext {
                settings,
                fetcher,
                session,
                location,
                declared_language: None,
            },
            flights: SingleFlight::new(),
        }
    }

    /// Sets the document's declared language, used when the path carries no
    /// right-to-left segment.
    pub fn with_declared_language<S: Into<String>>(
        mut self,
        language: S,
    ) -> Self {
        self.context.declared_language = Some(language.into());
        self
    }

    /// The active environment.
    pub fn environment(&self) -> Environment {
        self.context.environment()
    }

    /// The active locale.
    pub fn locale(&self) -> Locale {
        self.context.locale()
    }

    /// The URL of the global (`locale = None`) or locale config resource.
    pub fn config_url(
        &self,
        env: Environment,
        locale: Option<&str>,
    ) -> Result<Url> {
        self.context.config_url(env, locale)
    }

    /// The merged configuration of the active environment.
    pub async fn config_set(&self) -> Arc<ConfigSet> {
        let env = self.environment();
        let context = self.context.clone();
        self.flights
            .get_or_create(env, move || context.resolve(env))
            .await
    }

    /// The value of `key`, or `None` when it is not configured.
    pub async fn get_config_value(&self, key: &str) -> Option<String> {
        self.config_set().await.get(key).map(str::to_string)
    }

    /// Every configured key and value.
    pub async fn get_all_configs(&self) -> HashMap<String, String> {
        self.config_set().await.to_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::test_utils::MockFetcher;
    use std::time::Duration;

    const ORIGIN: &str = "https://www.example.com";

    const GLOBAL_BLOB: &str = r#"{"total":2,"data":[
        {"key":"a","value":"1"},{"key":"b","value":"2"}]}"#;

    const LOCALE_BLOB: &str = r#"{"data":[
        {"key":"b","value":"20"},{"key":"c","value":"3"}]}"#;

    fn store(
        href: &str,
        fetcher: Arc<MockFetcher>,
        session: Arc<MemorySessionStore>,
    ) -> ConfigStore {
        ConfigStore::new(
            Arc::new(Settings::default()),
            fetcher,
            session,
            PageLocation::new(href),
        )
    }

    /// A fetcher serving `global` and the `locale` resource of `ORIGIN`.
    fn site(locale: &str, global: &str, local: &str) -> MockFetcher {
        MockFetcher::new()
            .with_response(
                format!("{ORIGIN}/configs.json"),
                200,
                global,
            )
            .with_response(
                format!("{ORIGIN}/{locale}/configs.json"),
                200,
                local,
            )
    }

    async fn value(store: &ConfigStore, key: &str) -> Option<String> {
        store.get_config_value(key).await
    }

    #[test]
    fn test_merge_law() {
        let mut global = ConfigSet::new(vec![
            ConfigEntry::new("a", "1"),
            ConfigEntry::new("b", "2"),
        ]);
        global.merge(ConfigSet::new(vec![
            ConfigEntry::new("b", "20"),
            ConfigEntry::new("c", "3"),
        ]));
        assert_eq!(
            global.data,
            vec![
                ConfigEntry::new("a", "1"),
                ConfigEntry::new("b", "20"),
                ConfigEntry::new("c", "3"),
            ]
        );
    }

    #[test]
    fn test_config_urls() {
        let store = store(
            "https://www.example.com/ar/home",
            Arc::new(MockFetcher::new()),
            Arc::new(MemorySessionStore::new()),
        );
        let url = |env, locale| {
            store.config_url(env, locale).map(String::from).ok()
        };

        assert_eq!(
            url(Environment::Prod, None).as_deref(),
            Some("https://www.example.com/configs.json")
        );
        assert_eq!(
            url(Environment::Prod, Some("ar")).as_deref(),
            Some("https://www.example.com/ar/configs.json")
        );
        assert_eq!(
            url(Environment::Stage, Some("en")).as_deref(),
            Some("https://www.example.com/en/configs-stage.json")
        );
        assert_eq!(
            url(Environment::Dev, None).as_deref(),
            Some("https://www.example.com/configs.json")
        );
    }

    #[test]
    fn test_config_origin_setting() {
        let settings = Settings {
            config_origin: Some(
                "https://cdn.example.com/site/".to_string(),
            ),
            ..Default::default()
        };
        let store = ConfigStore::new(
            Arc::new(settings),
            Arc::new(MockFetcher::new()),
            Arc::new(MemorySessionStore::new()),
            PageLocation::new("https://www.example.com/en/"),
        );
        let url = store
            .config_url(Environment::Pprod, Some("en"))
            .map(String::from)
            .ok();
        assert_eq!(
            url.as_deref(),
            Some("https://cdn.example.com/site/en/configs-pprod.json")
        );
    }

    #[tokio::test]
    async fn test_fetches_merges_and_persists() {
        let fetcher = Arc::new(site("en", GLOBAL_BLOB, LOCALE_BLOB));
        let session = Arc::new(MemorySessionStore::new());
        let store = store(
            "https://www.example.com/en/",
            fetcher.clone(),
            session.clone(),
        );

        assert_eq!(value(&store, "b").await.as_deref(), Some("20"));
        assert_eq!(value(&store, "c").await.as_deref(), Some("3"));
        assert_eq!(store.get_config_value("missing").await, None);

        let all = store.get_all_configs().await;
        assert_eq!(all.len(), 3);
        assert_eq!(all.get("a").map(String::as_str), Some("1"));

        assert_eq!(session.get("config").as_deref(), Some(GLOBAL_BLOB));
        assert_eq!(
            session.get("config:en").as_deref(),
            Some(LOCALE_BLOB)
        );
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_issue_one_pair_of_requests() {
        let fetcher = Arc::new(
            site("en", GLOBAL_BLOB, LOCALE_BLOB)
                .with_delay(Duration::from_millis(20)),
        );
        let store = store(
            "https://www.example.com/",
            fetcher.clone(),
            Arc::new(MemorySessionStore::new()),
        );

        let (a, c) = join(
            store.get_config_value("a"),
            store.get_config_value("c"),
        )
        .await;
        assert_eq!(a.as_deref(), Some("1"));
        assert_eq!(c.as_deref(), Some("3"));
        assert_eq!(fetcher.call_count(), 2);

        // The cache is never invalidated.
        let _ = store.get_all_configs().await;
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_stored_blobs_skip_the_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let session = Arc::new(MemorySessionStore::new());
        session.set("config", GLOBAL_BLOB).unwrap();
        session.set("config:en", LOCALE_BLOB).unwrap();

        let store = store(ORIGIN, fetcher.clone(), session);
        assert_eq!(value(&store, "b").await.as_deref(), Some("20"));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_only_missing_blob_is_fetched() {
        let fetcher = Arc::new(MockFetcher::new().with_response(
            format!("{ORIGIN}/en/configs.json"),
            200,
            LOCALE_BLOB,
        ));
        let session = Arc::new(MemorySessionStore::new());
        session.set("config", GLOBAL_BLOB).unwrap();

        let store = store(ORIGIN, fetcher.clone(), session);
        assert_eq!(value(&store, "c").await.as_deref(), Some("3"));
        assert_eq!(
            fetcher.calls(),
            vec![format!("{ORIGIN}/en/configs.json")]
        );
    }

    #[tokio::test]
    async fn test_fetch_error_serves_persisted_value() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_failure(format!("{ORIGIN}/en/configs.json")),
        );
        let session = Arc::new(MemorySessionStore::new());
        session.set("config", GLOBAL_BLOB).unwrap();

        let store = store(ORIGIN, fetcher, session);
        assert_eq!(value(&store, "a").await.as_deref(), Some("1"));
        assert_eq!(store.get_config_value("c").await, None);
    }

    #[tokio::test]
    async fn test_nothing_persisted_yields_empty_set() {
        // Unrouted URLs answer 404.
        let fetcher = Arc::new(MockFetcher::new());
        let session = Arc::new(MemorySessionStore::new());
        let store = store(ORIGIN, fetcher, session.clone());

        assert!(store.get_all_configs().await.is_empty());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_blob_is_persisted_but_ignored() {
        let fetcher = Arc::new(site("en", "{not json", LOCALE_BLOB));
        let session = Arc::new(MemorySessionStore::new());
        let store = store(ORIGIN, fetcher, session.clone());

        assert_eq!(store.get_config_value("a").await, None);
        assert_eq!(value(&store, "b").await.as_deref(), Some("20"));
        assert_eq!(session.get("config").as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_environment_override_selects_resource() {
        let local = "http://localhost:3000";
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(
                    format!("{local}/configs-stage.json"),
                    200,
                    GLOBAL_BLOB,
                )
                .with_response(
                    format!("{local}/en/configs-stage.json"),
                    200,
                    LOCALE_BLOB,
                ),
        );
        let session = Arc::new(MemorySessionStore::new());
        session.set(ENVIRONMENT_KEY, "stage").unwrap();

        let store = store(local, fetcher.clone(), session);
        assert_eq!(store.environment(), Environment::Stage);
        assert_eq!(value(&store, "a").await.as_deref(), Some("1"));
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rtl_locale_blob() {
        let fetcher = Arc::new(site(
            "ar",
            GLOBAL_BLOB,
            r#"{"data":[{"key":"a","value":"واحد"}]}"#,
        ));
        let session = Arc::new(MemorySessionStore::new());
        let store = store(
            "https://www.example.com/ar/home",
            fetcher,
            session.clone(),
        )
        .with_declared_language("en");

        let value = store.get_config_value("a").await;
        assert_eq!(value.as_deref(), Some("واحد"));
        assert!(session.get("config:ar").is_some());
    }
}
