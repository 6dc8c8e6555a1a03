// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Settings Module
//!
//! Runtime settings for PageFlow: where configuration resources live, which
//! stylesheets and modules the bootstrap loads, locale defaults, and the
//! hostname rules used for environment detection. Settings come from a TOML
//! file, environment variables, and programmatic overrides, applied in that
//! order.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pageflow::core::config::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new()
//!     .with_file("pageflow.toml")
//!     .with_env_prefix("PAGEFLOW_")
//!     .with_override("desktop_min_width", 1024)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(settings.desktop_min_width, 1024);
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toml::Value as TomlValue;

use crate::core::error::{PageFlowError, Result};
use crate::environment::{default_rules, HostRule};

/// The settings consumed by the config store, fragment loader and
/// bootstrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Origin for configuration resources. The page origin is used when unset.
    pub config_origin: Option<String>,
    /// File name of the default configuration resource.
    pub config_file_name: String,
    /// Prefix prepended to stylesheet and module paths.
    pub code_base_path: String,
    /// Site-rooted path of the fonts stylesheet.
    pub fonts_stylesheet: String,
    /// Site-rooted path of the non-critical stylesheet loaded in the
    /// lazy phase.
    pub lazy_stylesheet: String,
    /// Site-rooted path of the deferred behaviour module.
    pub delayed_module: String,
    /// Viewport width from which fonts load during the eager phase.
    pub desktop_min_width: u32,
    /// Language used when neither the path nor the document declares one.
    pub default_language: String,
    /// Languages written right to left, detected from a path segment.
    pub rtl_languages: Vec<String>,
    /// Prefix of fragment-relative media references.
    pub media_prefix: String,
    /// Hostname rules for environment detection, in precedence order.
    pub environment_rules: Vec<HostRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_origin: None,
            config_file_name: "configs.json".to_string(),
            code_base_path: String::new(),
            fonts_stylesheet: "/styles/fonts.css".to_string(),
            lazy_stylesheet: "/styles/lazy-styles.css".to_string(),
            delayed_module: "/scripts/delayed.js".to_string(),
            desktop_min_width: 900,
            default_language: "en".to_string(),
            rtl_languages: vec!["ar".to_string()],
            media_prefix: "./media_".to_string(),
            environment_rules: default_rules(),
        }
    }
}

impl Settings {
    /// Validates the settings.
    pub fn validate(&self) -> Result<()> {
        validate_settings(self)
    }

    /// The URL path of the fonts stylesheet.
    pub fn fonts_href(&self) -> String {
        format!("{}{}", self.code_base_path, self.fonts_stylesheet)
    }

    /// The URL path of the lazy stylesheet.
    pub fn lazy_styles_href(&self) -> String {
        format!("{}{}", self.code_base_path, self.lazy_stylesheet)
    }

    /// The URL path of the deferred behaviour module.
    pub fn delayed_module_href(&self) -> String {
        format!("{}{}", self.code_base_path, self.delayed_module)
    }
}

/// Builds a `Settings` instance from a file, environment variables and
/// overrides.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings_file: Option<PathBuf>,
    env_prefix: Option<String>,
    overrides: HashMap<String, TomlValue>,
}

impl SettingsBuilder {
    /// Initialises a new `SettingsBuilder` instance with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a TOML settings file to the builder.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a prefix for environment variables overriding settings, for
    /// example `PAGEFLOW_` so that `PAGEFLOW_CODE_BASE_PATH` sets
    /// `code_base_path`.
    pub fn with_env_prefix<S: Into<String>>(
        mut self,
        prefix: S,
    ) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Adds a key-value pair overriding a setting.
    pub fn with_override<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<TomlValue>,
    {
        _ = self.overrides.insert(key.into(), value.into());
        self
    }

    /// Builds the final settings by applying file, environment and manual
    /// overrides, then validating the result.
    pub fn build(self) -> Result<Settings> {
        let mut settings = if let Some(path) = self.settings_file {
            load_from_file(&path)?
        } else {
            Settings::default()
        };

        if let Some(prefix) = self.env_prefix {
            apply_env_overrides(&mut settings, &prefix)?;
        }

        apply_overrides(&mut settings, &self.overrides)?;
        validate_settings(&settings)?;

        Ok(settings)
    }
}

// Internal helper functions

fn load_from_file(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path).map_err(|e| {
        PageFlowError::config_error(
            format!("Failed to read settings file: {}", e),
            Some(path.to_path_buf()),
        )
    })?;

    toml::from_str(&content).map_err(|e| {
        PageFlowError::config_error(
            format!("Failed to parse settings file: {}", e),
            Some(path.to_path_buf()),
        )
    })
}

/// Settings that can be set from a single scalar value. The
/// `environment_rules` table is file-only.
const SCALAR_SETTINGS: &[&str] = &[
    "config_origin",
    "config_file_name",
    "code_base_path",
    "fonts_stylesheet",
    "lazy_stylesheet",
    "delayed_module",
    "default_language",
    "media_prefix",
    "desktop_min_width",
    "rtl_languages",
];

fn apply_env_overrides(
    settings: &mut Settings,
    prefix: &str,
) -> Result<()> {
    for (key, value) in env::vars() {
        let Some(stripped) = key.strip_prefix(prefix) else {
            continue;
        };
        let setting_key =
            stripped.trim_start_matches('_').to_lowercase();
        if !SCALAR_SETTINGS.contains(&setting_key.as_str()) {
            log::warn!(
                "Ignoring environment variable {}: no setting `{}`",
                key,
                setting_key
            );
            continue;
        }
        apply_setting_value(settings, &setting_key, &value)?;
    }
    Ok(())
}

fn apply_overrides(
    settings: &mut Settings,
    overrides: &HashMap<String, TomlValue>,
) -> Result<()> {
    for (key, value) in overrides {
        apply_setting_value(settings, key, value)?;
    }
    Ok(())
}

fn apply_setting_value<T: ToString>(
    settings: &mut Settings,
    key: &str,
    value: &T,
) -> Result<()> {
    let value_str = value.to_string().trim_matches('"').to_string();
    match key {
        "config_origin" => {
            settings.config_origin =
                Some(value_str).filter(|origin| !origin.is_empty());
        }
        "config_file_name" => settings.config_file_name = value_str,
        "code_base_path" => settings.code_base_path = value_str,
        "fonts_stylesheet" => settings.fonts_stylesheet = value_str,
        "lazy_stylesheet" => settings.lazy_stylesheet = value_str,
        "delayed_module" => settings.delayed_module = value_str,
        "default_language" => settings.default_language = value_str,
        "media_prefix" => settings.media_prefix = value_str,
        "desktop_min_width" => {
            settings.desktop_min_width = value_str.parse().map_err(|e| {
                PageFlowError::config_error(
                    format!(
                        "Invalid desktop_min_width value '{}': {}",
                        value_str, e
                    ),
                    None,
                )
            })?;
        }
        "rtl_languages" => {
            settings.rtl_languages = value_str
                .split(',')
                .map(str::trim)
                .filter(|language| !language.is_empty())
                .map(str::to_string)
                .collect();
        }
        _ => {
            return Err(PageFlowError::config_error(
                format!("Unknown setting: {}", key),
                None,
            ));
        }
    }
    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.media_prefix.is_empty() {
        return Err(PageFlowError::config_error(
            "Media prefix must not be empty",
            None,
        ));
    }

    if settings.environment_rules.is_empty() {
        return Err(PageFlowError::config_error(
            "No environment rules specified",
            None,
        ));
    }

    if settings.desktop_min_width == 0 {
        return Err(PageFlowError::config_error(
            "desktop_min_width must be positive",
            None,
        ));
    }

    for (name, path) in [
        ("fonts_stylesheet", &settings.fonts_stylesheet),
        ("lazy_stylesheet", &settings.lazy_stylesheet),
        ("delayed_module", &settings.delayed_module),
    ] {
        if !path.starts_with('/') {
            return Err(PageFlowError::config_error(
                format!("{} must be site-rooted: {}", name, path),
                None,
            ));
        }
    }

    Ok(())
}
