// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Environment Resolution
//!
//! Derives the active deployment environment from the page URL. Hostname
//! rules are checked in order and the first match wins; when nothing matches
//! the environment is `prod`. A session override can redirect a non-production
//! page to another environment, but a production page is never downgraded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{PageFlowError, Result};

/// A deployment tier governing which configuration resource is fetched.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production.
    #[default]
    Prod,
    /// Pre-production.
    Pprod,
    /// Authoring platform preview hosts.
    Aem,
    /// Staging.
    Stage,
    /// Local development.
    Dev,
    /// Preview domain.
    Preview,
}

impl Environment {
    /// All recognised environments.
    pub const ALL: [Environment; 6] = [
        Environment::Prod,
        Environment::Pprod,
        Environment::Aem,
        Environment::Stage,
        Environment::Dev,
        Environment::Preview,
    ];

    /// The identifier used in URLs, session storage and config file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Pprod => "pprod",
            Environment::Aem => "aem",
            Environment::Stage => "stage",
            Environment::Dev => "dev",
            Environment::Preview => "preview",
        }
    }

    /// Whether this environment reads `configs-{env}.json` instead of the
    /// default config file.
    pub fn has_dedicated_config_file(self) -> bool {
        matches!(
            self,
            Environment::Stage
                | Environment::Preview
                | Environment::Pprod
        )
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = PageFlowError;

    fn from_str(s: &str) -> Result<Self> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| {
                PageFlowError::config_error(
                    format!("Unknown environment: {}", s),
                    None,
                )
            })
    }
}

/// Maps a hostname fragment to the environment it identifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRule {
    /// Substring looked for in the page URL.
    pub pattern: String,
    /// Environment selected when the pattern matches.
    pub environment: Environment,
}

impl HostRule {
    /// Creates a new rule.
    pub fn new<S: Into<String>>(
        pattern: S,
        environment: Environment,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            environment,
        }
    }
}

/// The hostname rules of the site, in precedence order.
pub fn default_rules() -> Vec<HostRule> {
    [
        (".hlx.page", Environment::Aem),
        (".aem.page", Environment::Aem),
        ("-stage.factory.alshayauat.com", Environment::Stage),
        ("localhost", Environment::Dev),
        ("-eds.factory.alshayauat.com", Environment::Preview),
        ("-pprod.factory.alshayauat.com", Environment::Pprod),
    ]
    .into_iter()
    .map(|(pattern, environment)| HostRule::new(pattern, environment))
    .collect()
}

/// Detects the environment from the URL alone.
pub fn detect_environment(
    href: &str,
    rules: &[HostRule],
) -> Environment {
    rules
        .iter()
        .find(|rule| href.contains(rule.pattern.as_str()))
        .map_or(Environment::Prod, |rule| rule.environment)
}

/// Resolves the active environment.
///
/// `session_override` is the value stored under the `environment` session
/// key. It applies only when the detected environment is not `prod` and the
/// value names a recognised environment.
pub fn resolve_environment(
    href: &str,
    rules: &[HostRule],
    session_override: Option<&str>,
) -> Environment {
    let detected = detect_environment(href, rules);
    if detected == Environment::Prod {
        return detected;
    }

    match session_override.map(str::parse::<Environment>) {
        Some(Ok(overridden)) => {
            log::debug!(
                "Environment override {} applied over {}",
                overridden,
                detected
            );
            overridden
        }
        _ => detected,
    }
}
