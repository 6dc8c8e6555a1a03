// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # PageFlow CLI
//!
//! This is the main entry point for the PageFlow command-line interface.
//! It initialises the logger, loads the settings and runs one resolution
//! against a live site: environment, locale, configuration or a fragment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use pageflow::environment::resolve_environment;
use pageflow::locale::resolve_locale;
use pageflow::session::ENVIRONMENT_KEY;
use pageflow::{
    Collaborators, ConfigStore, FileSessionStore, FragmentLoader,
    HeadlessRuntime, HttpFetcher, MemorySessionStore, PageLocation,
    SessionStore, Settings, SettingsBuilder,
};

/// Main command-line interface for PageFlow.
#[derive(Parser)]
#[command(
    name = "pageflow",
    version,
    about = "Resolve configuration and fragments of a block-driven site"
)]
struct Cli {
    /// Verbose mode (-v, -vv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// The resolution to perform
    #[command(subcommand)]
    command: Option<Commands>,
}

/// The page a command runs against.
#[derive(Args)]
struct PageArgs {
    /// URL of the page
    #[arg(long)]
    url: String,

    /// URL of the parent frame, for pages embedded as `about:srcdoc`
    #[arg(long)]
    parent: Option<String>,
}

impl PageArgs {
    fn location(&self) -> PageLocation {
        let location = PageLocation::new(&self.url);
        match &self.parent {
            Some(parent) => location.with_parent(parent),
            None => location,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the environment of a page
    Env {
        #[command(flatten)]
        page: PageArgs,

        /// JSON session file holding an environment override
        #[arg(long)]
        session: Option<PathBuf>,
    },

    /// Print the language and text direction of a page
    Locale {
        #[command(flatten)]
        page: PageArgs,

        /// The document's declared language
        #[arg(long)]
        lang: Option<String>,
    },

    /// Print one configuration value, or all of them as JSON
    Config {
        #[command(flatten)]
        page: PageArgs,

        /// JSON session file caching configuration between runs
        #[arg(long)]
        session: Option<PathBuf>,

        /// The configuration key
        key: Option<String>,
    },

    /// Fetch and decorate a fragment, then print its HTML
    Fragment {
        #[command(flatten)]
        page: PageArgs,

        /// Site-rooted fragment path, e.g. `/en/fragments/404`
        path: String,
    },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut builder =
        SettingsBuilder::new().with_env_prefix("PAGEFLOW_");
    if let Some(path) = path {
        builder = builder.with_file(path);
    }
    builder.build().context("Failed to load settings")
}

fn open_session(
    path: Option<&Path>,
) -> anyhow::Result<Arc<dyn SessionStore>> {
    let Some(path) = path else {
        return Ok(Arc::new(MemorySessionStore::new()));
    };
    let store = FileSessionStore::open(path).with_context(|| {
        format!("Failed to open session {}", path.display())
    })?;
    Ok(Arc::new(store))
}

/// Runs one command.
///
/// # Errors
///
/// This function will return an error if:
/// - The settings or the session file are invalid.
/// - A requested configuration key is not configured.
/// - The requested fragment is unavailable.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Arc::new(load_settings(cli.settings.as_deref())?);

    match cli.command {
        Some(Commands::Env { page, session }) => {
            let session = open_session(session.as_deref())?;
            let environment = resolve_environment(
                &page.location().effective_href(),
                &settings.environment_rules,
                session.get(ENVIRONMENT_KEY).as_deref(),
            );
            println!("{}", environment);
        }
        Some(Commands::Locale { page, lang }) => {
            let locale = resolve_locale(
                &page.location().effective_href(),
                lang.as_deref(),
                &settings.rtl_languages,
                &settings.default_language,
            );
            println!("{} {}", locale.language, locale.direction);
        }
        Some(Commands::Config { page, session, key }) => {
            let session = open_session(session.as_deref())?;
            let fetcher = Arc::new(HttpFetcher::new()?);
            let store = ConfigStore::new(
                Arc::clone(&settings),
                fetcher,
                session,
                page.location(),
            );
            info!(
                "Resolving configuration for {}",
                store.environment()
            );

            match key {
                Some(key) => {
                    let value =
                        store.get_config_value(&key).await.ok_or_else(
                            || anyhow!("`{}` is not configured", key),
                        )?;
                    println!("{}", value);
                }
                None => {
                    let all: BTreeMap<String, String> = store
                        .get_all_configs()
                        .await
                        .into_iter()
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&all)?);
                }
            }
        }
        Some(Commands::Fragment { page, path }) => {
            let fetcher = Arc::new(HttpFetcher::new()?);
            let runtime = HeadlessRuntime::new()
                .with_code_base_path(settings.code_base_path.clone());
            let loader = FragmentLoader::new(
                Arc::clone(&settings),
                fetcher,
                Collaborators::from_runtime(Rc::new(runtime)),
                page.location(),
            );
            let fragment = loader
                .try_load_fragment(Some(&path))
                .await
                .with_context(|| {
                    format!("Failed to load fragment {}", path)
                })?;
            println!("{}", fragment.inner_html());
        }
        None => {
            println!(
                "No command provided. Use --help for more information."
            );
        }
    }
    Ok(())
}

/// The main entry point for the PageFlow CLI.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
