// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Error Handling for PageFlow
//!
//! This module defines the error types shared by the configuration store,
//! the fragment loader and the page bootstrapper. The `thiserror` crate is
//! used to keep error creation and display consistent across the library.
//!
//! Most of these errors never reach a caller: the configuration store
//! recovers from `ConfigFetch` and `ConfigParse` locally, and the bootstrapper
//! logs collaborator failures instead of aborting a phase.

use std::path::PathBuf;
use thiserror::Error;

use crate::bootstrap::Phase;

/// A unified result type for the PageFlow library.
pub type Result<T> = std::result::Result<T, PageFlowError>;

/// The main error type for PageFlow, encompassing all potential error cases.
#[derive(Error, Debug)]
pub enum PageFlowError {
    /// A configuration resource could not be fetched, either because of a
    /// network failure or a non-success response.
    #[error("Config fetch error for `{url}`: {message}.")]
    ConfigFetch {
        /// The configuration resource URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A configuration blob is not valid JSON for a config set.
    #[error("Config parse error for `{key}`: {source}")]
    ConfigParse {
        /// The session key the blob belongs to.
        key: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A fragment path was rejected or its fetch did not succeed.
    #[error("Fragment unavailable at `{path}`: {reason}.")]
    FragmentUnavailable {
        /// The requested fragment path.
        path: String,
        /// Why the fragment could not be produced.
        reason: String,
    },

    /// Building a synthetic block failed.
    #[error("Auto block `{block}` failed: {message}.")]
    AutoBlock {
        /// The block name, e.g. `hero`.
        block: String,
        /// Description of the failure.
        message: String,
    },

    /// An externally supplied decoration or loading primitive failed.
    #[error("Collaborator `{operation}` failed: {message}.")]
    Collaborator {
        /// The collaborator operation, e.g. `load_sections`.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// The network layer failed before a response was received.
    #[error("Network error for `{url}`: {message}.")]
    Network {
        /// The requested URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A lifecycle phase was entered out of order or twice.
    #[error("Phase order violation: cannot enter {to} after {from}.")]
    PhaseOrder {
        /// The phase that was current, or `start`.
        from: String,
        /// The phase that was requested.
        to: Phase,
    },

    /// Error related to settings initialisation or validation.
    #[error("Configuration error: {message}.")]
    Configuration {
        /// Detailed description of the configuration error.
        message: String,
        /// Optional path of the settings file that caused the error.
        path: Option<PathBuf>,
    },

    /// IO error encountered during file operations.
    #[error("File IO error at `{path:?}`: {source}")]
    IOError {
        /// Path associated with the IO error.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// General internal error.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for PageFlowError {
    /// Converts a standard IO error into a `PageFlowError::IOError` with an
    /// empty path.
    fn from(source: std::io::Error) -> Self {
        PageFlowError::IOError {
            path: PathBuf::new(),
            source,
        }
    }
}

impl PageFlowError {
    /// Creates a `Configuration` error with a specific message.
    ///
    /// # Parameters
    /// - `message`: A description of the configuration error.
    /// - `path`: Optional path of the settings file causing the error.
    pub fn config_error<S: Into<String>>(
        message: S,
        path: Option<PathBuf>,
    ) -> Self {
        PageFlowError::Configuration {
            message: message.into(),
            path,
        }
    }

    /// Creates a `ConfigFetch` error for a configuration resource.
    pub fn config_fetch_error<U: Into<String>, S: Into<String>>(
        url: U,
        message: S,
    ) -> Self {
        PageFlowError::ConfigFetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a `FragmentUnavailable` error.
    pub fn fragment_unavailable<P: Into<String>, S: Into<String>>(
        path: P,
        reason: S,
    ) -> Self {
        PageFlowError::FragmentUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Collaborator` error for an external primitive.
    pub fn collaborator_error<O: Into<String>, S: Into<String>>(
        operation: O,
        message: S,
    ) -> Self {
        PageFlowError::Collaborator {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a `Network` error.
    pub fn network_error<U: Into<String>, S: Into<String>>(
        url: U,
        message: S,
    ) -> Self {
        PageFlowError::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Wraps an IO error as an `IOError` variant with the specified path.
    pub fn io_error(path: PathBuf, source: std::io::Error) -> Self {
        PageFlowError::IOError { path, source }
    }

    /// Creates a general internal error with a custom message.
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        PageFlowError::InternalError(message.into())
    }
}
