// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! HTTP access through `reqwest`.

use futures_util::future::{BoxFuture, FutureExt};

use crate::core::error::{PageFlowError, Result};
use crate::core::traits::{FetchResponse, Fetcher};

/// A [`Fetcher`] backed by a shared `reqwest` client. Timeouts are the
/// client's own; none are added here.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher with a bounded redirect policy.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("pageflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                PageFlowError::internal_error(format!(
                    "Failed to build HTTP client: {}",
                    e
                ))
            })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<FetchResponse>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            log::debug!("GET {}", url);
            let failed = |e: reqwest::Error| {
                PageFlowError::network_error(&url, e.to_string())
            };
            let response =
                client.get(&url).send().await.map_err(failed)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(failed)?;
            Ok(FetchResponse { status, body })
        }
        .boxed()
    }
}
