// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use url::Url;

use crate::metadata;

pub(crate) fn client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(metadata::USER_AGENT)
        .timeout(timeout)
        .build()
}

/// An HTTP client bound to the base URL of the DocHub API.
#[derive(Clone, Debug)]
pub(crate) struct Endpoint {
    client: reqwest::Client,
    base: Url,
}

impl Endpoint {
    pub(crate) fn new(client: reqwest::Client, mut base: Url) -> Self {
        // Url::join replaces the last path segment unless the base is a
        // directory.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { client, base }
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    pub(crate) const fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_to_the_api_prefix() {
        for base in [
            "http://localhost:8000/api/v1",
            "http://localhost:8000/api/v1/",
        ] {
            let endpoint = Endpoint::new(reqwest::Client::new(), Url::parse(base).unwrap());
            assert_eq!(
                endpoint.url("auth/login").unwrap().as_str(),
                "http://localhost:8000/api/v1/auth/login"
            );
            assert_eq!(
                endpoint.url("documents/").unwrap().as_str(),
                "http://localhost:8000/api/v1/documents/"
            );
        }
    }
}
