// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Response;
use secrecy::{ExposeSecret as _, SecretString};
use serde::de::DeserializeOwned;

use crate::{
    error::{self, Stage},
    http,
};

use super::{
    model::{Credentials, TokenResponse},
    Api, Profile,
};

/// Talks to the `auth` routes of the DocHub REST API.
pub(crate) struct HttpApi {
    endpoint: http::Endpoint,
}

impl HttpApi {
    pub(crate) const fn new(endpoint: http::Endpoint) -> Self {
        Self { endpoint }
    }
}

async fn decode<T: DeserializeOwned>(stage: Stage, response: Response) -> Result<T, error::Login> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!("The {} returned {}: {}", stage, status, body);
        return Err(if status.is_server_error() {
            error::Login::Server { stage, status }
        } else {
            error::Login::Rejected { stage, status }
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| error::Login::Transport { stage, source })?;
    serde_json::from_slice(&body).map_err(|e| error::Login::MalformedResponse {
        stage,
        reason: e.to_string(),
    })
}

#[async_trait]
impl Api for HttpApi {
    async fn exchange_credentials(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SecretString, error::Login> {
        let stage = Stage::Credentials;
        let url = self.endpoint.url("auth/login")?;
        debug!("Exchanging credentials for {} at {}", email, url);

        let response = self
            .endpoint
            .client()
            .post(url)
            .json(&Credentials {
                email,
                password: password.expose_secret(),
            })
            .send()
            .await
            .map_err(|source| error::Login::Transport { stage, source })?;
        let body: TokenResponse = decode(stage, response).await?;

        if let Some(token_type) = body.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                warn!("The server issued a {:?} token; presenting it as a bearer token anyway", token_type);
            }
        }
        if body.access_token.expose_secret().is_empty() {
            return Err(error::Login::MalformedResponse {
                stage,
                reason: "the access token is empty".to_owned(),
            });
        }
        Ok(body.access_token)
    }

    async fn fetch_profile(&self, token: &SecretString) -> Result<Profile, error::Login> {
        let stage = Stage::Profile;
        let url = self.endpoint.url("auth/profile")?;
        debug!("Fetching the user profile from {}", url);

        let response = self
            .endpoint
            .client()
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|source| error::Login::Transport { stage, source })?;
        decode(stage, response).await
    }
}
