// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

//! The remote side of a login: trading credentials for a bearer token and
//! the token for a user profile.

mod api;
mod model;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error;

pub(crate) use api::HttpApi;
pub(crate) use model::Profile;

#[async_trait]
pub(crate) trait Api: Send + Sync {
    async fn exchange_credentials(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SecretString, error::Login>;

    async fn fetch_profile(&self, token: &SecretString) -> Result<Profile, error::Login>;
}

#[async_trait]
impl<T: Api + ?Sized> Api for Box<T> {
    async fn exchange_credentials(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SecretString, error::Login> {
        (**self).exchange_credentials(email, password).await
    }

    async fn fetch_profile(&self, token: &SecretString) -> Result<Profile, error::Login> {
        (**self).fetch_profile(token).await
    }
}
