// SPDX-FileCopyrightText: 2022-2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

//! The authenticated session and its shadow copy in durable storage.
//!
//! Two keys hold the shadow: [`USER_KEY`] carries the profile as JSON along
//! with a digest of the token, and [`TOKEN_KEY`] carries the bearer token
//! itself. A pair whose digest does not match the token is treated as no
//! session at all.

use log::{debug, warn};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

use crate::{auth, error::Result, storage};

pub(crate) const USER_KEY: &str = "dochub-user";
pub(crate) const TOKEN_KEY: &str = "dochub-token";

#[derive(Error, Debug, PartialEq, Eq)]
#[error("the {0} field is empty")]
pub(crate) struct Incomplete(&'static str);

#[derive(Clone, Debug)]
pub(crate) struct Session {
    user_id: String,
    display_name: String,
    email: String,
    role: String,
    department: String,
    auth_token: SecretString,
}

impl Session {
    pub(crate) fn new(
        user_id: String,
        display_name: String,
        email: String,
        role: String,
        department: String,
        auth_token: SecretString,
    ) -> Result<Self, Incomplete> {
        for (name, value) in [
            ("id", &user_id),
            ("name", &display_name),
            ("email", &email),
            ("role", &role),
            ("department", &department),
        ] {
            if value.trim().is_empty() {
                return Err(Incomplete(name));
            }
        }
        if auth_token.expose_secret().is_empty() {
            return Err(Incomplete("token"));
        }

        Ok(Self {
            user_id,
            display_name,
            email,
            role,
            department,
            auth_token,
        })
    }

    pub(crate) fn from_profile(
        profile: auth::Profile,
        auth_token: SecretString,
    ) -> Result<Self, Incomplete> {
        Self::new(
            profile.id.into(),
            profile.name,
            profile.email,
            profile.role.unwrap_or_default(),
            profile.department.unwrap_or_default(),
            auth_token,
        )
    }

    pub(crate) fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn display_name(&self) -> &str {
        &self.display_name
    }

    pub(crate) fn email(&self) -> &str {
        &self.email
    }

    pub(crate) fn role(&self) -> &str {
        &self.role
    }

    pub(crate) fn department(&self) -> &str {
        &self.department
    }

    pub(crate) const fn auth_token(&self) -> &SecretString {
        &self.auth_token
    }

    pub(crate) fn holds_token(&self, token: &SecretString) -> bool {
        self.auth_token.expose_secret() == token.expose_secret()
    }
}

fn token_digest(token: &str) -> String {
    base64::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Serialize, Deserialize)]
struct Record {
    id: String,
    name: String,
    email: String,
    role: String,
    department: String,
    token_digest: String,
}

impl From<&Session> for Record {
    fn from(session: &Session) -> Self {
        Self {
            id: session.user_id.clone(),
            name: session.display_name.clone(),
            email: session.email.clone(),
            role: session.role.clone(),
            department: session.department.clone(),
            token_digest: token_digest(session.auth_token.expose_secret()),
        }
    }
}

/// Reads the stored session. Anything short of a complete, consistent pair
/// of keys reads as `None`. Storage is never written here.
pub(crate) async fn load<S: storage::Storage + ?Sized>(storage: &mut S) -> Result<Option<Session>> {
    let user = storage.get(USER_KEY).await?;
    let token = storage.get(TOKEN_KEY).await?;

    let (user, token) = match (user, token) {
        (Some(user), Some(token)) => (user, token),
        (None, None) => return Ok(None),
        (Some(_), None) | (None, Some(_)) => {
            warn!("Ignoring a stored session with only one of its keys present");
            return Ok(None);
        }
    };

    let record: Record = match serde_json::from_str(&user) {
        Ok(record) => record,
        Err(e) => {
            warn!("Ignoring a stored session whose profile cannot be read: {}", e);
            return Ok(None);
        }
    };
    if record.token_digest != token_digest(&token) {
        warn!("Ignoring a stored session whose token does not match its profile");
        return Ok(None);
    }

    match Session::new(
        record.id,
        record.name,
        record.email,
        record.role,
        record.department,
        SecretString::new(token),
    ) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            warn!("Ignoring an incomplete stored session: {}", e);
            Ok(None)
        }
    }
}

/// Writes both keys. If either write fails, both keys are put back the way
/// they were before returning the error.
pub(crate) async fn persist<S: storage::Storage + ?Sized>(
    storage: &mut S,
    session: &Session,
) -> Result<()> {
    let record = serde_json::to_string(&Record::from(session))?;
    let prior_token = storage.get(TOKEN_KEY).await?;
    let prior_user = storage.get(USER_KEY).await?;

    let written = match storage
        .update(TOKEN_KEY, session.auth_token.expose_secret())
        .await
    {
        Ok(()) => storage.update(USER_KEY, &record).await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        restore(storage, TOKEN_KEY, prior_token).await;
        restore(storage, USER_KEY, prior_user).await;
        return Err(e);
    }
    Ok(())
}

async fn restore<S: storage::Storage + ?Sized>(storage: &mut S, key: &str, prior: Option<String>) {
    let result = match prior {
        Some(value) => storage.update(key, &value).await,
        None => storage.remove(key).await,
    };
    if let Err(e) = result {
        warn!("Could not roll back the stored {} key: {}", key, e);
    }
}

/// Removes both keys, attempting the second even if the first fails.
pub(crate) async fn clear<S: storage::Storage + ?Sized>(storage: &mut S) -> Result<()> {
    debug!("Removing the stored session");
    let user = storage.remove(USER_KEY).await;
    let token = storage.remove(TOKEN_KEY).await;
    user.and(token)
}
