// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A user identifier. The server sends numbers, but the value is treated as
/// opaque text.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawUserId")]
pub(crate) struct UserId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Number(i64),
    Text(String),
}

impl From<RawUserId> for UserId {
    fn from(value: RawUserId) -> Self {
        match value {
            RawUserId::Number(n) => Self(n.to_string()),
            RawUserId::Text(s) => Self(s),
        }
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Profile {
    pub(crate) id: UserId,
    pub(crate) name: String,
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) department: Option<String>,
}

#[derive(Serialize)]
pub(super) struct Credentials<'a> {
    pub(super) email: &'a str,
    pub(super) password: &'a str,
}

#[derive(Deserialize)]
pub(super) struct TokenResponse {
    pub(super) access_token: SecretString,
    #[serde(default)]
    pub(super) token_type: Option<String>,
}
