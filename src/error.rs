// SPDX-FileCopyrightText: 2022-2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, io, result};

use reqwest::StatusCode;
use thiserror::Error;

pub(crate) type Result<T, E = Error> = result::Result<T, E>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("IO operation failed: {0}")]
    Io(#[from] io::Error),
    #[error("JSON format error: {0}")]
    Json(serde_json::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage error: {0}")]
    Storage(#[from] Storage),
    #[error("password retrieval error: {0}")]
    Password(#[from] Password),
    #[error("login failed: {0}")]
    Login(#[from] Login),
    #[error("document request failed: {0}")]
    Document(#[from] Document),
    #[error("not signed in (run the login command first)")]
    NotAuthenticated,
    #[error("command execution failed")]
    Command,
    #[error("operation cancelled")]
    Cancelled,
}

impl From<pinentry::Error> for Error {
    fn from(value: pinentry::Error) -> Self {
        // LINT: Deliberate fall-through that should catch future cases added to
        // the enum.
        #[allow(
            clippy::wildcard_enum_match_arm,
            clippy::match_wildcard_for_single_variants
        )]
        match value {
            pinentry::Error::Cancelled | pinentry::Error::Timeout => Self::Cancelled,
            pinentry::Error::Io(e) => Self::Io(e),
            _ => Self::Password(Password::Pinentry(value)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        // LINT: Deliberate fall-through that should catch future cases added to
        // the enum.
        #[allow(clippy::wildcard_enum_match_arm)]
        match value.classify() {
            serde_json::error::Category::Io => Self::Io(value.into()),
            _ => Self::Json(value),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Io(value.into())
    }
}

/// The step of a login at which the remote side was being asked for
/// something.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Credentials,
    Profile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials => f.write_str("credential exchange"),
            Self::Profile => f.write_str("profile fetch"),
        }
    }
}

/// Why a login (or a revalidation of a stored token) did not produce a
/// session.
#[derive(Error, Debug)]
pub(crate) enum Login {
    #[error("an e-mail address and a password are both required")]
    EmptyCredentials,
    #[error("{stage} was rejected by the server ({status})")]
    Rejected { stage: Stage, status: StatusCode },
    #[error("{stage} failed with a server error ({status})")]
    Server { stage: Stage, status: StatusCode },
    #[error("{stage} could not reach the server: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },
    #[error("{stage} returned a malformed response: {reason}")]
    MalformedResponse { stage: Stage, reason: String },
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("session could not be saved: {0}")]
    Persist(#[source] Box<Error>),
}

impl Login {
    /// Whether the server refused the credential it was shown, as opposed to
    /// being unreachable or broken.
    pub(crate) const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[derive(Error, Debug)]
pub(crate) enum Document {
    #[error("the server no longer accepts the session token")]
    TokenRejected,
    #[error("unexpected response status {0}")]
    Status(StatusCode),
    #[error("could not reach the server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("could not read the file to upload: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub(crate) enum Storage {
    #[error("no data directory is available on this platform")]
    NoProjectDirs,
    #[error("stored value is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[cfg(feature = "secret-service")]
    #[error("secret service error: {0}")]
    SecretService(#[from] oo7::Error),
    #[cfg(feature = "keychain")]
    #[error("keychain error: {0}")]
    Keychain(#[from] security_framework::base::Error),
}

#[derive(Error, Debug)]
pub(crate) enum Password {
    #[error("no password prompt available")]
    NoPrompt,
    #[error("Pinentry implementation error: {0}")]
    Pinentry(pinentry::Error),
}
