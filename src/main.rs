// SPDX-FileCopyrightText: 2022-2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths)]
#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused,
    unused_lifetimes,
    unused_qualifications,
    unused_results,
    anonymous_parameters,
    deprecated_in_future,
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::unseparated_literal_suffix,
    clippy::decimal_literal_representation,
    clippy::single_char_lifetime_names,
    clippy::fallible_impl_from,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::wildcard_enum_match_arm,
    clippy::deref_by_slicing,
    clippy::default_numeric_fallback,
    clippy::shadow_reuse,
    clippy::clone_on_ref_ptr,
    clippy::todo,
    clippy::string_add,
    clippy::use_debug,
    clippy::future_not_send
)]
#![cfg_attr(not(test), warn(clippy::panic_in_result_fn))]

mod auth;
mod command;
mod documents;
mod error;
mod http;
mod manager;
mod metadata;
mod password;
mod session;
mod storage;

use std::{path::PathBuf, process, time::Duration};

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use error::Result;
use log::{debug, error, warn};
use url::Url;

#[derive(Debug, Subcommand)]
enum Command {
    Login(command::login::Command),
    Logout(command::logout::Command),
    Status(command::status::Command),
    #[command(name = "documents")]
    Document(command::document::Command),
}

#[async_trait]
impl command::Command for Command {
    async fn execute(self, ctx: &command::Context) -> Result<()> {
        match self {
            Self::Login(cmd) => cmd.execute(ctx).await,
            Self::Logout(cmd) => cmd.execute(ctx).await,
            Self::Status(cmd) => cmd.execute(ctx).await,
            Self::Document(cmd) => cmd.execute(ctx).await,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// The base URL of the DocHub API.
    #[arg(long, env = "DOCHUB_URL", default_value = "http://localhost:8000/api/v1", value_parser = Url::parse)]
    url: Url,

    /// How many seconds to wait for the API to answer a request.
    #[arg(long, env = "DOCHUB_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Keep the session in memory only, so it ends when the command exits.
    #[arg(long)]
    no_persist_session: bool,

    /// Store the session as files in this directory instead of the platform
    /// data directory or a secret store.
    #[arg(long, env = "DOCHUB_STORAGE_DIR", value_hint = clap::ValueHint::DirPath)]
    storage_dir: Option<PathBuf>,

    /// The path to the Pinentry program to use when asking for the password.
    #[arg(long, value_hint = clap::ValueHint::ExecutablePath)]
    pinentry_program: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

async fn get_session_storage(args: &Args) -> Box<dyn storage::Storage> {
    if args.no_persist_session {
        return Box::new(storage::Memory::new());
    }
    if let Some(dir) = args.storage_dir.as_ref() {
        return Box::new(storage::File::with_dir(dir));
    }

    #[cfg(feature = "secret-service")]
    match storage::SecretService::new(&args.url).await {
        Ok(secret_service_storage) => return Box::new(secret_service_storage),
        Err(e) => {
            warn!("We need to fall back to unencrypted file storage because we can't connect to the secret service: {}", e);
        }
    }

    #[cfg(feature = "keychain")]
    match storage::Keychain::new(&args.url) {
        Ok(keychain_storage) => return Box::new(keychain_storage),
        Err(e) => {
            warn!("We need to fall back to unencrypted file storage because we can't connect to Keychain: {}", e);
        }
    }

    match storage::File::new() {
        Ok(file_storage) => Box::new(file_storage),
        Err(e) => {
            warn!("The session will not outlive this command: {}", e);
            Box::new(storage::Memory::new())
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let prompt: Vec<Box<dyn password::Prompt>> = vec![
        Box::new(args.pinentry_program.clone().map_or_else(
            password::PinentryPrompt::new,
            password::PinentryPrompt::new_with_executable,
        )),
        Box::new(password::RpasswordPrompt),
    ];

    let endpoint = http::Endpoint::new(
        http::client(Duration::from_secs(args.timeout))?,
        args.url.clone(),
    );
    let storage = get_session_storage(&args).await;
    let persistent = storage::IsPersistent::is_persistent(&storage);

    let manager = manager::Manager::new(storage, auth::HttpApi::new(endpoint.clone()));
    let mut transitions = manager.subscribe();
    let _watcher = tokio::spawn(async move {
        while transitions.changed().await.is_ok() {
            debug!("Session state is now {}", *transitions.borrow());
        }
    });
    manager.initialize().await;

    let ctx = command::Context {
        manager,
        documents: documents::Client::new(endpoint),
        prompt: Box::new(prompt),
        persistent,
    };
    command::Command::execute(args.command, &ctx).await
}

#[tokio::main]
async fn main() {
    let logger_env = env_logger::Env::new()
        .filter_or("DOCHUB_LOG", "warn")
        .write_style("DOCHUB_LOG_STYLE");
    env_logger::Builder::from_env(logger_env).init();

    if let Err(e) = run(Args::parse()).await {
        error!("We encountered an error: {}", e);
        process::exit(1);
    };
}
