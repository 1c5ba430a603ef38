// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use std::io::{self, BufRead as _, Write as _};

use async_trait::async_trait;
use clap::Parser;
use log::warn;
use secrecy::ExposeSecret as _;
use tokio::task;

use crate::{
    error::{self, Result},
    password::RequestBuilder,
};

use super::Context;

/// Sign in to DocHub and remember the session.
#[derive(Debug, Parser)]
pub(crate) struct Command {
    /// The e-mail address to sign in with. You are asked for it when it is
    /// not given.
    #[arg(long, short, env = "DOCHUB_EMAIL")]
    email: Option<String>,
}

async fn ask_email() -> Result<String> {
    Ok(task::spawn_blocking(|| -> io::Result<String> {
        eprint!("E-mail: ");
        io::stderr().flush()?;
        let mut line = String::new();
        _ = io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_owned())
    })
    .await??)
}

#[async_trait]
impl super::Command for Command {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let email = match self.email {
            Some(email) => email,
            None => ask_email().await?,
        };

        let mut request = RequestBuilder::new(&email);
        let password = loop {
            let password = ctx
                .prompt
                .prompt(request.into_request())
                .await?
                .ok_or(error::Password::NoPrompt)?;
            if !password.expose_secret().is_empty() {
                break password;
            }
            request = RequestBuilder::new(&email).with_error("The password cannot be empty.");
        };

        if !ctx.persistent {
            warn!("The session is kept in memory only and ends when this command exits");
        }

        if ctx.manager.login(&email, &password).await {
            if let Some(session) = ctx.manager.current_session() {
                println!(
                    "Signed in as {} ({}, {})",
                    session.display_name(),
                    session.role(),
                    session.department()
                );
            }
            Ok(())
        } else {
            eprintln!("Invalid credentials or server error.");
            Err(error::Error::Command)
        }
    }
}
