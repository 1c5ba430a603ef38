// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use clap::Parser;
use tabled::{settings::Style, Table, Tabled};

use crate::{error::Result, session::Session};

use super::Context;

/// Show who is signed in.
#[derive(Debug, Parser)]
pub(crate) struct Command {
    /// Check the stored token with the server before reporting. A token the
    /// server no longer accepts ends the session.
    #[arg(long)]
    revalidate: bool,
}

#[derive(Tabled)]
struct Row<'session> {
    #[tabled(rename = "User ID")]
    user_id: &'session str,
    #[tabled(rename = "Name")]
    name: &'session str,
    #[tabled(rename = "E-mail")]
    email: &'session str,
    #[tabled(rename = "Role")]
    role: &'session str,
    #[tabled(rename = "Department")]
    department: &'session str,
}

impl<'session> From<&'session Session> for Row<'session> {
    fn from(session: &'session Session) -> Self {
        Self {
            user_id: session.user_id(),
            name: session.display_name(),
            email: session.email(),
            role: session.role(),
            department: session.department(),
        }
    }
}

#[async_trait]
impl super::Command for Command {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let session = if self.revalidate {
            ctx.manager.revalidate().await?
        } else {
            ctx.manager.current_session()
        };

        match session {
            Some(session) => println!(
                "{}",
                Table::new([Row::from(&session)]).with(Style::rounded())
            ),
            None => println!("Not signed in"),
        }
        Ok(())
    }
}
