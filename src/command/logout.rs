// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use clap::Parser;

use crate::error::Result;

use super::Context;

/// Forget the stored session.
#[derive(Debug, Parser)]
pub(crate) struct Command;

#[async_trait]
impl super::Command for Command {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let session = ctx.manager.current_session();
        ctx.manager.logout().await?;
        match session {
            Some(session) => println!("Signed out {}", session.email()),
            None => println!("Not signed in"),
        }
        Ok(())
    }
}
