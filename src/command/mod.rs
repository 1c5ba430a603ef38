// SPDX-FileCopyrightText: 2022-2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::{auth, documents, error::Result, manager, password, storage};

pub(crate) mod document;
pub(crate) mod login;
pub(crate) mod logout;
pub(crate) mod status;

pub(crate) type Manager = manager::Manager<Box<dyn storage::Storage>, auth::HttpApi>;

/// Everything a command may need, built once per invocation.
pub(crate) struct Context {
    pub(crate) manager: Manager,
    pub(crate) documents: documents::Client,
    pub(crate) prompt: Box<dyn password::Prompt>,
    pub(crate) persistent: bool,
}

#[async_trait]
pub(crate) trait Command {
    async fn execute(self, ctx: &Context) -> Result<()>;
}
