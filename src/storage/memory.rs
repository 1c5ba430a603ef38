// SPDX-FileCopyrightText: 2022-2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

use super::{IsPersistent, Storage};

/// Process-local storage. Clones share the same contents.
#[derive(Clone)]
pub(crate) struct Memory {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl Memory {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl IsPersistent for Memory {
    fn is_persistent(&self) -> bool {
        false
    }
}

#[async_trait]
impl Storage for Memory {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let guard = self.data.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn update(&mut self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.data.write().await;
        _ = guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&mut self, key: &str) -> Result<()> {
        let mut guard = self.data.write().await;
        _ = guard.remove(key);
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
