// SPDX-FileCopyrightText: 2022-2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use crate::{
    error::{self, Result},
    metadata,
};

use super::{IsPersistent, Storage};

/// Keeps each key in its own file inside a directory.
pub(crate) struct File {
    dir: PathBuf,
}

impl File {
    pub(crate) fn new() -> Result<Self> {
        metadata::PROJECT_DIRS
            .as_ref()
            .map(|dirs| Self::with_dir(dirs.data_dir()))
            .ok_or_else(|| error::Storage::NoProjectDirs.into())
    }

    pub(crate) fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl IsPersistent for File {
    fn is_persistent(&self) -> bool {
        true
    }
}

#[async_trait]
impl Storage for File {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        match fs::read(self.path(key)) {
            Ok(data) => Ok(Some(
                std::str::from_utf8(&data)
                    .map_err(error::Storage::from)?
                    .to_owned(),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }

    async fn remove(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
