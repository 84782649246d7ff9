//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Player files on disk

use async_trait::async_trait;
use pulsemud_service::{EngineError, PlayerRecord, PlayerStore, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One pretty-printed JSON file per player, named by the lowercased name
///
/// Saves go through a temporary file and a rename so a crash never leaves a
/// half-written player file behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the players directory if it is missing
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name.to_ascii_lowercase()))
    }
}

#[async_trait]
impl PlayerStore for JsonFileStore {
    async fn save(&self, record: &PlayerRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|err| EngineError::Store(err.to_string()))?;
        let path = self.path_for(&record.name);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(player = %record.name, path = %path.display(), "Player file written");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<PlayerRecord>> {
        let path = self.path_for(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| EngineError::Store(format!("{}: {err}", path.display())))
    }
}
