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


//! Player persistence.

use crate::error::Result;
use crate::types::{Gender, Level};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Everything persisted about a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    pub password_hash: String,
    pub level: Level,
    #[serde(default)]
    pub gender: Gender,
}

/// The subset of a record needed to check a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub name: String,
    pub password_hash: String,
    pub level: Level,
}

impl From<&PlayerRecord> for ProfileSummary {
    fn from(record: &PlayerRecord) -> Self {
        Self {
            name: record.name.clone(),
            password_hash: record.password_hash.clone(),
            level: record.level,
        }
    }
}

/// Storage for player records, keyed case-insensitively by name
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Write `record`, replacing any previous version
    async fn save(&self, record: &PlayerRecord) -> Result<()>;

    /// Load the full record for `name`
    async fn load(&self, name: &str) -> Result<Option<PlayerRecord>>;

    /// Load only what is needed to authenticate `name`
    async fn load_profile(&self, name: &str) -> Result<Option<ProfileSummary>> {
        Ok(self.load(name).await?.as_ref().map(ProfileSummary::from))
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    players: DashMap<String, PlayerRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`
    pub fn with_players(records: impl IntoIterator<Item = PlayerRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.players.insert(record.name.to_lowercase(), record);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<PlayerRecord> {
        self.players
            .get(&name.to_lowercase())
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn save(&self, record: &PlayerRecord) -> Result<()> {
        self.players
            .insert(record.name.to_lowercase(), record.clone());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<PlayerRecord>> {
        Ok(self.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> PlayerRecord {
        PlayerRecord {
            name: name.to_string(),
            password_hash: "hash".to_string(),
            level: Level::Player,
            gender: Gender::Female,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_case_insensitive() {
        let store = MemoryStore::new();
        store.save(&record("Alice")).await.unwrap();
        let loaded = store.load("alice").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Alice");
        assert_eq!(loaded.gender, Gender::Female);
        assert!(store.load("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_summary() {
        let store = MemoryStore::with_players([record("Bob")]);
        let profile = store.load_profile("BOB").await.unwrap().unwrap();
        assert_eq!(profile.name, "Bob");
        assert_eq!(profile.level, Level::Player);
        assert_eq!(store.len(), 1);
    }
}
