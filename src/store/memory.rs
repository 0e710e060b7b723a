use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{FlagDefinition, FlagStore};
use crate::error::StoreError;

/// Flag store held entirely in process memory.
#[derive(Default)]
pub struct MemoryFlagStore {
    flags: RwLock<HashMap<String, FlagDefinition>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(flags: impl IntoIterator<Item = FlagDefinition>) -> Self {
        let flags = flags
            .into_iter()
            .map(|flag| (flag.key.clone(), flag))
            .collect();
        Self {
            flags: RwLock::new(flags),
        }
    }

    /// Inserts or replaces the flag with the same key.
    pub async fn upsert(&self, flag: FlagDefinition) {
        self.flags.write().await.insert(flag.key.clone(), flag);
    }

    pub async fn remove(&self, key: &str) -> Option<FlagDefinition> {
        self.flags.write().await.remove(key)
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn fetch(&self, key: &str) -> Result<Option<FlagDefinition>, StoreError> {
        Ok(self.flags.read().await.get(key).cloned())
    }

    async fn fetch_all(&self) -> Result<Vec<FlagDefinition>, StoreError> {
        let mut flags: Vec<_> = self.flags.read().await.values().cloned().collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(flags)
    }
}
