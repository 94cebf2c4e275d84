//! In-memory checkpoint storage
//!
//! [`InMemoryCheckpointSaver`] keeps every history in a process-local map.
//! It is the reference implementation of the [`CheckpointSaver`] contract and
//! the natural choice for tests and short-lived processes.
//!
//! ```rust
//! use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointSaver, InMemoryCheckpointSaver, StateData};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let saver = InMemoryCheckpointSaver::new();
//! let config = CheckpointConfig::new().with_thread_id("thread-1".to_string());
//!
//! saver.insert(&config, Checkpoint::new("__start__", "a", StateData::new())).await.unwrap();
//! saver.insert(&config, Checkpoint::new("a", "__end__", StateData::new())).await.unwrap();
//!
//! let latest = saver.get(&config).await.unwrap().unwrap();
//! assert_eq!(latest.node_id, "a");
//! # }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, Tag},
    error::{CheckpointError, Result},
    traits::CheckpointSaver,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ThreadKey {
    thread_id: String,
    ns: String,
}

impl ThreadKey {
    fn from_config(config: &CheckpointConfig) -> Result<Self> {
        let thread_id = config
            .thread_id
            .clone()
            .ok_or_else(|| CheckpointError::Invalid("thread_id is required".to_string()))?;
        Ok(Self {
            thread_id,
            ns: config.checkpoint_ns.clone().unwrap_or_default(),
        })
    }
}

/// One `(thread, namespace)` partition. `active` is kept oldest first.
#[derive(Debug, Default)]
struct Partition {
    active: Vec<Checkpoint>,
    released: Vec<Vec<Checkpoint>>,
}

type CheckpointStorage = Arc<RwLock<HashMap<ThreadKey, Partition>>>;

/// In-memory checkpoint saver
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new, empty saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of partitions with an active history
    pub async fn thread_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .filter(|p| !p.active.is_empty())
            .count()
    }

    /// Number of active checkpoints across all partitions
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|p| p.active.len())
            .sum()
    }

    /// Number of released histories kept for `config`'s partition
    pub async fn released_count(&self, config: &CheckpointConfig) -> Result<usize> {
        let key = ThreadKey::from_config(config)?;
        Ok(self
            .storage
            .read()
            .await
            .get(&key)
            .map(|p| p.released.len())
            .unwrap_or(0))
    }

    /// Drop everything, released histories included
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }

    fn stored_config(key: &ThreadKey, checkpoint_id: &str) -> CheckpointConfig {
        let mut config = CheckpointConfig::new()
            .with_thread_id(key.thread_id.clone())
            .with_checkpoint_id(checkpoint_id.to_string());
        if !key.ns.is_empty() {
            config = config.with_checkpoint_ns(key.ns.clone());
        }
        config
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn load(&self, config: &CheckpointConfig) -> Result<Vec<Checkpoint>> {
        let key = ThreadKey::from_config(config)?;
        let storage = self.storage.read().await;
        Ok(storage
            .get(&key)
            .map(|p| p.active.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointConfig> {
        let key = ThreadKey::from_config(config)?;
        let stored = Self::stored_config(&key, &checkpoint.id);

        let mut storage = self.storage.write().await;
        storage.entry(key).or_default().active.push(checkpoint);

        Ok(stored)
    }

    async fn update(
        &self,
        config: &CheckpointConfig,
        checkpoint_id: &str,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointConfig> {
        let key = ThreadKey::from_config(config)?;
        let stored = Self::stored_config(&key, &checkpoint.id);

        let mut storage = self.storage.write().await;
        let partition = storage
            .get_mut(&key)
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;

        let position = partition.active.iter().position(|c| c.id == checkpoint_id);
        match position {
            Some(index) => {
                partition.active[index] = checkpoint;
                Ok(stored)
            }
            None if partition
                .released
                .iter()
                .flatten()
                .any(|c| c.id == checkpoint_id) =>
            {
                Err(CheckpointError::Released(key.thread_id))
            }
            None => Err(CheckpointError::NotFound(checkpoint_id.to_string())),
        }
    }

    /// Releases every namespace of the thread. The returned tag carries the
    /// checkpoints of the namespace addressed by `config`.
    async fn release(&self, config: &CheckpointConfig) -> Result<Tag> {
        let key = ThreadKey::from_config(config)?;
        let mut storage = self.storage.write().await;

        let mut checkpoints = Vec::new();
        for (partition_key, partition) in storage.iter_mut() {
            if partition_key.thread_id != key.thread_id || partition.active.is_empty() {
                continue;
            }
            let history = std::mem::take(&mut partition.active);
            if *partition_key == key {
                checkpoints = history.iter().rev().cloned().collect();
            }
            partition.released.push(history);
        }

        Ok(Tag {
            thread_id: key.thread_id,
            checkpoints,
        })
    }
}
