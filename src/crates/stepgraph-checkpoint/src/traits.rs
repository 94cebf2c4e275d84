//! Checkpoint storage contract
//!
//! [`CheckpointSaver`] is the seam between the execution engine and a
//! storage backend. Backends implement four primitive operations over
//! per-thread histories:
//!
//! - [`load`](CheckpointSaver::load): the current history, most recent first
//! - [`insert`](CheckpointSaver::insert): append a checkpoint to the history
//! - [`update`](CheckpointSaver::update): replace one checkpoint in place
//! - [`release`](CheckpointSaver::release): close the history for good
//!
//! Everything else ([`get`](CheckpointSaver::get), [`put`](CheckpointSaver::put),
//! [`list`](CheckpointSaver::list)) has a default implementation on top of
//! those primitives.
//!
//! # Contract
//!
//! - Histories are partitioned by `(thread_id, checkpoint_ns)`. Operations on
//!   one partition never observe or affect another.
//! - A checkpoint written by `insert`/`update` is visible to the next `load`
//!   for the same partition once the write has completed.
//! - A released history is excluded from every later `load`. Writing to the
//!   same thread afterwards starts a new history.
//! - Implementations must be safe to share between concurrent runs on
//!   different threads.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointSaver, Result, Tag};
//!
//! struct SqlSaver { pool: Pool }
//!
//! #[async_trait]
//! impl CheckpointSaver for SqlSaver {
//!     async fn load(&self, config: &CheckpointConfig) -> Result<Vec<Checkpoint>> {
//!         // SELECT ... WHERE thread_id = $1 AND ns = $2 AND NOT released ORDER BY seq DESC
//!         todo!()
//!     }
//!     async fn insert(&self, config: &CheckpointConfig, checkpoint: Checkpoint) -> Result<CheckpointConfig> {
//!         todo!()
//!     }
//!     async fn update(&self, config: &CheckpointConfig, id: &str, checkpoint: Checkpoint) -> Result<CheckpointConfig> {
//!         todo!()
//!     }
//!     async fn release(&self, config: &CheckpointConfig) -> Result<Tag> {
//!         todo!()
//!     }
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, Tag},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::pin::Pin;

/// Stream of checkpoints, most recent first
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send + 'static>>;

/// Storage backend for checkpoint histories
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Load the current history addressed by `config`, most recent first.
    ///
    /// The checkpoint id of `config` is ignored.
    async fn load(&self, config: &CheckpointConfig) -> Result<Vec<Checkpoint>>;

    /// Append a checkpoint to the history.
    ///
    /// Returns the config addressing the stored checkpoint.
    async fn insert(&self, config: &CheckpointConfig, checkpoint: Checkpoint)
        -> Result<CheckpointConfig>;

    /// Replace the checkpoint `checkpoint_id` in place, keeping its position
    /// in the history.
    ///
    /// Returns the config addressing the stored checkpoint.
    async fn update(
        &self,
        config: &CheckpointConfig,
        checkpoint_id: &str,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointConfig>;

    /// Release the history addressed by `config`.
    async fn release(&self, config: &CheckpointConfig) -> Result<Tag>;

    /// Get the checkpoint named by `config.checkpoint_id`, or the most
    /// recent one when no id is given.
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        let history = self.load(config).await?;
        Ok(match &config.checkpoint_id {
            Some(id) => history.into_iter().find(|c| &c.id == id),
            None => history.into_iter().next(),
        })
    }

    /// Store a checkpoint: update in place when `config` carries a
    /// checkpoint id, append otherwise.
    async fn put(&self, config: &CheckpointConfig, checkpoint: Checkpoint) -> Result<CheckpointConfig> {
        match &config.checkpoint_id {
            Some(id) => {
                let id = id.clone();
                self.update(config, &id, checkpoint).await
            }
            None => self.insert(config, checkpoint).await,
        }
    }

    /// Stream the current history, most recent first.
    async fn list(&self, config: &CheckpointConfig) -> Result<CheckpointStream> {
        let history = self.load(config).await?;
        Ok(Box::pin(stream::iter(history.into_iter().map(Ok))))
    }
}
