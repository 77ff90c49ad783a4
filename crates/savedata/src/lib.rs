//! Asynchronous, type-keyed persistence cache for application save data.
//!
//! Each [`Savable`] type owns one record, persisted as a single file named
//! after its key. [`DataManager`] loads records lazily, hands out shared
//! [`Record`] handles, tracks which ones were modified, and writes them back in
//! batches when the host flushes (typically on focus loss and on quit).
//!
//! Modules are organized by responsibility:
//! - [`manager`] hosts the lifecycle controller and its builder
//! - [`lifecycle`] maps host focus/quit callbacks onto flushes
//! - [`storage`] and [`codec`] turn records into bytes on some medium
//! - [`events`] and [`metrics`] report what the cache is doing
//! - [`config`] loads settings from the environment
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod key;
pub mod lifecycle;
pub mod manager;
pub mod metrics;
pub mod storage;

mod cache;
mod record;

pub use codec::{BincodeCodec, Codec, JsonCodec, RonCodec};
pub use config::{DataManagerConfig, default_root_dir};
pub use error::{CodecError, Operation, Result, SaveDataError, StorageError, WriteFailure};
pub use events::{DataEvent, LoadSource};
pub use key::{Savable, TypeKey};
pub use lifecycle::LifecycleHooks;
pub use manager::{DataManager, DataManagerBuilder, PendingLoad, PendingWrite, RecordState};
pub use metrics::{DataMetrics, MetricsSnapshot};
pub use record::Record;
pub use storage::{FileStorage, InMemoryStorage, StorageBackend, StorageResult};
