//! Error types for the watch/scan layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Store(#[from] cellwatch_store::StoreError),

    #[error(transparent)]
    Read(#[from] cellwatch_core::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type WatchResult<T> = Result<T, WatchError>;
