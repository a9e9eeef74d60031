//! Error types for opening modules

use std::io;

use modplay_song::LoadError;

/// Errors that can occur while producing an engine handle
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// The loader did not recognize the bytes (or the file could not be read)
    #[error("not a playable module: {0}")]
    InvalidFile(String),

    /// A virtual-file read went past the host's size cap
    #[error("file exceeds the {limit} byte read limit")]
    ReadTooLarge { limit: usize },

    /// The host could not read the virtual file
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<LoadError> for OpenError {
    fn from(err: LoadError) -> Self {
        Self::InvalidFile(err.to_string())
    }
}
