//! Error types for module loading

use std::io;

/// Errors that can occur when loading a tracker module
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No loader recognized the data
    #[error("unrecognized module format")]
    UnknownFormat,

    /// Data ended before a structure was complete
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Header field outside the range the format allows
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// Too many channels for the player (max 64)
    #[error("too many channels: {0} (max 64)")]
    TooManyChannels(u16),

    /// A pattern could not be decoded
    #[error("invalid pattern data at index {0}")]
    InvalidPattern(u16),

    /// An instrument could not be decoded
    #[error("invalid instrument data at index {0}")]
    InvalidInstrument(u16),

    /// A sample header or its data could not be decoded
    #[error("invalid sample data at index {0}")]
    InvalidSample(u16),

    /// Compressed sample stream is corrupt
    #[error("decompression error: {0}")]
    Decompression(&'static str),

    /// IO error while reading the source
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl LoadError {
    /// Collapse cursor exhaustion into `UnexpectedEof`
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof
        } else {
            Self::Io(err)
        }
    }
}
