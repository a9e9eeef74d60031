//! modplay-input: tracker module input plugin
//!
//! Adapts the modplay player to a host audio player's plugin contract.
//!
//! # Architecture
//!
//! ```text
//!   host ──► ModulePlugin (play loop, settings)
//!                │
//!                ▼
//!            resolver ── local path ──► ModuleWrap::open_from_path
//!                │
//!                └────── VfsFile::read_all ──► ModuleWrap::open_from_memory
//!                                                   │
//!                              Frame (S16NE, 44100 Hz, stereo) ◄──┘
//!                                   │
//!                                   ▼
//!                            Playback::write_audio
//! ```
//!
//! Settings live in a [`ConfigStore`] under the `"modplay"` section. The
//! stereo separation and interpolator apply to a running session; the
//! panning amplitude applies when a file is opened.

pub mod config;
mod error;
pub mod host;
pub mod plugin;
pub mod resolver;
pub mod wrap;

pub use config::MemoryConfig;
pub use error::OpenError;
pub use host::{
    ConfigStore, Field, InputPlugin, MemoryFile, Playback, PreferencesWidget, READ_ALL_LIMIT,
    SampleFormat, TrackInfo, Tuple, VfsFile, WidgetBinding,
};
pub use plugin::ModulePlugin;
pub use wrap::{Frame, InterpolatorOption, ModuleInfo, ModuleWrap};
