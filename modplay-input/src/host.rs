//! Host plugin contract
//!
//! The traits a host player implements to drive the plugin: metadata
//! tuples, the audio sink and playback control, virtual files and the
//! settings store. The plugin side is [`InputPlugin`].

use std::sync::Arc;

use crate::error::OpenError;
use crate::wrap::InterpolatorOption;

/// Largest virtual file a host reads into memory (16 MiB)
pub const READ_ALL_LIMIT: usize = 16 * 1024 * 1024;

// =============================================================================
// Plugin
// =============================================================================

/// Entry points a host calls on an input plugin
pub trait InputPlugin {
    /// Install default settings, keeping values the user already set
    fn init(&self);

    /// Probe whether the plugin can play the resource
    fn is_our_file(&self, identifier: &str, vfile: &mut dyn VfsFile) -> bool;

    /// Fill `tuple` with the resource's metadata
    ///
    /// Returns false and leaves the tuple untouched if the resource cannot be opened.
    fn read_tag(&self, identifier: &str, vfile: &mut dyn VfsFile, tuple: &mut dyn Tuple) -> bool;

    /// Play the resource to the end or until the host asks to stop
    ///
    /// Returns false only if the resource could not be opened.
    fn play(&self, identifier: &str, vfile: &mut dyn VfsFile, playback: &mut dyn Playback)
    -> bool;

    /// Settings widgets shown by the host
    fn preferences(&self) -> Vec<PreferencesWidget>;
}

// =============================================================================
// Metadata
// =============================================================================

/// Metadata fields the plugin writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Duration in milliseconds
    Length,
    Title,
}

/// Host metadata record
pub trait Tuple {
    fn set_filename(&mut self, filename: &str);
    /// Codec name, channel count, sample rate and bitrate
    fn set_format(&mut self, format: &str, channels: u32, rate: u32, bitrate: u32);
    fn set_int(&mut self, field: Field, value: i32);
    fn set_str(&mut self, field: Field, value: &str);
}

/// Plain [`Tuple`] that keeps whatever was written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub filename: Option<String>,
    pub format: Option<String>,
    pub channels: u32,
    pub rate: u32,
    pub bitrate: u32,
    pub length_ms: Option<i32>,
    pub title: Option<String>,
}

impl Tuple for TrackInfo {
    fn set_filename(&mut self, filename: &str) {
        self.filename = Some(filename.to_string());
    }

    fn set_format(&mut self, format: &str, channels: u32, rate: u32, bitrate: u32) {
        self.format = Some(format.to_string());
        self.channels = channels;
        self.rate = rate;
        self.bitrate = bitrate;
    }

    fn set_int(&mut self, field: Field, value: i32) {
        match field {
            Field::Length => self.length_ms = Some(value),
            Field::Title => self.title = Some(value.to_string()),
        }
    }

    fn set_str(&mut self, field: Field, value: &str) {
        match field {
            Field::Length => self.length_ms = value.parse().ok(),
            Field::Title => self.title = Some(value.to_string()),
        }
    }
}

// =============================================================================
// Playback
// =============================================================================

/// PCM sample layouts a sink can be opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit, native endian
    S16NE,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16NE => 2,
        }
    }
}

/// Audio sink and control channel for one playback session
pub trait Playback {
    fn open_audio(&mut self, format: SampleFormat, rate: u32, channels: u32);

    /// Queue interleaved PCM; may block until the sink has room
    fn write_audio(&mut self, data: &[u8]);

    /// True once the host wants playback to end
    fn check_stop(&mut self) -> bool;

    /// Most recent pending seek request, in milliseconds
    fn check_seek(&mut self) -> Option<u32>;
}

// =============================================================================
// Files
// =============================================================================

/// Host virtual file
pub trait VfsFile {
    /// Read the whole file, failing with [`OpenError::ReadTooLarge`] past
    /// [`READ_ALL_LIMIT`]
    fn read_all(&mut self) -> Result<Vec<u8>, OpenError>;
}

/// Virtual file over an in-memory buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    data: Vec<u8>,
    limit: usize,
}

impl MemoryFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            limit: READ_ALL_LIMIT,
        }
    }

    /// Use a different read cap
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl VfsFile for MemoryFile {
    fn read_all(&mut self) -> Result<Vec<u8>, OpenError> {
        if self.data.len() > self.limit {
            return Err(OpenError::ReadTooLarge { limit: self.limit });
        }
        Ok(self.data.clone())
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Named settings, grouped by section
///
/// Shared between the playback worker and the settings UI.
pub trait ConfigStore: Send + Sync {
    /// Set values for keys that have none yet
    fn set_defaults(&self, section: &str, defaults: &[(&str, &str)]);

    /// Integer value of a setting; missing or unparsable values read as 0
    fn get_int(&self, section: &str, key: &str) -> i32;

    fn set_int(&self, section: &str, key: &str, value: i32);

    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}

/// Called after the user changes a bound setting
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Setting a widget reads and writes
#[derive(Clone)]
pub struct WidgetBinding {
    pub section: &'static str,
    pub key: &'static str,
    pub on_change: Option<ChangeCallback>,
}

impl WidgetBinding {
    /// Run the change callback, if any
    pub fn notify(&self) {
        if let Some(on_change) = &self.on_change {
            on_change();
        }
    }
}

impl std::fmt::Debug for WidgetBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetBinding")
            .field("section", &self.section)
            .field("key", &self.key)
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

/// Settings widget description
#[derive(Debug, Clone)]
pub enum PreferencesWidget {
    /// Integer spin box
    Spin {
        label: &'static str,
        bind: WidgetBinding,
        min: i32,
        max: i32,
        step: i32,
        unit: &'static str,
    },
    /// Drop-down list of named values
    Combo {
        label: &'static str,
        bind: WidgetBinding,
        items: &'static [InterpolatorOption],
    },
}

impl PreferencesWidget {
    pub fn binding(&self) -> &WidgetBinding {
        match self {
            Self::Spin { bind, .. } | Self::Combo { bind, .. } => bind,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Spin { label, .. } | Self::Combo { label, .. } => label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_file_read_limit() {
        let mut file = MemoryFile::new(vec![1, 2, 3]);
        assert_eq!(file.read_all().unwrap(), vec![1, 2, 3]);

        let mut small = MemoryFile::new(vec![0; 10]).with_limit(4);
        assert!(matches!(
            small.read_all(),
            Err(OpenError::ReadTooLarge { limit: 4 })
        ));
    }

    #[test]
    fn test_track_info_records_fields() {
        let mut info = TrackInfo::default();
        info.set_filename("/music/a.xm");
        info.set_format("XM", 2, 44100, 0);
        info.set_int(Field::Length, 1500);
        info.set_str(Field::Title, "tune");
        assert_eq!(info.filename.as_deref(), Some("/music/a.xm"));
        assert_eq!(info.format.as_deref(), Some("XM"));
        assert_eq!((info.channels, info.rate, info.bitrate), (2, 44100, 0));
        assert_eq!(info.length_ms, Some(1500));
        assert_eq!(info.title.as_deref(), Some("tune"));
    }

    #[test]
    fn test_widget_binding_notify() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let bind = WidgetBinding {
            section: "modplay",
            key: "interpolator",
            on_change: Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        };
        bind.notify();
        bind.notify();
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
