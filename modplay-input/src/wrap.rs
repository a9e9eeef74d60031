//! Engine wrapper
//!
//! [`ModuleWrap`] owns a loaded song and its player and exposes the small
//! surface the plugin needs: metadata queries, seeking, live mixer settings
//! and tick-sized PCM frames.

use std::path::Path;

use modplay_engine::{
    BYTES_PER_SAMPLE, DEFAULT_PANNING_AMPLITUDE, DEFAULT_STEREO_SEPARATION, Interpolation,
    OUTPUT_CHANNELS, Player, PlayerConfig, SAMPLE_RATE,
};
use modplay_song::{ChannelSettings, Song};
use tracing::debug;

use crate::error::OpenError;

/// A named interpolator selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpolatorOption {
    pub name: &'static str,
    pub value: i32,
}

static INTERPOLATORS: [InterpolatorOption; 3] = [
    InterpolatorOption {
        name: "Nearest Neighbor",
        value: 0,
    },
    InterpolatorOption {
        name: "Linear",
        value: 1,
    },
    InterpolatorOption {
        name: "Spline",
        value: 2,
    },
];

/// Read-only module details gathered at open time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Tracker that saved the file, when the format records it
    pub tracker: String,
    pub patterns: usize,
    pub channels: usize,
    pub instruments: usize,
    pub samples: usize,
    /// Length of the order list
    pub orders: usize,
    pub initial_speed: u8,
    pub initial_tempo: u8,
    pub instrument_names: Vec<String>,
    pub sample_names: Vec<String>,
    pub message: String,
    /// One character per channel: initial pan as a hex digit (0 left,
    /// 8 center, f right) or `-` for a muted channel
    pub channel_pans: String,
}

impl ModuleInfo {
    fn from_song(song: &Song) -> Self {
        Self {
            tracker: song.tracker.clone(),
            patterns: song.patterns.len(),
            channels: song.num_channels(),
            instruments: song.instruments.len(),
            samples: song.samples.len(),
            orders: song.orders.len(),
            initial_speed: song.initial_speed,
            initial_tempo: song.initial_tempo,
            instrument_names: song.instruments.iter().map(|i| i.name.clone()).collect(),
            sample_names: song.samples.iter().map(|s| s.name.clone()).collect(),
            message: song.message.clone(),
            channel_pans: song.channels.iter().map(pan_digit).collect(),
        }
    }
}

fn pan_digit(channel: &ChannelSettings) -> char {
    if channel.muted {
        return '-';
    }
    char::from_digit((channel.pan >> 4) as u32, 16).unwrap_or('?')
}

/// One synthesis step of interleaved S16NE stereo PCM
///
/// Borrowed from the handle, so it is gone by the next synthesis call.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub bytes: &'a [u8],
    /// Sample frames (one left/right pair each)
    pub n: usize,
}

impl Frame<'_> {
    /// End of stream
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

/// Open module with a player positioned somewhere in it
pub struct ModuleWrap {
    player: Player,
    format: &'static str,
    info: ModuleInfo,
}

impl ModuleWrap {
    /// Open a module file
    ///
    /// Read failures are reported as [`OpenError::InvalidFile`] like
    /// unrecognized contents.
    pub fn open_from_path(
        path: impl AsRef<Path>,
        panning_amplitude: Option<i32>,
    ) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| OpenError::InvalidFile(format!("{}: {e}", path.display())))?;
        Self::open_from_memory(&data, panning_amplitude)
    }

    /// Open a module from its bytes
    pub fn open_from_memory(data: &[u8], panning_amplitude: Option<i32>) -> Result<Self, OpenError> {
        let song = modplay_song::load(data)?;
        let config = PlayerConfig {
            panning_amplitude: checked_percent(panning_amplitude.unwrap_or(-1))
                .unwrap_or(DEFAULT_PANNING_AMPLITUDE),
            ..Default::default()
        };
        let format = song.format.short_name();
        let info = ModuleInfo::from_song(&song);
        let player = Player::new(song, config);
        debug!(
            format,
            title = %player.song().title,
            duration_ms = player.duration_ms(),
            "module opened"
        );
        Ok(Self {
            player,
            format,
            info,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Short format name ("MOD", "S3M", "XM" or "IT")
    pub fn format(&self) -> &str {
        self.format
    }

    pub fn channels(&self) -> u32 {
        OUTPUT_CHANNELS
    }

    pub fn rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Playing time in milliseconds
    pub fn duration(&self) -> u32 {
        self.player.duration_ms()
    }

    /// Song title, possibly empty
    pub fn title(&self) -> &str {
        &self.player.song().title
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// Current playback time in milliseconds
    pub fn position_ms(&self) -> u32 {
        self.player.position().time_ms
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Move playback to `ms`, clamped to the song
    ///
    /// Seeks land on order boundaries. A forward seek that would stay in the
    /// current order moves on to the next one instead.
    pub fn seek(&mut self, ms: u32) {
        let from = self.player.position().order;
        self.player.seek_time(ms);
        let to = self.player.position().order;
        if ms > 0 && to == from && self.player.set_order(from + 1) {
            debug!(ms, order = self.player.position().order, "seek advanced to next order");
        }
    }

    /// Switch interpolation; unknown selectors are ignored
    pub fn set_interpolator(&mut self, selector: i32) {
        if let Some(interpolation) = Interpolation::from_index(selector) {
            self.player.set_interpolation(interpolation);
        }
    }

    /// Set stereo separation; values outside 0-100 are ignored
    pub fn set_stereo_separation(&mut self, percent: i32) {
        if let Some(percent) = checked_percent(percent) {
            self.player.set_stereo_separation(percent);
        }
    }

    /// Synthesize the next tick of audio
    ///
    /// Returns an empty frame at the end of the song, and on every call after.
    pub fn play_frame(&mut self) -> Frame<'_> {
        let samples = self.player.play_tick();
        Frame {
            n: samples.len() / OUTPUT_CHANNELS as usize,
            bytes: bytemuck::cast_slice(samples),
        }
    }

    /// Mixer settings currently in effect
    pub fn config(&self) -> PlayerConfig {
        self.player.config()
    }

    // =========================================================================
    // Static metadata
    // =========================================================================

    pub fn default_stereo_separation() -> i32 {
        DEFAULT_STEREO_SEPARATION as i32
    }

    pub fn default_panning_amplitude() -> i32 {
        DEFAULT_PANNING_AMPLITUDE as i32
    }

    pub fn default_interpolator() -> i32 {
        Interpolation::default().index()
    }

    /// Interpolator choices in selector order
    pub fn get_interpolators() -> &'static [InterpolatorOption] {
        &INTERPOLATORS
    }

    /// Bytes in a frame of `n` sample frames
    pub fn frame_bytes(n: usize) -> usize {
        n * (OUTPUT_CHANNELS * BYTES_PER_SAMPLE) as usize
    }
}

fn checked_percent(value: i32) -> Option<u8> {
    u8::try_from(value).ok().filter(|v| *v <= 100)
}

#[cfg(test)]
mod tests {
    use modplay_song::ORDER_SKIP;
    use modplay_song::testing::{ItBuilder, ModBuilder, XmBuilder, square_wave};

    use super::*;

    fn two_order_mod() -> Vec<u8> {
        ModBuilder::new(4)
            .title("Demo")
            .sample("square", vec![90, 90, -90, -90].repeat(16), 64, Some((0, 64)))
            .patterns(2)
            .orders(&[0, 1])
            .note(0, 0, 0, 60, 1)
            .build()
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ModuleWrap>();
    }

    #[test]
    fn test_open_from_memory_queries() {
        let wrap = ModuleWrap::open_from_memory(&two_order_mod(), None).unwrap();
        assert_eq!(wrap.format(), "MOD");
        assert_eq!(wrap.title(), "Demo");
        assert_eq!(wrap.channels(), 2);
        assert_eq!(wrap.rate(), 44100);
        assert_eq!(wrap.duration(), 2 * 64 * 6 * 20);

        let info = wrap.info();
        assert_eq!(info.channels, 4);
        assert_eq!(info.orders, 2);
        assert_eq!(info.patterns, 2);
        assert_eq!(info.sample_names[0], "square");
        assert_eq!((info.initial_speed, info.initial_tempo), (6, 125));
        // Amiga LRRL
        assert_eq!(info.channel_pans, "0ff0");
    }

    #[test]
    fn test_open_rejects_garbage() {
        assert!(matches!(
            ModuleWrap::open_from_memory(b"hello world", None),
            Err(OpenError::InvalidFile(_))
        ));
        assert!(ModuleWrap::open_from_memory(&[], None).is_err());
    }

    #[test]
    fn test_open_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.mod");
        std::fs::write(&path, two_order_mod()).unwrap();
        let wrap = ModuleWrap::open_from_path(&path, Some(100)).unwrap();
        assert_eq!(wrap.config().panning_amplitude, 100);

        let missing = ModuleWrap::open_from_path(dir.path().join("missing.mod"), None);
        assert!(matches!(missing, Err(OpenError::InvalidFile(_))));
    }

    #[test]
    fn test_out_of_range_amplitude_uses_default() {
        let wrap = ModuleWrap::open_from_memory(&two_order_mod(), Some(250)).unwrap();
        assert_eq!(wrap.config().panning_amplitude, DEFAULT_PANNING_AMPLITUDE);
    }

    #[test]
    fn test_frames_until_end_of_stream() {
        let mut wrap = ModuleWrap::open_from_memory(&two_order_mod(), None).unwrap();
        let frame = wrap.play_frame();
        assert_eq!(frame.n, 882);
        assert_eq!(frame.bytes.len(), ModuleWrap::frame_bytes(frame.n));

        let mut frames = 1;
        while !wrap.play_frame().is_empty() {
            frames += 1;
        }
        assert_eq!(frames, 2 * 64 * 6);
        assert!(wrap.play_frame().is_empty());
        assert!(wrap.play_frame().is_empty());
    }

    #[test]
    fn test_seek_clamps_and_advances() {
        let mut wrap = ModuleWrap::open_from_memory(&two_order_mod(), None).unwrap();
        // A short forward seek would restart order 0, so it moves to order 1
        wrap.seek(1000);
        assert_eq!(wrap.position_ms(), 7680);

        wrap.seek(0);
        assert_eq!(wrap.position_ms(), 0);
        wrap.seek(0);
        assert_eq!(wrap.position_ms(), 0);

        wrap.seek(u32::MAX);
        assert_eq!(wrap.position_ms(), 7680);
        wrap.seek(u32::MAX);
        assert_eq!(wrap.position_ms(), 7680);
    }

    #[test]
    fn test_seek_steps_over_skip_orders() {
        let data = ItBuilder::new(1)
            .sample(square_wave(256, 8000), Some((0, 256)), None)
            .patterns(2, 64)
            .orders(&[0, ORDER_SKIP, 1])
            .note(0, 0, 0, 60, 1)
            .note(1, 0, 0, 64, 1)
            .build();
        let mut wrap = ModuleWrap::open_from_memory(&data, None).unwrap();
        assert_eq!(wrap.duration(), 15360);
        wrap.seek(5000);
        assert_eq!(wrap.position_ms(), 7680);
        assert!(!wrap.play_frame().is_empty());
    }

    #[test]
    fn test_live_setters_ignore_invalid_values() {
        let mut wrap = ModuleWrap::open_from_memory(&two_order_mod(), None).unwrap();
        wrap.set_interpolator(0);
        assert_eq!(wrap.config().interpolation, Interpolation::Nearest);
        wrap.set_interpolator(7);
        wrap.set_interpolator(-1);
        assert_eq!(wrap.config().interpolation, Interpolation::Nearest);

        wrap.set_stereo_separation(100);
        assert_eq!(wrap.config().stereo_separation, 100);
        wrap.set_stereo_separation(101);
        wrap.set_stereo_separation(-5);
        assert_eq!(wrap.config().stereo_separation, 100);
    }

    #[test]
    fn test_static_metadata() {
        assert_eq!(ModuleWrap::default_stereo_separation(), 70);
        assert_eq!(ModuleWrap::default_panning_amplitude(), 50);
        assert_eq!(ModuleWrap::default_interpolator(), 2);
        let names: Vec<_> = ModuleWrap::get_interpolators()
            .iter()
            .map(|o| (o.value, o.name))
            .collect();
        assert_eq!(
            names,
            vec![(0, "Nearest Neighbor"), (1, "Linear"), (2, "Spline")]
        );
        for option in ModuleWrap::get_interpolators() {
            assert_eq!(
                Interpolation::from_index(option.value).map(Interpolation::name),
                Some(option.name)
            );
        }
    }

    #[test]
    fn test_xm_info() {
        let data = XmBuilder::new(2)
            .instrument("pad", square_wave(64, 4000), Some((0, 64)))
            .patterns(1, 16)
            .note(0, 0, 0, 60, 1)
            .build();
        let wrap = ModuleWrap::open_from_memory(&data, None).unwrap();
        assert_eq!(wrap.format(), "XM");
        assert_eq!(wrap.info().instrument_names, vec!["pad".to_string()]);
        assert_eq!(wrap.duration(), 16 * 6 * 20);
    }
}
