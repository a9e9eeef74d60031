//! Tracker player
//!
//! Core playback logic split across submodules:
//! - `sequencer`: order/row navigation and loop detection
//! - `row`: note triggering at the start of each row
//! - `effects`: tick-0 and per-tick effect processing
//! - `nna`: background voices (new note actions, duplicate checks)
//! - `tick`: per-tick driver, envelopes and fadeout
//! - `mixing`: voice gains and sample rendering
//! - `seek`: duration scan and time-based seeking

mod effects;
mod mixing;
mod nna;
mod row;
mod seek;
mod sequencer;
mod tick;


use std::sync::Arc;

use modplay_song::Song;

use crate::channel::{Channel, Voice};
use crate::interpolation::Interpolation;
use sequencer::Sequencer;

/// Default stereo separation (percent)
pub const DEFAULT_STEREO_SEPARATION: u8 = 70;
/// Default panning amplitude (percent)
pub const DEFAULT_PANNING_AMPLITUDE: u8 = 50;

/// Mixer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub interpolation: Interpolation,
    /// Stereo separation, 0 (mono) to 100 (full)
    pub stereo_separation: u8,
    /// How far the song's initial channel pans reach from center, 0-100
    pub panning_amplitude: u8,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::default(),
            stereo_separation: DEFAULT_STEREO_SEPARATION,
            panning_amplitude: DEFAULT_PANNING_AMPLITUDE,
        }
    }
}

/// Playback position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Index into the order list
    pub order: usize,
    /// Pattern played at that order
    pub pattern: u8,
    pub row: u16,
    /// Elapsed playback time
    pub time_ms: u32,
}

/// Sequencer state on first entry into an order, recorded by the duration scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderMark {
    pub order: usize,
    /// Row the order was entered at (nonzero after a pattern break)
    pub row: u16,
    pub time_ms: u32,
    /// Output frames rendered before this point
    pub frames: u64,
    pub speed: u8,
    pub tempo: u8,
    pub global_volume: u8,
}

/// Plays a song tick by tick
pub struct Player {
    song: Arc<Song>,
    config: PlayerConfig,
    channels: Vec<Channel>,
    /// Voices detached from their channel by new note actions
    background: Vec<Voice>,
    seq: Sequencer,
    /// Output scaling from channel count and the song's mixing volume
    master_gain: f32,
    duration_ms: u32,
    marks: Vec<OrderMark>,
    /// Times the song reached its end (order list exhausted or looped)
    loop_count: u32,
    mix_buffer: Vec<f32>,
    output: Vec<i16>,
}

impl Player {
    /// Create a player positioned at the start of the song
    ///
    /// Runs the sequencer once over the whole song (without mixing) to find
    /// the duration and the per-order seek points.
    pub fn new(song: impl Into<Arc<Song>>, config: PlayerConfig) -> Self {
        let mut player = Self::unscanned(song.into(), config);
        let (duration_ms, marks) = seek::scan(&player.song, config);
        player.duration_ms = duration_ms;
        player.marks = marks;
        tracing::debug!(
            duration_ms,
            orders = player.marks.len(),
            "song scanned"
        );
        player
    }

    fn unscanned(song: Arc<Song>, config: PlayerConfig) -> Self {
        let channels = fresh_channels(&song, config.panning_amplitude);
        let seq = Sequencer::new(&song);
        let loop_count = u32::from(seq.is_none());
        let seq = seq.unwrap_or_else(|| Sequencer::ended(&song));
        Self {
            master_gain: master_gain(&song),
            song,
            config,
            channels,
            background: Vec::new(),
            seq,
            duration_ms: 0,
            marks: Vec::new(),
            loop_count,
            mix_buffer: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    /// Total playing time up to the end or the first loop
    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// Seek points, one per order reached during playback, in time order
    pub fn order_marks(&self) -> &[OrderMark] {
        &self.marks
    }

    pub fn position(&self) -> Position {
        Position {
            order: self.seq.order,
            pattern: self.song.orders.get(self.seq.order).copied().unwrap_or(0),
            row: self.seq.row,
            time_ms: self.seq.elapsed_ms(),
        }
    }

    /// Times playback reached the end of the song
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn is_finished(&self) -> bool {
        self.loop_count > 0
    }

    pub fn config(&self) -> PlayerConfig {
        self.config
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.config.interpolation = interpolation;
    }

    /// Set stereo separation (clamped to 0-100); applies from the next tick
    pub fn set_stereo_separation(&mut self, percent: u8) {
        self.config.stereo_separation = percent.min(100);
    }

    /// Render one sequencer tick
    ///
    /// Returns interleaved stereo i16 at [`crate::SAMPLE_RATE`]. The slice is
    /// empty once the song has finished.
    pub fn play_tick(&mut self) -> &[i16] {
        self.output.clear();
        if !self.is_finished() {
            self.step(true);
        }
        &self.output
    }

    /// Active voices, foreground and background
    pub fn active_voices(&self) -> usize {
        let foreground = self
            .channels
            .iter()
            .filter(|c| c.voice.as_ref().is_some_and(|v| v.active))
            .count();
        foreground + self.background.iter().filter(|v| v.active).count()
    }
}

fn fresh_channels(song: &Song, amplitude: u8) -> Vec<Channel> {
    song.channels
        .iter()
        .map(|settings| Channel::new(settings, amplitude))
        .collect()
}

/// Headroom for many simultaneous channels, times the song's mixing volume
/// (48 plays at unity)
fn master_gain(song: &Song) -> f32 {
    let channels = song.num_channels().max(1) as f32;
    let headroom = (2.0 / channels.sqrt()).min(1.0);
    let mix = match song.mix_volume {
        0 => 1.0,
        v => (v as f32 / 48.0).min(2.0),
    };
    headroom * mix
}
