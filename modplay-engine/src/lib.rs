//! modplay-engine: tick-based tracker playback
//!
//! Plays a [`modplay_song::Song`] one sequencer tick at a time and renders
//! each tick to interleaved signed 16-bit stereo at 44.1 kHz.
//!
//! # Architecture
//!
//! ```text
//! Song ──► Player ──► row processing (notes, tick-0 effects)
//!             │          │
//!             │          ▼
//!             │       tick effects (slides, vibrato, envelopes)
//!             │          │
//!             │          ▼
//!             └────► mixer (interpolation, pan, gain ramp) ──► &[i16]
//! ```
//!
//! Playback stops when the order list runs out or the sequencer arrives at a
//! row it already played (a song loop). The length of the song and the
//! per-order seek points are found once, up front, by running the sequencer
//! without mixing.

mod channel;
mod interpolation;
mod player;
mod utils;

pub use interpolation::Interpolation;
pub use player::{
    DEFAULT_PANNING_AMPLITUDE, DEFAULT_STEREO_SEPARATION, OrderMark, Player, PlayerConfig, Position,
};

/// Output sample rate (Hz)
pub const SAMPLE_RATE: u32 = 44100;

/// Output channel count (interleaved stereo)
pub const OUTPUT_CHANNELS: u32 = 2;

/// Bytes per output sample (signed 16-bit)
pub const BYTES_PER_SAMPLE: u32 = 2;
