//! Channel and voice state
//!
//! A [`Channel`] is one pattern column: it owns the effect memory, the
//! oscillators and the note currently in the foreground. The sound itself is
//! a [`Voice`]. When a new note arrives, the old voice either stops or (IT new
//! note actions) moves to the background pool and keeps playing on its own.

use modplay_song::{ChannelSettings, Effect, Envelope, NewNoteAction, SampleLoop, VolumeCommand};

use crate::utils::waveform_value;

/// Full fade level (fadeout counts down from here)
pub(crate) const FADE_MAX: i32 = 65536;

// =============================================================================
// Voice
// =============================================================================

/// Position within one instrument envelope
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnvelopePosition {
    pub tick: u16,
    /// Cleared by the IT envelope-control commands (S77, S79, S7B)
    pub enabled: bool,
}

impl Default for EnvelopePosition {
    fn default() -> Self {
        Self {
            tick: 0,
            enabled: true,
        }
    }
}

impl EnvelopePosition {
    /// Advance one tick, honoring the sustain range until release and then the loop
    pub fn advance(&mut self, envelope: &Envelope, released: bool) {
        let next = self.tick.saturating_add(1);
        let next = match (envelope.sustain_ticks(), envelope.loop_ticks()) {
            (Some((start, end)), _) if !released && next > end => start,
            (Some(_), _) if !released => next,
            (_, Some((start, end))) if next > end => start,
            _ => next,
        };
        self.tick = next.min(envelope.last_tick());
    }

    /// Reached the last point with nothing left to loop back to
    pub fn finished(&self, envelope: &Envelope, released: bool) -> bool {
        let held = !released && envelope.sustain_range.is_some();
        !held && envelope.loop_range.is_none() && self.tick >= envelope.last_tick()
    }
}

/// One sounding sample
#[derive(Debug, Clone)]
pub(crate) struct Voice {
    /// Pattern channel that started this voice
    pub channel: usize,
    /// Index into `Song::samples`
    pub sample: usize,
    /// Index into `Song::instruments`
    pub instrument: usize,
    /// Key as written in the pattern (for duplicate checks)
    pub key: u8,
    /// What happens to this voice when the next note arrives
    pub nna: NewNoteAction,

    // Sample playback
    /// Fractional frame position
    pub pos: f64,
    /// Playing forward (ping-pong loops flip this)
    pub forward: bool,
    /// Still producing sound
    pub active: bool,

    // Release
    /// Key-off received (sustain loops and envelope sustains released)
    pub key_off: bool,
    /// Fadeout running
    pub fading: bool,
    /// Fade level (0..=FADE_MAX)
    pub fade: i32,
    /// Amount subtracted from `fade` each tick while fading
    pub fadeout: i32,
    /// Ramp to silence over the next tick, then stop
    pub release: bool,

    // Envelopes
    pub volume_env: EnvelopePosition,
    pub panning_env: EnvelopePosition,
    pub pitch_env: EnvelopePosition,

    // Auto-vibrato
    pub auto_vibrato_pos: u8,
    pub auto_vibrato_ticks: u32,

    // Parameters written by the owning channel every tick (frozen in background)
    /// Frequency in Hz before pitch envelope and auto-vibrato
    pub base_frequency: f64,
    /// Note volume times channel volume (0.0-1.0)
    pub volume: f32,
    /// Panning (0 = left, 128 = center, 255 = right)
    pub pan: i32,

    // Mixer state
    /// Playback frequency for the current tick
    pub frequency: f64,
    /// Gains reached at the end of the last tick
    pub gain: (f32, f32),
    /// Gains to ramp toward during the current tick
    pub target: (f32, f32),
}

impl Voice {
    pub fn new(channel: usize, sample: usize, instrument: usize, key: u8) -> Self {
        Self {
            channel,
            sample,
            instrument,
            key,
            nna: NewNoteAction::Cut,
            pos: 0.0,
            forward: true,
            active: true,
            key_off: false,
            fading: false,
            fade: FADE_MAX,
            fadeout: 0,
            release: false,
            volume_env: EnvelopePosition::default(),
            panning_env: EnvelopePosition::default(),
            pitch_env: EnvelopePosition::default(),
            auto_vibrato_pos: 0,
            auto_vibrato_ticks: 0,
            base_frequency: 0.0,
            volume: 0.0,
            pan: 128,
            frequency: 0.0,
            gain: (0.0, 0.0),
            target: (0.0, 0.0),
        }
    }

    /// Rough loudness used to pick a background voice to steal
    pub fn loudness(&self) -> f32 {
        if !self.active || self.release {
            return 0.0;
        }
        self.target.0 + self.target.1
    }

    /// Restart the sample from the top (retrigger)
    pub fn restart(&mut self) {
        self.pos = 0.0;
        self.forward = true;
        self.active = true;
    }

    /// Advance the play position by `step` frames, wrapping in the loop
    pub fn advance(&mut self, step: f64, length: usize, active_loop: Option<SampleLoop>) {
        if self.forward {
            self.pos += step;
            match active_loop {
                Some(l) if self.pos >= l.end as f64 => {
                    let (start, end) = (l.start as f64, l.end as f64);
                    let len = end - start;
                    if l.ping_pong {
                        let over = (self.pos - end) % (2.0 * len);
                        if over < len {
                            self.pos = (end - over).min(end - 1e-6);
                            self.forward = false;
                        } else {
                            self.pos = start + (over - len);
                        }
                    } else {
                        self.pos = start + (self.pos - end) % len;
                    }
                }
                None if self.pos >= length as f64 => self.active = false,
                _ => {}
            }
        } else {
            self.pos -= step;
            match active_loop {
                Some(l) if self.pos < l.start as f64 => {
                    let (start, end) = (l.start as f64, l.end as f64);
                    let len = end - start;
                    let over = (start - self.pos) % (2.0 * len);
                    if over < len {
                        self.pos = start + over;
                        self.forward = true;
                    } else {
                        self.pos = (end - (over - len)).min(end - 1e-6);
                    }
                }
                None if self.pos < 0.0 => {
                    self.pos = 0.0;
                    self.forward = true;
                }
                _ => {}
            }
        }
    }
}

/// Sample frame at `index` as -1.0..1.0, following the loop past its end
#[inline]
pub(crate) fn frame_at(data: &[i16], active_loop: Option<SampleLoop>, index: isize) -> f32 {
    let index = match active_loop {
        Some(l) if index >= l.end as isize => {
            let (start, end) = (l.start as isize, l.end as isize);
            let over = (index - end) % (end - start);
            if l.ping_pong {
                (end - 1 - over).max(start)
            } else {
                start + over
            }
        }
        _ => index.max(0),
    };
    data.get(index as usize).map_or(0.0, |&s| s as f32 / 32768.0)
}

// =============================================================================
// Channel
// =============================================================================

/// Vibrato, tremolo or panbrello oscillator
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Oscillator {
    /// Position in the 256-step waveform
    pub position: u8,
    pub speed: u8,
    pub depth: u8,
    /// Waveform (bits 0-1), bit 2 keeps the position on new notes
    pub waveform: u8,
}

impl Oscillator {
    /// Take speed (x) and depth (y) from a parameter, keeping zero nibbles
    pub fn set(&mut self, param: u8) {
        if param >> 4 != 0 {
            self.speed = param >> 4;
        }
        if param & 0x0F != 0 {
            self.depth = param & 0x0F;
        }
    }

    /// Current value, -depth..=depth
    pub fn value(&self) -> f32 {
        waveform_value(self.waveform, self.position) * self.depth as f32
    }

    pub fn advance(&mut self) {
        self.position = self.position.wrapping_add(self.speed << 2);
    }

    pub fn retrigger(&mut self) {
        if self.waveform & 0x04 == 0 {
            self.position = 0;
        }
    }
}

/// Last nonzero parameters, for effects whose zero parameter means "reuse"
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EffectMemory {
    pub volume_slide: u8,
    pub porta_up: u8,
    pub porta_down: u8,
    pub fine_porta_up: u8,
    pub fine_porta_down: u8,
    pub extra_fine_porta_up: u8,
    pub extra_fine_porta_down: u8,
    pub tone_porta: u8,
    pub sample_offset: u8,
    pub high_offset: u8,
    pub retrigger: u8,
    pub tremor: u8,
    pub arpeggio: u8,
    pub panning_slide: u8,
    pub global_volume_slide: u8,
    pub channel_volume_slide: u8,
    pub tempo_slide: u8,
}

/// Per-channel playback state
#[derive(Debug, Clone, Default)]
pub(crate) struct Channel {
    /// Foreground voice
    pub voice: Option<Voice>,
    /// Disabled in the song header; notes on this channel are ignored
    pub muted: bool,

    // Note state
    /// Last instrument number (1-based, 0 = none yet)
    pub instrument: u8,
    /// Key of the last note after the instrument keymap
    pub key: u8,
    /// C-5 speed of the playing sample
    pub c5_speed: u32,
    /// Current period (slides applied)
    pub period: f64,
    /// Tone portamento destination
    pub target_period: f64,
    /// Note volume (0-64)
    pub volume: i32,
    /// Panning (0-255)
    pub pan: i32,
    /// Channel volume (0-64)
    pub channel_volume: i32,

    // Current row
    pub effect: Effect,
    pub volume_command: VolumeCommand,
    /// Note held back by a note delay, with the tick it plays on
    pub delayed: Option<(u16, modplay_song::Note)>,
    pub note_cut_tick: Option<u16>,
    pub key_off_tick: Option<u16>,
    /// Fine vibrato (quarter depth) on this row
    pub fine_vibrato: bool,

    pub mem: EffectMemory,
    pub vibrato: Oscillator,
    pub tremolo: Oscillator,
    pub panbrello: Oscillator,
    pub glissando: bool,
    pub retrigger_count: u8,
    pub tremor_count: u8,

    // Pattern loop
    pub loop_row: u16,
    pub loop_count: u8,

    // Modulation for the current tick
    /// Vibrato period offset
    pub period_delta: f64,
    /// Tremolo volume offset
    pub volume_delta: i32,
    /// Panbrello pan offset
    pub pan_delta: i32,
    /// Arpeggio semitone offset
    pub arpeggio: u8,
    /// Tremor off phase
    pub tremor_mute: bool,
}

impl Channel {
    /// Channel in its initial state; `amplitude` (0-100) scales the distance
    /// of the initial pan from center
    pub fn new(settings: &ChannelSettings, amplitude: u8) -> Self {
        let offset = settings.pan as i32 - 128;
        Self {
            muted: settings.muted,
            pan: (128 + offset * amplitude.min(100) as i32 / 100).clamp(0, 255),
            channel_volume: settings.volume.min(64) as i32,
            c5_speed: 8363,
            ..Default::default()
        }
    }

    /// Store the row's commands and clear per-row state
    pub fn begin_row(&mut self, effect: Effect, volume_command: VolumeCommand) {
        self.effect = effect;
        self.volume_command = volume_command;
        self.delayed = None;
        self.note_cut_tick = None;
        self.key_off_tick = None;
        self.fine_vibrato = false;
    }

    /// Clear the modulation applied on the previous tick
    pub fn clear_modulation(&mut self) {
        self.period_delta = 0.0;
        self.volume_delta = 0;
        self.pan_delta = 0;
        self.arpeggio = 0;
        self.tremor_mute = false;
    }

    /// The foreground voice, if it is still sounding
    pub fn active_voice(&mut self) -> Option<&mut Voice> {
        self.voice.as_mut().filter(|v| v.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(points: &[(u16, i8)]) -> Envelope {
        Envelope {
            points: points.to_vec(),
            loop_range: None,
            sustain_range: None,
        }
    }

    #[test]
    fn test_envelope_sustain_holds_until_release() {
        let mut env = envelope(&[(0, 64), (4, 32), (8, 0)]);
        env.sustain_range = Some((1, 1));
        let mut pos = EnvelopePosition::default();
        for _ in 0..10 {
            pos.advance(&env, false);
        }
        assert_eq!(pos.tick, 4);
        assert!(!pos.finished(&env, false));
        for _ in 0..10 {
            pos.advance(&env, true);
        }
        assert_eq!(pos.tick, 8);
        assert!(pos.finished(&env, true));
    }

    #[test]
    fn test_envelope_loop() {
        let mut env = envelope(&[(0, 0), (2, 64), (6, 32)]);
        env.loop_range = Some((1, 2));
        let mut pos = EnvelopePosition::default();
        let ticks: Vec<u16> = (0..9)
            .map(|_| {
                pos.advance(&env, true);
                pos.tick
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3, 4, 5, 6, 2, 3, 4]);
        assert!(!pos.finished(&env, true));
    }

    #[test]
    fn test_forward_loop_wraps() {
        let mut voice = Voice::new(0, 0, 0, 60);
        let lp = SampleLoop::new(4, 8, false, 8);
        voice.pos = 7.5;
        voice.advance(1.0, 8, lp);
        assert!((voice.pos - 4.5).abs() < 1e-9);
        assert!(voice.active);
    }

    #[test]
    fn test_ping_pong_loop_reverses() {
        let mut voice = Voice::new(0, 0, 0, 60);
        let lp = SampleLoop::new(4, 8, true, 8);
        voice.pos = 7.5;
        voice.advance(1.0, 8, lp);
        assert!(!voice.forward);
        assert!((voice.pos - 7.5).abs() < 1e-6);
        voice.pos = 4.5;
        voice.advance(1.0, 8, lp);
        assert!(voice.forward);
        assert!((voice.pos - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_unlooped_sample_ends() {
        let mut voice = Voice::new(0, 0, 0, 60);
        voice.pos = 9.0;
        voice.advance(2.0, 10, None);
        assert!(!voice.active);
    }

    #[test]
    fn test_frame_at_wraps_into_loop() {
        let data: Vec<i16> = (0..8).map(|i| i * 1024).collect();
        let lp = SampleLoop::new(4, 8, false, 8);
        assert_eq!(frame_at(&data, lp, 8), frame_at(&data, lp, 4));
        assert_eq!(frame_at(&data, None, 8), 0.0);
        assert_eq!(frame_at(&data, None, -1), 0.0);
        let ping = SampleLoop::new(4, 8, true, 8);
        assert_eq!(frame_at(&data, ping, 8), frame_at(&data, ping, 7));
    }

    #[test]
    fn test_channel_pan_amplitude() {
        let hard_left = ChannelSettings {
            pan: 0,
            ..Default::default()
        };
        assert_eq!(Channel::new(&hard_left, 100).pan, 0);
        assert_eq!(Channel::new(&hard_left, 50).pan, 64);
        assert_eq!(Channel::new(&hard_left, 0).pan, 128);
    }

    #[test]
    fn test_oscillator_memory() {
        let mut osc = Oscillator::default();
        osc.set(0x48);
        osc.set(0x03);
        assert_eq!((osc.speed, osc.depth), (4, 3));
        osc.advance();
        assert_eq!(osc.position, 16);
        osc.retrigger();
        assert_eq!(osc.position, 0);
    }
}
