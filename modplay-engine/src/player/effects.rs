//! Effect processing
//!
//! Parameters arrive raw from the song; ProTracker/FastTracker and
//! Scream Tracker/Impulse Tracker read the same byte differently for slides,
//! so interpretation is chosen from the song format here.
//!
//! Period units: linear mode has 64 units per semitone; Amiga mode uses
//! quarter periods. A regular slide of `xx` moves `4 * xx` units per tick,
//! a fine slide `4 * x` once, an extra fine slide `x` once.

use std::sync::Arc;

use modplay_song::{DuplicateAction, Effect, NewNoteAction, SongFlags, SongFormat, VolumeCommand};

use super::Player;
use super::nna::release_voice;
use super::sequencer::{MAX_TEMPO, MIN_TEMPO};
use crate::channel::Channel;
use crate::utils::{
    AMIGA_PERIOD_MAX, AMIGA_PERIOD_MIN, LINEAR_PERIOD_BASE, key_to_period, period_to_key,
};

/// Volume change applied by retrigger, indexed by the x nibble
fn retrigger_volume(volume: i32, x: u8) -> i32 {
    let v = match x {
        1 => volume - 1,
        2 => volume - 2,
        3 => volume - 4,
        4 => volume - 8,
        5 => volume - 16,
        6 => volume * 2 / 3,
        7 => volume / 2,
        9 => volume + 1,
        10 => volume + 2,
        11 => volume + 4,
        12 => volume + 8,
        13 => volume + 16,
        14 => volume * 3 / 2,
        15 => volume * 2,
        _ => volume,
    };
    v.clamp(0, 64)
}

/// Scream Tracker style slide: `x0` up, `0y` down, `xF` fine up, `Fy` fine down
///
/// Returns the signed change for this tick. Fine forms apply on the first
/// tick only, regular ones on every other tick (and the first with fast slides).
fn s3m_slide(param: u8, first_tick: bool, fast: bool) -> i32 {
    let (x, y) = ((param >> 4) as i32, (param & 0x0F) as i32);
    match (x, y) {
        (0x0F, 0) | (0, 0x0F) if !first_tick || fast => {
            if x > 0 {
                x
            } else {
                -y
            }
        }
        (_, 0x0F) if x > 0 => {
            if first_tick {
                x
            } else {
                0
            }
        }
        (0x0F, _) if y > 0 => {
            if first_tick {
                -y
            } else {
                0
            }
        }
        (_, 0) if !first_tick || fast => x,
        (0, _) if !first_tick || fast => -y,
        _ => 0,
    }
}

/// ProTracker/FastTracker style slide: `x` up or `y` down, every tick but the first
fn pt_slide(param: u8, first_tick: bool) -> i32 {
    if first_tick {
        return 0;
    }
    let (x, y) = ((param >> 4) as i32, (param & 0x0F) as i32);
    if x > 0 { x } else { -y }
}

/// Scream Tracker style pitch slide amount (fine and extra fine in the high nibble)
fn s3m_porta(param: u8, first_tick: bool) -> f64 {
    match param {
        0xF0..=0xFF if first_tick => (param & 0x0F) as f64 * 4.0,
        0xE0..=0xEF if first_tick => (param & 0x0F) as f64,
        0xE0..=0xFF => 0.0,
        _ if first_tick => 0.0,
        _ => param as f64 * 4.0,
    }
}

impl Player {
    fn s3m_effects(&self) -> bool {
        self.song.format.uses_s3m_effects()
    }

    fn clamp_period(&self, period: f64) -> f64 {
        if self.song.uses_linear_slides() {
            period.clamp(0.0, LINEAR_PERIOD_BASE * 1.5)
        } else if self.song.flags.contains(SongFlags::AMIGA_LIMITS) {
            period.clamp(AMIGA_PERIOD_MIN, AMIGA_PERIOD_MAX)
        } else {
            period.clamp(AMIGA_PERIOD_MIN / 8.0, AMIGA_PERIOD_MAX * 16.0)
        }
    }

    fn slide_period(&mut self, ch: usize, delta: f64) {
        let period = self.clamp_period(self.channels[ch].period + delta);
        self.channels[ch].period = period;
    }

    /// Volume slide with format-specific parameter rules and memory
    fn volume_slide(&mut self, ch: usize, param: u8, first_tick: bool) {
        let s3m = self.s3m_effects();
        let fast = self.song.flags.contains(SongFlags::FAST_VOLUME_SLIDES);
        let remembers = self.song.format != SongFormat::ProTracker;
        let channel = &mut self.channels[ch];
        let param = if param == 0 && remembers {
            channel.mem.volume_slide
        } else {
            param
        };
        if first_tick && param != 0 {
            channel.mem.volume_slide = param;
        }
        let delta = if s3m {
            s3m_slide(param, first_tick, fast)
        } else {
            pt_slide(param, first_tick)
        };
        channel.volume = (channel.volume + delta).clamp(0, 64);
    }

    fn portamento(&mut self, ch: usize, param: u8, up: bool, first_tick: bool) {
        let s3m = self.s3m_effects();
        let format = self.song.format;
        let link_g = self.song.flags.contains(SongFlags::LINK_G_MEMORY);
        let channel = &mut self.channels[ch];
        let param = match (param, format) {
            (_, SongFormat::ProTracker) => param,
            (0, _) if up => channel.mem.porta_up,
            (0, _) => channel.mem.porta_down,
            (p, _) => p,
        };
        if first_tick && param != 0 {
            if s3m {
                channel.mem.porta_up = param;
                channel.mem.porta_down = param;
                if link_g {
                    channel.mem.tone_porta = param;
                }
            } else if up {
                channel.mem.porta_up = param;
            } else {
                channel.mem.porta_down = param;
            }
        }
        let amount = if s3m {
            s3m_porta(param, first_tick)
        } else if first_tick {
            0.0
        } else {
            param as f64 * 4.0
        };
        self.slide_period(ch, if up { -amount } else { amount });
    }

    fn tone_portamento(&mut self, ch: usize) {
        let channel = &mut self.channels[ch];
        if channel.voice.is_none() {
            return;
        }
        let speed = channel.mem.tone_porta as f64 * 4.0;
        let target = channel.target_period;
        channel.period = if channel.period < target {
            (channel.period + speed).min(target)
        } else {
            (channel.period - speed).max(target)
        };
        if channel.glissando {
            let linear = self.song.uses_linear_slides();
            let channel = &mut self.channels[ch];
            let key = period_to_key(channel.period, linear).round();
            channel.period = key_to_period(key, linear);
        }
    }

    fn vibrato(&mut self, ch: usize) {
        // Impulse Tracker's new effects use a quarter of the classic depth
        let it_new = self.song.format == SongFormat::ImpulseTracker
            && !self.song.flags.contains(SongFlags::OLD_EFFECTS);
        let channel = &mut self.channels[ch];
        let mut scale = if it_new { 2.0 } else { 8.0 };
        if channel.fine_vibrato {
            scale /= 4.0;
        }
        channel.period_delta = channel.vibrato.value() as f64 * scale;
        channel.vibrato.advance();
    }

    fn tremolo(channel: &mut Channel) {
        channel.volume_delta = (channel.tremolo.value() * 4.0) as i32;
        channel.tremolo.advance();
    }

    fn panbrello(channel: &mut Channel) {
        channel.pan_delta = (channel.panbrello.value() * 4.0) as i32;
        channel.panbrello.advance();
    }

    fn tremor(channel: &mut Channel) {
        let on = (channel.mem.tremor >> 4) + 1;
        let off = (channel.mem.tremor & 0x0F) + 1;
        channel.tremor_mute = channel.tremor_count >= on;
        channel.tremor_count = (channel.tremor_count + 1) % (on + off);
    }

    fn panning_slide(&mut self, ch: usize, param: u8, first_tick: bool) {
        let s3m = self.s3m_effects();
        let channel = &mut self.channels[ch];
        let param = if param == 0 {
            channel.mem.panning_slide
        } else {
            param
        };
        if first_tick && param != 0 {
            channel.mem.panning_slide = param;
        }
        let delta = if s3m {
            // Pxy: x slides left, y slides right, in 0-64 pan units
            -s3m_slide(param, first_tick, false) * 4
        } else if first_tick {
            0
        } else {
            let (x, y) = ((param >> 4) as i32, (param & 0x0F) as i32);
            if x > 0 { x } else { -y }
        };
        channel.pan = (channel.pan + delta).clamp(0, 255);
    }

    fn global_volume_slide(&mut self, ch: usize, param: u8, first_tick: bool) {
        let s3m = self.s3m_effects();
        let channel = &mut self.channels[ch];
        let param = if param == 0 {
            channel.mem.global_volume_slide
        } else {
            param
        };
        if first_tick && param != 0 {
            channel.mem.global_volume_slide = param;
        }
        let delta = if s3m {
            s3m_slide(param, first_tick, false)
        } else {
            // FT2 global volume is 0-64, doubled into 0-128
            pt_slide(param, first_tick) * 2
        };
        self.seq.global_volume = (self.seq.global_volume + delta).clamp(0, 128);
    }

    fn channel_volume_slide(&mut self, ch: usize, param: u8, first_tick: bool) {
        let channel = &mut self.channels[ch];
        let param = if param == 0 {
            channel.mem.channel_volume_slide
        } else {
            param
        };
        if first_tick && param != 0 {
            channel.mem.channel_volume_slide = param;
        }
        let delta = s3m_slide(param, first_tick, false);
        channel.channel_volume = (channel.channel_volume + delta).clamp(0, 64);
    }

    fn retrigger(&mut self, ch: usize) {
        let channel = &mut self.channels[ch];
        let param = channel.mem.retrigger;
        let (x, interval) = (param >> 4, param & 0x0F);
        if interval == 0 {
            return;
        }
        channel.retrigger_count += 1;
        if channel.retrigger_count >= interval {
            channel.retrigger_count = 0;
            channel.volume = retrigger_volume(channel.volume, x);
            if let Some(voice) = channel.voice.as_mut()
                && !voice.release
            {
                voice.restart();
            }
        }
    }

    fn key_off_now(&mut self, ch: usize) {
        let song = Arc::clone(&self.song);
        if let Some(voice) = self.channels[ch].active_voice() {
            release_voice(&song, voice);
        }
    }

    // =========================================================================
    // Tick 0
    // =========================================================================

    /// Effect column on the first tick of a row
    pub(super) fn row_effect(&mut self, ch: usize, effect: Effect) {
        let s3m = self.s3m_effects();
        match effect {
            Effect::None | Effect::NoteDelay(_) => {}

            // Speed, tempo and flow
            Effect::SetSpeed(speed) => {
                if speed > 0 {
                    self.seq.speed = speed;
                }
            }
            Effect::SetTempo(tempo) => {
                if tempo as i32 >= MIN_TEMPO {
                    self.seq.tempo = tempo;
                }
            }
            Effect::TempoSlide(param) => {
                if param != 0 {
                    self.channels[ch].mem.tempo_slide = param;
                }
            }
            Effect::PositionJump(order) => {
                self.seq.jump = Some(order as usize);
            }
            Effect::PatternBreak(row) => {
                self.seq.break_row = Some(row as u16);
            }
            Effect::PatternLoop(count) => self.pattern_loop(ch, count),
            Effect::PatternDelay(repeats) => {
                if self.seq.pattern_delay == 0 {
                    self.seq.pattern_delay = repeats;
                }
            }
            Effect::FinePatternDelay(ticks) => {
                self.seq.fine_delay = self.seq.fine_delay.saturating_add(ticks);
            }

            // Volume
            Effect::SetVolume(volume) => self.channels[ch].volume = volume.min(64) as i32,
            Effect::VolumeSlide(param)
            | Effect::VibratoVolSlide(param)
            | Effect::TonePortaVolSlide(param) => self.volume_slide(ch, param, true),
            Effect::FineVolumeUp(amount) => {
                let channel = &mut self.channels[ch];
                channel.volume = (channel.volume + amount as i32).min(64);
            }
            Effect::FineVolumeDown(amount) => {
                let channel = &mut self.channels[ch];
                channel.volume = (channel.volume - amount as i32).max(0);
            }
            Effect::SetGlobalVolume(volume) => self.seq.global_volume = volume.min(128) as i32,
            Effect::GlobalVolumeSlide(param) => self.global_volume_slide(ch, param, true),
            Effect::SetChannelVolume(volume) => {
                self.channels[ch].channel_volume = volume.min(64) as i32;
            }
            Effect::ChannelVolumeSlide(param) => self.channel_volume_slide(ch, param, true),
            Effect::Tremolo(param) => self.channels[ch].tremolo.set(param),
            Effect::Tremor(param) => {
                let channel = &mut self.channels[ch];
                if param != 0 {
                    channel.mem.tremor = param;
                }
                Self::tremor(channel);
            }

            // Pitch
            Effect::Arpeggio(param) => {
                if param != 0 {
                    self.channels[ch].mem.arpeggio = param;
                }
            }
            Effect::PortamentoUp(param) => self.portamento(ch, param, true, true),
            Effect::PortamentoDown(param) => self.portamento(ch, param, false, true),
            Effect::FinePortamentoUp(x) | Effect::FinePortamentoDown(x) => {
                let up = matches!(effect, Effect::FinePortamentoUp(_));
                let channel = &mut self.channels[ch];
                let memory = if up {
                    &mut channel.mem.fine_porta_up
                } else {
                    &mut channel.mem.fine_porta_down
                };
                if x != 0 {
                    *memory = x;
                }
                let amount = *memory as f64 * 4.0;
                self.slide_period(ch, if up { -amount } else { amount });
            }
            Effect::ExtraFinePortamentoUp(x) | Effect::ExtraFinePortamentoDown(x) => {
                let up = matches!(effect, Effect::ExtraFinePortamentoUp(_));
                let channel = &mut self.channels[ch];
                let memory = if up {
                    &mut channel.mem.extra_fine_porta_up
                } else {
                    &mut channel.mem.extra_fine_porta_down
                };
                if x != 0 {
                    *memory = x;
                }
                let amount = *memory as f64;
                self.slide_period(ch, if up { -amount } else { amount });
            }
            Effect::TonePortamento(param) => {
                if param != 0 {
                    let link_g = self.song.flags.contains(SongFlags::LINK_G_MEMORY);
                    let channel = &mut self.channels[ch];
                    channel.mem.tone_porta = param;
                    if link_g {
                        channel.mem.porta_up = param;
                        channel.mem.porta_down = param;
                    }
                }
            }
            Effect::Vibrato(param) => self.channels[ch].vibrato.set(param),
            Effect::FineVibrato(param) => {
                let channel = &mut self.channels[ch];
                channel.vibrato.set(param);
                channel.fine_vibrato = true;
            }
            Effect::Glissando(on) => self.channels[ch].glissando = on,
            Effect::SetFinetune(_) => {}

            // Panning
            Effect::SetPanning(pan) => self.channels[ch].pan = pan as i32,
            Effect::PanningSlide(param) => self.panning_slide(ch, param, true),
            Effect::Panbrello(param) => self.channels[ch].panbrello.set(param),

            // Samples
            Effect::SampleOffset(_) => {}
            Effect::HighSampleOffset(high) => self.channels[ch].mem.high_offset = high,
            Effect::Retrigger(param) => {
                let remembers = self.song.format != SongFormat::ProTracker;
                let channel = &mut self.channels[ch];
                if param != 0 || !remembers {
                    channel.mem.retrigger = param;
                }
            }
            Effect::NoteCut(tick) => {
                let channel = &mut self.channels[ch];
                match (tick, s3m) {
                    (0, false) => channel.volume = 0,
                    (0, true) => channel.note_cut_tick = Some(1),
                    (t, _) => channel.note_cut_tick = Some(t as u16),
                }
            }
            Effect::KeyOff(tick) => {
                if tick == 0 {
                    self.key_off_now(ch);
                } else {
                    self.channels[ch].key_off_tick = Some(tick as u16);
                }
            }
            Effect::SetEnvelopePosition(tick) => {
                if let Some(voice) = self.channels[ch].active_voice() {
                    voice.volume_env.tick = tick as u16;
                    voice.panning_env.tick = tick as u16;
                }
            }
            Effect::InstrumentControl(command) => self.instrument_control(ch, command),

            // Waveforms
            Effect::VibratoWaveform(w) => self.channels[ch].vibrato.waveform = w & 0x07,
            Effect::TremoloWaveform(w) => self.channels[ch].tremolo.waveform = w & 0x07,
            Effect::PanbrelloWaveform(w) => self.channels[ch].panbrello.waveform = w & 0x07,
        }
    }

    fn pattern_loop(&mut self, ch: usize, count: u8) {
        let row = self.seq.row;
        let s3m = self.s3m_effects();
        let channel = &mut self.channels[ch];
        if count == 0 {
            channel.loop_row = row;
            return;
        }
        if channel.loop_count == 0 {
            channel.loop_count = count;
            self.seq.loop_jump = Some(channel.loop_row);
        } else {
            channel.loop_count -= 1;
            if channel.loop_count > 0 {
                self.seq.loop_jump = Some(channel.loop_row);
            } else if s3m {
                // A finished loop does not restart from the same row
                channel.loop_row = row + 1;
            }
        }
    }

    /// IT S7x: past-note actions, new note action override, envelope toggles
    fn instrument_control(&mut self, ch: usize, command: u8) {
        match command {
            0 => self.past_note_action(ch, DuplicateAction::Cut),
            1 => self.past_note_action(ch, DuplicateAction::NoteOff),
            2 => self.past_note_action(ch, DuplicateAction::NoteFade),
            3..=12 => {
                let Some(voice) = self.channels[ch].active_voice() else {
                    return;
                };
                match command {
                    3 => voice.nna = NewNoteAction::Cut,
                    4 => voice.nna = NewNoteAction::Continue,
                    5 => voice.nna = NewNoteAction::NoteOff,
                    6 => voice.nna = NewNoteAction::NoteFade,
                    7 => voice.volume_env.enabled = false,
                    8 => voice.volume_env.enabled = true,
                    9 => voice.panning_env.enabled = false,
                    10 => voice.panning_env.enabled = true,
                    11 => voice.pitch_env.enabled = false,
                    _ => voice.pitch_env.enabled = true,
                }
            }
            _ => {}
        }
    }

    /// Volume column on the first tick of a row
    pub(super) fn volume_command_row(&mut self, ch: usize, command: VolumeCommand) {
        let channel = &mut self.channels[ch];
        match command {
            VolumeCommand::SetVolume(volume) => channel.volume = volume.min(64) as i32,
            VolumeCommand::FineUp(x) => channel.volume = (channel.volume + x as i32).min(64),
            VolumeCommand::FineDown(x) => channel.volume = (channel.volume - x as i32).max(0),
            VolumeCommand::VibratoSpeed(speed) => {
                if speed > 0 {
                    channel.vibrato.speed = speed;
                }
            }
            VolumeCommand::VibratoDepth(depth) => {
                if depth > 0 {
                    channel.vibrato.depth = depth;
                }
            }
            VolumeCommand::SetPanning(pan) => channel.pan = pan as i32,
            VolumeCommand::TonePortamento(speed) => {
                if speed > 0 {
                    channel.mem.tone_porta = speed;
                }
            }
            VolumeCommand::PortamentoUp(param) | VolumeCommand::PortamentoDown(param) => {
                if param > 0 {
                    channel.mem.porta_up = param;
                    channel.mem.porta_down = param;
                }
            }
            VolumeCommand::None
            | VolumeCommand::SlideUp(_)
            | VolumeCommand::SlideDown(_)
            | VolumeCommand::PanSlideLeft(_)
            | VolumeCommand::PanSlideRight(_) => {}
        }
    }

    // =========================================================================
    // Ticks 1+
    // =========================================================================

    /// Effects that run on every tick after the first
    pub(super) fn process_tick_effects(&mut self) {
        let tick = self.seq.tick;
        let effect_tick = self.seq.effect_tick();
        for ch in 0..self.channels.len() {
            if let Some((delay, cell)) = self.channels[ch].delayed
                && delay == tick
            {
                self.channels[ch].delayed = None;
                self.trigger_cell(ch, &cell);
            }
            if self.channels[ch].note_cut_tick == Some(tick) {
                self.channels[ch].volume = 0;
            }
            if self.channels[ch].key_off_tick == Some(tick) {
                self.key_off_now(ch);
            }
            if effect_tick == 0 {
                // First tick of a pattern-delay repeat
                continue;
            }
            let effect = self.channels[ch].effect;
            self.tick_effect(ch, effect, effect_tick);
            let command = self.channels[ch].volume_command;
            self.volume_command_tick(ch, command);
        }
    }

    fn tick_effect(&mut self, ch: usize, effect: Effect, effect_tick: u16) {
        match effect {
            Effect::TempoSlide(_) => {
                let param = self.channels[ch].mem.tempo_slide;
                let amount = (param & 0x0F) as i32;
                let tempo = match param >> 4 {
                    0 => self.seq.tempo as i32 - amount,
                    1 => self.seq.tempo as i32 + amount,
                    _ => self.seq.tempo as i32,
                };
                self.seq.tempo = tempo.clamp(MIN_TEMPO, MAX_TEMPO) as u8;
            }
            Effect::VolumeSlide(param) => self.volume_slide(ch, param, false),
            Effect::VibratoVolSlide(param) => {
                self.volume_slide(ch, param, false);
                self.vibrato(ch);
            }
            Effect::TonePortaVolSlide(param) => {
                self.volume_slide(ch, param, false);
                self.tone_portamento(ch);
            }
            Effect::GlobalVolumeSlide(param) => self.global_volume_slide(ch, param, false),
            Effect::ChannelVolumeSlide(param) => self.channel_volume_slide(ch, param, false),
            Effect::Tremolo(_) => Self::tremolo(&mut self.channels[ch]),
            Effect::Tremor(_) => Self::tremor(&mut self.channels[ch]),
            Effect::Arpeggio(_) => {
                let channel = &mut self.channels[ch];
                let param = channel.mem.arpeggio;
                channel.arpeggio = match effect_tick % 3 {
                    1 => param >> 4,
                    2 => param & 0x0F,
                    _ => 0,
                };
            }
            Effect::PortamentoUp(param) => self.portamento(ch, param, true, false),
            Effect::PortamentoDown(param) => self.portamento(ch, param, false, false),
            Effect::TonePortamento(_) => self.tone_portamento(ch),
            Effect::Vibrato(_) | Effect::FineVibrato(_) => self.vibrato(ch),
            Effect::PanningSlide(param) => self.panning_slide(ch, param, false),
            Effect::Panbrello(_) => Self::panbrello(&mut self.channels[ch]),
            Effect::Retrigger(_) => self.retrigger(ch),
            _ => {}
        }
    }

    fn volume_command_tick(&mut self, ch: usize, command: VolumeCommand) {
        match command {
            VolumeCommand::SlideUp(x) => {
                let channel = &mut self.channels[ch];
                channel.volume = (channel.volume + x as i32).min(64);
            }
            VolumeCommand::SlideDown(x) => {
                let channel = &mut self.channels[ch];
                channel.volume = (channel.volume - x as i32).max(0);
            }
            VolumeCommand::PanSlideLeft(x) => {
                let channel = &mut self.channels[ch];
                channel.pan = (channel.pan - x as i32).max(0);
            }
            VolumeCommand::PanSlideRight(x) => {
                let channel = &mut self.channels[ch];
                channel.pan = (channel.pan + x as i32).min(255);
            }
            VolumeCommand::VibratoDepth(_) => self.vibrato(ch),
            VolumeCommand::TonePortamento(_) => self.tone_portamento(ch),
            VolumeCommand::PortamentoUp(param) => self.portamento(ch, param, true, false),
            VolumeCommand::PortamentoDown(param) => self.portamento(ch, param, false, false),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3m_slide_forms() {
        // D40: slide up 4 per tick, not on tick 0
        assert_eq!(s3m_slide(0x40, true, false), 0);
        assert_eq!(s3m_slide(0x40, false, false), 4);
        // D04: slide down
        assert_eq!(s3m_slide(0x04, false, false), -4);
        // D4F: fine up on tick 0 only
        assert_eq!(s3m_slide(0x4F, true, false), 4);
        assert_eq!(s3m_slide(0x4F, false, false), 0);
        // DF4: fine down
        assert_eq!(s3m_slide(0xF4, true, false), -4);
        // DF0 / D0F are regular slides by 15
        assert_eq!(s3m_slide(0xF0, false, false), 15);
        assert_eq!(s3m_slide(0x0F, false, false), -15);
        // Fast slides also run on tick 0
        assert_eq!(s3m_slide(0x20, true, true), 2);
    }

    #[test]
    fn test_pt_slide() {
        assert_eq!(pt_slide(0x30, true), 0);
        assert_eq!(pt_slide(0x30, false), 3);
        assert_eq!(pt_slide(0x05, false), -5);
        // Up wins when both nibbles are set
        assert_eq!(pt_slide(0x35, false), 3);
    }

    #[test]
    fn test_s3m_porta_forms() {
        assert_eq!(s3m_porta(0x10, false), 64.0);
        assert_eq!(s3m_porta(0x10, true), 0.0);
        assert_eq!(s3m_porta(0xF3, true), 12.0);
        assert_eq!(s3m_porta(0xF3, false), 0.0);
        assert_eq!(s3m_porta(0xE3, true), 3.0);
    }

    #[test]
    fn test_retrigger_volume_table() {
        assert_eq!(retrigger_volume(32, 1), 31);
        assert_eq!(retrigger_volume(32, 7), 16);
        assert_eq!(retrigger_volume(32, 15), 64);
        assert_eq!(retrigger_volume(2, 5), 0);
        assert_eq!(retrigger_volume(40, 0), 40);
    }
}
