//! Row processing
//!
//! At tick 0 of a row every channel reads its cell: notes start or release,
//! the volume column and the effect column are applied, and flow effects
//! (jumps, breaks, loops, delays) are queued for the sequencer.

use std::sync::Arc;

use modplay_song::{Effect, Note, SongFlags, SongFormat, VolumeCommand, tuned_c5_speed};

use super::Player;
use super::nna::release_voice;
use crate::channel::Voice;
use crate::utils::key_to_period;

fn is_tone_portamento(cell: &Note) -> bool {
    matches!(
        cell.effect,
        Effect::TonePortamento(_) | Effect::TonePortaVolSlide(_)
    ) || matches!(cell.volume, VolumeCommand::TonePortamento(_))
}

impl Player {
    /// Tick 0 of a row (first repeat only)
    pub(super) fn process_row(&mut self) {
        let song = Arc::clone(&self.song);
        let pattern = song.pattern_at_order(self.seq.order);
        let row = self.seq.row;

        for ch in 0..self.channels.len() {
            let cell = pattern
                .and_then(|p| p.note(row, ch))
                .copied()
                .unwrap_or_default();
            self.channels[ch].begin_row(cell.effect, cell.volume);

            match cell.effect {
                Effect::NoteDelay(delay) if delay > 0 => {
                    self.channels[ch].delayed = Some((delay as u16, cell));
                }
                _ => self.trigger_cell(ch, &cell),
            }
            self.row_effect(ch, cell.effect);
        }
    }

    /// Note, instrument and volume column of one cell
    pub(super) fn trigger_cell(&mut self, ch: usize, cell: &Note) {
        let song = Arc::clone(&self.song);
        if cell.instrument > 0 {
            self.channels[ch].instrument = cell.instrument;
        }

        if let Some(key) = cell.key() {
            let sliding = is_tone_portamento(cell)
                && self.channels[ch].voice.as_ref().is_some_and(|v| v.active);
            if sliding {
                self.set_portamento_target(ch, key);
                if cell.instrument > 0 {
                    self.reset_to_sample_defaults(ch);
                }
            } else {
                self.start_note(ch, key, cell);
            }
        } else if cell.instrument > 0 {
            self.reset_to_sample_defaults(ch);
        }

        let channel = &mut self.channels[ch];
        if cell.is_note_off() {
            if let Some(voice) = channel.active_voice() {
                release_voice(&song, voice);
            }
        } else if cell.is_note_cut() {
            if let Some(voice) = channel.active_voice() {
                voice.release = true;
            }
        } else if cell.is_note_fade()
            && let Some(voice) = channel.active_voice()
        {
            voice.fading = true;
        }

        self.volume_command_row(ch, cell.volume);
    }

    /// Start a new note on a channel
    fn start_note(&mut self, ch: usize, key: u8, cell: &Note) {
        let song = Arc::clone(&self.song);
        let linear = song.uses_linear_slides();
        let number = self.channels[ch].instrument;

        let resolved = number
            .checked_sub(1)
            .and_then(|index| Some((index as usize, song.instruments.get(index as usize)?)))
            .and_then(|(index, instrument)| {
                let (mapped, sample) = instrument.map_note(key)?;
                let data = song.samples.get(sample)?;
                (!data.data.is_empty()).then_some((index, instrument, mapped, sample))
            });

        let Some((index, instrument, mapped, sample_index)) = resolved else {
            // Nothing to play: the old note stops
            self.retire_voice(ch, None, key, usize::MAX);
            return;
        };
        self.retire_voice(ch, Some((instrument, index)), key, sample_index);
        if self.channels[ch].muted {
            return;
        }

        let sample = &song.samples[sample_index];
        let channel = &mut self.channels[ch];
        channel.key = mapped;
        channel.c5_speed = match cell.effect {
            Effect::SetFinetune(finetune) => tuned_c5_speed(0, finetune.saturating_mul(16)),
            _ => sample.c5_speed,
        };
        channel.period = key_to_period(mapped as f64, linear);
        channel.target_period = channel.period;
        if cell.instrument > 0 {
            channel.volume = sample.volume.min(64) as i32;
            if let Some(pan) = instrument.default_pan.or(sample.pan) {
                channel.pan = pan as i32;
            }
        }
        channel.vibrato.retrigger();
        channel.tremolo.retrigger();
        channel.panbrello.retrigger();
        channel.retrigger_count = 0;
        channel.tremor_count = 0;

        let mut voice = Voice::new(ch, sample_index, index, key);
        voice.nna = instrument.new_note_action;
        voice.fadeout = instrument.fadeout as i32;

        if let Effect::SampleOffset(param) = cell.effect {
            if param != 0 {
                channel.mem.sample_offset = param;
            }
            let offset = ((channel.mem.high_offset as usize) << 16)
                + ((channel.mem.sample_offset as usize) << 8);
            // IT ignores an offset past the end; everything else plays silence
            let ignore_past_end = song.format == SongFormat::ImpulseTracker
                && !song.flags.contains(SongFlags::OLD_EFFECTS);
            if offset < sample.data.len() {
                voice.pos = offset as f64;
            } else if !ignore_past_end {
                voice.active = false;
            }
        }
        channel.voice = Some(voice);
    }

    fn set_portamento_target(&mut self, ch: usize, key: u8) {
        let song = Arc::clone(&self.song);
        let channel = &mut self.channels[ch];
        let mapped = channel
            .instrument
            .checked_sub(1)
            .and_then(|i| song.instruments.get(i as usize))
            .and_then(|instrument| instrument.map_note(key))
            .map_or(key, |(mapped, _)| mapped);
        channel.target_period = key_to_period(mapped as f64, song.uses_linear_slides());
    }

    /// Instrument without a note: reload the default volume and pan of the
    /// sample the instrument plays for the last key
    fn reset_to_sample_defaults(&mut self, ch: usize) {
        let song = Arc::clone(&self.song);
        let channel = &mut self.channels[ch];
        let Some(instrument) = channel
            .instrument
            .checked_sub(1)
            .and_then(|i| song.instruments.get(i as usize))
        else {
            return;
        };
        if let Some((_, sample)) = instrument.map_note(channel.key)
            && let Some(sample) = song.samples.get(sample)
        {
            channel.volume = sample.volume.min(64) as i32;
            if let Some(pan) = instrument.default_pan.or(sample.pan) {
                channel.pan = pan as i32;
            }
        }
        if let Some(voice) = channel.active_voice()
            && song.format == SongFormat::FastTracker2
            && !voice.key_off
        {
            // FT2 restarts the envelopes and the fade on an instrument number
            voice.volume_env.tick = 0;
            voice.panning_env.tick = 0;
            voice.fade = crate::channel::FADE_MAX;
            voice.fading = false;
        }
    }
}
