//! Per-tick driver
//!
//! One call to [`Player::step`] plays exactly one tick:
//! 1. Row start (notes, tick-0 effects) or the per-tick effects
//! 2. Voice parameters from channel state
//! 3. Mixing (skipped by the duration scan)
//! 4. Envelopes, fadeout and auto-vibrato advance
//! 5. Tick/row counters

use modplay_song::{Song, SongFormat};

use super::Player;
use crate::channel::Voice;

impl Player {
    /// Play one tick; `render` mixes audio into the output buffer
    pub(super) fn step(&mut self, render: bool) {
        for channel in &mut self.channels {
            channel.clear_modulation();
        }
        if self.seq.tick == 0 {
            self.process_row();
        } else {
            self.process_tick_effects();
        }

        self.update_voice_parameters();
        let frames = self.seq.next_tick_frames();
        if render {
            self.mix(frames);
            self.advance_envelopes();
        }
        self.seq.frames += frames as u64;

        self.seq.tick += 1;
        if self.seq.tick >= self.seq.row_ticks() {
            self.seq.tick = 0;
            self.seq.pattern_delay = 0;
            self.seq.fine_delay = 0;
            self.next_row();
        }
    }

    /// Advance envelopes, fadeout and auto-vibrato for every voice
    fn advance_envelopes(&mut self) {
        let song = &self.song;
        let voices = self
            .channels
            .iter_mut()
            .filter_map(|c| c.voice.as_mut())
            .chain(self.background.iter_mut());
        for voice in voices {
            if voice.active {
                advance_voice(song, voice);
            }
        }
    }
}

fn advance_voice(song: &Song, voice: &mut Voice) {
    if let Some(instrument) = song.instruments.get(voice.instrument) {
        if let Some(env) = &instrument.volume_envelope
            && voice.volume_env.enabled
        {
            voice.volume_env.advance(env, voice.key_off);
            if voice.volume_env.finished(env, voice.key_off) {
                // IT starts the fadeout when a released envelope runs out
                if voice.key_off && song.format == SongFormat::ImpulseTracker {
                    voice.fading = true;
                }
                if env.value_at(voice.volume_env.tick) <= 0.0 {
                    voice.active = false;
                }
            }
        }
        if let Some(env) = &instrument.panning_envelope
            && voice.panning_env.enabled
        {
            voice.panning_env.advance(env, voice.key_off);
        }
        if let Some(env) = &instrument.pitch_envelope
            && voice.pitch_env.enabled
        {
            voice.pitch_env.advance(env, voice.key_off);
        }
    }

    if voice.fading {
        voice.fade = (voice.fade - voice.fadeout).max(0);
        if voice.fade == 0 {
            voice.active = false;
        }
    }

    if let Some(sample) = song.samples.get(voice.sample) {
        voice.auto_vibrato_pos = voice.auto_vibrato_pos.wrapping_add(sample.vibrato.speed);
        voice.auto_vibrato_ticks = voice.auto_vibrato_ticks.saturating_add(1);
    }
}
