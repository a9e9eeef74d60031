//! Background voices
//!
//! When a new note starts on a channel, the old voice is handed to the
//! background pool according to its new note action (IT). Background voices
//! keep their last volume, pan and pitch, and play until their envelopes or
//! fadeout silence them. Cut voices also pass through the pool so they can
//! ramp down instead of clicking.

use modplay_song::{
    DuplicateAction, DuplicateCheck, Instrument, NewNoteAction, Song, SongFormat,
};

use super::Player;
use crate::channel::Voice;

/// Maximum number of background voices
pub(super) const MAX_BACKGROUND_VOICES: usize = 64;

/// Release a voice the way the song's format handles a key-off
pub(super) fn release_voice(song: &Song, voice: &mut Voice) {
    voice.key_off = true;
    let envelope = song
        .instruments
        .get(voice.instrument)
        .and_then(|i| i.volume_envelope.as_ref())
        .filter(|_| voice.volume_env.enabled);
    let has_sustain_loop = song
        .samples
        .get(voice.sample)
        .is_some_and(|s| s.sustain_loop.is_some());

    match song.format {
        SongFormat::FastTracker2 => {
            if envelope.is_some() {
                voice.fading = true;
            } else {
                voice.release = true;
            }
        }
        SongFormat::ImpulseTracker if song.uses_instruments() => {
            if envelope.is_none_or(|env| env.loop_range.is_some()) {
                voice.fading = true;
            }
        }
        SongFormat::ImpulseTracker if has_sustain_loop => {}
        _ => voice.release = true,
    }
}

fn apply_duplicate_action(song: &Song, voice: &mut Voice, action: DuplicateAction) {
    match action {
        DuplicateAction::Cut => voice.release = true,
        DuplicateAction::NoteOff => release_voice(song, voice),
        DuplicateAction::NoteFade => voice.fading = true,
    }
}

impl Player {
    /// Retire the channel's current voice before `incoming` starts a note
    pub(super) fn retire_voice(
        &mut self,
        ch: usize,
        incoming: Option<(&Instrument, usize)>,
        key: u8,
        sample: usize,
    ) {
        let song = std::sync::Arc::clone(&self.song);
        let it_instruments = song.format == SongFormat::ImpulseTracker && song.uses_instruments();

        if it_instruments && let Some((instrument, index)) = incoming {
            self.duplicate_check(ch, instrument, index, key, sample);
        }

        let Some(mut old) = self.channels[ch].voice.take() else {
            return;
        };
        if !old.active {
            return;
        }
        let action = if it_instruments {
            old.nna
        } else {
            NewNoteAction::Cut
        };
        match action {
            NewNoteAction::Cut => old.release = true,
            NewNoteAction::Continue => {}
            NewNoteAction::NoteOff => release_voice(&song, &mut old),
            NewNoteAction::NoteFade => old.fading = true,
        }
        self.push_background(old);
    }

    /// Apply the incoming instrument's duplicate check to this channel's
    /// background voices
    fn duplicate_check(
        &mut self,
        ch: usize,
        instrument: &Instrument,
        index: usize,
        key: u8,
        sample: usize,
    ) {
        let check = instrument.duplicate_check;
        if check == DuplicateCheck::Off {
            return;
        }
        let song = std::sync::Arc::clone(&self.song);
        for voice in self.background.iter_mut() {
            if voice.channel != ch || !voice.active || voice.release {
                continue;
            }
            let duplicate = voice.instrument == index
                && match check {
                    DuplicateCheck::Off => false,
                    DuplicateCheck::Note => voice.key == key,
                    DuplicateCheck::Sample => voice.sample == sample,
                    DuplicateCheck::Instrument => true,
                };
            if duplicate {
                apply_duplicate_action(&song, voice, instrument.duplicate_action);
            }
        }
    }

    /// Add a voice to the pool, replacing the quietest one when full
    pub(super) fn push_background(&mut self, voice: Voice) {
        self.background.retain(|v| v.active);
        if self.background.len() < MAX_BACKGROUND_VOICES {
            self.background.push(voice);
            return;
        }
        let quietest = self
            .background
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.loudness().total_cmp(&b.loudness()))
            .map(|(i, v)| (i, v.loudness()));
        if let Some((index, loudness)) = quietest
            && loudness <= voice.loudness()
        {
            tracing::trace!(index, "background voice stolen");
            self.background[index] = voice;
        }
    }

    /// Past-note actions (IT S70-S72) on this channel's background voices
    pub(super) fn past_note_action(&mut self, ch: usize, action: DuplicateAction) {
        let song = std::sync::Arc::clone(&self.song);
        for voice in self.background.iter_mut().filter(|v| v.channel == ch) {
            apply_duplicate_action(&song, voice, action);
        }
    }
}
