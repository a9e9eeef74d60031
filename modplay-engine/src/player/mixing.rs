//! Voice mixing - core audio rendering logic
//!
//! Each tick the channel state is folded into per-voice frequency and
//! stereo gains, then every active voice is resampled into a float buffer.
//! Gains ramp linearly from last tick's values to avoid zipper noise and
//! clicks on note starts and cuts.

use modplay_song::{Sample, SampleLoop, Song};

use super::Player;
use crate::SAMPLE_RATE;
use crate::channel::{FADE_MAX, Voice, frame_at};
use crate::interpolation::Interpolation;
use crate::utils::{fast_pan_gains, period_to_frequency, waveform_value};

/// Maximum length of a gain ramp, in frames
const RAMP_FRAMES: usize = 64;

/// Highest playback frequency accepted (Hz)
const MAX_FREQUENCY: f64 = 1_000_000.0;

/// Loop in effect for a voice: the sustain loop until key-off, then the main loop
fn active_loop(sample: &Sample, voice: &Voice) -> Option<SampleLoop> {
    match sample.sustain_loop {
        Some(sustain) if !voice.key_off => Some(sustain),
        _ => sample.loop_region,
    }
}

impl Player {
    /// Copy channel state (note volume, pan, period and modulation) into the
    /// foreground voices, then compute frequency and gains for every voice
    pub(super) fn update_voice_parameters(&mut self) {
        let linear = self.song.uses_linear_slides();
        for channel in &mut self.channels {
            let period = channel.period + channel.period_delta;
            let c5_speed = channel.c5_speed;
            let volume = if channel.tremor_mute {
                0
            } else {
                (channel.volume + channel.volume_delta).clamp(0, 64)
            };
            let note_volume = volume as f32 / 64.0 * channel.channel_volume as f32 / 64.0;
            let pan = (channel.pan + channel.pan_delta).clamp(0, 255);
            let arpeggio = channel.arpeggio;
            let Some(voice) = channel.voice.as_mut() else {
                continue;
            };
            let mut frequency = period_to_frequency(period, c5_speed, linear);
            if arpeggio > 0 {
                frequency *= (arpeggio as f64 / 12.0).exp2();
            }
            voice.base_frequency = frequency;
            voice.volume = note_volume;
            voice.pan = pan;
        }

        let song = &self.song;
        let gain = VoiceGain {
            global_volume: self.seq.global_volume as f32 / 128.0,
            separation: self.config.stereo_separation.min(100) as f32 / 100.0,
            master: self.master_gain,
        };
        let voices = self
            .channels
            .iter_mut()
            .filter_map(|c| c.voice.as_mut())
            .chain(self.background.iter_mut());
        for voice in voices.filter(|v| v.active) {
            gain.apply(song, voice);
        }
    }

    /// Mix `frames` stereo frames into the output buffer
    pub(super) fn mix(&mut self, frames: usize) {
        self.mix_buffer.clear();
        self.mix_buffer.resize(frames * 2, 0.0);

        let song = &self.song;
        let interpolation = self.config.interpolation;
        let buffer = &mut self.mix_buffer;
        let voices = self
            .channels
            .iter_mut()
            .filter_map(|c| c.voice.as_mut())
            .chain(self.background.iter_mut());
        for voice in voices.filter(|v| v.active) {
            if let Some(sample) = song.samples.get(voice.sample) {
                mix_voice(voice, sample, interpolation, buffer);
            } else {
                voice.active = false;
            }
        }

        self.output.extend(
            self.mix_buffer
                .iter()
                .map(|&s| (s * 32767.0).round().clamp(-32768.0, 32767.0) as i16),
        );

        self.background.retain(|v| v.active);
        for channel in &mut self.channels {
            if channel.voice.as_ref().is_some_and(|v| v.release && !v.active) {
                channel.voice = None;
            }
        }
    }
}

/// Song-wide factors for voice gains
struct VoiceGain {
    global_volume: f32,
    separation: f32,
    master: f32,
}

impl VoiceGain {
    fn apply(&self, song: &Song, voice: &mut Voice) {
        let Some(sample) = song.samples.get(voice.sample) else {
            voice.active = false;
            return;
        };
        let instrument = song.instruments.get(voice.instrument);

        // Volume
        let mut amplitude = voice.volume
            * sample.global_volume.min(64) as f32 / 64.0
            * (voice.fade as f32 / FADE_MAX as f32)
            * self.global_volume
            * self.master;
        if let Some(instrument) = instrument {
            amplitude *= instrument.global_volume.min(128) as f32 / 128.0;
            if let Some(env) = &instrument.volume_envelope
                && voice.volume_env.enabled
            {
                amplitude *= env.value_at(voice.volume_env.tick).clamp(0.0, 64.0) / 64.0;
            }
        }

        // Pitch
        let mut frequency = voice.base_frequency;
        if let Some(instrument) = instrument
            && let Some(env) = &instrument.pitch_envelope
            && voice.pitch_env.enabled
        {
            let half_semitones = env.value_at(voice.pitch_env.tick) as f64;
            frequency *= (half_semitones / 24.0).exp2();
        }
        let vibrato = sample.vibrato;
        if vibrato.depth > 0 {
            let sweep = if vibrato.sweep == 0 {
                1.0
            } else {
                (voice.auto_vibrato_ticks as f32 / vibrato.sweep as f32).min(1.0)
            };
            let semitones = waveform_value(vibrato.waveform, voice.auto_vibrato_pos)
                * vibrato.depth as f32
                * sweep
                / 32.0;
            frequency *= (semitones as f64 / 12.0).exp2();
        }
        voice.frequency = frequency.clamp(0.0, MAX_FREQUENCY);

        // Panning
        let mut pan = voice.pan as f32;
        if let Some(instrument) = instrument
            && let Some(env) = &instrument.panning_envelope
            && voice.panning_env.enabled
        {
            let swing = 128.0 - (pan - 128.0).abs();
            pan += env.value_at(voice.panning_env.tick) * swing / 32.0;
        }
        let position = ((pan - 128.0) / 128.0).clamp(-1.0, 1.0) * self.separation;
        let (left, right) = fast_pan_gains(position);

        voice.target = if voice.release {
            (0.0, 0.0)
        } else {
            (amplitude * left, amplitude * right)
        };
    }
}

/// Resample one voice into an interleaved stereo buffer
fn mix_voice(voice: &mut Voice, sample: &Sample, interpolation: Interpolation, out: &mut [f32]) {
    let frames = out.len() / 2;
    let step = voice.frequency / SAMPLE_RATE as f64;
    let length = sample.data.len();
    let ramp = frames.clamp(1, RAMP_FRAMES);
    let delta = (
        (voice.target.0 - voice.gain.0) / ramp as f32,
        (voice.target.1 - voice.gain.1) / ramp as f32,
    );
    let mut gain = voice.gain;

    for (i, frame) in out.chunks_exact_mut(2).enumerate() {
        if i + 1 < ramp {
            gain.0 += delta.0;
            gain.1 += delta.1;
        } else {
            gain = voice.target;
        }
        let looped = active_loop(sample, voice);
        let base = voice.pos as isize;
        let frac = voice.pos.fract() as f32;
        let value = interpolation.sample(|offset| frame_at(&sample.data, looped, base + offset), frac);
        frame[0] += value * gain.0;
        frame[1] += value * gain.1;

        voice.advance(step, length, looped);
        if !voice.active {
            break;
        }
    }

    voice.gain = gain;
    if voice.release && frames > 0 {
        voice.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_sample(value: i16, frames: usize) -> Sample {
        Sample {
            data: vec![value; frames],
            loop_region: SampleLoop::new(0, frames as u32, false, frames),
            ..Default::default()
        }
    }

    #[test]
    fn test_gain_ramps_to_target() {
        let sample = constant_sample(16384, 64);
        let mut voice = Voice::new(0, 0, 0, 60);
        voice.frequency = 44100.0;
        voice.target = (1.0, 0.5);
        let mut out = vec![0.0f32; 200];
        mix_voice(&mut voice, &sample, Interpolation::Nearest, &mut out);
        // First frame is part way up the ramp, the tail is at full gain
        assert!(out[0] > 0.0 && out[0] < 0.1);
        assert!((out[198] - 0.5).abs() < 1e-3);
        assert!((out[199] - 0.25).abs() < 1e-3);
        assert_eq!(voice.gain, (1.0, 0.5));
    }

    #[test]
    fn test_released_voice_fades_then_stops() {
        let sample = constant_sample(16384, 64);
        let mut voice = Voice::new(0, 0, 0, 60);
        voice.frequency = 44100.0;
        voice.gain = (1.0, 1.0);
        voice.release = true;
        voice.target = (0.0, 0.0);
        let mut out = vec![0.0f32; 256];
        mix_voice(&mut voice, &sample, Interpolation::Linear, &mut out);
        assert!(out[0] > 0.4);
        assert_eq!(out[254], 0.0);
        assert!(!voice.active);
    }

    #[test]
    fn test_unlooped_voice_stops_at_end() {
        let sample = Sample {
            data: vec![1000; 10],
            ..Default::default()
        };
        let mut voice = Voice::new(0, 0, 0, 60);
        voice.frequency = 44100.0;
        voice.gain = (1.0, 1.0);
        voice.target = (1.0, 1.0);
        let mut out = vec![0.0f32; 64];
        mix_voice(&mut voice, &sample, Interpolation::Nearest, &mut out);
        assert!(!voice.active);
        assert!(out[2 * 9] != 0.0);
        assert_eq!(out[2 * 10], 0.0);
    }

    #[test]
    fn test_sustain_loop_until_key_off() {
        let mut sample = constant_sample(0, 32);
        sample.sustain_loop = SampleLoop::new(4, 8, false, 32);
        let mut voice = Voice::new(0, 0, 0, 60);
        assert_eq!(active_loop(&sample, &voice), sample.sustain_loop);
        voice.key_off = true;
        assert_eq!(active_loop(&sample, &voice), sample.loop_region);
    }
}
