//! Player utility functions
//!
//! Lookup tables and pitch math shared by the sequencer and the mixer.

use crate::SAMPLE_RATE;

/// 64-point quarter-sine lookup table for vibrato/tremolo/panbrello
/// Values represent sin(i * π/128) * 115 for i = 0..63
/// This gives 256 effective positions when mirrored across 4 quadrants
pub(crate) const SINE_LUT_64: [i8; 64] = [
    0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30, 32, 34, 36, 38, 40, 42, 44, 46, 48,
    50, 52, 54, 56, 58, 60, 62, 64, 66, 68, 70, 72, 74, 76, 78, 80, 82, 84, 86, 88, 89, 91, 93, 95,
    96, 98, 100, 101, 103, 104, 106, 107, 108, 110, 111, 112, 113, 114, 115,
];

/// 16-point quarter-sine used for constant-power panning
pub(crate) const SINE_LUT: [i8; 16] = [
    0, 12, 24, 37, 48, 60, 71, 81, 90, 98, 106, 112, 118, 122, 125, 127,
];

/// Linear period of key 0; each semitone is 64 units
pub(crate) const LINEAR_PERIOD_BASE: f64 = 7680.0;
/// Linear period that plays a sample at its C-5 speed
const LINEAR_PERIOD_C5: f64 = 3840.0;
/// Amiga period of C-5 in quarter-period units (428 * 4)
pub(crate) const AMIGA_PERIOD_C5: f64 = 1712.0;
/// Amiga hardware limits in quarter-period units (B-3 to C-6 on a 4 channel Paula)
pub(crate) const AMIGA_PERIOD_MIN: f64 = 113.0 * 4.0;
pub(crate) const AMIGA_PERIOD_MAX: f64 = 856.0 * 4.0;
/// Period units per semitone in linear mode
pub(crate) const LINEAR_UNITS_PER_SEMITONE: f64 = 64.0;

/// Period of a key, in the song's period space
pub(crate) fn key_to_period(key: f64, linear: bool) -> f64 {
    if linear {
        LINEAR_PERIOD_BASE - key * LINEAR_UNITS_PER_SEMITONE
    } else {
        AMIGA_PERIOD_C5 * ((60.0 - key) / 12.0).exp2()
    }
}

/// Inverse of [`key_to_period`]
pub(crate) fn period_to_key(period: f64, linear: bool) -> f64 {
    if linear {
        (LINEAR_PERIOD_BASE - period) / LINEAR_UNITS_PER_SEMITONE
    } else if period > 0.0 {
        60.0 - 12.0 * (period / AMIGA_PERIOD_C5).log2()
    } else {
        119.0
    }
}

/// Playback frequency (Hz) of a period for a sample with the given C-5 speed
pub(crate) fn period_to_frequency(period: f64, c5_speed: u32, linear: bool) -> f64 {
    if linear {
        c5_speed as f64 * ((LINEAR_PERIOD_C5 - period) / 768.0).exp2()
    } else if period > 0.0 {
        c5_speed as f64 * AMIGA_PERIOD_C5 / period
    } else {
        0.0
    }
}

/// Output frames in one tick at the given tempo (fractional)
///
/// Tracker timing: samples_per_tick = sample_rate * 2.5 / bpm
pub(crate) fn samples_per_tick(tempo: u8) -> f64 {
    SAMPLE_RATE as f64 * 2.5 / tempo.max(1) as f64
}

/// Get waveform value for vibrato/tremolo/panbrello, in -1.0..=1.0
///
/// Waveform types:
/// - 0: Sine (LUT with quadrant mirroring)
/// - 1: Ramp down (sawtooth)
/// - 2: Square
/// - 3: Random (deterministic pseudo-random)
pub(crate) fn waveform_value(waveform: u8, position: u8) -> f32 {
    match waveform & 0x03 {
        0 => {
            let idx = (position & 0x3F) as usize;
            let val = match position >> 6 {
                0 => SINE_LUT_64[idx],
                1 => SINE_LUT_64[63 - idx],
                2 => -SINE_LUT_64[idx],
                _ => -SINE_LUT_64[63 - idx],
            };
            val as f32 / 115.0
        }
        1 => (128i16 - position as i16) as f32 / 128.0,
        2 => {
            if position < 128 {
                1.0
            } else {
                -1.0
            }
        }
        _ => {
            let x = position.wrapping_mul(0x9E) ^ 0x5C;
            (x as f32 / 127.5) - 1.0
        }
    }
}

/// Constant-power panning gains from the 16-point sine LUT
///
/// `pan` runs from -1.0 (left) to 1.0 (right). cos(x) = sin(π/2 - x), so the
/// LUT is read in reverse for the left channel.
#[inline]
pub(crate) fn fast_pan_gains(pan: f32) -> (f32, f32) {
    let pos = (pan.clamp(-1.0, 1.0) + 1.0) * 7.5;
    let idx = (pos as usize).min(14);
    let frac = pos - idx as f32;

    let sin_val = SINE_LUT[idx] as f32 * (1.0 - frac) + SINE_LUT[idx + 1] as f32 * frac;
    let cos_val = SINE_LUT[15 - idx] as f32 * (1.0 - frac) + SINE_LUT[14 - idx] as f32 * frac;

    (cos_val / 127.0, sin_val / 127.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_to_period_linear() {
        assert_eq!(key_to_period(60.0, true), LINEAR_PERIOD_C5);
        assert_eq!(key_to_period(61.0, true), LINEAR_PERIOD_C5 - 64.0);
        assert!((period_to_key(key_to_period(37.0, true), true) - 37.0).abs() < 1e-9);
    }

    #[test]
    fn test_key_to_period_amiga() {
        assert!((key_to_period(60.0, false) - 1712.0).abs() < 1e-9);
        assert!((key_to_period(48.0, false) - 3424.0).abs() < 1e-9);
        assert!((period_to_key(key_to_period(50.0, false), false) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_middle_c_plays_at_c5_speed() {
        for linear in [true, false] {
            let period = key_to_period(60.0, linear);
            let freq = period_to_frequency(period, 8363, linear);
            assert!((freq - 8363.0).abs() < 0.01, "linear={linear}: {freq}");
            // One octave up doubles the frequency
            let up = period_to_frequency(key_to_period(72.0, linear), 8363, linear);
            assert!((up / freq - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_samples_per_tick() {
        // At 125 BPM and 44100 Hz: 44100 * 2.5 / 125 = 882 samples
        assert_eq!(samples_per_tick(125), 882.0);
        assert!((samples_per_tick(150) - 735.0).abs() < 1e-9);
    }

    #[test]
    fn test_waveform_sine() {
        assert!(waveform_value(0, 0).abs() < 0.1);
        assert!(waveform_value(0, 64) > 0.9);
        assert!(waveform_value(0, 128).abs() < 0.1);
        assert!(waveform_value(0, 192) < -0.9);
    }

    #[test]
    fn test_waveform_square_and_ramp() {
        assert_eq!(waveform_value(2, 10), 1.0);
        assert_eq!(waveform_value(2, 200), -1.0);
        assert_eq!(waveform_value(1, 0), 1.0);
        assert_eq!(waveform_value(1, 128), 0.0);
    }

    #[test]
    fn test_pan_gains() {
        let (l, r) = fast_pan_gains(-1.0);
        assert!((l - 1.0).abs() < 0.01 && r.abs() < 0.01);
        let (l, r) = fast_pan_gains(1.0);
        assert!(l.abs() < 0.01 && (r - 1.0).abs() < 0.01);
        let (l, r) = fast_pan_gains(0.0);
        assert!((l - r).abs() < 0.01);
    }
}
