//! ProTracker MOD loader
//!
//! Handles 31-sample modules identified by the tag at offset 1080 ("M.K.",
//! "FLT4", "8CHN", "16CH", ...). 15-sample Soundtracker files carry no
//! signature and are not recognized.

use std::io::Cursor;

use crate::effects::{Effect, VolumeCommand};
use crate::error::LoadError;
use crate::reader::{read_array, read_text, read_u8, read_u16_be, seek_to, slice_at};
use crate::song::{
    ChannelSettings, Instrument, Note, Pattern, Sample, SampleLoop, Song, SongFlags, SongFormat,
    tuned_c5_speed, widen_8bit,
};

/// Offset of the format tag
const TAG_OFFSET: usize = 1080;
/// Header size up to and including the tag
const HEADER_SIZE: u64 = 1084;
const NUM_SAMPLES: usize = 31;
const ROWS: u16 = 64;

/// Period that plays C-5 at the sample's C-5 speed
pub(crate) const MIDDLE_C_PERIOD: f64 = 428.0;

/// Channel count announced by the format tag, if it is one we know
pub fn channels_from_tag(tag: &[u8]) -> Option<usize> {
    let digit = |b: u8| b.is_ascii_digit().then(|| (b - b'0') as usize);
    let channels = match tag {
        b"M.K." | b"M!K!" | b"M&K!" | b"N.T." | b"FLT4" | b"4CHN" => 4,
        b"FLT8" | b"OCTA" | b"OKTA" | b"CD81" => 8,
        [n, b'C', b'H', b'N'] => digit(*n)?,
        [a, b, b'C', b'H'] => digit(*a)? * 10 + digit(*b)?,
        [b'T', b'D', b'Z', n] => digit(*n)?,
        _ => return None,
    };
    (1..=32).contains(&channels).then_some(channels)
}

/// Check for a recognized MOD tag
pub fn is_protracker(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE as usize
        && channels_from_tag(&data[TAG_OFFSET..TAG_OFFSET + 4]).is_some()
}

/// Convert an Amiga period to the nearest note index
pub fn period_to_key(period: u16) -> Option<u8> {
    if period == 0 {
        return None;
    }
    let key = 60.0 + 12.0 * (MIDDLE_C_PERIOD / period as f64).log2();
    Some(key.round().clamp(0.0, 119.0) as u8)
}

struct SampleHeader {
    name: String,
    length: usize,
    finetune: i8,
    volume: u8,
    loop_start: usize,
    loop_length: usize,
}

/// Parse a ProTracker module
pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    if data.len() < HEADER_SIZE as usize {
        return Err(LoadError::UnexpectedEof);
    }
    let num_channels =
        channels_from_tag(&data[TAG_OFFSET..TAG_OFFSET + 4]).ok_or(LoadError::UnknownFormat)?;

    let mut cursor = Cursor::new(data);
    let title = read_text::<20>(&mut cursor)?;

    let mut headers = Vec::with_capacity(NUM_SAMPLES);
    for _ in 0..NUM_SAMPLES {
        let name = read_text::<22>(&mut cursor)?;
        let length = read_u16_be(&mut cursor)? as usize * 2;
        // Low nibble is a signed finetune in 1/8 semitones
        let finetune = (((read_u8(&mut cursor)? & 0x0F) << 4) as i8) >> 4;
        let volume = read_u8(&mut cursor)?.min(64);
        let loop_start = read_u16_be(&mut cursor)? as usize * 2;
        let loop_length = read_u16_be(&mut cursor)? as usize * 2;
        headers.push(SampleHeader {
            name,
            length,
            finetune,
            volume,
            loop_start,
            loop_length,
        });
    }

    let song_length = (read_u8(&mut cursor)? as usize).clamp(1, 128);
    let restart = read_u8(&mut cursor)?;
    let order_table = read_array::<128>(&mut cursor)?;
    seek_to(&mut cursor, HEADER_SIZE)?;

    // Patterns referenced anywhere in the table are stored, even past the song length
    let num_patterns = order_table.iter().copied().max().unwrap_or(0) as usize + 1;
    let pattern_bytes = ROWS as usize * num_channels * 4;
    let mut patterns = Vec::with_capacity(num_patterns);
    for index in 0..num_patterns {
        let start = HEADER_SIZE as usize + index * pattern_bytes;
        let raw = slice_at(data, start, pattern_bytes);
        if raw.len() < pattern_bytes {
            return Err(LoadError::InvalidPattern(index as u16));
        }
        patterns.push(parse_pattern(raw, num_channels));
    }

    let mut offset = HEADER_SIZE as usize + num_patterns * pattern_bytes;
    let mut samples = Vec::with_capacity(NUM_SAMPLES);
    for (index, header) in headers.into_iter().enumerate() {
        let raw = slice_at(data, offset, header.length);
        if raw.len() < header.length {
            tracing::debug!(
                sample = index,
                expected = header.length,
                found = raw.len(),
                "truncated MOD sample"
            );
        }
        offset += header.length;

        let pcm = widen_8bit(raw.iter().map(|&b| b as i8));
        let loop_region = (header.loop_length > 2)
            .then(|| {
                SampleLoop::new(
                    header.loop_start as u32,
                    (header.loop_start + header.loop_length) as u32,
                    false,
                    pcm.len(),
                )
            })
            .flatten();
        samples.push(Sample {
            name: header.name,
            data: pcm,
            loop_region,
            volume: header.volume,
            c5_speed: tuned_c5_speed(0, header.finetune.saturating_mul(16)),
            ..Default::default()
        });
    }

    let instruments = samples
        .iter()
        .enumerate()
        .map(|(i, s)| Instrument::for_sample(&s.name, i as u8 + 1))
        .collect();

    // Amiga LRRL panning
    let channels = (0..num_channels)
        .map(|ch| ChannelSettings {
            pan: if matches!(ch % 4, 0 | 3) { 0 } else { 255 },
            ..Default::default()
        })
        .collect();

    Ok(Song {
        title,
        format: SongFormat::ProTracker,
        tracker: tracker_name(&data[TAG_OFFSET..TAG_OFFSET + 4]).to_string(),
        flags: if num_channels == 4 {
            SongFlags::AMIGA_LIMITS
        } else {
            SongFlags::empty()
        },
        initial_speed: 6,
        initial_tempo: 125,
        global_volume: 128,
        mix_volume: 48,
        restart_position: if (restart as usize) < song_length {
            restart as u16
        } else {
            0
        },
        orders: order_table[..song_length].to_vec(),
        patterns,
        instruments,
        samples,
        channels,
        message: String::new(),
    })
}

fn tracker_name(tag: &[u8]) -> &'static str {
    match tag {
        b"M.K." | b"M!K!" => "Protracker",
        b"FLT4" | b"FLT8" => "Startrekker",
        b"CD81" | b"OKTA" | b"OCTA" => "Oktalyzer",
        [b'T', b'D', b'Z', _] => "TakeTracker",
        _ => "Fasttracker",
    }
}

fn parse_pattern(raw: &[u8], num_channels: usize) -> Pattern {
    let mut pattern = Pattern::empty(ROWS, num_channels);
    for (row, cells) in raw.chunks_exact(num_channels * 4).enumerate() {
        for (channel, cell) in cells.chunks_exact(4).enumerate() {
            let instrument = (cell[0] & 0xF0) | (cell[2] >> 4);
            let period = (((cell[0] & 0x0F) as u16) << 8) | cell[1] as u16;
            let (effect, volume) = convert_effect(cell[2] & 0x0F, cell[3]);
            pattern.notes[row][channel] = Note {
                note: period_to_key(period).map_or(0, |k| k + 1),
                instrument,
                volume,
                effect,
            };
        }
    }
    pattern
}

/// Convert a ProTracker effect (shared with the XM loader for 0-F)
///
/// Cxx is returned as a volume column command so that it composes with
/// note-start volume handling the same way in every format.
pub(crate) fn convert_effect(effect: u8, param: u8) -> (Effect, VolumeCommand) {
    let x = param >> 4;
    let y = param & 0x0F;
    let effect = match effect {
        0x0 if param != 0 => Effect::Arpeggio(param),
        0x0 => Effect::None,
        0x1 => Effect::PortamentoUp(param),
        0x2 => Effect::PortamentoDown(param),
        0x3 => Effect::TonePortamento(param),
        0x4 => Effect::Vibrato(param),
        0x5 => Effect::TonePortaVolSlide(param),
        0x6 => Effect::VibratoVolSlide(param),
        0x7 => Effect::Tremolo(param),
        0x8 => Effect::SetPanning(param),
        0x9 => Effect::SampleOffset(param),
        0xA => Effect::VolumeSlide(param),
        0xB => Effect::PositionJump(param),
        0xC => return (Effect::None, VolumeCommand::SetVolume(param.min(64))),
        0xD => Effect::PatternBreak((x * 10 + y).min(63)),
        0xE => match x {
            0x1 => Effect::FinePortamentoUp(y),
            0x2 => Effect::FinePortamentoDown(y),
            0x3 => Effect::Glissando(y != 0),
            0x4 => Effect::VibratoWaveform(y),
            0x5 => Effect::SetFinetune(((y << 4) as i8) >> 4),
            0x6 => Effect::PatternLoop(y),
            0x7 => Effect::TremoloWaveform(y),
            0x8 => Effect::SetPanning(y * 17),
            0x9 => Effect::Retrigger(y),
            0xA => Effect::FineVolumeUp(y),
            0xB => Effect::FineVolumeDown(y),
            0xC => Effect::NoteCut(y),
            0xD => Effect::NoteDelay(y),
            0xE => Effect::PatternDelay(y),
            _ => Effect::None,
        },
        0xF if param == 0 => Effect::None,
        0xF if param < 0x20 => Effect::SetSpeed(param),
        0xF => Effect::SetTempo(param),
        _ => Effect::None,
    };
    (effect, VolumeCommand::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_from_tag() {
        assert_eq!(channels_from_tag(b"M.K."), Some(4));
        assert_eq!(channels_from_tag(b"6CHN"), Some(6));
        assert_eq!(channels_from_tag(b"FLT8"), Some(8));
        assert_eq!(channels_from_tag(b"16CH"), Some(16));
        assert_eq!(channels_from_tag(b"TDZ3"), Some(3));
        assert_eq!(channels_from_tag(b"99CH"), None);
        assert_eq!(channels_from_tag(b"RIFF"), None);
    }

    #[test]
    fn test_period_to_key() {
        assert_eq!(period_to_key(428), Some(60));
        assert_eq!(period_to_key(856), Some(48));
        assert_eq!(period_to_key(214), Some(72));
        // Slightly detuned periods land on the nearest note
        assert_eq!(period_to_key(430), Some(60));
        assert_eq!(period_to_key(0), None);
    }

    #[test]
    fn test_convert_effect_speed_and_tempo() {
        assert_eq!(convert_effect(0xF, 0x03).0, Effect::SetSpeed(3));
        assert_eq!(convert_effect(0xF, 0x7D).0, Effect::SetTempo(125));
        assert_eq!(convert_effect(0xF, 0x00).0, Effect::None);
    }

    #[test]
    fn test_convert_effect_pattern_break_is_decimal() {
        assert_eq!(convert_effect(0xD, 0x32).0, Effect::PatternBreak(32));
        assert_eq!(convert_effect(0xD, 0x99).0, Effect::PatternBreak(63));
    }

    #[test]
    fn test_convert_effect_set_volume_goes_to_volume_column() {
        let (effect, volume) = convert_effect(0xC, 0x50);
        assert_eq!(effect, Effect::None);
        assert_eq!(volume, VolumeCommand::SetVolume(64));
    }

    #[test]
    fn test_convert_extended_effects() {
        assert_eq!(convert_effect(0xE, 0x5F).0, Effect::SetFinetune(-1));
        assert_eq!(convert_effect(0xE, 0x8F).0, Effect::SetPanning(255));
        assert_eq!(convert_effect(0xE, 0xC3).0, Effect::NoteCut(3));
    }

    #[test]
    fn test_rejects_short_data() {
        assert!(!is_protracker(&[0u8; 100]));
        assert!(matches!(load(&[0u8; 100]), Err(LoadError::UnexpectedEof)));
    }
}
