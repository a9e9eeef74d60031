//! FastTracker II XM loader
//!
//! Layout: 60-byte preamble, header (size counted from offset 60), packed
//! patterns, then instruments. Each instrument stores all of its sample
//! headers first, followed by the delta-encoded data of those samples.

use std::io::Cursor;

use crate::effects::{Effect, VolumeCommand};
use crate::error::LoadError;
use crate::protracker;
use crate::reader::{
    read_array, read_text, read_u8, read_u16, read_u32, seek_to, skip, slice_at,
};
use crate::song::{
    AutoVibrato, ChannelSettings, Envelope, Instrument, MAX_CHANNELS, NOTE_RANGE, Note, Pattern,
    Sample, SampleLoop, Song, SongFlags, SongFormat, tuned_c5_speed, widen_8bit,
};

/// XM magic string
pub const XM_MAGIC: &[u8; 17] = b"Extended Module: ";
/// Oldest version with the modern layout
const MIN_VERSION: u16 = 0x0104;
/// Header size field is counted from here
const HEADER_BASE: u64 = 60;
/// XM note value for key-off
const XM_KEY_OFF: u8 = 97;
/// XM notes 1-96 start at C-0, one octave under the shared note range
const NOTE_OFFSET: u8 = 12;

/// Check if data is an XM file
pub fn is_xm(data: &[u8]) -> bool {
    data.len() >= HEADER_BASE as usize && data.starts_with(XM_MAGIC)
}

/// Parse an XM module
pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    if !is_xm(data) {
        return Err(LoadError::UnknownFormat);
    }
    let mut cursor = Cursor::new(data);
    skip(&mut cursor, 17)?;
    let title = read_text::<20>(&mut cursor)?;
    let _marker = read_u8(&mut cursor)?;
    let tracker = read_text::<20>(&mut cursor)?;
    let version = read_u16(&mut cursor)?;
    if version < MIN_VERSION {
        return Err(LoadError::InvalidHeader("unsupported XM version"));
    }

    let header_size = read_u32(&mut cursor)? as u64;
    let song_length = read_u16(&mut cursor)? as usize;
    let restart_position = read_u16(&mut cursor)?;
    let num_channels = read_u16(&mut cursor)?;
    let num_patterns = read_u16(&mut cursor)?;
    let num_instruments = read_u16(&mut cursor)?;
    let flags = read_u16(&mut cursor)?;
    let default_speed = read_u16(&mut cursor)?;
    let default_bpm = read_u16(&mut cursor)?;

    if num_channels == 0 {
        return Err(LoadError::InvalidHeader("no channels"));
    }
    if num_channels as usize > MAX_CHANNELS {
        return Err(LoadError::TooManyChannels(num_channels));
    }
    if song_length > 256 {
        return Err(LoadError::InvalidHeader("song length above 256"));
    }
    if num_patterns > 256 {
        return Err(LoadError::InvalidHeader("more than 256 patterns"));
    }
    if num_instruments > 128 {
        return Err(LoadError::InvalidHeader("more than 128 instruments"));
    }

    let order_table = read_array::<256>(&mut cursor)?;
    let orders = order_table[..song_length].to_vec();

    seek_to(&mut cursor, HEADER_BASE + header_size)?;

    let num_channels = num_channels as usize;
    let mut patterns = Vec::with_capacity(num_patterns as usize);
    for index in 0..num_patterns {
        let pattern = parse_pattern(&mut cursor, num_channels)
            .map_err(|_| LoadError::InvalidPattern(index))?;
        patterns.push(pattern);
    }

    let mut instruments = Vec::with_capacity(num_instruments as usize);
    let mut samples = Vec::new();
    for index in 0..num_instruments {
        match parse_instrument(&mut cursor, &mut samples) {
            Ok(instrument) => instruments.push(instrument),
            // Truncated trailing instruments are common; keep what loaded
            Err(LoadError::UnexpectedEof) if index > 0 => {
                tracing::warn!(instrument = index, "XM instrument data truncated");
                break;
            }
            Err(_) => return Err(LoadError::InvalidInstrument(index)),
        }
    }

    Ok(Song {
        title,
        format: SongFormat::FastTracker2,
        tracker,
        flags: if flags & 0x01 != 0 {
            SongFlags::LINEAR_SLIDES | SongFlags::INSTRUMENTS
        } else {
            SongFlags::INSTRUMENTS
        },
        initial_speed: default_speed.clamp(1, 31) as u8,
        initial_tempo: default_bpm.clamp(32, 255) as u8,
        global_volume: 128,
        mix_volume: 48,
        restart_position: if (restart_position as usize) < song_length {
            restart_position
        } else {
            0
        },
        orders,
        patterns,
        instruments,
        samples,
        channels: vec![ChannelSettings::default(); num_channels],
        message: String::new(),
    })
}

fn parse_pattern(cursor: &mut Cursor<&[u8]>, num_channels: usize) -> Result<Pattern, LoadError> {
    let start = cursor.position();
    let header_length = read_u32(cursor)? as u64;
    let _packing = read_u8(cursor)?;
    let num_rows = read_u16(cursor)?;
    let packed_size = read_u16(cursor)? as usize;
    seek_to(cursor, start + header_length)?;

    if !(1..=256).contains(&num_rows) {
        return Err(LoadError::InvalidHeader("pattern row count"));
    }
    let mut pattern = Pattern::empty(num_rows, num_channels);
    if packed_size == 0 {
        return Ok(pattern);
    }

    let data_start = cursor.position() as usize;
    let source: &[u8] = *cursor.get_ref();
    let packed = slice_at(source, data_start, packed_size);
    if packed.len() < packed_size {
        return Err(LoadError::UnexpectedEof);
    }
    seek_to(cursor, (data_start + packed_size) as u64)?;

    let mut bytes = packed.iter().copied();
    'rows: for row in 0..num_rows as usize {
        for channel in 0..num_channels {
            let Some(first) = bytes.next() else {
                break 'rows;
            };
            let mut fields = [0u8; 5];
            if first & 0x80 != 0 {
                for (bit, field) in fields.iter_mut().enumerate() {
                    if first & (1 << bit) != 0 {
                        *field = bytes.next().unwrap_or(0);
                    }
                }
            } else {
                fields[0] = first;
                for field in &mut fields[1..] {
                    *field = bytes.next().unwrap_or(0);
                }
            }
            pattern.notes[row][channel] = convert_cell(fields);
        }
    }
    Ok(pattern)
}

fn convert_cell([note, instrument, volume, effect, param]: [u8; 5]) -> Note {
    let note = match note {
        1..=96 => note + NOTE_OFFSET,
        XM_KEY_OFF => Note::NOTE_OFF,
        _ => 0,
    };
    let (effect, effect_volume) = convert_effect(effect, param);
    let volume = match convert_volume(volume) {
        VolumeCommand::None => effect_volume,
        command => command,
    };
    Note {
        note,
        instrument,
        volume,
        effect,
    }
}

/// Convert an XM volume column byte
fn convert_volume(value: u8) -> VolumeCommand {
    let y = value & 0x0F;
    match value {
        0x10..=0x50 => VolumeCommand::SetVolume(value - 0x10),
        0x60..=0x6F => VolumeCommand::SlideDown(y),
        0x70..=0x7F => VolumeCommand::SlideUp(y),
        0x80..=0x8F => VolumeCommand::FineDown(y),
        0x90..=0x9F => VolumeCommand::FineUp(y),
        0xA0..=0xAF => VolumeCommand::VibratoSpeed(y),
        0xB0..=0xBF => VolumeCommand::VibratoDepth(y),
        0xC0..=0xCF => VolumeCommand::SetPanning(y * 17),
        0xD0..=0xDF => VolumeCommand::PanSlideLeft(y),
        0xE0..=0xEF => VolumeCommand::PanSlideRight(y),
        0xF0..=0xFF => VolumeCommand::TonePortamento(y << 4),
        _ => VolumeCommand::None,
    }
}

/// Convert an XM effect: 0-F follow ProTracker, G and up are XM additions
fn convert_effect(effect: u8, param: u8) -> (Effect, VolumeCommand) {
    let x = param >> 4;
    let y = param & 0x0F;
    let converted = match effect {
        0x0..=0xF => return protracker::convert_effect(effect, param),
        // G
        16 => Effect::SetGlobalVolume(param.min(64) * 2),
        // H
        17 => Effect::GlobalVolumeSlide(param),
        // K
        20 => Effect::KeyOff(param),
        // L
        21 => Effect::SetEnvelopePosition(param),
        // P
        25 => Effect::PanningSlide(param),
        // R
        27 => Effect::Retrigger(param),
        // T
        29 => Effect::Tremor(param),
        // X
        33 => match x {
            1 => Effect::ExtraFinePortamentoUp(y),
            2 => Effect::ExtraFinePortamentoDown(y),
            _ => Effect::None,
        },
        _ => Effect::None,
    };
    (converted, VolumeCommand::None)
}

struct SampleHeader {
    length: usize,
    loop_start: usize,
    loop_length: usize,
    volume: u8,
    finetune: i8,
    kind: u8,
    pan: u8,
    relative_note: i8,
    name: String,
}

/// Parse one instrument, appending its samples to `samples`
fn parse_instrument(
    cursor: &mut Cursor<&[u8]>,
    samples: &mut Vec<Sample>,
) -> Result<Instrument, LoadError> {
    let start = cursor.position();
    let header_size = read_u32(cursor)? as u64;
    let name = read_text::<22>(cursor)?;
    let _kind = read_u8(cursor)?;
    let num_samples = read_u16(cursor)? as usize;

    let mut instrument = Instrument {
        name,
        keymap: [(0, 0); NOTE_RANGE],
        ..Default::default()
    };
    for (key, entry) in instrument.keymap.iter_mut().enumerate() {
        entry.0 = key as u8;
    }

    if num_samples == 0 {
        seek_to(cursor, start + header_size.max(4))?;
        return Ok(instrument);
    }

    let sample_header_size = read_u32(cursor)? as u64;
    let sample_map = read_array::<96>(cursor)?;
    let mut volume_points = [(0u16, 0u16); 12];
    for point in &mut volume_points {
        *point = (read_u16(cursor)?, read_u16(cursor)?);
    }
    let mut panning_points = [(0u16, 0u16); 12];
    for point in &mut panning_points {
        *point = (read_u16(cursor)?, read_u16(cursor)?);
    }
    let num_volume_points = read_u8(cursor)?.min(12) as usize;
    let num_panning_points = read_u8(cursor)?.min(12) as usize;
    let volume_sustain = read_u8(cursor)?;
    let volume_loop = (read_u8(cursor)?, read_u8(cursor)?);
    let panning_sustain = read_u8(cursor)?;
    let panning_loop = (read_u8(cursor)?, read_u8(cursor)?);
    let volume_type = read_u8(cursor)?;
    let panning_type = read_u8(cursor)?;
    let vibrato = AutoVibrato {
        waveform: match read_u8(cursor)? {
            1 => 2,
            2 | 3 => 1,
            _ => 0,
        },
        sweep: read_u8(cursor)?,
        depth: read_u8(cursor)?,
        speed: read_u8(cursor)?,
    };
    instrument.fadeout = read_u16(cursor)? as u32;

    instrument.volume_envelope = build_envelope(
        &volume_points[..num_volume_points],
        volume_type,
        volume_sustain,
        volume_loop,
        |y| y.min(64) as i8,
    );
    instrument.panning_envelope = build_envelope(
        &panning_points[..num_panning_points],
        panning_type,
        panning_sustain,
        panning_loop,
        |y| (y.min(64) as i8) - 32,
    );

    seek_to(cursor, start + header_size)?;

    let mut headers = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        let header_start = cursor.position();
        headers.push(SampleHeader {
            length: read_u32(cursor)? as usize,
            loop_start: read_u32(cursor)? as usize,
            loop_length: read_u32(cursor)? as usize,
            volume: read_u8(cursor)?.min(64),
            finetune: read_u8(cursor)? as i8,
            kind: read_u8(cursor)?,
            pan: read_u8(cursor)?,
            relative_note: read_u8(cursor)? as i8,
            name: {
                let _reserved = read_u8(cursor)?;
                read_text::<22>(cursor)?
            },
        });
        seek_to(cursor, header_start + sample_header_size.max(40))?;
    }

    let first_sample = samples.len();
    for header in headers {
        let offset = cursor.position() as usize;
        let source: &[u8] = *cursor.get_ref();
        let raw = slice_at(source, offset, header.length);
        let truncated = raw.len() < header.length;
        samples.push(decode_sample(&header, raw, vibrato));
        if truncated {
            return Err(LoadError::UnexpectedEof);
        }
        seek_to(cursor, (offset + header.length) as u64)?;
    }

    for (xm_note, &sample) in sample_map.iter().enumerate() {
        let global = first_sample + sample as usize;
        if (sample as usize) < num_samples && global < 255 {
            instrument.keymap[xm_note + NOTE_OFFSET as usize].1 = global as u8 + 1;
        }
    }
    // Keys outside the XM range reuse the nearest mapped sample
    let low = instrument.keymap[NOTE_OFFSET as usize].1;
    let high = instrument.keymap[NOTE_OFFSET as usize + 95].1;
    for (key, entry) in instrument.keymap.iter_mut().enumerate() {
        if key < NOTE_OFFSET as usize {
            entry.1 = low;
        } else if key > NOTE_OFFSET as usize + 95 {
            entry.1 = high;
        }
    }

    Ok(instrument)
}

fn build_envelope(
    points: &[(u16, u16)],
    kind: u8,
    sustain: u8,
    (loop_start, loop_end): (u8, u8),
    value: impl Fn(u16) -> i8,
) -> Option<Envelope> {
    if kind & 0x01 == 0 || points.is_empty() {
        return None;
    }
    Envelope {
        points: points.iter().map(|&(x, y)| (x, value(y))).collect(),
        sustain_range: (kind & 0x02 != 0).then_some((sustain, sustain)),
        loop_range: (kind & 0x04 != 0).then_some((loop_start, loop_end)),
    }
    .sanitized()
}

fn decode_sample(header: &SampleHeader, raw: &[u8], vibrato: AutoVibrato) -> Sample {
    let is_16bit = header.kind & 0x10 != 0;
    let data = if is_16bit {
        let mut acc = 0i16;
        raw.chunks_exact(2)
            .map(|b| {
                acc = acc.wrapping_add(i16::from_le_bytes([b[0], b[1]]));
                acc
            })
            .collect()
    } else {
        let mut acc = 0i8;
        widen_8bit(raw.iter().map(|&b| {
            acc = acc.wrapping_add(b as i8);
            acc
        }))
    };

    let (loop_start, loop_length) = if is_16bit {
        (header.loop_start / 2, header.loop_length / 2)
    } else {
        (header.loop_start, header.loop_length)
    };
    let loop_region = match header.kind & 0x03 {
        0 => None,
        mode => SampleLoop::new(
            loop_start as u32,
            (loop_start + loop_length) as u32,
            mode == 2,
            data.len(),
        ),
    };

    Sample {
        name: header.name.clone(),
        data,
        loop_region,
        volume: header.volume,
        pan: Some(header.pan),
        c5_speed: tuned_c5_speed(header.relative_note, header.finetune),
        vibrato,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_note_values() {
        assert_eq!(convert_cell([49, 1, 0, 0, 0]).key(), Some(60));
        assert!(convert_cell([97, 0, 0, 0, 0]).is_note_off());
        assert_eq!(convert_cell([0, 0, 0, 0, 0]), Note::default());
    }

    #[test]
    fn test_volume_column_overrides_cxx() {
        let cell = convert_cell([0, 0, 0x30, 0xC, 0x10]);
        assert_eq!(cell.volume, VolumeCommand::SetVolume(0x20));
        let cell = convert_cell([0, 0, 0, 0xC, 0x10]);
        assert_eq!(cell.volume, VolumeCommand::SetVolume(0x10));
    }

    #[test]
    fn test_convert_volume_column() {
        assert_eq!(convert_volume(0x50), VolumeCommand::SetVolume(64));
        assert_eq!(convert_volume(0x65), VolumeCommand::SlideDown(5));
        assert_eq!(convert_volume(0xCF), VolumeCommand::SetPanning(255));
        assert_eq!(convert_volume(0xF2), VolumeCommand::TonePortamento(0x20));
        assert_eq!(convert_volume(0x05), VolumeCommand::None);
    }

    #[test]
    fn test_xm_only_effects() {
        assert_eq!(convert_effect(16, 0x40).0, Effect::SetGlobalVolume(128));
        assert_eq!(convert_effect(20, 3).0, Effect::KeyOff(3));
        assert_eq!(convert_effect(33, 0x12).0, Effect::ExtraFinePortamentoUp(2));
        assert_eq!(convert_effect(33, 0x25).0, Effect::ExtraFinePortamentoDown(5));
    }

    #[test]
    fn test_delta_decoding() {
        let header = SampleHeader {
            length: 4,
            loop_start: 0,
            loop_length: 0,
            volume: 64,
            finetune: 0,
            kind: 0,
            pan: 128,
            relative_note: 0,
            name: String::new(),
        };
        let sample = decode_sample(&header, &[10, 10, 0xF6, 0xF6], AutoVibrato::default());
        assert_eq!(sample.data, vec![10 << 8, 20 << 8, 10 << 8, 0]);
    }

    #[test]
    fn test_16bit_loop_is_in_frames() {
        let header = SampleHeader {
            length: 8,
            loop_start: 2,
            loop_length: 4,
            volume: 64,
            finetune: 0,
            kind: 0x11,
            pan: 128,
            relative_note: 0,
            name: String::new(),
        };
        let sample = decode_sample(&header, &[0; 8], AutoVibrato::default());
        assert_eq!(sample.data.len(), 4);
        let region = sample.loop_region.unwrap();
        assert_eq!((region.start, region.end), (1, 3));
    }

    #[test]
    fn test_envelope_disabled_without_flag() {
        assert!(build_envelope(&[(0, 64), (10, 0)], 0, 0, (0, 0), |y| y as i8).is_none());
        let env = build_envelope(&[(0, 64), (10, 0)], 0x03, 1, (0, 0), |y| y as i8).unwrap();
        assert_eq!(env.sustain_range, Some((1, 1)));
        assert_eq!(env.loop_range, None);
    }
}
