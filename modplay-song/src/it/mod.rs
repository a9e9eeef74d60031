//! Impulse Tracker IT loader
//!
//! Header, offset tables, then instruments, samples and patterns located
//! through those tables. Both the old (pre-2.00) and new instrument layouts
//! are read; compressed samples go through [`compression`].

use std::io::Cursor;

use crate::effects::{Effect, VolumeCommand};
use crate::error::LoadError;
use crate::reader::{
    ByteCursor, read_array, read_text, read_u8, read_u16, read_u32, seek_to, skip, slice_at,
};
use crate::s3m;
use crate::song::{
    AutoVibrato, ChannelSettings, DuplicateAction, DuplicateCheck, Envelope, Instrument,
    MAX_CHANNELS, NOTE_RANGE, NewNoteAction, Note, Pattern, Sample, SampleLoop, Song, SongFlags,
    SongFormat, widen_8bit,
};

pub mod compression;

/// IT magic
pub const IT_MAGIC: &[u8; 4] = b"IMPM";
/// Instrument magic
const INSTRUMENT_MAGIC: &[u8; 4] = b"IMPI";
/// Sample magic
const SAMPLE_MAGIC: &[u8; 4] = b"IMPS";
/// Header size before the order table
const HEADER_SIZE: usize = 0xC0;
/// First version using the new instrument layout
const NEW_INSTRUMENT_VERSION: u16 = 0x0200;

/// Tone portamento speeds of volume column commands 193-202
const VOLUME_PORTA_SPEEDS: [u8; 10] = [0, 1, 4, 8, 16, 32, 64, 96, 128, 255];

// Header flag bits
const FLAG_STEREO: u16 = 0x01;
const FLAG_INSTRUMENTS: u16 = 0x04;
const FLAG_LINEAR_SLIDES: u16 = 0x08;
const FLAG_OLD_EFFECTS: u16 = 0x10;
const FLAG_LINK_G: u16 = 0x20;
const SPECIAL_MESSAGE: u16 = 0x01;

/// Check if data is an IT file
pub fn is_it(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE && data.starts_with(IT_MAGIC)
}

/// Parse an IT module
pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    if !is_it(data) {
        return Err(LoadError::UnknownFormat);
    }
    let mut cursor = Cursor::new(data);
    skip(&mut cursor, 4)?;
    let title = read_text::<26>(&mut cursor)?;
    let _highlight = read_u16(&mut cursor)?;
    let num_orders = read_u16(&mut cursor)? as usize;
    let num_instruments = read_u16(&mut cursor)? as usize;
    let num_samples = read_u16(&mut cursor)? as usize;
    let num_patterns = read_u16(&mut cursor)? as usize;
    let created_with = read_u16(&mut cursor)?;
    let compatible_with = read_u16(&mut cursor)?;
    let flags = read_u16(&mut cursor)?;
    let special = read_u16(&mut cursor)?;
    let global_volume = read_u8(&mut cursor)?;
    let mix_volume = read_u8(&mut cursor)?;
    let initial_speed = read_u8(&mut cursor)?;
    let initial_tempo = read_u8(&mut cursor)?;
    let _separation = read_u8(&mut cursor)?;
    let _pitch_wheel_depth = read_u8(&mut cursor)?;
    let message_length = read_u16(&mut cursor)? as usize;
    let message_offset = read_u32(&mut cursor)? as usize;
    skip(&mut cursor, 4)?;
    let channel_pan = read_array::<64>(&mut cursor)?;
    let channel_volume = read_array::<64>(&mut cursor)?;

    if num_instruments > 255 || num_samples > 255 || num_patterns > 256 {
        return Err(LoadError::InvalidHeader("table sizes out of range"));
    }

    let mut orders = Vec::with_capacity(num_orders);
    for _ in 0..num_orders {
        orders.push(read_u8(&mut cursor)?);
    }
    while orders.last() == Some(&0xFF) {
        orders.pop();
    }

    let read_offsets = |cursor: &mut ByteCursor<'_>, count: usize| {
        (0..count)
            .map(|_| read_u32(cursor).map(|o| o as usize))
            .collect::<Result<Vec<_>, _>>()
    };
    let instrument_offsets = read_offsets(&mut cursor, num_instruments)?;
    let sample_offsets = read_offsets(&mut cursor, num_samples)?;
    let pattern_offsets = read_offsets(&mut cursor, num_patterns)?;

    let mut samples = Vec::with_capacity(num_samples);
    for (index, &offset) in sample_offsets.iter().enumerate() {
        if offset == 0 {
            samples.push(Sample::default());
            continue;
        }
        let sample =
            parse_sample(data, offset).map_err(|_| LoadError::InvalidSample(index as u16))?;
        samples.push(sample);
    }

    let uses_instruments = flags & FLAG_INSTRUMENTS != 0;
    let instruments = if uses_instruments {
        let mut instruments = Vec::with_capacity(num_instruments);
        for (index, &offset) in instrument_offsets.iter().enumerate() {
            if offset == 0 {
                instruments.push(Instrument::for_sample("", 0));
                continue;
            }
            let instrument = if compatible_with < NEW_INSTRUMENT_VERSION {
                parse_old_instrument(data, offset)
            } else {
                parse_instrument(data, offset)
            }
            .map_err(|_| LoadError::InvalidInstrument(index as u16))?;
            instruments.push(instrument);
        }
        instruments
    } else {
        samples
            .iter()
            .enumerate()
            .map(|(i, s)| Instrument::for_sample(&s.name, i as u8 + 1))
            .collect()
    };

    let mut patterns = Vec::with_capacity(num_patterns);
    let mut used_channels = 1usize;
    for (index, &offset) in pattern_offsets.iter().enumerate() {
        if offset == 0 {
            patterns.push(Pattern::empty(64, MAX_CHANNELS));
            continue;
        }
        let (pattern, highest) =
            parse_pattern(data, offset).map_err(|_| LoadError::InvalidPattern(index as u16))?;
        used_channels = used_channels.max(highest + 1);
        patterns.push(pattern);
    }
    for pattern in &mut patterns {
        for row in &mut pattern.notes {
            row.truncate(used_channels);
        }
    }

    let stereo = flags & FLAG_STEREO != 0;
    let channels = (0..used_channels)
        .map(|ch| {
            let pan = channel_pan[ch];
            ChannelSettings {
                pan: match pan & 0x7F {
                    p if stereo && p <= 64 => (p as u16 * 4).min(255) as u8,
                    _ => 128,
                },
                volume: channel_volume[ch].min(64),
                muted: pan & 0x80 != 0,
            }
        })
        .collect();

    let message = if special & SPECIAL_MESSAGE != 0 {
        read_message(slice_at(data, message_offset, message_length))
    } else {
        String::new()
    };

    let mut song_flags = SongFlags::empty();
    for (bit, flag) in [
        (FLAG_INSTRUMENTS, SongFlags::INSTRUMENTS),
        (FLAG_LINEAR_SLIDES, SongFlags::LINEAR_SLIDES),
        (FLAG_OLD_EFFECTS, SongFlags::OLD_EFFECTS),
        (FLAG_LINK_G, SongFlags::LINK_G_MEMORY),
    ] {
        if flags & bit != 0 {
            song_flags.insert(flag);
        }
    }

    Ok(Song {
        title,
        format: SongFormat::ImpulseTracker,
        tracker: tracker_name(created_with),
        flags: song_flags,
        initial_speed: initial_speed.max(1),
        initial_tempo: initial_tempo.max(32),
        global_volume: global_volume.min(128),
        mix_volume: mix_volume.min(128),
        restart_position: 0,
        orders,
        patterns,
        instruments,
        samples,
        channels,
        message,
    })
}

fn tracker_name(created_with: u16) -> String {
    match created_with >> 12 {
        0 => format!(
            "Impulse Tracker {}.{:02x}",
            (created_with >> 8) & 0x0F,
            created_with & 0xFF
        ),
        1 => "Schism Tracker".to_string(),
        5 => "OpenMPT".to_string(),
        _ => "Unknown".to_string(),
    }
}

fn read_message(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    raw[..end]
        .iter()
        .map(|&b| if b == b'\r' { '\n' } else { b as char })
        .collect::<String>()
        .trim_end()
        .to_string()
}

// =============================================================================
// Patterns
// =============================================================================

/// Parse a packed pattern, returning it with the highest channel it uses
fn parse_pattern(data: &[u8], offset: usize) -> Result<(Pattern, usize), LoadError> {
    let mut cursor = Cursor::new(data);
    seek_to(&mut cursor, offset as u64)?;
    let packed_length = read_u16(&mut cursor)? as usize;
    let num_rows = read_u16(&mut cursor)?;
    skip(&mut cursor, 4)?;
    if !(1..=200).contains(&num_rows) {
        return Err(LoadError::InvalidHeader("pattern row count"));
    }

    let packed = slice_at(data, offset + 8, packed_length);
    let mut bytes = packed.iter().copied();
    let mut pattern = Pattern::empty(num_rows, MAX_CHANNELS);
    let mut highest = 0usize;

    let mut last_mask = [0u8; MAX_CHANNELS];
    let mut last_note = [0u8; MAX_CHANNELS];
    let mut last_instrument = [0u8; MAX_CHANNELS];
    let mut last_volume = [0xFFu8; MAX_CHANNELS];
    let mut last_effect = [(0u8, 0u8); MAX_CHANNELS];

    let mut row = 0usize;
    while row < num_rows as usize {
        let Some(channel_byte) = bytes.next() else {
            break;
        };
        if channel_byte == 0 {
            row += 1;
            continue;
        }
        let channel = ((channel_byte - 1) & 0x3F) as usize;
        if channel_byte & 0x80 != 0 {
            last_mask[channel] = bytes.next().unwrap_or(0);
        }
        let mask = last_mask[channel];
        let mut next = || bytes.next().unwrap_or(0);

        let mut note = None;
        let mut instrument = None;
        let mut volume = None;
        let mut effect = None;
        if mask & 0x01 != 0 {
            last_note[channel] = next();
            note = Some(last_note[channel]);
        }
        if mask & 0x02 != 0 {
            last_instrument[channel] = next();
            instrument = Some(last_instrument[channel]);
        }
        if mask & 0x04 != 0 {
            last_volume[channel] = next();
            volume = Some(last_volume[channel]);
        }
        if mask & 0x08 != 0 {
            let command = next();
            let param = next();
            last_effect[channel] = (command, param);
            effect = Some(last_effect[channel]);
        }
        if mask & 0x10 != 0 {
            note = Some(last_note[channel]);
        }
        if mask & 0x20 != 0 {
            instrument = Some(last_instrument[channel]);
        }
        if mask & 0x40 != 0 {
            volume = Some(last_volume[channel]);
        }
        if mask & 0x80 != 0 {
            effect = Some(last_effect[channel]);
        }

        highest = highest.max(channel);
        pattern.notes[row][channel] = Note {
            note: note.map_or(0, convert_note),
            instrument: instrument.unwrap_or(0),
            volume: volume.map_or(VolumeCommand::None, convert_volume),
            effect: effect.map_or(Effect::None, |(command, param)| {
                s3m::convert_effect(command, param, SongFormat::ImpulseTracker)
            }),
        };
    }
    Ok((pattern, highest))
}

fn convert_note(value: u8) -> u8 {
    match value {
        0..=119 => value + 1,
        255 => Note::NOTE_OFF,
        254 => Note::NOTE_CUT,
        _ => Note::NOTE_FADE,
    }
}

/// Convert an IT volume column byte
fn convert_volume(value: u8) -> VolumeCommand {
    match value {
        0..=64 => VolumeCommand::SetVolume(value),
        65..=74 => VolumeCommand::FineUp(value - 65),
        75..=84 => VolumeCommand::FineDown(value - 75),
        85..=94 => VolumeCommand::SlideUp(value - 85),
        95..=104 => VolumeCommand::SlideDown(value - 95),
        105..=114 => VolumeCommand::PortamentoDown((value - 105) * 4),
        115..=124 => VolumeCommand::PortamentoUp((value - 115) * 4),
        128..=192 => VolumeCommand::SetPanning(((value - 128) as u16 * 4).min(255) as u8),
        193..=202 => VolumeCommand::TonePortamento(VOLUME_PORTA_SPEEDS[(value - 193) as usize]),
        203..=212 => VolumeCommand::VibratoDepth(value - 203),
        _ => VolumeCommand::None,
    }
}

// =============================================================================
// Instruments
// =============================================================================

fn read_keymap(cursor: &mut ByteCursor<'_>) -> Result<[(u8, u8); NOTE_RANGE], LoadError> {
    let mut keymap = [(0u8, 0u8); NOTE_RANGE];
    for entry in &mut keymap {
        let note = read_u8(cursor)?;
        let sample = read_u8(cursor)?;
        *entry = (note.min(NOTE_RANGE as u8 - 1), sample);
    }
    Ok(keymap)
}

fn default_pan(value: u8) -> Option<u8> {
    (value & 0x80 == 0).then(|| ((value & 0x7F).min(64) as u16 * 4).min(255) as u8)
}

/// New-format (IT 2.00+) instrument
fn parse_instrument(data: &[u8], offset: usize) -> Result<Instrument, LoadError> {
    let mut cursor = Cursor::new(data);
    seek_to(&mut cursor, offset as u64)?;
    if &read_array::<4>(&mut cursor)? != INSTRUMENT_MAGIC {
        return Err(LoadError::InvalidHeader("missing IMPI"));
    }
    let _filename = read_array::<12>(&mut cursor)?;
    let _zero = read_u8(&mut cursor)?;
    let new_note_action = NewNoteAction::from_u8(read_u8(&mut cursor)?);
    let duplicate_check = DuplicateCheck::from_u8(read_u8(&mut cursor)?);
    let duplicate_action = DuplicateAction::from_u8(read_u8(&mut cursor)?);
    let fadeout = read_u16(&mut cursor)? as u32;
    let _pitch_pan_separation = read_u8(&mut cursor)?;
    let _pitch_pan_center = read_u8(&mut cursor)?;
    let global_volume = read_u8(&mut cursor)?.min(128);
    let pan = read_u8(&mut cursor)?;
    let _random_volume = read_u8(&mut cursor)?;
    let _random_pan = read_u8(&mut cursor)?;
    let _tracker_version = read_u16(&mut cursor)?;
    let _num_samples = read_u8(&mut cursor)?;
    let _reserved = read_u8(&mut cursor)?;
    let name = read_text::<26>(&mut cursor)?;
    // Filter cutoff/resonance and MIDI settings are not used
    skip(&mut cursor, 6)?;
    let keymap = read_keymap(&mut cursor)?;

    let volume_envelope = read_envelope(&mut cursor)?;
    let panning_envelope = read_envelope(&mut cursor)?;
    let pitch_envelope = read_envelope(&mut cursor)?;

    Ok(Instrument {
        name,
        keymap,
        volume_envelope,
        panning_envelope,
        pitch_envelope,
        fadeout: fadeout.min(1024) << 5,
        global_volume,
        default_pan: default_pan(pan),
        new_note_action,
        duplicate_check,
        duplicate_action,
    })
}

/// Read one 82-byte envelope block
fn read_envelope(cursor: &mut ByteCursor<'_>) -> Result<Option<Envelope>, LoadError> {
    let flags = read_u8(cursor)?;
    let num_points = read_u8(cursor)?.min(25) as usize;
    let loop_range = (read_u8(cursor)?, read_u8(cursor)?);
    let sustain_range = (read_u8(cursor)?, read_u8(cursor)?);
    let mut points = Vec::with_capacity(num_points);
    for i in 0..25 {
        let value = read_u8(cursor)? as i8;
        let tick = read_u16(cursor)?;
        if i < num_points {
            points.push((tick, value));
        }
    }
    let _reserved = read_u8(cursor)?;

    // Bit 7 marks a filter envelope, which is not played
    if flags & 0x01 == 0 || flags & 0x80 != 0 || points.is_empty() {
        return Ok(None);
    }
    Ok(Envelope {
        points,
        loop_range: (flags & 0x02 != 0).then_some(loop_range),
        sustain_range: (flags & 0x04 != 0).then_some(sustain_range),
    }
    .sanitized())
}

/// Old-format (IT 1.xx) instrument: volume envelope only, stored as node points
fn parse_old_instrument(data: &[u8], offset: usize) -> Result<Instrument, LoadError> {
    let mut cursor = Cursor::new(data);
    seek_to(&mut cursor, offset as u64)?;
    if &read_array::<4>(&mut cursor)? != INSTRUMENT_MAGIC {
        return Err(LoadError::InvalidHeader("missing IMPI"));
    }
    let _filename = read_array::<12>(&mut cursor)?;
    let _zero = read_u8(&mut cursor)?;
    let flags = read_u8(&mut cursor)?;
    let loop_range = (read_u8(&mut cursor)?, read_u8(&mut cursor)?);
    let sustain_range = (read_u8(&mut cursor)?, read_u8(&mut cursor)?);
    skip(&mut cursor, 2)?;
    let fadeout = read_u16(&mut cursor)? as u32;
    let new_note_action = NewNoteAction::from_u8(read_u8(&mut cursor)?);
    let duplicate_check = read_u8(&mut cursor)?;
    skip(&mut cursor, 4)?;
    let name = read_text::<26>(&mut cursor)?;
    skip(&mut cursor, 6)?;
    let keymap = read_keymap(&mut cursor)?;
    // 200-byte precomputed envelope, then the node points it came from
    skip(&mut cursor, 200)?;
    let mut points = Vec::new();
    for _ in 0..25 {
        let tick = read_u8(&mut cursor)?;
        let value = read_u8(&mut cursor)?;
        if tick == 0xFF {
            break;
        }
        points.push((tick as u16, value.min(64) as i8));
    }

    let volume_envelope = (flags & 0x01 != 0 && !points.is_empty())
        .then(|| {
            Envelope {
                points,
                loop_range: (flags & 0x02 != 0).then_some(loop_range),
                sustain_range: (flags & 0x04 != 0).then_some(sustain_range),
            }
            .sanitized()
        })
        .flatten();

    Ok(Instrument {
        name,
        keymap,
        volume_envelope,
        fadeout: fadeout.min(512) << 6,
        new_note_action,
        duplicate_check: if duplicate_check != 0 {
            DuplicateCheck::Note
        } else {
            DuplicateCheck::Off
        },
        ..Default::default()
    })
}

// =============================================================================
// Samples
// =============================================================================

// Sample flag bits
const SAMPLE_HAS_DATA: u8 = 0x01;
const SAMPLE_16BIT: u8 = 0x02;
const SAMPLE_COMPRESSED: u8 = 0x08;
const SAMPLE_LOOP: u8 = 0x10;
const SAMPLE_SUSTAIN_LOOP: u8 = 0x20;
const SAMPLE_PING_PONG: u8 = 0x40;
const SAMPLE_SUSTAIN_PING_PONG: u8 = 0x80;

// Conversion flag bits
const CVT_SIGNED: u8 = 0x01;
const CVT_DELTA: u8 = 0x04;

fn parse_sample(data: &[u8], offset: usize) -> Result<Sample, LoadError> {
    let mut cursor = Cursor::new(data);
    seek_to(&mut cursor, offset as u64)?;
    if &read_array::<4>(&mut cursor)? != SAMPLE_MAGIC {
        return Err(LoadError::InvalidHeader("missing IMPS"));
    }
    let _filename = read_array::<12>(&mut cursor)?;
    let _zero = read_u8(&mut cursor)?;
    let global_volume = read_u8(&mut cursor)?.min(64);
    let flags = read_u8(&mut cursor)?;
    let volume = read_u8(&mut cursor)?.min(64);
    let name = read_text::<26>(&mut cursor)?;
    let convert = read_u8(&mut cursor)?;
    let pan = read_u8(&mut cursor)?;
    let length = read_u32(&mut cursor)? as usize;
    let loop_start = read_u32(&mut cursor)?;
    let loop_end = read_u32(&mut cursor)?;
    let c5_speed = read_u32(&mut cursor)?;
    let sustain_start = read_u32(&mut cursor)?;
    let sustain_end = read_u32(&mut cursor)?;
    let data_offset = read_u32(&mut cursor)? as usize;
    let vibrato_speed = read_u8(&mut cursor)?;
    let vibrato_depth = read_u8(&mut cursor)?;
    let vibrato_rate = read_u8(&mut cursor)?;
    let vibrato_type = read_u8(&mut cursor)?;

    let pcm = if flags & SAMPLE_HAS_DATA == 0 || length == 0 {
        Vec::new()
    } else {
        read_sample_data(data, data_offset, length, flags, convert)?
    };

    let loop_region = (flags & SAMPLE_LOOP != 0)
        .then(|| {
            SampleLoop::new(
                loop_start,
                loop_end,
                flags & SAMPLE_PING_PONG != 0,
                pcm.len(),
            )
        })
        .flatten();
    let sustain_loop = (flags & SAMPLE_SUSTAIN_LOOP != 0)
        .then(|| {
            SampleLoop::new(
                sustain_start,
                sustain_end,
                flags & SAMPLE_SUSTAIN_PING_PONG != 0,
                pcm.len(),
            )
        })
        .flatten();

    Ok(Sample {
        name,
        data: pcm,
        loop_region,
        sustain_loop,
        volume,
        global_volume,
        pan: default_pan(pan ^ 0x80),
        c5_speed: if c5_speed == 0 { 8363 } else { c5_speed },
        vibrato: AutoVibrato {
            waveform: vibrato_type & 0x03,
            speed: vibrato_speed,
            depth: vibrato_depth,
            sweep: if vibrato_rate == 0 {
                0
            } else {
                (vibrato_depth as u32 * 256 / vibrato_rate as u32).min(255) as u8
            },
        },
    })
}

/// Decode sample data (left channel only for stereo samples)
fn read_sample_data(
    data: &[u8],
    offset: usize,
    length: usize,
    flags: u8,
    convert: u8,
) -> Result<Vec<i16>, LoadError> {
    let is_16bit = flags & SAMPLE_16BIT != 0;
    let signed = convert & CVT_SIGNED != 0;

    if flags & SAMPLE_COMPRESSED != 0 {
        let compressed = data.get(offset..).unwrap_or(&[]);
        let it215 = convert & CVT_DELTA != 0;
        return if is_16bit {
            compression::decompress_16bit(compressed, length, it215)
        } else {
            compression::decompress_8bit(compressed, length, it215).map(widen_8bit)
        };
    }

    if is_16bit {
        let raw = slice_at(data, offset, length * 2);
        Ok(raw
            .chunks_exact(2)
            .map(|b| {
                let v = u16::from_le_bytes([b[0], b[1]]);
                if signed { v as i16 } else { (v ^ 0x8000) as i16 }
            })
            .collect())
    } else {
        let raw = slice_at(data, offset, length);
        Ok(widen_8bit(
            raw.iter()
                .map(|&b| if signed { b as i8 } else { (b ^ 0x80) as i8 }),
        ))
    }
}
