//! Scream Tracker 3 loader
//!
//! Also hosts the S3M/IT effect letter conversion, since Impulse Tracker
//! inherited the whole command set (plus a few additions).

use std::io::Cursor;

use crate::effects::{Effect, VolumeCommand};
use crate::error::LoadError;
use crate::reader::{read_array, read_text, read_u8, read_u16, read_u32, seek_to, slice_at};
use crate::song::{
    ChannelSettings, Instrument, Note, Pattern, Sample, SampleLoop, Song, SongFlags, SongFormat,
    widen_8bit,
};

/// S3M magic at offset 0x2C
pub const S3M_MAGIC: &[u8; 4] = b"SCRM";
const MAGIC_OFFSET: usize = 0x2C;
const ROWS: u16 = 64;
/// Marker in the default-pan byte meaning the channel pan table is present
const PAN_TABLE_PRESENT: u8 = 252;

/// Check if data is an S3M file
pub fn is_s3m(data: &[u8]) -> bool {
    data.len() >= 0x60 && &data[MAGIC_OFFSET..MAGIC_OFFSET + 4] == S3M_MAGIC
}

/// Parse an S3M module
pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    if !is_s3m(data) {
        return Err(LoadError::UnknownFormat);
    }
    let mut cursor = Cursor::new(data);
    let title = read_text::<28>(&mut cursor)?;
    seek_to(&mut cursor, 0x20)?;
    let num_orders = read_u16(&mut cursor)? as usize;
    let num_instruments = read_u16(&mut cursor)? as usize;
    let num_patterns = read_u16(&mut cursor)? as usize;
    let header_flags = read_u16(&mut cursor)?;
    let tracker_version = read_u16(&mut cursor)?;
    let sample_format = read_u16(&mut cursor)?;
    seek_to(&mut cursor, 0x30)?;
    let global_volume = read_u8(&mut cursor)?;
    let initial_speed = read_u8(&mut cursor)?;
    let initial_tempo = read_u8(&mut cursor)?;
    let master_volume = read_u8(&mut cursor)?;
    let _ultra_click = read_u8(&mut cursor)?;
    let default_pan = read_u8(&mut cursor)?;
    seek_to(&mut cursor, 0x40)?;
    let channel_settings = read_array::<32>(&mut cursor)?;

    let mut orders = Vec::with_capacity(num_orders);
    for _ in 0..num_orders {
        orders.push(read_u8(&mut cursor)?);
    }
    // Trailing end markers are padding
    while orders.last() == Some(&0xFF) {
        orders.pop();
    }

    let mut instrument_offsets = Vec::with_capacity(num_instruments);
    for _ in 0..num_instruments {
        instrument_offsets.push(read_u16(&mut cursor)? as usize * 16);
    }
    let mut pattern_offsets = Vec::with_capacity(num_patterns);
    for _ in 0..num_patterns {
        pattern_offsets.push(read_u16(&mut cursor)? as usize * 16);
    }
    let pan_table = if default_pan == PAN_TABLE_PRESENT {
        Some(read_array::<32>(&mut cursor)?)
    } else {
        None
    };

    // Enabled channels (0-15) are compacted into pattern columns
    let mut channel_map = [None; 32];
    let mut channels = Vec::new();
    let stereo = master_volume & 0x80 != 0;
    for (index, &setting) in channel_settings.iter().enumerate() {
        if setting >= 16 {
            continue;
        }
        let mut pan = match (stereo, setting < 8) {
            (false, _) => 128,
            (true, true) => 0x3 * 17,
            (true, false) => 0xC * 17,
        };
        if let Some(table) = pan_table
            && table[index] & 0x20 != 0
        {
            pan = (table[index] & 0x0F) * 17;
        }
        channel_map[index] = Some(channels.len());
        channels.push(ChannelSettings {
            pan,
            ..Default::default()
        });
    }
    if channels.is_empty() {
        return Err(LoadError::InvalidHeader("no enabled channels"));
    }

    let unsigned_samples = sample_format == 2;
    let mut samples = Vec::with_capacity(num_instruments);
    for (index, &offset) in instrument_offsets.iter().enumerate() {
        let sample = parse_sample(data, offset, unsigned_samples)
            .map_err(|_| LoadError::InvalidSample(index as u16))?;
        samples.push(sample);
    }

    let mut patterns = Vec::with_capacity(num_patterns);
    for (index, &offset) in pattern_offsets.iter().enumerate() {
        if offset == 0 {
            patterns.push(Pattern::empty(ROWS, channels.len()));
            continue;
        }
        let pattern = parse_pattern(data, offset, &channel_map, channels.len())
            .map_err(|_| LoadError::InvalidPattern(index as u16))?;
        patterns.push(pattern);
    }

    let instruments = samples
        .iter()
        .enumerate()
        .map(|(i, s)| Instrument::for_sample(&s.name, (i + 1).min(255) as u8))
        .collect();

    let mut flags = SongFlags::empty();
    if header_flags & 0x40 != 0 || tracker_version == 0x1300 {
        flags.insert(SongFlags::FAST_VOLUME_SLIDES);
    }
    if header_flags & 0x10 != 0 {
        flags.insert(SongFlags::AMIGA_LIMITS);
    }

    Ok(Song {
        title,
        format: SongFormat::ScreamTracker3,
        tracker: tracker_name(tracker_version),
        flags,
        initial_speed: if initial_speed == 0 || initial_speed == 255 {
            6
        } else {
            initial_speed
        },
        initial_tempo: if initial_tempo < 33 { 125 } else { initial_tempo },
        global_volume: (global_volume.min(64)) * 2,
        mix_volume: (master_volume & 0x7F).max(16),
        restart_position: 0,
        orders,
        patterns,
        instruments,
        samples,
        channels,
        message: String::new(),
    })
}

fn tracker_name(version: u16) -> String {
    match version >> 12 {
        1 => format!("Scream Tracker {}.{:02x}", (version >> 8) & 0x0F, version & 0xFF),
        2 => "Imago Orpheus".to_string(),
        3 => "Impulse Tracker".to_string(),
        4 => "Schism Tracker".to_string(),
        5 => "OpenMPT".to_string(),
        _ => "Unknown".to_string(),
    }
}

fn parse_sample(data: &[u8], offset: usize, unsigned: bool) -> Result<Sample, LoadError> {
    let mut cursor = Cursor::new(data);
    seek_to(&mut cursor, offset as u64)?;
    let kind = read_u8(&mut cursor)?;
    let _filename = read_array::<12>(&mut cursor)?;
    let pointer_high = read_u8(&mut cursor)? as usize;
    let pointer_low = read_u16(&mut cursor)? as usize;
    let length = read_u32(&mut cursor)? as usize;
    let loop_start = read_u32(&mut cursor)?;
    let loop_end = read_u32(&mut cursor)?;
    let volume = read_u8(&mut cursor)?.min(64);
    let _reserved = read_u8(&mut cursor)?;
    let _pack = read_u8(&mut cursor)?;
    let flags = read_u8(&mut cursor)?;
    let c2_speed = read_u32(&mut cursor)?;
    let _reserved = read_array::<12>(&mut cursor)?;
    let name = read_text::<28>(&mut cursor)?;

    // AdLib instruments and empty slots have no PCM
    if kind != 1 {
        return Ok(Sample {
            name,
            volume,
            ..Default::default()
        });
    }

    let is_16bit = flags & 0x04 != 0;
    let bytes_per_frame = if is_16bit { 2 } else { 1 };
    let data_offset = ((pointer_high << 16) | pointer_low) * 16;
    // Stereo samples store the left channel first; only it is played
    let raw = slice_at(data, data_offset, length * bytes_per_frame);
    let pcm: Vec<i16> = if is_16bit {
        raw.chunks_exact(2)
            .map(|b| {
                let v = u16::from_le_bytes([b[0], b[1]]);
                if unsigned { (v ^ 0x8000) as i16 } else { v as i16 }
            })
            .collect()
    } else {
        widen_8bit(
            raw.iter()
                .map(|&b| if unsigned { (b ^ 0x80) as i8 } else { b as i8 }),
        )
    };

    let loop_region = (flags & 0x01 != 0)
        .then(|| SampleLoop::new(loop_start, loop_end, false, pcm.len()))
        .flatten();

    Ok(Sample {
        name,
        data: pcm,
        loop_region,
        volume,
        c5_speed: if c2_speed == 0 { 8363 } else { c2_speed },
        ..Default::default()
    })
}

fn parse_pattern(
    data: &[u8],
    offset: usize,
    channel_map: &[Option<usize>; 32],
    num_channels: usize,
) -> Result<Pattern, LoadError> {
    let mut cursor = Cursor::new(data);
    seek_to(&mut cursor, offset as u64)?;
    let _packed_length = read_u16(&mut cursor)?;
    let mut pattern = Pattern::empty(ROWS, num_channels);

    let mut row = 0usize;
    while row < ROWS as usize {
        let what = read_u8(&mut cursor)?;
        if what == 0 {
            row += 1;
            continue;
        }
        let mut note = Note::default();
        if what & 0x20 != 0 {
            note.note = convert_note(read_u8(&mut cursor)?);
            note.instrument = read_u8(&mut cursor)?;
        }
        if what & 0x40 != 0 {
            let volume = read_u8(&mut cursor)?;
            if volume <= 64 {
                note.volume = VolumeCommand::SetVolume(volume);
            }
        }
        if what & 0x80 != 0 {
            let command = read_u8(&mut cursor)?;
            let param = read_u8(&mut cursor)?;
            note.effect = convert_effect(command, param, SongFormat::ScreamTracker3);
        }
        if let Some(column) = channel_map[(what & 0x1F) as usize] {
            pattern.notes[row][column] = note;
        }
    }
    Ok(pattern)
}

/// Convert an S3M note byte (high nibble octave, low nibble semitone)
fn convert_note(value: u8) -> u8 {
    match value {
        255 => 0,
        254 => Note::NOTE_CUT,
        _ => {
            let key = (value >> 4) as usize * 12 + (value & 0x0F) as usize + 12;
            if (value & 0x0F) < 12 && key < 120 {
                key as u8 + 1
            } else {
                0
            }
        }
    }
}

/// Convert an S3M/IT effect letter (A = 1) and parameter
pub(crate) fn convert_effect(command: u8, param: u8, format: SongFormat) -> Effect {
    let is_it = format == SongFormat::ImpulseTracker;
    let x = param >> 4;
    let y = param & 0x0F;
    match command {
        1 if param > 0 => Effect::SetSpeed(param),
        2 => Effect::PositionJump(param),
        // Cxx is decimal in S3M and plain hex in IT
        3 if is_it => Effect::PatternBreak(param),
        3 => Effect::PatternBreak((x * 10 + y).min(63)),
        4 => Effect::VolumeSlide(param),
        5 => Effect::PortamentoDown(param),
        6 => Effect::PortamentoUp(param),
        7 => Effect::TonePortamento(param),
        8 => Effect::Vibrato(param),
        9 => Effect::Tremor(param),
        10 => Effect::Arpeggio(param),
        11 => Effect::VibratoVolSlide(param),
        12 => Effect::TonePortaVolSlide(param),
        13 => Effect::SetChannelVolume(param.min(64)),
        14 => Effect::ChannelVolumeSlide(param),
        15 => Effect::SampleOffset(param),
        16 => Effect::PanningSlide(param),
        17 => Effect::Retrigger(param),
        18 => Effect::Tremolo(param),
        19 => match x {
            0x1 => Effect::Glissando(y != 0),
            0x2 => Effect::SetFinetune(((y << 4) as i8) >> 4),
            0x3 => Effect::VibratoWaveform(y),
            0x4 => Effect::TremoloWaveform(y),
            0x5 => Effect::PanbrelloWaveform(y),
            0x6 => Effect::FinePatternDelay(y),
            0x7 => Effect::InstrumentControl(y),
            0x8 => Effect::SetPanning(y * 17),
            0xA if is_it => Effect::HighSampleOffset(y),
            0xB => Effect::PatternLoop(y),
            0xC => Effect::NoteCut(y),
            0xD => Effect::NoteDelay(y),
            0xE => Effect::PatternDelay(y),
            _ => Effect::None,
        },
        20 if param >= 0x20 => Effect::SetTempo(param),
        20 => Effect::TempoSlide(param),
        21 => Effect::FineVibrato(param),
        22 if is_it => Effect::SetGlobalVolume(param.min(128)),
        22 => Effect::SetGlobalVolume(param.min(64) * 2),
        23 => Effect::GlobalVolumeSlide(param),
        24 if is_it => Effect::SetPanning(param),
        24 if param <= 0x80 => Effect::SetPanning((param as u16 * 2).min(255) as u8),
        25 => Effect::Panbrello(param),
        _ => Effect::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_note() {
        // C-4 plays the sample at its base rate
        assert_eq!(convert_note(0x50), 73);
        assert_eq!(convert_note(0x40), 61);
        assert_eq!(convert_note(255), 0);
        assert_eq!(convert_note(254), Note::NOTE_CUT);
        assert_eq!(convert_note(0x4C), 0);
    }

    #[test]
    fn test_pattern_break_decimal_vs_hex() {
        assert_eq!(
            convert_effect(3, 0x10, SongFormat::ScreamTracker3),
            Effect::PatternBreak(10)
        );
        assert_eq!(
            convert_effect(3, 0x10, SongFormat::ImpulseTracker),
            Effect::PatternBreak(16)
        );
    }

    #[test]
    fn test_global_volume_scaling() {
        assert_eq!(
            convert_effect(22, 0x40, SongFormat::ScreamTracker3),
            Effect::SetGlobalVolume(128)
        );
        assert_eq!(
            convert_effect(22, 0x40, SongFormat::ImpulseTracker),
            Effect::SetGlobalVolume(64)
        );
    }

    #[test]
    fn test_tempo_and_tempo_slide() {
        assert_eq!(
            convert_effect(20, 0x80, SongFormat::ImpulseTracker),
            Effect::SetTempo(0x80)
        );
        assert_eq!(
            convert_effect(20, 0x12, SongFormat::ImpulseTracker),
            Effect::TempoSlide(0x12)
        );
    }

    #[test]
    fn test_special_commands() {
        assert_eq!(
            convert_effect(19, 0xB2, SongFormat::ScreamTracker3),
            Effect::PatternLoop(2)
        );
        assert_eq!(
            convert_effect(19, 0xA1, SongFormat::ScreamTracker3),
            Effect::None
        );
        assert_eq!(
            convert_effect(19, 0xA1, SongFormat::ImpulseTracker),
            Effect::HighSampleOffset(1)
        );
    }

    #[test]
    fn test_speed_zero_ignored() {
        assert_eq!(
            convert_effect(1, 0, SongFormat::ScreamTracker3),
            Effect::None
        );
    }

    #[test]
    fn test_is_s3m() {
        let mut data = vec![0u8; 0x60];
        assert!(!is_s3m(&data));
        data[0x2C..0x30].copy_from_slice(S3M_MAGIC);
        assert!(is_s3m(&data));
    }
}
