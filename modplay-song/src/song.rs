//! Unified song model shared by every loader

use crate::effects::{Effect, VolumeCommand};

/// Order table entry that is skipped during playback ("+++")
pub const ORDER_SKIP: u8 = 254;
/// Order table entry that ends the song ("---")
pub const ORDER_END: u8 = 255;

/// Maximum number of pattern channels
pub const MAX_CHANNELS: usize = 64;

/// Number of semitones addressable by a note (C-0 to B-9)
pub const NOTE_RANGE: usize = 120;

/// Note index that plays a sample at its C-5 speed
pub const MIDDLE_C: u8 = 60;

/// Source format of a loaded song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongFormat {
    /// ProTracker and compatible 4-32 channel MODs
    ProTracker,
    /// Scream Tracker 3
    ScreamTracker3,
    /// FastTracker II extended module
    FastTracker2,
    /// Impulse Tracker
    ImpulseTracker,
}

impl SongFormat {
    /// Short format name shown to users
    pub fn short_name(self) -> &'static str {
        match self {
            Self::ProTracker => "MOD",
            Self::ScreamTracker3 => "S3M",
            Self::FastTracker2 => "XM",
            Self::ImpulseTracker => "IT",
        }
    }

    /// S3M and IT share effect-parameter conventions (fine slides in the
    /// parameter nibbles, shared memories)
    pub fn uses_s3m_effects(self) -> bool {
        matches!(self, Self::ScreamTracker3 | Self::ImpulseTracker)
    }
}

/// Format-specific playback flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SongFlags(u16);

impl SongFlags {
    /// Use linear frequency slides (vs Amiga periods)
    pub const LINEAR_SLIDES: Self = Self(0x0001);
    /// Instruments drive note playback (vs samples-only mode)
    pub const INSTRUMENTS: Self = Self(0x0002);
    /// Old effects (IT: vibrato depth and sample offset behave like S3M)
    pub const OLD_EFFECTS: Self = Self(0x0004);
    /// Link G memory with E/F for portamento
    pub const LINK_G_MEMORY: Self = Self(0x0008);
    /// S3M fast volume slides (slide on tick 0 too)
    pub const FAST_VOLUME_SLIDES: Self = Self(0x0010);
    /// Clamp periods to the Amiga hardware range
    pub const AMIGA_LIMITS: Self = Self(0x0020);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for SongFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Initial state of one pattern channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Initial panning (0 = left, 128 = center, 255 = right)
    pub pan: u8,
    /// Initial channel volume (0-64)
    pub volume: u8,
    /// Channel starts muted
    pub muted: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            pan: 128,
            volume: 64,
            muted: false,
        }
    }
}

/// A loaded tracker song, independent of its source format
#[derive(Debug, Clone)]
pub struct Song {
    /// Song title (may be empty)
    pub title: String,
    /// Source format
    pub format: SongFormat,
    /// Tracker that wrote the file, when the header says
    pub tracker: String,
    /// Playback flags
    pub flags: SongFlags,
    /// Initial speed (ticks per row)
    pub initial_speed: u8,
    /// Initial tempo (BPM)
    pub initial_tempo: u8,
    /// Initial global volume (0-128)
    pub global_volume: u8,
    /// Mixing volume (0-128, 48 plays at unity gain)
    pub mix_volume: u8,
    /// Order to continue from when the song wraps
    pub restart_position: u16,
    /// Pattern order table (may contain `ORDER_SKIP` and `ORDER_END`)
    pub orders: Vec<u8>,
    /// Pattern data
    pub patterns: Vec<Pattern>,
    /// Instruments (samples-only formats get one per sample)
    pub instruments: Vec<Instrument>,
    /// Sample headers and decoded PCM
    pub samples: Vec<Sample>,
    /// Per-channel initial settings (`len()` is the channel count)
    pub channels: Vec<ChannelSettings>,
    /// Song message (may be empty)
    pub message: String,
}

impl Song {
    /// Number of pattern channels
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Get the pattern at the given order position
    pub fn pattern_at_order(&self, order: usize) -> Option<&Pattern> {
        let index = *self.orders.get(order)?;
        if index >= ORDER_SKIP {
            return None;
        }
        self.patterns.get(index as usize)
    }

    /// Rows in the pattern played at `order` (missing patterns count as 64 empty rows)
    pub fn rows_at_order(&self, order: usize) -> u16 {
        self.pattern_at_order(order).map_or(64, |p| p.num_rows)
    }

    /// Check if linear frequency slides are used (vs Amiga)
    pub fn uses_linear_slides(&self) -> bool {
        self.flags.contains(SongFlags::LINEAR_SLIDES)
    }

    /// Check if this song uses instruments (vs samples-only)
    pub fn uses_instruments(&self) -> bool {
        self.flags.contains(SongFlags::INSTRUMENTS)
    }
}

// =============================================================================
// Pattern Data
// =============================================================================

/// Tracker pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Number of rows (1-256)
    pub num_rows: u16,
    /// Note data: [row][channel]
    pub notes: Vec<Vec<Note>>,
}

impl Pattern {
    /// Get note at specific row and channel
    pub fn note(&self, row: u16, channel: usize) -> Option<&Note> {
        self.notes.get(row as usize)?.get(channel)
    }

    /// Create an empty pattern
    pub fn empty(num_rows: u16, num_channels: usize) -> Self {
        Self {
            num_rows,
            notes: vec![vec![Note::default(); num_channels]; num_rows as usize],
        }
    }
}

/// Single cell of a pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Note {
    /// 0 = none, 1-120 = note index + 1, or one of the note actions
    pub note: u8,
    /// Instrument number (1-based, 0 = none)
    pub instrument: u8,
    /// Volume column
    pub volume: VolumeCommand,
    /// Effect column
    pub effect: Effect,
}

impl Note {
    pub const NOTE_FADE: u8 = 253;
    pub const NOTE_CUT: u8 = 254;
    pub const NOTE_OFF: u8 = 255;

    /// Semitone index (0-119) of a playable note
    pub fn key(&self) -> Option<u8> {
        (1..=NOTE_RANGE as u8)
            .contains(&self.note)
            .then(|| self.note - 1)
    }

    pub fn is_note_off(&self) -> bool {
        self.note == Self::NOTE_OFF
    }

    pub fn is_note_cut(&self) -> bool {
        self.note == Self::NOTE_CUT
    }

    pub fn is_note_fade(&self) -> bool {
        self.note == Self::NOTE_FADE
    }

    pub fn has_instrument(&self) -> bool {
        self.instrument > 0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// Instruments
// =============================================================================

/// New Note Action (what happens to a playing note when a new one starts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewNoteAction {
    #[default]
    Cut,
    Continue,
    NoteOff,
    NoteFade,
}

impl NewNoteAction {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Continue,
            2 => Self::NoteOff,
            3 => Self::NoteFade,
            _ => Self::Cut,
        }
    }
}

/// Duplicate check type (IT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateCheck {
    #[default]
    Off,
    Note,
    Sample,
    Instrument,
}

impl DuplicateCheck {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Note,
            2 => Self::Sample,
            3 => Self::Instrument,
            _ => Self::Off,
        }
    }
}

/// Duplicate check action (IT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateAction {
    #[default]
    Cut,
    NoteOff,
    NoteFade,
}

impl DuplicateAction {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::NoteOff,
            2 => Self::NoteFade,
            _ => Self::Cut,
        }
    }
}

/// Unified instrument
#[derive(Debug, Clone)]
pub struct Instrument {
    /// Instrument name
    pub name: String,
    /// Note→sample mapping: (played note index, sample number 1-based, 0 = none)
    pub keymap: [(u8, u8); NOTE_RANGE],
    /// Volume envelope (values 0-64)
    pub volume_envelope: Option<Envelope>,
    /// Panning envelope (values -32..=32)
    pub panning_envelope: Option<Envelope>,
    /// Pitch envelope (values -32..=32 half-semitones)
    pub pitch_envelope: Option<Envelope>,
    /// Fadeout subtracted per tick from a 0-65536 fade level after key-off
    pub fadeout: u32,
    /// Instrument global volume (0-128)
    pub global_volume: u8,
    /// Default panning (0-255), overrides the channel pan on note start
    pub default_pan: Option<u8>,
    pub new_note_action: NewNoteAction,
    pub duplicate_check: DuplicateCheck,
    pub duplicate_action: DuplicateAction,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: String::new(),
            keymap: identity_keymap(0),
            volume_envelope: None,
            panning_envelope: None,
            pitch_envelope: None,
            fadeout: 0,
            global_volume: 128,
            default_pan: None,
            new_note_action: NewNoteAction::Cut,
            duplicate_check: DuplicateCheck::Off,
            duplicate_action: DuplicateAction::Cut,
        }
    }
}

impl Instrument {
    /// Instrument that plays one sample over the whole keyboard
    pub fn for_sample(name: &str, sample: u8) -> Self {
        Self {
            name: name.to_string(),
            keymap: identity_keymap(sample),
            ..Default::default()
        }
    }

    /// Resolve a played note to (note to play, sample index 0-based)
    pub fn map_note(&self, key: u8) -> Option<(u8, usize)> {
        let &(note, sample) = self.keymap.get(key as usize)?;
        if sample == 0 {
            return None;
        }
        Some((note.min(NOTE_RANGE as u8 - 1), sample as usize - 1))
    }
}

fn identity_keymap(sample: u8) -> [(u8, u8); NOTE_RANGE] {
    let mut keymap = [(0u8, sample); NOTE_RANGE];
    for (i, entry) in keymap.iter_mut().enumerate() {
        entry.0 = i as u8;
    }
    keymap
}

/// Unified envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope points: (tick, value)
    pub points: Vec<(u16, i8)>,
    /// Loop range as point indices
    pub loop_range: Option<(u8, u8)>,
    /// Sustain range as point indices (XM sustain points use begin == end)
    pub sustain_range: Option<(u8, u8)>,
}

impl Envelope {
    /// Tick of the point at `index`
    pub fn tick_of(&self, index: u8) -> Option<u16> {
        self.points.get(index as usize).map(|&(tick, _)| tick)
    }

    /// Loop range in ticks
    pub fn loop_ticks(&self) -> Option<(u16, u16)> {
        let (begin, end) = self.loop_range?;
        Some((self.tick_of(begin)?, self.tick_of(end)?))
    }

    /// Sustain range in ticks
    pub fn sustain_ticks(&self) -> Option<(u16, u16)> {
        let (begin, end) = self.sustain_range?;
        Some((self.tick_of(begin)?, self.tick_of(end)?))
    }

    /// Tick of the last point
    pub fn last_tick(&self) -> u16 {
        self.points.last().map_or(0, |&(tick, _)| tick)
    }

    /// Get interpolated value at a given tick
    pub fn value_at(&self, tick: u16) -> f32 {
        let Some(&(first_tick, first_value)) = self.points.first() else {
            return 0.0;
        };
        if tick <= first_tick {
            return first_value as f32;
        }

        for pair in self.points.windows(2) {
            let (x1, y1) = pair[0];
            let (x2, y2) = pair[1];
            if tick >= x1 && tick < x2 {
                let t = (tick - x1) as f32 / (x2 - x1) as f32;
                return y1 as f32 + (y2 as f32 - y1 as f32) * t;
            }
        }

        // Past the last point
        self.points.last().map_or(0.0, |&(_, y)| y as f32)
    }

    /// Drop points whose ticks go backwards and clamp indices into range
    pub(crate) fn sanitized(mut self) -> Option<Self> {
        let mut last = 0u16;
        let mut keep = 0;
        for (i, &(tick, _)) in self.points.iter().enumerate() {
            if i > 0 && tick <= last {
                break;
            }
            last = tick;
            keep = i + 1;
        }
        self.points.truncate(keep);
        if self.points.is_empty() {
            return None;
        }
        let max = self.points.len() as u8 - 1;
        let valid = |(b, e): (u8, u8)| (b <= e && e <= max).then_some((b, e));
        self.loop_range = self.loop_range.and_then(valid);
        self.sustain_range = self.sustain_range.and_then(valid);
        Some(self)
    }
}

// =============================================================================
// Samples
// =============================================================================

/// Sample loop region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLoop {
    /// First frame of the loop
    pub start: u32,
    /// One past the last frame of the loop
    pub end: u32,
    /// Bidirectional loop
    pub ping_pong: bool,
}

impl SampleLoop {
    /// Build a loop, rejecting empty or out-of-range regions
    pub fn new(start: u32, end: u32, ping_pong: bool, length: usize) -> Option<Self> {
        let end = end.min(length as u32);
        (start < end).then_some(Self {
            start,
            end,
            ping_pong,
        })
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Instrument auto-vibrato (applied to every note of the sample)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoVibrato {
    /// Waveform (0 = sine, 1 = ramp down, 2 = square, 3 = random)
    pub waveform: u8,
    /// Position increment per tick
    pub speed: u8,
    /// Depth
    pub depth: u8,
    /// Ticks to reach full depth (0 = immediate)
    pub sweep: u8,
}

/// Unified sample with decoded PCM
#[derive(Debug, Clone)]
pub struct Sample {
    /// Sample name
    pub name: String,
    /// Decoded mono PCM
    pub data: Vec<i16>,
    /// Main loop
    pub loop_region: Option<SampleLoop>,
    /// Sustain loop, used until key-off (IT)
    pub sustain_loop: Option<SampleLoop>,
    /// Default volume (0-64)
    pub volume: u8,
    /// Sample global volume (0-64)
    pub global_volume: u8,
    /// Default panning (0-255), if the sample sets one
    pub pan: Option<u8>,
    /// Playback rate of note C-5
    pub c5_speed: u32,
    /// Auto-vibrato settings
    pub vibrato: AutoVibrato,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: String::new(),
            data: Vec::new(),
            loop_region: None,
            sustain_loop: None,
            volume: 64,
            global_volume: 64,
            pan: None,
            c5_speed: 8363,
            vibrato: AutoVibrato::default(),
        }
    }
}

/// C-5 speed of a sample tuned by semitones and 1/128 semitone steps
pub fn tuned_c5_speed(relative_note: i8, finetune: i8) -> u32 {
    let semitones = relative_note as f64 + finetune as f64 / 128.0;
    (8363.0 * (semitones / 12.0).exp2()).round().clamp(1.0, 1_000_000.0) as u32
}

/// Widen 8-bit PCM to 16-bit
pub(crate) fn widen_8bit(data: impl IntoIterator<Item = i8>) -> Vec<i16> {
    data.into_iter().map(|s| (s as i16) << 8).collect()
}
