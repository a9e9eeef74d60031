//! Unified effect commands
//!
//! Every loader converts its effect column into [`Effect`] and its volume
//! column into [`VolumeCommand`]. Parameters stay in their raw byte form
//! where ProTracker/FastTracker and Scream Tracker/Impulse Tracker read the
//! same byte differently (volume slides, pitch slides, panning slides); the
//! player interprets those using the song format.

/// Unified effect column command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    /// No effect
    #[default]
    None,

    // =========================================================================
    // Speed and Tempo
    // =========================================================================
    /// Set speed (ticks per row)
    /// MOD/XM: Fxx (param < 0x20), S3M/IT: Axx
    SetSpeed(u8),

    /// Set tempo (BPM)
    /// MOD/XM: Fxx (param >= 0x20), S3M/IT: Txx (param >= 0x20)
    SetTempo(u8),

    /// Tempo slide (IT T0x down, T1x up), raw parameter
    TempoSlide(u8),

    // =========================================================================
    // Pattern Flow Control
    // =========================================================================
    /// Jump to order position
    /// MOD/XM: Bxx, S3M/IT: Bxx
    PositionJump(u8),

    /// Break to row in next pattern (row already decoded from BCD where needed)
    /// MOD/XM: Dxx, S3M/IT: Cxx
    PatternBreak(u8),

    /// Pattern loop (0 = set loop start)
    /// MOD/XM: E6x, S3M/IT: SBx
    PatternLoop(u8),

    /// Repeat the row x times
    /// MOD/XM: EEx, S3M/IT: SEx
    PatternDelay(u8),

    /// Add x ticks to the row (IT S6x)
    FinePatternDelay(u8),

    // =========================================================================
    // Volume Effects
    // =========================================================================
    /// Set note volume (0-64)
    SetVolume(u8),

    /// Volume slide, raw parameter
    /// MOD/XM: Axy, S3M/IT: Dxy (with DxF/DFx fine slides)
    VolumeSlide(u8),

    /// Fine volume slide up (tick 0 only)
    FineVolumeUp(u8),

    /// Fine volume slide down (tick 0 only)
    FineVolumeDown(u8),

    /// Global volume (0-128 after conversion)
    /// XM: Gxx, S3M/IT: Vxx
    SetGlobalVolume(u8),

    /// Global volume slide, raw parameter
    /// XM: Hxy, IT: Wxy
    GlobalVolumeSlide(u8),

    /// Channel volume (IT Mxx, 0-64)
    SetChannelVolume(u8),

    /// Channel volume slide, raw parameter (IT Nxy)
    ChannelVolumeSlide(u8),

    /// Tremolo, raw parameter
    /// MOD/XM: 7xy, S3M/IT: Rxy
    Tremolo(u8),

    /// Tremor, raw parameter
    /// XM: Txy, S3M/IT: Ixy
    Tremor(u8),

    // =========================================================================
    // Pitch Effects
    // =========================================================================
    /// Arpeggio, raw parameter
    /// MOD/XM: 0xy, S3M/IT: Jxy
    Arpeggio(u8),

    /// Pitch slide up, raw parameter
    /// MOD/XM: 1xx, S3M/IT: Fxx (FFx fine, FEx extra fine)
    PortamentoUp(u8),

    /// Pitch slide down, raw parameter
    /// MOD/XM: 2xx, S3M/IT: Exx (EFx fine, EEx extra fine)
    PortamentoDown(u8),

    /// Fine pitch slide up (MOD/XM E1x)
    FinePortamentoUp(u8),

    /// Fine pitch slide down (MOD/XM E2x)
    FinePortamentoDown(u8),

    /// Extra fine pitch slide up (XM X1x)
    ExtraFinePortamentoUp(u8),

    /// Extra fine pitch slide down (XM X2x)
    ExtraFinePortamentoDown(u8),

    /// Slide toward the note
    /// MOD/XM: 3xx, S3M/IT: Gxx
    TonePortamento(u8),

    /// Tone portamento + volume slide (raw volume slide parameter)
    /// MOD/XM: 5xy, S3M/IT: Lxy
    TonePortaVolSlide(u8),

    /// Vibrato, raw parameter
    /// MOD/XM: 4xy, S3M/IT: Hxy
    Vibrato(u8),

    /// Fine vibrato, raw parameter (S3M/IT Uxy)
    FineVibrato(u8),

    /// Vibrato + volume slide (raw volume slide parameter)
    /// MOD/XM: 6xy, S3M/IT: Kxy
    VibratoVolSlide(u8),

    /// Set glissando (MOD/XM E3x, S3M/IT S1x)
    Glissando(bool),

    /// Override sample finetune (MOD/XM E5x, S3M S2x), signed 1/8 semitones
    SetFinetune(i8),

    // =========================================================================
    // Panning Effects
    // =========================================================================
    /// Set panning (0-255)
    /// MOD/XM: 8xx / E8x, S3M/IT: Xxx / S8x
    SetPanning(u8),

    /// Panning slide, raw parameter
    /// XM: Pxy, IT: Pxy (nibbles swapped meaning, fine forms)
    PanningSlide(u8),

    /// Panbrello, raw parameter (IT Yxy)
    Panbrello(u8),

    // =========================================================================
    // Sample Effects
    // =========================================================================
    /// Start sample at param * 256 (0 = memory)
    /// MOD/XM: 9xx, S3M/IT: Oxx
    SampleOffset(u8),

    /// High byte of the next sample offset (IT SAx)
    HighSampleOffset(u8),

    /// Retrigger, raw parameter
    /// MOD/XM: E9x (converted to 0x0x), XM: Rxy, S3M/IT: Qxy
    Retrigger(u8),

    /// Cut note at tick x
    /// MOD/XM: ECx, S3M/IT: SCx
    NoteCut(u8),

    /// Delay note until tick x
    /// MOD/XM: EDx, S3M/IT: SDx
    NoteDelay(u8),

    /// Release the note at tick x (XM Kxx)
    KeyOff(u8),

    /// Set envelope position (XM Lxx)
    SetEnvelopePosition(u8),

    /// Past-note / envelope control (IT S7x), raw nibble
    InstrumentControl(u8),

    // =========================================================================
    // Waveform Control
    // =========================================================================
    /// MOD/XM: E4x, S3M/IT: S3x
    VibratoWaveform(u8),
    /// MOD/XM: E7x, S3M/IT: S4x
    TremoloWaveform(u8),
    /// IT: S5x
    PanbrelloWaveform(u8),
}

/// Unified volume column command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeCommand {
    /// Empty volume column
    #[default]
    None,
    /// Set note volume (0-64)
    SetVolume(u8),
    /// Slide volume up every tick but the first
    SlideUp(u8),
    /// Slide volume down every tick but the first
    SlideDown(u8),
    /// Fine volume slide up (tick 0)
    FineUp(u8),
    /// Fine volume slide down (tick 0)
    FineDown(u8),
    /// Set vibrato speed (XM)
    VibratoSpeed(u8),
    /// Vibrato with depth (XM Vx / IT Hx)
    VibratoDepth(u8),
    /// Set panning (0-255)
    SetPanning(u8),
    /// Slide panning left (XM)
    PanSlideLeft(u8),
    /// Slide panning right (XM)
    PanSlideRight(u8),
    /// Tone portamento (speed already scaled to effect units)
    TonePortamento(u8),
    /// Pitch slide up (IT, effect units)
    PortamentoUp(u8),
    /// Pitch slide down (IT, effect units)
    PortamentoDown(u8),
}
