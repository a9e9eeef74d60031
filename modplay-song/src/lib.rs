//! modplay-song: tracker module loaders and the unified song model
//!
//! Four classic tracker formats are parsed into one format-agnostic [`Song`],
//! so the player only has to know a single representation. Sample data is
//! decoded to 16-bit mono PCM at load time.
//!
//! # Architecture
//!
//! ```text
//! ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐
//! │  .mod  │ │  .s3m  │ │  .xm   │ │  .it   │
//! └───┬────┘ └───┬────┘ └───┬────┘ └───┬────┘
//!     │          │          │          │
//!     └──────────┴────┬─────┴──────────┘
//!                     │  load()  (probes magic bytes)
//!                     ▼
//!     ┌────────────────────────────────────┐
//!     │            Song (unified)          │
//!     │  - orders / patterns (Note cells)  │
//!     │  - instruments (keymap, envelopes) │
//!     │  - samples (i16 PCM, loops)        │
//!     └────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let data = std::fs::read("song.xm")?;
//! let song = modplay_song::load(&data)?;
//! println!("{} ({} channels)", song.title, song.num_channels());
//! ```

mod effects;
mod error;
pub mod it;
pub mod protracker;
mod reader;
pub mod s3m;
mod song;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod xm;

pub use effects::{Effect, VolumeCommand};
pub use error::LoadError;
pub use song::{
    AutoVibrato, ChannelSettings, DuplicateAction, DuplicateCheck, Envelope, Instrument,
    MAX_CHANNELS, MIDDLE_C, NOTE_RANGE, NewNoteAction, Note, ORDER_END, ORDER_SKIP, Pattern,
    Sample, SampleLoop, Song, SongFlags, SongFormat, tuned_c5_speed,
};

/// Identify the format of a module from its leading bytes
pub fn probe(data: &[u8]) -> Option<SongFormat> {
    if xm::is_xm(data) {
        Some(SongFormat::FastTracker2)
    } else if it::is_it(data) {
        Some(SongFormat::ImpulseTracker)
    } else if s3m::is_s3m(data) {
        Some(SongFormat::ScreamTracker3)
    } else if protracker::is_protracker(data) {
        Some(SongFormat::ProTracker)
    } else {
        None
    }
}

/// Load a module of any supported format
pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    let format = probe(data).ok_or(LoadError::UnknownFormat)?;
    let song = match format {
        SongFormat::FastTracker2 => xm::load(data),
        SongFormat::ImpulseTracker => it::load(data),
        SongFormat::ScreamTracker3 => s3m::load(data),
        SongFormat::ProTracker => protracker::load(data),
    }?;
    if song.orders.is_empty() {
        return Err(LoadError::InvalidHeader("empty order list"));
    }
    tracing::debug!(
        format = format.short_name(),
        title = %song.title,
        channels = song.num_channels(),
        patterns = song.patterns.len(),
        samples = song.samples.len(),
        "module loaded"
    );
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ItBuilder, ModBuilder, S3mBuilder, XmBuilder, square_wave};

    fn mod_file() -> Vec<u8> {
        ModBuilder::new(4)
            .title("mod test")
            .sample("lead", vec![64; 64], 48, Some((0, 64)))
            .patterns(2)
            .orders(&[0, 1, 0])
            .note(0, 0, 0, 60, 1)
            .effect(0, 1, 1, 0xF, 3)
            .effect(1, 63, 0, 0xB, 2)
            .build()
    }

    #[test]
    fn test_probe_formats() {
        assert_eq!(probe(&mod_file()), Some(SongFormat::ProTracker));
        assert_eq!(
            probe(&S3mBuilder::new(2).patterns(1).build()),
            Some(SongFormat::ScreamTracker3)
        );
        assert_eq!(
            probe(&XmBuilder::new(2).patterns(1, 64).build()),
            Some(SongFormat::FastTracker2)
        );
        assert_eq!(
            probe(&ItBuilder::new(2).patterns(1, 64).build()),
            Some(SongFormat::ImpulseTracker)
        );
        assert_eq!(probe(b"RIFF....WAVEfmt "), None);
        assert_eq!(probe(&[]), None);
    }

    #[test]
    fn test_load_unknown_format() {
        assert!(matches!(
            load(&[0u8; 2048]),
            Err(LoadError::UnknownFormat)
        ));
    }

    #[test]
    fn test_load_protracker() {
        let song = load(&mod_file()).unwrap();
        assert_eq!(song.title, "mod test");
        assert_eq!(song.format, SongFormat::ProTracker);
        assert_eq!(song.num_channels(), 4);
        assert_eq!(song.orders, vec![0, 1, 0]);
        assert_eq!(song.patterns.len(), 2);
        assert_eq!(song.samples.len(), 31);
        assert_eq!(song.samples[0].data.len(), 64);
        assert_eq!(song.samples[0].volume, 48);
        assert_eq!(song.samples[0].loop_region.unwrap().end, 64);
        assert!(song.samples[1].data.is_empty());

        let cell = song.patterns[0].note(0, 0).unwrap();
        assert_eq!(cell.key(), Some(60));
        assert_eq!(cell.instrument, 1);
        assert_eq!(
            song.patterns[0].note(1, 1).unwrap().effect,
            Effect::SetSpeed(3)
        );
        assert_eq!(
            song.patterns[1].note(63, 0).unwrap().effect,
            Effect::PositionJump(2)
        );
        // LRRL
        let pans: Vec<u8> = song.channels.iter().map(|c| c.pan).collect();
        assert_eq!(pans, vec![0, 255, 255, 0]);
    }

    #[test]
    fn test_load_s3m() {
        let data = S3mBuilder::new(4)
            .speed(4)
            .tempo(150)
            .sample("kick", vec![10, 20, 30, 40], Some((1, 3)))
            .patterns(1)
            .note(0, 2, 3, 60, 1)
            .volume(0, 2, 3, 40)
            .effect(0, 5, 1, 4, 0x0F)
            .build();
        let song = load(&data).unwrap();
        assert_eq!(song.format, SongFormat::ScreamTracker3);
        assert_eq!(song.num_channels(), 4);
        assert_eq!((song.initial_speed, song.initial_tempo), (4, 150));
        assert_eq!(song.global_volume, 128);
        assert_eq!(song.samples[0].data, vec![10 << 8, 20 << 8, 30 << 8, 40 << 8]);
        let region = song.samples[0].loop_region.unwrap();
        assert_eq!((region.start, region.end), (1, 3));

        let cell = song.patterns[0].note(2, 3).unwrap();
        assert_eq!(cell.key(), Some(60));
        assert_eq!(cell.instrument, 1);
        assert_eq!(cell.volume, VolumeCommand::SetVolume(40));
        assert_eq!(
            song.patterns[0].note(5, 1).unwrap().effect,
            Effect::VolumeSlide(0x0F)
        );
        // Left/right alternation from the channel settings
        assert!(song.channels[0].pan < 128);
        assert!(song.channels[1].pan > 128);
    }

    #[test]
    fn test_load_xm() {
        let data = XmBuilder::new(2)
            .speed(3)
            .tempo(140)
            .instrument("pad", square_wave(256, 8000), Some((0, 256)))
            .fadeout(0x200)
            .volume_envelope(&[(0, 64), (10, 32), (20, 0)], Some(1))
            .patterns(2, 32)
            .orders(&[1, 0])
            .note(1, 0, 0, 60, 1)
            .volume(1, 0, 0, 0x30)
            .note_off(1, 8, 0)
            .effect(0, 4, 1, 0xF, 0x08)
            .build();
        let song = load(&data).unwrap();
        assert_eq!(song.format, SongFormat::FastTracker2);
        assert!(song.uses_linear_slides());
        assert!(song.uses_instruments());
        assert_eq!((song.initial_speed, song.initial_tempo), (3, 140));
        assert_eq!(song.orders, vec![1, 0]);
        assert_eq!(song.patterns[1].num_rows, 32);

        assert_eq!(song.samples.len(), 1);
        assert_eq!(song.samples[0].data, square_wave(256, 8000));
        assert_eq!(song.samples[0].c5_speed, 8363);

        let instrument = &song.instruments[0];
        assert_eq!(instrument.fadeout, 0x200);
        assert_eq!(instrument.map_note(60), Some((60, 0)));
        let envelope = instrument.volume_envelope.as_ref().unwrap();
        assert_eq!(envelope.points.len(), 3);
        assert_eq!(envelope.sustain_ticks(), Some((10, 10)));

        let cell = song.patterns[1].note(0, 0).unwrap();
        assert_eq!(cell.key(), Some(60));
        assert_eq!(cell.volume, VolumeCommand::SetVolume(0x20));
        assert!(song.patterns[1].note(8, 0).unwrap().is_note_off());
        assert_eq!(
            song.patterns[0].note(4, 1).unwrap().effect,
            Effect::SetSpeed(8)
        );
    }

    #[test]
    fn test_load_it() {
        let data = ItBuilder::new(3)
            .speed(5)
            .tempo(130)
            .sample(square_wave(128, 4000), Some((0, 128)), None)
            .instrument(1, 2, 64, Some(vec![(0, 64), (8, 0)]))
            .patterns(1, 48)
            .note(0, 0, 2, 48, 1)
            .volume(0, 0, 2, 170)
            .effect(0, 1, 0, 20, 0x90)
            .note_action(0, 4, 2, 255)
            .build();
        let song = load(&data).unwrap();
        assert_eq!(song.format, SongFormat::ImpulseTracker);
        assert!(song.uses_instruments());
        assert!(song.uses_linear_slides());
        // Channel count comes from the highest channel used in patterns
        assert_eq!(song.num_channels(), 3);
        assert_eq!(song.patterns[0].num_rows, 48);
        assert_eq!((song.initial_speed, song.initial_tempo), (5, 130));

        let instrument = &song.instruments[0];
        assert_eq!(instrument.new_note_action, NewNoteAction::NoteOff);
        assert_eq!(instrument.fadeout, 64 << 5);
        assert_eq!(instrument.map_note(48), Some((48, 0)));
        assert!(instrument.volume_envelope.is_some());
        assert_eq!(song.samples[0].data, square_wave(128, 4000));

        let cell = song.patterns[0].note(0, 2).unwrap();
        assert_eq!(cell.key(), Some(48));
        assert_eq!(cell.volume, VolumeCommand::SetPanning(168));
        assert_eq!(
            song.patterns[0].note(1, 0).unwrap().effect,
            Effect::SetTempo(0x90)
        );
        assert!(song.patterns[0].note(4, 2).unwrap().is_note_off());
    }

    #[test]
    fn test_truncated_files_fail_cleanly() {
        let data = mod_file();
        assert!(load(&data[..1084]).is_err());
        let xm = XmBuilder::new(2).patterns(1, 64).build();
        assert!(load(&xm[..100]).is_err());
    }
}
