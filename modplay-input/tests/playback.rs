//! Plugin scenarios driven through the host traits
//!
//! Modules are assembled in memory; playback goes to a recording sink.

use std::sync::Arc;

use modplay_input::plugin::{INTERPOLATOR, PANNING_AMPLITUDE, SECTION, STEREO_SEPARATION};
use modplay_input::{
    ConfigStore, InputPlugin, MemoryConfig, MemoryFile, ModulePlugin, ModuleWrap, OpenError,
    Playback, SampleFormat, TrackInfo, VfsFile, WidgetBinding,
};
use modplay_song::testing::{ModBuilder, XmBuilder, square_wave};

// =============================================================================
// Fixtures
// =============================================================================

/// Two-order MOD titled "Demo"
fn demo_mod() -> Vec<u8> {
    ModBuilder::new(4)
        .title("Demo")
        .sample("square", [80i8, 80, -80, -80].repeat(16), 64, Some((0, 64)))
        .patterns(2)
        .orders(&[0, 1])
        .note(0, 0, 0, 60, 1)
        .note(1, 0, 1, 67, 1)
        .build()
}

/// XM of about 1 MiB (one long looped instrument)
fn large_xm() -> Vec<u8> {
    XmBuilder::new(2)
        .instrument("long", square_wave(512 * 1024, 6000), Some((0, 512 * 1024)))
        .patterns(2, 16)
        .orders(&[0, 1])
        .note(0, 0, 0, 60, 1)
        .note(1, 0, 1, 55, 1)
        .build()
}

fn plugin() -> (ModulePlugin, Arc<MemoryConfig>) {
    let config = Arc::new(MemoryConfig::new());
    let plugin = ModulePlugin::new(config.clone());
    plugin.init();
    (plugin, config)
}

/// Virtual file that must not be read
struct UnreadableFile;

impl VfsFile for UnreadableFile {
    fn read_all(&mut self) -> Result<Vec<u8>, OpenError> {
        Err(OpenError::Io(std::io::Error::other("no virtual file")))
    }
}

/// Sink that keeps every frame and replays scripted stop and seek requests
#[derive(Default)]
struct RecordingPlayback {
    opened: Vec<(SampleFormat, u32, u32)>,
    frames: Vec<Vec<u8>>,
    /// Stop once this many frames were written
    stop_after: Option<usize>,
    /// (frames written, seek target); requests due at the same time coalesce
    seeks: Vec<(usize, u32)>,
    /// Settings change made right after a frame is written
    change: Option<(usize, Arc<MemoryConfig>, WidgetBinding, i32)>,
}

impl RecordingPlayback {
    fn bytes_written(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }
}

impl Playback for RecordingPlayback {
    fn open_audio(&mut self, format: SampleFormat, rate: u32, channels: u32) {
        self.opened.push((format, rate, channels));
    }

    fn write_audio(&mut self, data: &[u8]) {
        assert!(!self.opened.is_empty(), "write before open");
        self.frames.push(data.to_vec());
        if let Some((at, config, bind, value)) = &self.change
            && self.frames.len() == *at
        {
            config.set_int(bind.section, bind.key, *value);
            bind.notify();
        }
    }

    fn check_stop(&mut self) -> bool {
        self.stop_after.is_some_and(|n| self.frames.len() >= n)
    }

    fn check_seek(&mut self) -> Option<u32> {
        let written = self.frames.len();
        let due: Vec<u32> = self
            .seeks
            .iter()
            .filter(|(at, _)| *at <= written)
            .map(|(_, ms)| *ms)
            .collect();
        self.seeks.retain(|(at, _)| *at > written);
        due.last().copied()
    }
}

fn frame_bytes(wrap: &mut ModuleWrap) -> Vec<u8> {
    wrap.play_frame().bytes.to_vec()
}

/// Every remaining frame of a direct render
fn remaining_frames(wrap: &mut ModuleWrap) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    loop {
        let frame = frame_bytes(wrap);
        if frame.is_empty() {
            return frames;
        }
        frames.push(frame);
    }
}

fn widget_binding(plugin: &ModulePlugin, key: &str) -> WidgetBinding {
    plugin
        .preferences()
        .into_iter()
        .find(|w| w.binding().key == key)
        .map(|w| w.binding().clone())
        .unwrap()
}

// =============================================================================
// Identification and metadata
// =============================================================================

#[test]
fn test_local_module_tags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.mod");
    std::fs::write(&path, demo_mod()).unwrap();
    let identifier = path.to_str().unwrap();
    let (plugin, _) = plugin();

    assert!(plugin.is_our_file(identifier, &mut UnreadableFile));

    let mut tuple = TrackInfo::default();
    assert!(plugin.read_tag(identifier, &mut UnreadableFile, &mut tuple));
    assert_eq!(tuple.filename.as_deref(), Some(identifier));
    assert_eq!(tuple.format.as_deref(), Some("MOD"));
    assert_eq!((tuple.channels, tuple.rate, tuple.bitrate), (2, 44100, 0));
    assert_eq!(tuple.length_ms, Some(2 * 64 * 6 * 20));
    assert_eq!(tuple.title.as_deref(), Some("Demo"));
}

#[test]
fn test_unrecognized_file_leaves_tuple_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "shopping list\n".repeat(200)).unwrap();
    let identifier = path.to_str().unwrap();
    let (plugin, _) = plugin();

    assert!(!ModulePlugin::handles_extension(identifier));
    let mut vfile = MemoryFile::new(std::fs::read(&path).unwrap());
    assert!(!plugin.is_our_file(identifier, &mut vfile));

    let mut tuple = TrackInfo::default();
    assert!(!plugin.read_tag(identifier, &mut vfile, &mut tuple));
    assert_eq!(tuple, TrackInfo::default());
}

#[test]
fn test_vfs_only_matches_local_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.mod");
    std::fs::write(&path, demo_mod()).unwrap();
    let (plugin, _) = plugin();

    let mut local = TrackInfo::default();
    assert!(plugin.read_tag(path.to_str().unwrap(), &mut UnreadableFile, &mut local));

    let remote_id = "sftp://host/demo.mod";
    let mut vfile = MemoryFile::new(demo_mod());
    assert!(plugin.is_our_file(remote_id, &mut vfile));
    let mut remote = TrackInfo::default();
    assert!(plugin.read_tag(remote_id, &mut vfile, &mut remote));

    assert_eq!(remote.filename.as_deref(), Some(remote_id));
    assert_eq!(remote.format, local.format);
    assert_eq!(remote.length_ms, local.length_ms);
    assert_eq!(remote.title, local.title);
}

#[test]
fn test_probe_is_idempotent() {
    let (plugin, config) = plugin();
    let before = config.snapshot();
    let mut vfile = MemoryFile::new(large_xm());
    let results: Vec<bool> = (0..3)
        .map(|_| plugin.is_our_file("http://host/song.xm", &mut vfile))
        .collect();
    assert_eq!(results, vec![true; 3]);
    assert_eq!(config.snapshot(), before);
}

#[test]
fn test_untitled_module_has_no_title() {
    let data = ModBuilder::new(4).patterns(1).build();
    let (plugin, _) = plugin();
    let mut tuple = TrackInfo::default();
    assert!(plugin.read_tag("mem://untitled", &mut MemoryFile::new(data), &mut tuple));
    assert!(tuple.title.is_none());
    assert!(tuple.length_ms.is_some());
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn test_init_twice_keeps_user_values() {
    let (plugin, config) = plugin();
    config.set_int(SECTION, STEREO_SEPARATION, 25);
    config.set_int(SECTION, INTERPOLATOR, 1);
    plugin.init();
    assert_eq!(config.get_int(SECTION, STEREO_SEPARATION), 25);
    assert_eq!(config.get_int(SECTION, INTERPOLATOR), 1);
    assert_eq!(config.get_string(SECTION, "panning_amplitude").as_deref(), Some("50"));
}

// =============================================================================
// Playback
// =============================================================================

#[test]
fn test_remote_module_plays_to_end() {
    let data = large_xm();
    assert!(data.len() >= 1024 * 1024);
    let (plugin, _) = plugin();
    let mut playback = RecordingPlayback::default();

    assert!(plugin.play("https://host/big.xm", &mut MemoryFile::new(data.clone()), &mut playback));
    assert_eq!(playback.opened, vec![(SampleFormat::S16NE, 44100, 2)]);
    // Two 16-row patterns at speed 6
    assert_eq!(playback.frames.len(), 2 * 16 * 6);

    // Bytes written match what the engine synthesized, frame for frame
    let mut wrap = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    let channels = wrap.channels() as usize;
    let mut synthesized = 0;
    loop {
        let frame = wrap.play_frame();
        if frame.is_empty() {
            break;
        }
        synthesized += frame.n * channels * 2;
    }
    assert_eq!(playback.bytes_written(), synthesized);
    assert!(playback.frames.iter().all(|f| f.len() == 882 * 4));
}

#[test]
fn test_oversized_remote_does_not_open_sink() {
    let (plugin, _) = plugin();
    let mut vfile = MemoryFile::new(large_xm()).with_limit(64 * 1024);
    let mut playback = RecordingPlayback::default();
    assert!(!plugin.play("https://host/big.xm", &mut vfile, &mut playback));
    assert!(playback.opened.is_empty());
    assert!(playback.frames.is_empty());
}

#[test]
fn test_live_interpolator_change() {
    let data = large_xm();
    let (plugin, config) = plugin();
    let mut playback = RecordingPlayback {
        change: Some((5, config.clone(), widget_binding(&plugin, INTERPOLATOR), 0)),
        ..Default::default()
    };
    assert!(plugin.play("mem://a.xm", &mut MemoryFile::new(data.clone()), &mut playback));
    assert_eq!(config.get_int(SECTION, INTERPOLATOR), 0);

    // Same render made directly: spline for five frames, then nearest
    let mut wrap = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    let mut expected: Vec<Vec<u8>> = (0..5).map(|_| frame_bytes(&mut wrap)).collect();
    wrap.set_interpolator(0);
    expected.extend(remaining_frames(&mut wrap));
    assert_eq!(playback.frames.len(), expected.len());
    assert!(playback.frames == expected);

    // Without the change the later frames differ
    let mut spline = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    let unchanged: Vec<Vec<u8>> = (0..7).map(|_| frame_bytes(&mut spline)).collect();
    assert_ne!(unchanged[6], playback.frames[6]);
}

#[test]
fn test_stop_request_ends_playback() {
    let (plugin, _) = plugin();
    let mut playback = RecordingPlayback {
        stop_after: Some(40),
        ..Default::default()
    };
    assert!(plugin.play("mem://big.xm", &mut MemoryFile::new(large_xm()), &mut playback));
    assert_eq!(playback.frames.len(), 40);
}

#[test]
fn test_coalesced_seeks_use_latest() {
    let data = demo_mod();
    let (plugin, _) = plugin();
    let mut playback = RecordingPlayback {
        seeks: vec![(3, 1000), (3, 8000)],
        stop_after: Some(6),
        ..Default::default()
    };
    assert!(plugin.play("mem://demo.mod", &mut MemoryFile::new(data.clone()), &mut playback));

    let mut wrap = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    for _ in 0..3 {
        frame_bytes(&mut wrap);
    }
    wrap.seek(8000);
    assert_eq!(wrap.position_ms(), 7680);
    let resumed = frame_bytes(&mut wrap);
    assert!(playback.frames[3] == resumed);
}

#[test]
fn test_stored_panning_amplitude_applies_at_open() {
    let data = demo_mod();
    let (plugin, config) = plugin();
    config.set_int(SECTION, PANNING_AMPLITUDE, 0);
    let mut playback = RecordingPlayback::default();
    assert!(plugin.play("mem://demo.mod", &mut MemoryFile::new(data.clone()), &mut playback));

    let mut centered = ModuleWrap::open_from_memory(&data, Some(0)).unwrap();
    assert!(playback.frames == remaining_frames(&mut centered));

    let mut default = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    assert_ne!(playback.frames[0], frame_bytes(&mut default));
}

#[test]
fn test_panning_amplitude_change_waits_for_next_play() {
    let data = demo_mod();
    let (plugin, config) = plugin();
    let mut playback = RecordingPlayback {
        change: Some((5, config.clone(), widget_binding(&plugin, PANNING_AMPLITUDE), 0)),
        ..Default::default()
    };
    assert!(plugin.play("mem://demo.mod", &mut MemoryFile::new(data.clone()), &mut playback));
    assert_eq!(config.get_int(SECTION, PANNING_AMPLITUDE), 0);

    // The running session keeps the amplitude it opened with
    let mut opened_with = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    assert!(playback.frames == remaining_frames(&mut opened_with));

    // The next session picks up the new value
    let mut next = RecordingPlayback::default();
    assert!(plugin.play("mem://demo.mod", &mut MemoryFile::new(data.clone()), &mut next));
    let mut centered = ModuleWrap::open_from_memory(&data, Some(0)).unwrap();
    assert!(next.frames == remaining_frames(&mut centered));
}

#[test]
fn test_live_stereo_separation_change() {
    let data = demo_mod();
    let (plugin, config) = plugin();
    let mut playback = RecordingPlayback {
        change: Some((5, config.clone(), widget_binding(&plugin, STEREO_SEPARATION), 0)),
        ..Default::default()
    };
    assert!(plugin.play("mem://demo.mod", &mut MemoryFile::new(data.clone()), &mut playback));
    assert_eq!(config.get_int(SECTION, STEREO_SEPARATION), 0);

    // Default separation for five frames, then mono
    let mut wrap = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    let mut expected: Vec<Vec<u8>> = (0..5).map(|_| frame_bytes(&mut wrap)).collect();
    wrap.set_stereo_separation(0);
    expected.extend(remaining_frames(&mut wrap));
    assert_eq!(playback.frames.len(), expected.len());
    assert!(playback.frames == expected);

    let mut unchanged = ModuleWrap::open_from_memory(&data, Some(50)).unwrap();
    let unchanged: Vec<Vec<u8>> = (0..7).map(|_| frame_bytes(&mut unchanged)).collect();
    assert_ne!(unchanged[6], playback.frames[6]);
}
