//! `modplay render` - play a module into a WAV file

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use modplay_input::InputPlugin;
use tracing::info;

use crate::SettingsArgs;
use crate::info::format_time;
use crate::sinks::{LocalFile, WavSink};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Module file
    pub file: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Start position in milliseconds
    #[arg(long)]
    pub seek: Option<u32>,

    /// Stop after this many seconds of audio
    #[arg(long)]
    pub max_seconds: Option<u32>,
}

pub fn execute(args: RenderArgs, settings: &SettingsArgs) -> Result<()> {
    let (plugin, _) = settings.plugin()?;
    let identifier = args.file.to_string_lossy();
    let mut vfile = LocalFile::new(&args.file);
    let mut sink = WavSink::new(&args.output)
        .with_seek(args.seek)
        .with_max_seconds(args.max_seconds);

    if !plugin.play(&identifier, &mut vfile, &mut sink) {
        bail!("{} is not a playable module", args.file.display());
    }
    let path = sink.path().to_path_buf();
    let rate = sink.rate().max(1) as u64;
    let frames = sink.finish()?;
    let ms = (frames * 1000 / rate).min(u32::MAX as u64) as u32;
    info!(frames, output = %path.display(), "render complete");
    println!("Wrote {} ({})", path.display(), format_time(ms));
    Ok(())
}

#[cfg(test)]
mod tests {
    use modplay_song::testing::ModBuilder;

    use super::*;

    fn write_module(dir: &std::path::Path) -> PathBuf {
        let data = ModBuilder::new(4)
            .title("render")
            .sample("sq", [60i8, 60, -60, -60].repeat(8), 64, Some((0, 32)))
            .patterns(1)
            .note(0, 0, 0, 60, 1)
            .build();
        let path = dir.join("song.mod");
        std::fs::write(&path, data).unwrap();
        path
    }

    fn settings(dir: &std::path::Path) -> SettingsArgs {
        SettingsArgs {
            config: Some(dir.join("config.toml")),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_whole_song() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let args = RenderArgs {
            file: write_module(dir.path()),
            output: output.clone(),
            seek: None,
            max_seconds: None,
        };
        execute(args, &settings(dir.path())).unwrap();

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);
        // 64 rows * 6 ticks * 882 frames, two samples each
        assert_eq!(reader.len(), 64 * 6 * 882 * 2);
    }

    #[test]
    fn test_render_limit() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("short.wav");
        let args = RenderArgs {
            file: write_module(dir.path()),
            output: output.clone(),
            seek: None,
            max_seconds: Some(1),
        };
        execute(args, &settings(dir.path())).unwrap();
        let frames = hound::WavReader::open(&output).unwrap().duration() as u64;
        // Stops on the first tick boundary past one second
        assert!((44_100..44_100 + 882).contains(&frames));
    }

    #[test]
    fn test_render_rejects_non_module() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "not music").unwrap();
        let args = RenderArgs {
            file,
            output: dir.path().join("out.wav"),
            seek: None,
            max_seconds: None,
        };
        assert!(execute(args, &settings(dir.path())).is_err());
        assert!(!dir.path().join("out.wav").exists());
    }
}
