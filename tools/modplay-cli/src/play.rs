//! `modplay play` - play through the default output device

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use modplay_input::InputPlugin;

use crate::SettingsArgs;
use crate::audio::SpeakerSink;
use crate::sinks::LocalFile;

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Module file
    pub file: PathBuf,

    /// Start position in milliseconds
    #[arg(long)]
    pub seek: Option<u32>,
}

pub fn execute(args: PlayArgs, settings: &SettingsArgs) -> Result<()> {
    let (plugin, _) = settings.plugin()?;
    let identifier = args.file.to_string_lossy();
    let mut vfile = LocalFile::new(&args.file);
    let mut sink = SpeakerSink::new(args.seek);

    if !plugin.play(&identifier, &mut vfile, &mut sink) {
        bail!("{} is not a playable module", args.file.display());
    }
    sink.finish()
}
