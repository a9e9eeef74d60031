//! `modplay info` - tags and module details

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use modplay_input::plugin::{NAME, PANNING_AMPLITUDE, SECTION};
use modplay_input::resolver::open_module;
use modplay_input::{ConfigStore, InputPlugin, TrackInfo};

use crate::SettingsArgs;
use crate::sinks::LocalFile;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Module file
    pub file: PathBuf,
}

pub fn execute(args: InfoArgs, settings: &SettingsArgs) -> Result<()> {
    let (plugin, store) = settings.plugin()?;
    let identifier = args.file.to_string_lossy();
    let mut vfile = LocalFile::new(&args.file);

    let mut tuple = TrackInfo::default();
    if !plugin.read_tag(&identifier, &mut vfile, &mut tuple) {
        bail!("{} is not a playable module", args.file.display());
    }

    println!("Decoder:    {NAME}");
    println!("File:       {}", tuple.filename.as_deref().unwrap_or_default());
    println!("Title:      {}", tuple.title.as_deref().unwrap_or("(none)"));
    println!(
        "Format:     {} ({} ch, {} Hz)",
        tuple.format.as_deref().unwrap_or_default(),
        tuple.channels,
        tuple.rate
    );
    if let Some(ms) = tuple.length_ms {
        println!("Length:     {}", format_time(ms.max(0) as u32));
    }

    let amplitude = Some(store.get_int(SECTION, PANNING_AMPLITUDE));
    let Some(wrap) = open_module(&identifier, &mut vfile, amplitude) else {
        return Ok(());
    };
    let info = wrap.info();
    if !info.tracker.is_empty() {
        println!("Tracker:    {}", info.tracker);
    }
    println!("Channels:   {} (pan {})", info.channels, info.channel_pans);
    println!("Orders:     {}", info.orders);
    println!("Patterns:   {}", info.patterns);
    println!("Speed:      {} / {} BPM", info.initial_speed, info.initial_tempo);
    print_names("Instruments", &info.instrument_names);
    print_names("Samples", &info.sample_names);
    if !info.message.trim().is_empty() {
        println!("\nMessage:");
        for line in info.message.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

/// List the non-empty names with their 1-based slot
fn print_names(label: &str, names: &[String]) {
    println!("{label}: {}", names.len());
    for (i, name) in names.iter().enumerate() {
        if !name.trim().is_empty() {
            println!("  {:3}. {}", i + 1, name);
        }
    }
}

/// m:ss.mmm
pub fn format_time(ms: u32) -> String {
    format!("{}:{:02}.{:03}", ms / 60_000, ms / 1000 % 60, ms % 1000)
}
