//! modplay - reference host for the tracker module input plugin
//!
//! # Commands
//!
//! - `modplay info <FILE>` - Print tags and module details
//! - `modplay render <FILE> -o out.wav` - Render to a WAV file
//! - `modplay play <FILE>` - Play through the default sound card
//! - `modplay set <KEY> <VALUE>` - Store a plugin setting
//!
//! # Settings (config.toml)
//!
//! ```toml
//! [modplay]
//! stereo_separation = "70"
//! panning_amplitude = "50"
//! interpolator = "2"
//! ```
//!
//! `--interpolator`, `--separation` and `--amplitude` override the stored
//! values for a single run.

#[cfg(feature = "playback")]
mod audio;
mod config;
mod info;
#[cfg(feature = "playback")]
mod play;
mod render;
mod set;
mod sinks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use modplay_input::plugin::{ABOUT, INTERPOLATOR, PANNING_AMPLITUDE, SECTION, STEREO_SEPARATION};
use modplay_input::{ConfigStore, InputPlugin, ModulePlugin};

use crate::config::TomlConfig;

/// modplay - play and render tracker modules (MOD, S3M, XM, IT)
#[derive(Parser)]
#[command(name = "modplay")]
#[command(about = ABOUT)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print tags and module details
    Info(info::InfoArgs),

    /// Render a module to a WAV file
    Render(render::RenderArgs),

    /// Play a module through the default output device
    #[cfg(feature = "playback")]
    Play(play::PlayArgs),

    /// Store a plugin setting
    Set(set::SetArgs),
}

/// Settings file location and one-run overrides
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Settings file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Interpolator: 0 nearest, 1 linear, 2 spline
    #[arg(long, global = true, value_parser = clap::value_parser!(i32).range(0..=2))]
    interpolator: Option<i32>,

    /// Stereo separation in percent
    #[arg(long, global = true, value_parser = clap::value_parser!(i32).range(0..=100))]
    separation: Option<i32>,

    /// Panning amplitude in percent
    #[arg(long, global = true, value_parser = clap::value_parser!(i32).range(0..=100))]
    amplitude: Option<i32>,
}

impl SettingsArgs {
    /// Load the settings file and install the plugin defaults
    pub fn store(&self) -> Result<(ModulePlugin, Arc<TomlConfig>)> {
        let store = Arc::new(TomlConfig::load(self.config.clone())?);
        let plugin = ModulePlugin::new(store.clone());
        plugin.init();
        Ok((plugin, store))
    }

    /// [`Self::store`] with the command-line overrides applied
    ///
    /// Overrides are written to the in-memory store only; nothing is saved.
    pub fn plugin(&self) -> Result<(ModulePlugin, Arc<TomlConfig>)> {
        let (plugin, store) = self.store()?;
        let overrides = [
            (INTERPOLATOR, self.interpolator),
            (STEREO_SEPARATION, self.separation),
            (PANNING_AMPLITUDE, self.amplitude),
        ];
        for (key, value) in overrides {
            if let Some(value) = value {
                store.set_int(SECTION, key, value);
            }
        }
        Ok((plugin, store))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info(args) => info::execute(args, &cli.settings),
        Commands::Render(args) => render::execute(args, &cli.settings),
        #[cfg(feature = "playback")]
        Commands::Play(args) => play::execute(args, &cli.settings),
        Commands::Set(args) => set::execute(args, &cli.settings),
    }
}
