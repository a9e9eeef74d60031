//! Playback controller and settings surface
//!
//! [`ModulePlugin`] implements the host's [`InputPlugin`] contract. Settings
//! changes reach a running session through the shared `reapply` flag, which
//! the playback loop checks once per frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::host::{
    ChangeCallback, ConfigStore, Field, InputPlugin, Playback, PreferencesWidget, SampleFormat,
    Tuple, VfsFile, WidgetBinding,
};
use crate::resolver::open_module;
use crate::wrap::ModuleWrap;

/// Plugin name shown by the host
pub const NAME: &str = "Module Player";

pub const ABOUT: &str = "Module player for MOD, S3M, XM and IT files.";

/// File extensions the host routes to this plugin
pub const EXTENSIONS: &[&str] = &[
    "669", "amf", "dbm", "digi", "emod", "far", "fnk", "gdm", "gmc", "imf", "ims", "it", "j2b",
    "liq", "mdl", "med", "mgt", "mod", "mtm", "ntp", "oct", "okta", "psm", "ptm", "rad", "rtm",
    "s3m", "stm", "ult", "umx", "xm",
];

/// Settings section
pub const SECTION: &str = "modplay";

pub const STEREO_SEPARATION: &str = "stereo_separation";
pub const PANNING_AMPLITUDE: &str = "panning_amplitude";
pub const INTERPOLATOR: &str = "interpolator";

/// Output sample layout
const OUTPUT_FORMAT: SampleFormat = SampleFormat::S16NE;

/// Tracker module input plugin
pub struct ModulePlugin {
    config: Arc<dyn ConfigStore>,
    /// Raised by the settings UI, cleared by the playback loop
    reapply: Arc<AtomicBool>,
}

impl ModulePlugin {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        Self {
            config,
            reapply: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }

    /// Whether the extension of `filename` is one the plugin advertises
    pub fn handles_extension(filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .is_some_and(|(_, ext)| EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn open(&self, identifier: &str, vfile: &mut dyn VfsFile) -> Option<ModuleWrap> {
        let amplitude = self.config.get_int(SECTION, PANNING_AMPLITUDE);
        open_module(identifier, vfile, Some(amplitude))
    }

    fn apply_live_settings(&self, wrap: &mut ModuleWrap) {
        let interpolator = self.config.get_int(SECTION, INTERPOLATOR);
        let separation = self.config.get_int(SECTION, STEREO_SEPARATION);
        debug!(interpolator, separation, "applying settings");
        wrap.set_interpolator(interpolator);
        wrap.set_stereo_separation(separation);
    }

    fn binding(&self, key: &'static str, live: bool) -> WidgetBinding {
        let on_change = live.then(|| {
            let reapply = Arc::clone(&self.reapply);
            Arc::new(move || reapply.store(true, Ordering::Relaxed)) as ChangeCallback
        });
        WidgetBinding {
            section: SECTION,
            key,
            on_change,
        }
    }
}

impl InputPlugin for ModulePlugin {
    fn init(&self) {
        let separation = ModuleWrap::default_stereo_separation().to_string();
        let amplitude = ModuleWrap::default_panning_amplitude().to_string();
        let interpolator = ModuleWrap::default_interpolator().to_string();
        self.config.set_defaults(
            SECTION,
            &[
                (STEREO_SEPARATION, separation.as_str()),
                (PANNING_AMPLITUDE, amplitude.as_str()),
                (INTERPOLATOR, interpolator.as_str()),
            ],
        );
    }

    fn is_our_file(&self, identifier: &str, vfile: &mut dyn VfsFile) -> bool {
        self.open(identifier, vfile).is_some()
    }

    fn read_tag(&self, identifier: &str, vfile: &mut dyn VfsFile, tuple: &mut dyn Tuple) -> bool {
        let Some(wrap) = self.open(identifier, vfile) else {
            return false;
        };
        tuple.set_filename(identifier);
        tuple.set_format(wrap.format(), wrap.channels(), wrap.rate(), 0);
        tuple.set_int(Field::Length, wrap.duration().min(i32::MAX as u32) as i32);
        if !wrap.title().is_empty() {
            tuple.set_str(Field::Title, wrap.title());
        }
        true
    }

    fn play(
        &self,
        identifier: &str,
        vfile: &mut dyn VfsFile,
        playback: &mut dyn Playback,
    ) -> bool {
        let Some(mut wrap) = self.open(identifier, vfile) else {
            debug!(identifier, "cannot play");
            return false;
        };
        self.reapply.store(true, Ordering::Relaxed);
        playback.open_audio(OUTPUT_FORMAT, wrap.rate(), wrap.channels());
        info!(identifier, format = wrap.format(), duration_ms = wrap.duration(), "playing");

        while !playback.check_stop() {
            if let Some(ms) = playback.check_seek() {
                debug!(ms, "seek");
                wrap.seek(ms);
            }
            if self.reapply.swap(false, Ordering::Relaxed) {
                self.apply_live_settings(&mut wrap);
            }
            let frame = wrap.play_frame();
            if frame.is_empty() {
                info!(identifier, "end of stream");
                break;
            }
            playback.write_audio(frame.bytes);
        }
        true
    }

    fn preferences(&self) -> Vec<PreferencesWidget> {
        vec![
            PreferencesWidget::Spin {
                label: "Stereo separation",
                bind: self.binding(STEREO_SEPARATION, true),
                min: 0,
                max: 100,
                step: 1,
                unit: "%",
            },
            PreferencesWidget::Spin {
                label: "Panning amplitude",
                bind: self.binding(PANNING_AMPLITUDE, false),
                min: 0,
                max: 100,
                step: 1,
                unit: "%",
            },
            PreferencesWidget::Combo {
                label: "Interpolation",
                bind: self.binding(INTERPOLATOR, true),
                items: ModuleWrap::get_interpolators(),
            },
        ]
    }
}
