//! `modplay set` - store a plugin setting

use anyhow::{Result, bail};
use clap::Args;
use modplay_input::plugin::{INTERPOLATOR, PANNING_AMPLITUDE, STEREO_SEPARATION};
use modplay_input::{ConfigStore, InputPlugin, PreferencesWidget};

use crate::SettingsArgs;

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Setting name: stereo_separation, panning_amplitude or interpolator
    pub key: String,
    pub value: i32,
}

/// Values a preferences widget accepts
fn accepts(widget: &PreferencesWidget, value: i32) -> bool {
    match widget {
        PreferencesWidget::Spin { min, max, .. } => (*min..=*max).contains(&value),
        PreferencesWidget::Combo { items, .. } => items.iter().any(|item| item.value == value),
    }
}

pub fn execute(args: SetArgs, settings: &SettingsArgs) -> Result<()> {
    let (plugin, store) = settings.store()?;
    let widgets = plugin.preferences();
    let Some(widget) = widgets.iter().find(|w| w.binding().key == args.key) else {
        bail!(
            "Unknown setting '{}' (expected {}, {} or {})",
            args.key,
            STEREO_SEPARATION,
            PANNING_AMPLITUDE,
            INTERPOLATOR
        );
    };
    if !accepts(widget, args.value) {
        bail!("{} ({}) does not accept {}", widget.label(), args.key, args.value);
    }

    let bind = widget.binding();
    store.set_int(bind.section, bind.key, args.value);
    bind.notify();
    store.save()?;
    if let Some(path) = store.path() {
        println!("{} = {} ({})", widget.label(), args.value, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use modplay_input::plugin::SECTION;

    use super::*;
    use crate::config::TomlConfig;

    #[test]
    fn test_set_persists_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let settings = SettingsArgs {
            config: Some(path.clone()),
            ..Default::default()
        };
        execute(
            SetArgs {
                key: INTERPOLATOR.to_string(),
                value: 1,
            },
            &settings,
        )
        .unwrap();

        let store = TomlConfig::load(Some(path)).unwrap();
        assert_eq!(store.get_int(SECTION, INTERPOLATOR), 1);
        // Defaults are written alongside
        assert_eq!(store.get_int(SECTION, STEREO_SEPARATION), 70);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsArgs {
            config: Some(dir.path().join("config.toml")),
            ..Default::default()
        };
        let bad_key = SetArgs {
            key: "volume".to_string(),
            value: 1,
        };
        assert!(execute(bad_key, &settings).is_err());
        let out_of_range = SetArgs {
            key: STEREO_SEPARATION.to_string(),
            value: 101,
        };
        assert!(execute(out_of_range, &settings).is_err());
        let unknown_interpolator = SetArgs {
            key: INTERPOLATOR.to_string(),
            value: 3,
        };
        assert!(execute(unknown_interpolator, &settings).is_err());
        assert!(!dir.path().join("config.toml").exists());
    }
}
