//! Layered settings loading.

use crate::Settings;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

/// Environment variables starting with this prefix override file settings.
/// Nested keys are separated by a double underscore
/// (`TOME_FEATURE_IMAGE__THUMBNAIL_SIZE=256`).
pub const ENV_PREFIX: &str = "TOME_";
/// File name (without extension) looked up in the configuration directory.
pub const CONFIG_FILE_STEM: &str = "tome";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "tome")
}

/// Platform configuration directory (`~/.config/tome` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Platform data directory, home of the cache database and renders.
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

impl Settings {
    /// Load settings, from lowest to highest priority:
    ///
    /// 1. built-in defaults,
    /// 2. `tome.toml`, `tome.yaml`/`tome.yml` or `tome.json` in [`config_dir()`],
    /// 3. the `explicit` file, if given (must exist),
    /// 4. `TOME_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_layers(config_dir().as_deref(), explicit)
    }

    pub(crate) fn load_layers(dir: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(dir) = dir {
            for extension in ["toml", "yaml", "yml", "json"] {
                let candidate = dir.join(format!("{CONFIG_FILE_STEM}.{extension}"));
                if candidate.is_file() {
                    tracing::debug!(path = %candidate.display(), "merging configuration file");
                    figment = merge_file(figment, &candidate)?;
                }
            }
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::FileNotFound(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "merging explicit configuration file");
            figment = merge_file(figment, path)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate settings from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment.extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase());
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load(dir: Option<&Path>, explicit: Option<&Path>) -> figment::error::Result<Settings> {
        Settings::load_layers(dir, explicit).map_err(|e| format!("{e:?}").into())
    }

    #[test]
    fn test_defaults_without_sources() {
        Jail::expect_with(|_jail| {
            assert_eq!(load(None, None)?, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn test_layer_priority() {
        Jail::expect_with(|jail| {
            jail.create_file("tome.toml", "debounce_ms = 250\n[preview]\nmax_length = 80\nskip_headings = false\n")?;
            jail.create_file("override.yaml", "preview:\n  max_length: 120\ntags:\n  tag_properties: [status]\n")?;
            jail.set_env("TOME_PREVIEW__SKIP_HEADINGS", "true");
            let settings = load(Some(jail.directory()), Some(Path::new("override.yaml")))?;
            assert_eq!(settings.debounce_ms, 250);
            assert_eq!(settings.preview.max_length, 120);
            assert!(settings.preview.skip_headings);
            assert_eq!(settings.tags.tag_properties, vec!["status".to_string()]);
            // Untouched sections keep their defaults.
            assert_eq!(settings.feature_image, Default::default());
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_jail| {
            let err = Settings::load_layers(None, Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_format() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.ini", "debounce_ms=1")?;
            let err = Settings::load_layers(None, Some(Path::new("settings.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("TOME_FEATURE_IMAGE__THUMBNAIL_SIZE", "0");
            let err = Settings::load_layers(None, None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Validation { .. }));
            jail.set_env("TOME_FEATURE_IMAGE__THUMBNAIL_SIZE", "huge");
            let err = Settings::load_layers(None, None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }
}
