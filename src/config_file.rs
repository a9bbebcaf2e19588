// src/config_file.rs - Optional YAML settings file
//
// Example:
//
//   format: app
//   gzip: true
//   formats:
//     app: '^(?P<time>\S+) (?P<level>[A-Z]+) (?P<message>.*)$'

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::pattern_extraction::PRESETS;

/// Defaults read from a settings file. Command-line flags take precedence.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub format: Option<String>,
    pub template: Option<String>,
    pub gzip: Option<bool>,
    pub filter: Option<PathBuf>,
    pub filter_args: Vec<String>,
    pub max_line_length: Option<usize>,
    /// Custom named formats: name -> regex with named groups
    pub formats: IndexMap<String, String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }

    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty file deserializes to unit, not a mapping
        if text.trim().is_empty() {
            return Ok(Settings::default());
        }

        let settings: Settings =
            serde_yaml::from_str(text).map_err(|source| ConfigError::SettingsParse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(name) = settings.formats.keys().find(|n| PRESETS.contains_key(n.as_str())) {
            return Err(ConfigError::ShadowedPreset(name.clone()));
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Settings, ConfigError> {
        Settings::from_yaml(text, Path::new("test.yaml"))
    }

    #[test]
    fn test_full_settings() {
        let settings = parse(
            r#"
format: app
gzip: true
filter: /usr/bin/jq
filter_args: ["-c", "."]
max_line_length: 4096
formats:
  app: '^(?P<level>[A-Z]+) (?P<message>.*)$'
  kv: '(?P<key>\w+)=(?P<value>\S+)'
"#,
        )
        .unwrap();

        assert_eq!(settings.format.as_deref(), Some("app"));
        assert_eq!(settings.gzip, Some(true));
        assert_eq!(settings.filter, Some(PathBuf::from("/usr/bin/jq")));
        assert_eq!(settings.filter_args, vec!["-c", "."]);
        assert_eq!(settings.max_line_length, Some(4096));
        let names: Vec<&String> = settings.formats.keys().collect();
        assert_eq!(names, vec!["app", "kv"]);
    }

    #[test]
    fn test_empty_settings() {
        assert_eq!(parse("").unwrap(), Settings::default());
        assert_eq!(parse("gzip: false\n").unwrap().gzip, Some(false));
    }

    #[test]
    fn test_rejects_bad_settings() {
        assert!(matches!(
            parse("colour: red\n"),
            Err(ConfigError::SettingsParse { .. })
        ));
        assert!(matches!(
            parse("formats:\n  combined: '(?P<x>.*)'\n"),
            Err(ConfigError::ShadowedPreset(name)) if name == "combined"
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Settings::load(Path::new("/nonexistent/fudge.yaml")),
            Err(ConfigError::SettingsRead { .. })
        ));
    }
}
