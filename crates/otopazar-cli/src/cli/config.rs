use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use otopazar_core::config::read_config_file;
use otopazar_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// Turkey's fixed offset, used when the config names none
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 180;

/// CLI configuration: the core connection settings plus display options,
/// all in one camelCase JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(flatten)]
    pub core: CoreConfig,

    /// Offset used for `HH:MM` / `DD.MM` display times
    #[serde(default = "default_offset")]
    pub utc_offset_minutes: i32,
}

fn default_offset() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        read_config_file(path)
    }

    /// Explicit path if given, else the default path when it exists, else
    /// defaults. Environment overrides apply last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let default_path: PathBuf = CoreConfig::default_path();
                if default_path.exists() {
                    Self::load(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(Self {
            core: config.core.with_env(),
            ..config
        })
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .with_context(|| format!("Invalid UTC offset: {} minutes", self.utc_offset_minutes))
    }

    /// Viewer id from `--user`, else from config
    pub fn viewer(&self, flag: Option<String>) -> Result<String> {
        flag.or_else(|| self.core.user_id.clone())
            .filter(|id| !id.trim().is_empty())
            .context("No user id: pass --user or set userId / OTOPAZAR_USER_ID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config_minimal() {
        let config = serde_json::from_str::<CliConfig>("{}").unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_parse_config_with_core_fields() {
        let json = r#"{
            "backendUrl": "https://db.example.test",
            "apiKey": "anon",
            "userId": "alice",
            "utcOffsetMinutes": 0
        }"#;
        let config: CliConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.core.backend_url, "https://db.example.test");
        assert_eq!(config.core.user_id.as_deref(), Some("alice"));
        assert_eq!(config.utc_offset_minutes, 0);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"apiKey": "from-file", "utcOffsetMinutes": 60}}"#).unwrap();
        let config = CliConfig::load(file.path()).unwrap();
        assert_eq!(config.core.api_key, "from-file");
        assert_eq!(config.offset().unwrap().local_minus_utc(), 3600);
    }

    #[test]
    fn test_viewer_flag_wins() {
        let mut config = CliConfig::default();
        config.core.user_id = Some("from-config".to_string());
        assert_eq!(config.viewer(Some("flag".to_string())).unwrap(), "flag");
        assert_eq!(config.viewer(None).unwrap(), "from-config");

        config.core.user_id = None;
        assert!(config.viewer(None).is_err());
    }

    #[test]
    fn test_invalid_offset() {
        let config = CliConfig {
            utc_offset_minutes: 48 * 60,
            ..CliConfig::default()
        };
        assert!(config.offset().is_err());
    }
}
