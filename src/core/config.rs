use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

/// Page size used for message history fetches when the config does not say
/// otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

const MIN_PAGE_SIZE: u32 = 1;
const MAX_PAGE_SIZE: u32 = 100;

const CONFIG_FILE: &str = "banter_config.json";

/// Optional tuning knobs read from `banter_config.json` in the data dir.
/// Anything missing or malformed falls back to the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct CoreConfig {
    message_page_size: Option<u32>,
}

impl CoreConfig {
    /// Resolve the limit for one history fetch: an explicit request wins over
    /// the config, and everything is clamped to what the service accepts.
    pub(super) fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .or(self.message_page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

pub(super) fn load_core_config(data_dir: &str) -> CoreConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(config) => {
                debug!(path = %path.display(), "loaded core config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid core config, using defaults");
                CoreConfig::default()
            }
        },
        Err(_) => CoreConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_beats_config_beats_default() {
        let config = CoreConfig {
            message_page_size: Some(25),
        };
        assert_eq!(config.page_limit(Some(10)), 10);
        assert_eq!(config.page_limit(None), 25);
        assert_eq!(CoreConfig::default().page_limit(None), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn limits_clamp_to_the_service_range() {
        let config = CoreConfig::default();
        assert_eq!(config.page_limit(Some(0)), 1);
        assert_eq!(config.page_limit(Some(10_000)), 100);
    }

    #[test]
    fn missing_file_reads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_core_config(dir.path().to_str().unwrap());
        assert_eq!(config.page_limit(None), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn malformed_file_reads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
        let config = load_core_config(dir.path().to_str().unwrap());
        assert_eq!(config.page_limit(None), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn configured_page_size_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"message_page_size": 30}"#,
        )
        .unwrap();
        let config = load_core_config(dir.path().to_str().unwrap());
        assert_eq!(config.page_limit(None), 30);
    }
}
