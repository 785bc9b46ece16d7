//! Optional on-disk configuration, loaded once at startup.
//!
//! A missing or unparseable config file is never fatal — it just means the
//! bridge runs with the hardcoded defaults the original implementation used.

use std::path::PathBuf;

use serde::Deserialize;

fn default_listen_addr() -> String {
    "127.0.0.1:5805".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: default_listen_addr(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Loads configuration from `<config-dir>/opends-bridge/config.toml`,
    /// falling back to defaults if the directory, file, or contents are
    /// missing or invalid.
    pub fn load() -> Config {
        match Self::config_path().and_then(|path| std::fs::read_to_string(path).ok()) {
            Some(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
                tracing::warn!("ignoring malformed config file: {err}");
                Config::default()
            }),
            None => Config::default(),
        }
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("opends-bridge").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_addr, "127.0.0.1:5805");
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: Config = toml::from_str("log_filter = \"debug\"\n").unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:5805");
        assert_eq!(cfg.log_filter, "debug");
    }
}
