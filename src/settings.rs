use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use config::Config;
use serde::Deserialize;

const CONFIG_FILE: &str = "stat_harvest";
const ENV_PREFIX: &str = "HARVEST";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// How the browser decides a freshly loaded page is ready to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// `document.readyState == "complete"` and no new resource loads for a few polls.
    Ready,
    /// Sleep `settle_ms` and hope for the best.
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub out_dir: PathBuf,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
    pub settle: SettleMode,
    pub settle_ms: u64,
    pub settle_timeout_ms: u64,
    pub settle_poll_ms: u64,
    pub settle_quiet_polls: u32,
    pub chrome_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            out_dir: PathBuf::from("datasets"),
            request_delay_ms: 1000,
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "es-ES,es;q=0.9,en;q=0.8".to_string(),
            settle: SettleMode::Ready,
            settle_ms: 3000,
            settle_timeout_ms: 15_000,
            settle_poll_ms: 250,
            settle_quiet_polls: 3,
            chrome_path: None,
        }
    }
}

impl Settings {
    /// Defaults, then `stat_harvest.toml` (optional), then `HARVEST_*` env vars.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let settings: Settings = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.out_dir, PathBuf::from("datasets"));
        assert_eq!(settings.request_delay(), Duration::from_secs(1));
        assert_eq!(settings.settle, SettleMode::Ready);
        assert!(settings.chrome_path.is_none());
    }

    #[test]
    fn overrides_are_applied_per_key() {
        let settings: Settings = Config::builder()
            .set_override("request_delay_ms", 0)
            .unwrap()
            .set_override("settle", "fixed")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.request_delay_ms, 0);
        assert_eq!(settings.settle, SettleMode::Fixed);
        assert_eq!(settings.timeout_secs, 30);
    }
}
