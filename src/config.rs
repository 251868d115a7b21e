use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerConfig;
use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Fixed delay between matchmaking retries.
    #[serde(default = "default_retry_ms")]
    pub matchmaking_retry_ms: u64,

    /// How long a loopback endpoint waits for a partner before reporting
    /// that no peer is available.
    #[serde(default = "default_match_timeout_ms")]
    pub match_timeout_ms: u64,
}

impl Config {
    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            retry_delay: Duration::from_millis(self.matchmaking_retry_ms),
        }
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_timeout_ms)
    }
}

pub fn load(path: &Path) -> Result<Config> {
    // create a new file if it does not exist
    if !path.exists() {
        let mut file = File::create(path)?;
        let config = toml::from_str::<Config>("")?;
        info!("config {:#?}", config);
        file.write_all(toml::to_string(&config)?.as_ref())?;
        return Ok(config);
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(toml::from_str(&contents)?)
}

fn default_retry_ms() -> u64 {
    3000
}

fn default_match_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = toml::from_str::<Config>("").unwrap();
        assert_eq!(config.matchmaking_retry_ms, 3000);
        assert_eq!(config.controller().retry_delay, Duration::from_secs(3));
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = toml::from_str::<Config>("matchmaking_retry_ms = 500").unwrap();
        assert_eq!(config.matchmaking_retry_ms, 500);
        assert_eq!(config.match_timeout_ms, 10_000);
    }
}
