use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::connection::{BackoffConfig, ConnectionConfig};
use crate::scrollback;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatboxConfig {
    pub server_host: String,
    pub server_port: u16,
    pub channel: String,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub scrollback_capacity: usize,
    pub ignore_users: Vec<String>,
    pub enabled_commands: Vec<String>,
    pub backoff_base_ms: u64,
    pub backoff_ceiling_ms: u64,
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub media_api_key: Option<String>,
    #[serde(default)]
    pub media_client_key: String,
}

impl Default for ChatboxConfig {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            server_host: "irc.chat.twitch.tv".to_owned(),
            server_port: 6667,
            channel: String::new(),
            nick: None,
            auth_token: None,
            scrollback_capacity: scrollback::DEFAULT_CAPACITY,
            ignore_users: vec!["Nightbot".to_owned()],
            enabled_commands: vec!["GIF".to_owned(), "HYPE".to_owned()],
            backoff_base_ms: backoff.base_ms,
            backoff_ceiling_ms: backoff.ceiling_ms,
            backoff_multiplier: backoff.multiplier,
            media_api_key: None,
            media_client_key: "neon-chatbox".to_owned(),
        }
    }
}

impl ChatboxConfig {
    pub fn load_or_create() -> Result<(Self, PathBuf)> {
        let config_dir = dirs::config_dir()
            .context("unable to locate OS config directory")?
            .join("neon-chatbox");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("failed creating config dir at {}", config_dir.display()))?;

        let config_path = config_dir.join("config.json");
        if !config_path.exists() {
            let default = Self::default();
            default.save(&config_path)?;
            return Ok((default, config_path));
        }

        let text = fs::read_to_string(&config_path)
            .with_context(|| format!("failed reading {}", config_path.display()))?;
        let config = serde_json::from_str::<Self>(&text)
            .with_context(|| format!("invalid json in {}", config_path.display()))?;
        Ok((config, config_path))
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let payload = serde_json::to_string_pretty(self).context("failed serializing config")?;
        fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.server_host.clone(),
            port: self.server_port,
            channel: self.channel.clone(),
            nick: self.nick.clone(),
            auth_token: self.auth_token.clone(),
            backoff: BackoffConfig {
                base_ms: self.backoff_base_ms,
                ceiling_ms: self.backoff_ceiling_ms,
                multiplier: self.backoff_multiplier,
            },
        }
    }
}
