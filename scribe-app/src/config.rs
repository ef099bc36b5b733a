use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Result, anyhow};
use scribe_core::directory::Directory;
use tracing::debug;

use crate::app::Cli;

pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
pub const SOCKET_ENV: &str = "NVIM_LISTEN_ADDRESS";

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-coder";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Editor RPC socket.
    pub socket: PathBuf,
    /// Proxy for the generation endpoint, empty for none.
    pub proxy: String,
    pub request_timeout: Duration,
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self> {
        let key_file = Directory::api_key_file().ok();
        Self::resolve(cli, |name| std::env::var(name).ok(), key_file.as_deref())
    }

    /// Command line flags win over the environment; the API key falls back to
    /// the contents of `key_file`.
    pub fn resolve<F>(cli: &Cli, env: F, key_file: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = non_empty(env(API_KEY_ENV))
            .inspect(|_| debug!("API key taken from {API_KEY_ENV}"))
            .or_else(|| {
                let path = key_file?;
                let key = non_empty(fs::read_to_string(path).ok())?;
                debug!("API key taken from {}", path.display());
                Some(key)
            })
            .ok_or_else(|| {
                let file = key_file
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "~/.config/deepseek-nvim/config".to_string());
                anyhow!(
                    "DeepSeek API key not found. Set {API_KEY_ENV} environment variable or create {file}"
                )
            })?;

        let socket = cli
            .socket
            .clone()
            .or_else(|| non_empty(env(SOCKET_ENV)).map(PathBuf::from))
            .ok_or_else(|| {
                anyhow!(
                    "{SOCKET_ENV} environment variable not set. Neovim must be running with RPC server enabled"
                )
            })?;

        Ok(Self {
            api_key,
            base_url: cli
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: cli.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            socket,
            proxy: cli.proxy.clone().unwrap_or_default(),
            request_timeout: cli
                .timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
