use std::path::PathBuf;

use anyhow::{Result, anyhow};
use directories::{BaseDirs, ProjectDirs};

use crate::meta::{KEY_DIR, NAME};

pub struct Directory {}

impl Directory {
    #[cfg(not(feature = "portable"))]
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "scribe", NAME)
            .ok_or_else(|| anyhow!("Failed to obtain project directories"))
    }

    /// Portable builds keep their data next to the executable.
    #[cfg(feature = "portable")]
    fn project_dirs() -> Result<ProjectDirs> {
        let exe = std::env::current_exe()?;
        let parent = exe
            .parent()
            .ok_or_else(|| anyhow!("Failed to obtain current process path"))?;
        ProjectDirs::from_path(parent.join("scribe-data"))
            .ok_or_else(|| anyhow!("Failed to obtain data directory path"))
    }

    /// Machine local log directory, created on first use. The rolling
    /// appender writes one file per day in here.
    pub fn logs_directory() -> Result<PathBuf> {
        let logs = Self::project_dirs()?.data_local_dir().join("logs");
        std::fs::create_dir_all(&logs)?;
        Ok(logs)
    }

    /// Plain text file holding the generation API key, e.g.
    /// `~/.config/deepseek-nvim/config` on Linux. Not created if missing.
    pub fn api_key_file() -> Result<PathBuf> {
        let dirs = BaseDirs::new()
            .ok_or_else(|| anyhow!("Failed to obtain home directory"))?;
        Ok(dirs.config_dir().join(KEY_DIR).join("config"))
    }
}
