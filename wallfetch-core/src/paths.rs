use std::path::PathBuf;

use crate::error::{Result, WallfetchError};

#[derive(Debug, Clone)]
pub struct WallfetchPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl WallfetchPaths {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WallfetchError::Config("cannot resolve XDG config dir".into()))?
            .join("wallfetch");

        let data_dir = dirs::data_dir()
            .ok_or_else(|| WallfetchError::Config("cannot resolve XDG data dir".into()))?
            .join("wallfetch");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("wallfetch.db")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// `~/Pictures/Wallpapers`, falling back to `$HOME/Pictures` when the
/// XDG pictures dir is not set.
pub fn default_wallpaper_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
        .unwrap_or_else(|| PathBuf::from("Pictures"))
        .join("Wallpapers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_locations() {
        let paths = WallfetchPaths {
            config_dir: PathBuf::from("/cfg/wallfetch"),
            data_dir: PathBuf::from("/data/wallfetch"),
        };
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/wallfetch/config.json"));
        assert_eq!(paths.db_path(), PathBuf::from("/data/wallfetch/wallfetch.db"));
    }

    #[test]
    fn test_default_wallpaper_dir() {
        assert!(default_wallpaper_dir().ends_with("Wallpapers"));
    }
}
