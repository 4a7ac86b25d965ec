use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: String,
    /// Difficulty of the genesis block when no snapshot exists.
    pub initial_difficulty: u32,
    /// Sleep between mining cycles.
    pub mining_interval_secs: u64,
    /// Blocks between full snapshots; 1 writes a snapshot after every block.
    pub checkpoint_interval: u64,
    pub miner_address: String,
    pub staker_address: String,
    pub treasury_address: String,
}

impl Config {
    fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        PathBuf::from(expanded.into_owned())
    }

    fn zar_home() -> PathBuf {
        match dirs::home_dir() {
            // Use a Windows-friendly folder when building on Windows to avoid tilde expansion issues.
            Some(home) if cfg!(target_os = "windows") => {
                dirs::data_dir().unwrap_or(home).join("ZAR")
            }
            Some(home) => home.join(".zar"),
            None => PathBuf::from(".zar"),
        }
    }

    /// Compute the default data directory depending on the target OS.
    fn default_data_dir() -> String {
        Self::zar_home()
            .join("data")
            .to_string_lossy()
            .into_owned()
    }

    pub fn default_path() -> PathBuf {
        Self::zar_home().join("config.json")
    }

    /// Data directory with tilde expansion applied.
    pub fn data_dir_resolved(&self) -> PathBuf {
        Self::expand_path(&self.data_dir)
    }

    /// Load from the default location, creating it with defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load from `path` (tilde-expanded). A missing file is created with defaults;
    /// a file that exists but does not parse is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = Self::expand_path(&path.as_ref().to_string_lossy());
        if !path.exists() {
            log::info!(
                "Configuration file not found. Creating default configuration: {:?}",
                path
            );
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("read configuration file {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&data)
            .with_context(|| format!("configuration file format error in {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.mining_interval_secs == 0 {
            return Err(anyhow!("mining_interval_secs must be at least 1"));
        }
        if self.checkpoint_interval == 0 {
            return Err(anyhow!("checkpoint_interval must be at least 1"));
        }
        for (name, addr) in [
            ("miner_address", &self.miner_address),
            ("staker_address", &self.staker_address),
            ("treasury_address", &self.treasury_address),
        ] {
            if addr.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", name));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            initial_difficulty: 2,
            mining_interval_secs: 10,
            checkpoint_interval: 1,
            miner_address: "0xa048f7cffb548b05ea90ab94962ed0e9a7fc865b".to_string(),
            staker_address: "0xstakeraddress1234567890abcdef".to_string(),
            treasury_address: "0xtreasuryfundaddress1234567890abcdef".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
        assert_eq!(cfg.initial_difficulty, 2);
        assert_eq!(cfg.mining_interval_secs, 10);
        assert_eq!(cfg.checkpoint_interval, 1);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "initial_difficulty": 4, "data_dir": "/tmp/zar" }"#).unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.initial_difficulty, 4);
        assert_eq!(cfg.data_dir_resolved(), PathBuf::from("/tmp/zar"));
        assert_eq!(cfg.mining_interval_secs, 10);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "mining_interval_secs": 0 }"#).unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn tilde_is_expanded() {
        let cfg = Config {
            data_dir: "~/zar-data".to_string(),
            ..Config::default()
        };
        let resolved = cfg.data_dir_resolved();
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with("zar-data"));
    }
}
