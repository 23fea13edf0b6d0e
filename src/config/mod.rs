use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::checksum;

const CONFIG_FILE: &str = "eqlauncher.yml";

/// Persisted launcher state, stored next to the game files.
///
/// `current_version` is the last file-list version that was applied in full
/// and `launcher_hash` is the build identity of the launcher binary itself.
/// The two are deliberately separate fields: a patch pass must never change
/// what the self-updater compares against, and vice versa.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub launcher_hash: String,
    #[serde(skip)]
    path: PathBuf,
}

impl Config {
    /// Load the config from `dir`, creating it with defaults on first run.
    pub fn load_or_create(dir: &Path) -> Result<Self, String> {
        let path = dir.join(CONFIG_FILE);
        match fs::metadata(&path) {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let mut cfg = Self::first_run();
                cfg.path = path;
                cfg.save()?;
                Ok(cfg)
            }
            Err(err) => Err(format!("config info {}: {err}", path.display())),
            Ok(info) if info.is_dir() => Err(format!(
                "{} is a directory, should be a file",
                path.display()
            )),
            Ok(_) => {
                let text = fs::read_to_string(&path)
                    .map_err(|e| format!("open config {}: {e}", path.display()))?;
                let mut cfg: Config = serde_yaml::from_str(&text)
                    .map_err(|e| format!("decode {}: {e}", path.display()))?;
                cfg.path = path;
                Ok(cfg)
            }
        }
    }

    /// Write the config back to disk.
    pub fn save(&self) -> Result<(), String> {
        let text = serde_yaml::to_string(self).map_err(|e| format!("encode config: {e}"))?;
        fs::write(&self.path, text).map_err(|e| format!("create {}: {e}", self.path.display()))
    }

    // First run: no patch has been applied yet, and the build identity is
    // whatever binary is currently running.
    fn first_run() -> Self {
        let mut cfg = Config::default();
        match std::env::current_exe() {
            Ok(exe) => match checksum::file_md5(&exe) {
                Ok(hash) => cfg.launcher_hash = hash,
                Err(err) => warn!("config: unable to hash own binary: {err}"),
            },
            Err(err) => warn!("config: unable to locate own binary: {err}"),
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_creates_file_with_empty_patch_level() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_or_create(dir.path()).expect("create");
        assert!(cfg.current_version.is_empty());
        assert!(dir.path().join(CONFIG_FILE).is_file());
        // The build identity is seeded from the running binary, never from
        // a file list.
        assert_ne!(cfg.launcher_hash, cfg.current_version);
    }

    #[test]
    fn saved_values_survive_a_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::load_or_create(dir.path()).expect("create");
        cfg.current_version = "abcdef0123456789".into();
        cfg.launcher_hash = "feedface".into();
        cfg.save().expect("save");

        let reloaded = Config::load_or_create(dir.path()).expect("reload");
        assert_eq!(reloaded.current_version, "abcdef0123456789");
        assert_eq!(reloaded.launcher_hash, "feedface");
    }

    #[test]
    fn directory_in_place_of_config_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join(CONFIG_FILE)).expect("mkdir");
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(err.contains("directory"), "unexpected error: {err}");
    }
}
