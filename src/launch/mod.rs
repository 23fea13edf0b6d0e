use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, info};

const SETTINGS_FILE: &str = "eqlsPlayerData.ini";
const GAME_BINARY: &str = "eqgame.exe";

/// Read the last-used account name from the game's settings file.
///
/// The file is line-oriented `key=value` text; only `Username` is consumed.
/// A missing key yields an empty string, which the caller substitutes.
pub fn fetch_username(dir: &Path) -> Result<String, String> {
    let path = dir.join(SETTINGS_FILE);
    let text = fs::read_to_string(&path).map_err(|e| format!("open {}: {e}", path.display()))?;
    Ok(parse_username(&text).unwrap_or_default())
}

fn parse_username(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("Username="))
        .map(|value| value.trim().to_owned())
}

/// Start the game client from `dir`, handing it the patched-state flag and
/// the login name.
pub fn launch_game(dir: &Path, username: &str) -> Result<(), String> {
    let exe = dir.join(GAME_BINARY);
    let mut cmd = Command::new(&exe);
    cmd.current_dir(dir)
        .arg("patchme")
        .arg(format!("/login:{username}"))
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        // CREATE_NO_WINDOW | DETACHED_PROCESS
        cmd.creation_flags(0x08000000 | 0x00000008);
    }

    debug!("launch: {} patchme /login:{username}", exe.display());
    cmd.spawn()
        .map_err(|e| format!("run {}: {e}", exe.display()))?;
    info!("launch: game client started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_username_from_settings_text() {
        let text = "Resolution=1920x1080\nUsername=soandso\nServer=test\n";
        assert_eq!(parse_username(text), Some("soandso".into()));
    }

    #[test]
    fn trims_carriage_returns_from_windows_line_endings() {
        let text = "Username=soandso\r\nServer=test\r\n";
        assert_eq!(parse_username(text), Some("soandso".into()));
    }

    #[test]
    fn missing_key_yields_none() {
        assert_eq!(parse_username("Server=test\n"), None);
        assert_eq!(parse_username(""), None);
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = fetch_username(dir.path()).unwrap_err();
        assert!(err.contains(SETTINGS_FILE), "unexpected error: {err}");
    }

    #[test]
    fn empty_username_value_is_preserved_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(SETTINGS_FILE), "Username=\n").expect("seed settings");
        assert_eq!(fetch_username(dir.path()).expect("fetch"), "");
    }
}
