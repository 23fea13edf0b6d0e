use std::env;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use log::debug;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::networking::NetworkClient;
use crate::report::SessionLog;

const HASH_ENDPOINT: &str = "eqlauncher-hash.txt";
const BINARY_ENDPOINT: &str = "eqlauncher.exe";
// Body returned by the update service when no hash has been published.
const MISSING_SENTINEL: &str = "Not Found";

/// What the self-update check decided.
#[derive(Debug, PartialEq, Eq)]
pub enum SelfUpdateOutcome {
    /// The running binary matches the published hash.
    UpToDate,
    /// The update service could not be consulted; the run continues.
    Skipped(String),
    /// A new binary is in place; the caller must flush diagnostics,
    /// relaunch, and terminate this process.
    Applied,
}

/// Source of self-update artefacts: the published hash and the binary.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch the published build hash body.
    async fn fetch_hash_text(&self, url: &str) -> Result<String, String>;
    /// Download the replacement binary to `dest`. Returns bytes written.
    async fn fetch_binary(&self, url: &str, dest: &Path) -> Result<u64, String>;
}

#[async_trait]
impl UpdateSource for NetworkClient {
    async fn fetch_hash_text(&self, url: &str) -> Result<String, String> {
        self.fetch_text(url).await
    }

    async fn fetch_binary(&self, url: &str, dest: &Path) -> Result<u64, String> {
        self.download_to_path(url, dest, |downloaded, total, speed| {
            debug!("self update: {downloaded}/{total:?} bytes ({speed})");
        })
        .await
    }
}

/// Compare the running launcher against the published build hash and swap a
/// replacement binary into place when they differ.
///
/// Never terminates the process itself; termination on `Applied` is the
/// orchestrator's job.
pub async fn self_update<S>(
    source: &S,
    base_url: &str,
    cfg: &mut Config,
    log: &mut SessionLog,
) -> Result<SelfUpdateOutcome, String>
where
    S: UpdateSource + ?Sized,
{
    let hash_url = format!("{base_url}/{HASH_ENDPOINT}");
    log.record(format!("Checking for self update at {hash_url}"));

    let body = match source.fetch_hash_text(&hash_url).await {
        Ok(body) => body,
        Err(err) => return Ok(SelfUpdateOutcome::Skipped(err)),
    };

    let Some(remote_hash) = parse_remote_hash(&body) else {
        return Ok(SelfUpdateOutcome::Skipped(
            "remote site down, ignoring self update".into(),
        ));
    };

    if cfg.launcher_hash == remote_hash {
        return Ok(SelfUpdateOutcome::UpToDate);
    }

    log.record("Updating launcher...");
    let exe = env::current_exe().map_err(|e| format!("locate own binary: {e}"))?;
    let parent = exe
        .parent()
        .ok_or_else(|| format!("own binary {} has no parent directory", exe.display()))?;

    // Stage in the executable's own directory so the final rename never
    // crosses a filesystem boundary.
    let staged = NamedTempFile::new_in(parent).map_err(|e| format!("stage update: {e}"))?;
    let binary_url = format!("{base_url}/{BINARY_ENDPOINT}");
    log.record(format!("Downloading launcher at {binary_url}"));
    source.fetch_binary(&binary_url, staged.path()).await?;

    swap_binary(staged, &exe)?;

    cfg.launcher_hash = remote_hash;
    if let Err(err) = cfg.save() {
        log.warn(format!("Failed to record new launcher hash: {err}"));
    }

    Ok(SelfUpdateOutcome::Applied)
}

fn parse_remote_hash(body: &str) -> Option<String> {
    let trimmed = body.trim();
    (!trimmed.is_empty() && trimmed != MISSING_SENTINEL).then(|| trimmed.to_owned())
}

/// Replace `target` with the fully written staged file. The target path
/// only ever holds either the old or the new binary, never a partial write.
fn swap_binary(staged: NamedTempFile, target: &Path) -> Result<(), String> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o755))
            .map_err(|e| format!("chmod staged binary: {e}"))?;
        staged
            .persist(target)
            .map_err(|e| format!("replace {}: {}", target.display(), e.error))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        // Windows refuses to overwrite a running executable, but renaming
        // it aside is allowed.
        let staged_path = staged.into_temp_path();
        let aside = target.with_extension("old");
        let _ = fs::remove_file(&aside);
        let had_previous = target.exists();
        if had_previous {
            fs::rename(target, &aside)
                .map_err(|e| format!("move aside {}: {e}", target.display()))?;
        }
        if let Err(err) = staged_path.persist(target) {
            if had_previous {
                let _ = fs::rename(&aside, target);
            }
            return Err(format!("replace {}: {}", target.display(), err.error));
        }
        let _ = fs::remove_file(&aside);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockUpdateServer {
        hash_body: Result<String, String>,
        binary_fetches: AtomicUsize,
    }

    impl MockUpdateServer {
        fn with_hash(body: &str) -> Self {
            Self {
                hash_body: Ok(body.to_owned()),
                binary_fetches: AtomicUsize::new(0),
            }
        }

        fn unreachable() -> Self {
            Self {
                hash_body: Err("download: connection refused".into()),
                binary_fetches: AtomicUsize::new(0),
            }
        }

        fn binary_fetch_count(&self) -> usize {
            self.binary_fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpdateSource for MockUpdateServer {
        async fn fetch_hash_text(&self, _url: &str) -> Result<String, String> {
            self.hash_body.clone()
        }

        async fn fetch_binary(&self, _url: &str, _dest: &Path) -> Result<u64, String> {
            self.binary_fetches.fetch_add(1, Ordering::SeqCst);
            Err("test server has no binary".into())
        }
    }

    #[test]
    fn remote_hash_sentinel_and_blank_bodies_are_rejected() {
        assert_eq!(parse_remote_hash("Not Found"), None);
        assert_eq!(parse_remote_hash("  Not Found\n"), None);
        assert_eq!(parse_remote_hash(""), None);
        assert_eq!(parse_remote_hash("   \n"), None);
        assert_eq!(
            parse_remote_hash("5eb63bbbe01eeed093cb22bb8f5acdc3\n"),
            Some("5eb63bbbe01eeed093cb22bb8f5acdc3".into())
        );
    }

    #[tokio::test]
    async fn matching_hash_short_circuits_without_a_download() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::load_or_create(dir.path()).expect("config");
        cfg.launcher_hash = "5eb63bbbe01eeed093cb22bb8f5acdc3".into();
        let mut log = SessionLog::new();
        let server = MockUpdateServer::with_hash("5eb63bbbe01eeed093cb22bb8f5acdc3\n");

        let outcome = self_update(&server, "https://patch.example", &mut cfg, &mut log)
            .await
            .expect("self update");

        assert_eq!(outcome, SelfUpdateOutcome::UpToDate);
        assert_eq!(server.binary_fetch_count(), 0);
        // The recorded build identity is untouched.
        assert_eq!(cfg.launcher_hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn sentinel_body_is_a_non_fatal_skip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::load_or_create(dir.path()).expect("config");
        let mut log = SessionLog::new();
        let server = MockUpdateServer::with_hash("Not Found");

        let outcome = self_update(&server, "https://patch.example", &mut cfg, &mut log)
            .await
            .expect("self update");

        assert!(matches!(outcome, SelfUpdateOutcome::Skipped(_)));
        assert_eq!(server.binary_fetch_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_update_service_is_a_non_fatal_skip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = Config::load_or_create(dir.path()).expect("config");
        let mut log = SessionLog::new();
        let server = MockUpdateServer::unreachable();

        let outcome = self_update(&server, "https://patch.example", &mut cfg, &mut log)
            .await
            .expect("self update");

        assert!(matches!(outcome, SelfUpdateOutcome::Skipped(_)));
        assert_eq!(server.binary_fetch_count(), 0);
    }

    #[test]
    fn swap_replaces_target_contents() {
        use std::io::Write;

        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("launcher.bin");
        fs::write(&target, b"old build").expect("seed target");

        let mut staged = NamedTempFile::new_in(dir.path()).expect("stage");
        staged.write_all(b"new build").expect("write staged");
        swap_binary(staged, &target).expect("swap");

        assert_eq!(fs::read(&target).expect("read target"), b"new build");
    }

    #[test]
    fn swap_works_without_an_existing_target() {
        use std::io::Write;

        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("launcher.bin");

        let mut staged = NamedTempFile::new_in(dir.path()).expect("stage");
        staged.write_all(b"first build").expect("write staged");
        swap_binary(staged, &target).expect("swap");

        assert_eq!(fs::read(&target).expect("read target"), b"first build");
    }
}
