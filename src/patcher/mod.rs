use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use indicatif::ProgressBar;
use log::debug;

use crate::checksum;
use crate::config::Config;
use crate::manifest::FileList;
use crate::networking::NetworkClient;
use crate::report::SessionLog;
use crate::util::{escapes_root, format_size, short_version};

/// Source of patch file bodies, keyed by manifest-relative name.
#[async_trait]
pub trait PatchSource: Send + Sync {
    /// Materialise `name` at `dest` with full overwrite semantics. Returns
    /// the number of bytes written.
    async fn fetch_file(&self, name: &str, dest: &Path) -> Result<u64, String>;
}

/// Production source: `<patcher_url>/<client_id>/<name>` over the bulk
/// download client.
pub struct RemoteSource {
    net: NetworkClient,
    base_url: String,
    client_id: String,
}

impl RemoteSource {
    pub fn new(
        net: NetworkClient,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            net,
            base_url: base_url.into(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl PatchSource for RemoteSource {
    async fn fetch_file(&self, name: &str, dest: &Path) -> Result<u64, String> {
        let url = format!("{}/{}/{}", self.base_url, self.client_id, name);
        self.net
            .download_to_path(&url, dest, |downloaded, total, speed| {
                debug!("{name}: {downloaded}/{total:?} bytes ({speed})");
            })
            .await
    }
}

/// Bring the installation directory at `root` into agreement with `list`.
///
/// Returns the declared bytes downloaded; zero means the directory already
/// matched. Downloads are fail-fast and abort the pass before the version
/// stamp moves; deletes are best-effort cleanup. The two policies are
/// intentionally different: a failed download leaves a file in an unknown
/// state, a failed delete merely leaves it stale.
pub async fn reconcile<S>(
    source: &S,
    root: &Path,
    list: &FileList,
    cfg: &mut Config,
    log: &mut SessionLog,
) -> Result<u64, String>
where
    S: PatchSource + ?Sized,
{
    let start = Instant::now();

    if cfg.current_version == list.version {
        log.record(format!(
            "We are up to date, latest patch {}",
            short_version(&list.version)
        ));
        return Ok(0);
    }

    // Declared sizes drive progress reporting only; hashes are the source
    // of truth for what actually needs fetching.
    let total_size: u64 = list.downloads.iter().map(|entry| entry.size).sum();
    log.record(format!(
        "Total patch size: {}, version {}",
        format_size(total_size),
        short_version(&list.version)
    ));

    let bar = ProgressBar::new(total_size);
    let mut downloaded: u64 = 0;

    for entry in &list.downloads {
        if escapes_root(&entry.name) {
            log.warn(format!("Skipping {}, has a .. segment", entry.name));
            bar.inc(entry.size);
            continue;
        }

        let target = root.join(&entry.name);
        if entry.name.contains('/')
            && let Some(parent) = target.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            bar.abandon();
            return Err(format!("mkdir {}: {err}", parent.display()));
        }

        match fs::metadata(&target) {
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                bar.abandon();
                return Err(format!("stat {}: {err}", entry.name));
            }
            Ok(_) => {
                let hash = match checksum::file_md5(&target) {
                    Ok(hash) => hash,
                    Err(err) => {
                        bar.abandon();
                        return Err(format!("md5 {}: {err}", entry.name));
                    }
                };
                if hash == entry.md5 {
                    log.record(format!("{} skipped", entry.name));
                    bar.inc(entry.size);
                    continue;
                }
            }
        }

        log.record(format!("{} ({})", entry.name, format_size(entry.size)));
        if let Err(err) = source.fetch_file(&entry.name, &target).await {
            bar.abandon();
            return Err(format!("download {}: {err}", entry.name));
        }
        downloaded += entry.size;
        bar.inc(entry.size);
    }
    bar.finish_and_clear();

    for entry in &list.deletes {
        if escapes_root(&entry.name) {
            log.warn(format!("Skipping {}, has a .. segment", entry.name));
            continue;
        }
        let target = root.join(&entry.name);
        let info = match fs::metadata(&target) {
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(format!("stat {}: {err}", entry.name)),
            Ok(info) => info,
        };
        if info.is_dir() {
            log.warn(format!("Skipping deleting {}, it is a directory", entry.name));
            continue;
        }
        if let Err(err) = fs::remove_file(&target) {
            log.warn(format!("Failed to delete {}: {err}", entry.name));
            continue;
        }
        log.record(format!("{} removed", entry.name));
    }

    // Every download entry landed; only now does the stamp advance. A
    // failed stamp write is logged and left for the next run to repair.
    cfg.current_version = list.version.clone();
    if let Err(err) = cfg.save() {
        log.warn(format!("Failed to save version to eqlauncher.yml: {err}"));
    }

    let elapsed = start.elapsed().as_secs_f32();
    if downloaded == 0 {
        log.record(format!("Finished patch in {elapsed:.2} seconds"));
    } else {
        log.record(format!(
            "Finished patch of {} in {elapsed:.2} seconds",
            format_size(downloaded)
        ));
    }
    Ok(downloaded)
}
