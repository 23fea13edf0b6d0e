use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::networking::NetworkClient;
use crate::report::SessionLog;

/// Remote file list describing one complete install state.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub downloads: Vec<FileEntry>,
    #[serde(default)]
    pub deletes: Vec<FileEntry>,
}

/// One entry in the file list. `size` is informational only, and `md5` is
/// empty for delete entries.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub md5: String,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("download {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("decode filelist: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Source of file-list documents, keyed by URL.
#[async_trait]
pub trait FileListSource: Send + Sync {
    /// Fetch a small text document; an `Err` means a network failure.
    async fn fetch_document(&self, url: &str) -> Result<String, String>;
}

#[async_trait]
impl FileListSource for NetworkClient {
    async fn fetch_document(&self, url: &str) -> Result<String, String> {
        self.fetch_text(url).await
    }
}

/// Fetch and parse the remote file list.
///
/// Tries the flat URL shape first, then retries once against the legacy
/// nested shape on a network error of the primary; a body that fetches but
/// fails to parse is a parse error, not a reason to fall back. Any body
/// that parses is accepted.
pub async fn fetch_filelist<S>(
    source: &S,
    base_url: &str,
    client_id: &str,
    log: &mut SessionLog,
) -> Result<FileList, ManifestError>
where
    S: FileListSource + ?Sized,
{
    let url = format!("{base_url}/filelist_{client_id}.yml");
    log.record(format!("Downloading {url}"));
    let body = match source.fetch_document(&url).await {
        Ok(body) => body,
        Err(_) => {
            let legacy = format!("{base_url}/{client_id}/filelist_{client_id}.yml");
            log.record(format!("Downloading legacy {legacy}"));
            source
                .fetch_document(&legacy)
                .await
                .map_err(|reason| ManifestError::Fetch {
                    url: legacy,
                    reason,
                })?
        }
    };
    Ok(serde_yaml::from_str(&body)?)
}
