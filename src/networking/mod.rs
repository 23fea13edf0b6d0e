use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::util::format_speed;

// Metadata probes should fail fast on an unreachable patch server; file
// bodies get a deadline generous enough for large assets on slow links.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const BULK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Shared HTTP plumbing with two deadline budgets: a short one for
/// manifest/version probes and a long one for bulk file transfers.
#[derive(Clone)]
pub struct NetworkClient {
    probe: Client,
    bulk: Client,
}

impl NetworkClient {
    pub fn new() -> Self {
        Self {
            probe: build_client(PROBE_TIMEOUT),
            bulk: build_client(BULK_TIMEOUT),
        }
    }

    /// Fetch a small plain-text body under the probe deadline.
    ///
    /// Status codes are not validated; the patch protocol signals "missing"
    /// through body sentinels, not HTTP statuses.
    pub async fn fetch_text(&self, url: &str) -> Result<String, String> {
        let response = self
            .probe
            .get(url)
            .send()
            .await
            .map_err(|e| format!("download {url}: {e}"))?;
        response.text().await.map_err(|e| format!("read {url}: {e}"))
    }

    /// Stream a file body into `dest` (full overwrite), calling `progress`
    /// with (downloaded, total, speed_text). Returns the bytes written.
    pub async fn download_to_path<F>(
        &self,
        url: &str,
        dest: &Path,
        mut progress: F,
    ) -> Result<u64, String>
    where
        F: FnMut(u64, Option<u64>, &str),
    {
        let response = self
            .bulk
            .get(url)
            .send()
            .await
            .map_err(|e| format!("download {url}: {e}"))?;

        let total = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = File::create(dest)
            .await
            .map_err(|e| format!("create {}: {e}", dest.display()))?;

        let mut downloaded: u64 = 0;
        let mut last_tick = Instant::now();
        let mut last_bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("stream {url}: {e}"))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write {}: {e}", dest.display()))?;
            downloaded += chunk.len() as u64;

            let since = last_tick.elapsed().as_secs_f32();
            if since > 0.2 {
                let speed = (downloaded - last_bytes) as f32 / since;
                progress(downloaded, total, &format_speed(speed));
                last_tick = Instant::now();
                last_bytes = downloaded;
            }
        }

        file.flush()
            .await
            .map_err(|e| format!("flush {}: {e}", dest.display()))?;

        // Final callback.
        progress(downloaded, total, "0 B/s");

        debug!(
            "download complete: {url} -> {} ({downloaded} bytes)",
            dest.display()
        );
        Ok(downloaded)
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            warn!("network client: falling back to default HTTP client configuration ({err})");
            Client::new()
        })
}
