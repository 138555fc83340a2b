//! On-disk blob store and remote media fetch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::error::{ArchiveError, Result};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the shared HTTP client used for media downloads. Some hosts refuse
/// non-browser user agents.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .expect("failed to build HTTP client")
}

/// Fetches the raw bytes behind a media link. Non-success status codes and
/// empty bodies are download failures.
pub async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(ArchiveError::Download(format!(
            "{}: HTTP {}",
            url,
            response.status()
        )));
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(ArchiveError::Download(format!("{}: empty body", url)));
    }

    Ok(bytes.to_vec())
}

/// File blob store laid out as `<root>/<record id>/<filename>`, matching the
/// public URL scheme `<base>/<record id>/<filename>`.
#[derive(Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Writes a downloaded blob under its record ID and returns the stored
    /// filename.
    pub async fn save(&self, record_id: &str, filename: &str, bytes: &[u8]) -> Result<String> {
        let filename = if filename.is_empty() {
            format!("{}.bin", Uuid::new_v4())
        } else {
            filename.to_string()
        };

        let dir = self.root.join(record_id);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(&filename);
        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        info!(record_id, file = %filename, size = bytes.len(), "stored media blob");

        Ok(filename)
    }
}
