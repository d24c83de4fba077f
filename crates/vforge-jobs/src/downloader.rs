//! Fetches remote combine inputs into the temp directory.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use vforge_media::fs_utils::remove_quietly;

use crate::error::{JobsError, JobsResult};

/// HTTP downloader for remote video inputs.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    temp_dir: PathBuf,
}

impl Downloader {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self::with_client(reqwest::Client::new(), temp_dir)
    }

    pub fn with_client(client: reqwest::Client, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Download every URL concurrently.
    ///
    /// Returned paths follow the order of `urls`. If any download fails, the
    /// files already fetched are removed and the first error is returned.
    pub async fn download_all(&self, urls: &[Url]) -> JobsResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let results = join_all(
            urls.iter()
                .enumerate()
                .map(|(index, url)| self.download_one(url, index)),
        )
        .await;

        let mut paths = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(path) => paths.push(path),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!("Additional download failure: {}", e),
            }
        }

        if let Some(e) = first_error {
            for path in &paths {
                remove_quietly(path).await;
            }
            return Err(e);
        }

        info!(count = paths.len(), "Downloaded remote inputs");
        Ok(paths)
    }

    async fn download_one(&self, url: &Url, index: usize) -> JobsResult<PathBuf> {
        let path = self
            .temp_dir
            .join(format!("{}_{}.mp4", Uuid::new_v4(), index));
        debug!("Downloading {} to {}", url, path.display());

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| JobsError::download(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(JobsError::download(format!("{}: HTTP {}", url, status)));
        }

        if let Err(e) = write_body(response, &path).await {
            remove_quietly(&path).await;
            return Err(JobsError::download(format!("{}: {}", url, e)));
        }

        Ok(path)
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> anyhow::Result<()> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(files: &[(&str, &str)]) -> MockServer {
        let server = MockServer::start().await;
        for (name, body) in files {
            Mock::given(method("GET"))
                .and(path(format!("/{}", name)))
                .respond_with(ResponseTemplate::new(200).set_body_string(*body))
                .mount(&server)
                .await;
        }
        server
    }

    fn url(server: &MockServer, name: &str) -> Url {
        Url::parse(&format!("{}/{}", server.uri(), name)).unwrap()
    }

    #[tokio::test]
    async fn test_download_all_preserves_order() {
        let server = server_with(&[("a.mp4", "first"), ("b.mp4", "second")]).await;
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());

        let paths = downloader
            .download_all(&[url(&server, "a.mp4"), url(&server, "b.mp4")])
            .await
            .unwrap();

        assert_eq!(paths.len(), 2);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"first");
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"second");
        assert!(paths[0].to_string_lossy().ends_with("_0.mp4"));
        assert!(paths[1].to_string_lossy().ends_with("_1.mp4"));
    }

    #[tokio::test]
    async fn test_failure_removes_downloaded_files() {
        let server = server_with(&[("a.mp4", "first")]).await;
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());

        let err = downloader
            .download_all(&[url(&server, "a.mp4"), url(&server, "missing.mp4")])
            .await
            .unwrap_err();

        assert!(matches!(err, JobsError::Download(ref msg) if msg.contains("404")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
