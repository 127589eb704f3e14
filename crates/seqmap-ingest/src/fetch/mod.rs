//! Remote file retrieval
//!
//! Every reference dataset comes from an HTTP(S) or FTP URL, or from a local
//! file during testing and offline rebuilds. [`Fetcher`] hides the transport,
//! retries transient failures with a growing delay, and switches to the
//! endpoint's fallback mirror when the primary cannot be retrieved.

pub mod ftp;

use crate::config::{env_parse, local_path_for, Endpoint};
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Retry and timeout settings for remote transfers
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per URL before giving up (at least 1)
    pub max_retries: u32,

    /// Base delay between attempts; attempt `n` waits `n * retry_delay_secs`
    pub retry_delay_secs: u64,

    pub user_agent: String,

    /// Draw a progress bar for HTTP downloads
    pub show_progress: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_retries: 3,
            retry_delay_secs: 5,
            user_agent: format!("seqmap/{}", env!("CARGO_PKG_VERSION")),
            show_progress: false,
        }
    }
}

impl FetchConfig {
    /// Load from environment variables
    ///
    /// - SEQMAP_FETCH_TIMEOUT_SECS
    /// - SEQMAP_FETCH_MAX_RETRIES
    /// - SEQMAP_FETCH_RETRY_DELAY_SECS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: env_parse("SEQMAP_FETCH_TIMEOUT_SECS", defaults.timeout_secs),
            max_retries: env_parse("SEQMAP_FETCH_MAX_RETRIES", defaults.max_retries),
            retry_delay_secs: env_parse("SEQMAP_FETCH_RETRY_DELAY_SECS", defaults.retry_delay_secs),
            ..defaults
        }
    }

    /// Single attempt, no delay. Used by tests against mock servers.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            retry_delay_secs: 0,
            timeout_secs: 30,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("Fetch timeout must be greater than 0".to_string());
        }
        if self.max_retries == 0 {
            return Err("Max retries must be at least 1".to_string());
        }
        if self.max_retries > 20 {
            return Err("Max retries too large (max 20)".to_string());
        }
        Ok(())
    }
}

/// Transport for one location string
#[derive(Debug, Clone)]
enum Location {
    Http(Url),
    Ftp(Url),
    Local(PathBuf),
}

impl Location {
    fn parse(location: &str) -> Result<Self> {
        match Url::parse(location) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Location::Http(url)),
                "ftp" => Ok(Location::Ftp(url)),
                "file" => url
                    .to_file_path()
                    .map(Location::Local)
                    .map_err(|_| anyhow::anyhow!("Invalid file URL: {}", location)),
                // Windows drive letters parse as a one-letter scheme
                scheme if scheme.len() == 1 => Ok(Location::Local(PathBuf::from(location))),
                scheme => bail!("Unsupported scheme '{}' in {}", scheme, location),
            },
            Err(_) => Ok(Location::Local(PathBuf::from(location))),
        }
    }
}

/// Downloads reference files with retry and mirror fallback
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid fetch configuration: {}", e))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Retrieve `location` into `dest`, creating parent directories.
    /// Returns the number of bytes written.
    pub async fn get(&self, location: &str, dest: &Path) -> Result<u64> {
        self.get_attempts(location, dest, self.config.max_retries).await
    }

    /// Single attempt, for optional files such as checksum side files
    pub async fn try_get(&self, location: &str, dest: &Path) -> Result<u64> {
        self.get_attempts(location, dest, 1).await
    }

    async fn get_attempts(&self, location: &str, dest: &Path, max_retries: u32) -> Result<u64> {
        let parsed = Location::parse(location)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut last_error = None;

        for attempt in 1..=max_retries {
            debug!("Fetch attempt {}/{} for: {}", attempt, max_retries, location);

            match self.get_once(&parsed, dest).await {
                Ok(bytes) => {
                    info!("Fetched {} ({} bytes)", location, bytes);
                    return Ok(bytes);
                },
                Err(e) => {
                    if attempt < max_retries {
                        let delay = self.config.retry_delay_secs * attempt as u64;
                        warn!(
                            "Fetch attempt {}/{} failed: {:#}. Retrying in {}s...",
                            attempt, max_retries, e, delay
                        );
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                    last_error = Some(e);
                },
            }
        }

        let err = last_error.unwrap_or_else(|| anyhow::anyhow!("no fetch attempt was made"));
        Err(err).with_context(|| format!("Failed to fetch {} after {} attempts", location, max_retries))
    }

    async fn get_once(&self, location: &Location, dest: &Path) -> Result<u64> {
        let bytes = match location {
            Location::Http(url) => self.get_http(url, dest).await?,
            Location::Ftp(url) => {
                let target = ftp::FtpTarget::from_url(url)?;
                let dest = dest.to_path_buf();
                let timeout = Duration::from_secs(self.config.timeout_secs);
                tokio::task::spawn_blocking(move || ftp::download_to_file(&target, &dest, timeout))
                    .await
                    .map_err(|e| anyhow::anyhow!("FTP download task panicked: {}", e))??
            },
            Location::Local(src) => copy_local(src, dest).await?,
        };

        if bytes == 0 {
            bail!("Retrieved an empty file");
        }
        Ok(bytes)
    }

    async fn get_http(&self, url: &Url, dest: &Path) -> Result<u64> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            bail!("HTTP {} for {}", response.status(), url);
        }

        let progress = self.progress_bar(response.content_length().unwrap_or(0), dest);

        // Stream into a sibling file so a failed transfer never leaves a truncated target
        let part = part_path(dest);
        match stream_body(response, url, &part, dest, &progress).await {
            Ok(written) => {
                progress.finish_and_clear();
                Ok(written)
            },
            Err(e) => {
                progress.abandon();
                discard_part(&part).await;
                Err(e)
            },
        }
    }

    fn progress_bar(&self, total: u64, dest: &Path) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        pb.set_message(name);
        pb
    }

    /// Fetch the primary into `dir`, or the fallback when the primary fails.
    /// The local file keeps the remote file name. Returns the written path.
    pub async fn get_with_fallback(&self, endpoint: &Endpoint, dir: &Path) -> Result<PathBuf> {
        let primary_path = local_path_for(dir, &endpoint.primary);
        let primary_err = match self.get(&endpoint.primary, &primary_path).await {
            Ok(_) => return Ok(primary_path),
            Err(e) => e,
        };

        let Some(fallback) = endpoint.fallback.as_deref() else {
            return Err(primary_err);
        };

        warn!(
            primary = %endpoint.primary,
            fallback = %fallback,
            error = %format!("{:#}", primary_err),
            "Primary source failed, using fallback"
        );

        let fallback_path = local_path_for(dir, fallback);
        self.get(fallback, &fallback_path)
            .await
            .with_context(|| format!("Primary ({}) and fallback sources both failed", endpoint.primary))?;
        Ok(fallback_path)
    }

    /// Single GET returning the body as text. Non-success statuses are errors.
    pub async fn get_text(&self, url: &str, query: &[(&str, &str)], accept: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} from {}", status, url);
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))
    }
}

async fn stream_body(
    response: reqwest::Response,
    url: &Url,
    part: &Path,
    dest: &Path,
    progress: &ProgressBar,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(part)
        .await
        .with_context(|| format!("Failed to create {}", part.display()))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Transfer interrupted for {}", url))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.set_position(written);
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(part, dest)
        .await
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;
    Ok(written)
}

async fn discard_part(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => debug!("Removed partial download {}", part.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!("Failed to remove partial download {}: {}", part.display(), e),
    }
}

pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn copy_local(src: &Path, dest: &Path) -> Result<u64> {
    if !tokio::fs::try_exists(src).await.unwrap_or(false) {
        bail!("Local source {} does not exist", src.display());
    }

    let same_file = match (tokio::fs::canonicalize(src).await, tokio::fs::canonicalize(dest).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same_file {
        return Ok(tokio::fs::metadata(src).await?.len());
    }

    tokio::fs::copy(src, dest)
        .await
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchConfig::no_retry()).unwrap()
    }

    #[test]
    fn test_location_parse() {
        assert!(matches!(Location::parse("https://a.org/x").unwrap(), Location::Http(_)));
        assert!(matches!(Location::parse("ftp://a.org/x").unwrap(), Location::Ftp(_)));
        assert!(matches!(Location::parse("/tmp/x.csv").unwrap(), Location::Local(_)));
        assert!(matches!(Location::parse("relative/x.csv").unwrap(), Location::Local(_)));
        assert!(Location::parse("gopher://a.org/x").is_err());
    }

    #[test]
    fn test_validate_config() {
        assert!(FetchConfig::default().validate().is_ok());
        let zero = FetchConfig {
            max_retries: 0,
            ..FetchConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[tokio::test]
    async fn test_get_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/entry.list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("IPR000001\tDomain\tKringle\n"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/entry.list");
        let bytes = fetcher()
            .get(&format!("{}/data/entry.list", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 25);
        assert!(std::fs::read_to_string(&dest).unwrap().starts_with("IPR000001"));
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_get_rejects_error_status_and_empty_body() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let f = fetcher();
        assert!(f.get(&format!("{}/missing", server.uri()), &dir.path().join("a")).await.is_err());
        assert!(f.get(&format!("{}/empty", server.uri()), &dir.path().join("b")).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_move_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(path("/clans.tsv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("PF00001\tCL0192\n"))
            .mount(&server)
            .await;

        // A non-empty directory at the target makes the final rename fail
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clans.tsv");
        std::fs::create_dir_all(dest.join("occupied")).unwrap();

        let result = fetcher().get(&format!("{}/clans.tsv", server.uri()), &dest).await;
        assert!(result.is_err());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_truncated_body_removes_partial_file() {
        use tokio::io::AsyncReadExt;

        // Promise more bytes than are sent, then hang up
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\nIPR000001\tDomain\n")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("entry.list");
        let result = fetcher().get(&format!("http://{}/entry.list", addr), &dest).await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let config = FetchConfig {
            max_retries: 2,
            retry_delay_secs: 0,
            ..FetchConfig::no_retry()
        };
        let dir = tempfile::tempdir().unwrap();
        let bytes = Fetcher::new(config)
            .unwrap()
            .get(&format!("{}/flaky", server.uri()), &dir.path().join("flaky"))
            .await
            .unwrap();
        assert_eq!(bytes, 2);
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_fails() {
        let server = MockServer::start().await;
        Mock::given(path("/primary/clans.tsv"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(path("/mirror/clans-fb.tsv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("PF00001\n"))
            .mount(&server)
            .await;

        let endpoint = Endpoint::new(
            format!("{}/primary/clans.tsv", server.uri()),
            Some(&format!("{}/mirror/clans-fb.tsv", server.uri())),
        );
        let dir = tempfile::tempdir().unwrap();
        let written = fetcher().get_with_fallback(&endpoint, dir.path()).await.unwrap();

        assert_eq!(written, dir.path().join("clans-fb.tsv"));
    }

    #[tokio::test]
    async fn test_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, "abc").unwrap();

        let dest = dir.path().join("out/copy.txt");
        let bytes = fetcher().get(src.to_str().unwrap(), &dest).await.unwrap();
        assert_eq!(bytes, 3);

        // Fetching a file onto itself is a no-op
        assert_eq!(fetcher().get(src.to_str().unwrap(), &src).await.unwrap(), 3);
    }
}
