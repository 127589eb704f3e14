//! Blocking FTP transfers
//!
//! `suppaftp` is synchronous, so callers run [`download_to_file`] inside
//! `tokio::task::spawn_blocking`. All transfers use Extended Passive Mode,
//! which works behind NAT and inside containers. Files are streamed to disk,
//! never buffered whole.

use super::part_path;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;
use suppaftp::{FtpError, FtpStream};
use tracing::{debug, warn};
use url::Url;

/// Connection details taken from an `ftp://` URL
#[derive(Debug, Clone)]
pub struct FtpTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub path: String,
}

impl FtpTarget {
    /// Anonymous login unless the URL carries credentials
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .with_context(|| format!("FTP URL has no host: {}", url))?
            .to_string();

        let username = match url.username() {
            "" => "anonymous".to_string(),
            user => user.to_string(),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(21),
            username,
            password: url.password().unwrap_or("anonymous@").to_string(),
            path: url.path().to_string(),
        })
    }
}

/// Retrieve `target.path` into `dest`, returning the number of bytes written
pub fn download_to_file(target: &FtpTarget, dest: &Path, timeout: Duration) -> Result<u64> {
    debug!(host = %target.host, port = target.port, "Connecting to FTP server");

    let addr = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve FTP host {}", target.host))?
        .next()
        .with_context(|| format!("No address found for FTP host {}", target.host))?;

    let mut ftp_stream =
        FtpStream::connect_timeout(addr, timeout).context("Failed to connect to FTP server")?;
    ftp_stream.set_mode(suppaftp::Mode::ExtendedPassive);

    ftp_stream
        .login(&target.username, &target.password)
        .context("Failed to login to FTP server")?;
    ftp_stream
        .transfer_type(suppaftp::types::FileType::Binary)
        .context("Failed to set binary mode")?;

    // Stream the data connection straight to disk; id mapping tables run to several GB
    let written = ftp_stream
        .retr(&target.path, |reader| save_stream(reader, dest).map_err(FtpError::ConnectionError))
        .with_context(|| format!("Failed to retrieve {}", target.path))?;

    if let Err(e) = ftp_stream.quit() {
        warn!("Failed to quit FTP session gracefully: {}", e);
    }

    debug!(bytes = written, path = %target.path, "FTP transfer complete");
    Ok(written)
}

/// Copy `reader` into `dest` through a `.part` sibling, which is removed
/// again when the copy or the final rename fails
pub(crate) fn save_stream(reader: &mut dyn Read, dest: &Path) -> std::io::Result<u64> {
    let part = part_path(dest);
    let result = copy_into(reader, &part).and_then(|written| {
        std::fs::rename(&part, dest)?;
        Ok(written)
    });

    if result.is_err() {
        if let Err(e) = std::fs::remove_file(&part) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial download {}: {}", part.display(), e);
            }
        }
    }
    result
}

fn copy_into(reader: &mut dyn Read, part: &Path) -> std::io::Result<u64> {
    let mut file = BufWriter::new(File::create(part)?);
    let written = std::io::copy(reader, &mut file)?;
    file.flush()?;
    Ok(written)
}
