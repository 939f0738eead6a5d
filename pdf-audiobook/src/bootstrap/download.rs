//! HTTP download with progress reporting and retry logic.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error: {status} for {url}")]
    HttpError { status: u16, url: String },

    #[error("Download truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },
}

/// Retry schedule with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f32() * factor).min(self.max_delay.as_secs_f32());
        Duration::from_secs_f32(secs)
    }
}

/// Download a file with progress bar display.
pub async fn download_file(url: &str, destination: &Path, description: &str) -> Result<()> {
    download_file_with_retry(url, destination, description, &RetryConfig::default()).await
}

/// Download a file with progress bar and retry logic.
pub async fn download_file_with_retry(
    url: &str,
    destination: &Path,
    description: &str,
    config: &RetryConfig,
) -> Result<()> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match download_file_once(url, destination, description).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= config.max_attempts => {
                return Err(e).context(format!(
                    "Download failed after {} attempts",
                    config.max_attempts
                ));
            }
            Err(e) => {
                let delay = config.delay_after(attempt);
                log::warn!(
                    "Download failed (attempt {}/{}): {:#}; retrying in {:?}",
                    attempt,
                    config.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn download_file_once(url: &str, destination: &Path, description: &str) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(600))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client.get(url).send().await.context("Failed to connect")?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
        }
        .into());
    }

    let expected = response.content_length();
    let pb = progress_bar(expected, description);
    let partial = partial_path(destination);
    let mut file = std::fs::File::create(&partial).context("Failed to create destination file")?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading response")?;
        file.write_all(&chunk).context("Failed to write to file")?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;
    drop(file);
    pb.finish_and_clear();

    if let Some(expected) = expected {
        if downloaded != expected {
            let _ = std::fs::remove_file(&partial);
            return Err(DownloadError::Truncated {
                expected,
                received: downloaded,
            }
            .into());
        }
    }

    std::fs::rename(&partial, destination).context("Failed to move download into place")?;
    Ok(())
}

/// `archive.tar.gz` downloads into `archive.tar.gz.part` until complete.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    destination.with_file_name(name)
}

fn progress_bar(total_size: Option<u64>, description: &str) -> ProgressBar {
    let pb = match total_size {
        Some(size) => {
            let pb = ProgressBar::new(size);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "  {msg}\n  {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("  {msg} {bytes} ({bytes_per_sec})")
            {
                pb.set_style(style);
            }
            pb
        }
    };
    pb.set_message(description.to_string());
    pb
}

/// Format bytes for human-readable display.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536 * 1024), "1.5 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_after(1), Duration::from_secs(1));
        assert_eq!(config.delay_after(2), Duration::from_secs(2));
        assert_eq!(config.delay_after(3), Duration::from_secs(4));
        assert_eq!(config.delay_after(10), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/python.tar.gz")),
            PathBuf::from("/tmp/python.tar.gz.part")
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_after_retries() {
        let temp = tempfile::tempdir().unwrap();
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
        };
        let result = download_file_with_retry(
            "http://127.0.0.1:9/nothing-here",
            &temp.path().join("out.bin"),
            "test",
            &config,
        )
        .await;
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("after 2 attempts"));
    }
}
