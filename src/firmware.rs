// Copyright © 2023-2024 Vouch.io LLC

use log::{debug, info, warn};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::error::{FlashError, ImageKind, Result};
use crate::report::Reporter;

const FALLBACK_FILE_NAME: &str = "firmware.bin";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the application image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareSource {
    Remote(Url),
    Local(PathBuf),
}

impl FirmwareSource {
    /// `http://` and `https://` sources are remote, anything else is a path.
    pub fn parse(source: &str) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            let url =
                Url::parse(source).map_err(|_| FlashError::InvalidSource(source.to_string()))?;
            Ok(FirmwareSource::Remote(url))
        } else if source.is_empty() {
            Err(FlashError::InvalidSource(source.to_string()))
        } else {
            Ok(FirmwareSource::Local(PathBuf::from(source)))
        }
    }
}

/// An application image on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    pub path: PathBuf,
    /// Downloaded into a temporary location and owned by this run.
    pub ephemeral: bool,
}

/// File name a download is stored under: the last path segment, query dropped.
pub fn download_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}

/// A download that must not outlive the run, shared with the interrupt handler.
///
/// Set while a temporary file is on disk and cleared once it has been cleaned
/// up or handed over for keeping.
#[derive(Debug, Clone, Default)]
pub struct PendingDownload(Arc<Mutex<Option<PathBuf>>>);

impl PendingDownload {
    pub fn track(&self, path: &Path) {
        *self.slot() = Some(path.to_path_buf());
    }

    pub fn clear(&self) {
        self.slot().take();
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.slot().clone()
    }

    /// Deletes the tracked file, if any, and returns its path when it was removed.
    pub fn remove(&self) -> Option<PathBuf> {
        let path = self.slot().take()?;
        remove_quietly(&path).then_some(path)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        // a poisoned slot still holds a valid path
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct Acquirer {
    client: Client,
    download_dir: PathBuf,
    reporter: Reporter,
    pending: PendingDownload,
}

impl Acquirer {
    pub fn new(download_dir: impl Into<PathBuf>, reporter: Reporter) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .build()?;
        Ok(Acquirer {
            client,
            download_dir: download_dir.into(),
            reporter,
            pending: PendingDownload::default(),
        })
    }

    /// Publish downloads in `pending` from the moment the file is created.
    /// A completed download stays tracked; the caller clears it.
    pub fn with_pending(mut self, pending: PendingDownload) -> Self {
        self.pending = pending;
        self
    }

    /// Acquirer downloading into the OS temporary directory.
    pub fn with_temp_dir(reporter: Reporter) -> Result<Self> {
        Self::new(std::env::temp_dir(), reporter)
    }

    pub fn acquire(&self, source: &FirmwareSource) -> Result<FirmwareImage> {
        match source {
            FirmwareSource::Remote(url) => {
                let path = self.download(url)?;
                Ok(FirmwareImage {
                    path,
                    ephemeral: true,
                })
            }
            FirmwareSource::Local(path) => {
                if !path.exists() {
                    return Err(FlashError::MissingFile {
                        kind: ImageKind::Firmware,
                        path: path.clone(),
                    });
                }
                debug!("using local firmware {}", path.display());
                Ok(FirmwareImage {
                    path: path.clone(),
                    ephemeral: false,
                })
            }
        }
    }

    fn download(&self, url: &Url) -> Result<PathBuf> {
        let dest = self.download_dir.join(download_file_name(url));
        self.reporter.info(format!("downloading {url}"));
        self.reporter.info(format!("saving to {}", dest.display()));

        let failed = |source: Box<dyn std::error::Error + Send + Sync>| FlashError::Download {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .and_then(|rsp| rsp.error_for_status())
            .map_err(|e| failed(e.into()))?;
        debug!("response status: {}", response.status());

        self.pending.track(&dest);
        let mut file = match File::create(&dest) {
            Ok(file) => file,
            Err(e) => {
                self.pending.clear();
                return Err(failed(e.into()));
            }
        };
        let pb = self.reporter.transfer(response.content_length());
        let copied = io::copy(&mut pb.wrap_read(response), &mut file);
        pb.finish_and_clear();

        match copied {
            Ok(bytes) => {
                info!("downloaded {} bytes to {}", bytes, dest.display());
                self.reporter
                    .success(format!("download complete: {}", dest.display()));
                Ok(dest)
            }
            Err(e) => {
                drop(file);
                self.pending.clear();
                remove_quietly(&dest);
                Err(failed(e.into()))
            }
        }
    }
}

/// Deletes a downloaded image unless `keep` is set. Returns whether a file was removed.
///
/// Never fails: flashing is already over when this runs.
pub fn cleanup(image: &FirmwareImage, keep: bool) -> bool {
    if !image.ephemeral || keep {
        return false;
    }
    remove_quietly(&image.path)
}

fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed {}", path.display());
            true
        }
        Err(e) => {
            warn!("could not remove {}: {}", path.display(), e);
            false
        }
    }
}
