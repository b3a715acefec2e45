// Copyright © 2023-2024 Vouch.io LLC

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which of the three flash images a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Bootloader,
    Partitions,
    Firmware,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ImageKind::Bootloader => "bootloader",
            ImageKind::Partitions => "partition table",
            ImageKind::Firmware => "firmware",
        };
        f.write_str(name)
    }
}

/// Errors that stop a run before any device is touched.
#[derive(Error, Debug)]
pub enum FlashError {
    #[error("esptool not found")]
    ToolNotFound,

    #[error("no serial ports found")]
    NoPortsAvailable,

    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{kind} file not found: {}", .path.display())]
    MissingFile { kind: ImageKind, path: PathBuf },

    #[error("invalid firmware source {0:?}")]
    InvalidSource(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlashError {
    /// Recovery suggestion shown under the error line, if there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            FlashError::ToolNotFound => Some("install it with: pip install esptool"),
            FlashError::NoPortsAvailable => {
                Some("pass the port explicitly, e.g. --port COM3 or --port /dev/ttyUSB0")
            }
            FlashError::Download { .. } => {
                Some("check the URL or pass a local file with --firmware")
            }
            FlashError::MissingFile { .. } => {
                Some("check the path, or override it with --bootloader, --partitions or --firmware")
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlashError>;
