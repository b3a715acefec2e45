// Copyright © 2023-2024 Vouch.io LLC

use log::debug;
use sha2::{Digest, Sha256};
use std::fs::read;
use std::path::{Path, PathBuf};

use crate::error::{FlashError, ImageKind, Result};

pub const BOOTLOADER_OFFSET: u32 = 0x1000;
pub const PARTITIONS_OFFSET: u32 = 0x8000;
pub const APPLICATION_OFFSET: u32 = 0x10000;

pub const DEFAULT_BAUD: u32 = 460_800;
pub const DEFAULT_CHIP: &str = "esp32";

/// Everything needed to flash one board, identical for every port of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashPlan {
    pub chip: String,
    pub bootloader: PathBuf,
    pub partitions: PathBuf,
    pub application: PathBuf,
    pub baud: u32,
    pub erase: bool,
}

impl FlashPlan {
    fn images(&self) -> [(ImageKind, u32, &Path); 3] {
        [
            (ImageKind::Bootloader, BOOTLOADER_OFFSET, self.bootloader.as_path()),
            (ImageKind::Partitions, PARTITIONS_OFFSET, self.partitions.as_path()),
            (ImageKind::Firmware, APPLICATION_OFFSET, self.application.as_path()),
        ]
    }

    /// Fails with the first image that does not exist.
    pub fn validate(&self) -> Result<()> {
        for (kind, offset, path) in self.images() {
            if !path.exists() {
                return Err(FlashError::MissingFile {
                    kind,
                    path: path.to_path_buf(),
                });
            }
            let data = read(path)?;
            debug!(
                "{} @ {:#x}: {} ({} bytes, sha256 {})",
                kind,
                offset,
                path.display(),
                data.len(),
                hex::encode(Sha256::digest(&data))
            );
        }
        Ok(())
    }

    /// `offset file` pairs for `write_flash`, in flash order.
    pub fn write_args(&self) -> Vec<String> {
        self.images()
            .into_iter()
            .flat_map(|(_, offset, path)| [format!("{:#x}", offset), path.display().to_string()])
            .collect()
    }
}

/// Resolves a relative image path: the working directory wins if the file is
/// there, otherwise it is taken relative to `base_dir` (the executable's directory).
pub fn resolve_image_path(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    match base_dir {
        Some(base) => base.join(path),
        None => path.to_path_buf(),
    }
}

/// Directory containing the running executable, if it can be determined.
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
