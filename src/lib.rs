mod error;
mod firmware;
mod flash;
mod plan;
mod ports;
mod report;
mod runner;
mod session;
mod tool;

pub use crate::error::{FlashError, ImageKind, Result};
pub use crate::firmware::{
    cleanup, download_file_name, Acquirer, FirmwareImage, FirmwareSource, PendingDownload,
};
pub use crate::flash::{FlashOutcome, Orchestrator, Summary};
pub use crate::plan::{
    resolve_image_path, FlashPlan, APPLICATION_OFFSET, BOOTLOADER_OFFSET, DEFAULT_BAUD,
    DEFAULT_CHIP, PARTITIONS_OFFSET,
};
pub use crate::ports::{scan_dir, FlashTarget, PortScanner, SystemPorts, DEVICE_PREFIXES};
pub use crate::report::Reporter;
pub use crate::runner::{ProcessOutput, ProcessRunner, SystemRunner};
pub use crate::session::{Options, Session};
pub use crate::tool::{Locator, Strategy, ToolInvocation};
