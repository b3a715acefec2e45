// Copyright © 2023-2024 Vouch.io LLC

use humantime::format_duration;
use log::{debug, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::{FlashError, Result};
use crate::firmware::{cleanup, Acquirer, FirmwareImage, FirmwareSource, PendingDownload};
use crate::flash::{Orchestrator, Summary};
use crate::plan::{executable_dir, resolve_image_path, FlashPlan};
use crate::ports::{FlashTarget, PortScanner};
use crate::report::Reporter;
use crate::runner::ProcessRunner;
use crate::tool::{Locator, ToolInvocation};

/// Resolved settings of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Flash only this port instead of scanning.
    pub port: Option<String>,
    pub bootloader: PathBuf,
    pub partitions: PathBuf,
    /// Local path or http(s) URL.
    pub firmware: String,
    pub baud: u32,
    pub chip: String,
    pub esptool: Option<PathBuf>,
    pub erase: bool,
    pub keep_firmware: bool,
}

/// One invocation of the tool, from locating esptool to the final tally.
pub struct Session<R, S> {
    runner: R,
    scanner: S,
    reporter: Reporter,
    download_dir: PathBuf,
    base_dir: Option<PathBuf>,
    pending: PendingDownload,
}

impl<R: ProcessRunner, S: PortScanner> Session<R, S> {
    pub fn new(runner: R, scanner: S, reporter: Reporter) -> Self {
        Session {
            runner,
            scanner,
            reporter,
            download_dir: std::env::temp_dir(),
            base_dir: executable_dir(),
            pending: PendingDownload::default(),
        }
    }

    /// Directory downloaded firmware is stored in.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Directory relative image paths fall back to.
    pub fn with_base_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.base_dir = dir;
        self
    }

    /// Handle through which an interrupt handler can find the temporary download.
    pub fn with_pending(mut self, pending: PendingDownload) -> Self {
        self.pending = pending;
        self
    }

    /// Fails only on preconditions; per-port failures are in the summary.
    pub fn run(&mut self, opts: &Options) -> Result<Summary> {
        let start_time = Instant::now();

        self.reporter.info("looking for esptool...");
        let tool = Locator::with_defaults(opts.esptool.as_deref()).locate(&mut self.runner)?;
        self.reporter.success(format!("found esptool: {tool}"));

        let targets = self.targets(opts)?;

        let source = FirmwareSource::parse(&opts.firmware)?;
        let acquirer = Acquirer::new(&self.download_dir, self.reporter.clone())?
            .with_pending(self.pending.clone());
        let image = acquirer.acquire(&source)?;
        if opts.keep_firmware {
            self.pending.clear();
        }

        let result = self.flash(&tool, &targets, &image, opts);

        if cleanup(&image, opts.keep_firmware) {
            self.reporter
                .info(format!("removed temporary file {}", image.path.display()));
        }
        self.pending.clear();

        let summary = result?;
        let elapsed = Duration::from_secs(start_time.elapsed().as_secs_f64().round() as u64);
        info!("batch took {}", format_duration(elapsed));

        self.reporter.rule();
        if summary.all_succeeded() {
            self.reporter.success(format!("all flashing complete: {summary}"));
        } else {
            self.reporter.warning(format!("partial failure: {summary}"));
        }
        self.reporter.rule();
        Ok(summary)
    }

    fn targets(&self, opts: &Options) -> Result<Vec<FlashTarget>> {
        if let Some(port) = &opts.port {
            // existence is left to esptool
            return Ok(vec![FlashTarget::new(port.as_str())]);
        }

        self.reporter.info("searching for ESP32 ports...");
        let ports = self.scanner.scan();
        if ports.is_empty() {
            return Err(FlashError::NoPortsAvailable);
        }
        let names: Vec<&str> = ports.iter().map(FlashTarget::as_str).collect();
        self.reporter.success(format!("found ports: {}", names.join(", ")));
        Ok(ports)
    }

    fn flash(
        &mut self,
        tool: &ToolInvocation,
        targets: &[FlashTarget],
        image: &FirmwareImage,
        opts: &Options,
    ) -> Result<Summary> {
        let base_dir = self.base_dir.as_deref();
        let plan = FlashPlan {
            chip: opts.chip.clone(),
            bootloader: resolve_image_path(&opts.bootloader, base_dir),
            partitions: resolve_image_path(&opts.partitions, base_dir),
            application: image.path.clone(),
            baud: opts.baud,
            erase: opts.erase,
        };
        debug!("{:?}", plan);
        plan.validate()?;

        let summary = Orchestrator::new(&mut self.runner, tool, &self.reporter).run(targets, &plan);
        Ok(summary)
    }
}
