// Copyright © 2023-2024 Vouch.io LLC

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use log::{debug, warn, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::io::IsTerminal;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;

use esp32_flasher::{
    FlashError, Options, PendingDownload, Reporter, Session, Summary, SystemPorts, SystemRunner,
    DEFAULT_BAUD, DEFAULT_CHIP,
};

const DEFAULT_BOOTLOADER: &str = "partition/esp32-dt-02.ino.bootloader.bin";
const DEFAULT_PARTITIONS: &str = "partition/esp32-dt-02.ino.partitions.bin";
const DEFAULT_FIRMWARE: &str =
    "https://github.com/superplace/firmware/raw/refs/heads/main/esp32-dt-02-v218.ino.bin";

const EXIT_OK: u8 = 0;
const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "One-touch ESP32 flashing over serial", long_about = None)]
struct Cli {
    /// Serial port to flash, e.g. COM3 or /dev/ttyUSB0 [default: every detected port]
    #[arg(short, long, env = "ESP32_FLASH_PORT")]
    port: Option<String>,

    /// Bootloader image, written at 0x1000
    #[arg(short, long, env = "ESP32_FLASH_BOOTLOADER", default_value = DEFAULT_BOOTLOADER)]
    bootloader: PathBuf,

    /// Partition table image, written at 0x8000
    #[arg(short = 't', long, env = "ESP32_FLASH_PARTITIONS", default_value = DEFAULT_PARTITIONS)]
    partitions: PathBuf,

    /// Application image, written at 0x10000: a file or an http(s) URL
    #[arg(short, long, env = "ESP32_FLASH_FIRMWARE", default_value = DEFAULT_FIRMWARE)]
    firmware: String,

    /// Upload baud rate
    #[arg(long, env = "ESP32_FLASH_BAUD", default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Chip name passed to esptool
    #[arg(long, env = "ESP32_FLASH_CHIP", default_value = DEFAULT_CHIP)]
    chip: String,

    /// esptool executable to use instead of searching for one
    #[arg(long, env = "ESPTOOL")]
    esptool: Option<PathBuf>,

    /// Skip erasing the flash before writing
    #[arg(long)]
    no_erase: bool,

    /// Keep a downloaded firmware file instead of deleting it
    #[arg(long)]
    keep_firmware: bool,

    /// When to color status output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    /// Log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            port: self.port.clone(),
            bootloader: self.bootloader.clone(),
            partitions: self.partitions.clone(),
            firmware: self.firmware.clone(),
            baud: self.baud,
            chip: self.chip.clone(),
            esptool: self.esptool.clone(),
            erase: !self.no_erase,
            keep_firmware: self.keep_firmware,
        }
    }
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl ColorMode {
    fn enabled(self, interactive: bool, no_color: bool) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => interactive && !no_color,
        }
    }

    /// Color choice for log lines on stderr.
    fn log_color(self, no_color: bool) -> ColorChoice {
        match self {
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
            ColorMode::Auto if no_color => ColorChoice::Never,
            ColorMode::Auto => ColorChoice::Auto,
        }
    }
}

fn run(cli: &Cli, reporter: &Reporter, pending: &PendingDownload) -> Result<Summary> {
    let opts = cli.options();
    debug!("{:?}", opts);
    let mut session =
        Session::new(SystemRunner, SystemPorts, reporter.clone()).with_pending(pending.clone());
    Ok(session.run(&opts)?)
}

/// Per-port failures are in the summary, not the exit status.
fn exit_status(result: &Result<Summary>) -> u8 {
    match result {
        Ok(_) => EXIT_OK,
        Err(_) => EXIT_FAILURE,
    }
}

fn report_failure(reporter: &Reporter, err: &anyhow::Error) {
    reporter.error(format!("{err:#}"));
    if let Some(hint) = err.downcast_ref::<FlashError>().and_then(FlashError::hint) {
        reporter.info(hint);
    }
    debug!("{:?}", err);
}

/// What Ctrl-C does before the process exits with the returned status.
fn interrupted(reporter: &Reporter, pending: &PendingDownload) -> u8 {
    reporter.error("cancelled");
    if let Some(path) = pending.remove() {
        reporter.info(format!("removed temporary file {}", path.display()));
    }
    EXIT_FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let interactive = std::io::stdout().is_terminal();
    let no_color = std::env::var_os("NO_COLOR").is_some();
    let color = cli.color.enabled(interactive, no_color);

    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .build();
    if let Err(e) = TermLogger::init(
        log_level(cli.verbose),
        config,
        TerminalMode::Stderr,
        cli.color.log_color(no_color),
    ) {
        eprintln!("logger setup failed: {e}");
    }

    // colored drops escapes on non-terminals unless overridden process-wide
    if cli.color == ColorMode::Always {
        colored::control::set_override(true);
    }
    let reporter = Reporter::new(color, interactive);

    let pending = PendingDownload::default();
    let handler_reporter = reporter.clone();
    let handler_pending = pending.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let status = interrupted(&handler_reporter, &handler_pending);
        std::process::exit(i32::from(status));
    }) {
        warn!("cannot install Ctrl-C handler: {e}");
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| run(&cli, &reporter, &pending)))
        .unwrap_or_else(|_| Err(anyhow::anyhow!("unexpected internal error")));
    if let Err(e) = &result {
        report_failure(&reporter, e);
    }
    ExitCode::from(exit_status(&result))
}
