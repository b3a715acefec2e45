// Copyright © 2023-2024 Vouch.io LLC

use log::debug;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// A serial port with one board attached, e.g. `COM3` or `/dev/ttyUSB0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlashTarget(String);

impl FlashTarget {
    pub fn new(port: impl Into<String>) -> Self {
        FlashTarget(port.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlashTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlashTarget {
    fn from(port: &str) -> Self {
        FlashTarget::new(port)
    }
}

/// Source of candidate ports when none is given on the command line.
pub trait PortScanner {
    /// Deduplicated and sorted; may be empty.
    fn scan(&self) -> Vec<FlashTarget>;
}

/// Device node name prefixes of the USB-UART bridges found on ESP32 boards.
pub const DEVICE_PREFIXES: [&str; 4] = ["ttyUSB", "ttyACM", "cu.usbserial", "cu.SLAB_USBtoUART"];

/// Scans the serial ports of the host.
#[derive(Debug, Default)]
pub struct SystemPorts;

impl PortScanner for SystemPorts {
    #[cfg(windows)]
    fn scan(&self) -> Vec<FlashTarget> {
        match serialport::available_ports() {
            Ok(ports) => dedup(ports.into_iter().map(|p| FlashTarget::new(p.port_name))),
            Err(e) => {
                debug!("port enumeration failed ({}), probing COM1..COM20", e);
                let openable = (1..=20)
                    .map(|n| format!("COM{n}"))
                    .filter(|name| serialport::new(name.as_str(), 115_200).open().is_ok());
                dedup(openable.map(FlashTarget::new))
            }
        }
    }

    #[cfg(not(windows))]
    fn scan(&self) -> Vec<FlashTarget> {
        scan_dir(Path::new("/dev"), &DEVICE_PREFIXES)
    }
}

/// Entries of `dir` whose file name starts with one of `prefixes`, as full paths.
pub fn scan_dir(dir: &Path, prefixes: &[&str]) -> Vec<FlashTarget> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    dedup(entries.filter_map(|entry| entry.ok()).filter_map(|entry| {
        let name = entry.file_name();
        let name = name.to_str()?;
        prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix))
            .then(|| FlashTarget::new(entry.path().to_string_lossy().into_owned()))
    }))
}

fn dedup(ports: impl IntoIterator<Item = FlashTarget>) -> Vec<FlashTarget> {
    ports.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}
