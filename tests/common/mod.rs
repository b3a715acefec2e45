#![allow(dead_code)]

use esp32_flasher::{FlashTarget, PortScanner, ProcessOutput, ProcessRunner};
use std::io;

/// Answers by substring match on the joined command line, first rule wins.
/// Unmatched command lines fail to spawn.
#[derive(Default)]
pub struct FakeRunner {
    rules: Vec<(String, i32)>,
    pub calls: Vec<String>,
}

impl FakeRunner {
    /// Runner on which `esptool.py` is installed and every esptool command exits 0.
    pub fn healthy() -> Self {
        FakeRunner::default()
            .exits("esptool.py version", 0)
            .exits("erase_flash", 0)
            .exits("write_flash", 0)
    }

    pub fn exits(mut self, needle: &str, code: i32) -> Self {
        self.rules.push((needle.to_string(), code));
        self
    }

    /// Same as `exits`, but takes precedence over earlier rules.
    pub fn first_exits(mut self, needle: &str, code: i32) -> Self {
        self.rules.insert(0, (needle.to_string(), code));
        self
    }

    pub fn flasher_calls(&self) -> Vec<&String> {
        self.calls
            .iter()
            .filter(|line| line.contains("erase_flash") || line.contains("write_flash"))
            .collect()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&mut self, argv: &[String]) -> io::Result<ProcessOutput> {
        let line = argv.join(" ");
        self.calls.push(line.clone());
        match self.rules.iter().find(|(needle, _)| line.contains(needle.as_str())) {
            Some((_, code)) => Ok(ProcessOutput {
                exit_code: Some(*code),
                stdout: format!("{line}\n"),
                stderr: if *code == 0 {
                    String::new()
                } else {
                    "A fatal error occurred: Failed to connect to ESP32\n".to_string()
                },
            }),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "not installed")),
        }
    }
}

pub struct FixedPorts(pub Vec<&'static str>);

impl PortScanner for FixedPorts {
    fn scan(&self) -> Vec<FlashTarget> {
        self.0.iter().copied().map(FlashTarget::from).collect()
    }
}
