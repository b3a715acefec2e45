// Copyright © 2023-2024 Vouch.io LLC

use log::{debug, trace};
use std::io;
use std::process::Command;

/// Captured result of one external process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    // None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Narrow seam over subprocess execution.
///
/// `argv[0]` is the program, the rest are its arguments. An `Err` means the
/// process could not be spawned at all (program missing, permission denied);
/// a process that ran and failed is an `Ok` with a non-zero exit code.
pub trait ProcessRunner {
    fn run(&mut self, argv: &[String]) -> io::Result<ProcessOutput>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &mut R {
    fn run(&mut self, argv: &[String]) -> io::Result<ProcessOutput> {
        (**self).run(argv)
    }
}

/// Runs processes for real, waiting for them to exit and capturing both streams.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, argv: &[String]) -> io::Result<ProcessOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

        debug!("spawn: {}", argv.join(" "));
        let output = Command::new(program).args(args).output()?;
        let result = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!("{} exited with {:?}", program, result.exit_code);
        Ok(result)
    }
}
