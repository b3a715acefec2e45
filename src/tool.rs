// Copyright © 2023-2024 Vouch.io LLC

use log::{debug, info};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FlashError, Result};
use crate::runner::ProcessRunner;

const TOOL_NAMES: [&str; 2] = ["esptool.py", "esptool"];
const PROBE_ARG: &str = "version";

#[cfg(windows)]
const WHICH: &str = "where";
#[cfg(not(windows))]
const WHICH: &str = "which";

#[cfg(windows)]
const PYTHONS: [&str; 2] = ["py", "python"];
#[cfg(not(windows))]
const PYTHONS: [&str; 2] = ["python3", "python"];

/// Command prefix that starts the flasher, e.g. `esptool.py` or `python3 -m esptool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    prefix: Vec<String>,
}

impl ToolInvocation {
    pub fn program(program: impl Into<String>) -> Self {
        ToolInvocation {
            prefix: vec![program.into()],
        }
    }

    pub fn module(interpreter: impl Into<String>, module: impl Into<String>) -> Self {
        ToolInvocation {
            prefix: vec![interpreter.into(), "-m".to_string(), module.into()],
        }
    }

    /// Full argv: the invocation prefix followed by `args`.
    pub fn command<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix
            .iter()
            .cloned()
            .chain(args.into_iter().map(Into::into))
            .collect()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.prefix.join(" "))
    }
}

/// One way of finding the flasher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Bare command name resolved by the OS search path.
    Bare(String),
    /// Ask `which`/`where` for the location of a command.
    SearchPath(String),
    /// A concrete file; skipped if it does not exist.
    File(PathBuf),
    /// `<interpreter> -m esptool`.
    PythonModule(String),
}

impl Strategy {
    pub fn attempt<R: ProcessRunner + ?Sized>(&self, runner: &mut R) -> Option<ToolInvocation> {
        match self {
            Strategy::Bare(name) => probe(runner, ToolInvocation::program(name.as_str())),
            Strategy::SearchPath(name) => {
                let argv = vec![WHICH.to_string(), name.clone()];
                let output = runner.run(&argv).ok().filter(|out| out.success())?;
                let found = output.stdout.lines().next()?.trim();
                if found.is_empty() {
                    return None;
                }
                probe(runner, ToolInvocation::program(found))
            }
            Strategy::File(path) => {
                if !path.is_file() {
                    return None;
                }
                probe(
                    runner,
                    ToolInvocation::program(path.to_string_lossy().into_owned()),
                )
            }
            Strategy::PythonModule(interpreter) => {
                probe(runner, ToolInvocation::module(interpreter.as_str(), "esptool"))
            }
        }
    }
}

fn probe<R: ProcessRunner + ?Sized>(
    runner: &mut R,
    candidate: ToolInvocation,
) -> Option<ToolInvocation> {
    match runner.run(&candidate.command([PROBE_ARG])) {
        Ok(output) if output.success() => Some(candidate),
        Ok(output) => {
            debug!("probe `{}` exited with {:?}", candidate, output.exit_code);
            None
        }
        Err(e) => {
            debug!("probe `{}` failed: {}", candidate, e);
            None
        }
    }
}

fn install_guesses() -> Vec<PathBuf> {
    let mut guesses = Vec::new();
    if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        guesses.push(Path::new(&home).join(".local/bin/esptool.py"));
    }
    guesses.push(PathBuf::from("/usr/local/bin/esptool.py"));
    guesses.push(PathBuf::from("/opt/homebrew/bin/esptool.py"));
    if let Some(appdata) = env::var_os("APPDATA") {
        guesses.push(Path::new(&appdata).join("Python").join("Scripts").join("esptool.exe"));
    }
    guesses
}

/// Ordered list of strategies, first success wins.
#[derive(Debug, Clone)]
pub struct Locator {
    strategies: Vec<Strategy>,
}

impl Locator {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Locator { strategies }
    }

    /// The standard search order, preceded by `explicit` if the user named a path.
    pub fn with_defaults(explicit: Option<&Path>) -> Self {
        let mut strategies = Vec::new();
        if let Some(path) = explicit {
            strategies.push(Strategy::Bare(path.to_string_lossy().into_owned()));
        }
        strategies.extend(TOOL_NAMES.iter().map(|name| Strategy::Bare(name.to_string())));
        strategies.push(Strategy::SearchPath(TOOL_NAMES[0].to_string()));
        strategies.extend(install_guesses().into_iter().map(Strategy::File));
        strategies.extend(PYTHONS.iter().map(|py| Strategy::PythonModule(py.to_string())));
        Locator { strategies }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn locate<R: ProcessRunner + ?Sized>(&self, runner: &mut R) -> Result<ToolInvocation> {
        for strategy in &self.strategies {
            debug!("trying {:?}", strategy);
            if let Some(tool) = strategy.attempt(runner) {
                info!("using flasher `{}`", tool);
                return Ok(tool);
            }
        }
        Err(FlashError::ToolNotFound)
    }
}
