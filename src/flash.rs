// Copyright © 2023-2024 Vouch.io LLC

use humantime::format_duration;
use log::{debug, info, warn};
use std::fmt;
use std::time::{Duration, Instant};

use crate::plan::FlashPlan;
use crate::ports::FlashTarget;
use crate::report::Reporter;
use crate::runner::ProcessRunner;
use crate::tool::ToolInvocation;

/// Result of flashing one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOutcome {
    Success,
    /// The write step was skipped.
    EraseFailed,
    WriteFailed,
}

/// Per-port ledger of one batch, in the order the ports were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub outcomes: Vec<(FlashTarget, FlashOutcome)>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == FlashOutcome::Success)
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }

    pub fn outcome(&self, target: &FlashTarget) -> Option<FlashOutcome> {
        self.outcomes
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, outcome)| *outcome)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{} succeeded", self.succeeded(), self.total())
    }
}

/// Runs erase and write on each port in turn.
///
/// Ports are independent: whatever happens on one, the next is still
/// processed, and every port ends up with exactly one outcome.
pub struct Orchestrator<'a, R: ProcessRunner> {
    runner: R,
    tool: &'a ToolInvocation,
    reporter: &'a Reporter,
}

impl<'a, R: ProcessRunner> Orchestrator<'a, R> {
    pub fn new(runner: R, tool: &'a ToolInvocation, reporter: &'a Reporter) -> Self {
        Orchestrator {
            runner,
            tool,
            reporter,
        }
    }

    pub fn run(&mut self, targets: &[FlashTarget], plan: &FlashPlan) -> Summary {
        let mut summary = Summary::default();
        for target in targets {
            self.reporter.rule();
            self.reporter.info(format!("port: {target}"));
            self.reporter.rule();

            let outcome = self.flash_one(target, plan);
            debug!("{}: {:?}", target, outcome);
            summary.outcomes.push((target.clone(), outcome));
        }
        summary
    }

    fn flash_one(&mut self, target: &FlashTarget, plan: &FlashPlan) -> FlashOutcome {
        let start_time = Instant::now();

        if plan.erase {
            if !self.erase(target, plan) {
                self.reporter.error(format!("[{target}] flash erase failed"));
                return FlashOutcome::EraseFailed;
            }
            self.reporter.success(format!("[{target}] flash erased"));
        } else {
            self.reporter.warning(format!("[{target}] skipping flash erase"));
        }

        if !self.write(target, plan) {
            self.reporter.error(format!("[{target}] flashing failed"));
            return FlashOutcome::WriteFailed;
        }

        let elapsed = Duration::from_secs(start_time.elapsed().as_secs_f64().round() as u64);
        info!("{} took {}", target, format_duration(elapsed));
        self.reporter
            .success(format!("[{target}] flashed in {}", format_duration(elapsed)));
        FlashOutcome::Success
    }

    /// `erase_flash` on one port.
    pub fn erase(&mut self, target: &FlashTarget, plan: &FlashPlan) -> bool {
        self.reporter.info(format!("[{target}] erasing flash..."));
        self.invoke(target, plan, None, "erase_flash", Vec::new())
    }

    /// `write_flash` of bootloader, partition table and application at their offsets.
    pub fn write(&mut self, target: &FlashTarget, plan: &FlashPlan) -> bool {
        self.reporter.info(format!("[{target}] writing firmware..."));
        self.invoke(
            target,
            plan,
            Some(plan.baud),
            "write_flash",
            plan.write_args(),
        )
    }

    fn invoke(
        &mut self,
        target: &FlashTarget,
        plan: &FlashPlan,
        baud: Option<u32>,
        command: &str,
        args: Vec<String>,
    ) -> bool {
        let mut tool_args = vec![
            "--chip".to_string(),
            plan.chip.clone(),
            "--port".to_string(),
            target.to_string(),
        ];
        if let Some(baud) = baud {
            tool_args.push("--baud".to_string());
            tool_args.push(baud.to_string());
        }
        tool_args.push(command.to_string());
        tool_args.extend(args);
        let argv = self.tool.command(tool_args);

        self.reporter.info(format!("running: {}", argv.join(" ")));
        let pb = self.reporter.spinner(format!("[{target}] {command}"));
        let result = self.runner.run(&argv);
        pb.finish_and_clear();

        match result {
            Ok(output) if output.success() => {
                self.reporter.raw(&output.stdout);
                true
            }
            Ok(output) => {
                warn!("{} {} exited with {:?}", target, command, output.exit_code);
                self.reporter
                    .error(format!("{command} failed:\n{}", output.stderr.trim_end()));
                false
            }
            Err(e) => {
                warn!("{} {} could not start: {}", target, command, e);
                self.reporter
                    .error(format!("failed to start `{}`: {}", self.tool, e));
                false
            }
        }
    }
}
