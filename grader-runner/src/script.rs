//! Command sequencing
//!
//! Turns a job's command list into the single `/bin/sh` script a sandbox runs.

use std::fmt;
use std::str::FromStr;

/// How a failing command affects the commands after it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandPolicy {
    /// Abort at the first failing command; its status becomes the exit status
    #[default]
    StopOnFailure,

    /// Run every command; exit with the status of the last one that failed
    RunAll,
}

impl CommandPolicy {
    /// Renders `commands` into one script, preserving their order
    ///
    /// Stderr is folded into stdout first so the sandbox log is a single
    /// stream in emission order.
    pub fn render(&self, commands: &[String]) -> String {
        let commands = commands.iter().filter(|c| !c.trim().is_empty());
        let mut script = String::from("exec 2>&1\n");

        match self {
            CommandPolicy::StopOnFailure => {
                script.push_str("set -e\n");
                for command in commands {
                    script.push_str(command);
                    script.push('\n');
                }
            }
            CommandPolicy::RunAll => {
                script.push_str("__grader_status=0\n");
                for command in commands {
                    script.push_str(command);
                    script.push_str("\n__grader_rc=$?; [ $__grader_rc -eq 0 ] || __grader_status=$__grader_rc\n");
                }
                script.push_str("exit $__grader_status\n");
            }
        }

        script
    }
}

impl fmt::Display for CommandPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandPolicy::StopOnFailure => write!(f, "stop-on-failure"),
            CommandPolicy::RunAll => write!(f, "run-all"),
        }
    }
}

impl FromStr for CommandPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop-on-failure" | "stop" => Ok(CommandPolicy::StopOnFailure),
            "run-all" | "all" => Ok(CommandPolicy::RunAll),
            other => anyhow::bail!(
                "unknown command policy '{}' (expected stop-on-failure or run-all)",
                other
            ),
        }
    }
}
