use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error};

use super::Probe;
use crate::error::ProbeError;
use crate::value::Value;

/// Runs a monitor's `system` argument through a shell and reads its first
/// line of output.
pub struct ShellProbe {
    /// The shell binary to invoke with `-c <argument>`, e.g. `/bin/sh`.
    shell: String,
}

impl ShellProbe {
    pub fn new(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }
}

impl Default for ShellProbe {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

#[async_trait]
impl Probe for ShellProbe {
    async fn probe(&self, argument: &str) -> Option<Value> {
        let mut child = match Command::new(&self.shell)
            .arg("-c")
            .arg(argument)
            .stdout(std::process::Stdio::piped())
            .stdin(std::process::Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("`{}`: {}", argument, ProbeError::Spawn(e));
                return None;
            }
        };

        let stdout = child.stdout.take()?;
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let read = reader.read_line(&mut line).await;

        // Exit status is read to reap the child; its value isn't
        // inspected, matching "exit status of the child is otherwise
        // unchecked".
        let _ = child.wait().await;

        match read {
            Ok(0) => {
                error!("`{}`: {}", argument, ProbeError::NoOutput);
                None
            }
            Ok(_) => {
                let trimmed = line.trim_end();
                debug!("`{}` -> `{}`", argument, trimmed);
                // §4.B: fails (returns absent) when the line does not
                // parse as a double, matching `system_solve_response`
                // (poller/system.c), which rejects a non-numeric first
                // line rather than passing it through as a string.
                match Value::from_bytes(trimmed.as_bytes().to_vec()) {
                    v @ Value::Number(_) => Some(v),
                    Value::String(_) => {
                        error!("`{}`: line `{}` did not parse as a double", argument, trimmed);
                        None
                    }
                    Value::Vector { .. } => unreachable!("from_bytes never returns a Vector"),
                }
            }
            Err(e) => {
                error!("`{}`: {}", argument, ProbeError::Spawn(e));
                None
            }
        }
    }
}
