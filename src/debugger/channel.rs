//! Line oriented request/response transport to an interactive debugger.
//!
//! Every request is a single line, every response is everything the debugger prints until its
//! ready prompt appears again. The real implementation drives a gdb process over a pseudo
//! terminal, tests use scripted fakes of [`CommandChannel`].

use crate::debugger::Error;
use log::{debug, warn};
use rexpect::session::{spawn_command, PtySession};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// gdb ready prompt.
pub const PROMPT: &str = "(gdb) ";
/// Default prompt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(9999);

const PROMPT_OR_QUERY_RE: &str = r"\(gdb\) |\(y or n\) ";
const POLL_INTERVAL_MS: u64 = 100;

/// Synchronous request/response interface to a debugger process.
///
/// At most one command is in flight: every method takes `&mut self` and blocks until the ready
/// prompt reappears.
pub trait CommandChannel {
    /// Send a command, return response lines (without command echo and prompt).
    ///
    /// # Arguments
    ///
    /// * `command`: single line command
    /// * `timeout`: how long to wait for a prompt, `None` means channel default
    fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<Vec<String>, Error>;

    /// Like [`CommandChannel::execute`] but answers `y` to any `(y or n)` query on the way.
    fn execute_confirmed(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, Error>;

    /// Send an out-of-band interrupt and wait for the next prompt.
    fn interrupt(&mut self) -> Result<Vec<String>, Error>;
}

impl<C: CommandChannel + ?Sized> CommandChannel for &mut C {
    fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<Vec<String>, Error> {
        (**self).execute(command, timeout)
    }

    fn execute_confirmed(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, Error> {
        (**self).execute_confirmed(command, timeout)
    }

    fn interrupt(&mut self) -> Result<Vec<String>, Error> {
        (**self).interrupt()
    }
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<Vec<String>, Error> {
        (**self).execute(command, timeout)
    }

    fn execute_confirmed(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, Error> {
        (**self).execute_confirmed(command, timeout)
    }

    fn interrupt(&mut self) -> Result<Vec<String>, Error> {
        (**self).interrupt()
    }
}

/// gdb process driven through a pseudo terminal.
pub struct GdbChannel {
    session: PtySession,
    default_timeout: Duration,
    /// Raised by UI (Ctrl-C) and lowered by UI once the command returns.
    interrupt_flag: Option<Arc<AtomicBool>>,
}

impl GdbChannel {
    /// Spawn a debugger and wait for its first prompt.
    ///
    /// # Arguments
    ///
    /// * `gdb_exec`: path to debugger executable
    /// * `default_timeout`: prompt timeout used when a command has no explicit one
    pub fn spawn(gdb_exec: &str, default_timeout: Duration) -> Result<Self, Error> {
        let mut cmd = Command::new(gdb_exec);
        cmd.arg("-q");
        let session = spawn_command(cmd, Some(POLL_INTERVAL_MS))
            .map_err(|e| Error::Spawn(format!("{gdb_exec}: {e}")))?;

        let mut channel = Self {
            session,
            default_timeout,
            interrupt_flag: None,
        };
        channel.wait_prompt("<startup>", default_timeout, false)?;
        channel.execute("set pagination off", None)?;
        channel.execute("set width 0", None)?;
        Ok(channel)
    }

    /// Attach a shared flag, raising it interrupts the command currently in flight.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt_flag = Some(flag);
        self
    }

    /// Terminate debugger process.
    pub fn kill(&mut self) {
        if let Err(e) = self.session.process.exit() {
            warn!(target: "gdb", "kill debugger process: {e}");
        }
    }

    fn send(&mut self, command: &str) -> Result<(), Error> {
        debug!(target: "gdb", "> {command}");
        self.session
            .send_line(command)
            .map_err(|e| Error::ChannelClosed(e.to_string()))?;
        Ok(())
    }

    fn interrupt_requested(&self) -> bool {
        self.interrupt_flag
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    fn wait_prompt(
        &mut self,
        command: &str,
        timeout: Duration,
        confirm: bool,
    ) -> Result<Vec<String>, Error> {
        let start = Instant::now();
        let mut output = String::new();
        let mut interrupted = false;

        loop {
            match self.session.exp_regex(PROMPT_OR_QUERY_RE) {
                Ok((before, matched)) => {
                    output.push_str(&before);
                    if matched.contains("y or n") {
                        output.push_str(&matched);
                        let answer = if confirm { "y" } else { "n" };
                        self.send(answer)?;
                        continue;
                    }

                    let lines = response_lines(&output, command);
                    lines
                        .iter()
                        .for_each(|line| debug!(target: "gdb", "< {line}"));
                    return Ok(lines);
                }
                Err(rexpect::error::Error::Timeout { .. }) => {
                    if !interrupted && self.interrupt_requested() {
                        debug!(target: "gdb", "> ^C");
                        self.session
                            .send_control('c')
                            .map_err(|e| Error::ChannelClosed(e.to_string()))?;
                        interrupted = true;
                    }
                    if start.elapsed() >= timeout {
                        return Err(Error::ChannelTimeout {
                            command: command.to_string(),
                            timeout,
                        });
                    }
                }
                Err(rexpect::error::Error::EOF { got, .. }) => {
                    output.push_str(&got);
                    return Err(Error::ChannelClosed(format!(
                        "debugger exited while executing `{command}`: {}",
                        output.trim()
                    )));
                }
                Err(e) => return Err(Error::ChannelClosed(e.to_string())),
            }
        }
    }
}

impl CommandChannel for GdbChannel {
    fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<Vec<String>, Error> {
        self.send(command)?;
        self.wait_prompt(command, timeout.unwrap_or(self.default_timeout), false)
    }

    fn execute_confirmed(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, Error> {
        self.send(command)?;
        self.wait_prompt(command, timeout.unwrap_or(self.default_timeout), true)
    }

    fn interrupt(&mut self) -> Result<Vec<String>, Error> {
        debug!(target: "gdb", "> ^C");
        self.session
            .send_control('c')
            .map_err(|e| Error::ChannelClosed(e.to_string()))?;
        self.wait_prompt("<interrupt>", self.default_timeout, false)
    }
}

/// Split raw output into lines, drop terminal echo of the command and empty lines.
fn response_lines(output: &str, command: &str) -> Vec<String> {
    let mut lines = output
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .skip_while(|l| l.trim().is_empty())
        .peekable();

    if lines.peek().map(|l| l.trim() == command.trim()) == Some(true) {
        lines.next();
    }

    lines.filter(|l| !l.trim().is_empty()).collect()
}
