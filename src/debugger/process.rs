use crate::debugger::Error;
use log::{debug, info, warn};
use os_pipe::PipeReader;
use std::io::{BufRead, BufReader};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::JoinHandle;

/// Resolve an executable name through `PATH` if it is not an existing path.
pub fn resolve_executable(path: &str) -> Result<PathBuf, Error> {
    if Path::new(path).exists() {
        return Ok(PathBuf::from(path));
    }
    which::which(path).map_err(|e| Error::Spawn(format!("{path}: {e}")))
}

/// Emulator process replaying a recorded execution.
///
/// Owned by a session, killed when dropped.
pub struct Emulator {
    child: Child,
    forwarder: Option<JoinHandle<()>>,
}

impl Emulator {
    /// Start emulator in replay mode: `<exec> <args..> <replay_keyword> <replay_file> [image]`.
    /// Emulator stdout and stderr are forwarded into the log.
    pub fn spawn(
        exec: &str,
        args: &[String],
        replay_keyword: &str,
        replay_file: &Path,
        image: Option<&Path>,
    ) -> Result<Self, Error> {
        let exec = resolve_executable(exec)?;
        let (reader, writer) = os_pipe::pipe()?;

        let mut cmd = Command::new(&exec);
        cmd.args(args)
            .arg(replay_keyword)
            .arg(replay_file)
            .args(image)
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer)
            // terminal Ctrl-C is handled by the shell, not by the emulator
            .process_group(0);

        debug!(target: "emulator", "spawn {cmd:?}");
        let child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {e}", exec.display())))?;
        // forwarder sees EOF only after the last writer in this process is closed
        drop(cmd);

        let forwarder = thread::spawn(move || forward_output(reader));
        info!(target: "emulator", "emulator started, pid {}", child.id());

        Ok(Self {
            child,
            forwarder: Some(forwarder),
        })
    }

    /// Return true if emulator process is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill emulator process and wait for it.
    pub fn kill(&mut self) {
        if self.is_running() {
            if let Err(e) = self.child.kill() {
                warn!(target: "emulator", "kill emulator: {e}");
            }
        }
        match self.child.wait() {
            Ok(status) => debug!(target: "emulator", "emulator exited: {status}"),
            Err(e) => warn!(target: "emulator", "wait emulator: {e}"),
        }
        if let Some(forwarder) = self.forwarder.take() {
            _ = forwarder.join();
        }
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.kill();
    }
}

fn forward_output(reader: PipeReader) {
    let stream = BufReader::new(reader);
    for line in stream.lines() {
        match line {
            Ok(line) => info!(target: "emulator", "{line}"),
            Err(e) => {
                debug!(target: "emulator", "output stream: {e}");
                break;
            }
        }
    }
}
