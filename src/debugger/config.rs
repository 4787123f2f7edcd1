use crate::debugger::channel::DEFAULT_TIMEOUT;
use crate::debugger::fingerprint::ExecStartFingerprint;
use std::path::PathBuf;
use std::time::Duration;

/// User-level executable whose variables may be watched.
#[derive(Debug, Clone, PartialEq)]
pub struct UserTarget {
    pub path: PathBuf,
    pub fingerprint: ExecStartFingerprint,
}

/// Session configuration.
///
/// Built once by an interface and passed by reference into the session, changed only while
/// no session is running.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Debugger executable.
    pub gdb_exec: String,
    /// Emulator executable.
    pub qemu_exec: String,
    /// Emulator arguments placed before replay arguments.
    pub qemu_args: Vec<String>,
    /// Emulator argument that enables replay mode, followed by a replay file.
    pub replay_keyword: String,
    pub replay_file: PathBuf,
    /// Disk image of a replayed machine.
    pub image: Option<PathBuf>,
    /// Kernel image with symbols.
    pub vmlinux: PathBuf,
    /// Debug stub address of an emulator.
    pub remote: String,
    /// Build path prefix removed from source locations in backtraces.
    pub strip_prefix: Option<String>,
    /// Timeout of every debugger command.
    pub command_timeout: Duration,
    pub user_exec: Option<UserTarget>,
}

/// Emulator arguments every replay needs: debug stub and exit on guest reboot.
const DEFAULT_QEMU_ARGS: [&str; 2] = ["-s", "-no-reboot"];

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gdb_exec: "gdb".to_string(),
            qemu_exec: "qemu".to_string(),
            qemu_args: DEFAULT_QEMU_ARGS.iter().map(|a| a.to_string()).collect(),
            replay_keyword: "-replay".to_string(),
            replay_file: PathBuf::from("r.log"),
            image: None,
            vmlinux: PathBuf::from("vmlinux"),
            remote: "localhost:1234".to_string(),
            strip_prefix: None,
            command_timeout: DEFAULT_TIMEOUT,
            user_exec: None,
        }
    }
}

impl SessionConfig {
    /// Set emulator executable. Extra arguments are appended to the default ones,
    /// arguments of a previous call are dropped.
    pub fn set_qemu(&mut self, exec: String, args: Vec<String>) {
        self.qemu_exec = exec;
        self.qemu_args = DEFAULT_QEMU_ARGS.iter().map(|a| a.to_string()).collect();
        self.qemu_args.extend(args);
    }
}
