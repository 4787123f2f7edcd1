use crate::debugger::address::Address;
use crate::debugger::channel::{CommandChannel, GdbChannel};
use crate::debugger::reader::{MemoryImage, Reader};
use crate::debugger::response::parse_entry_point;
use crate::debugger::Error;
use log::debug;
use std::path::Path;
use std::time::Duration;

/// Number of bytes captured at an executable entry point.
pub const FINGERPRINT_LEN: usize = 16;

/// First bytes of an executable at its entry point.
///
/// Used only as an equality key: a breakpoint at the entry point is considered a real
/// executable start only if memory at the entry point still holds these bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecStartFingerprint {
    entry: Address,
    bytes: MemoryImage,
}

impl ExecStartFingerprint {
    pub fn new(entry: Address, bytes: MemoryImage) -> Self {
        Self { entry, bytes }
    }

    /// Capture fingerprint of an executable file with a throwaway debugger instance.
    ///
    /// # Arguments
    ///
    /// * `gdb_exec`: debugger executable
    /// * `exe_path`: path to target executable
    /// * `timeout`: per command timeout
    pub fn capture(gdb_exec: &str, exe_path: &Path, timeout: Duration) -> Result<Self, Error> {
        let mut channel = GdbChannel::spawn(gdb_exec, timeout)?;
        let fingerprint = Self::read_from(&mut channel, exe_path);
        channel.kill();
        fingerprint
    }

    /// Load executable into a debugger and read its entry point bytes.
    pub fn read_from<C: CommandChannel + ?Sized>(
        channel: &mut C,
        exe_path: &Path,
    ) -> Result<Self, Error> {
        channel.execute_confirmed(&format!("file {}", exe_path.display()), None)?;
        let entry = parse_entry_point(&channel.execute("info file", None)?)?;
        let bytes = Reader::new(channel).read_memory(entry, FINGERPRINT_LEN)?;
        debug!(target: "debugger", "{} fingerprint at {entry}: {bytes}", exe_path.display());
        Ok(Self { entry, bytes })
    }

    pub fn entry(&self) -> Address {
        self.entry
    }

    pub fn bytes(&self) -> &MemoryImage {
        &self.bytes
    }

    /// Compare fingerprint with live memory at the entry point.
    /// Unreadable memory never matches.
    pub fn matches<C: CommandChannel + ?Sized>(&self, reader: &mut Reader<C>) -> Result<bool, Error> {
        match reader.read_memory(self.entry, self.bytes.len()) {
            Ok(image) => Ok(image == self.bytes),
            Err(Error::MemoryAccess(addr)) => {
                debug!(target: "debugger", "fingerprint memory at {addr} is not accessible");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
