use crate::debugger::address::Address;
use crate::debugger::channel::CommandChannel;
use crate::debugger::response::{parse_backtrace, parse_memory_words, parse_value};
use crate::debugger::Error;
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Granularity of `x/Nxw` reads.
pub const WORD_SIZE: usize = 4;
/// Marker of a frame without symbol information.
pub const UNRESOLVED_SYMBOL_MARKER: &str = "??";

/// Raw bytes of a target memory region, in the order the debugger renders words.
///
/// Images are only compared for equality and persisted, so the word rendering order is kept
/// as is (no endianness conversion).
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MemoryImage(Vec<u8>);

impl MemoryImage {
    /// Build an image from hex digits (no `0x` prefix).
    pub fn from_hex(digits: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(digits).map(MemoryImage)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for MemoryImage {
    fn from(bytes: Vec<u8>) -> Self {
        MemoryImage(bytes)
    }
}

impl Display for MemoryImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("0x{}", hex::encode(&self.0)))
    }
}

/// Call-stack snapshot as printed by the debugger, one line per frame.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Backtrace {
    frames: Vec<String>,
}

impl Backtrace {
    pub fn new(frames: Vec<String>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// Backtrace without unresolved frames. Frames the debugger can not symbolize usually mean
    /// that the unwinder walked into garbage.
    pub fn is_trustworthy(&self) -> bool {
        !self
            .frames
            .iter()
            .any(|f| f.contains(UNRESOLVED_SYMBOL_MARKER))
    }

    /// Remove build path prefix from source locations.
    pub fn strip_prefix(self, prefix: Option<&str>) -> Self {
        let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
            return self;
        };

        let at = format!(" at {prefix}");
        let from = format!(" from {prefix}");
        Self {
            frames: self
                .frames
                .into_iter()
                .map(|f| f.replace(&at, " at ").replace(&from, " from "))
                .collect(),
        }
    }
}

impl Display for Backtrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.frames.iter().join("\n"))
    }
}

/// Source of current register values.
pub trait RegisterRead {
    /// Return current value of a register (name without `%` or `$`).
    fn read_register(&mut self, name: &str) -> Result<u64, Error>;
}

/// Register and memory reads over a [`CommandChannel`].
pub struct Reader<'a, C: CommandChannel + ?Sized> {
    channel: &'a mut C,
}

impl<'a, C: CommandChannel + ?Sized> Reader<'a, C> {
    pub fn new(channel: &'a mut C) -> Self {
        Self { channel }
    }

    /// Evaluate an expression with `print/x`, return its numeric value.
    pub fn evaluate(&mut self, expr: &str) -> Result<u64, Error> {
        let lines = self.channel.execute(&format!("p/x {expr}"), None)?;
        parse_value(&lines)
    }

    /// Read `size` bytes at `addr`.
    ///
    /// Memory is read in words, so an over-read of the last word is truncated.
    pub fn read_memory(&mut self, addr: Address, size: usize) -> Result<MemoryImage, Error> {
        if size == 0 {
            return Ok(MemoryImage::default());
        }

        let words = size.div_ceil(WORD_SIZE);
        let lines = self.channel.execute(&format!("x/{words}xw {addr}"), None)?;
        let mut digits = parse_memory_words(&lines)?;

        if digits.len() < size * 2 {
            return Err(Error::parse("full memory dump", digits));
        }
        digits.truncate(size * 2);

        MemoryImage::from_hex(&digits).map_err(|_| Error::parse("hex digits", digits))
    }

    /// Capture current call stack.
    pub fn backtrace(&mut self) -> Result<Backtrace, Error> {
        let lines = self.channel.execute("bt", None)?;
        parse_backtrace(&lines).map(Backtrace::new)
    }
}

impl<C: CommandChannel + ?Sized> RegisterRead for Reader<'_, C> {
    fn read_register(&mut self, name: &str) -> Result<u64, Error> {
        self.evaluate(&format!("${name}"))
    }
}
