use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

/// Address in the replayed target address space.
///
/// Values come from the debugger (register prints, disassembly, `info file`), so no relocation
/// is applied: the debugger already reports runtime addresses.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Address(u64);

impl Address {
    /// Apply a signed displacement, wrapping around the address space like the CPU does.
    pub fn offset(self, offset: i64) -> Address {
        if offset >= 0 {
            self.0.wrapping_add(offset as u64)
        } else {
            self.0.wrapping_sub(offset.unsigned_abs())
        }
        .into()
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for Address {
    fn from(addr: u64) -> Self {
        Address(addr)
    }
}

impl From<usize> for Address {
    fn from(addr: usize) -> Self {
        Address(addr as u64)
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#x}", self.0))
    }
}

impl FromStr for Address {
    type Err = ParseIntError;

    /// Parse `0x`-prefixed hex or plain hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16).map(Address)
    }
}
