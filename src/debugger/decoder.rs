//! Operand decoder: which memory location (if any) an AT&T syntax instruction writes to.
//!
//! The decoder under-approximates: everything it does not understand is treated as an
//! instruction without memory effect and logged at info level.

use crate::debugger::address::Address;
use crate::debugger::reader::RegisterRead;
use crate::debugger::Error;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

/// Width of every decoded operand.
///
/// Operand size is never derived from the mnemonic suffix or the operand itself: trace diffs
/// and stored images assume this constant.
pub const OPERAND_WIDTH: usize = 4;

/// Mnemonics without a tracked memory effect. Comparisons, calls, returns, stack operations and
/// string-repeat prefixes either do not write program memory or only touch the stack.
/// A single `b|w|l|q` size suffix is accepted after each of them, every `j*` is a jump.
const IGNORED_MNEMONICS: &[&str] = &[
    "cmp", "cmps", "test", "scas", "call", "lcall", "ret", "lret", "iret", "push", "pushf",
    "pusha", "pop", "popf", "popa", "rep", "repe", "repz", "repne", "repnz",
];

static REGISTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^%[a-z0-9]+$").expect("valid regex"));
static ABSOLUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$?0x([0-9a-fA-F]+)$").expect("valid regex"));
static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-)?0x([0-9a-fA-F]+)\(%([a-z0-9]+)\)$").expect("valid regex")
});

/// Memory destination of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOperand {
    pub address: Address,
    pub width: usize,
}

/// Return true if instruction never has a tracked memory effect.
pub fn is_ignored(mnemonic: &str) -> bool {
    let mnemonic = mnemonic.trim().to_ascii_lowercase();
    if mnemonic.starts_with('j') {
        return true;
    }

    IGNORED_MNEMONICS.iter().any(|base| {
        mnemonic == *base
            || (mnemonic.len() == base.len() + 1
                && mnemonic.starts_with(base)
                && matches!(mnemonic.as_bytes()[base.len()], b'b' | b'w' | b'l' | b'q'))
    })
}

/// Split operand list by top level commas (commas inside `(...)` belong to one operand).
fn split_operands(text: &str) -> Vec<&str> {
    let mut operands = vec![];
    let mut depth = 0_i32;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                operands.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    operands.push(text[start..].trim());
    operands.retain(|op| !op.is_empty());
    operands
}

/// Remove debugger annotations (`# 0x... <sym>` comments and `<sym+off>` labels).
fn strip_annotations(text: &str) -> &str {
    let text = text.split('#').next().unwrap_or_default();
    text.split('<').next().unwrap_or_default().trim()
}

/// Decode the memory destination of an instruction.
///
/// Register-relative destinations are resolved with the current register values, so the
/// result is only valid right before the instruction executes.
///
/// # Arguments
///
/// * `mnemonic`: instruction mnemonic
/// * `operands`: operand text in AT&T order (source first, destination last)
/// * `registers`: live register source
pub fn decode<R: RegisterRead + ?Sized>(
    mnemonic: &str,
    operands: &str,
    registers: &mut R,
) -> Result<Option<MemoryOperand>, Error> {
    if is_ignored(mnemonic) {
        return Ok(None);
    }

    let operand_list = split_operands(strip_annotations(operands));
    let [_, destination] = operand_list.as_slice() else {
        info!(target: "debugger", "instruction format not understood: {mnemonic} {operands}");
        return Ok(None);
    };

    if REGISTER_RE.is_match(destination) {
        return Ok(None);
    }

    if let Some(caps) = ABSOLUTE_RE.captures(destination) {
        let address = u64::from_str_radix(&caps[1], 16)
            .map_err(|_| Error::parse("hex address", *destination))?;
        return Ok(Some(MemoryOperand {
            address: Address::from(address),
            width: OPERAND_WIDTH,
        }));
    }

    if let Some(caps) = RELATIVE_RE.captures(destination) {
        let displacement = i64::from_str_radix(&caps[2], 16)
            .map_err(|_| Error::parse("hex displacement", *destination))?;
        let displacement = if caps.get(1).is_some() {
            -displacement
        } else {
            displacement
        };
        let base = registers.read_register(&caps[3])?;
        return Ok(Some(MemoryOperand {
            address: Address::from(base).offset(displacement),
            width: OPERAND_WIDTH,
        }));
    }

    info!(target: "debugger", "destination format not handled: {mnemonic} {operands}");
    Ok(None)
}
