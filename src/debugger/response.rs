//! Debugger response grammar.
//!
//! One pattern per expected response shape. Every parser returns a typed value or
//! [`Error::ProtocolParse`], nothing here relies on the position of a line in a response.

use crate::debugger::address::Address;
use crate::debugger::Error;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

static VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$\d+\s*=\s*(?:\([^)]*\)\s*)?(0x[0-9a-fA-F]+|-?\d+)").expect("valid regex")
});
static MEMORY_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*0x[0-9a-fA-F]+(?:\s*<[^>]*>)?:\s*(.*)$").expect("valid regex")
});
static MEMORY_ACCESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Cannot access memory at address (0x[0-9a-fA-F]+)").expect("valid regex")
});
static INSTRUCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^=>\s*(0x[0-9a-fA-F]+)(?:\s*<[^>]*>)?:\s*(\S+)\s*(.*)$").expect("valid regex")
});
static BREAKPOINT_HIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Thread \d+ hit )?Breakpoint (\d+),").expect("valid regex"));
static BREAKPOINT_SET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Breakpoint (\d+) at ").expect("valid regex"));
static WATCHPOINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:Thread \d+ hit )?(?:Hardware )?(?:read |access \(read/write\) )?[Ww]atchpoint (\d+): (.+)$",
    )
    .expect("valid regex")
});
static OLD_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Old value = (.*)$").expect("valid regex"));
static NEW_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:New value|Value) = (.*)$").expect("valid regex"));
static SIGNAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Program received signal (\w+)").expect("valid regex"));
static EXITED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[Inferior \d+ .*exited").expect("valid regex"));
static DISPLAY_SET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+): x/i ").expect("valid regex"));
static ENTRY_POINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Entry point:\s*(0x[0-9a-fA-F]+)").expect("valid regex"));

/// Instruction shown by `display/i $pc` or `x/i $pc`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedInstruction {
    pub pc: Address,
    pub mnemonic: String,
    pub operands: String,
}

/// What the debugger displays after a single instruction step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepView {
    Instruction(DisplayedInstruction),
    /// Memory at program counter can not be read right now (e.g. mid context switch).
    MemoryInaccessible,
}

/// Reason of a target stop after a resuming command.
#[derive(Debug, Clone, PartialEq)]
pub enum StopEvent {
    Breakpoint {
        number: u32,
    },
    Watchpoint {
        number: u32,
        expression: String,
        old: Option<String>,
        new: Option<String>,
    },
    Interrupted,
    Signal(String),
    /// Remote target has gone (replay reached its end or emulator died).
    ConnectionClosed,
    NotRunning,
    Unrecognized(String),
}

fn joined(lines: &[String]) -> String {
    lines.iter().join("\n")
}

fn parse_number(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<i64>().ok().map(|v| v as u64)
    }
}

fn memory_access_error(lines: &[String]) -> Option<Error> {
    lines.iter().find_map(|l| {
        MEMORY_ACCESS_RE.captures(l).map(|caps| {
            let addr = caps[1].parse::<Address>().unwrap_or_default();
            Error::MemoryAccess(addr)
        })
    })
}

/// Parse `print` command result (`$1 = 0x1000`).
pub fn parse_value(lines: &[String]) -> Result<u64, Error> {
    lines
        .iter()
        .find_map(|l| VALUE_RE.captures(l.trim()))
        .and_then(|caps| parse_number(&caps[1]))
        .ok_or_else(|| Error::parse("`$N = <value>`", joined(lines)))
}

/// Parse `x/Nxw` command result into a concatenation of word hex digits (without `0x`).
pub fn parse_memory_words(lines: &[String]) -> Result<String, Error> {
    if let Some(e) = memory_access_error(lines) {
        return Err(e);
    }
    if lines.is_empty() {
        return Err(Error::parse("memory dump", ""));
    }

    let mut digits = String::new();
    for line in lines {
        let caps = MEMORY_LINE_RE
            .captures(line)
            .ok_or_else(|| Error::parse("`<address>:<tab><hex>...`", line.as_str()))?;
        for word in caps[1].split_whitespace() {
            let word_digits = word
                .strip_prefix("0x")
                .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_hexdigit()))
                .ok_or_else(|| Error::parse("hex word", line.as_str()))?;
            digits.push_str(word_digits);
        }
    }
    Ok(digits)
}

/// Parse a displayed instruction line (`=> 0x8048454 <main+9>:\tmovl   $0x5,0x100`).
pub fn parse_instruction(lines: &[String]) -> Result<StepView, Error> {
    if memory_access_error(lines).is_some() {
        return Ok(StepView::MemoryInaccessible);
    }

    let caps = lines
        .iter()
        .find_map(|l| INSTRUCTION_RE.captures(l.trim()))
        .ok_or_else(|| Error::parse("`=> <pc>:<tab><instruction>`", joined(lines)))?;

    let pc = caps[1]
        .parse::<Address>()
        .map_err(|_| Error::parse("program counter", &caps[1]))?;
    let mut mnemonic = caps[2].to_string();
    let mut operands = caps[3].trim().to_string();

    // `lock` is a prefix, the real mnemonic follows it
    if mnemonic == "lock" {
        let (real, rest) = operands
            .split_once(char::is_whitespace)
            .map(|(m, o)| (m.to_string(), o.trim().to_string()))
            .unwrap_or_else(|| (operands.clone(), String::new()));
        mnemonic = real;
        operands = rest;
    }

    Ok(StepView::Instruction(DisplayedInstruction {
        pc,
        mnemonic,
        operands,
    }))
}

/// Parse a response to a resuming command (`continue`, `stepi` over a trap).
pub fn parse_stop(lines: &[String]) -> StopEvent {
    for (idx, line) in lines.iter().enumerate() {
        let line = line.trim();

        if let Some(caps) = WATCHPOINT_RE.captures(line) {
            let number = caps[1].parse().unwrap_or_default();
            let expression = caps[2].trim().to_string();
            let rest = &lines[idx + 1..];
            let old = rest
                .iter()
                .find_map(|l| OLD_VALUE_RE.captures(l.trim()))
                .map(|caps| caps[1].to_string());
            let new = rest
                .iter()
                .find_map(|l| NEW_VALUE_RE.captures(l.trim()))
                .map(|caps| caps[1].to_string());
            return StopEvent::Watchpoint {
                number,
                expression,
                old,
                new,
            };
        }
        if let Some(caps) = BREAKPOINT_HIT_RE.captures(line) {
            return StopEvent::Breakpoint {
                number: caps[1].parse().unwrap_or_default(),
            };
        }
        if line.contains("Remote connection closed") {
            return StopEvent::ConnectionClosed;
        }
        if line.starts_with("The program is not being run") || EXITED_RE.is_match(line) {
            return StopEvent::NotRunning;
        }
        if let Some(caps) = SIGNAL_RE.captures(line) {
            return if &caps[1] == "SIGINT" {
                StopEvent::Interrupted
            } else {
                StopEvent::Signal(caps[1].to_string())
            };
        }
        if line == "Quit" {
            return StopEvent::Interrupted;
        }
    }

    StopEvent::Unrecognized(joined(lines))
}

/// Parse `break *ADDR` response, return breakpoint number.
pub fn parse_breakpoint_set(lines: &[String]) -> Result<u32, Error> {
    lines
        .iter()
        .find_map(|l| BREAKPOINT_SET_RE.captures(l.trim()))
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| Error::parse("`Breakpoint N at <address>`", joined(lines)))
}

/// Parse `watch EXPR` response, return watchpoint number.
pub fn parse_watchpoint_set(lines: &[String]) -> Result<u32, Error> {
    lines
        .iter()
        .find_map(|l| WATCHPOINT_RE.captures(l.trim()))
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| Error::parse("`[Hardware ]watchpoint N: <expr>`", joined(lines)))
}

/// Parse `display/i EXPR` response, return display number.
pub fn parse_display_set(lines: &[String]) -> Result<u32, Error> {
    lines
        .iter()
        .find_map(|l| DISPLAY_SET_RE.captures(l.trim()))
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| Error::parse("`N: x/i <expr>`", joined(lines)))
}

/// Parse `info file` response, return executable entry point.
pub fn parse_entry_point(lines: &[String]) -> Result<Address, Error> {
    lines
        .iter()
        .find_map(|l| ENTRY_POINT_RE.captures(l))
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| Error::parse("`Entry point: <address>`", joined(lines)))
}

/// Parse `bt` response into frame lines. `No stack.` is an empty backtrace.
pub fn parse_backtrace(lines: &[String]) -> Result<Vec<String>, Error> {
    if lines.iter().any(|l| l.trim() == "No stack.") {
        return Ok(vec![]);
    }

    let mut frames: Vec<String> = vec![];
    for line in lines {
        if line.trim_start().starts_with('#') {
            frames.push(line.trim().to_string());
        } else if let Some(last) = frames.last_mut() {
            // wrapped frame continuation
            last.push(' ');
            last.push_str(line.trim());
        }
    }

    if frames.is_empty() {
        return Err(Error::parse("`#N <frame>` lines", joined(lines)));
    }
    Ok(frames)
}
