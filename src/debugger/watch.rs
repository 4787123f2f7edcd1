//! Watchpoints on kernel and user-level variables.
//!
//! A user-level variable lives in a process that may be started many times during a replay.
//! [`UserWatch`] puts a breakpoint at the executable entry point and uses
//! [`ExecStartFingerprint`] to tell real executable starts from unrelated code that reaches
//! the same address. The watchpoint is installed on the first real start, the second real start
//! means that the watched code is about to run again and finishes the session.

use crate::debugger::address::Address;
use crate::debugger::channel::CommandChannel;
use crate::debugger::fingerprint::ExecStartFingerprint;
use crate::debugger::reader::{Backtrace, Reader};
use crate::debugger::response::{parse_breakpoint_set, parse_stop, parse_watchpoint_set, StopEvent};
use crate::debugger::{Error, EventHook};
use crate::muted_error;
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WatchPhase {
    /// Entry breakpoint is set, no real executable start seen yet.
    #[strum(serialize = "awaiting first entry")]
    AwaitingFirstEntry,
    /// Watchpoint installed, target not resumed yet.
    #[strum(serialize = "armed")]
    Armed,
    #[strum(serialize = "watching")]
    Watching,
    /// Watchpoint hit, backtrace under inspection.
    #[strum(serialize = "verifying")]
    Verifying,
    #[strum(serialize = "done")]
    Done,
}

/// Entry breakpoint history of one watch session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchState {
    pub seen_first_entry: bool,
}

/// Memory range of a watched expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchRange {
    pub start: Address,
    pub size: u64,
}

impl Display for WatchRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let end = self.start.offset(self.size as i64);
        f.write_fmt(format_args!("{}-{}", self.start, end))
    }
}

/// Reported watchpoint hit with a trustworthy backtrace.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchHit {
    pub number: u32,
    pub expression: String,
    pub range: Option<WatchRange>,
    pub old: Option<String>,
    pub new: Option<String>,
    pub backtrace: Backtrace,
}

/// Install a watchpoint on an expression, return its number.
pub fn set_watchpoint<C: CommandChannel + ?Sized>(
    channel: &mut C,
    expression: &str,
) -> Result<u32, Error> {
    parse_watchpoint_set(&channel.execute(&format!("watch {expression}"), None)?)
}

/// Address and size of a watched expression, `None` if the debugger can not evaluate them.
pub fn watch_range<C: CommandChannel + ?Sized>(
    channel: &mut C,
    expression: &str,
) -> Result<Option<WatchRange>, Error> {
    let mut reader = Reader::new(channel);
    let start = match reader.evaluate(&format!("&({expression})")) {
        Ok(addr) => Address::from(addr),
        Err(e @ Error::ProtocolParse { .. }) => {
            debug!(target: "debugger", "range of `{expression}`: {e:#}");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let size = match reader.evaluate(&format!("sizeof({expression})")) {
        Ok(size) => size,
        Err(e @ Error::ProtocolParse { .. }) => {
            debug!(target: "debugger", "range of `{expression}`: {e:#}");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    Ok(Some(WatchRange { start, size }))
}

/// Build a report of a watchpoint stop. Return `None` if the backtrace can not be trusted.
pub fn inspect_hit<C: CommandChannel + ?Sized>(
    channel: &mut C,
    event: StopEvent,
    range: Option<WatchRange>,
    strip_prefix: Option<&str>,
) -> Result<Option<WatchHit>, Error> {
    let StopEvent::Watchpoint {
        number,
        expression,
        old,
        new,
    } = event
    else {
        return Ok(None);
    };

    let backtrace = Reader::new(channel).backtrace()?;
    if !backtrace.is_trustworthy() {
        debug!(target: "debugger", "watchpoint {number} hit with unresolved frames, skip");
        return Ok(None);
    }

    Ok(Some(WatchHit {
        number,
        expression,
        range,
        old,
        new,
        backtrace: backtrace.strip_prefix(strip_prefix),
    }))
}

/// Watch of a variable inside a user-level executable.
pub struct UserWatch<'a, C: CommandChannel + ?Sized> {
    channel: &'a mut C,
    hook: &'a dyn EventHook,
    symbol: String,
    fingerprint: &'a ExecStartFingerprint,
    strip_prefix: Option<String>,
    phase: WatchPhase,
    state: WatchState,
    entry_breakpoint: Option<u32>,
    watchpoint: Option<u32>,
    range: Option<WatchRange>,
}

impl<'a, C: CommandChannel + ?Sized> UserWatch<'a, C> {
    pub fn new(
        channel: &'a mut C,
        hook: &'a dyn EventHook,
        symbol: impl Into<String>,
        fingerprint: &'a ExecStartFingerprint,
    ) -> Self {
        Self {
            channel,
            hook,
            symbol: symbol.into(),
            fingerprint,
            strip_prefix: None,
            phase: WatchPhase::AwaitingFirstEntry,
            state: WatchState::default(),
            entry_breakpoint: None,
            watchpoint: None,
            range: None,
        }
    }

    /// Source path prefix to remove from reported backtraces.
    pub fn with_strip_prefix(mut self, prefix: Option<String>) -> Self {
        self.strip_prefix = prefix;
        self
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Number of installed watchpoint.
    pub fn watchpoint(&self) -> Option<u32> {
        self.watchpoint
    }

    /// Set a breakpoint at the executable entry point.
    pub fn arm_entry(&mut self) -> Result<(), Error> {
        let lines = self
            .channel
            .execute(&format!("break *{}", self.fingerprint.entry()), None)?;
        let number = parse_breakpoint_set(&lines)?;
        debug!(target: "debugger", "entry breakpoint {number} at {}", self.fingerprint.entry());
        self.entry_breakpoint = Some(number);
        Ok(())
    }

    /// Move the state machine by a stop event. Return the new phase.
    pub fn advance(&mut self, event: StopEvent) -> Result<WatchPhase, Error> {
        if self.phase == WatchPhase::Done {
            return Ok(self.phase);
        }

        match event {
            StopEvent::Breakpoint { number } if Some(number) == self.entry_breakpoint => {
                self.on_entry()?;
            }
            StopEvent::Watchpoint { number, .. } if Some(number) == self.watchpoint => {
                self.phase = WatchPhase::Verifying;
                let hit = inspect_hit(
                    &mut *self.channel,
                    event,
                    self.range,
                    self.strip_prefix.as_deref(),
                );
                match hit {
                    Ok(Some(hit)) => self.hook.on_watchpoint(&hit).map_err(Error::Hook)?,
                    Ok(None) => {}
                    Err(e) if e.is_skippable() => {
                        warn!(target: "debugger", "watchpoint {number} hit not reported: {e:#}")
                    }
                    Err(e) => return Err(e),
                }
                self.phase = WatchPhase::Watching;
            }
            StopEvent::ConnectionClosed | StopEvent::NotRunning | StopEvent::Interrupted => {
                info!(target: "debugger", "watch of `{}` finished: {event:?}", self.symbol);
                self.phase = WatchPhase::Done;
            }
            other => {
                warn!(target: "debugger", "unexpected stop while watching `{}`: {other:?}", self.symbol);
            }
        }

        Ok(self.phase)
    }

    /// Resume the target until the watch session is over.
    /// Installed breakpoint and watchpoint are removed on every exit.
    pub fn run(&mut self) -> Result<WatchPhase, Error> {
        let result = self.watch_loop();
        self.cleanup(result.as_ref().err());
        result
    }

    fn watch_loop(&mut self) -> Result<WatchPhase, Error> {
        if self.entry_breakpoint.is_none() {
            self.arm_entry()?;
        }

        while self.phase != WatchPhase::Done {
            if self.phase == WatchPhase::Armed {
                self.phase = WatchPhase::Watching;
            }
            let lines = self.channel.execute("continue", None)?;
            self.advance(parse_stop(&lines))?;
        }
        Ok(self.phase)
    }

    fn on_entry(&mut self) -> Result<(), Error> {
        let genuine = {
            let mut reader = Reader::new(&mut *self.channel);
            match self.fingerprint.matches(&mut reader) {
                Ok(genuine) => genuine,
                Err(e @ Error::ProtocolParse { .. }) => {
                    debug!(target: "debugger", "fingerprint check: {e:#}");
                    false
                }
                Err(e) => return Err(e),
            }
        };

        if !genuine {
            debug!(target: "debugger", "entry breakpoint hit with foreign code, ignore");
            return Ok(());
        }

        if self.state.seen_first_entry {
            info!(target: "debugger", "executable started again, watch of `{}` finished", self.symbol);
            self.phase = WatchPhase::Done;
            return Ok(());
        }

        self.state.seen_first_entry = true;
        self.watchpoint = Some(set_watchpoint(&mut *self.channel, &self.symbol)?);
        self.range = watch_range(&mut *self.channel, &self.symbol)?;
        self.phase = WatchPhase::Armed;
        Ok(())
    }

    /// Remove installed breakpoint and watchpoint if the debugger is still there.
    /// A target left running by a timed out command is interrupted first.
    fn cleanup(&mut self, error: Option<&Error>) {
        if matches!(error, Some(Error::ChannelTimeout { .. })) {
            muted_error!(self.channel.interrupt(), "interrupt timed out target:");
        }

        let numbers = self
            .entry_breakpoint
            .take()
            .into_iter()
            .chain(self.watchpoint.take())
            .map(|n| n.to_string())
            .collect::<Vec<_>>();
        if numbers.is_empty() {
            return;
        }
        muted_error!(
            self.channel.execute(&format!("delete {}", numbers.join(" ")), None),
            "cleanup watch:"
        );
    }
}
