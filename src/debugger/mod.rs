pub mod address;
pub mod channel;
pub mod config;
pub mod decoder;
mod error;
pub mod fingerprint;
pub mod process;
pub mod reader;
pub mod response;
pub mod trace;
pub mod watch;

pub use error::Error;

use crate::debugger::channel::{CommandChannel, GdbChannel};
use crate::debugger::config::{SessionConfig, UserTarget};
use crate::debugger::process::{resolve_executable, Emulator};
use crate::debugger::response::{parse_stop, StopEvent};
use crate::debugger::trace::{EventSink, WriteEvent, WriteTracer};
use crate::debugger::watch::{
    inspect_hit, set_watchpoint, watch_range, UserWatch, WatchHit, WatchPhase, WatchRange,
};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Reaction on session events.
pub trait EventHook {
    /// Called when target stops for a reason other than a reported watchpoint hit.
    fn on_stop(&self, event: &StopEvent) -> anyhow::Result<()>;

    /// Called on a watchpoint hit with a trustworthy backtrace.
    fn on_watchpoint(&self, hit: &WatchHit) -> anyhow::Result<()>;

    /// Called after a write event is persisted.
    fn on_write(&self, event: &WriteEvent) -> anyhow::Result<()>;
}

pub struct NopHook;

impl EventHook for NopHook {
    fn on_stop(&self, _: &StopEvent) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_watchpoint(&self, _: &WatchHit) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_write(&self, _: &WriteEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Live debugging session: a debugger attached to a replaying emulator.
///
/// Owns both processes, dropping a session terminates them.
pub struct Session<C: CommandChannel = GdbChannel> {
    channel: C,
    hooks: Box<dyn EventHook>,
    strip_prefix: Option<String>,
    /// True while a resuming command has not returned its prompt.
    running: bool,
    /// Kernel watchpoints and their ranges.
    watchpoints: HashMap<u32, Option<WatchRange>>,
    // dropped after the debugger
    emulator: Option<Emulator>,
}

impl Session<GdbChannel> {
    /// Start emulator in replay mode, attach a debugger to it and load kernel symbols.
    ///
    /// # Arguments
    ///
    /// * `config`: session configuration
    /// * `hooks`: session event reactions
    /// * `interrupt`: flag that interrupts a running debugger command when raised
    pub fn start(
        config: &SessionConfig,
        hooks: Box<dyn EventHook>,
        interrupt: Arc<AtomicBool>,
    ) -> Result<Self, Error> {
        let emulator = Emulator::spawn(
            &config.qemu_exec,
            &config.qemu_args,
            &config.replay_keyword,
            &config.replay_file,
            config.image.as_deref(),
        )?;

        let gdb_exec = resolve_executable(&config.gdb_exec)?;
        let channel = GdbChannel::spawn(&gdb_exec.to_string_lossy(), config.command_timeout)?
            .with_interrupt_flag(interrupt);

        let mut session =
            Session::new(channel, hooks).with_strip_prefix(config.strip_prefix.clone());
        session.emulator = Some(emulator);
        session.connect(&config.remote, &config.vmlinux)?;
        Ok(session)
    }

    /// Terminate debugger and emulator.
    pub fn kill(&mut self) {
        self.channel.kill();
        if let Some(mut emulator) = self.emulator.take() {
            emulator.kill();
        }
        self.running = false;
    }
}

impl<C: CommandChannel> Session<C> {
    /// Create a session over an already started debugger.
    pub fn new(channel: C, hooks: Box<dyn EventHook>) -> Self {
        Self {
            channel,
            hooks,
            strip_prefix: None,
            running: false,
            watchpoints: HashMap::new(),
            emulator: None,
        }
    }

    pub fn with_strip_prefix(mut self, prefix: Option<String>) -> Self {
        self.strip_prefix = prefix;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Attach to a remote debug stub and load kernel symbols.
    pub fn connect(&mut self, remote: &str, vmlinux: &Path) -> Result<(), Error> {
        let lines = self.channel.execute(&format!("target remote {remote}"), None)?;
        if !lines.iter().any(|l| l.starts_with("Remote debugging using")) {
            return Err(Error::parse("`Remote debugging using ..`", lines.join("\n")));
        }
        self.channel
            .execute_confirmed(&format!("file {}", vmlinux.display()), None)?;
        info!(target: "debugger", "attached to {remote}");
        Ok(())
    }

    /// Resume target and wait until it stops. Watchpoint hits with trustworthy backtraces are
    /// reported as [`WatchHit`], any other stop as is.
    pub fn continue_until_stop(&mut self) -> Result<StopEvent, Error> {
        self.ensure_stopped()?;
        self.running = true;
        let result = self.channel.execute("continue", None);
        let lines = self.settle(result)?;
        let event = parse_stop(&lines);

        if let StopEvent::Watchpoint { number, .. } = &event {
            if let Some(range) = self.watchpoints.get(number).copied() {
                let hit = inspect_hit(
                    &mut self.channel,
                    event.clone(),
                    range,
                    self.strip_prefix.as_deref(),
                );
                match hit {
                    Ok(Some(hit)) => {
                        self.hooks.on_watchpoint(&hit).map_err(Error::Hook)?;
                        return Ok(event);
                    }
                    Ok(None) => {}
                    Err(e) if e.is_skippable() => {
                        warn!(target: "debugger", "watchpoint {number} hit not inspected: {e:#}")
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.hooks.on_stop(&event).map_err(Error::Hook)?;
        Ok(event)
    }

    /// Install a watchpoint on a kernel symbol, return its number.
    pub fn watch_kernel(&mut self, symbol: &str) -> Result<u32, Error> {
        self.ensure_stopped()?;
        let number = set_watchpoint(&mut self.channel, symbol)?;
        let range = watch_range(&mut self.channel, symbol)?;
        self.watchpoints.insert(number, range);
        debug!(target: "debugger", "watchpoint {number} on `{symbol}`");
        Ok(number)
    }

    /// Watch a variable of a user-level executable until the executable starts a second time
    /// or the target is gone.
    pub fn watch_user_variable(
        &mut self,
        target: &UserTarget,
        symbol: &str,
    ) -> Result<WatchPhase, Error> {
        self.ensure_stopped()?;
        self.channel
            .execute_confirmed(&format!("add-symbol-file {}", target.path.display()), None)?;

        // watch interrupts a timed out target itself
        UserWatch::new(
            &mut self.channel,
            self.hooks.as_ref(),
            symbol,
            &target.fingerprint,
        )
        .with_strip_prefix(self.strip_prefix.clone())
        .run()
    }

    /// Trace memory writes into `sink` until `cancel` is raised or the target is gone.
    /// Return number of persisted events.
    pub fn trace<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        cancel: &AtomicBool,
    ) -> Result<u64, Error> {
        self.ensure_stopped()?;

        // tracer interrupts a timed out target itself
        WriteTracer::new(&mut self.channel, sink, self.hooks.as_ref())
            .with_strip_prefix(self.strip_prefix.clone())
            .run(cancel)
    }

    /// Interrupt the target if a previous resuming command did not return.
    fn ensure_stopped(&mut self) -> Result<(), Error> {
        if self.running {
            debug!(target: "debugger", "target still running, interrupt");
            self.channel.interrupt()?;
            self.running = false;
        }
        Ok(())
    }

    /// Only a timed out command leaves the target running.
    fn settle<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        self.running = matches!(result, Err(Error::ChannelTimeout { .. }));
        result
    }
}
