//! Single-step write tracer.
//!
//! Every step runs the instruction decoded on the previous step and then decodes the next one.
//! A decoded memory destination is captured (address, pre-image, backtrace) *before* its
//! instruction executes and compared with the memory content right *after* the following step.
//! This lag is modeled as a two slot pipeline:
//!
//! * `pending` - destination of the instruction about to execute
//! * `committed` - genuine write observed for the previous `pending`, waiting to be persisted

use crate::debugger::address::Address;
use crate::debugger::channel::CommandChannel;
use crate::debugger::decoder::{decode, MemoryOperand};
use crate::debugger::reader::{Backtrace, MemoryImage, Reader};
use crate::debugger::response::{
    parse_display_set, parse_instruction, parse_stop, DisplayedInstruction, StepView, StopEvent,
};
use crate::debugger::{Error, EventHook};
use crate::{muted_error, weak_error};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use strum_macros::Display;

/// A genuine change of target memory caused by one instruction.
///
/// `old_value != new_value` and both have the width of the decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteEvent {
    pub instruction_pointer: Address,
    pub timestamp: DateTime<Utc>,
    pub memory_address: Address,
    pub old_value: MemoryImage,
    pub new_value: MemoryImage,
    pub backtrace: Backtrace,
}

/// Persistence for write events.
pub trait EventSink {
    /// Persist an event. Must be durable when it returns.
    fn record(&mut self, event: &WriteEvent) -> Result<(), Error>;
}

impl EventSink for Vec<WriteEvent> {
    fn record(&mut self, event: &WriteEvent) -> Result<(), Error> {
        self.push(event.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TracePhase {
    #[strum(serialize = "stepping")]
    Stepping,
    #[strum(serialize = "done")]
    Done,
}

#[derive(Debug)]
struct PendingWrite {
    /// Program counter of the instruction that may write.
    pc: Address,
    operand: MemoryOperand,
    pre_image: MemoryImage,
    backtrace: Backtrace,
}

#[derive(Default)]
struct Pipeline {
    pending: Option<PendingWrite>,
    committed: Option<WriteEvent>,
}

impl Pipeline {
    /// Compare pending pre-image with memory content after execution.
    /// Move a genuine change into the `committed` slot, the pending slot is always emptied.
    fn resolve(&mut self, post_image: MemoryImage) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        debug_assert!(self.committed.is_none(), "committed write must be persisted first");

        if pending.pre_image != post_image {
            self.committed = Some(WriteEvent {
                instruction_pointer: pending.pc,
                timestamp: Utc::now(),
                memory_address: pending.operand.address,
                old_value: pending.pre_image,
                new_value: post_image,
                backtrace: pending.backtrace,
            });
        }
    }
}

/// Write-trace loop driver.
pub struct WriteTracer<'a, C: CommandChannel + ?Sized, S: EventSink + ?Sized> {
    channel: &'a mut C,
    sink: &'a mut S,
    hook: &'a dyn EventHook,
    strip_prefix: Option<String>,
    pipeline: Pipeline,
    phase: TracePhase,
    recorded: u64,
    display: Option<u32>,
}

impl<'a, C: CommandChannel + ?Sized, S: EventSink + ?Sized> WriteTracer<'a, C, S> {
    pub fn new(channel: &'a mut C, sink: &'a mut S, hook: &'a dyn EventHook) -> Self {
        Self {
            channel,
            sink,
            hook,
            strip_prefix: None,
            pipeline: Pipeline::default(),
            phase: TracePhase::Stepping,
            recorded: 0,
            display: None,
        }
    }

    /// Source path prefix to remove from captured backtraces.
    pub fn with_strip_prefix(mut self, prefix: Option<String>) -> Self {
        self.strip_prefix = prefix;
        self
    }

    pub fn phase(&self) -> TracePhase {
        self.phase
    }

    /// Number of persisted write events.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Enable instruction display after each step and decode the instruction at current pc.
    pub fn start(&mut self) -> Result<(), Error> {
        let lines = self.channel.execute("display/i $pc", None)?;
        self.display = muted_error!(parse_display_set(&lines), "instruction display:");
        match weak_error!(parse_instruction(&lines), "decode first instruction:") {
            Some(StepView::Instruction(instruction)) => self.stage(&instruction)?,
            Some(StepView::MemoryInaccessible) => {
                debug!(target: "debugger", "memory at pc inaccessible, first instruction skipped")
            }
            None => {}
        }
        Ok(())
    }

    /// Run one iteration: execute one instruction, resolve its pending destination, decode
    /// the next instruction. Return a persisted event if the executed instruction changed memory.
    pub fn step(&mut self) -> Result<Option<WriteEvent>, Error> {
        if self.phase == TracePhase::Done {
            return Ok(None);
        }

        let lines = self.channel.execute("stepi", None)?;
        if matches!(
            parse_stop(&lines),
            StopEvent::ConnectionClosed | StopEvent::NotRunning
        ) {
            info!(target: "debugger", "target is gone, tracing stopped");
            self.pipeline.pending = None;
            self.phase = TracePhase::Done;
            return Ok(None);
        }

        let emitted = self.resolve_pending()?;

        match weak_error!(parse_instruction(&lines), "step response:") {
            Some(StepView::Instruction(instruction)) => self.stage(&instruction)?,
            Some(StepView::MemoryInaccessible) => {
                debug!(target: "debugger", "memory at pc inaccessible, decoding skipped")
            }
            None => {}
        }

        Ok(emitted)
    }

    /// Trace until `cancel` is raised or the target disappears.
    /// Return number of persisted events.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<u64, Error> {
        let result = self.trace_loop(cancel);
        self.finish(result.as_ref().err());
        result
    }

    fn trace_loop(&mut self, cancel: &AtomicBool) -> Result<u64, Error> {
        self.start()?;
        while self.phase == TracePhase::Stepping {
            if cancel.load(Ordering::SeqCst) {
                self.phase = TracePhase::Done;
                break;
            }
            self.step()?;
        }
        Ok(self.recorded)
    }

    /// Remove the instruction display installed by [`WriteTracer::start`].
    /// A target left running by a timed out command is interrupted first.
    pub fn finish(&mut self, error: Option<&Error>) {
        if matches!(error, Some(Error::ChannelTimeout { .. })) {
            muted_error!(self.channel.interrupt(), "interrupt timed out target:");
        }

        let Some(display) = self.display.take() else {
            return;
        };
        muted_error!(
            self.channel.execute(&format!("undisplay {display}"), None),
            "remove instruction display:"
        );
    }

    fn resolve_pending(&mut self) -> Result<Option<WriteEvent>, Error> {
        let Some(operand) = self.pipeline.pending.as_ref().map(|p| p.operand) else {
            return Ok(None);
        };

        let post_image = match Reader::new(&mut *self.channel)
            .read_memory(operand.address, operand.width)
        {
            Ok(image) => image,
            Err(e) if e.is_skippable() => {
                warn!(target: "debugger", "re-read {}: {e:#}", operand.address);
                self.pipeline.pending = None;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.pipeline.resolve(post_image);
        self.persist_committed()
    }

    fn persist_committed(&mut self) -> Result<Option<WriteEvent>, Error> {
        let Some(event) = self.pipeline.committed.take() else {
            return Ok(None);
        };

        match self.sink.record(&event) {
            Ok(()) => {
                self.recorded += 1;
                self.hook.on_write(&event).map_err(Error::Hook)?;
                Ok(Some(event))
            }
            Err(e @ Error::DuplicateEvent { .. }) => {
                warn!(target: "debugger", "event dropped: {e:#}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Decode an instruction that is about to execute and capture its destination pre-image.
    fn stage(&mut self, instruction: &DisplayedInstruction) -> Result<(), Error> {
        debug_assert!(
            self.pipeline.pending.is_none(),
            "pending destination must be resolved before next decode"
        );

        let mut reader = Reader::new(&mut *self.channel);
        let operand = match decode(&instruction.mnemonic, &instruction.operands, &mut reader) {
            Ok(Some(operand)) => operand,
            Ok(None) => return Ok(()),
            Err(e) if e.is_skippable() => {
                warn!(target: "debugger", "decode at {}: {e:#}", instruction.pc);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let pre_image = match reader.read_memory(operand.address, operand.width) {
            Ok(image) => image,
            Err(e) if e.is_skippable() => {
                warn!(target: "debugger", "pre-image of {}: {e:#}", operand.address);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let backtrace = match reader.backtrace() {
            Ok(bt) => bt,
            Err(e) if e.is_skippable() => {
                debug!(target: "debugger", "backtrace at {}: {e:#}", instruction.pc);
                Backtrace::default()
            }
            Err(e) => return Err(e),
        };

        self.pipeline.pending = Some(PendingWrite {
            pc: instruction.pc,
            operand,
            pre_image,
            backtrace: backtrace.strip_prefix(self.strip_prefix.as_deref()),
        });
        Ok(())
    }
}
