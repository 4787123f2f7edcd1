use crate::debugger::response::StopEvent;
use crate::debugger::trace::WriteEvent;
use crate::debugger::watch::WatchHit;
use crate::debugger::EventHook;
use crate::ui::console::print::style::{AddressView, KeywordView, ValueView};
use crate::ui::console::print::ExternalPrinter;
use std::rc::Rc;

pub struct TerminalHook {
    printer: Rc<ExternalPrinter>,
    /// Print every recorded write, not only the final count.
    verbose_trace: bool,
}

impl TerminalHook {
    pub fn new(printer: Rc<ExternalPrinter>, verbose_trace: bool) -> Self {
        Self {
            printer,
            verbose_trace,
        }
    }
}

impl EventHook for TerminalHook {
    fn on_stop(&self, event: &StopEvent) -> anyhow::Result<()> {
        let msg = match event {
            StopEvent::Breakpoint { number } => format!("Hit breakpoint {number}"),
            StopEvent::Watchpoint {
                number,
                expression,
                ..
            } => format!(
                "Hit watchpoint {number} ({}), backtrace is not trustworthy",
                KeywordView::from(expression)
            ),
            StopEvent::Interrupted => "Interrupted".to_string(),
            StopEvent::Signal(signal) => format!("Signal {} received", KeywordView::from(signal)),
            StopEvent::ConnectionClosed => "Replay is over, remote connection closed".to_string(),
            StopEvent::NotRunning => "Program is not running".to_string(),
            StopEvent::Unrecognized(text) => format!("Stopped: {text}"),
        };
        self.printer.print(msg);
        Ok(())
    }

    fn on_watchpoint(&self, hit: &WatchHit) -> anyhow::Result<()> {
        let range = hit
            .range
            .map(|range| format!(" {}", AddressView::from(range)))
            .unwrap_or_default();
        self.printer.print(format!(
            "Hit watchpoint {} ({}){range}:",
            hit.number,
            KeywordView::from(&hit.expression)
        ));
        self.printer
            .print(format!("old value: {}", ValueView::<&String>::from(hit.old.as_ref())));
        self.printer
            .print(format!("new value: {}", ValueView::<&String>::from(hit.new.as_ref())));
        self.printer.print(&hit.backtrace);
        Ok(())
    }

    fn on_write(&self, event: &WriteEvent) -> anyhow::Result<()> {
        if self.verbose_trace {
            self.printer.print(format!(
                "{}: {} {} -> {}",
                AddressView::from(event.instruction_pointer),
                AddressView::from(event.memory_address),
                ValueView::from(&event.old_value),
                ValueView::from(&event.new_value),
            ));
        }
        Ok(())
    }
}
