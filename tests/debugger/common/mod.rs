use rrdebug::debugger::channel::CommandChannel;
use rrdebug::debugger::response::StopEvent;
use rrdebug::debugger::trace::WriteEvent;
use rrdebug::debugger::watch::WatchHit;
use rrdebug::debugger::{Error, EventHook};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// Command sent by [`CommandChannel::interrupt`] in scripts.
pub const INTERRUPT: &str = "<interrupt>";

enum Reply {
    Lines(Vec<String>),
    Timeout,
}

struct Exchange {
    command: String,
    reply: Reply,
}

/// Debugger fake that replays a fixed dialog and checks that commands come in the
/// expected order.
///
/// Clones share the same script, so a test may keep a handle after moving a channel into a
/// session.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    script: Rc<RefCell<VecDeque<Exchange>>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expected command and the debugger response to it.
    pub fn expect(self, command: &str, response: &[&str]) -> Self {
        self.script.borrow_mut().push_back(Exchange {
            command: command.to_string(),
            reply: Reply::Lines(response.iter().map(ToString::to_string).collect()),
        });
        self
    }

    /// Append an expected command that never returns a prompt.
    pub fn expect_timeout(self, command: &str) -> Self {
        self.script.borrow_mut().push_back(Exchange {
            command: command.to_string(),
            reply: Reply::Timeout,
        });
        self
    }

    pub fn assert_exhausted(&self) {
        let script = self.script.borrow();
        let left = script.iter().map(|e| e.command.as_str()).collect::<Vec<_>>();
        assert!(left.is_empty(), "commands not sent: {left:?}");
    }

    fn reply(&mut self, command: &str) -> Result<Vec<String>, Error> {
        let exchange = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command after end of script: `{command}`"));
        assert_eq!(exchange.command, command, "unexpected command");

        match exchange.reply {
            Reply::Lines(lines) => Ok(lines),
            Reply::Timeout => Err(Error::ChannelTimeout {
                command: command.to_string(),
                timeout: Duration::from_secs(1),
            }),
        }
    }
}

impl CommandChannel for ScriptedChannel {
    fn execute(&mut self, command: &str, _: Option<Duration>) -> Result<Vec<String>, Error> {
        self.reply(command)
    }

    fn execute_confirmed(
        &mut self,
        command: &str,
        _: Option<Duration>,
    ) -> Result<Vec<String>, Error> {
        self.reply(command)
    }

    fn interrupt(&mut self) -> Result<Vec<String>, Error> {
        self.reply(INTERRUPT)
    }
}

#[derive(Clone, Default)]
pub struct TestInfo {
    pub stops: Rc<RefCell<Vec<StopEvent>>>,
    pub hits: Rc<RefCell<Vec<WatchHit>>>,
    pub writes: Rc<RefCell<Vec<WriteEvent>>>,
}

#[derive(Default)]
pub struct TestHooks {
    info: TestInfo,
}

impl TestHooks {
    pub fn new(info: TestInfo) -> Self {
        Self { info }
    }
}

impl EventHook for TestHooks {
    fn on_stop(&self, event: &StopEvent) -> anyhow::Result<()> {
        self.info.stops.borrow_mut().push(event.clone());
        Ok(())
    }

    fn on_watchpoint(&self, hit: &WatchHit) -> anyhow::Result<()> {
        self.info.hits.borrow_mut().push(hit.clone());
        Ok(())
    }

    fn on_write(&self, event: &WriteEvent) -> anyhow::Result<()> {
        self.info.writes.borrow_mut().push(event.clone());
        Ok(())
    }
}
