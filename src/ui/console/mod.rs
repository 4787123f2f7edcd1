use crate::debugger::config::{SessionConfig, UserTarget};
use crate::debugger::fingerprint::ExecStartFingerprint;
use crate::debugger::{Error, Session};
use crate::store::EventStore;
use crate::ui::command::{Command, CommandError};
use crate::ui::console::editor::{create_editor, RLHelper};
use crate::ui::console::help::help_for_command;
use crate::ui::console::hook::TerminalHook;
use crate::ui::console::print::style::{ErrorView, FilePathView, KeywordView};
use crate::ui::console::print::ExternalPrinter;
use anyhow::Context;
use log::{debug, warn};
use rustyline::error::ReadlineError;
use rustyline::history::MemHistory;
use rustyline::Editor;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{mpsc, Arc, Once};
use std::thread;

mod editor;
mod help;
pub mod hook;
pub mod print;

const WELCOME_TEXT: &str = r#"
rrdbg: record/replay write tracer, type `help` for list of commands
"#;
const PROMT: &str = "(rr) ";

/// Startup script executed before the first prompt.
pub const DEFAULT_INIT_FILE: &str = ".rrdebuginit";

type RREditor = Editor<RLHelper, MemHistory>;

pub struct AppBuilder {
    config: SessionConfig,
    store: EventStore,
    init_file: Option<PathBuf>,
    verbose_trace: bool,
}

impl AppBuilder {
    pub fn new(store: EventStore) -> Self {
        Self {
            config: SessionConfig::default(),
            store,
            init_file: None,
            verbose_trace: false,
        }
    }

    /// Command file executed line by line before the first prompt, ignored if missing.
    pub fn with_init_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_file = Some(path.into());
        self
    }

    /// Print every traced write.
    pub fn with_verbose_trace(mut self, verbose: bool) -> Self {
        self.verbose_trace = verbose;
        self
    }

    pub fn build(self) -> anyhow::Result<TerminalApplication> {
        let (control_tx, control_rx) = mpsc::sync_channel::<Control>(0);
        let mut editor = create_editor(PROMT)?;
        let printer = ExternalPrinter::new(&mut editor).unwrap_or_else(|e| {
            warn!(target: "debugger", "external printer unavailable: {e}");
            ExternalPrinter::stdout()
        });

        let app_loop = AppLoop {
            config: self.config,
            session: None,
            store: self.store,
            printer: Rc::new(printer),
            interrupt: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicBool::new(false)),
            verbose_trace: self.verbose_trace,
            control_rx,
        };

        Ok(TerminalApplication {
            app_loop,
            editor,
            init_file: self.init_file,
            control_tx,
        })
    }
}

enum Control {
    /// New command from user received
    Cmd(String),
    /// Terminate application
    Terminate,
}

pub struct TerminalApplication {
    app_loop: AppLoop,
    editor: RREditor,
    init_file: Option<PathBuf>,
    control_tx: SyncSender<Control>,
}

static CTRLC_ONCE: Once = Once::new();
static HELLO_ONCE: Once = Once::new();

impl TerminalApplication {
    pub fn run(mut self) -> anyhow::Result<()> {
        // Ctrl-C outside of line editing (e.g. while the init script runs)
        {
            let interrupt = self.app_loop.interrupt.clone();
            let mut result = Ok(());
            CTRLC_ONCE.call_once(|| {
                result = ctrlc::set_handler(move || interrupt.store(true, Ordering::SeqCst));
            });
            if let Err(e) = result {
                warn!(target: "debugger", "install Ctrl-C handler: {e}");
            }
        }

        if let Some(init_file) = self.init_file.take() {
            if !self.app_loop.run_init_file(&init_file)? {
                return Ok(());
            }
        }

        let mut editor = self.editor;
        let busy = self.app_loop.busy.clone();
        let interrupt = self.app_loop.interrupt.clone();
        let control_tx = self.control_tx;
        thread::spawn(move || {
            HELLO_ONCE.call_once(|| {
                println!("{WELCOME_TEXT}");
            });

            loop {
                let line = editor.readline(PROMT);
                match line {
                    Ok(input) => {
                        if input == "q" || input == "quit" {
                            _ = control_tx.send(Control::Terminate);
                            break;
                        } else {
                            _ = editor.add_history_entry(&input);
                            _ = control_tx.send(Control::Cmd(input));
                        }
                    }
                    Err(ReadlineError::Interrupted) if busy.load(Ordering::SeqCst) => {
                        // cancel the command in progress, keep the shell
                        interrupt.store(true, Ordering::SeqCst);
                    }
                    Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                        interrupt.store(true, Ordering::SeqCst);
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                    Err(err) => {
                        println!("error: {:#}", err);
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                }
            }
        });

        self.app_loop.run();
        Ok(())
    }
}

struct AppLoop {
    config: SessionConfig,
    session: Option<Session>,
    store: EventStore,
    printer: Rc<ExternalPrinter>,
    /// Raised by Ctrl-C, cancels a running command.
    interrupt: Arc<AtomicBool>,
    /// True while a command is handled.
    busy: Arc<AtomicBool>,
    verbose_trace: bool,
    control_rx: Receiver<Control>,
}

impl AppLoop {
    fn session(&mut self) -> Result<&mut Session, Error> {
        self.session.as_mut().ok_or(Error::NoSession)
    }

    fn handle_command(&mut self, cmd: &str) -> Result<(), CommandError> {
        match Command::parse(cmd)? {
            Command::SetVmlinux(path) => self.config.vmlinux = path,
            Command::SetGdb(path) => self.config.gdb_exec = path,
            Command::SetQemu { exec, args } => self.config.set_qemu(exec, args),
            Command::SetReplayFile(path) => self.config.replay_file = path,
            Command::SetImage(path) => self.config.image = Some(path),
            Command::SetRemote(remote) => self.config.remote = remote,
            Command::SetStripPrefix(prefix) => self.config.strip_prefix = Some(prefix),
            Command::SetUserExec(path) => {
                let fingerprint = ExecStartFingerprint::capture(
                    &self.config.gdb_exec,
                    &path,
                    self.config.command_timeout,
                )?;
                self.printer.print(format!(
                    "{} entry point {}, fingerprint {}",
                    FilePathView::from(path.display()),
                    fingerprint.entry(),
                    fingerprint.bytes()
                ));
                self.config.user_exec = Some(UserTarget { path, fingerprint });
            }
            Command::Start => {
                if let Some(mut session) = self.session.take() {
                    session.kill();
                }
                let hook = TerminalHook::new(self.printer.clone(), self.verbose_trace);
                let session =
                    Session::start(&self.config, Box::new(hook), self.interrupt.clone())?;
                self.session = Some(session);
                self.printer.print("Replay started");
            }
            Command::Watch(symbol) => {
                let number = self.session()?.watch_kernel(&symbol)?;
                self.printer.print(format!(
                    "New watchpoint {number} on {}",
                    KeywordView::from(&symbol)
                ));
            }
            Command::WatchUser(symbol) => {
                let target = self
                    .config
                    .user_exec
                    .clone()
                    .ok_or(Error::NotConfigured("user executable (set_user_exec)"))?;
                let phase = self.session()?.watch_user_variable(&target, &symbol)?;
                self.printer.print(format!(
                    "Watch of {} is {phase}",
                    KeywordView::from(&symbol)
                ));
            }
            Command::Run => {
                self.session()?.continue_until_stop()?;
            }
            Command::Trace => {
                let session = self.session.as_mut().ok_or(Error::NoSession)?;
                let recorded = session.trace(&mut self.store, &self.interrupt)?;
                self.printer.print(format!(
                    "Tracing stopped, {recorded} writes recorded into {}",
                    FilePathView::from(self.store.path().display())
                ));
            }
            Command::Help { command } => {
                self.printer.print(help_for_command(command.as_deref()));
            }
            Command::SkipInput => {}
        }

        Ok(())
    }

    /// Handle a command and print its error. Return false if the application must stop.
    fn execute(&mut self, command: &str) -> bool {
        self.busy.store(true, Ordering::SeqCst);
        let result = self.handle_command(command);
        self.busy.store(false, Ordering::SeqCst);
        self.interrupt.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => true,
            Err(e @ CommandError::Parsing(_)) => {
                self.printer.print(ErrorView::from(e));
                true
            }
            Err(CommandError::Handle(ref err)) if err.is_fatal() => {
                self.printer.print(ErrorView::from("shutdown debugger"));
                self.printer
                    .print(ErrorView::from(format!("fatal debugger error: {err:#}")));
                false
            }
            Err(CommandError::Handle(err)) => {
                self.printer
                    .print(ErrorView::from(format!("debugger error: {err:#}")));
                true
            }
        }
    }

    /// Execute every non-empty, non-comment line of a command file.
    /// Return false if the application must stop.
    fn run_init_file(&mut self, path: &Path) -> anyhow::Result<bool> {
        if !path.exists() {
            debug!(target: "debugger", "no init file at {}", path.display());
            return Ok(true);
        }

        let script = fs::read_to_string(path)
            .with_context(|| format!("read init file {}", path.display()))?;
        for line in script
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
        {
            self.printer.print(format!("{PROMT}{line}"));
            if line == "q" || line == "quit" || !self.execute(line) {
                self.shutdown();
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.kill();
        }
    }

    fn run(mut self) {
        loop {
            let Ok(action) = self.control_rx.recv() else {
                break;
            };

            match action {
                Control::Cmd(command) => {
                    if !self.execute(&command) {
                        break;
                    }
                }
                Control::Terminate => {
                    break;
                }
            }
        }
        self.shutdown();
    }
}
