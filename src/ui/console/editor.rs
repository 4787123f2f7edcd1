use crate::ui::command::parser::{
    HELP_COMMAND, HELP_COMMAND_SHORT, RUN_COMMAND, RUN_COMMAND_SHORT, SET_GDB_COMMAND,
    SET_IMAGE_COMMAND, SET_QEMU_COMMAND, SET_REMOTE_COMMAND, SET_REPLAY_FILE_COMMAND,
    SET_STRIP_PREFIX_COMMAND, SET_USER_EXEC_COMMAND, SET_VMLINUX_COMMAND, START_COMMAND,
    TRACE_COMMAND, WATCH_COMMAND, WATCH_USER_COMMAND,
};
use crossterm::style::{Color, Stylize};
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::HistoryHinter;
use rustyline::history::MemHistory;
use rustyline::{CompletionType, Config, Context, Editor};
use rustyline_derive::{Helper, Hinter, Validator};
use std::borrow::Cow;
use std::borrow::Cow::{Borrowed, Owned};

/// Commands whose argument is a file path.
const PATH_COMMANDS: &[&str] = &[
    SET_VMLINUX_COMMAND,
    SET_GDB_COMMAND,
    SET_QEMU_COMMAND,
    SET_REPLAY_FILE_COMMAND,
    SET_IMAGE_COMMAND,
    SET_USER_EXEC_COMMAND,
];

struct CommandHint {
    short: Option<&'static str>,
    long: &'static str,
}

impl CommandHint {
    fn display_with_short(&self) -> String {
        match self.short {
            Some(short) if self.long.starts_with(short) => format!(
                "{}{}",
                short.bold().underlined(),
                &self.long[short.len()..]
            ),
            Some(short) => format!("{}|{}", self.long, short.bold().underlined()),
            None => self.long.to_string(),
        }
    }
}

impl From<&'static str> for CommandHint {
    fn from(long: &'static str) -> Self {
        CommandHint { short: None, long }
    }
}

impl From<(&'static str, &'static str)> for CommandHint {
    fn from((short, long): (&'static str, &'static str)) -> Self {
        CommandHint {
            short: Some(short),
            long,
        }
    }
}

pub struct CommandCompleter {
    commands: Vec<CommandHint>,
    file_completer: FilenameCompleter,
}

impl CommandCompleter {
    fn new(commands: impl IntoIterator<Item = CommandHint>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
            file_completer: FilenameCompleter::new(),
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        if let Some((cmd, _)) = line.trim_start().split_once(char::is_whitespace) {
            if PATH_COMMANDS.contains(&cmd) {
                return self.file_completer.complete(line, pos, ctx);
            }
            return Ok((0, vec![]));
        }

        let prefix = line.trim_start();
        let pairs = self
            .commands
            .iter()
            .filter(|cmd| cmd.long.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.display_with_short(),
                replacement: cmd.long.to_string(),
            })
            .collect();
        Ok((0, pairs))
    }
}

#[derive(Helper, Hinter, Validator)]
pub struct RLHelper {
    pub completer: CommandCompleter,
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    pub colored_prompt: String,
}

impl Completer for RLHelper {
    type Candidate = <CommandCompleter as Completer>::Candidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Highlighter for RLHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        if default {
            Borrowed(&self.colored_prompt)
        } else {
            Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(format!("{}", hint.with(Color::Grey)))
    }
}

pub fn create_editor(promt: &str) -> anyhow::Result<Editor<RLHelper, MemHistory>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();

    let commands: [CommandHint; 15] = [
        SET_VMLINUX_COMMAND.into(),
        SET_GDB_COMMAND.into(),
        SET_QEMU_COMMAND.into(),
        SET_REPLAY_FILE_COMMAND.into(),
        SET_IMAGE_COMMAND.into(),
        SET_REMOTE_COMMAND.into(),
        SET_STRIP_PREFIX_COMMAND.into(),
        SET_USER_EXEC_COMMAND.into(),
        START_COMMAND.into(),
        WATCH_COMMAND.into(),
        WATCH_USER_COMMAND.into(),
        (RUN_COMMAND_SHORT, RUN_COMMAND).into(),
        TRACE_COMMAND.into(),
        (HELP_COMMAND_SHORT, HELP_COMMAND).into(),
        ("q", "quit").into(),
    ];

    let h = RLHelper {
        completer: CommandCompleter::new(commands),
        hinter: HistoryHinter {},
        colored_prompt: format!("{}", promt.with(Color::DarkGreen)),
    };

    let mut editor = Editor::with_history(config, MemHistory::new())?;
    editor.set_helper(Some(h));

    Ok(editor)
}
