use super::{Command, CommandError, CommandResult};
use chumsky::error::Rich;
use chumsky::prelude::{any, choice, end, just};
use chumsky::text::whitespace;
use chumsky::{extra, text, Boxed, Parser};
use std::path::PathBuf;

pub const SET_VMLINUX_COMMAND: &str = "set_vmlinux";
pub const SET_GDB_COMMAND: &str = "set_gdb";
pub const SET_QEMU_COMMAND: &str = "set_qemu";
pub const SET_REPLAY_FILE_COMMAND: &str = "set_replay_file";
pub const SET_IMAGE_COMMAND: &str = "set_image";
pub const SET_REMOTE_COMMAND: &str = "set_remote";
pub const SET_STRIP_PREFIX_COMMAND: &str = "set_strip_prefix";
pub const SET_USER_EXEC_COMMAND: &str = "set_user_exec";
pub const START_COMMAND: &str = "start";
pub const WATCH_COMMAND: &str = "watch";
pub const WATCH_USER_COMMAND: &str = "watch_user";
pub const RUN_COMMAND: &str = "run";
pub const RUN_COMMAND_SHORT: &str = "r";
pub const TRACE_COMMAND: &str = "trace";
pub const HELP_COMMAND: &str = "help";
pub const HELP_COMMAND_SHORT: &str = "h";

type Err<'a> = extra::Err<Rich<'a, char>>;

/// Rest of the line after a keyword and at least one whitespace, trimmed, not empty.
fn argument<'a>(
    keyword: &'static str,
) -> impl chumsky::Parser<'a, &'a str, &'a str, Err<'a>> + Clone {
    whitespace()
        .ignore_then(just(keyword))
        .then_ignore(whitespace().at_least(1))
        .ignore_then(any().repeated().at_least(1).to_slice())
        .map(str::trim)
        .filter(|arg: &&str| !arg.is_empty())
        .labelled("argument")
}

fn command<'a, I>(ctx: &'static str, inner: I) -> Boxed<'a, 'a, &'a str, Command, Err<'a>>
where
    I: chumsky::Parser<'a, &'a str, Command, Err<'a>> + 'a,
{
    inner.then_ignore(end()).labelled(ctx).boxed()
}

impl Command {
    /// Parse input string into command.
    pub fn parse(input: &str) -> CommandResult<Command> {
        if input.trim().is_empty() {
            return Ok(Command::SkipInput);
        }

        Self::parser()
            .parse(input)
            .into_result()
            .map_err(|e| {
                let reason = e
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string());
                CommandError::Parsing(reason)
            })
    }

    fn parser<'a>() -> impl chumsky::Parser<'a, &'a str, Command, Err<'a>> {
        let op = |sym| just(sym).padded();
        let op2 = |full, short| op(full).or(op(short));

        let set_vmlinux = argument(SET_VMLINUX_COMMAND)
            .map(|path| Command::SetVmlinux(PathBuf::from(path)));
        let set_gdb = argument(SET_GDB_COMMAND).map(|path| Command::SetGdb(path.to_string()));
        let set_qemu = argument(SET_QEMU_COMMAND)
            .map(|line: &str| {
                let mut words = line.split_whitespace().map(ToString::to_string);
                let exec = words.next().unwrap_or_default();
                Command::SetQemu {
                    exec,
                    args: words.collect(),
                }
            })
            .boxed();
        let set_replay_file = argument(SET_REPLAY_FILE_COMMAND)
            .map(|path| Command::SetReplayFile(PathBuf::from(path)));
        let set_image =
            argument(SET_IMAGE_COMMAND).map(|path| Command::SetImage(PathBuf::from(path)));
        let set_remote =
            argument(SET_REMOTE_COMMAND).map(|remote| Command::SetRemote(remote.to_string()));
        let set_strip_prefix = argument(SET_STRIP_PREFIX_COMMAND)
            .map(|prefix| Command::SetStripPrefix(prefix.to_string()));
        let set_user_exec = argument(SET_USER_EXEC_COMMAND)
            .map(|path| Command::SetUserExec(PathBuf::from(path)));

        let start = op(START_COMMAND).to(Command::Start);
        let watch_user =
            argument(WATCH_USER_COMMAND).map(|symbol| Command::WatchUser(symbol.to_string()));
        let watch = argument(WATCH_COMMAND).map(|symbol| Command::Watch(symbol.to_string()));
        let run = op2(RUN_COMMAND, RUN_COMMAND_SHORT).to(Command::Run);
        let trace = op(TRACE_COMMAND).to(Command::Trace);

        let help = op2(HELP_COMMAND, HELP_COMMAND_SHORT)
            .ignore_then(text::ident().or_not())
            .map(|s: Option<&str>| Command::Help {
                command: s.map(ToOwned::to_owned),
            })
            .padded()
            .boxed();

        // keywords sharing a prefix go longest first
        choice((
            command(SET_VMLINUX_COMMAND, set_vmlinux),
            command(SET_GDB_COMMAND, set_gdb),
            command(SET_QEMU_COMMAND, set_qemu),
            command(SET_REPLAY_FILE_COMMAND, set_replay_file),
            command(SET_IMAGE_COMMAND, set_image),
            command(SET_REMOTE_COMMAND, set_remote),
            command(SET_STRIP_PREFIX_COMMAND, set_strip_prefix),
            command(SET_USER_EXEC_COMMAND, set_user_exec),
            command(START_COMMAND, start),
            command(WATCH_USER_COMMAND, watch_user),
            command(WATCH_COMMAND, watch),
            command(RUN_COMMAND, run),
            command(TRACE_COMMAND, trace),
            command(HELP_COMMAND, help),
        ))
        .map_err(|e| {
            let span = e.span();
            if span.start == 0 && span.end == 0 {
                Rich::custom(*e.span(), "type help for list of commands")
            } else {
                e
            }
        })
    }
}
