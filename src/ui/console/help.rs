use crate::ui::command::parser;

pub const HELP: &str = r#"
Available commands:

set_vmlinux <path>                  -- kernel image with symbols
set_gdb <path>                      -- debugger executable
set_qemu <path> [args..]            -- emulator executable and extra arguments
set_replay_file <path>              -- recorded execution to replay
set_image <path>                    -- disk image of the replayed machine
set_remote <host:port>              -- emulator debug stub address
set_strip_prefix <prefix>           -- build path prefix removed from backtraces
set_user_exec <path>                -- user-level executable for watch_user
start                               -- start replay and attach the debugger
watch <symbol>                      -- watch a kernel variable
watch_user <symbol>                 -- watch a variable of the user-level executable
r, run                              -- continue replay until next stop
trace                               -- record every memory write, Ctrl-C stops tracing
h, help <>|<command>                -- show help
q, quit                             -- exit
"#;

pub const HELP_SET: &str = "\
\x1b[32;1mset_*\x1b[0m
Change session configuration. New values are used by the next `start`.

Defaults:
set_gdb gdb
set_qemu qemu
set_replay_file r.log
set_vmlinux vmlinux
set_remote localhost:1234

Emulator always runs with `-s -no-reboot`, extra `set_qemu` arguments are appended to them.
";

pub const HELP_SET_USER_EXEC: &str = "\
\x1b[32;1mset_user_exec\x1b[0m
Set the user-level executable whose variables are watched by `watch_user`.
The first bytes at the executable entry point are captured right away, they are used to
recognize a real start of the executable during replay.
";

pub const HELP_START: &str = "\
\x1b[32;1mstart\x1b[0m
Start the emulator in replay mode, attach the debugger to its debug stub and load kernel
symbols. A running session is terminated first.
";

pub const HELP_WATCH: &str = "\
\x1b[32;1mwatch\x1b[0m
Set a watchpoint on a kernel variable. Hits are reported by `run`.

Examples of usage:
watch jiffies
";

pub const HELP_WATCH_USER: &str = "\
\x1b[32;1mwatch_user\x1b[0m
Watch a variable of the user-level executable (see `set_user_exec`).
The watchpoint is installed when the executable starts for the first time, every change is
reported with a backtrace. Watching ends when the executable starts again or when the replay
is over. Ctrl-C stops watching.
";

pub const HELP_RUN: &str = "\
\x1b[32;1mr, run\x1b[0m
Continue replay until a breakpoint, a watchpoint or the end of replay. Ctrl-C interrupts.
";

pub const HELP_TRACE: &str = "\
\x1b[32;1mtrace\x1b[0m
Step replay one instruction at a time and record every memory write into the event store:
instruction pointer, written address, old and new value, backtrace.
Stack operations and control flow instructions are not traced. Ctrl-C stops tracing.
";

pub const HELP_QUIT: &str = "\
\x1b[32;1mq, quit\x1b[0m
Terminate debugger and emulator, exit.
";

pub fn help_for_command(command: Option<&str>) -> &str {
    match command {
        None => HELP,
        Some(parser::SET_VMLINUX_COMMAND)
        | Some(parser::SET_GDB_COMMAND)
        | Some(parser::SET_QEMU_COMMAND)
        | Some(parser::SET_REPLAY_FILE_COMMAND)
        | Some(parser::SET_IMAGE_COMMAND)
        | Some(parser::SET_REMOTE_COMMAND)
        | Some(parser::SET_STRIP_PREFIX_COMMAND) => HELP_SET,
        Some(parser::SET_USER_EXEC_COMMAND) => HELP_SET_USER_EXEC,
        Some(parser::START_COMMAND) => HELP_START,
        Some(parser::WATCH_COMMAND) => HELP_WATCH,
        Some(parser::WATCH_USER_COMMAND) => HELP_WATCH_USER,
        Some(parser::RUN_COMMAND) | Some(parser::RUN_COMMAND_SHORT) => HELP_RUN,
        Some(parser::TRACE_COMMAND) => HELP_TRACE,
        Some("q") | Some("quit") => HELP_QUIT,
        _ => "unknown command",
    }
}
