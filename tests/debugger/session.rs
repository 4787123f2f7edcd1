use crate::common::{ScriptedChannel, TestHooks, TestInfo, INTERRUPT};
use rrdebug::debugger::response::StopEvent;
use rrdebug::debugger::trace::WriteEvent;
use rrdebug::debugger::{Error, NopHook, Session};
use std::path::Path;
use std::sync::atomic::AtomicBool;

const JIFFIES_HIT: &[&str] = &[
    "Continuing.",
    "",
    "Hardware watchpoint 1: jiffies",
    "",
    "Old value = 4294937296",
    "New value = 4294937297",
    "do_timer (ticks=1) at kernel/time/timekeeping.c:2204",
];

fn watched_jiffies() -> ScriptedChannel {
    ScriptedChannel::new()
        .expect("watch jiffies", &["Hardware watchpoint 1: jiffies"])
        .expect("p/x &(jiffies)", &["$1 = 0xc1a05000"])
        .expect("p/x sizeof(jiffies)", &["$2 = 0x4"])
}

#[test]
fn test_connect() {
    let channel = ScriptedChannel::new()
        .expect(
            "target remote localhost:1234",
            &["Remote debugging using localhost:1234", "0x0000fff0 in ?? ()"],
        )
        .expect("file vmlinux", &["Reading symbols from vmlinux..."]);

    let mut session = Session::new(channel.clone(), Box::new(NopHook));
    session.connect("localhost:1234", Path::new("vmlinux")).unwrap();
    channel.assert_exhausted();

    let channel = ScriptedChannel::new().expect(
        "target remote localhost:1234",
        &["localhost:1234: Connection timed out."],
    );
    let mut session = Session::new(channel, Box::new(NopHook));
    let err = session
        .connect("localhost:1234", Path::new("vmlinux"))
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolParse { .. }));
}

#[test]
fn test_kernel_watchpoint_hit() {
    let channel = watched_jiffies().expect("continue", JIFFIES_HIT).expect(
        "bt",
        &[
            "#0  do_timer (ticks=1) at /src/linux/kernel/time/timekeeping.c:2204",
            "#1  0xc10a3b1d in tick_periodic (cpu=0) at /src/linux/kernel/time/tick-common.c:90",
        ],
    );

    let info = TestInfo::default();
    let mut session = Session::new(channel.clone(), Box::new(TestHooks::new(info.clone())))
        .with_strip_prefix(Some("/src/linux/".to_string()));

    assert_eq!(session.watch_kernel("jiffies").unwrap(), 1);
    let event = session.continue_until_stop().unwrap();
    assert!(matches!(event, StopEvent::Watchpoint { number: 1, .. }));
    assert!(!session.is_running());

    let hits = info.hits.borrow();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].new.as_deref(), Some("4294937297"));
    assert_eq!(
        hits[0].backtrace.frames()[0],
        "#0  do_timer (ticks=1) at kernel/time/timekeeping.c:2204"
    );
    assert!(hits[0].range.is_some());
    assert!(info.stops.borrow().is_empty());

    channel.assert_exhausted();
}

#[test]
fn test_kernel_watchpoint_hit_without_symbols() {
    let channel = watched_jiffies()
        .expect("continue", JIFFIES_HIT)
        .expect("bt", &["#0  0xc10a3b1d in ?? ()", "#1  0x00000000 in ?? ()"]);

    let info = TestInfo::default();
    let mut session = Session::new(channel.clone(), Box::new(TestHooks::new(info.clone())));

    session.watch_kernel("jiffies").unwrap();
    session.continue_until_stop().unwrap();

    assert!(info.hits.borrow().is_empty());
    assert_eq!(info.stops.borrow().len(), 1);
    channel.assert_exhausted();
}

#[test]
fn test_kernel_watchpoint_hit_with_broken_backtrace() {
    let channel = watched_jiffies()
        .expect("continue", JIFFIES_HIT)
        .expect("bt", &["Python Exception <class 'gdb.error'>: No frame selected."]);

    let info = TestInfo::default();
    let mut session = Session::new(channel.clone(), Box::new(TestHooks::new(info.clone())));

    session.watch_kernel("jiffies").unwrap();
    let event = session.continue_until_stop().unwrap();
    assert!(matches!(event, StopEvent::Watchpoint { number: 1, .. }));

    assert!(info.hits.borrow().is_empty());
    assert_eq!(info.stops.borrow().len(), 1);
    channel.assert_exhausted();
}

#[test]
fn test_timed_out_command_leaves_target_running() {
    let channel = ScriptedChannel::new()
        .expect_timeout("continue")
        .expect(INTERRUPT, &["Program received signal SIGINT, Interrupt."])
        .expect("watch jiffies", &["Hardware watchpoint 1: jiffies"])
        .expect("p/x &(jiffies)", &["$1 = 0xc1a05000"])
        .expect("p/x sizeof(jiffies)", &["$2 = 0x4"]);

    let mut session = Session::new(channel.clone(), Box::new(TestHooks::default()));

    let err = session.continue_until_stop().unwrap_err();
    assert!(matches!(err, Error::ChannelTimeout { .. }));
    assert!(session.is_running());

    session.watch_kernel("jiffies").unwrap();
    assert!(!session.is_running());
    channel.assert_exhausted();
}

#[test]
fn test_trace_until_replay_end() {
    let channel = ScriptedChannel::new()
        .expect(
            "display/i $pc",
            &["1: x/i $pc", "=> 0xc1000000 <startup_32>:\tmovl   $0x1,0xc1a05000"],
        )
        .expect("x/1xw 0xc1a05000", &["0xc1a05000 <jiffies>:\t0x00000000"])
        .expect("bt", &["#0  startup_32 () at arch/x86/kernel/head_32.S:94"])
        .expect("stepi", &["Remote connection closed"])
        .expect("undisplay 1", &[]);

    let info = TestInfo::default();
    let mut session = Session::new(channel.clone(), Box::new(TestHooks::new(info.clone())));
    let mut events: Vec<WriteEvent> = vec![];

    let recorded = session.trace(&mut events, &AtomicBool::new(false)).unwrap();
    assert_eq!(recorded, 0);
    assert!(events.is_empty());
    assert!(!session.is_running());
    channel.assert_exhausted();
}

#[test]
fn test_timed_out_trace_stops_target() {
    let channel = ScriptedChannel::new()
        .expect(
            "display/i $pc",
            &["1: x/i $pc", "=> 0xc1000005 <startup_32+5>:\tnop"],
        )
        .expect_timeout("stepi")
        .expect(INTERRUPT, &["Program received signal SIGINT, Interrupt."])
        .expect("undisplay 1", &[]);

    let mut session = Session::new(channel.clone(), Box::new(NopHook));
    let mut events: Vec<WriteEvent> = vec![];

    let err = session
        .trace(&mut events, &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, Error::ChannelTimeout { .. }));
    assert!(!session.is_running());
    channel.assert_exhausted();
}
