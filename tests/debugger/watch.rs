use crate::common::{ScriptedChannel, TestHooks, TestInfo, INTERRUPT};
use rrdebug::debugger::address::Address;
use rrdebug::debugger::fingerprint::ExecStartFingerprint;
use rrdebug::debugger::reader::MemoryImage;
use rrdebug::debugger::response::StopEvent;
use rrdebug::debugger::watch::{UserWatch, WatchPhase, WatchRange};
use rrdebug::debugger::Error;

const ENTRY: u64 = 0x8048310;
const ENTRY_HIT: &[&str] = &["Continuing.", "", "Breakpoint 2, 0x08048310 in _start ()"];
const GENUINE_START: &[&str] =
    &["0x8048310 <_start>:\t0x895eed31\t0xf0e483e1\t0x68525450\t0x08048470"];
const FOREIGN_CODE: &[&str] = &["0x8048310:\t0xc3c3c3c3\t0x00000000\t0x00000000\t0x00000000"];
const COUNTER_HIT: &[&str] = &[
    "Continuing.",
    "",
    "Hardware watchpoint 3: counter",
    "",
    "Old value = 0",
    "New value = 1",
    "main () at /build/app/main.c:7",
    "7\t  counter++;",
];

fn fingerprint() -> ExecStartFingerprint {
    ExecStartFingerprint::new(
        Address::from(ENTRY),
        MemoryImage::from_hex("895eed31f0e483e16852545008048470").unwrap(),
    )
}

/// Entry breakpoint and watchpoint installation on a genuine first start.
fn armed_script(resumed: bool) -> ScriptedChannel {
    let channel =
        ScriptedChannel::new().expect("break *0x8048310", &["Breakpoint 2 at 0x8048310"]);
    let channel = if resumed {
        channel.expect("continue", ENTRY_HIT)
    } else {
        channel
    };
    channel
        .expect("x/4xw 0x8048310", GENUINE_START)
        .expect("watch counter", &["Hardware watchpoint 3: counter"])
        .expect("p/x &(counter)", &["$1 = 0x804a01c"])
        .expect("p/x sizeof(counter)", &["$2 = 0x4"])
}

#[test]
fn test_watch_until_second_start() {
    let channel = armed_script(true)
        .expect("continue", COUNTER_HIT)
        .expect("bt", &["#0  main () at /build/app/main.c:7"])
        .expect("continue", ENTRY_HIT)
        .expect("x/4xw 0x8048310", GENUINE_START)
        .expect("delete 2 3", &[]);

    let info = TestInfo::default();
    let hooks = TestHooks::new(info.clone());
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint)
        .with_strip_prefix(Some("/build/app/".to_string()));

    assert_eq!(watch.run().unwrap(), WatchPhase::Done);
    assert!(watch.state().seen_first_entry);
    drop(watch);

    let hits = info.hits.borrow();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].number, 3);
    assert_eq!(hits[0].expression, "counter");
    assert_eq!(hits[0].old.as_deref(), Some("0"));
    assert_eq!(hits[0].new.as_deref(), Some("1"));
    assert_eq!(
        hits[0].range,
        Some(WatchRange {
            start: Address::from(0x804a01c_u64),
            size: 4
        })
    );
    assert_eq!(hits[0].backtrace.frames(), ["#0  main () at main.c:7"]);

    channel.assert_exhausted();
}

#[test]
fn test_foreign_entry_hit_is_ignored() {
    let channel = ScriptedChannel::new()
        .expect("break *0x8048310", &["Breakpoint 2 at 0x8048310"])
        .expect("x/4xw 0x8048310", FOREIGN_CODE)
        .expect(
            "x/4xw 0x8048310",
            &["Cannot access memory at address 0x8048310"],
        );

    let hooks = TestHooks::default();
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint);
    watch.arm_entry().unwrap();

    for _ in 0..2 {
        let phase = watch.advance(StopEvent::Breakpoint { number: 2 }).unwrap();
        assert_eq!(phase, WatchPhase::AwaitingFirstEntry);
        assert!(!watch.state().seen_first_entry);
        assert_eq!(watch.watchpoint(), None);
    }
    drop(watch);

    channel.assert_exhausted();
}

#[test]
fn test_untrusted_backtrace_is_not_reported() {
    let channel = armed_script(false).expect("bt", &["#0  0xc0101234 in ?? ()"]);

    let info = TestInfo::default();
    let hooks = TestHooks::new(info.clone());
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint);

    watch.arm_entry().unwrap();
    let phase = watch
        .advance(StopEvent::Breakpoint { number: 2 })
        .unwrap();
    assert_eq!(phase, WatchPhase::Armed);
    assert_eq!(watch.watchpoint(), Some(3));

    let phase = watch
        .advance(StopEvent::Watchpoint {
            number: 3,
            expression: "counter".to_string(),
            old: Some("0".to_string()),
            new: Some("1".to_string()),
        })
        .unwrap();
    assert_eq!(phase, WatchPhase::Watching);
    drop(watch);

    assert!(info.hits.borrow().is_empty());
    channel.assert_exhausted();
}

#[test]
fn test_foreign_entry_hit_while_watching() {
    let channel = armed_script(false)
        .expect("bt", &["#0  main () at main.c:7"])
        .expect("x/4xw 0x8048310", FOREIGN_CODE);

    let info = TestInfo::default();
    let hooks = TestHooks::new(info.clone());
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint);

    watch.arm_entry().unwrap();
    let phase = watch.advance(StopEvent::Breakpoint { number: 2 }).unwrap();
    assert_eq!(phase, WatchPhase::Armed);

    let phase = watch
        .advance(StopEvent::Watchpoint {
            number: 3,
            expression: "counter".to_string(),
            old: Some("0".to_string()),
            new: Some("1".to_string()),
        })
        .unwrap();
    assert_eq!(phase, WatchPhase::Watching);

    let phase = watch.advance(StopEvent::Breakpoint { number: 2 }).unwrap();
    assert_eq!(phase, WatchPhase::Watching);
    assert!(watch.state().seen_first_entry);
    assert_eq!(watch.watchpoint(), Some(3));

    let phase = watch.advance(StopEvent::ConnectionClosed).unwrap();
    assert_eq!(phase, WatchPhase::Done);
    drop(watch);

    assert_eq!(info.hits.borrow().len(), 1);
    channel.assert_exhausted();
}

#[test]
fn test_unparsable_backtrace_keeps_watching() {
    let channel = armed_script(true)
        .expect("continue", COUNTER_HIT)
        .expect(
            "bt",
            &["Python Exception <class 'gdb.MemoryError'>: Cannot access memory"],
        )
        .expect("continue", &["Remote connection closed"])
        .expect("delete 2 3", &[]);

    let info = TestInfo::default();
    let hooks = TestHooks::new(info.clone());
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint);

    assert_eq!(watch.run().unwrap(), WatchPhase::Done);
    drop(watch);

    assert!(info.hits.borrow().is_empty());
    channel.assert_exhausted();
}

#[test]
fn test_timeout_removes_watch() {
    let channel = armed_script(true)
        .expect_timeout("continue")
        .expect(INTERRUPT, &["Program received signal SIGINT, Interrupt."])
        .expect("delete 2 3", &[]);

    let hooks = TestHooks::default();
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint);

    let err = watch.run().unwrap_err();
    assert!(matches!(err, Error::ChannelTimeout { .. }));
    assert_eq!(watch.watchpoint(), None);
    drop(watch);

    channel.assert_exhausted();
}

#[test]
fn test_watch_ends_with_replay() {
    let channel = armed_script(true)
        .expect("continue", &["Remote connection closed"])
        .expect("delete 2 3", &[]);

    let hooks = TestHooks::default();
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint);

    assert_eq!(watch.run().unwrap(), WatchPhase::Done);
    assert_eq!(watch.phase(), WatchPhase::Done);
    drop(watch);

    channel.assert_exhausted();
}

#[test]
fn test_unexpected_stop_keeps_watching() {
    let channel = armed_script(true)
        .expect(
            "continue",
            &["Program received signal SIGSEGV, Segmentation fault."],
        )
        .expect("continue", &["Remote connection closed"])
        .expect("delete 2 3", &[]);

    let info = TestInfo::default();
    let hooks = TestHooks::new(info.clone());
    let fingerprint = fingerprint();
    let mut debugger = channel.clone();
    let mut watch = UserWatch::new(&mut debugger, &hooks, "counter", &fingerprint);

    assert_eq!(watch.run().unwrap(), WatchPhase::Done);
    drop(watch);

    assert!(info.hits.borrow().is_empty());
    channel.assert_exhausted();
}
