use crate::common::{ScriptedChannel, TestHooks, TestInfo, INTERRUPT};
use rrdebug::debugger::address::Address;
use rrdebug::debugger::reader::MemoryImage;
use rrdebug::debugger::trace::{TracePhase, WriteEvent, WriteTracer};
use rrdebug::debugger::Error;
use std::sync::atomic::AtomicBool;

const STORE_INSTRUCTION: &[&str] = &[
    "1: x/i $pc",
    "=> 0x8048000 <main+3>:\tmovl   $0x5,0x100",
];
const NOP_AFTER_STEP: &[&str] = &[
    "0x08048007\t5\t  x = 5;",
    "1: x/i $pc",
    "=> 0x8048007 <main+10>:\tnop",
];
const CONNECTION_CLOSED: &[&str] = &["Remote connection closed"];

#[test]
fn test_trace_records_absolute_store() {
    let channel = ScriptedChannel::new()
        .expect("display/i $pc", STORE_INSTRUCTION)
        .expect("x/1xw 0x100", &["0x100:\t0x00000000"])
        .expect("bt", &["#0  main () at /build/app/main.c:5"])
        .expect("stepi", NOP_AFTER_STEP)
        .expect("x/1xw 0x100", &["0x100:\t0x00000005"])
        .expect("stepi", CONNECTION_CLOSED)
        .expect("undisplay 1", &[]);

    let info = TestInfo::default();
    let hooks = TestHooks::new(info.clone());
    let mut events: Vec<WriteEvent> = vec![];
    let mut debugger = channel.clone();

    let recorded = WriteTracer::new(&mut debugger, &mut events, &hooks)
        .with_strip_prefix(Some("/build/app/".to_string()))
        .run(&AtomicBool::new(false))
        .unwrap();

    assert_eq!(recorded, 1);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.instruction_pointer, Address::from(0x8048000_u64));
    assert_eq!(event.memory_address, Address::from(0x100_u64));
    assert_eq!(event.old_value, MemoryImage::from(vec![0, 0, 0, 0]));
    assert_eq!(event.new_value, MemoryImage::from(vec![0, 0, 0, 5]));
    assert_eq!(event.backtrace.frames(), ["#0  main () at main.c:5"]);

    assert_eq!(info.writes.borrow().as_slice(), events.as_slice());
    channel.assert_exhausted();
}

#[test]
fn test_trace_skips_unchanged_memory() {
    let channel = ScriptedChannel::new()
        .expect("display/i $pc", STORE_INSTRUCTION)
        .expect("x/1xw 0x100", &["0x100:\t0x00000005"])
        .expect("bt", &["#0  main () at main.c:5"])
        .expect("stepi", NOP_AFTER_STEP)
        .expect("x/1xw 0x100", &["0x100:\t0x00000005"]);

    let hooks = TestHooks::default();
    let mut events: Vec<WriteEvent> = vec![];
    let mut debugger = channel.clone();
    let mut tracer = WriteTracer::new(&mut debugger, &mut events, &hooks);

    tracer.start().unwrap();
    assert_eq!(tracer.step().unwrap(), None);
    assert_eq!(tracer.recorded(), 0);
    assert_eq!(tracer.phase(), TracePhase::Stepping);
    drop(tracer);

    assert!(events.is_empty());
    channel.assert_exhausted();
}

#[test]
fn test_trace_register_relative_destination() {
    let channel = ScriptedChannel::new()
        .expect(
            "display/i $pc",
            &["1: x/i $pc", "=> 0x8048010 <f+4>:\tmov    %eax,-0x8(%ebp)"],
        )
        .expect("p/x $ebp", &["$1 = 0x1000"])
        .expect("x/1xw 0xff8", &["0xff8:\t0x00000001"])
        .expect("bt", &["#0  f () at f.c:3", "#1  main () at main.c:9"])
        .expect("stepi", NOP_AFTER_STEP)
        .expect("x/1xw 0xff8", &["0xff8:\t0x00000002"]);

    let hooks = TestHooks::default();
    let mut events: Vec<WriteEvent> = vec![];
    let mut debugger = channel.clone();
    let mut tracer = WriteTracer::new(&mut debugger, &mut events, &hooks);

    tracer.start().unwrap();
    let event = tracer.step().unwrap().expect("write event");
    assert_eq!(event.instruction_pointer, Address::from(0x8048010_u64));
    assert_eq!(event.memory_address, Address::from(0xff8_u64));
    assert_eq!(event.backtrace.frames().len(), 2);
    drop(tracer);

    assert_eq!(events.len(), 1);
    channel.assert_exhausted();
}

#[test]
fn test_trace_skips_inaccessible_destination() {
    let channel = ScriptedChannel::new()
        .expect("display/i $pc", STORE_INSTRUCTION)
        .expect("x/1xw 0x100", &["Cannot access memory at address 0x100"])
        .expect("stepi", NOP_AFTER_STEP)
        .expect("stepi", CONNECTION_CLOSED)
        .expect("undisplay 1", &[]);

    let hooks = TestHooks::default();
    let mut events: Vec<WriteEvent> = vec![];
    let mut debugger = channel.clone();

    let recorded = WriteTracer::new(&mut debugger, &mut events, &hooks)
        .run(&AtomicBool::new(false))
        .unwrap();

    assert_eq!(recorded, 0);
    assert!(events.is_empty());
    channel.assert_exhausted();
}

#[test]
fn test_trace_ignores_stack_operations() {
    let channel = ScriptedChannel::new()
        .expect(
            "display/i $pc",
            &["1: x/i $pc", "=> 0x8048000 <main>:\tpush   %ebp"],
        )
        .expect(
            "stepi",
            &["1: x/i $pc", "=> 0x8048001 <main+1>:\tcmpl   $0x0,0x100"],
        )
        .expect("stepi", CONNECTION_CLOSED)
        .expect("undisplay 1", &[]);

    let hooks = TestHooks::default();
    let mut events: Vec<WriteEvent> = vec![];
    let mut debugger = channel.clone();

    let recorded = WriteTracer::new(&mut debugger, &mut events, &hooks)
        .run(&AtomicBool::new(false))
        .unwrap();

    assert_eq!(recorded, 0);
    channel.assert_exhausted();
}

#[test]
fn test_trace_cancel() {
    let channel = ScriptedChannel::new()
        .expect(
            "display/i $pc",
            &["1: x/i $pc", "=> 0x8048007 <main+10>:\tnop"],
        )
        .expect("undisplay 1", &[]);

    let hooks = TestHooks::default();
    let mut events: Vec<WriteEvent> = vec![];
    let mut debugger = channel.clone();
    let mut tracer = WriteTracer::new(&mut debugger, &mut events, &hooks);

    assert_eq!(tracer.run(&AtomicBool::new(true)).unwrap(), 0);
    assert_eq!(tracer.phase(), TracePhase::Done);
    drop(tracer);

    channel.assert_exhausted();
}

#[test]
fn test_trace_removes_display_on_every_run() {
    let channel = ScriptedChannel::new()
        .expect(
            "display/i $pc",
            &["1: x/i $pc", "=> 0x8048007 <main+10>:\tnop"],
        )
        .expect_timeout("stepi")
        .expect(INTERRUPT, &["Program received signal SIGINT, Interrupt."])
        .expect("undisplay 1", &[])
        .expect(
            "display/i $pc",
            &["2: x/i $pc", "=> 0x8048008 <main+11>:\tnop"],
        )
        .expect("stepi", CONNECTION_CLOSED)
        .expect("undisplay 2", &[]);

    let hooks = TestHooks::default();
    let mut events: Vec<WriteEvent> = vec![];
    let mut debugger = channel.clone();

    let err = WriteTracer::new(&mut debugger, &mut events, &hooks)
        .run(&AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, Error::ChannelTimeout { .. }));

    let recorded = WriteTracer::new(&mut debugger, &mut events, &hooks)
        .run(&AtomicBool::new(false))
        .unwrap();
    assert_eq!(recorded, 0);

    channel.assert_exhausted();
}
