//! Integration tests for monitors, threads, timers and class-init waits
//!
//! All tests run on a `ManualClock`, so time only moves when the VM sleeps
//! between turns or a test advances it.

use cldc_engine::vm::scheduler::PollingHost;
use cldc_engine::vm::{ContextFailure, SuspendReason};
use cldc_engine::{ManualClock, SchedulingPolicy, Value, Vm, VmOptions};
use std::sync::Arc;
use std::time::Duration;

fn vm_with(source: &str) -> Vm {
    let mut vm = Vm::with_clock(VmOptions::default(), Arc::new(ManualClock::new())).unwrap();
    vm.load_source(source).unwrap();
    vm
}

// ============================================================================
// Monitors
// ============================================================================

const MAILBOX: &str = r#"
.class public app/Mailbox
.field public static lock Ljava/lang/Object;
.field public static value I

.method static <clinit>()V
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    putstatic app/Mailbox.lock Ljava/lang/Object;
    return
.end method

.method public static take()I
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorenter
Loop:
    getstatic app/Mailbox.value I
    ifne Got
    getstatic app/Mailbox.lock Ljava/lang/Object;
    invokevirtual java/lang/Object.wait()V
    goto Loop
Got:
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorexit
    getstatic app/Mailbox.value I
    ireturn
.end method

.method public static put(I)V
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorenter
    iload_0
    putstatic app/Mailbox.value I
    getstatic app/Mailbox.lock Ljava/lang/Object;
    invokevirtual java/lang/Object.notify()V
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorexit
    return
.end method

.method public static nested()I
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorenter
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorenter
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorexit
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorexit
    iconst_1
    ireturn
.end method

.method public static stray_exit()V
    getstatic app/Mailbox.lock Ljava/lang/Object;
    monitorexit
    return
.end method

.method public static stray_wait()V
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    invokevirtual java/lang/Object.wait()V
    return
.end method
.end class
"#;

#[test]
fn test_wait_and_notify_handoff() {
    let mut vm = vm_with(MAILBOX);
    let mut host = PollingHost::default();

    let consumer = vm.spawn("app/Mailbox", "take", "()I", vec![]).unwrap();
    vm.run_turn(&mut host).unwrap();
    // parked in wait() with nothing left to wake it
    assert_eq!(host.take(), None);
    assert!(matches!(
        vm.runtime().context(consumer).and_then(|c| c.suspend_reason.clone()),
        Some(SuspendReason::Wait { .. })
    ));

    let producer = vm.spawn("app/Mailbox", "put", "(I)V", vec![Value::Int(7)]).unwrap();
    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.result(producer), Some(None));
    assert_eq!(vm.result(consumer), Some(Some(Value::Int(7))));
}

#[test]
fn test_monitor_is_reentrant() {
    let mut vm = vm_with(MAILBOX);
    let id = vm.spawn("app/Mailbox", "nested", "()I", vec![]).unwrap();
    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.result(id), Some(Some(Value::Int(1))));
}

#[test]
fn test_unowned_monitor_operations_throw() {
    for method in ["stray_exit", "stray_wait"] {
        let mut vm = vm_with(MAILBOX);
        vm.spawn("app/Mailbox", method, "()V", vec![]).unwrap();
        vm.run_until_idle().unwrap();
        match vm.failures() {
            [ContextFailure::Uncaught(report)] => {
                assert_eq!(report.class_name, "java.lang.IllegalMonitorStateException", "{}", method)
            }
            other => panic!("{}: {:?}", method, other),
        }
    }
}

const GUARD: &str = r#"
.class public app/Guard
.method public static synchronized explode()V
    aconst_null
    athrow
.end method

.method public static synchronized touch()I
    bipush 7
    ireturn
.end method

.method public static survivor()I
Start:
    invokestatic app/Guard.explode()V
    iconst_0
    ireturn
End:
Handler:
    pop
    ldc2_w 5L
    invokestatic java/lang/Thread.sleep(J)V
    iconst_1
    ireturn
.catch java/lang/NullPointerException from Start to End using Handler
.end method

.method public static late_toucher()I
    lconst_1
    invokestatic java/lang/Thread.sleep(J)V
    invokestatic app/Guard.touch()I
    ireturn
.end method
.end class
"#;

#[test]
fn test_synchronized_method_releases_on_unwind() {
    let clock = ManualClock::new();
    let mut vm = Vm::with_clock(VmOptions::default(), Arc::new(clock.clone())).unwrap();
    vm.load_source(GUARD).unwrap();
    let mut host = PollingHost::default();

    let survivor = vm.spawn("app/Guard", "survivor", "()I", vec![]).unwrap();
    let toucher = vm.spawn("app/Guard", "late_toucher", "()I", vec![]).unwrap();
    vm.run_turn(&mut host).unwrap();
    assert_eq!(host.take(), Some(Duration::from_millis(1)));

    // the survivor still sleeps, but the class lock it took in explode()
    // was released when the exception left that frame
    clock.advance(Duration::from_millis(1));
    vm.run_turn(&mut host).unwrap();
    assert_eq!(vm.result(toucher), Some(Some(Value::Int(7))));
    assert!(vm.is_alive(survivor));

    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.result(survivor), Some(Some(Value::Int(1))));
}

const CONTENDED: &str = r#"
.class public app/Contended
.field public static lock Ljava/lang/Object;
.field public static value I

.method static <clinit>()V
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    putstatic app/Contended.lock Ljava/lang/Object;
    return
.end method

.method public static hold_twice()I
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorenter
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorenter
    ldc2_w 5L
    invokestatic java/lang/Thread.sleep(J)V
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorexit
    ldc2_w 5L
    invokestatic java/lang/Thread.sleep(J)V
    bipush 9
    putstatic app/Contended.value I
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorexit
    iconst_1
    ireturn
.end method

.method public static grab()I
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorenter
    getstatic app/Contended.value I
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorexit
    ireturn
.end method

.method public static park()I
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorenter
    getstatic app/Contended.lock Ljava/lang/Object;
    invokevirtual java/lang/Object.wait()V
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorexit
    iconst_1
    ireturn
.end method

.method public static hold_and_die()V
    getstatic app/Contended.lock Ljava/lang/Object;
    monitorenter
    ldc2_w 5L
    invokestatic java/lang/Thread.sleep(J)V
    aconst_null
    athrow
.end method
.end class
"#;

fn suspend_reason(vm: &Vm, id: cldc_engine::ContextId) -> Option<SuspendReason> {
    vm.runtime().context(id).and_then(|c| c.suspend_reason.clone())
}

#[test]
fn test_contended_enter_waits_for_last_exit() {
    let clock = ManualClock::new();
    let mut vm = Vm::with_clock(VmOptions::default(), Arc::new(clock.clone())).unwrap();
    vm.load_source(CONTENDED).unwrap();
    let mut host = PollingHost::default();

    let owner = vm.spawn("app/Contended", "hold_twice", "()I", vec![]).unwrap();
    vm.run_turn(&mut host).unwrap();
    assert_eq!(suspend_reason(&vm, owner), Some(SuspendReason::Sleep));

    let contender = vm.spawn("app/Contended", "grab", "()I", vec![]).unwrap();
    vm.run_turn(&mut host).unwrap();
    assert!(matches!(suspend_reason(&vm, contender), Some(SuspendReason::MonitorEnter { .. })));

    // first exit only drops the level to one
    clock.advance(Duration::from_millis(5));
    vm.run_turn(&mut host).unwrap();
    assert_eq!(suspend_reason(&vm, owner), Some(SuspendReason::Sleep));
    assert!(matches!(suspend_reason(&vm, contender), Some(SuspendReason::MonitorEnter { .. })));
    assert_eq!(vm.result(contender), None);

    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.result(owner), Some(Some(Value::Int(1))));
    assert_eq!(vm.result(contender), Some(Some(Value::Int(9))));
}

#[test]
fn test_dying_owner_wakes_waiting_and_entering_contexts() {
    let mut vm = vm_with(CONTENDED);
    let mut host = PollingHost::default();

    let waiter = vm.spawn("app/Contended", "park", "()I", vec![]).unwrap();
    vm.run_turn(&mut host).unwrap();
    assert!(matches!(suspend_reason(&vm, waiter), Some(SuspendReason::Wait { .. })));

    let owner = vm.spawn("app/Contended", "hold_and_die", "()V", vec![]).unwrap();
    vm.run_turn(&mut host).unwrap();
    let entering = vm.spawn("app/Contended", "grab", "()I", vec![]).unwrap();
    vm.run_turn(&mut host).unwrap();
    assert!(matches!(suspend_reason(&vm, entering), Some(SuspendReason::MonitorEnter { .. })));

    let report = vm.run_until_idle().unwrap();
    assert!(report.blocked.is_empty(), "{:?}", report);
    match report.failures.as_slice() {
        [ContextFailure::Uncaught(crash)] => {
            assert_eq!(crash.context, owner);
            assert_eq!(crash.class_name, "java.lang.NullPointerException");
        }
        other => panic!("expected the owner's exception, got {:?}", other),
    }
    assert_eq!(vm.result(waiter), Some(Some(Value::Int(1))));
    assert_eq!(vm.result(entering), Some(Some(Value::Int(0))));
}

// ============================================================================
// Threads
// ============================================================================

const WORKERS: &str = r#"
.class public app/Worker
.super java/lang/Thread
.field public static done I
.field public static lock Ljava/lang/Object;

.method static <clinit>()V
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    putstatic app/Worker.lock Ljava/lang/Object;
    return
.end method

.method public <init>()V
    aload_0
    invokespecial java/lang/Thread.<init>()V
    return
.end method

.method public run()V
    ldc2_w 20L
    invokestatic java/lang/Thread.sleep(J)V
    iconst_1
    putstatic app/Worker.done I
    return
.end method

.method public static main()I
    new app/Worker
    dup
    invokespecial app/Worker.<init>()V
    astore_0
    aload_0
    invokevirtual java/lang/Thread.start()V
    aload_0
    invokevirtual java/lang/Thread.join()V
    getstatic app/Worker.done I
    ireturn
.end method

.method public static double_start()V
    new app/Worker
    dup
    invokespecial app/Worker.<init>()V
    astore_0
    aload_0
    invokevirtual java/lang/Thread.start()V
    aload_0
    invokevirtual java/lang/Thread.start()V
    return
.end method
.end class

.class public app/Crasher
.super java/lang/Thread

.method public <init>()V
    aload_0
    invokespecial java/lang/Thread.<init>()V
    return
.end method

.method public run()V
    getstatic app/Worker.lock Ljava/lang/Object;
    monitorenter
    aconst_null
    athrow
.end method

.method public static main()I
    new app/Crasher
    dup
    invokespecial app/Crasher.<init>()V
    astore_0
    aload_0
    invokevirtual java/lang/Thread.start()V
    aload_0
    invokevirtual java/lang/Thread.join()V
    getstatic app/Worker.lock Ljava/lang/Object;
    monitorenter
    getstatic app/Worker.lock Ljava/lang/Object;
    monitorexit
    iconst_5
    ireturn
.end method
.end class
"#;

#[test]
fn test_join_waits_for_sleeping_thread() {
    let mut vm = vm_with(WORKERS);
    let main = vm.spawn("app/Worker", "main", "()I", vec![]).unwrap();
    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.finished, 2);
    assert_eq!(vm.result(main), Some(Some(Value::Int(1))));
}

#[test]
fn test_thread_cannot_start_twice() {
    let mut vm = vm_with(WORKERS);
    vm.spawn("app/Worker", "double_start", "()V", vec![]).unwrap();
    vm.run_until_idle().unwrap();
    let classes: Vec<&str> = vm
        .failures()
        .iter()
        .filter_map(|f| match f {
            ContextFailure::Uncaught(report) => Some(report.class_name.as_str()),
            ContextFailure::Fatal { .. } => None,
        })
        .collect();
    assert_eq!(classes, ["java.lang.IllegalThreadStateException"]);
}

#[test]
fn test_uncaught_exception_releases_monitors_and_wakes_joiner() {
    let mut vm = vm_with(WORKERS);
    let main = vm.spawn("app/Crasher", "main", "()I", vec![]).unwrap();
    let report = vm.run_until_idle().unwrap();

    assert!(report.blocked.is_empty(), "{:?}", report);
    assert_eq!(vm.result(main), Some(Some(Value::Int(5))));
    match report.failures.as_slice() {
        [ContextFailure::Uncaught(crash)] => {
            assert_ne!(crash.context, main);
            assert_eq!(crash.class_name, "java.lang.NullPointerException");
            assert_eq!(crash.trace[0].method, "run");
        }
        other => panic!("expected the worker's exception, got {:?}", other),
    }
}

#[test]
fn test_yield_alternates_under_round_robin() {
    let options = VmOptions {
        policy: SchedulingPolicy::RoundRobin,
        ..VmOptions::default()
    };
    let mut vm = Vm::with_clock(options, Arc::new(ManualClock::new())).unwrap();
    vm.load_source(
        r#"
.class public app/Turns
.field public static trail I
.method public static mark(I)V
    getstatic app/Turns.trail I
    bipush 10
    imul
    iload_0
    iadd
    putstatic app/Turns.trail I
    return
.end method
.method public static play(I)V
    iload_0
    invokestatic app/Turns.mark(I)V
    invokestatic java/lang/Thread.yield()V
    iload_0
    invokestatic app/Turns.mark(I)V
    return
.end method
.end class
"#,
    )
    .unwrap();
    vm.spawn("app/Turns", "play", "(I)V", vec![Value::Int(1)]).unwrap();
    vm.spawn("app/Turns", "play", "(I)V", vec![Value::Int(2)]).unwrap();
    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.static_field("app/Turns", "trail").unwrap(), Value::Int(1212));
}

// ============================================================================
// Timers
// ============================================================================

const CLOCKS: &str = r#"
.class public app/Clock
.method public static nap()J
    invokestatic java/lang/System.currentTimeMillis()J
    lstore_0
    ldc2_w 50L
    invokestatic java/lang/Thread.sleep(J)V
    invokestatic java/lang/System.currentTimeMillis()J
    lload_0
    lsub
    lreturn
.end method

.method public static timed_wait()J
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    astore_0
    aload_0
    monitorenter
    aload_0
    ldc2_w 30L
    invokevirtual java/lang/Object.wait(J)V
    aload_0
    monitorexit
    invokestatic java/lang/System.currentTimeMillis()J
    lreturn
.end method

.method public static bad_nap()V
    ldc2_w -1L
    invokestatic java/lang/Thread.sleep(J)V
    return
.end method
.end class
"#;

#[test]
fn test_sleep_resumes_at_deadline() {
    let mut vm = vm_with(CLOCKS);
    let id = vm.spawn("app/Clock", "nap", "()J", vec![]).unwrap();
    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.turns, 2);
    assert_eq!(vm.result(id), Some(Some(Value::Long(50))));
}

#[test]
fn test_timed_wait_expires() {
    let mut vm = vm_with(CLOCKS);
    let id = vm.spawn("app/Clock", "timed_wait", "()J", vec![]).unwrap();
    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.result(id), Some(Some(Value::Long(30))));
}

#[test]
fn test_negative_sleep_throws() {
    let mut vm = vm_with(CLOCKS);
    vm.spawn("app/Clock", "bad_nap", "()V", vec![]).unwrap();
    vm.run_until_idle().unwrap();
    match vm.failures() {
        [ContextFailure::Uncaught(report)] => {
            assert_eq!(report.class_name, "java.lang.IllegalArgumentException")
        }
        other => panic!("{:?}", other),
    }
}

// ============================================================================
// Class initialization across contexts
// ============================================================================

#[test]
fn test_second_context_waits_for_initializer() {
    let mut vm = vm_with(
        r#"
.class public app/Slow
.field public static runs I
.method static <clinit>()V
    getstatic app/Slow.runs I
    iconst_1
    iadd
    putstatic app/Slow.runs I
    ldc2_w 10L
    invokestatic java/lang/Thread.sleep(J)V
    return
.end method
.end class

.class public app/Reader
.method public static read()I
    getstatic app/Slow.runs I
    ireturn
.end method
.end class
"#,
    );
    let a = vm.spawn("app/Reader", "read", "()I", vec![]).unwrap();
    let b = vm.spawn("app/Reader", "read", "()I", vec![]).unwrap();

    let mut host = PollingHost::default();
    vm.run_turn(&mut host).unwrap();
    let waiting: Vec<_> = [a, b]
        .into_iter()
        .filter(|&id| {
            matches!(
                vm.runtime().context(id).and_then(|c| c.suspend_reason.clone()),
                Some(SuspendReason::ClassInit { .. })
            )
        })
        .collect();
    assert_eq!(waiting.len(), 1);

    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.result(a), Some(Some(Value::Int(1))));
    assert_eq!(vm.result(b), Some(Some(Value::Int(1))));
}
