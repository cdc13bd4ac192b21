use cldc_engine::{ManualClock, Value, Vm, VmOptions};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

const PROGRAMS: &str = r#"
.class public bench/Loops
.field public static lock Ljava/lang/Object;

.method static <clinit>()V
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    putstatic bench/Loops.lock Ljava/lang/Object;
    return
.end method

.method public static sum(I)I
    iconst_0
    istore_1
    iconst_0
    istore_2
Top:
    iload_2
    iload_0
    if_icmpge Done
    iload_1
    iload_2
    iadd
    istore_1
    iinc 2 1
    goto Top
Done:
    iload_1
    ireturn
.end method

.method public static fib(I)I
    iload_0
    iconst_2
    if_icmpge Recurse
    iload_0
    ireturn
Recurse:
    iload_0
    iconst_1
    isub
    invokestatic bench/Loops.fib(I)I
    iload_0
    iconst_2
    isub
    invokestatic bench/Loops.fib(I)I
    iadd
    ireturn
.end method

.method public static locked(I)I
    iconst_0
    istore_1
Top:
    iload_1
    iload_0
    if_icmpge Done
    getstatic bench/Loops.lock Ljava/lang/Object;
    monitorenter
    getstatic bench/Loops.lock Ljava/lang/Object;
    monitorexit
    iinc 1 1
    goto Top
Done:
    iload_1
    ireturn
.end method
.end class
"#;

fn run(method: &str, n: i32) -> Option<Value> {
    let mut vm = Vm::with_clock(VmOptions::default(), Arc::new(ManualClock::new())).unwrap();
    vm.load_source(PROGRAMS).unwrap();
    let id = vm.spawn("bench/Loops", method, "(I)I", vec![Value::Int(n)]).unwrap();
    vm.run_until_idle().unwrap();
    vm.result(id).flatten()
}

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");
    for n in [1_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("sum", n), &n, |b, &n| {
            b.iter(|| run("sum", black_box(n)));
        });
    }
    group.finish();
}

fn bench_calls(c: &mut Criterion) {
    c.bench_function("fib_20", |b| {
        b.iter(|| run("fib", black_box(20)));
    });
}

fn bench_monitors(c: &mut Criterion) {
    c.bench_function("uncontended_monitor_10k", |b| {
        b.iter(|| run("locked", black_box(10_000)));
    });
}

fn bench_assemble(c: &mut Criterion) {
    c.bench_function("assemble_programs", |b| {
        b.iter(|| cldc_engine::assemble(black_box(PROGRAMS)).unwrap());
    });
}

criterion_group!(benches, bench_loops, bench_calls, bench_monitors, bench_assemble);
criterion_main!(benches);
