//! Integration tests for the bytecode interpreter
//!
//! Each test assembles a small class, runs one entry point to completion on
//! a frozen clock and checks the returned value or the uncaught report.

use cldc_engine::vm::ContextFailure;
use cldc_engine::{ContextId, ManualClock, Value, Vm, VmOptions};
use std::sync::Arc;

fn vm() -> Vm {
    Vm::with_clock(VmOptions::default(), Arc::new(ManualClock::new())).unwrap()
}

fn run(vm: &mut Vm, class: &str, name: &str, descriptor: &str, args: Vec<Value>) -> ContextId {
    let id = vm.spawn(class, name, descriptor, args).unwrap();
    vm.run_until_idle().unwrap();
    id
}

fn eval(source: &str, class: &str, name: &str, descriptor: &str, args: Vec<Value>) -> Option<Value> {
    let mut vm = vm();
    vm.load_source(source).unwrap();
    let id = run(&mut vm, class, name, descriptor, args);
    assert!(vm.failures().is_empty(), "{:?}", vm.failures());
    vm.result(id).expect("context did not finish")
}

fn uncaught(vm: &Vm) -> &cldc_engine::UncaughtException {
    match vm.failures() {
        [ContextFailure::Uncaught(report)] => report,
        other => panic!("expected one uncaught exception, got {:?}", other),
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_int_arithmetic_wraps() {
    let source = r#"
.class public app/Math
.method public static overflow()I
    ldc 2147483647
    iconst_1
    iadd
    ireturn
.end method
.method public static min_div()I
    ldc -2147483648
    iconst_m1
    idiv
    ireturn
.end method
.method public static min_rem()I
    ldc -2147483648
    iconst_m1
    irem
    ireturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Math", "overflow", "()I", vec![]), Some(Value::Int(i32::MIN)));
    assert_eq!(eval(source, "app/Math", "min_div", "()I", vec![]), Some(Value::Int(i32::MIN)));
    assert_eq!(eval(source, "app/Math", "min_rem", "()I", vec![]), Some(Value::Int(0)));
}

#[test]
fn test_shift_distance_is_masked() {
    let source = r#"
.class public app/Shift
.method public static long_shift()J
    lconst_1
    bipush 65
    lshl
    lreturn
.end method
.method public static int_shift()I
    iconst_1
    bipush 33
    ishl
    ireturn
.end method
.method public static unsigned()I
    iconst_m1
    bipush 28
    iushr
    ireturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Shift", "long_shift", "()J", vec![]), Some(Value::Long(2)));
    assert_eq!(eval(source, "app/Shift", "int_shift", "()I", vec![]), Some(Value::Int(2)));
    assert_eq!(eval(source, "app/Shift", "unsigned", "()I", vec![]), Some(Value::Int(15)));
}

#[test]
fn test_integer_division_by_zero_is_uncaught() {
    let mut vm = vm();
    vm.load_source(
        r#"
.class public app/Div
.method public static div(II)I
    iload_0
    iload_1
    idiv
    ireturn
.end method
.method public static main()I
    bipush 7
    iconst_0
    invokestatic app/Div.div(II)I
    ireturn
.end method
.end class
"#,
    )
    .unwrap();
    let id = run(&mut vm, "app/Div", "main", "()I", vec![]);
    assert_eq!(vm.result(id), None);
    assert!(!vm.is_alive(id));

    let report = uncaught(&vm);
    assert_eq!(report.context, id);
    assert_eq!(report.class_name, "java.lang.ArithmeticException");
    assert_eq!(report.message.as_deref(), Some("/ by zero"));
    let methods: Vec<&str> = report.trace.iter().map(|e| e.method.as_str()).collect();
    assert_eq!(methods, ["div", "main"]);
    assert_eq!(report.trace[0].pc, 2);
}

#[test]
fn test_long_division_by_zero_checks_divisor_only() {
    let source = r#"
.class public app/LongDiv
.method public static zero_dividend()J
    lconst_0
    ldc2_w 5L
    ldiv
    lreturn
.end method
.method public static zero_divisor()J
    ldc2_w 5L
    lconst_0
    lrem
    lreturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/LongDiv", "zero_dividend", "()J", vec![]), Some(Value::Long(0)));

    let mut vm = vm();
    vm.load_source(source).unwrap();
    run(&mut vm, "app/LongDiv", "zero_divisor", "()J", vec![]);
    assert_eq!(uncaught(&vm).class_name, "java.lang.ArithmeticException");
}

#[test]
fn test_nan_comparison_bias() {
    let source = r#"
.class public app/Nan
.method public static bias()I
    fconst_0
    fconst_0
    fdiv
    fstore_0
    fload_0
    fconst_0
    fcmpg
    fload_0
    fconst_0
    fcmpl
    isub
    ireturn
.end method
.method public static double_bias()I
    dconst_0
    dconst_0
    ddiv
    dconst_1
    dcmpl
    ireturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Nan", "bias", "()I", vec![]), Some(Value::Int(2)));
    assert_eq!(eval(source, "app/Nan", "double_bias", "()I", vec![]), Some(Value::Int(-1)));
}

#[test]
fn test_narrowing_conversions() {
    let source = r#"
.class public app/Conv
.method public static to_byte(I)I
    iload_0
    i2b
    ireturn
.end method
.method public static to_char(I)I
    iload_0
    i2c
    ireturn
.end method
.method public static truncate()I
    ldc 3.9f
    f2i
    ireturn
.end method
.method public static widen(I)J
    iload_0
    i2l
    lreturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Conv", "to_byte", "(I)I", vec![Value::Int(300)]), Some(Value::Int(44)));
    assert_eq!(eval(source, "app/Conv", "to_char", "(I)I", vec![Value::Int(-1)]), Some(Value::Int(65535)));
    assert_eq!(eval(source, "app/Conv", "truncate", "()I", vec![]), Some(Value::Int(3)));
    assert_eq!(eval(source, "app/Conv", "widen", "(I)J", vec![Value::Int(-2)]), Some(Value::Long(-2)));
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_switches() {
    let source = r#"
.class public app/Switch
.method public static dense(I)I
    iload_0
    tableswitch 1 One Two default Other
One:
    bipush 10
    ireturn
Two:
    bipush 20
    ireturn
Other:
    iconst_m1
    ireturn
.end method
.method public static sparse(I)I
    iload_0
    lookupswitch -5:Low 1000:High default:Other
Low:
    iconst_1
    ireturn
High:
    iconst_2
    ireturn
Other:
    iconst_0
    ireturn
.end method
.end class
"#;
    let dense = |n| eval(source, "app/Switch", "dense", "(I)I", vec![Value::Int(n)]);
    assert_eq!(dense(1), Some(Value::Int(10)));
    assert_eq!(dense(2), Some(Value::Int(20)));
    assert_eq!(dense(3), Some(Value::Int(-1)));
    assert_eq!(dense(0), Some(Value::Int(-1)));

    let sparse = |n| eval(source, "app/Switch", "sparse", "(I)I", vec![Value::Int(n)]);
    assert_eq!(sparse(-5), Some(Value::Int(1)));
    assert_eq!(sparse(1000), Some(Value::Int(2)));
    assert_eq!(sparse(7), Some(Value::Int(0)));
}

#[test]
fn test_counting_loop() {
    let source = r#"
.class public app/Sum
.method public static sum(I)I
    iconst_0
    istore_1
    iconst_1
    istore_2
Top:
    iload_2
    iload_0
    if_icmpgt Done
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
.end class
"#;
    assert_eq!(eval(source, "app/Sum", "sum", "(I)I", vec![Value::Int(100)]), Some(Value::Int(5050)));
}

// ============================================================================
// Objects and dispatch
// ============================================================================

const SHAPES: &str = r#"
.class public app/Shape
.method public <init>()V
    aload_0
    invokespecial java/lang/Object.<init>()V
    return
.end method
.method public area()I
    iconst_1
    ireturn
.end method
.end class

.class public app/Square
.super app/Shape
.field private side I
.method public <init>(I)V
    aload_0
    invokespecial app/Shape.<init>()V
    aload_0
    iload_1
    putfield app/Square.side I
    return
.end method
.method public area()I
    aload_0
    getfield app/Square.side I
    dup
    imul
    aload_0
    invokespecial app/Shape.area()I
    iadd
    ireturn
.end method
.end class

.class public app/Shapes
.method public static square_area()I
    new app/Square
    dup
    bipush 6
    invokespecial app/Square.<init>(I)V
    invokevirtual app/Shape.area()I
    ireturn
.end method
.method public static null_area()I
    aconst_null
    invokevirtual app/Shape.area()I
    ireturn
.end method
.method public static bad_cast()I
    new app/Shape
    dup
    invokespecial app/Shape.<init>()V
    checkcast app/Square
    pop
    iconst_0
    ireturn
.end method
.method public static is_shape()I
    new app/Square
    dup
    iconst_2
    invokespecial app/Square.<init>(I)V
    instanceof app/Shape
    aconst_null
    instanceof app/Shape
    iadd
    ireturn
.end method
.end class
"#;

#[test]
fn test_virtual_and_super_dispatch() {
    // 6 * 6 from the override plus 1 from the superclass body
    assert_eq!(eval(SHAPES, "app/Shapes", "square_area", "()I", vec![]), Some(Value::Int(37)));
    assert_eq!(eval(SHAPES, "app/Shapes", "is_shape", "()I", vec![]), Some(Value::Int(1)));
}

#[test]
fn test_null_receiver_and_bad_cast() {
    let mut vm = vm();
    vm.load_source(SHAPES).unwrap();
    run(&mut vm, "app/Shapes", "null_area", "()I", vec![]);
    assert_eq!(uncaught(&vm).class_name, "java.lang.NullPointerException");

    let mut vm = self::vm();
    vm.load_source(SHAPES).unwrap();
    run(&mut vm, "app/Shapes", "bad_cast", "()I", vec![]);
    let report = uncaught(&vm);
    assert_eq!(report.class_name, "java.lang.ClassCastException");
    assert_eq!(report.message.as_deref(), Some("app.Shape cannot be cast to app.Square"));
}

#[test]
fn test_interface_dispatch() {
    let source = r#"
.class public interface abstract app/Greeter
.method public abstract greet()I
.end method
.end class

.class public app/Loud
.implements app/Greeter
.method public <init>()V
    aload_0
    invokespecial java/lang/Object.<init>()V
    return
.end method
.method public greet()I
    bipush 99
    ireturn
.end method
.end class

.class public app/Caller
.method public static call()I
    new app/Loud
    dup
    invokespecial app/Loud.<init>()V
    invokeinterface app/Greeter.greet()I
    ireturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Caller", "call", "()I", vec![]), Some(Value::Int(99)));
}

// ============================================================================
// Arrays and strings
// ============================================================================

#[test]
fn test_array_bounds() {
    let source = r#"
.class public app/Arrays
.method public static fill()I
    iconst_3
    newarray int
    astore_0
    aload_0
    iconst_2
    bipush 42
    iastore
    aload_0
    arraylength
    aload_0
    iconst_2
    iaload
    iadd
    ireturn
.end method
.method public static overrun()V
    iconst_3
    newarray int
    iconst_5
    iconst_1
    iastore
    return
.end method
.method public static negative()V
    iconst_m1
    anewarray java/lang/String
    pop
    return
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Arrays", "fill", "()I", vec![]), Some(Value::Int(45)));

    let mut vm = vm();
    vm.load_source(source).unwrap();
    run(&mut vm, "app/Arrays", "overrun", "()V", vec![]);
    let report = uncaught(&vm);
    assert_eq!(report.class_name, "java.lang.ArrayIndexOutOfBoundsException");
    assert_eq!(report.message.as_deref(), Some("5"));

    let mut vm = self::vm();
    vm.load_source(source).unwrap();
    run(&mut vm, "app/Arrays", "negative", "()V", vec![]);
    assert_eq!(uncaught(&vm).class_name, "java.lang.NegativeArraySizeException");
}

#[test]
fn test_reference_array_store_checks_element_type() {
    let source = r#"
.class public app/Point
.method public <init>()V
    aload_0
    invokespecial java/lang/Object.<init>()V
    return
.end method
.end class

.class public app/Store
.method public static widen()I
    iconst_1
    anewarray java/lang/Object
    astore_0
    aload_0
    iconst_0
    new app/Point
    dup
    invokespecial app/Point.<init>()V
    aastore
    aload_0
    iconst_0
    aaload
    instanceof app/Point
    ireturn
.end method
.method public static narrow()V
    iconst_1
    anewarray app/Point
    iconst_0
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    aastore
    return
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Store", "widen", "()I", vec![]), Some(Value::Int(1)));

    let mut vm = vm();
    vm.load_source(source).unwrap();
    run(&mut vm, "app/Store", "narrow", "()V", vec![]);
    let report = uncaught(&vm);
    assert_eq!(report.class_name, "java.lang.ArrayStoreException");
    assert_eq!(report.message.as_deref(), Some("java.lang.Object"));
}

#[test]
fn test_array_past_heap_limit_throws_out_of_memory() {
    let source = r#"
.class public app/Hog
.method public static huge()V
    ldc 2147483647
    newarray long
    pop
    return
.end method
.method public static recover()I
Start:
    sipush 300
    newarray int
    pop
    iconst_0
    ireturn
End:
Handler:
    pop
    bipush 16
    newarray int
    arraylength
    ireturn
.catch java/lang/OutOfMemoryError from Start to End using Handler
.end method
.end class
"#;
    let mut vm = vm();
    vm.load_source(source).unwrap();
    run(&mut vm, "app/Hog", "huge", "()V", vec![]);
    assert_eq!(uncaught(&vm).class_name, "java.lang.OutOfMemoryError");

    let options = VmOptions {
        heap_limit_bytes: 1024,
        ..VmOptions::default()
    };
    let mut vm = Vm::with_clock(options, Arc::new(ManualClock::new())).unwrap();
    vm.load_source(source).unwrap();
    let id = run(&mut vm, "app/Hog", "recover", "()I", vec![]);
    assert!(vm.failures().is_empty(), "{:?}", vm.failures());
    assert_eq!(vm.result(id), Some(Some(Value::Int(16))));
}

#[test]
fn test_string_concat_to_console() {
    let mut vm = vm();
    vm.load_source(
        r#"
.class public app/Hello
.method public static main()V
    ldc "hello, "
    ldc "world"
    invokevirtual java/lang/String.concat(Ljava/lang/String;)Ljava/lang/String;
    invokestatic com/sun/cldchi/io/ConsoleOutputStream.println(Ljava/lang/String;)V
    bipush 42
    invokestatic com/sun/cldchi/io/ConsoleOutputStream.println(I)V
    return
.end method
.end class
"#,
    )
    .unwrap();
    vm.run_main("app/Hello").unwrap();
    let report = vm.run_until_idle().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(vm.console_output(), "hello, world\n42\n");
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_first_matching_handler_wins() {
    let template = r#"
.class public app/Catch
.method public static main()I
Start:
    iconst_1
    iconst_0
    idiv
    ireturn
End:
Runtime:
    pop
    iconst_1
    ireturn
Any:
    pop
    iconst_2
    ireturn
FIRST
SECOND
.end method
.end class
"#;
    let runtime = ".catch java/lang/RuntimeException from Start to End using Runtime";
    let any = ".catch java/lang/Throwable from Start to End using Any";

    let narrow_first = template.replace("FIRST", runtime).replace("SECOND", any);
    assert_eq!(eval(&narrow_first, "app/Catch", "main", "()I", vec![]), Some(Value::Int(1)));

    let broad_first = template.replace("FIRST", any).replace("SECOND", runtime);
    assert_eq!(eval(&broad_first, "app/Catch", "main", "()I", vec![]), Some(Value::Int(2)));
}

#[test]
fn test_exception_unwinds_to_caller_handler() {
    let source = r#"
.class public app/Unwind
.method public static fail()V
    new java/lang/IllegalArgumentException
    dup
    ldc "bad input"
    invokespecial java/lang/IllegalArgumentException.<init>(Ljava/lang/String;)V
    athrow
.end method
.method public static middle()V
    invokestatic app/Unwind.fail()V
    return
.end method
.method public static main()I
Start:
    invokestatic app/Unwind.middle()V
    iconst_0
    ireturn
End:
Handler:
    invokevirtual java/lang/Throwable.getMessage()Ljava/lang/String;
    invokevirtual java/lang/String.length()I
    ireturn
.catch java/lang/IllegalArgumentException from Start to End using Handler
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Unwind", "main", "()I", vec![]), Some(Value::Int(9)));
}

#[test]
fn test_catch_all_and_rethrow() {
    let mut vm = vm();
    vm.load_source(
        r#"
.class public app/Rethrow
.field public static cleaned I
.method public static main()V
Start:
    aconst_null
    athrow
End:
Finally:
    iconst_1
    putstatic app/Rethrow.cleaned I
    athrow
.catch all from Start to End using Finally
.end method
.end class
"#,
    )
    .unwrap();
    run(&mut vm, "app/Rethrow", "main", "()V", vec![]);
    assert_eq!(uncaught(&vm).class_name, "java.lang.NullPointerException");
    assert_eq!(vm.static_field("app/Rethrow", "cleaned").unwrap(), Value::Int(1));
}

// ============================================================================
// Class initialization
// ============================================================================

#[test]
fn test_entry_point_initializes_its_class() {
    let source = r#"
.class public app/Boot
.field public static ready I
.method static <clinit>()V
    bipush 11
    putstatic app/Boot.ready I
    return
.end method
.method public static main()I
    getstatic app/Boot.ready I
    ireturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Boot", "main", "()I", vec![]), Some(Value::Int(11)));
}

#[test]
fn test_superclass_initializes_first() {
    let source = r#"
.class public app/Base
.field public static order I
.method static <clinit>()V
    iconst_1
    putstatic app/Base.order I
    return
.end method
.end class

.class public app/Derived
.super app/Base
.field public static seen I
.method static <clinit>()V
    getstatic app/Base.order I
    putstatic app/Derived.seen I
    return
.end method
.end class

.class public app/Probe
.method public static main()I
    getstatic app/Derived.seen I
    ireturn
.end method
.end class
"#;
    assert_eq!(eval(source, "app/Probe", "main", "()I", vec![]), Some(Value::Int(1)));
}

#[test]
fn test_failed_initializer_poisons_class() {
    let mut vm = vm();
    vm.load_source(
        r#"
.class public app/Broken
.field public static value I
.method static <clinit>()V
    iconst_1
    iconst_0
    idiv
    putstatic app/Broken.value I
    return
.end method
.end class

.class public app/User
.method public static first()I
    getstatic app/Broken.value I
    ireturn
.end method
.method public static second()I
Start:
    getstatic app/Broken.value I
    ireturn
End:
Handler:
    pop
    iconst_m1
    ireturn
.catch java/lang/NoClassDefFoundError from Start to End using Handler
.end method
.end class
"#,
    )
    .unwrap();

    run(&mut vm, "app/User", "first", "()I", vec![]);
    let report = uncaught(&vm);
    assert_eq!(report.class_name, "java.lang.ArithmeticException");
    assert_eq!(report.trace[0].method, "<clinit>");

    let second = run(&mut vm, "app/User", "second", "()I", vec![]);
    assert_eq!(vm.result(second), Some(Some(Value::Int(-1))));
}

#[test]
fn test_frames_are_recycled() {
    let source = r#"
.class public app/Deep
.method public static down(I)I
    iload_0
    ifle Bottom
    iload_0
    iconst_1
    isub
    invokestatic app/Deep.down(I)I
    iconst_1
    iadd
    ireturn
Bottom:
    iconst_0
    ireturn
.end method
.method public static main()I
    bipush 20
    invokestatic app/Deep.down(I)I
    pop
    bipush 20
    invokestatic app/Deep.down(I)I
    ireturn
.end method
.end class
"#;
    let mut vm = vm();
    vm.load_source(source).unwrap();
    let id = run(&mut vm, "app/Deep", "main", "()I", vec![]);
    assert_eq!(vm.result(id), Some(Some(Value::Int(20))));

    let (created, reused) = vm.runtime().frame_pool.counts();
    // the second descent runs entirely on frames freed by the first
    assert!(reused >= 21, "created {} reused {}", created, reused);
    assert!(created <= 23, "created {} reused {}", created, reused);
}
