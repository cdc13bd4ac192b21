//! Integration tests for the `cldc` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn cldc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cldc"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to launch cldc")
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

const HELLO: &str = r#"
.class public app/Hello
.method public static main([Ljava/lang/String;)V
    ldc "hello"
    invokestatic com/sun/cldchi/io/ConsoleOutputStream.println(Ljava/lang/String;)V
    return
.end method
.end class
"#;

const CRASH: &str = r#"
.class public app/Crash
.method public static main()V
    iconst_1
    iconst_0
    idiv
    pop
    return
.end method
.end class
"#;

const STUCK: &str = r#"
.class public app/Stuck
.method public static main()V
    new java/lang/Object
    dup
    invokespecial java/lang/Object.<init>()V
    dup
    monitorenter
    invokevirtual java/lang/Object.wait()V
    return
.end method
.end class
"#;

#[test]
fn test_run_prints_console_output() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "hello.jasm", HELLO);
    let out = cldc(&["run", file.to_str().unwrap(), "--main", "app.Hello"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hello\n");
}

#[test]
fn test_uncaught_exception_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "crash.jasm", CRASH);
    let out = cldc(&["run", file.to_str().unwrap(), "--main", "app/Crash"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("java.lang.ArithmeticException: / by zero"), "{}", stderr);
    assert!(stderr.contains(" - app.Crash.main()V, pc=2"), "{}", stderr);
}

#[test]
fn test_deadlock_exits_with_distinct_status() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "stuck.jasm", STUCK);
    let out = cldc(&["run", file.to_str().unwrap(), "--main", "app/Stuck"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_run_with_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "hello.jasm", HELLO);
    let config = write(dir.path(), "cldc.toml", "[vm]\npolicy = \"round-robin\"\nquantum_ms = 2\n");
    let out = cldc(&[
        "run",
        file.to_str().unwrap(),
        "--main",
        "app/Hello",
        "--config",
        config.to_str().unwrap(),
        "--window-ms",
        "5",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn test_missing_main_class_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "hello.jasm", HELLO);
    let out = cldc(&["run", file.to_str().unwrap(), "--main", "app/Nope"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("cannot run main class app/Nope"));
}

#[test]
fn test_check_lists_classes() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "hello.jasm", HELLO);
    let out = cldc(&["check", file.to_str().unwrap()]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("class app/Hello extends java/lang/Object\n"), "{}", stdout);
    assert!(stdout.contains("static main([Ljava/lang/String;)V"), "{}", stdout);
}

#[test]
fn test_check_reports_assembly_errors() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "bad.jasm", ".class public app/Bad\n.method public static f()V\n    frobnicate\n.end method\n.end class\n");
    let out = cldc(&["check", file.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("failed to assemble"), "{}", stderr);
    assert!(stderr.contains("line 3"), "{}", stderr);
}
