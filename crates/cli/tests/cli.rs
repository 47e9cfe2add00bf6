//! Black-box tests against the built `evilcandy` binary: the exact
//! stdout/stderr/exit-code contracts of the command-line surface.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn evilcandy() -> Command {
    Command::new(env!("CARGO_BIN_EXE_evilcandy"))
}

fn run_script(source: &str) -> Output {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.evc");
    std::fs::write(&path, source).unwrap();
    evilcandy().arg(&path).output().unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn test_arithmetic_mix() {
    let out = run_script("print(1 + 2 * 3);");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "7\n");
}

#[test]
fn test_closure() {
    let out = run_script(
        "function mk(n) { return ``(x) n + x; }\n\
         let f = mk(10);\n\
         print(f(5));\n",
    );
    assert!(out.status.success());
    assert_eq!(stdout(&out), "15\n");
}

#[test]
fn test_dict_lock_scenario() {
    let out = run_script(
        "let d = {'a':1, 'b':2};\n\
         try { d.foreach(``(v,k) d['c']=3); } catch (e) { print('locked'); }\n",
    );
    assert!(out.status.success());
    assert_eq!(stdout(&out), "locked\n");
}

#[test]
fn test_recursion_limit_exit_code() {
    let out = run_script("function f() { return f(); } f();");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("RecursionError"));
}

#[test]
fn test_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("a.evc"),
        "let x = 41; function get() { return x + 1; }",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("main.evc"),
        "let m = import('a.evc', 'x'); print(m.get());",
    )
    .unwrap();
    let out = evilcandy().arg(dir.path().join("main.evc")).output().unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "42\n");
}

#[test]
fn test_slice_print() {
    let out = run_script("print([10,20,30,40][1:3]);");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "[20, 30]\n");
}

#[test]
fn test_syntax_error_exit_code() {
    let out = run_script("let = ;");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("SyntaxError"));
}

#[test]
fn test_stdin_execution() {
    let mut child = evilcandy()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(b"print('from stdin');")
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    assert_eq!(stdout(&out), "from stdin\n");
}

#[test]
fn test_disassemble_only_does_not_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("main.evc");
    let listing = dir.path().join("out.asm");
    std::fs::write(&script, "print('side effect');").unwrap();
    let out = evilcandy()
        .arg("-D")
        .arg(&listing)
        .arg(&script)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(stdout(&out), "");
    let text = std::fs::read_to_string(&listing).unwrap();
    assert!(text.contains(".start <"));
    assert!(text.contains(".define"));
    assert!(text.contains(".end"));
}

#[test]
fn test_disassemble_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("main.evc");
    let listing = dir.path().join("out.asm");
    std::fs::write(&script, "print(2 + 2);").unwrap();
    let out = evilcandy()
        .arg("-d")
        .arg(&listing)
        .arg(&script)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(stdout(&out), "4\n");
    assert!(std::fs::read_to_string(&listing).unwrap().contains(".rodata"));
}

#[test]
fn test_uncaught_error_prints_traceback() {
    let out = run_script(
        "function inner() { return [][7]; }\n\
         function outer() { return inner(); }\n\
         outer();\n",
    );
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("IndexError"));
    assert!(err.contains("main.evc"));
}

#[test]
fn test_sys_argv() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("main.evc");
    std::fs::write(&script, "print(sys.argv[1], sys.argv[2]);").unwrap();
    let out = evilcandy()
        .arg(&script)
        .arg("alpha")
        .arg("beta")
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "alpha beta\n");
}
