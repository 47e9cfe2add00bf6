//! End-to-end language scenarios: source text in, observable state out.
//!
//! Results are read back through the persistent top-level scope rather
//! than stdout; the CLI crate covers the printed forms.

use std::io::Write;

use evilcandy_core::{ErrorClass, EvcError, Str, Value};
use evilcandy_runtime::Interp;

fn run(src: &str) -> (Interp, Result<Value, EvcError>) {
    let mut interp = Interp::new();
    let source = Str::from_str(src);
    let result = interp.run_source(&source, "<test>");
    (interp, result)
}

fn global(interp: &mut Interp, name: &str) -> Value {
    let source = Str::from_str(&format!("return {name};"));
    interp
        .run_source(&source, "<peek>")
        .unwrap_or_else(|e| panic!("reading {name}: {e}"))
}

fn run_ok(src: &str) -> Interp {
    let (interp, result) = run(src);
    result.unwrap_or_else(|e| panic!("script failed: {e}"));
    interp
}

#[test]
fn test_arithmetic_mix() {
    let mut interp = run_ok("let r = 1 + 2 * 3;");
    assert_eq!(global(&mut interp, "r"), Value::Int(7));
}

#[test]
fn test_numeric_tower() {
    let mut interp = run_ok(
        "let a = 1 + 0.5;\
         let b = 7 / 2;\
         let c = 2 ** 10;\
         let d = 7 % 0;",
    );
    assert_eq!(global(&mut interp, "a"), Value::Float(1.5));
    assert_eq!(global(&mut interp, "b"), Value::Int(3));
    assert_eq!(global(&mut interp, "c"), Value::Int(1024));
    // Integer modulo by zero keeps the documented legacy answer.
    assert_eq!(global(&mut interp, "d"), Value::Int(0));
}

#[test]
fn test_closure() {
    let mut interp = run_ok(
        "function mk(n) { return ``(x) n + x; }\
         let f = mk(10);\
         let r = f(5);",
    );
    assert_eq!(global(&mut interp, "r"), Value::Int(15));
}

#[test]
fn test_closures_capture_by_value() {
    let mut interp = run_ok(
        "function mk(n) { let g = ``(x) n + x; n = 100; return g; }\
         let r = mk(10)(5);",
    );
    // The cell holds the value at literal-evaluation time.
    assert_eq!(global(&mut interp, "r"), Value::Int(15));
}

#[test]
fn test_dict_iteration_mutation_locked() {
    let mut interp = run_ok(
        "let d = {'a': 1, 'b': 2};\
         let caught = '';\
         try { d.foreach(``(v, k) d['c'] = 3); } catch (e) { caught = e.name; }",
    );
    assert_eq!(global(&mut interp, "caught"), Value::str("RuntimeError"));
    // The lock is released afterwards.
    let mut interp2 = run_ok(
        "let d = {'a': 1};\
         try { d.foreach(``(v, k) d['c'] = 3); } catch (e) { ; }\
         d['x'] = 9;\
         let n = len(d);",
    );
    assert_eq!(global(&mut interp2, "n"), Value::Int(2));
}

#[test]
fn test_recursion_limit() {
    let (_interp, result) = run("function f() { return f(); } f();");
    let err = result.unwrap_err();
    assert_eq!(err.class, ErrorClass::Recursion);
}

#[test]
fn test_slice() {
    let mut interp = run_ok("let r = [10, 20, 30, 40][1:3];");
    assert_eq!(global(&mut interp, "r").repr().unwrap(), "[20, 30]");
    let mut interp = run_ok("let r = 'abcdef'[::2];");
    assert_eq!(global(&mut interp, "r"), Value::str("ace"));
    let mut interp = run_ok("let r = [1, 2, 3][::-1];");
    assert_eq!(global(&mut interp, "r").repr().unwrap(), "[3, 2, 1]");
}

#[test]
fn test_negative_index() {
    let mut interp = run_ok("let r = [10, 20, 30][-1];");
    assert_eq!(global(&mut interp, "r"), Value::Int(30));
    let (_interp, result) = run("let r = [10, 20, 30][3];");
    assert_eq!(result.unwrap_err().class, ErrorClass::Index);
}

#[test]
fn test_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let module_path = dir.path().join("a.evc");
    let mut f = std::fs::File::create(&module_path).unwrap();
    writeln!(f, "let x = 41; function get() {{ return x + 1; }}").unwrap();
    drop(f);

    let main = format!(
        "let m = import('{}', 'x'); let r = m.get();",
        module_path.display()
    );
    let mut interp = run_ok(&main);
    assert_eq!(global(&mut interp, "r"), Value::Int(42));
}

#[test]
fn test_import_relative_and_private() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("lib.evc"),
        "private let secret = 13; let shown = 2 * secret;",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("main.evc"),
        "let m = import('lib.evc', 'x');\
         let shown = m.shown;\
         let hidden = m.hasattr('secret');",
    )
    .unwrap();

    let mut interp = Interp::new();
    interp.run_file(&dir.path().join("main.evc")).unwrap();
    assert_eq!(global(&mut interp, "shown"), Value::Int(26));
    assert_eq!(global(&mut interp, "hidden"), Value::Int(0));
}

#[test]
#[serial_test::serial]
fn test_import_via_env_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("envmod.evc"), "let marker = 77;").unwrap();
    unsafe {
        std::env::set_var("EVILCANDY_PATH", dir.path());
    }
    let (mut interp, result) = run("let m = import('envmod.evc', 'x'); let v = m.marker;");
    unsafe {
        std::env::remove_var("EVILCANDY_PATH");
    }
    result.unwrap();
    assert_eq!(global(&mut interp, "v"), Value::Int(77));
}

#[test]
fn test_import_cycle_detected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.evc"), "let m = import('y.evc', 'x');").unwrap();
    std::fs::write(dir.path().join("y.evc"), "let m = import('x.evc', 'x');").unwrap();

    let mut interp = Interp::new();
    let err = interp.run_file(&dir.path().join("x.evc")).unwrap_err();
    assert_eq!(err.class, ErrorClass::Runtime);
    assert!(err.message.contains("circular import"));
}

#[test]
fn test_import_mode_r_is_deferred() {
    let dir = tempfile::tempdir().unwrap();
    let module_path = dir.path().join("side.evc");
    std::fs::write(&module_path, "let x = 5;").unwrap();
    let main = format!(
        "let f = import('{}', 'r'); let t = typeof(f);",
        module_path.display()
    );
    let mut interp = run_ok(&main);
    assert_eq!(global(&mut interp, "t"), Value::str("function"));
}

#[test]
fn test_control_flow() {
    let mut interp = run_ok(
        "let total = 0;\
         for (let i = 0; i < 10; i++) {\
             if (i == 5) { continue; }\
             if (i == 8) { break; }\
             total += i;\
         }",
    );
    // 0+1+2+3+4+6+7
    assert_eq!(global(&mut interp, "total"), Value::Int(23));
}

#[test]
fn test_while_and_do_while() {
    let mut interp = run_ok(
        "let n = 0; while (n < 4) { n += 1; }\
         let m = 0; do { m += 1; } while (false);",
    );
    assert_eq!(global(&mut interp, "n"), Value::Int(4));
    assert_eq!(global(&mut interp, "m"), Value::Int(1));
}

#[test]
fn test_try_catch_finally_order() {
    let mut interp = run_ok(
        "let log = [];\
         try {\
             log.append('try');\
             [][1];\
             log.append('unreached');\
         } catch (e) {\
             log.append(e.name);\
         } finally {\
             log.append('finally');\
         }",
    );
    assert_eq!(
        global(&mut interp, "log").repr().unwrap(),
        "['try', 'IndexError', 'finally']"
    );
}

#[test]
fn test_uncaught_error_propagates() {
    let (_interp, result) = run("let x = {}; x.missing;");
    assert_eq!(result.unwrap_err().class, ErrorClass::Key);
}

#[test]
fn test_star_spread_and_kwargs() {
    let mut interp = run_ok(
        "function f(a, b, c=100, **kw) { return [a, b, c, kw.len()]; }\
         let r1 = f(*[1, 2]);\
         let r2 = f(1, 2, c=3, extra=4);",
    );
    assert_eq!(
        global(&mut interp, "r1").repr().unwrap(),
        "[1, 2, 100, 0]"
    );
    assert_eq!(global(&mut interp, "r2").repr().unwrap(), "[1, 2, 3, 1]");
}

#[test]
fn test_default_argument_evaluated_at_definition() {
    let mut interp = run_ok(
        "let base = 7;\
         function f(x=base + 1) { return x; }\
         base = 100;\
         let r = f();",
    );
    assert_eq!(global(&mut interp, "r"), Value::Int(8));
}

#[test]
fn test_missing_argument_raises() {
    let (_interp, result) = run("function f(a, b) { return a; } f(1);");
    assert_eq!(result.unwrap_err().class, ErrorClass::Argument);
}

#[test]
fn test_unknown_keyword_raises() {
    let (_interp, result) = run("function f(a) { return a; } f(1, zzz=2);");
    assert_eq!(result.unwrap_err().class, ErrorClass::Argument);
}

#[test]
fn test_string_methods() {
    let mut interp = run_ok(
        "let a = ' pad '.strip();\
         let b = 'abc'.toupper();\
         let c = '7'.zfill(3);\
         let d = ', '.join(['x', 'y']);\
         let e = '{} and {name}'.format(1, name='two');",
    );
    assert_eq!(global(&mut interp, "a"), Value::str("pad"));
    assert_eq!(global(&mut interp, "b"), Value::str("ABC"));
    assert_eq!(global(&mut interp, "c"), Value::str("007"));
    assert_eq!(global(&mut interp, "d"), Value::str("x, y"));
    assert_eq!(global(&mut interp, "e"), Value::str("1 and two"));
}

#[test]
fn test_unicode_length_and_index() {
    let mut interp = run_ok(
        "let s = 'caf\u{e9}\u{20ac}';\
         let n = len(s);\
         let last = s[-1];",
    );
    assert_eq!(global(&mut interp, "n"), Value::Int(5));
    assert_eq!(global(&mut interp, "last"), Value::str("\u{20ac}"));
}

#[test]
fn test_list_and_dict_methods() {
    let mut interp = run_ok(
        "let l = [3, 1, 2];\
         l.sort();\
         l.append(9);\
         let d = {'a': 1, 'b': 2};\
         let ks = d.keys();\
         let seen = [];\
         d.foreach(``(v, k) seen.append(k + '=' + str(v)));",
    );
    assert_eq!(global(&mut interp, "l").repr().unwrap(), "[1, 2, 3, 9]");
    assert_eq!(global(&mut interp, "ks").repr().unwrap(), "['a', 'b']");
    assert_eq!(
        global(&mut interp, "seen").repr().unwrap(),
        "['a=1', 'b=2']"
    );
}

#[test]
fn test_range_builtin() {
    let mut interp = run_ok(
        "let r = range(1, 8, 2);\
         let l = r.tolist();\
         let n = len(r);\
         let s = r.start;",
    );
    assert_eq!(global(&mut interp, "l").repr().unwrap(), "[1, 3, 5, 7]");
    assert_eq!(global(&mut interp, "n"), Value::Int(4));
    assert_eq!(global(&mut interp, "s"), Value::Int(1));
}

#[test]
fn test_setitem_null_deletes_dict_entry() {
    let mut interp = run_ok(
        "let d = {'a': 1, 'b': 2};\
         d['a'] = null;\
         let n = len(d);\
         let has = d.hasattr('a');",
    );
    assert_eq!(global(&mut interp, "n"), Value::Int(1));
    assert_eq!(global(&mut interp, "has"), Value::Int(0));
}

#[test]
fn test_this_binding_in_method_call() {
    let mut interp = run_ok(
        "let obj = {'val': 10};\
         obj['get'] = function() { return this.val; };\
         let r = obj.get();",
    );
    assert_eq!(global(&mut interp, "r"), Value::Int(10));
}

#[test]
fn test_json_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    std::fs::write(&path, r#"{"name": "evil", "nums": [1, 2, 3]}"#).unwrap();
    let src = format!(
        "let d = dict_from_json('{}'); let name = d.name; let n = len(d.nums);",
        path.display()
    );
    let mut interp = run_ok(&src);
    assert_eq!(global(&mut interp, "name"), Value::str("evil"));
    assert_eq!(global(&mut interp, "n"), Value::Int(3));
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let src = format!(
        "let f = open('{p}', 'w');\
         f.writeline('hello');\
         f.close();\
         let g = open('{p}', 'r');\
         let line = g.readline();\
         g.close();",
        p = path.display()
    );
    let mut interp = run_ok(&src);
    assert_eq!(global(&mut interp, "line"), Value::str("hello\n"));
}

#[test]
fn test_bytes_literals_and_methods() {
    let mut interp = run_ok(
        "let b = b'ab\\x01';\
         let n = len(b);\
         let h = b.hex();\
         let first = b[0];",
    );
    assert_eq!(global(&mut interp, "n"), Value::Int(3));
    assert_eq!(global(&mut interp, "h"), Value::str("616201"));
    assert_eq!(global(&mut interp, "first"), Value::Int(97));
}

#[test]
fn test_logical_operators_short_circuit() {
    let mut interp = run_ok(
        "let calls = [];\
         function t() { calls.append('t'); return 1; }\
         function f() { calls.append('f'); return 0; }\
         let a = f() && t();\
         let b = t() || f();",
    );
    assert_eq!(global(&mut interp, "a"), Value::Int(0));
    assert_eq!(global(&mut interp, "b"), Value::Int(1));
    assert_eq!(
        global(&mut interp, "calls").repr().unwrap(),
        "['f', 't']"
    );
}

#[test]
fn test_math_and_builtins() {
    let mut interp = run_ok(
        "let a = math.sqrt(9.0);\
         let b = abs(-4);\
         let c = min([3, 1, 2]);\
         let d = max(3, 1, 2);\
         let e = int('0x10');",
    );
    assert_eq!(global(&mut interp, "a"), Value::Float(3.0));
    assert_eq!(global(&mut interp, "b"), Value::Int(4));
    assert_eq!(global(&mut interp, "c"), Value::Int(1));
    assert_eq!(global(&mut interp, "d"), Value::Int(3));
    assert_eq!(global(&mut interp, "e"), Value::Int(16));
}

#[test]
fn test_tuples() {
    let mut interp = run_ok(
        "let t = (1, 'two', 3.0);\
         let one = (9,);\
         let n = len(t);\
         let second = t[1];",
    );
    assert_eq!(global(&mut interp, "n"), Value::Int(3));
    assert_eq!(global(&mut interp, "second"), Value::str("two"));
    assert_eq!(global(&mut interp, "one").repr().unwrap(), "(9,)");
}

#[test]
fn test_property_get_and_readonly_set() {
    let mut interp = run_ok(
        "let obj = {'x': 21};\
         obj['twice'] = property(function() { return this.x * 2; });\
         let r = obj.twice;\
         let failed = '';\
         try { obj.twice = 5; } catch (e) { failed = e.name; }",
    );
    assert_eq!(global(&mut interp, "r"), Value::Int(42));
    assert_eq!(global(&mut interp, "failed"), Value::str("RuntimeError"));
}

#[test]
fn test_property_setter_runs() {
    let mut interp = run_ok(
        "let obj = {'raw': 0};\
         obj['scaled'] = property(\
             function() { return this.raw * 10; },\
             function(v) { this.raw = v / 10; });\
         obj.scaled = 100;\
         let raw = obj.raw;\
         let scaled = obj.scaled;",
    );
    assert_eq!(global(&mut interp, "raw"), Value::Int(10));
    assert_eq!(global(&mut interp, "scaled"), Value::Int(100));
}

#[test]
fn test_uuid_builtin() {
    let mut interp = run_ok("let u = uuid(); let t = typeof(u);");
    assert_eq!(global(&mut interp, "t"), Value::str("uuid"));
}

#[test]
fn test_value_stack_isolated_between_statements() {
    // A handler that fires mid-expression must not corrupt the stack
    // for the statements that follow.
    let mut interp = run_ok(
        "let r = 0;\
         try { r = 1 + [][5]; } catch (e) { r = 2; }\
         let after = 40 + 2;",
    );
    assert_eq!(global(&mut interp, "r"), Value::Int(2));
    assert_eq!(global(&mut interp, "after"), Value::Int(42));
}
