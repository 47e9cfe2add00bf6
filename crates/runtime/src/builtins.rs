//! Global builtin functions plus the `math` and `sys` namespaces.

use std::rc::Rc;

use evilcandy_core::arith::{self, Complex};
use evilcandy_core::dict::Dict;
use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::file::{FileData, Handle, ModeFlags};
use evilcandy_core::numparse;
use evilcandy_core::strings::Str;
use evilcandy_core::value::{var_compare, Range, Value};

use crate::vm::{NativeArgs, Vm};

pub fn install(vm: &mut Vm) {
    let builtins: &[(&'static str, usize, usize, crate::vm::NativeFn)] = &[
        ("print", 0, usize::MAX, bi_print),
        ("typeof", 1, 1, bi_typeof),
        ("len", 1, 1, bi_len),
        ("int", 1, 1, bi_int),
        ("float", 1, 1, bi_float),
        ("str", 1, 1, bi_str),
        ("complex", 1, 2, bi_complex),
        ("range", 1, 3, bi_range),
        ("abs", 1, 1, bi_abs),
        ("min", 1, usize::MAX, bi_min),
        ("max", 1, usize::MAX, bi_max),
        ("any", 1, 1, bi_any),
        ("all", 1, 1, bi_all),
        ("open", 1, 2, bi_open),
        ("property", 1, 2, bi_property),
        ("uuid", 0, 0, bi_uuid),
        ("exit", 0, 1, bi_exit),
        ("import", 1, 2, crate::import::bi_import),
        ("dict_from_json", 1, 1, crate::json::bi_dict_from_json),
    ];
    for &(name, min, max, func) in builtins {
        let f = vm.native(name, min, max, func);
        vm.define_builtin(name, f);
    }
    install_math(vm);
    install_sys(vm);
}

fn key(name: &str) -> Rc<Str> {
    Rc::new(Str::from_str(name))
}

fn install_math(vm: &mut Vm) {
    let mut d = Dict::new();
    let entries: &[(&'static str, crate::vm::NativeFn)] = &[
        ("pow", math_pow),
        ("sqrt", math_sqrt),
        ("log", math_log),
        ("exp", math_exp),
        ("sin", math_sin),
        ("cos", math_cos),
        ("tan", math_tan),
        ("floor", math_floor),
        ("ceil", math_ceil),
    ];
    for &(name, func) in entries {
        let arity = if name == "pow" { 2 } else { 1 };
        let f = vm.native(name, arity, arity, func);
        let _ = d.insert(key(name), f);
    }
    let _ = d.insert(key("pi"), Value::Float(std::f64::consts::PI));
    let _ = d.insert(key("e"), Value::Float(std::f64::consts::E));
    vm.define_builtin("math", Value::dict(d));
}

fn install_sys(vm: &mut Vm) {
    let mut d = Dict::new();
    let _ = d.insert(key("import_path"), Value::list(Vec::new()));
    let _ = d.insert(key("breadcrumbs"), Value::list(Vec::new()));
    let _ = d.insert(key("argv"), Value::list(Vec::new()));
    let _ = d.insert(
        key("stdin"),
        Value::File(Rc::new(std::cell::RefCell::new(FileData::stdio(
            Handle::Stdin,
            "<stdin>",
        )))),
    );
    let _ = d.insert(
        key("stdout"),
        Value::File(Rc::new(std::cell::RefCell::new(FileData::stdio(
            Handle::Stdout,
            "<stdout>",
        )))),
    );
    let _ = d.insert(
        key("stderr"),
        Value::File(Rc::new(std::cell::RefCell::new(FileData::stdio(
            Handle::Stderr,
            "<stderr>",
        )))),
    );
    let sys = Rc::new(std::cell::RefCell::new(d));
    vm.sys = sys.clone();
    vm.define_builtin("sys", Value::Dict(sys));
}

// ---- conversions ----

fn want_f64(v: &Value, what: &str) -> Result<f64, EvcError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(EvcError::type_err(format!(
            "{what} expects a number, not {}",
            other.type_name()
        ))),
    }
}

fn want_i64(v: &Value, what: &str) -> Result<i64, EvcError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(EvcError::type_err(format!(
            "{what} expects an integer, not {}",
            other.type_name()
        ))),
    }
}

fn want_str(v: &Value, what: &str) -> Result<String, EvcError> {
    match v {
        Value::Str(s) => Ok(s.to_rust_string()),
        other => Err(EvcError::type_err(format!(
            "{what} expects a string, not {}",
            other.type_name()
        ))),
    }
}

/// Values a builtin can iterate: list, tuple, or range.
fn iterable(v: &Value, what: &str) -> Result<Vec<Value>, EvcError> {
    match v {
        Value::List(l) => Ok(l.borrow().clone()),
        Value::Tuple(t) => Ok(t.as_ref().clone()),
        Value::Range(r) => Ok(r.iter().map(Value::Int).collect()),
        other => Err(EvcError::type_err(format!(
            "{what} expects a sequence, not {}",
            other.type_name()
        ))),
    }
}

// ---- builtin bodies ----

fn bi_print(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let mut parts = Vec::with_capacity(call.args.len());
    for v in call.args {
        parts.push(v.display()?);
    }
    println!("{}", parts.join(" "));
    Ok(Value::Null)
}

fn bi_typeof(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::str(call.args[0].type_name()))
}

fn bi_len(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    match call.args[0].seq_len() {
        Some(n) => Ok(Value::Int(n as i64)),
        None => Err(EvcError::type_err(format!(
            "{} has no length",
            call.args[0].type_name()
        ))),
    }
}

fn bi_int(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    match &call.args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Str(s) => Ok(Value::Int(numparse::parse_int(&s.to_rust_string())?)),
        other => Err(EvcError::type_err(format!(
            "cannot convert {} to integer",
            other.type_name()
        ))),
    }
}

fn bi_float(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    match &call.args[0] {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(s) => Ok(Value::Float(numparse::parse_float(&s.to_rust_string())?)),
        other => Err(EvcError::type_err(format!(
            "cannot convert {} to float",
            other.type_name()
        ))),
    }
}

fn bi_str(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::str(&call.args[0].display()?))
}

fn bi_complex(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let re = want_f64(&call.args[0], "complex")?;
    let im = match call.args.get(1) {
        Some(v) => want_f64(v, "complex")?,
        None => 0.0,
    };
    Ok(Value::Complex(Complex::new(re, im)))
}

fn bi_range(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let r = match call.args.len() {
        1 => Range {
            start: 0,
            stop: want_i64(&call.args[0], "range")?,
            step: 1,
        },
        2 => Range {
            start: want_i64(&call.args[0], "range")?,
            stop: want_i64(&call.args[1], "range")?,
            step: 1,
        },
        _ => Range {
            start: want_i64(&call.args[0], "range")?,
            stop: want_i64(&call.args[1], "range")?,
            step: want_i64(&call.args[2], "range")?,
        },
    };
    if r.step == 0 {
        return Err(EvcError::new(
            ErrorClass::Range,
            "range step may not be zero",
        ));
    }
    Ok(Value::Range(r))
}

fn bi_abs(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    arith::abs(&call.args[0])
}

fn extrema(call: &NativeArgs<'_>, want_greater: bool, what: &str) -> Result<Value, EvcError> {
    let items = if call.args.len() == 1 {
        iterable(&call.args[0], what)?
    } else {
        call.args.to_vec()
    };
    let mut best: Option<Value> = None;
    for v in items {
        best = Some(match best {
            None => v,
            Some(b) => {
                let keep_new = match var_compare(&v, &b)? {
                    std::cmp::Ordering::Greater => want_greater,
                    std::cmp::Ordering::Less => !want_greater,
                    std::cmp::Ordering::Equal => false,
                };
                if keep_new { v } else { b }
            }
        });
    }
    best.ok_or_else(|| EvcError::new(ErrorClass::Value, format!("{what}() of an empty sequence")))
}

fn bi_min(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    extrema(&call, false, "min")
}

fn bi_max(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    extrema(&call, true, "max")
}

fn bi_any(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let items = iterable(&call.args[0], "any")?;
    Ok(Value::Int(items.iter().any(|v| v.truthy()) as i64))
}

fn bi_all(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let items = iterable(&call.args[0], "all")?;
    Ok(Value::Int(items.iter().all(|v| v.truthy()) as i64))
}

fn bi_open(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let path = want_str(&call.args[0], "open")?;
    let mode = match call.args.get(1) {
        Some(v) => want_str(v, "open")?,
        None => "r".to_string(),
    };
    let flags = ModeFlags::parse(&mode)?;
    let file = FileData::open(&path, flags)?;
    Ok(Value::File(Rc::new(std::cell::RefCell::new(file))))
}

/// Build a computed attribute for a dictionary slot: reading the slot
/// calls the getter with the dictionary as `this`; writing calls the
/// setter, or fails when there is none.
fn bi_property(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let getter = call.args[0].clone();
    if !matches!(getter, Value::Function(_) | Value::Method(_)) {
        return Err(EvcError::type_err("property getter must be callable"));
    }
    let setter = match call.args.get(1) {
        Some(v @ (Value::Function(_) | Value::Method(_))) => Some(v.clone()),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(EvcError::type_err(format!(
                "property setter must be callable, not {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Property(Rc::new(
        evilcandy_core::function::Property { getter, setter },
    )))
}

fn bi_uuid(_vm: &mut Vm, _call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::Uuid(Rc::from(uuid::Uuid::new_v4().to_string())))
}

fn bi_exit(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let code = match call.args.first() {
        Some(v) => want_i64(v, "exit")? as i32,
        None => 0,
    };
    std::process::exit(code);
}

// ---- math wrappers ----

fn math_pow(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let x = want_f64(&call.args[0], "pow")?;
    let y = want_f64(&call.args[1], "pow")?;
    Ok(Value::Float(x.powf(y)))
}

macro_rules! math_unary {
    ($name:ident, $method:ident) => {
        fn $name(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
            let x = want_f64(&call.args[0], stringify!($method))?;
            Ok(Value::Float(x.$method()))
        }
    };
}

math_unary!(math_sqrt, sqrt);
math_unary!(math_log, ln);
math_unary!(math_exp, exp);
math_unary!(math_sin, sin);
math_unary!(math_cos, cos);
math_unary!(math_tan, tan);
math_unary!(math_floor, floor);
math_unary!(math_ceil, ceil);
