//! String methods.

use std::rc::Rc;

use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::strings::{Str, StrWriter};
use evilcandy_core::value::Value;

use crate::vm::{NativeArgs, Vm};

pub fn install(vm: &mut Vm) {
    vm.method("string", "len", 0, 0, str_len);
    vm.method("string", "toupper", 0, 0, str_toupper);
    vm.method("string", "tolower", 0, 0, str_tolower);
    vm.method("string", "strip", 0, 1, str_strip);
    vm.method("string", "lstrip", 0, 1, str_lstrip);
    vm.method("string", "rstrip", 0, 1, str_rstrip);
    vm.method("string", "replace", 2, 2, str_replace);
    vm.method("string", "rjust", 1, 2, str_rjust);
    vm.method("string", "ljust", 1, 2, str_ljust);
    vm.method("string", "center", 1, 2, str_center);
    vm.method("string", "zfill", 1, 1, str_zfill);
    vm.method("string", "join", 1, 1, str_join);
    vm.method("string", "capitalize", 0, 0, str_capitalize);
    vm.method("string", "format", 0, usize::MAX, str_format);
}

fn this_str(call: &NativeArgs<'_>) -> Result<Rc<Str>, EvcError> {
    match &call.this {
        Value::Str(s) => Ok(s.clone()),
        other => Err(EvcError::type_err(format!(
            "string method on {}",
            other.type_name()
        ))),
    }
}

fn arg_str(call: &NativeArgs<'_>, i: usize, what: &str) -> Result<String, EvcError> {
    match call.args.get(i) {
        Some(Value::Str(s)) => Ok(s.to_rust_string()),
        Some(other) => Err(EvcError::type_err(format!(
            "{what} expects a string, not {}",
            other.type_name()
        ))),
        None => Err(EvcError::new(
            ErrorClass::Argument,
            format!("{what}: missing argument"),
        )),
    }
}

fn str_len(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::Int(this_str(&call)?.len() as i64))
}

fn str_toupper(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?.to_rust_string();
    Ok(Value::str(&s.to_uppercase()))
}

fn str_tolower(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?.to_rust_string();
    Ok(Value::str(&s.to_lowercase()))
}

fn strip_set(call: &NativeArgs<'_>) -> Result<Option<Vec<char>>, EvcError> {
    match call.args.first() {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.to_rust_string().chars().collect())),
        Some(other) => Err(EvcError::type_err(format!(
            "strip set must be a string, not {}",
            other.type_name()
        ))),
    }
}

fn strip_match(c: char, set: &Option<Vec<char>>) -> bool {
    match set {
        None => c.is_whitespace(),
        Some(chars) => chars.contains(&c),
    }
}

fn str_strip(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let set = strip_set(&call)?;
    let s = this_str(&call)?.to_rust_string();
    let out = s
        .trim_start_matches(|c| strip_match(c, &set))
        .trim_end_matches(|c| strip_match(c, &set));
    Ok(Value::str(out))
}

fn str_lstrip(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let set = strip_set(&call)?;
    let s = this_str(&call)?.to_rust_string();
    Ok(Value::str(s.trim_start_matches(|c| strip_match(c, &set))))
}

fn str_rstrip(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let set = strip_set(&call)?;
    let s = this_str(&call)?.to_rust_string();
    Ok(Value::str(s.trim_end_matches(|c| strip_match(c, &set))))
}

fn str_replace(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?.to_rust_string();
    let from = arg_str(&call, 0, "replace")?;
    let to = arg_str(&call, 1, "replace")?;
    if from.is_empty() {
        return Err(EvcError::new(
            ErrorClass::Value,
            "replace: search string may not be empty",
        ));
    }
    Ok(Value::str(&s.replace(&from, &to)))
}

fn pad_char(call: &NativeArgs<'_>, what: &str) -> Result<char, EvcError> {
    match call.args.get(1) {
        None => Ok(' '),
        Some(Value::Str(s)) if s.len() == 1 => {
            Ok(char::from_u32(s.char_at(0)).unwrap_or(' '))
        }
        Some(_) => Err(EvcError::new(
            ErrorClass::Value,
            format!("{what}: fill must be a one-character string"),
        )),
    }
}

fn want_width(call: &NativeArgs<'_>, what: &str) -> Result<usize, EvcError> {
    match call.args.first() {
        Some(Value::Int(w)) if *w >= 0 => Ok(*w as usize),
        _ => Err(EvcError::type_err(format!(
            "{what} expects a non-negative integer width"
        ))),
    }
}

fn str_rjust(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?;
    let width = want_width(&call, "rjust")?;
    let fill = pad_char(&call, "rjust")?;
    let mut w = StrWriter::new();
    for _ in s.len()..width {
        w.putc(fill as u32);
    }
    w.put_str(&s);
    Ok(Value::Str(Rc::new(w.finish())))
}

fn str_ljust(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?;
    let width = want_width(&call, "ljust")?;
    let fill = pad_char(&call, "ljust")?;
    let mut w = StrWriter::new();
    w.put_str(&s);
    for _ in s.len()..width {
        w.putc(fill as u32);
    }
    Ok(Value::Str(Rc::new(w.finish())))
}

fn str_center(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?;
    let width = want_width(&call, "center")?;
    let fill = pad_char(&call, "center")?;
    let pad = width.saturating_sub(s.len());
    let left = pad / 2;
    let mut w = StrWriter::new();
    for _ in 0..left {
        w.putc(fill as u32);
    }
    w.put_str(&s);
    for _ in 0..pad - left {
        w.putc(fill as u32);
    }
    Ok(Value::Str(Rc::new(w.finish())))
}

fn str_zfill(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?.to_rust_string();
    let width = want_width(&call, "zfill")?;
    if s.chars().count() >= width {
        return Ok(Value::str(&s));
    }
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.as_str()),
    };
    let zeros = width - s.chars().count();
    Ok(Value::str(&format!("{sign}{}{digits}", "0".repeat(zeros))))
}

fn str_join(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let sep = this_str(&call)?;
    let items: Vec<Value> = match &call.args[0] {
        Value::List(l) => l.borrow().clone(),
        Value::Tuple(t) => t.as_ref().clone(),
        other => {
            return Err(EvcError::type_err(format!(
                "join expects a sequence, not {}",
                other.type_name()
            )));
        }
    };
    let mut w = StrWriter::new();
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            w.put_str(&sep);
        }
        match v {
            Value::Str(s) => w.put_str(s),
            other => {
                return Err(EvcError::type_err(format!(
                    "join: element {i} is {}, not string",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::Str(Rc::new(w.finish())))
}

fn str_capitalize(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let s = this_str(&call)?.to_rust_string();
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    };
    Ok(Value::str(&out))
}

/// Brace substitution: `{}` takes the next positional argument, `{N}`
/// a specific one, `{name}` a keyword argument. `{{`/`}}` escape.
fn str_format(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let template = this_str(&call)?.to_rust_string();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(EvcError::new(
                                ErrorClass::Value,
                                "format: unterminated '{'",
                            ));
                        }
                    }
                }
                let v = if name.is_empty() {
                    let v = call.args.get(auto).cloned();
                    auto += 1;
                    v.ok_or_else(|| {
                        EvcError::new(ErrorClass::Argument, "format: not enough arguments")
                    })?
                } else if let Ok(i) = name.parse::<usize>() {
                    call.args.get(i).cloned().ok_or_else(|| {
                        EvcError::new(
                            ErrorClass::Argument,
                            format!("format: no positional argument {i}"),
                        )
                    })?
                } else {
                    match &call.kwargs {
                        Some(Value::Dict(d)) => {
                            d.borrow().get(&Str::from_str(&name)).ok_or_else(|| {
                                EvcError::new(
                                    ErrorClass::Key,
                                    format!("format: no keyword argument '{name}'"),
                                )
                            })?
                        }
                        _ => {
                            return Err(EvcError::new(
                                ErrorClass::Key,
                                format!("format: no keyword argument '{name}'"),
                            ));
                        }
                    }
                };
                out.push_str(&v.display()?);
            }
            '}' => {
                return Err(EvcError::new(ErrorClass::Value, "format: stray '}'"));
            }
            c => out.push(c),
        }
    }
    Ok(Value::str(&out))
}
