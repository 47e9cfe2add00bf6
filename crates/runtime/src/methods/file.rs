//! File methods.

use std::cell::RefCell;
use std::rc::Rc;

use evilcandy_core::error::EvcError;
use evilcandy_core::file::FileData;
use evilcandy_core::strings::Str;
use evilcandy_core::value::Value;

use crate::vm::{NativeArgs, Vm};

pub fn install(vm: &mut Vm) {
    vm.method("file", "read", 0, 1, file_read);
    vm.method("file", "readline", 0, 0, file_readline);
    vm.method("file", "write", 1, 1, file_write);
    vm.method("file", "writeline", 1, 1, file_writeline);
    vm.method("file", "close", 0, 0, file_close);
    vm.method("file", "eof", 0, 0, file_eof);
    vm.method("file", "clearerr", 0, 0, file_clearerr);
    vm.method("file", "tell", 0, 0, file_tell);
}

fn this_file(call: &NativeArgs<'_>) -> Result<Rc<RefCell<FileData>>, EvcError> {
    match &call.this {
        Value::File(f) => Ok(f.clone()),
        other => Err(EvcError::type_err(format!(
            "file method on {}",
            other.type_name()
        ))),
    }
}

/// Bytes read from a text-mode file become a string; binary mode
/// yields bytes.
fn wrap_read(file: &FileData, bytes: Vec<u8>) -> Value {
    if file.mode.binary {
        Value::Bytes(Rc::new(bytes))
    } else {
        Value::Str(Rc::new(Str::from_bytes(&bytes)))
    }
}

fn file_read(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let f = this_file(&call)?;
    let n = match call.args.first() {
        Some(Value::Int(n)) if *n >= 0 => Some(*n as usize),
        Some(other) => {
            return Err(EvcError::type_err(format!(
                "read expects a non-negative count, not {}",
                other.repr()?
            )));
        }
        None => None,
    };
    let mut f = f.borrow_mut();
    let bytes = f.read(n)?;
    Ok(wrap_read(&f, bytes))
}

fn file_readline(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let f = this_file(&call)?;
    let mut f = f.borrow_mut();
    let bytes = f.readline()?;
    Ok(wrap_read(&f, bytes))
}

fn write_value(f: &Rc<RefCell<FileData>>, v: &Value) -> Result<usize, EvcError> {
    let bytes = match v {
        Value::Str(s) => s.to_utf8_bytes(),
        Value::Bytes(b) => b.as_ref().clone(),
        other => other.display()?.into_bytes(),
    };
    f.borrow_mut().write(&bytes)
}

fn file_write(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let f = this_file(&call)?;
    let n = write_value(&f, &call.args[0])?;
    Ok(Value::Int(n as i64))
}

fn file_writeline(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let f = this_file(&call)?;
    let n = write_value(&f, &call.args[0])?;
    f.borrow_mut().write(b"\n")?;
    Ok(Value::Int(n as i64 + 1))
}

fn file_close(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    this_file(&call)?.borrow_mut().close();
    Ok(Value::Null)
}

fn file_eof(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::Int(this_file(&call)?.borrow().eof as i64))
}

fn file_clearerr(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    this_file(&call)?.borrow_mut().clearerr();
    Ok(Value::Null)
}

fn file_tell(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let f = this_file(&call)?;
    let pos = f.borrow_mut().tell()?;
    Ok(Value::Int(pos as i64))
}
