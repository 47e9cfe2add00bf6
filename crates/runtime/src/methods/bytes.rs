//! Bytes methods.

use std::rc::Rc;

use evilcandy_core::error::EvcError;
use evilcandy_core::strings::Str;
use evilcandy_core::value::Value;

use crate::vm::{NativeArgs, Vm};

pub fn install(vm: &mut Vm) {
    vm.method("bytes", "len", 0, 0, bytes_len);
    vm.method("bytes", "hex", 0, 0, bytes_hex);
    vm.method("bytes", "decode", 0, 0, bytes_decode);
}

fn this_bytes(call: &NativeArgs<'_>) -> Result<Rc<Vec<u8>>, EvcError> {
    match &call.this {
        Value::Bytes(b) => Ok(b.clone()),
        other => Err(EvcError::type_err(format!(
            "bytes method on {}",
            other.type_name()
        ))),
    }
}

fn bytes_len(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::Int(this_bytes(&call)?.len() as i64))
}

fn bytes_hex(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let b = this_bytes(&call)?;
    let mut out = String::with_capacity(b.len() * 2);
    for byte in b.iter() {
        out.push_str(&format!("{byte:02x}"));
    }
    Ok(Value::str(&out))
}

/// Decode as UTF-8; malformed input survives byte-wise with the
/// `Unknown` encoding flag.
fn bytes_decode(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let b = this_bytes(&call)?;
    Ok(Value::Str(Rc::new(Str::from_bytes(&b))))
}
