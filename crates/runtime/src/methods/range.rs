//! Range methods. The `start`/`stop`/`step` computed properties are
//! answered directly by attribute lookup; only behavior lives here.

use evilcandy_core::error::EvcError;
use evilcandy_core::value::Value;

use crate::vm::{NativeArgs, Vm};

pub fn install(vm: &mut Vm) {
    vm.method("range", "len", 0, 0, range_len);
    vm.method("range", "foreach", 1, 1, range_foreach);
    vm.method("range", "tolist", 0, 0, range_tolist);
    vm.method("range", "has", 1, 1, range_has);
}

fn this_range(call: &NativeArgs<'_>) -> Result<evilcandy_core::Range, EvcError> {
    match &call.this {
        Value::Range(r) => Ok(*r),
        other => Err(EvcError::type_err(format!(
            "range method on {}",
            other.type_name()
        ))),
    }
}

fn range_len(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::Int(this_range(&call)?.len() as i64))
}

fn range_foreach(vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let r = this_range(&call)?;
    for (i, x) in r.iter().enumerate() {
        vm.call_value(
            call.args[0].clone(),
            Value::Null,
            vec![Value::Int(x), Value::Int(i as i64)],
            None,
        )?;
    }
    Ok(Value::Null)
}

fn range_tolist(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let r = this_range(&call)?;
    Ok(Value::list(r.iter().map(Value::Int).collect()))
}

fn range_has(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let has = crate::ops::hasitem(&call.this, &call.args[0])?;
    Ok(Value::Int(has as i64))
}
