//! Dictionary methods.
//!
//! `foreach` holds the iteration lock while the callback runs, so a
//! callback that tries to insert or delete on the same dictionary gets
//! the documented `RuntimeError`.

use std::rc::Rc;

use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::strings::Str;
use evilcandy_core::value::Value;

use crate::vm::{NativeArgs, Vm};

pub fn install(vm: &mut Vm) {
    vm.method("dictionary", "len", 0, 0, dict_len);
    vm.method("dictionary", "keys", 0, 0, dict_keys);
    vm.method("dictionary", "values", 0, 0, dict_values);
    vm.method("dictionary", "items", 0, 0, dict_items);
    vm.method("dictionary", "copy", 0, 0, dict_copy);
    vm.method("dictionary", "foreach", 1, 1, dict_foreach);
    vm.method("dictionary", "hasattr", 1, 1, dict_hasattr);
    vm.method("dictionary", "getattr", 1, 2, dict_getattr);
    vm.method("dictionary", "setattr", 2, 2, dict_setattr);
    vm.method("dictionary", "delattr", 1, 1, dict_delattr);
}

type DictRef = Rc<std::cell::RefCell<evilcandy_core::dict::Dict>>;

fn this_dict(call: &NativeArgs<'_>) -> Result<DictRef, EvcError> {
    match &call.this {
        Value::Dict(d) => Ok(d.clone()),
        other => Err(EvcError::type_err(format!(
            "dictionary method on {}",
            other.type_name()
        ))),
    }
}

fn arg_key(call: &NativeArgs<'_>, what: &str) -> Result<Rc<Str>, EvcError> {
    match &call.args[0] {
        Value::Str(s) => Ok(s.clone()),
        other => Err(EvcError::type_err(format!(
            "{what} expects a string key, not {}",
            other.type_name()
        ))),
    }
}

fn dict_len(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::Int(this_dict(&call)?.borrow().len() as i64))
}

fn dict_keys(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let keys = d.borrow().keys().map(|k| Value::Str(k.clone())).collect();
    Ok(Value::list(keys))
}

fn dict_values(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let values = d.borrow().values().cloned().collect();
    Ok(Value::list(values))
}

fn dict_items(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let items = d
        .borrow()
        .iter()
        .map(|(k, v)| Value::tuple(vec![Value::Str(k.clone()), v.clone()]))
        .collect();
    Ok(Value::list(items))
}

fn dict_copy(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let copy = d.borrow().clone();
    Ok(Value::dict(copy))
}

fn dict_foreach(vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let entries: Vec<(Rc<Str>, Value)> = d
        .borrow()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    d.borrow_mut().lock();
    let result = (|| -> Result<Value, EvcError> {
        for (k, v) in entries {
            vm.call_value(
                call.args[0].clone(),
                Value::Null,
                vec![v, Value::Str(k)],
                None,
            )?;
        }
        Ok(Value::Null)
    })();
    d.borrow_mut().unlock();
    result
}

fn dict_hasattr(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let key = arg_key(&call, "hasattr")?;
    Ok(Value::Int(d.borrow().contains(&key) as i64))
}

fn dict_getattr(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let key = arg_key(&call, "getattr")?;
    match d.borrow().get(&key) {
        Some(v) => Ok(v),
        None => match call.args.get(1) {
            Some(default) => Ok(default.clone()),
            None => Err(EvcError::new(
                ErrorClass::Key,
                format!("no attribute '{key}'"),
            )),
        },
    }
}

fn dict_setattr(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let key = arg_key(&call, "setattr")?;
    d.borrow_mut().insert(key, call.args[1].clone())?;
    Ok(Value::Null)
}

fn dict_delattr(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let d = this_dict(&call)?;
    let key = arg_key(&call, "delattr")?;
    d.borrow_mut().remove(&key)?;
    Ok(Value::Null)
}
