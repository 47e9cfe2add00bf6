//! List methods.

use std::cmp::Ordering;

use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::value::{normalize_index, var_compare, var_eq, Value};

use crate::vm::{NativeArgs, Vm};

pub fn install(vm: &mut Vm) {
    vm.method("list", "len", 0, 0, list_len);
    vm.method("list", "append", 1, 1, list_append);
    vm.method("list", "extend", 1, 1, list_extend);
    vm.method("list", "insert", 2, 2, list_insert);
    vm.method("list", "remove", 1, 1, list_remove);
    vm.method("list", "pop", 0, 1, list_pop);
    vm.method("list", "index", 1, 1, list_index);
    vm.method("list", "copy", 0, 0, list_copy);
    vm.method("list", "reverse", 0, 0, list_reverse);
    vm.method("list", "sort", 0, 0, list_sort);
    vm.method("list", "foreach", 1, 1, list_foreach);
    vm.method("list", "has", 1, 1, list_has);
}

fn this_list(call: &NativeArgs<'_>) -> Result<std::rc::Rc<std::cell::RefCell<Vec<Value>>>, EvcError> {
    match &call.this {
        Value::List(l) => Ok(l.clone()),
        other => Err(EvcError::type_err(format!(
            "list method on {}",
            other.type_name()
        ))),
    }
}

fn list_len(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::Int(this_list(&call)?.borrow().len() as i64))
}

fn list_append(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    this_list(&call)?.borrow_mut().push(call.args[0].clone());
    Ok(Value::Null)
}

fn list_extend(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let l = this_list(&call)?;
    match &call.args[0] {
        Value::List(other) => {
            if std::rc::Rc::ptr_eq(&l, other) {
                let copy = l.borrow().clone();
                l.borrow_mut().extend(copy);
            } else {
                l.borrow_mut().extend(other.borrow().iter().cloned());
            }
        }
        Value::Tuple(t) => l.borrow_mut().extend(t.iter().cloned()),
        Value::Range(r) => l.borrow_mut().extend(r.iter().map(Value::Int)),
        other => {
            return Err(EvcError::type_err(format!(
                "extend expects a sequence, not {}",
                other.type_name()
            )));
        }
    }
    Ok(Value::Null)
}

fn list_insert(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let l = this_list(&call)?;
    let Value::Int(i) = call.args[0] else {
        return Err(EvcError::type_err("insert expects an integer index"));
    };
    let mut l = l.borrow_mut();
    let n = l.len() as i64;
    // Insertion points clamp rather than raise, matching appends at
    // either end.
    let at = if i < 0 { (i + n).max(0) } else { i.min(n) } as usize;
    l.insert(at, call.args[1].clone());
    Ok(Value::Null)
}

fn list_remove(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let l = this_list(&call)?;
    let pos = {
        let l = l.borrow();
        let mut found = None;
        for (i, v) in l.iter().enumerate() {
            if var_eq(v, &call.args[0])? {
                found = Some(i);
                break;
            }
        }
        found
    };
    match pos {
        Some(i) => {
            l.borrow_mut().remove(i);
            Ok(Value::Null)
        }
        None => Err(EvcError::new(
            ErrorClass::Value,
            "remove: value not in list",
        )),
    }
}

fn list_pop(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let l = this_list(&call)?;
    let mut l = l.borrow_mut();
    if l.is_empty() {
        return Err(EvcError::new(ErrorClass::Index, "pop from an empty list"));
    }
    let at = match call.args.first() {
        Some(Value::Int(i)) => normalize_index(*i, l.len())?,
        Some(other) => {
            return Err(EvcError::type_err(format!(
                "pop expects an integer index, not {}",
                other.type_name()
            )));
        }
        None => l.len() - 1,
    };
    Ok(l.remove(at))
}

fn list_index(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let l = this_list(&call)?;
    let l = l.borrow();
    for (i, v) in l.iter().enumerate() {
        if var_eq(v, &call.args[0])? {
            return Ok(Value::Int(i as i64));
        }
    }
    Err(EvcError::new(ErrorClass::Value, "index: value not in list"))
}

fn list_copy(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    Ok(Value::list(this_list(&call)?.borrow().clone()))
}

fn list_reverse(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    this_list(&call)?.borrow_mut().reverse();
    Ok(Value::Null)
}

fn list_sort(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let l = this_list(&call)?;
    let mut items = l.borrow().clone();
    let mut failed: Option<EvcError> = None;
    items.sort_by(|a, b| match var_compare(a, b) {
        Ok(ord) => ord,
        Err(e) => {
            if failed.is_none() {
                failed = Some(e);
            }
            Ordering::Equal
        }
    });
    if let Some(e) = failed {
        return Err(e);
    }
    *l.borrow_mut() = items;
    Ok(Value::Null)
}

fn list_foreach(vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let l = this_list(&call)?;
    let snapshot = l.borrow().clone();
    for (i, v) in snapshot.into_iter().enumerate() {
        vm.call_value(
            call.args[0].clone(),
            Value::Null,
            vec![v, Value::Int(i as i64)],
            None,
        )?;
    }
    Ok(Value::Null)
}

fn list_has(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let has = crate::ops::hasitem(&call.this, &call.args[0])?;
    Ok(Value::Int(has as i64))
}
