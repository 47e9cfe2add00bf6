//! Attribute, item, and slice access.
//!
//! `GetAttr`/`SetAttr` funnel here. String keys walk the mapping
//! protocol (dict entries, then computed properties, then the type's
//! method table); integer keys walk the sequence protocol with
//! negative-index wrapping. Slices build fresh sequences of the source
//! type.

use std::rc::Rc;

use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::function::Method;
use evilcandy_core::strings::{Str, StrWriter};
use evilcandy_core::value::{normalize_index, slice_indices, slice_iter, Value};

use crate::vm::Vm;

pub fn getattr(vm: &mut Vm, obj: &Value, key: &Value) -> Result<Value, EvcError> {
    match key {
        Value::Int(i) => getitem(obj, *i),
        Value::Str(name) => getattr_named(vm, obj, name),
        other => Err(EvcError::type_err(format!(
            "{} cannot index {}",
            other.type_name(),
            obj.type_name()
        ))),
    }
}

fn getattr_named(vm: &mut Vm, obj: &Value, name: &Rc<Str>) -> Result<Value, EvcError> {
    if name.is_empty() {
        return Err(EvcError::new(
            ErrorClass::Runtime,
            "getattr: name may not be empty",
        ));
    }
    if let Value::Dict(d) = obj {
        let entry = d.borrow().get(name);
        if let Some(v) = entry {
            // A stored property computes the attribute.
            if let Value::Property(p) = &v {
                return vm.call_value(p.getter.clone(), obj.clone(), Vec::new(), None);
            }
            return Ok(v);
        }
    }
    if let Value::Range(r) = obj {
        match name.to_rust_string().as_str() {
            "start" => return Ok(Value::Int(r.start)),
            "stop" => return Ok(Value::Int(r.stop)),
            "step" => return Ok(Value::Int(r.step)),
            _ => {}
        }
    }
    if let Some(func) = vm.lookup_method(obj.type_name(), &name.to_rust_string()) {
        return Ok(Value::Method(Rc::new(Method {
            func,
            this: obj.clone(),
        })));
    }
    Err(EvcError::new(
        ErrorClass::Key,
        format!("{} has no attribute '{name}'", obj.type_name()),
    ))
}

pub fn setattr(vm: &mut Vm, obj: &Value, key: &Value, value: Value) -> Result<(), EvcError> {
    match key {
        Value::Int(i) => setitem(obj, *i, value),
        Value::Str(name) => setattr_named(vm, obj, name, value),
        other => Err(EvcError::type_err(format!(
            "{} cannot index {}",
            other.type_name(),
            obj.type_name()
        ))),
    }
}

fn setattr_named(
    vm: &mut Vm,
    obj: &Value,
    name: &Rc<Str>,
    value: Value,
) -> Result<(), EvcError> {
    let Value::Dict(d) = obj else {
        return Err(EvcError::type_err(format!(
            "{} does not support attribute assignment",
            obj.type_name()
        )));
    };
    let existing = d.borrow().get(name);
    if let Some(Value::Property(p)) = existing {
        let Some(setter) = &p.setter else {
            return Err(EvcError::new(
                ErrorClass::Runtime,
                format!("property '{name}' is read-only"),
            ));
        };
        vm.call_value(setter.clone(), obj.clone(), vec![value], None)?;
        return Ok(());
    }
    // Storing null deletes the entry.
    if matches!(value, Value::Null) {
        d.borrow_mut().remove(name)?;
        return Ok(());
    }
    d.borrow_mut().insert(name.clone(), value)?;
    Ok(())
}

/// The sequence `getitem` slot: `-len <= i < len`.
pub fn getitem(obj: &Value, i: i64) -> Result<Value, EvcError> {
    match obj {
        Value::List(l) => {
            let l = l.borrow();
            let idx = normalize_index(i, l.len())?;
            Ok(l[idx].clone())
        }
        Value::Tuple(t) => {
            let idx = normalize_index(i, t.len())?;
            Ok(t[idx].clone())
        }
        Value::Str(s) => {
            let idx = normalize_index(i, s.len())?;
            let mut w = StrWriter::new();
            w.putc(s.char_at(idx));
            Ok(Value::Str(Rc::new(w.finish())))
        }
        Value::Bytes(b) => {
            let idx = normalize_index(i, b.len())?;
            Ok(Value::Int(b[idx] as i64))
        }
        Value::Range(r) => {
            let idx = normalize_index(i, r.len())?;
            Ok(Value::Int(r.nth(idx)))
        }
        other => Err(EvcError::type_err(format!(
            "{} is not indexable",
            other.type_name()
        ))),
    }
}

/// The sequence `setitem` slot; only mutable sequences have one.
pub fn setitem(obj: &Value, i: i64, value: Value) -> Result<(), EvcError> {
    match obj {
        Value::List(l) => {
            let mut l = l.borrow_mut();
            let idx = normalize_index(i, l.len())?;
            l[idx] = value;
            Ok(())
        }
        Value::Tuple(_) | Value::Str(_) | Value::Bytes(_) | Value::Range(_) => {
            Err(EvcError::type_err(format!(
                "{} is immutable",
                obj.type_name()
            )))
        }
        other => Err(EvcError::type_err(format!(
            "{} is not indexable",
            other.type_name()
        ))),
    }
}

fn bound(v: &Value, what: &str) -> Result<Option<i64>, EvcError> {
    match v {
        Value::Null => Ok(None),
        Value::Int(i) => Ok(Some(*i)),
        other => Err(EvcError::type_err(format!(
            "slice {what} must be an integer, not {}",
            other.type_name()
        ))),
    }
}

pub fn getslice(
    seq: &Value,
    start: &Value,
    stop: &Value,
    step: &Value,
) -> Result<Value, EvcError> {
    let start = bound(start, "start")?;
    let stop = bound(stop, "stop")?;
    let step = bound(step, "step")?;
    match seq {
        Value::List(l) => {
            let l = l.borrow();
            let (a, b, c) = slice_indices(start, stop, step, l.len())?;
            Ok(Value::list(slice_iter(a, b, c).map(|i| l[i].clone()).collect()))
        }
        Value::Tuple(t) => {
            let (a, b, c) = slice_indices(start, stop, step, t.len())?;
            Ok(Value::tuple(slice_iter(a, b, c).map(|i| t[i].clone()).collect()))
        }
        Value::Str(s) => {
            let (a, b, c) = slice_indices(start, stop, step, s.len())?;
            let mut w = StrWriter::new();
            for i in slice_iter(a, b, c) {
                w.putc(s.char_at(i));
            }
            Ok(Value::Str(Rc::new(w.finish())))
        }
        Value::Bytes(bytes) => {
            let (a, b, c) = slice_indices(start, stop, step, bytes.len())?;
            Ok(Value::Bytes(Rc::new(
                slice_iter(a, b, c).map(|i| bytes[i]).collect(),
            )))
        }
        other => Err(EvcError::type_err(format!(
            "{} cannot be sliced",
            other.type_name()
        ))),
    }
}

/// Splice assignment, lists only, unit step.
pub fn setslice(
    seq: &Value,
    start: &Value,
    stop: &Value,
    step: &Value,
    value: Value,
) -> Result<(), EvcError> {
    let Value::List(l) = seq else {
        return Err(EvcError::type_err(format!(
            "{} does not support slice assignment",
            seq.type_name()
        )));
    };
    let start = bound(start, "start")?;
    let stop = bound(stop, "stop")?;
    let step = bound(step, "step")?;
    if step.unwrap_or(1) != 1 {
        return Err(EvcError::new(
            ErrorClass::Value,
            "slice assignment requires step 1",
        ));
    }
    let replacement: Vec<Value> = match value {
        Value::List(r) => r.borrow().clone(),
        Value::Tuple(r) => r.as_ref().clone(),
        other => {
            return Err(EvcError::type_err(format!(
                "can only splice a sequence into a list, not {}",
                other.type_name()
            )));
        }
    };
    let mut l = l.borrow_mut();
    let (a, b, _) = slice_indices(start, stop, Some(1), l.len())?;
    let (a, b) = (a as usize, (b.max(a)) as usize);
    l.splice(a..b, replacement);
    Ok(())
}

/// The sequence `hasitem` slot: linear scan with `var_compare`.
pub fn hasitem(seq: &Value, needle: &Value) -> Result<bool, EvcError> {
    use evilcandy_core::value::var_eq;
    match seq {
        Value::List(l) => {
            for v in l.borrow().iter() {
                if var_eq(v, needle)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Tuple(t) => {
            for v in t.iter() {
                if var_eq(v, needle)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Range(r) => {
            let Value::Int(i) = needle else { return Ok(false) };
            Ok(r.iter().any(|x| x == *i))
        }
        Value::Dict(d) => {
            let Value::Str(k) = needle else { return Ok(false) };
            Ok(d.borrow().contains(k))
        }
        other => Err(EvcError::type_err(format!(
            "{} does not support membership tests",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_getitem_wrapping() {
        let l = Value::list(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(getitem(&l, -1).unwrap(), Value::Int(30));
        assert_eq!(getitem(&l, 0).unwrap(), Value::Int(10));
        let err = getitem(&l, 3).unwrap_err();
        assert_eq!(err.class, ErrorClass::Index);
    }

    #[test]
    fn test_string_getitem_is_one_char_string() {
        let s = Value::str("caf\u{e9}");
        let got = getitem(&s, -1).unwrap();
        assert_eq!(got.display().unwrap(), "\u{e9}");
    }

    #[test]
    fn test_bytes_getitem_is_int() {
        let b = Value::Bytes(Rc::new(vec![1, 2, 250]));
        assert_eq!(getitem(&b, 2).unwrap(), Value::Int(250));
    }

    #[test]
    fn test_setitem_immutable_rejected() {
        let t = Value::tuple(vec![Value::Int(1)]);
        let err = setitem(&t, 0, Value::Int(2)).unwrap_err();
        assert_eq!(err.class, ErrorClass::Type);
    }

    #[test]
    fn test_slice_list() {
        let l = Value::list(vec![
            Value::Int(10),
            Value::Int(20),
            Value::Int(30),
            Value::Int(40),
        ]);
        let got = getslice(&l, &Value::Int(1), &Value::Int(3), &Value::Null).unwrap();
        assert_eq!(got.repr().unwrap(), "[20, 30]");
        // Full-copy identity.
        let all = getslice(&l, &Value::Null, &Value::Null, &Value::Null).unwrap();
        assert_eq!(all.repr().unwrap(), "[10, 20, 30, 40]");
        // Zero step is rejected.
        let err = getslice(&l, &Value::Null, &Value::Null, &Value::Int(0)).unwrap_err();
        assert_eq!(err.class, ErrorClass::Value);
    }

    #[test]
    fn test_setslice_splices() {
        let l = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        setslice(
            &l,
            &Value::Int(1),
            &Value::Int(2),
            &Value::Null,
            Value::list(vec![Value::Int(8), Value::Int(9)]),
        )
        .unwrap();
        assert_eq!(l.repr().unwrap(), "[1, 8, 9, 3]");
    }

    #[test]
    fn test_hasitem() {
        let l = Value::list(vec![Value::Int(1), Value::str("x")]);
        assert!(hasitem(&l, &Value::str("x")).unwrap());
        assert!(!hasitem(&l, &Value::Int(9)).unwrap());
    }
}
