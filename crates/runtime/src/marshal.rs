//! Call-argument marshalling for user-defined functions.
//!
//! Callers provide positional values (star spreads already expanded)
//! and an optional keyword dict. The result is one value per declared
//! parameter: positionals first, then keyword matches, then defaults;
//! leftovers land in the trailing keyword-dict parameter when the
//! function declares one, and anything else is an `ArgumentError`.

use evilcandy_core::dict::Dict;
use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::function::UserFunc;
use evilcandy_core::strings::Str;
use evilcandy_core::value::Value;

fn arg_err(msg: String) -> EvcError {
    EvcError::new(ErrorClass::Argument, msg)
}

pub fn marshal_user(
    func: &UserFunc,
    pos: &mut Vec<Value>,
    kw: Option<Value>,
) -> Result<Vec<Value>, EvcError> {
    let xptr = &func.xptr;
    let n_params = xptr.arg_names.len();
    let max = xptr.max_args();
    let min = xptr.min_args();

    if pos.len() > max {
        return Err(arg_err(format!(
            "function takes at most {max} positional arguments ({} given)",
            pos.len()
        )));
    }

    let mut kw_dict = match kw {
        Some(Value::Dict(d)) => Some(d),
        Some(other) => {
            return Err(arg_err(format!(
                "keyword arguments must be a dictionary, not {}",
                other.type_name()
            )));
        }
        None => None,
    };

    let defaults = func.defaults.borrow();
    let mut out: Vec<Value> = Vec::with_capacity(n_params);
    for (i, name) in xptr.arg_names.iter().enumerate() {
        if xptr.kwind == i as i16 {
            // Trailing keyword-dict parameter collects the leftovers.
            let rest = kw_dict.take().map(Value::Dict).unwrap_or_else(|| {
                Value::dict(Dict::new())
            });
            out.push(rest);
            continue;
        }
        if i < pos.len() {
            out.push(pos[i].clone());
            continue;
        }
        if let Some(d) = &kw_dict {
            let key = Str::from_str(name);
            if let Some(v) = d.borrow().get(&key) {
                d.borrow_mut().remove(&key)?;
                out.push(v);
                continue;
            }
        }
        if let Some(Some(v)) = defaults.get(i) {
            out.push(v.clone());
            continue;
        }
        let _ = min;
        return Err(arg_err(format!("missing argument '{name}'")));
    }

    // Keyword names that matched nothing: only acceptable when the
    // function has a kw-dict parameter (handled above by moving the
    // whole dict in).
    if let Some(d) = kw_dict
        && !d.borrow().is_empty()
    {
        let first = d
            .borrow()
            .keys()
            .next()
            .map(|k| k.to_rust_string())
            .unwrap_or_default();
        return Err(arg_err(format!("unexpected keyword argument '{first}'")));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evilcandy_core::function::ModuleScope;
    use evilcandy_core::xptr::Xptr;
    use std::cell::RefCell;

    fn fake_func(names: &[&str], optind: i16, kwind: i16, defaults: Vec<Option<Value>>) -> UserFunc {
        let xptr = Xptr {
            instr: Vec::new(),
            rodata: Vec::new(),
            labels: Vec::new(),
            file_name: Rc::from("<test>"),
            file_line: 1,
            uuid: String::from("00000000-0000-0000-0000-000000000000"),
            arg_names: names.iter().map(|s| s.to_string()).collect(),
            optind,
            kwind,
            n_locals: 0,
        };
        let module: ModuleScope = Rc::new(RefCell::new(Dict::new()));
        UserFunc {
            xptr: Rc::new(xptr),
            defaults: RefCell::new(defaults),
            clov: RefCell::new(Vec::new()),
            module,
        }
    }

    fn kw(pairs: &[(&str, i64)]) -> Value {
        let mut d = Dict::new();
        for (k, v) in pairs {
            d.insert(Rc::new(Str::from_str(k)), Value::Int(*v)).unwrap();
        }
        Value::dict(d)
    }

    #[test]
    fn test_exact_positional() {
        let f = fake_func(&["a", "b"], -1, -1, vec![None, None]);
        let got = marshal_user(&f, &mut vec![Value::Int(1), Value::Int(2)], None).unwrap();
        assert_eq!(got, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_defaults_fill_gaps() {
        let f = fake_func(&["a", "b"], 1, -1, vec![None, Some(Value::Int(10))]);
        let got = marshal_user(&f, &mut vec![Value::Int(1)], None).unwrap();
        assert_eq!(got, vec![Value::Int(1), Value::Int(10)]);
    }

    #[test]
    fn test_missing_required_raises() {
        let f = fake_func(&["a", "b"], -1, -1, vec![None, None]);
        let err = marshal_user(&f, &mut vec![Value::Int(1)], None).unwrap_err();
        assert_eq!(err.class, ErrorClass::Argument);
    }

    #[test]
    fn test_too_many_positional_raises() {
        let f = fake_func(&["a"], -1, -1, vec![None]);
        let err =
            marshal_user(&f, &mut vec![Value::Int(1), Value::Int(2)], None).unwrap_err();
        assert_eq!(err.class, ErrorClass::Argument);
    }

    #[test]
    fn test_keyword_fills_parameter() {
        let f = fake_func(&["a", "b"], -1, -1, vec![None, None]);
        let got = marshal_user(
            &f,
            &mut vec![Value::Int(1)],
            Some(kw(&[("b", 7)])),
        )
        .unwrap();
        assert_eq!(got, vec![Value::Int(1), Value::Int(7)]);
    }

    #[test]
    fn test_unknown_keyword_without_kwdict_raises() {
        let f = fake_func(&["a"], -1, -1, vec![None]);
        let err = marshal_user(
            &f,
            &mut vec![Value::Int(1)],
            Some(kw(&[("zzz", 7)])),
        )
        .unwrap_err();
        assert_eq!(err.class, ErrorClass::Argument);
    }

    #[test]
    fn test_kwdict_parameter_collects_leftovers() {
        let f = fake_func(&["a", "kw"], -1, 1, vec![None, None]);
        let got = marshal_user(
            &f,
            &mut vec![Value::Int(1)],
            Some(kw(&[("x", 8), ("y", 9)])),
        )
        .unwrap();
        assert_eq!(got[0], Value::Int(1));
        let Value::Dict(d) = &got[1] else { panic!("expected dict") };
        assert_eq!(d.borrow().len(), 2);
        assert_eq!(d.borrow().get(&Str::from_str("x")), Some(Value::Int(8)));
    }
}
