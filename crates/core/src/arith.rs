//! Operator dispatch over the numeric tower and sequence types.
//!
//! Binary arithmetic widens int -> float -> complex. Integer division
//! and modulo by zero yield 0 (documented legacy behavior); complex
//! division by zero raises `NumberError`. Bit operators are
//! integer-only. `+` doubles as sequence concatenation.

use std::fmt;
use std::rc::Rc;

use crate::error::{ErrorClass, EvcError};
use crate::strings::StrWriter;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }

    pub fn abs(self) -> f64 {
        self.re.hypot(self.im)
    }

    fn mul(self, o: Complex) -> Complex {
        Complex::new(
            self.re * o.re - self.im * o.im,
            self.re * o.im + self.im * o.re,
        )
    }

    fn div(self, o: Complex) -> Result<Complex, EvcError> {
        let denom = o.re * o.re + o.im * o.im;
        if denom == 0.0 {
            return Err(EvcError::new(ErrorClass::Number, "complex division by zero"));
        }
        Ok(Complex::new(
            (self.re * o.re + self.im * o.im) / denom,
            (self.im * o.re - self.re * o.im) / denom,
        ))
    }

    fn exp(self) -> Complex {
        let r = self.re.exp();
        Complex::new(r * self.im.cos(), r * self.im.sin())
    }

    fn ln(self) -> Complex {
        Complex::new(self.abs().ln(), self.im.atan2(self.re))
    }

    fn pow(self, o: Complex) -> Result<Complex, EvcError> {
        if self.re == 0.0 && self.im == 0.0 {
            if o.re == 0.0 && o.im == 0.0 {
                return Ok(Complex::new(1.0, 0.0));
            }
            return Ok(Complex::default());
        }
        Ok(self.ln().mul(o).exp())
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im < 0.0 {
            write!(f, "({}-{}j)", self.re, -self.im)
        } else {
            write!(f, "({}+{}j)", self.re, self.im)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

pub fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_) | Value::Complex(_))
}

pub fn to_complex(v: &Value) -> Option<Complex> {
    match v {
        Value::Int(i) => Some(Complex::new(*i as f64, 0.0)),
        Value::Float(f) => Some(Complex::new(*f, 0.0)),
        Value::Complex(c) => Some(*c),
        _ => None,
    }
}

pub fn binary_op(op: BinOp, a: &Value, b: &Value) -> Result<Value, EvcError> {
    if is_numeric(a) && is_numeric(b) {
        return numeric_op(op, a, b);
    }
    if op == BinOp::Add {
        return concat(a, b);
    }
    Err(EvcError::mismatch(op.symbol()))
}

fn numeric_op(op: BinOp, a: &Value, b: &Value) -> Result<Value, EvcError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_op(op, *x, *y),
        (Value::Complex(_), _) | (_, Value::Complex(_)) => {
            // Widen the non-complex side.
            let x = to_complex(a).expect("numeric");
            let y = to_complex(b).expect("numeric");
            complex_op(op, x, y)
        }
        _ => {
            let x = match a {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                _ => unreachable!(),
            };
            let y = match b {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                _ => unreachable!(),
            };
            float_op(op, x, y)
        }
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value, EvcError> {
    Ok(match op {
        BinOp::Add => Value::Int(x.wrapping_add(y)),
        BinOp::Sub => Value::Int(x.wrapping_sub(y)),
        BinOp::Mul => Value::Int(x.wrapping_mul(y)),
        // Division by zero yields 0 on integers; see the language notes.
        BinOp::Div => Value::Int(if y == 0 { 0 } else { x.wrapping_div(y) }),
        BinOp::Mod => Value::Int(if y == 0 { 0 } else { x.wrapping_rem(y) }),
        BinOp::Pow => {
            if y >= 0 {
                let mut acc: i64 = 1;
                let mut base = x;
                let mut e = y as u64;
                while e > 0 {
                    if e & 1 == 1 {
                        acc = acc.wrapping_mul(base);
                    }
                    base = base.wrapping_mul(base);
                    e >>= 1;
                }
                Value::Int(acc)
            } else {
                Value::Float((x as f64).powf(y as f64))
            }
        }
        BinOp::And => Value::Int(x & y),
        BinOp::Or => Value::Int(x | y),
        BinOp::Xor => Value::Int(x ^ y),
        // Out-of-range shift counts collapse to 0, matching the
        // original integer type.
        BinOp::Shl => Value::Int(if (1..64).contains(&y) { x.wrapping_shl(y as u32) } else { 0 }),
        // Right shift is logical (zero-fill).
        BinOp::Shr => Value::Int(if (1..64).contains(&y) {
            ((x as u64) >> y) as i64
        } else {
            0
        }),
    })
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value, EvcError> {
    Ok(match op {
        BinOp::Add => Value::Float(x + y),
        BinOp::Sub => Value::Float(x - y),
        BinOp::Mul => Value::Float(x * y),
        BinOp::Div => Value::Float(x / y),
        BinOp::Mod => Value::Float(x % y),
        BinOp::Pow => Value::Float(x.powf(y)),
        _ => return Err(EvcError::mismatch(op.symbol())),
    })
}

fn complex_op(op: BinOp, x: Complex, y: Complex) -> Result<Value, EvcError> {
    Ok(match op {
        BinOp::Add => Value::Complex(Complex::new(x.re + y.re, x.im + y.im)),
        BinOp::Sub => Value::Complex(Complex::new(x.re - y.re, x.im - y.im)),
        BinOp::Mul => Value::Complex(x.mul(y)),
        BinOp::Div => Value::Complex(x.div(y)?),
        BinOp::Pow => Value::Complex(x.pow(y)?),
        _ => return Err(EvcError::mismatch(op.symbol())),
    })
}

/// The sequence `cat` protocol: a fresh concatenation of two values of
/// the same sequence type. A `null` operand yields an empty sequence
/// of the other side's type.
fn concat(a: &Value, b: &Value) -> Result<Value, EvcError> {
    use Value::*;
    match (a, b) {
        (Str(x), Str(y)) => {
            let mut w = StrWriter::new();
            w.put_str(x);
            w.put_str(y);
            Ok(Str(Rc::new(w.finish())))
        }
        (Str(_), Null) | (Null, Str(_)) => Ok(Str(Rc::new(crate::strings::Str::empty()))),
        (Bytes(x), Bytes(y)) => {
            let mut out = x.as_ref().clone();
            out.extend_from_slice(y);
            Ok(Bytes(Rc::new(out)))
        }
        (Bytes(_), Null) | (Null, Bytes(_)) => Ok(Bytes(Rc::new(Vec::new()))),
        (List(x), List(y)) => {
            let mut out = x.borrow().clone();
            out.extend(y.borrow().iter().cloned());
            Ok(Value::list(out))
        }
        (List(_), Null) | (Null, List(_)) => Ok(Value::list(Vec::new())),
        (Tuple(x), Tuple(y)) => {
            let mut out = x.as_ref().clone();
            out.extend(y.iter().cloned());
            Ok(Value::tuple(out))
        }
        (Tuple(_), Null) | (Null, Tuple(_)) => Ok(Value::tuple(Vec::new())),
        _ => Err(EvcError::mismatch("+")),
    }
}

/// Unary negate over the numeric tower.
pub fn negate(v: &Value) -> Result<Value, EvcError> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Complex(c) => Ok(Value::Complex(Complex::new(-c.re, -c.im))),
        _ => Err(EvcError::mismatch("-")),
    }
}

/// Unary bitwise complement, integers only.
pub fn bit_not(v: &Value) -> Result<Value, EvcError> {
    match v {
        Value::Int(i) => Ok(Value::Int(!i)),
        _ => Err(EvcError::mismatch("~")),
    }
}

/// Absolute value over the numeric tower.
pub fn abs(v: &Value) -> Result<Value, EvcError> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Complex(c) => Ok(Value::Float(c.abs())),
        _ => Err(EvcError::mismatch("abs")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_widening_to_float() {
        let got = binary_op(BinOp::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
        assert_eq!(got, Value::Float(1.5));
    }

    #[test]
    fn test_float_widening_to_complex() {
        let got = binary_op(
            BinOp::Mul,
            &Value::Float(2.0),
            &Value::Complex(Complex::new(0.0, 1.0)),
        )
        .unwrap();
        assert_eq!(got, Value::Complex(Complex::new(0.0, 2.0)));
    }

    #[test]
    fn test_int_division_by_zero_yields_zero() {
        assert_eq!(
            binary_op(BinOp::Div, &Value::Int(7), &Value::Int(0)).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            binary_op(BinOp::Mod, &Value::Int(7), &Value::Int(0)).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_complex_division_by_zero_raises() {
        let err = binary_op(
            BinOp::Div,
            &Value::Complex(Complex::new(1.0, 0.0)),
            &Value::Int(0),
        )
        .unwrap_err();
        assert_eq!(err.class, ErrorClass::Number);
    }

    #[test]
    fn test_shift_semantics() {
        assert_eq!(
            binary_op(BinOp::Shl, &Value::Int(1), &Value::Int(4)).unwrap(),
            Value::Int(16)
        );
        // Out-of-range counts collapse to zero.
        assert_eq!(
            binary_op(BinOp::Shl, &Value::Int(1), &Value::Int(64)).unwrap(),
            Value::Int(0)
        );
        // Logical right shift: the sign bit does not smear.
        assert_eq!(
            binary_op(BinOp::Shr, &Value::Int(-1), &Value::Int(63)).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_type_mismatch_names_operator() {
        let err = binary_op(BinOp::Sub, &Value::str("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.class, ErrorClass::Type);
        assert!(err.message.contains('-'));
    }

    #[test]
    fn test_concat() {
        let got = binary_op(BinOp::Add, &Value::str("foo"), &Value::str("bar")).unwrap();
        assert_eq!(got.display().unwrap(), "foobar");
        let got = binary_op(
            BinOp::Add,
            &Value::list(vec![Value::Int(1)]),
            &Value::list(vec![Value::Int(2)]),
        )
        .unwrap();
        assert_eq!(got.repr().unwrap(), "[1, 2]");
        // cat(a, null) yields an empty value of a's type.
        let got = binary_op(BinOp::Add, &Value::str("x"), &Value::Null).unwrap();
        assert_eq!(got.display().unwrap(), "");
        let got = binary_op(BinOp::Add, &Value::Null, &Value::list(vec![Value::Int(1)])).unwrap();
        assert_eq!(got.repr().unwrap(), "[]");
    }

    #[test]
    fn test_int_pow() {
        assert_eq!(
            binary_op(BinOp::Pow, &Value::Int(2), &Value::Int(10)).unwrap(),
            Value::Int(1024)
        );
        assert_eq!(
            binary_op(BinOp::Pow, &Value::Int(2), &Value::Int(-1)).unwrap(),
            Value::Float(0.5)
        );
    }
}
