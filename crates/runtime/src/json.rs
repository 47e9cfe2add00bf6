//! `dict_from_json(path)`: build a dictionary from a JSON file.
//!
//! The file is tokenized by the language lexer, so string escapes,
//! number bases, and comments follow EvilCandy rules rather than
//! RFC 8259. The top level must be an object, keys must be string
//! literals, trailing commas are syntax errors, and nesting is capped
//! at 128 levels.

use std::rc::Rc;

use evilcandy_compiler::lexer::Lexer;
use evilcandy_compiler::token::{Keyword, Op, Token, TokenKind};
use evilcandy_core::dict::Dict;
use evilcandy_core::error::{ErrorClass, EvcError};
use evilcandy_core::strings::Str;
use evilcandy_core::value::Value;

use crate::vm::{NativeArgs, Vm};

const JSON_DEPTH_MAX: usize = 128;

pub fn bi_dict_from_json(_vm: &mut Vm, call: NativeArgs<'_>) -> Result<Value, EvcError> {
    let Value::Str(path) = &call.args[0] else {
        return Err(EvcError::type_err("dict_from_json expects a path string"));
    };
    let path = path.to_rust_string();
    let bytes = std::fs::read(&path).map_err(|e| {
        EvcError::new(ErrorClass::System, format!("cannot read '{path}': {e}"))
    })?;
    let source = Str::from_bytes(&bytes);
    parse_str(&source, &path)
}

/// Parse JSON source text; the top level must be an object.
pub fn parse_str(source: &Str, file: &str) -> Result<Value, EvcError> {
    let mut p = JsonParser {
        lx: Lexer::new(source, Rc::from(file)),
        depth: 0,
    };
    let tok = p.next()?;
    if tok.kind != TokenKind::Op(Op::LBrace) {
        return Err(p.err("top level must be an object"));
    }
    let top = p.parse_dict()?;
    let tok = p.next()?;
    if tok.kind != TokenKind::Eof {
        return Err(p.err("trailing content after the top-level object"));
    }
    Ok(top)
}

struct JsonParser<'a> {
    lx: Lexer<'a>,
    depth: usize,
}

impl<'a> JsonParser<'a> {
    fn next(&mut self) -> Result<Token, EvcError> {
        self.lx.next_token()
    }

    fn err(&self, msg: impl Into<String>) -> EvcError {
        EvcError::syntax(msg).with_location(self.lx.file().as_ref(), self.lx.line())
    }

    /// Parse the body of an object; the opening brace is consumed.
    fn parse_dict(&mut self) -> Result<Value, EvcError> {
        self.depth += 1;
        if self.depth > JSON_DEPTH_MAX {
            return Err(EvcError::new(
                ErrorClass::Recursion,
                "JSON nested too deeply",
            ));
        }
        let mut d = Dict::new();
        let mut first = true;
        loop {
            let tok = self.next()?;
            match tok.kind {
                TokenKind::Op(Op::RBrace) if first => break,
                TokenKind::Str(key) => {
                    let colon = self.next()?;
                    if colon.kind != TokenKind::Op(Op::Colon) {
                        return Err(self.err("expected ':' after object key"));
                    }
                    let value = self.parse_value()?;
                    d.insert(key, value)?;
                    let sep = self.next()?;
                    match sep.kind {
                        TokenKind::Op(Op::Comma) => {
                            first = false;
                            // A '}' here would be a trailing comma.
                            let peek = self.next()?;
                            if peek.kind == TokenKind::Op(Op::RBrace) {
                                return Err(self.err("trailing comma in object"));
                            }
                            self.lx.unget(peek);
                        }
                        TokenKind::Op(Op::RBrace) => break,
                        other => {
                            return Err(self.err(format!("expected ',' or '}}', got {other}")));
                        }
                    }
                }
                other => {
                    return Err(self.err(format!("object keys must be strings, got {other}")));
                }
            }
        }
        self.depth -= 1;
        Ok(Value::dict(d))
    }

    fn parse_array(&mut self) -> Result<Value, EvcError> {
        self.depth += 1;
        if self.depth > JSON_DEPTH_MAX {
            return Err(EvcError::new(
                ErrorClass::Recursion,
                "JSON nested too deeply",
            ));
        }
        let mut items = Vec::new();
        let tok = self.next()?;
        if tok.kind == TokenKind::Op(Op::RBracket) {
            self.depth -= 1;
            return Ok(Value::list(items));
        }
        self.lx.unget(tok);
        loop {
            items.push(self.parse_value()?);
            let sep = self.next()?;
            match sep.kind {
                TokenKind::Op(Op::Comma) => {
                    let peek = self.next()?;
                    if peek.kind == TokenKind::Op(Op::RBracket) {
                        return Err(self.err("trailing comma in array"));
                    }
                    self.lx.unget(peek);
                }
                TokenKind::Op(Op::RBracket) => break,
                other => {
                    return Err(self.err(format!("expected ',' or ']', got {other}")));
                }
            }
        }
        self.depth -= 1;
        Ok(Value::list(items))
    }

    fn parse_value(&mut self) -> Result<Value, EvcError> {
        let tok = self.next()?;
        Ok(match tok.kind {
            TokenKind::Int(i) => Value::Int(i),
            TokenKind::Float(f) => Value::Float(f),
            TokenKind::Str(s) => Value::Str(s),
            TokenKind::Kw(Keyword::True) => Value::Int(1),
            TokenKind::Kw(Keyword::False) => Value::Int(0),
            TokenKind::Kw(Keyword::Null) => Value::Null,
            TokenKind::Op(Op::Minus) => {
                let num = self.next()?;
                match num.kind {
                    TokenKind::Int(i) => Value::Int(-i),
                    TokenKind::Float(f) => Value::Float(-f),
                    other => {
                        return Err(self.err(format!("expected a number after '-', got {other}")));
                    }
                }
            }
            TokenKind::Op(Op::LBrace) => self.parse_dict()?,
            TokenKind::Op(Op::LBracket) => self.parse_array()?,
            other => return Err(self.err(format!("unexpected {other} in JSON"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Value, EvcError> {
        parse_str(&Str::from_str(src), "<test>")
    }

    #[test]
    fn test_basic_object() {
        let v = parse(r#"{"a": 1, "b": [1.5, "x", true, null], "c": {"d": -2}}"#).unwrap();
        let Value::Dict(d) = &v else { panic!("expected dict") };
        let d = d.borrow();
        assert_eq!(d.get(&Str::from_str("a")), Some(Value::Int(1)));
        let b = d.get(&Str::from_str("b")).unwrap();
        assert_eq!(b.repr().unwrap(), "[1.5, 'x', 1, null]");
        let c = d.get(&Str::from_str("c")).unwrap();
        assert_eq!(c.repr().unwrap(), "{'d': -2}");
    }

    #[test]
    fn test_top_level_must_be_object() {
        assert!(parse("[1, 2]").is_err());
        assert!(parse("42").is_err());
    }

    #[test]
    fn test_trailing_comma_rejected() {
        assert!(parse(r#"{"a": 1,}"#).is_err());
        assert!(parse(r#"{"a": [1, 2,]}"#).is_err());
    }

    #[test]
    fn test_non_string_key_rejected() {
        assert!(parse(r#"{1: 2}"#).is_err());
    }

    #[test]
    fn test_escapes_follow_language_rules() {
        let v = parse(r#"{"a": "x\x41\n"}"#).unwrap();
        let Value::Dict(d) = &v else { panic!("expected dict") };
        let got = d.borrow().get(&Str::from_str("a")).unwrap();
        assert_eq!(got.display().unwrap(), "xA\n");
    }

    #[test]
    fn test_depth_limit() {
        let mut src = String::from(r#"{"a": "#);
        for _ in 0..200 {
            src.push('[');
        }
        for _ in 0..200 {
            src.push(']');
        }
        src.push('}');
        let err = parse(&src).unwrap_err();
        assert_eq!(err.class, ErrorClass::Recursion);
    }

    #[test]
    fn test_empty_object() {
        let v = parse("{}").unwrap();
        assert_eq!(v.repr().unwrap(), "{}");
    }
}
