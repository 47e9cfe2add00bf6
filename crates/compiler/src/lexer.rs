//! The tokenizer.
//!
//! Consumes a source [`Str`] through a [`StrReader`] cursor and emits
//! [`Token`]s with line numbers for diagnostics. Exactly one token of
//! push-back is supported, which is all the assembler needs.

use std::rc::Rc;

use evilcandy_core::strings::StrReader;
use evilcandy_core::{EvcError, Str, StrWriter};

use crate::token::{keyword_lookup, Op, Token, TokenKind};

pub struct Lexer<'a> {
    src: StrReader<'a>,
    file: Rc<str>,
    line: u32,
    ungot: Option<Token>,
}

fn is_ident_start(c: u32) -> bool {
    (c as u8 as char).is_ascii_alphabetic() && c < 0x80 || c == '_' as u32
}

fn is_ident(c: u32) -> bool {
    c < 0x80 && ((c as u8 as char).is_ascii_alphanumeric() || c == '_' as u32)
}

fn is_digit(c: u32) -> bool {
    c < 0x80 && (c as u8 as char).is_ascii_digit()
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a Str, file: Rc<str>) -> Self {
        Lexer {
            src: StrReader::new(source),
            file,
            line: 1,
            ungot: None,
        }
    }

    pub fn file(&self) -> Rc<str> {
        self.file.clone()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn err(&self, msg: impl Into<String>) -> EvcError {
        EvcError::syntax(msg).with_location(self.file.as_ref(), self.line)
    }

    /// Push one token back; the next [`Lexer::next_token`] returns it.
    pub fn unget(&mut self, tok: Token) {
        debug_assert!(self.ungot.is_none());
        self.ungot = Some(tok);
    }

    pub fn next_token(&mut self) -> Result<Token, EvcError> {
        if let Some(tok) = self.ungot.take() {
            return Ok(tok);
        }
        self.skip_space_and_comments()?;
        let line = self.line;
        let kind = self.scan()?;
        Ok(Token { kind, line })
    }

    fn skip_space_and_comments(&mut self) -> Result<(), EvcError> {
        loop {
            match self.src.peek() {
                Some(c) if c == '\n' as u32 => {
                    self.src.getc();
                    self.line += 1;
                }
                Some(c) if c < 0x80 && (c as u8).is_ascii_whitespace() => {
                    self.src.getc();
                }
                Some(c) if c == '/' as u32 => {
                    self.src.getc();
                    match self.src.peek() {
                        Some(n) if n == '/' as u32 => {
                            while let Some(c) = self.src.getc() {
                                if c == '\n' as u32 {
                                    self.line += 1;
                                    break;
                                }
                            }
                        }
                        Some(n) if n == '*' as u32 => {
                            self.src.getc();
                            self.skip_block_comment()?;
                        }
                        _ => {
                            // A division operator; put the slash back.
                            self.src.ungetc();
                            return Ok(());
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), EvcError> {
        let mut prev = 0u32;
        while let Some(c) = self.src.getc() {
            if c == '\n' as u32 {
                self.line += 1;
            }
            if prev == '*' as u32 && c == '/' as u32 {
                return Ok(());
            }
            prev = c;
        }
        Err(self.err("unterminated block comment"))
    }

    fn scan(&mut self) -> Result<TokenKind, EvcError> {
        let Some(c) = self.src.getc() else {
            return Ok(TokenKind::Eof);
        };

        if c == '`' as u32 {
            return Ok(TokenKind::Lambda);
        }
        if c == '"' as u32 || c == '\'' as u32 {
            return self.scan_string(c);
        }
        if c == 'b' as u32
            && matches!(self.src.peek(), Some(q) if q == '"' as u32 || q == '\'' as u32)
        {
            return self.scan_bytes();
        }
        if is_ident_start(c) {
            return self.scan_ident(c);
        }
        if is_digit(c) || (c == '.' as u32 && matches!(self.src.peek(), Some(n) if is_digit(n))) {
            return self.scan_number(c);
        }
        self.scan_op(c)
    }

    fn scan_ident(&mut self, first: u32) -> Result<TokenKind, EvcError> {
        let mut name = String::new();
        name.push(first as u8 as char);
        while let Some(c) = self.src.peek() {
            if !is_ident(c) {
                break;
            }
            name.push(c as u8 as char);
            self.src.getc();
        }
        Ok(match keyword_lookup(&name) {
            Some(kw) => TokenKind::Kw(kw),
            None => TokenKind::Ident(Rc::from(name.as_str())),
        })
    }

    fn scan_number(&mut self, first: u32) -> Result<TokenKind, EvcError> {
        let mut text = String::new();
        text.push(first as u8 as char);

        if first == '0' as u32
            && matches!(self.src.peek(), Some(c) if c == 'x' as u32 || c == 'X' as u32 || c == 'b' as u32 || c == 'B' as u32)
        {
            let base_char = self.src.getc().unwrap_or(0) as u8 as char;
            text.push(base_char);
            let hex = base_char == 'x' || base_char == 'X';
            while let Some(c) = self.src.peek() {
                let ch = c as u8 as char;
                let ok = if hex { ch.is_ascii_hexdigit() } else { ch == '0' || ch == '1' };
                if !ok {
                    break;
                }
                text.push(ch);
                self.src.getc();
            }
            self.reject_trailing_ident()?;
            return evilcandy_core::numparse::parse_int(&text)
                .map(TokenKind::Int)
                .map_err(|e| self.err(e.message));
        }

        let mut is_float = first == '.' as u32;
        while let Some(c) = self.src.peek() {
            if is_digit(c) {
                text.push(c as u8 as char);
                self.src.getc();
            } else if c == '.' as u32 && !is_float {
                is_float = true;
                text.push('.');
                self.src.getc();
            } else {
                break;
            }
        }
        if matches!(self.src.peek(), Some(c) if c == 'e' as u32 || c == 'E' as u32) {
            is_float = true;
            text.push('e');
            self.src.getc();
            if matches!(self.src.peek(), Some(c) if c == '+' as u32 || c == '-' as u32) {
                text.push(self.src.getc().unwrap_or(0) as u8 as char);
            }
            let mut saw = false;
            while let Some(c) = self.src.peek() {
                if !is_digit(c) {
                    break;
                }
                saw = true;
                text.push(c as u8 as char);
                self.src.getc();
            }
            if !saw {
                return Err(self.err(format!("malformed exponent in '{text}'")));
            }
        }
        self.reject_trailing_ident()?;
        if is_float {
            evilcandy_core::numparse::parse_float(&text)
                .map(TokenKind::Float)
                .map_err(|e| self.err(e.message))
        } else {
            evilcandy_core::numparse::parse_int(&text)
                .map(TokenKind::Int)
                .map_err(|e| self.err(e.message))
        }
    }

    /// A number immediately followed by an identifier character is a
    /// malformed literal, not two tokens.
    fn reject_trailing_ident(&mut self) -> Result<(), EvcError> {
        if let Some(c) = self.src.peek()
            && is_ident(c)
        {
            return Err(self.err("malformed numeric literal"));
        }
        Ok(())
    }

    /// Decode one backslash escape. `Ok(None)` means the escape
    /// contributes nothing (line continuation).
    fn scan_escape(&mut self, quote: u32) -> Result<Option<u32>, EvcError> {
        let Some(c) = self.src.getc() else {
            return Err(self.err("unterminated string literal"));
        };
        if c == quote {
            return Ok(Some(quote));
        }
        if c > 0x7F {
            return Err(self.err(format!(
                "unsupported escape '\\{}'",
                char::from_u32(c).unwrap_or('?')
            )));
        }
        Ok(match c as u8 {
            b'n' => Some('\n' as u32),
            b'r' => Some('\r' as u32),
            b't' => Some('\t' as u32),
            b'\\' => Some('\\' as u32),
            b'\'' => Some('\'' as u32),
            b'"' => Some('"' as u32),
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'e' => Some(0x1B),
            b'f' => Some(0x0C),
            b'v' => Some(0x0B),
            b'\n' => {
                self.line += 1;
                None
            }
            b'x' => {
                let mut v = 0u32;
                let mut n = 0;
                while n < 2 {
                    match self.src.peek() {
                        Some(h) if h < 0x80 && (h as u8 as char).is_ascii_hexdigit() => {
                            v = v * 16 + (h as u8 as char).to_digit(16).unwrap_or(0);
                            self.src.getc();
                            n += 1;
                        }
                        _ => break,
                    }
                }
                if n == 0 {
                    return Err(self.err("\\x escape needs hex digits"));
                }
                Some(v)
            }
            b'0'..=b'7' => {
                let mut v = c - '0' as u32;
                let mut n = 1;
                while n < 3 {
                    match self.src.peek() {
                        Some(o) if ('0' as u32..='7' as u32).contains(&o) => {
                            v = v * 8 + (o - '0' as u32);
                            self.src.getc();
                            n += 1;
                        }
                        _ => break,
                    }
                }
                Some(v)
            }
            _ => {
                return Err(self.err(format!(
                    "unsupported escape '\\{}'",
                    char::from_u32(c).unwrap_or('?')
                )));
            }
        })
    }

    fn scan_string(&mut self, quote: u32) -> Result<TokenKind, EvcError> {
        let mut w = StrWriter::new();
        loop {
            let Some(c) = self.src.getc() else {
                return Err(self.err("unterminated string literal"));
            };
            if c == quote {
                break;
            }
            if c == '\n' as u32 {
                return Err(self.err("newline in string literal"));
            }
            if c == '\\' as u32 {
                if let Some(p) = self.scan_escape(quote)? {
                    w.putc(p);
                }
            } else {
                w.putc(c);
            }
        }
        Ok(TokenKind::Str(Rc::new(w.finish())))
    }

    fn scan_bytes(&mut self) -> Result<TokenKind, EvcError> {
        let mut out: Vec<u8> = Vec::new();
        loop {
            let quote = match self.src.getc() {
                Some(q) if q == '"' as u32 || q == '\'' as u32 => q,
                _ => return Err(self.err("malformed bytes literal")),
            };
            loop {
                let Some(c) = self.src.getc() else {
                    return Err(self.err("unterminated bytes literal"));
                };
                if c == quote {
                    break;
                }
                if c == '\n' as u32 {
                    return Err(self.err("newline in bytes literal"));
                }
                let point = if c == '\\' as u32 {
                    match self.scan_escape(quote)? {
                        Some(p) => p,
                        None => continue,
                    }
                } else {
                    c
                };
                if point > 0xFF {
                    return Err(self.err("bytes literal may only hold values 0-255"));
                }
                out.push(point as u8);
            }
            // Adjacent bytes literals with no whitespace between them
            // concatenate.
            let mark = self.src.getpos();
            if self.src.getc() == Some('b' as u32)
                && matches!(self.src.peek(), Some(q) if q == '"' as u32 || q == '\'' as u32)
            {
                continue;
            }
            self.src.setpos(mark);
            break;
        }
        Ok(TokenKind::Bytes(Rc::new(out)))
    }

    fn scan_op(&mut self, c: u32) -> Result<TokenKind, EvcError> {
        if c > 0x7F {
            return Err(self.err(format!(
                "unexpected character '{}'",
                char::from_u32(c).unwrap_or('?')
            )));
        }
        let next = self.src.peek();
        let two = |n: u32, want: char| n == want as u32;
        let op = match c as u8 as char {
            '+' => match next {
                Some(n) if two(n, '+') => self.take(Op::Incr),
                Some(n) if two(n, '=') => self.take(Op::PlusEq),
                _ => Op::Plus,
            },
            '-' => match next {
                Some(n) if two(n, '-') => self.take(Op::Decr),
                Some(n) if two(n, '=') => self.take(Op::MinusEq),
                _ => Op::Minus,
            },
            '*' => match next {
                Some(n) if two(n, '*') => self.take(Op::Pow),
                Some(n) if two(n, '=') => self.take(Op::MulEq),
                _ => Op::Mul,
            },
            '/' => match next {
                Some(n) if two(n, '=') => self.take(Op::DivEq),
                _ => Op::Div,
            },
            '%' => match next {
                Some(n) if two(n, '=') => self.take(Op::ModEq),
                _ => Op::Mod,
            },
            '^' => match next {
                Some(n) if two(n, '=') => self.take(Op::XorEq),
                _ => Op::Xor,
            },
            '&' => match next {
                Some(n) if two(n, '&') => self.take(Op::AndAnd),
                Some(n) if two(n, '=') => self.take(Op::AndEq),
                _ => Op::And,
            },
            '|' => match next {
                Some(n) if two(n, '|') => self.take(Op::OrOr),
                Some(n) if two(n, '=') => self.take(Op::OrEq),
                _ => Op::Or,
            },
            '~' => Op::Tilde,
            '!' => match next {
                Some(n) if two(n, '=') => self.take(Op::Ne),
                _ => Op::Not,
            },
            '<' => match next {
                Some(n) if two(n, '=') => self.take(Op::Le),
                Some(n) if two(n, '<') => {
                    self.src.getc();
                    match self.src.peek() {
                        Some(m) if two(m, '=') => self.take(Op::ShlEq),
                        _ => Op::Shl,
                    }
                }
                _ => Op::Lt,
            },
            '>' => match next {
                Some(n) if two(n, '=') => self.take(Op::Ge),
                Some(n) if two(n, '>') => {
                    self.src.getc();
                    match self.src.peek() {
                        Some(m) if two(m, '=') => self.take(Op::ShrEq),
                        _ => Op::Shr,
                    }
                }
                _ => Op::Gt,
            },
            '=' => match next {
                Some(n) if two(n, '=') => self.take(Op::EqEq),
                _ => Op::Assign,
            },
            '(' => Op::LParen,
            ')' => Op::RParen,
            '[' => Op::LBracket,
            ']' => Op::RBracket,
            '{' => Op::LBrace,
            '}' => Op::RBrace,
            ';' => Op::Semi,
            ',' => Op::Comma,
            '.' => Op::Dot,
            ':' => Op::Colon,
            _ => {
                return Err(self.err(format!(
                    "unexpected character '{}'",
                    char::from_u32(c).unwrap_or('?')
                )));
            }
        };
        Ok(TokenKind::Op(op))
    }

    fn take(&mut self, op: Op) -> Op {
        self.src.getc();
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Keyword;

    fn lex_all(src: &str) -> Vec<TokenKind> {
        let s = Str::from_str(src);
        let mut lx = Lexer::new(&s, Rc::from("<test>"));
        let mut out = Vec::new();
        loop {
            let t = lx.next_token().expect("lex");
            if t.kind == TokenKind::Eof {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn test_numbers() {
        let toks = lex_all("1 0x10 0b101 1.5 .5 2e3 2.5e-1");
        assert_eq!(
            toks,
            vec![
                TokenKind::Int(1),
                TokenKind::Int(16),
                TokenKind::Int(5),
                TokenKind::Float(1.5),
                TokenKind::Float(0.5),
                TokenKind::Float(2000.0),
                TokenKind::Float(0.25),
            ]
        );
    }

    #[test]
    fn test_malformed_number_suffix() {
        let s = Str::from_str("12abc");
        let mut lx = Lexer::new(&s, Rc::from("<test>"));
        let err = lx.next_token().unwrap_err();
        assert_eq!(err.class, ErrorClass::Syntax);
    }

    #[test]
    fn test_keywords_vs_idents() {
        let toks = lex_all("let letx while");
        assert_eq!(toks[0], TokenKind::Kw(Keyword::Let));
        assert!(matches!(&toks[1], TokenKind::Ident(n) if n.as_ref() == "letx"));
        assert_eq!(toks[2], TokenKind::Kw(Keyword::While));
    }

    #[test]
    fn test_string_escapes() {
        let toks = lex_all(r#"'a\n\t\x41\101\\' "q\"" "#);
        let TokenKind::Str(s) = &toks[0] else { panic!("expected string") };
        assert_eq!(s.to_rust_string(), "a\n\tAA\\");
        let TokenKind::Str(s) = &toks[1] else { panic!("expected string") };
        assert_eq!(s.to_rust_string(), "q\"");
    }

    #[test]
    fn test_line_continuation_dropped() {
        let toks = lex_all("'ab\\\ncd'");
        let TokenKind::Str(s) = &toks[0] else { panic!("expected string") };
        assert_eq!(s.to_rust_string(), "abcd");
    }

    #[test]
    fn test_bytes_literals_concatenate() {
        let toks = lex_all(r"b'ab'b'\x01\377'");
        let TokenKind::Bytes(b) = &toks[0] else { panic!("expected bytes") };
        assert_eq!(b.as_ref(), &vec![b'a', b'b', 0x01, 0xFF]);
    }

    #[test]
    fn test_operators_longest_match() {
        let toks = lex_all("<<= << <= < ** *= * ++ += +");
        let want = [
            Op::ShlEq,
            Op::Shl,
            Op::Le,
            Op::Lt,
            Op::Pow,
            Op::MulEq,
            Op::Mul,
            Op::Incr,
            Op::PlusEq,
            Op::Plus,
        ];
        for (tok, op) in toks.iter().zip(want) {
            assert_eq!(*tok, TokenKind::Op(op));
        }
    }

    #[test]
    fn test_comments_and_lines() {
        let s = Str::from_str("a // one\n/* two\nthree */ b");
        let mut lx = Lexer::new(&s, Rc::from("<test>"));
        let a = lx.next_token().unwrap();
        assert_eq!(a.line, 1);
        let b = lx.next_token().unwrap();
        assert_eq!(b.line, 3);
        assert!(matches!(b.kind, TokenKind::Ident(_)));
    }

    #[test]
    fn test_unterminated_block_comment() {
        let s = Str::from_str("/* never ends");
        let mut lx = Lexer::new(&s, Rc::from("<test>"));
        assert!(lx.next_token().is_err());
    }

    #[test]
    fn test_unget_round_trip() {
        let s = Str::from_str("x y");
        let mut lx = Lexer::new(&s, Rc::from("<test>"));
        let t = lx.next_token().unwrap();
        lx.unget(t.clone());
        assert_eq!(lx.next_token().unwrap(), t);
    }
}
